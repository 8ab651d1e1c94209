//! Control-target side: a connection to OBS Studio's websocket server.
//!
//! [`ControlTarget`] is the seam the rest of the crate talks to; [`ObsClient`] is
//! the real implementation, built on the `obws` obs-websocket v5 client.
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::errors::{ConnectionError, RemoteError};

pub mod client;
#[cfg(test)]
pub mod fake;
pub mod requests;

pub use client::ObsClient;
pub use requests::{Output, PropertyItem, SceneItem};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 4455;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection state plus the last human readable status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub message: String,
}

impl ConnectionStatus {
    pub fn disconnected<S: Into<String>>(message: S) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            message: message.into(),
        }
    }

    pub fn connecting<S: Into<String>>(message: S) -> Self {
        Self {
            state: ConnectionState::Connecting,
            message: message.into(),
        }
    }

    pub fn connected<S: Into<String>>(message: S) -> Self {
        Self {
            state: ConnectionState::Connected,
            message: message.into(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub password: String,
}

impl ConnectParams {
    pub fn new<H: Into<String>, P: Into<String>>(host: H, port: u16, password: P) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectParams {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT, "")
    }
}

/// Something the tools can drive. One instance belongs to exactly one channel.
///
/// Every request method fails fast with [`RemoteError::NotConnected`] when there
/// is no live connection.
#[async_trait]
pub trait ControlTarget: Send + Sync {
    /// Open (or replace) the connection. On success returns the status message.
    /// Failures are reported, never retried.
    async fn connect(&self, params: ConnectParams) -> Result<String, ConnectionError>;

    async fn disconnect(&self);

    fn status(&self) -> ConnectionStatus;

    /// Observe status changes. The current value is already marked as seen.
    fn subscribe(&self) -> watch::Receiver<ConnectionStatus>;

    /// Name of the current program scene
    async fn current_scene(&self) -> Result<String, RemoteError>;

    async fn scene_items(&self, scene: &str) -> Result<Vec<SceneItem>, RemoteError>;

    async fn set_item_enabled(&self, scene: &str, item_id: i64, enabled: bool) -> Result<(), RemoteError>;

    /// Create an input in `scene` and return its scene item id
    async fn create_input(&self, scene: &str, input: &str, kind: &str, settings: Value) -> Result<i64, RemoteError>;

    async fn remove_input(&self, input: &str) -> Result<(), RemoteError>;

    /// Merge `settings` over the input's current settings
    async fn set_input_settings(&self, input: &str, settings: Value) -> Result<(), RemoteError>;

    /// Entries of a list property, e.g. the windows a capture input can pick from
    async fn property_items(&self, input: &str, property: &str) -> Result<Vec<PropertyItem>, RemoteError>;

    /// Base canvas size in pixels
    async fn canvas_size(&self) -> Result<(f64, f64), RemoteError>;

    /// Unscaled size of a scene item's source
    async fn item_size(&self, scene: &str, item_id: i64) -> Result<(f64, f64), RemoteError>;

    async fn set_item_position(&self, scene: &str, item_id: i64, x: f64, y: f64) -> Result<(), RemoteError>;

    async fn output_active(&self, output: Output) -> Result<bool, RemoteError>;

    async fn start_output(&self, output: Output) -> Result<(), RemoteError>;

    /// Stop an output. Recording reports where the file was written.
    async fn stop_output(&self, output: Output) -> Result<Option<String>, RemoteError>;
}
