use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use obws::client::{ConnectConfig, HandshakeError};
use obws::events::Event;
use obws::requests::inputs::{Create, SetSettings};
use obws::requests::scene_items::{Position, SceneItemTransform, SetEnabled, SetTransform};
use obws::requests::EventSubscription;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::requests::{Output, PropertyItem, SceneItem};
use super::{ConnectParams, ConnectionState, ConnectionStatus, ControlTarget};
use crate::errors::{ConnectionError, RemoteError};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Close code OBS uses when the Identify authentication string is wrong
const CLOSE_AUTHENTICATION_FAILED: u16 = 4009;

struct Session {
    client: Arc<obws::Client>,
    watcher: JoinHandle<()>,
}

type Slot = Arc<Mutex<Option<Session>>>;

/// Control target backed by an `obws` client.
///
/// The session slot is the single source of truth for "connected": requests
/// only go out while it holds a client, and whoever notices the socket is gone
/// (the event watcher or a failed request) empties it.
pub struct ObsClient {
    connect_timeout: Duration,
    request_timeout: Duration,
    status: Arc<watch::Sender<ConnectionStatus>>,
    session: Slot,
}

impl ObsClient {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::disconnected("Not connected to OBS"));
        Self {
            connect_timeout,
            request_timeout,
            status: Arc::new(status),
            session: Arc::new(Mutex::new(None)),
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }

    /// Detach the current session, if any, without publishing a status change.
    fn take_session(&self) -> Option<Session> {
        let session = self.session.lock().ok().and_then(|mut guard| guard.take());
        if let Some(session) = &session {
            // the watcher goes first so the teardown below is not reported as a loss
            session.watcher.abort();
        }
        session
    }

    fn live(&self) -> Result<Arc<obws::Client>, RemoteError> {
        self.session
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|session| session.client.clone()))
            .ok_or(RemoteError::NotConnected)
    }

    async fn establish(&self, params: &ConnectParams) -> Result<(obws::Client, String), ConnectionError> {
        let password = Some(params.password.as_str()).filter(|p| !p.is_empty());
        let client = obws::Client::connect_with_config(ConnectConfig {
            host: params.host.as_str(),
            port: params.port,
            password,
            event_subscriptions: Some(EventSubscription::NONE),
            broadcast_capacity: None,
            connect_timeout: self.connect_timeout,
        })
        .await
        .map_err(|e| connect_error(params, e))?;

        let version = client
            .general()
            .version()
            .await
            .map_err(|e| ConnectionError::Handshake(e.to_string()))?;
        debug!(
            obs = %version.obs_version,
            websocket = %version.obs_web_socket_version,
            rpc = version.rpc_version,
            "obs identified"
        );
        Ok((client, version.obs_version.to_string()))
    }

    /// Run one request against `client` under the request timeout.
    async fn settle<T>(
        &self,
        client: &Arc<obws::Client>,
        request_type: &str,
        request: impl Future<Output = obws::Result<T>>,
    ) -> Result<T, RemoteError> {
        debug!(request_type, "obs request");
        match timeout(self.request_timeout, request).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(self.request_error(client, request_type, e)),
            Err(_) => Err(RemoteError::Timeout(request_type.to_string())),
        }
    }

    fn request_error(&self, client: &Arc<obws::Client>, request_type: &str, error: obws::Error) -> RemoteError {
        match error {
            obws::Error::Api { code, message } => RemoteError::RequestFailed {
                request_type: request_type.to_string(),
                code: serde_json::to_value(code)
                    .ok()
                    .and_then(|v| v.as_i64())
                    .unwrap_or_default(),
                comment: message.unwrap_or_else(|| format!("{:?}", code)),
            },
            obws::Error::Send(_) | obws::Error::ReceiveMessage(_) | obws::Error::Disconnected => {
                lose(&self.session, &self.status, &Arc::downgrade(client));
                RemoteError::ConnectionLost
            }
            other => RemoteError::Protocol(other.to_string()),
        }
    }
}

impl Default for ObsClient {
    fn default() -> Self {
        Self::new(CONNECT_TIMEOUT, REQUEST_TIMEOUT)
    }
}

impl Drop for ObsClient {
    fn drop(&mut self) {
        self.take_session();
    }
}

fn connect_error(params: &ConnectParams, error: obws::Error) -> ConnectionError {
    match error {
        obws::Error::Connect(e) => ConnectionError::Unreachable {
            address: params.address(),
            reason: e.to_string(),
        },
        obws::Error::Timeout => ConnectionError::Timeout(params.address()),
        obws::Error::Handshake(HandshakeError::ConnectionClosed(Some(details)))
            if u16::from(details.code) == CLOSE_AUTHENTICATION_FAILED =>
        {
            ConnectionError::AuthenticationFailed(details.reason)
        }
        obws::Error::Handshake(e) => ConnectionError::Handshake(e.to_string()),
        other => ConnectionError::Handshake(other.to_string()),
    }
}

/// Empty the slot if it still holds `client` and report the loss. A stale
/// client from an earlier session never touches its replacement.
fn lose(session: &Slot, status: &watch::Sender<ConnectionStatus>, client: &Weak<obws::Client>) {
    let lost = session.lock().ok().and_then(|mut guard| {
        let ours = guard
            .as_ref()
            .map_or(false, |s| Weak::ptr_eq(&Arc::downgrade(&s.client), client));
        if ours {
            guard.take()
        } else {
            None
        }
    });
    if lost.is_none() {
        return;
    }
    info!("Connection to OBS lost");
    status.send_if_modified(|current| {
        if current.state == ConnectionState::Connected {
            *current = ConnectionStatus::disconnected("Connection to OBS lost");
            true
        } else {
            false
        }
    });
}

/// The event stream ends (or reports ServerStopped) once the socket is gone.
async fn watch_session(
    events: impl Stream<Item = Event>,
    session: Slot,
    status: Arc<watch::Sender<ConnectionStatus>>,
    client: Weak<obws::Client>,
) {
    tokio::pin!(events);
    while let Some(event) = events.next().await {
        if matches!(event, Event::ServerStopped) {
            break;
        }
    }
    lose(&session, &status, &client);
}

#[async_trait]
impl ControlTarget for ObsClient {
    async fn connect(&self, params: ConnectParams) -> Result<String, ConnectionError> {
        drop(self.take_session());
        self.set_status(ConnectionStatus::connecting(format!(
            "Connecting to OBS at {}",
            params.address()
        )));

        let result = match timeout(self.connect_timeout, self.establish(&params)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout(params.address())),
        };

        let established = result.and_then(|(client, version)| {
            let events = client
                .events()
                .map_err(|e| ConnectionError::Handshake(e.to_string()))?;
            Ok((Arc::new(client), events, version))
        });
        let (client, events, version) = match established {
            Ok(established) => established,
            Err(e) => {
                warn!(address = %params.address(), error = %e, "obs connect failed");
                self.set_status(ConnectionStatus::disconnected(e.to_string()));
                return Err(e);
            }
        };

        let watcher = tokio::spawn(watch_session(
            events,
            self.session.clone(),
            self.status.clone(),
            Arc::downgrade(&client),
        ));
        if let Ok(mut guard) = self.session.lock() {
            *guard = Some(Session { client, watcher });
        }

        let message = format!("Connected to OBS {}", version);
        info!(address = %params.address(), "{}", message);
        self.set_status(ConnectionStatus::connected(message.clone()));
        Ok(message)
    }

    async fn disconnect(&self) {
        if let Some(session) = self.take_session() {
            if let Ok(mut client) = Arc::try_unwrap(session.client) {
                client.disconnect().await;
            }
        }
        self.set_status(ConnectionStatus::disconnected("Disconnected from OBS"));
    }

    fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    async fn current_scene(&self) -> Result<String, RemoteError> {
        let client = self.live()?;
        let scene = self
            .settle(&client, "GetCurrentProgramScene", client.scenes().current_program_scene())
            .await?;
        Ok(scene.id.name)
    }

    async fn scene_items(&self, scene: &str) -> Result<Vec<SceneItem>, RemoteError> {
        let client = self.live()?;
        let listed = self
            .settle(&client, "GetSceneItemList", client.scene_items().list(scene.into()))
            .await?;
        // the list carries no visibility, so each item is asked separately
        let mut items = Vec::with_capacity(listed.len());
        for item in listed {
            let enabled = self
                .settle(
                    &client,
                    "GetSceneItemEnabled",
                    client.scene_items().enabled(scene.into(), item.id),
                )
                .await?;
            items.push(SceneItem {
                id: item.id,
                name: item.source_name,
                enabled,
            });
        }
        Ok(items)
    }

    async fn set_item_enabled(&self, scene: &str, item_id: i64, enabled: bool) -> Result<(), RemoteError> {
        let client = self.live()?;
        self.settle(
            &client,
            "SetSceneItemEnabled",
            client.scene_items().set_enabled(SetEnabled {
                scene: scene.into(),
                item_id,
                enabled,
            }),
        )
        .await
    }

    async fn create_input(&self, scene: &str, input: &str, kind: &str, settings: Value) -> Result<i64, RemoteError> {
        let client = self.live()?;
        let created = self
            .settle(
                &client,
                "CreateInput",
                client.inputs().create(Create {
                    scene: scene.into(),
                    input,
                    kind,
                    settings: Some(settings),
                    enabled: Some(true),
                }),
            )
            .await?;
        Ok(created.scene_item_id)
    }

    async fn remove_input(&self, input: &str) -> Result<(), RemoteError> {
        let client = self.live()?;
        self.settle(&client, "RemoveInput", client.inputs().remove(input.into()))
            .await
    }

    async fn set_input_settings(&self, input: &str, settings: Value) -> Result<(), RemoteError> {
        let client = self.live()?;
        self.settle(
            &client,
            "SetInputSettings",
            client.inputs().set_settings(SetSettings {
                input: input.into(),
                settings: &settings,
                overlay: Some(true),
            }),
        )
        .await
    }

    async fn property_items(&self, input: &str, property: &str) -> Result<Vec<PropertyItem>, RemoteError> {
        let client = self.live()?;
        let items = self
            .settle(
                &client,
                "GetInputPropertiesListPropertyItems",
                client.inputs().properties_list_property_items(input.into(), property),
            )
            .await?;
        Ok(items
            .into_iter()
            .filter(|item| item.enabled)
            .map(|item| PropertyItem {
                name: item.name,
                value: item.value,
            })
            .collect())
    }

    async fn canvas_size(&self) -> Result<(f64, f64), RemoteError> {
        let client = self.live()?;
        let video = self
            .settle(&client, "GetVideoSettings", client.config().video_settings())
            .await?;
        Ok((f64::from(video.base_width), f64::from(video.base_height)))
    }

    async fn item_size(&self, scene: &str, item_id: i64) -> Result<(f64, f64), RemoteError> {
        let client = self.live()?;
        let transform = self
            .settle(
                &client,
                "GetSceneItemTransform",
                client.scene_items().transform(scene.into(), item_id),
            )
            .await?;
        Ok((
            f64::from(transform.source_width),
            f64::from(transform.source_height),
        ))
    }

    async fn set_item_position(&self, scene: &str, item_id: i64, x: f64, y: f64) -> Result<(), RemoteError> {
        let client = self.live()?;
        self.settle(
            &client,
            "SetSceneItemTransform",
            client.scene_items().set_transform(SetTransform {
                scene: scene.into(),
                item_id,
                transform: SceneItemTransform {
                    position: Some(Position {
                        x: Some(x as f32),
                        y: Some(y as f32),
                    }),
                    ..Default::default()
                },
            }),
        )
        .await
    }

    async fn output_active(&self, output: Output) -> Result<bool, RemoteError> {
        let client = self.live()?;
        match output {
            Output::Record => Ok(self
                .settle(&client, "GetRecordStatus", client.recording().status())
                .await?
                .active),
            Output::Stream => Ok(self
                .settle(&client, "GetStreamStatus", client.streaming().status())
                .await?
                .active),
        }
    }

    async fn start_output(&self, output: Output) -> Result<(), RemoteError> {
        let client = self.live()?;
        match output {
            Output::Record => {
                self.settle(&client, "StartRecord", client.recording().start())
                    .await
            }
            Output::Stream => {
                self.settle(&client, "StartStream", client.streaming().start())
                    .await
            }
        }
    }

    async fn stop_output(&self, output: Output) -> Result<Option<String>, RemoteError> {
        let client = self.live()?;
        match output {
            Output::Record => Ok(Some(
                self.settle(&client, "StopRecord", client.recording().stop())
                    .await?,
            )),
            Output::Stream => {
                self.settle(&client, "StopStream", client.streaming().stop())
                    .await?;
                Ok(None)
            }
        }
    }
}
