//! In-memory control target for tests.
//!
//! Every request is recorded under its obs-websocket request type with the
//! fields the real request would carry, so tests can assert on what was sent.
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;

use super::requests::{Output, PropertyItem, SceneItem};
use super::{ConnectParams, ConnectionStatus, ControlTarget};
use crate::errors::{ConnectionError, RemoteError};

pub const PASSWORD: &str = "secret";

/// Windows the fake offers to every capture input
pub const WINDOWS: &[&str] = &[
    "[firefox.exe]: Docs - Mozilla Firefox",
    "[WindowsTerminal.exe]: Terminal",
    "[Code.exe]: main.rs - Visual Studio Code",
];

#[derive(Default)]
struct State {
    items: Vec<SceneItem>,
    inputs: Vec<(String, Value)>,
    calls: Vec<(String, Value)>,
    recording: bool,
    streaming: bool,
}

pub struct FakeTarget {
    scene: String,
    state: Mutex<State>,
    status: watch::Sender<ConnectionStatus>,
}

impl FakeTarget {
    pub fn connected(scene: &str, items: &[(i64, &str, bool)]) -> Self {
        let target = Self::disconnected();
        target.status.send_replace(ConnectionStatus::connected("Connected to OBS 30.0.0"));
        Self {
            scene: scene.to_string(),
            state: Mutex::new(State {
                items: items
                    .iter()
                    .map(|(id, name, enabled)| SceneItem {
                        id: *id,
                        name: name.to_string(),
                        enabled: *enabled,
                    })
                    .collect(),
                ..Default::default()
            }),
            ..target
        }
    }

    pub fn disconnected() -> Self {
        let (status, _) = watch::channel(ConnectionStatus::disconnected("Not connected to OBS"));
        Self {
            scene: "Scene".to_string(),
            state: Mutex::new(State::default()),
            status,
        }
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn last_call(&self, request_type: &str) -> Option<(String, Value)> {
        self.calls()
            .into_iter()
            .rev()
            .find(|(name, _)| name == request_type)
    }

    /// Current settings of an input created or edited through this fake
    pub fn input_settings(&self, input: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state
            .inputs
            .iter()
            .find(|(name, _)| name == input)
            .map(|(_, settings)| settings.clone())
    }

    /// Check the connection and record the request. Hands back the state lock.
    fn record(&self, request_type: &str, data: Value) -> Result<std::sync::MutexGuard<'_, State>, RemoteError> {
        if !self.status.borrow().is_connected() {
            return Err(RemoteError::NotConnected);
        }
        let mut state = self.state.lock().unwrap();
        state.calls.push((request_type.to_string(), data));
        Ok(state)
    }
}

fn not_found(request_type: &str, what: &str) -> RemoteError {
    RemoteError::RequestFailed {
        request_type: request_type.to_string(),
        code: 600,
        comment: format!("No source was found by the name of `{}`.", what),
    }
}

#[async_trait]
impl ControlTarget for FakeTarget {
    async fn connect(&self, params: ConnectParams) -> Result<String, ConnectionError> {
        self.status.send_replace(ConnectionStatus::connecting("Connecting"));
        if params.password == PASSWORD {
            let message = "Connected to OBS 30.0.0".to_string();
            self.status.send_replace(ConnectionStatus::connected(message.clone()));
            Ok(message)
        } else {
            let err = ConnectionError::AuthenticationFailed("Authentication failed.".into());
            self.status.send_replace(ConnectionStatus::disconnected(err.to_string()));
            Err(err)
        }
    }

    async fn disconnect(&self) {
        self.status.send_replace(ConnectionStatus::disconnected("Disconnected from OBS"));
    }

    fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    async fn current_scene(&self) -> Result<String, RemoteError> {
        self.record("GetCurrentProgramScene", json!({}))?;
        Ok(self.scene.clone())
    }

    async fn scene_items(&self, scene: &str) -> Result<Vec<SceneItem>, RemoteError> {
        let state = self.record("GetSceneItemList", json!({ "sceneName": scene }))?;
        Ok(state.items.clone())
    }

    async fn set_item_enabled(&self, scene: &str, item_id: i64, enabled: bool) -> Result<(), RemoteError> {
        let mut state = self.record(
            "SetSceneItemEnabled",
            json!({
                "sceneName": scene,
                "sceneItemId": item_id,
                "sceneItemEnabled": enabled,
            }),
        )?;
        if let Some(item) = state.items.iter_mut().find(|i| i.id == item_id) {
            item.enabled = enabled;
        }
        Ok(())
    }

    async fn create_input(&self, scene: &str, input: &str, kind: &str, settings: Value) -> Result<i64, RemoteError> {
        let mut state = self.record(
            "CreateInput",
            json!({
                "sceneName": scene,
                "inputName": input,
                "inputKind": kind,
                "inputSettings": settings,
                "sceneItemEnabled": true,
            }),
        )?;
        let id = state.items.iter().map(|i| i.id).max().unwrap_or(0) + 1;
        state.items.push(SceneItem {
            id,
            name: input.to_string(),
            enabled: true,
        });
        state.inputs.push((input.to_string(), settings));
        Ok(id)
    }

    async fn remove_input(&self, input: &str) -> Result<(), RemoteError> {
        let mut state = self.record("RemoveInput", json!({ "inputName": input }))?;
        state.items.retain(|item| item.name != input);
        state.inputs.retain(|(name, _)| name != input);
        Ok(())
    }

    async fn set_input_settings(&self, input: &str, settings: Value) -> Result<(), RemoteError> {
        let mut state = self.record(
            "SetInputSettings",
            json!({
                "inputName": input,
                "inputSettings": settings,
                "overlay": true,
            }),
        )?;
        if !state.items.iter().any(|item| item.name == input) {
            return Err(not_found("SetInputSettings", input));
        }
        match state.inputs.iter_mut().find(|(name, _)| name == input) {
            Some((_, current)) => {
                if let (Some(current), Value::Object(updates)) = (current.as_object_mut(), settings) {
                    current.extend(updates);
                }
            }
            None => state.inputs.push((input.to_string(), settings)),
        }
        Ok(())
    }

    async fn property_items(&self, input: &str, property: &str) -> Result<Vec<PropertyItem>, RemoteError> {
        let state = self.record(
            "GetInputPropertiesListPropertyItems",
            json!({ "inputName": input, "propertyName": property }),
        )?;
        if !state.items.iter().any(|item| item.name == input) {
            return Err(not_found("GetInputPropertiesListPropertyItems", input));
        }
        Ok(WINDOWS
            .iter()
            .map(|title| PropertyItem {
                name: title.to_string(),
                value: json!(format!("{}:class:exe", title)),
            })
            .collect())
    }

    async fn canvas_size(&self) -> Result<(f64, f64), RemoteError> {
        self.record("GetVideoSettings", json!({}))?;
        Ok((1920.0, 1080.0))
    }

    async fn item_size(&self, scene: &str, item_id: i64) -> Result<(f64, f64), RemoteError> {
        self.record(
            "GetSceneItemTransform",
            json!({ "sceneName": scene, "sceneItemId": item_id }),
        )?;
        Ok((200.0, 50.0))
    }

    async fn set_item_position(&self, scene: &str, item_id: i64, x: f64, y: f64) -> Result<(), RemoteError> {
        self.record(
            "SetSceneItemTransform",
            json!({
                "sceneName": scene,
                "sceneItemId": item_id,
                "sceneItemTransform": { "positionX": x, "positionY": y },
            }),
        )?;
        Ok(())
    }

    async fn output_active(&self, output: Output) -> Result<bool, RemoteError> {
        let state = self.record(&format!("Get{}Status", output.noun()), json!({}))?;
        Ok(match output {
            Output::Record => state.recording,
            Output::Stream => state.streaming,
        })
    }

    async fn start_output(&self, output: Output) -> Result<(), RemoteError> {
        let mut state = self.record(&format!("Start{}", output.noun()), json!({}))?;
        match output {
            Output::Record => state.recording = true,
            Output::Stream => state.streaming = true,
        }
        Ok(())
    }

    async fn stop_output(&self, output: Output) -> Result<Option<String>, RemoteError> {
        let mut state = self.record(&format!("Stop{}", output.noun()), json!({}))?;
        Ok(match output {
            Output::Record => {
                state.recording = false;
                Some("/tmp/recording.mkv".to_string())
            }
            Output::Stream => {
                state.streaming = false;
                None
            }
        })
    }
}
