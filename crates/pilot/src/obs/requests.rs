//! Plain data the control target hands back, plus the per-platform input kinds.
use serde::Serialize;

use super::ControlTarget;
use crate::errors::RemoteError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneItem {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub name: String,
    pub items: Vec<SceneItem>,
}

/// One selectable entry of an input's list property
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyItem {
    /// What OBS shows in its dropdown, e.g. "[firefox.exe]: Docs"
    pub name: String,
    /// What goes into the input settings when the entry is picked
    pub value: serde_json::Value,
}

pub async fn snapshot(target: &dyn ControlTarget) -> Result<Scene, RemoteError> {
    let name = target.current_scene().await?;
    let items = target.scene_items(&name).await?;
    Ok(Scene { name, items })
}

/// Input kind for a plain text source on this platform
pub fn text_input_kind() -> &'static str {
    if cfg!(windows) {
        "text_gdiplus_v2"
    } else {
        "text_ft2_source_v2"
    }
}

/// Input kind for capturing a single window on this platform, and the name of
/// its list property holding the window choices
pub fn window_capture_kind() -> (&'static str, &'static str) {
    if cfg!(windows) || cfg!(target_os = "macos") {
        ("window_capture", "window")
    } else {
        ("xcomposite_input", "capture_window")
    }
}

/// Outputs the tools can start and stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Record,
    Stream,
}

impl Output {
    pub fn noun(self) -> &'static str {
        match self {
            Output::Record => "Record",
            Output::Stream => "Stream",
        }
    }
}
