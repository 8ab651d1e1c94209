use std::time::Duration;

use serde_json::json;

use super::registry::ToolDescriptor;
use super::schema::{ParamKind, ParamSpec, SourceRef, ToolArgs};
use crate::errors::{ToolError, ToolResult};
use crate::obs::requests::{self, Output, PropertyItem, SceneItem};
use crate::obs::ControlTarget;

/// OBS needs a moment before a fresh text source reports its real size
const NEW_SOURCE_SETTLE: Duration = Duration::from_millis(150);

const ACTIONS: &[&str] = &["start", "stop"];

const NO_PARAMS: &[ParamSpec] = &[];

const VISIBILITY_PARAMS: &[ParamSpec] = &[
    ParamSpec::required(
        "source",
        ParamKind::SourceRef,
        "Name of the source as listed by list-sources, or its numeric id",
    ),
    ParamSpec::required(
        "visible",
        ParamKind::Boolean,
        "true to show the source, false to hide it",
    ),
];

const EDIT_TEXT_PARAMS: &[ParamSpec] = &[
    ParamSpec::required(
        "source",
        ParamKind::SourceRef,
        "Name or numeric id of an existing text source",
    ),
    ParamSpec::required("text", ParamKind::String, "The new text to display"),
];

const ADD_TEXT_PARAMS: &[ParamSpec] = &[ParamSpec::required(
    "text",
    ParamKind::String,
    "The text to display",
)];

const ADD_WINDOW_PARAMS: &[ParamSpec] = &[ParamSpec::required(
    "window",
    ParamKind::String,
    "Title of the window to capture, or part of it",
)];

const CHANGE_WINDOW_PARAMS: &[ParamSpec] = &[
    ParamSpec::required(
        "source",
        ParamKind::SourceRef,
        "Name or numeric id of an existing window capture source",
    ),
    ParamSpec::required(
        "window",
        ParamKind::String,
        "Title of the window to capture instead, or part of it",
    ),
];

const ACTION_PARAMS: &[ParamSpec] = &[ParamSpec::required(
    "action",
    ParamKind::Choice(ACTIONS),
    "Either start or stop",
)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListSources,
    SetVisibility,
    EditText,
    AddText,
    AddWindowCapture,
    ChangeWindowCapture,
    Control(Output),
}

pub fn descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "list-sources",
            description: "List the sources in the current OBS scene with their ids and visibility.",
            params: NO_PARAMS,
            operation: Operation::ListSources,
        },
        ToolDescriptor {
            name: "toggle-source-visibility",
            description: "Show or hide a source in the current OBS scene.",
            params: VISIBILITY_PARAMS,
            operation: Operation::SetVisibility,
        },
        ToolDescriptor {
            name: "edit-text",
            description: "Change the text shown by an existing text source.",
            params: EDIT_TEXT_PARAMS,
            operation: Operation::EditText,
        },
        ToolDescriptor {
            name: "add-text",
            description: "Add a new text source, centered on the canvas of the current scene.",
            params: ADD_TEXT_PARAMS,
            operation: Operation::AddText,
        },
        ToolDescriptor {
            name: "add-window-capture",
            description: "Add a source capturing one application window to the current scene.",
            params: ADD_WINDOW_PARAMS,
            operation: Operation::AddWindowCapture,
        },
        ToolDescriptor {
            name: "change-window-capture",
            description: "Point an existing window capture source at a different window.",
            params: CHANGE_WINDOW_PARAMS,
            operation: Operation::ChangeWindowCapture,
        },
        ToolDescriptor {
            name: "recording",
            description: "Start or stop recording.",
            params: ACTION_PARAMS,
            operation: Operation::Control(Output::Record),
        },
        ToolDescriptor {
            name: "streaming",
            description: "Start or stop streaming.",
            params: ACTION_PARAMS,
            operation: Operation::Control(Output::Stream),
        },
    ]
}

impl Operation {
    pub async fn execute(self, target: &dyn ControlTarget, args: &ToolArgs) -> ToolResult<String> {
        match self {
            Operation::ListSources => list_sources(target).await,
            Operation::SetVisibility => set_visibility(target, args).await,
            Operation::EditText => edit_text(target, args).await,
            Operation::AddText => add_text(target, args).await,
            Operation::AddWindowCapture => add_window_capture(target, args).await,
            Operation::ChangeWindowCapture => change_window_capture(target, args).await,
            Operation::Control(output) => control_output(target, output, args).await,
        }
    }
}

async fn list_sources(target: &dyn ControlTarget) -> ToolResult<String> {
    let scene = requests::snapshot(target).await?;
    if scene.items.is_empty() {
        return Ok(format!("Scene '{}' has no sources.", scene.name));
    }
    let lines: Vec<String> = scene
        .items
        .iter()
        .map(|item| {
            format!(
                "- {} (id {}, {})",
                item.name,
                item.id,
                if item.enabled { "visible" } else { "hidden" }
            )
        })
        .collect();
    Ok(format!("Scene '{}':\n{}", scene.name, lines.join("\n")))
}

async fn set_visibility(target: &dyn ControlTarget, args: &ToolArgs) -> ToolResult<String> {
    let source = args.source("source")?;
    let visible = args.bool("visible")?;
    let scene = target.current_scene().await?;
    let items = target.scene_items(&scene).await?;
    let item = find_source(&items, &source)?;
    target.set_item_enabled(&scene, item.id, visible).await?;
    Ok(format!(
        "'{}' is now {}.",
        item.name,
        if visible { "visible" } else { "hidden" }
    ))
}

async fn edit_text(target: &dyn ControlTarget, args: &ToolArgs) -> ToolResult<String> {
    let source = args.source("source")?;
    let text = args.str("text")?;
    let scene = target.current_scene().await?;
    let items = target.scene_items(&scene).await?;
    let item = find_source(&items, &source)?;
    target
        .set_input_settings(&item.name, json!({ "text": text }))
        .await?;
    Ok(format!("'{}' now reads: {}", item.name, text))
}

async fn add_text(target: &dyn ControlTarget, args: &ToolArgs) -> ToolResult<String> {
    let text = args.str("text")?;
    let scene = target.current_scene().await?;
    let name = text_source_name(text);
    let item_id = target
        .create_input(&scene, &name, requests::text_input_kind(), json!({ "text": text }))
        .await?;

    tokio::time::sleep(NEW_SOURCE_SETTLE).await;
    let (canvas_width, canvas_height) = target.canvas_size().await?;
    let (width, height) = target.item_size(&scene, item_id).await?;
    target
        .set_item_position(
            &scene,
            item_id,
            ((canvas_width - width) / 2.0).max(0.0),
            ((canvas_height - height) / 2.0).max(0.0),
        )
        .await?;
    Ok(format!("Added text source '{}' to '{}'.", name, scene))
}

/// The capture input is created first because only an existing input can list
/// the windows it may capture. It is removed again when nothing matches.
async fn add_window_capture(target: &dyn ControlTarget, args: &ToolArgs) -> ToolResult<String> {
    let window = args.str("window")?;
    let (kind, property) = requests::window_capture_kind();
    let scene = target.current_scene().await?;
    let name = window_source_name(window);
    target.create_input(&scene, &name, kind, json!({})).await?;

    let windows = target.property_items(&name, property).await?;
    let found = match find_window(&windows, window) {
        Ok(found) => found,
        Err(e) => {
            target.remove_input(&name).await?;
            return Err(e);
        }
    };
    target
        .set_input_settings(&name, json!({ property: found.value }))
        .await?;
    Ok(format!(
        "Added window capture '{}' for '{}' to '{}'.",
        name, found.name, scene
    ))
}

async fn change_window_capture(target: &dyn ControlTarget, args: &ToolArgs) -> ToolResult<String> {
    let source = args.source("source")?;
    let window = args.str("window")?;
    let (_, property) = requests::window_capture_kind();
    let scene = target.current_scene().await?;
    let items = target.scene_items(&scene).await?;
    let item = find_source(&items, &source)?;

    let windows = target.property_items(&item.name, property).await?;
    let found = find_window(&windows, window)?;
    target
        .set_input_settings(&item.name, json!({ property: found.value }))
        .await?;
    Ok(format!("'{}' now captures '{}'.", item.name, found.name))
}

async fn control_output(target: &dyn ControlTarget, output: Output, args: &ToolArgs) -> ToolResult<String> {
    let noun = match output {
        Output::Record => "Recording",
        Output::Stream => "Streaming",
    };
    let active = target.output_active(output).await?;
    match args.str("action")? {
        "start" if active => Ok(format!("{} is already running.", noun)),
        "start" => {
            target.start_output(output).await?;
            Ok(format!("{} started.", noun))
        }
        _ if !active => Ok(format!("{} is not running.", noun)),
        _ => match target.stop_output(output).await? {
            Some(path) => Ok(format!("{} stopped. Saved to {}", noun, path)),
            None => Ok(format!("{} stopped.", noun)),
        },
    }
}

fn text_source_name(text: &str) -> String {
    let mut label: String = text.chars().take(24).collect();
    if label.len() < text.len() {
        label.push_str("...");
    }
    format!("Text: {}", label.trim())
}

fn window_source_name(window: &str) -> String {
    format!("Window: {}", window.trim())
}

/// Case-insensitive substring match on the window titles
fn find_window<'a>(windows: &'a [PropertyItem], window: &str) -> ToolResult<&'a PropertyItem> {
    let wanted = window.trim().to_lowercase();
    windows
        .iter()
        .find(|w| !wanted.is_empty() && w.name.to_lowercase().contains(&wanted))
        .ok_or_else(|| {
            let some: Vec<String> = windows.iter().take(10).map(|w| format!("'{}'", w.name)).collect();
            ToolError::OutOfRange {
                param: "window".to_string(),
                detail: if some.is_empty() {
                    format!("no window matches '{}'; no windows are available", window)
                } else {
                    format!("no window matches '{}'; some available windows are {}", window, some.join(", "))
                },
            }
        })
}

const NUMBER_WORDS: &[&str] = &[
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen", "twenty",
];

/// Lowercase, drop separators, spell-out numbers as digits: "Capture six" == "capture_6"
fn normalize_name(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let word = word.to_lowercase();
            match NUMBER_WORDS.iter().position(|n| *n == word) {
                Some(n) => n.to_string(),
                None => word,
            }
        })
        .collect()
}

fn available(items: &[SceneItem]) -> String {
    if items.is_empty() {
        return "the current scene has no sources".to_string();
    }
    let names: Vec<String> = items
        .iter()
        .map(|item| format!("'{}' (id {})", item.name, item.id))
        .collect();
    format!("available sources are {}", names.join(", "))
}

pub fn find_source<'a>(items: &'a [SceneItem], source: &SourceRef) -> ToolResult<&'a SceneItem> {
    let found = match source {
        SourceRef::Id(id) => items.iter().find(|item| item.id == *id),
        SourceRef::Name(name) => {
            let lowered = name.trim().to_lowercase();
            let normalized = normalize_name(name);
            items
                .iter()
                .find(|item| item.name.to_lowercase() == lowered)
                .or_else(|| {
                    items
                        .iter()
                        .find(|item| !normalized.is_empty() && normalize_name(&item.name) == normalized)
                })
        }
    };
    found.ok_or_else(|| ToolError::OutOfRange {
        param: "source".to_string(),
        detail: format!("no source matches {}; {}", source, available(items)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RemoteError;
    use crate::obs::fake::FakeTarget;
    use crate::tools::ToolRegistry;
    use serde_json::Value;

    fn items() -> Vec<SceneItem> {
        vec![
            SceneItem {
                id: 1,
                name: "Webcam".into(),
                enabled: false,
            },
            SceneItem {
                id: 6,
                name: "capture_6".into(),
                enabled: true,
            },
        ]
    }

    #[test]
    fn test_find_source_by_name() {
        let items = items();
        assert_eq!(find_source(&items, &SourceRef::Name("webcam".into())).unwrap().id, 1);
        assert_eq!(find_source(&items, &SourceRef::Name("Capture 6".into())).unwrap().id, 6);
        assert_eq!(find_source(&items, &SourceRef::Name("capture six".into())).unwrap().id, 6);
        assert_eq!(find_source(&items, &SourceRef::Id(6)).unwrap().name, "capture_6");
    }

    #[test]
    fn test_find_source_unknown_lists_available() {
        let items = items();
        let err = find_source(&items, &SourceRef::Id(42)).unwrap_err();
        match err {
            ToolError::OutOfRange { param, detail } => {
                assert_eq!(param, "source");
                assert!(detail.contains("'Webcam' (id 1)"));
                assert!(detail.contains("'capture_6' (id 6)"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_text_source_name() {
        assert_eq!(text_source_name("Be right back"), "Text: Be right back");
        assert_eq!(
            text_source_name("a very long announcement that goes on"),
            "Text: a very long announcement..."
        );
    }

    async fn run(target: &FakeTarget, name: &str, arguments: Value) -> ToolResult<String> {
        let registry = ToolRegistry::obs();
        let call = crate::models::tool::ToolCall::new(name, arguments);
        registry.dispatch(&call, target).await
    }

    #[tokio::test]
    async fn test_show_webcam() {
        let target = FakeTarget::connected("Main", &[(1, "Webcam", false), (2, "Mic", true)]);
        let result = run(
            &target,
            "toggle-source-visibility",
            json!({"source": "webcam", "visible": true}),
        )
        .await
        .unwrap();
        assert_eq!(result, "'Webcam' is now visible.");
        let (_, data) = target.last_call("SetSceneItemEnabled").unwrap();
        assert_eq!(data["sceneName"], "Main");
        assert_eq!(data["sceneItemId"], 1);
        assert_eq!(data["sceneItemEnabled"], true);
    }

    #[tokio::test]
    async fn test_unknown_tool_makes_no_remote_call() {
        let target = FakeTarget::connected("Main", &[]);
        let err = run(&target, "warp-drive", json!({})).await.unwrap_err();
        assert_eq!(err, ToolError::NotFound("warp-drive".into()));
        assert!(target.calls().is_empty());
    }

    #[tokio::test]
    async fn test_validation_precedes_invocation() {
        let target = FakeTarget::connected("Main", &[(1, "Webcam", true)]);
        let err = run(&target, "toggle-source-visibility", json!({"source": "webcam"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter { .. }));
        assert!(target.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_target() {
        let target = FakeTarget::disconnected();
        let err = run(&target, "list-sources", json!({})).await.unwrap_err();
        assert_eq!(err, ToolError::Remote(RemoteError::NotConnected));
    }

    #[tokio::test]
    async fn test_list_sources() {
        let target = FakeTarget::connected("Main", &[(1, "Webcam", false), (2, "Mic", true)]);
        let listing = run(&target, "list-sources", json!({})).await.unwrap();
        assert_eq!(
            listing,
            "Scene 'Main':\n- Webcam (id 1, hidden)\n- Mic (id 2, visible)"
        );
    }

    #[tokio::test]
    async fn test_add_text_is_centered() {
        let target = FakeTarget::connected("Main", &[]);
        run(&target, "add-text", json!({"text": "BRB"})).await.unwrap();
        let (_, create) = target.last_call("CreateInput").unwrap();
        assert_eq!(create["inputName"], "Text: BRB");
        assert_eq!(create["inputSettings"]["text"], "BRB");
        let (_, transform) = target.last_call("SetSceneItemTransform").unwrap();
        // fake canvas is 1920x1080 and new sources measure 200x50
        assert_eq!(transform["sceneItemTransform"]["positionX"], 860.0);
        assert_eq!(transform["sceneItemTransform"]["positionY"], 515.0);
    }

    #[tokio::test]
    async fn test_recording_is_idempotent() {
        let target = FakeTarget::connected("Main", &[]);
        assert_eq!(
            run(&target, "recording", json!({"action": "stop"})).await.unwrap(),
            "Recording is not running."
        );
        assert_eq!(
            run(&target, "recording", json!({"action": "Start"})).await.unwrap(),
            "Recording started."
        );
        assert_eq!(
            run(&target, "recording", json!({"action": "start"})).await.unwrap(),
            "Recording is already running."
        );
        assert!(run(&target, "recording", json!({"action": "stop"}))
            .await
            .unwrap()
            .starts_with("Recording stopped. Saved to"));
        let err = run(&target, "streaming", json!({"action": "pause"})).await.unwrap_err();
        assert!(matches!(err, ToolError::OutOfRange { .. }));
    }

    #[tokio::test]
    async fn test_add_window_capture() {
        let target = FakeTarget::connected("Main", &[(1, "Webcam", true)]);
        let result = run(&target, "add-window-capture", json!({"window": "FIREFOX"}))
            .await
            .unwrap();
        assert_eq!(
            result,
            "Added window capture 'Window: FIREFOX' for '[firefox.exe]: Docs - Mozilla Firefox' to 'Main'."
        );
        let (kind, property) = requests::window_capture_kind();
        let (_, create) = target.last_call("CreateInput").unwrap();
        assert_eq!(create["sceneName"], "Main");
        assert_eq!(create["inputKind"], kind);
        let (_, list) = target.last_call("GetInputPropertiesListPropertyItems").unwrap();
        assert_eq!(list["inputName"], "Window: FIREFOX");
        assert_eq!(list["propertyName"], property);
        let settings = target.input_settings("Window: FIREFOX").unwrap();
        assert_eq!(settings[property], "[firefox.exe]: Docs - Mozilla Firefox:class:exe");
    }

    #[tokio::test]
    async fn test_add_window_capture_without_match_lists_windows() {
        let target = FakeTarget::connected("Main", &[]);
        let err = run(&target, "add-window-capture", json!({"window": "spreadsheet"}))
            .await
            .unwrap_err();
        match err {
            ToolError::OutOfRange { param, detail } => {
                assert_eq!(param, "window");
                assert!(detail.contains("'spreadsheet'"));
                assert!(detail.contains("'[WindowsTerminal.exe]: Terminal'"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // the placeholder input does not linger
        assert!(target.last_call("RemoveInput").is_some());
        assert!(target.input_settings("Window: spreadsheet").is_none());
        assert!(target.last_call("SetInputSettings").is_none());
    }

    #[tokio::test]
    async fn test_change_window_capture() {
        let target = FakeTarget::connected("Main", &[(3, "Window: docs", true)]);
        let result = run(
            &target,
            "change-window-capture",
            json!({"source": "window: docs", "window": "terminal"}),
        )
        .await
        .unwrap();
        assert_eq!(result, "'Window: docs' now captures '[WindowsTerminal.exe]: Terminal'.");
        let (_, property) = requests::window_capture_kind();
        let (_, data) = target.last_call("SetInputSettings").unwrap();
        assert_eq!(data["inputName"], "Window: docs");
        assert_eq!(data["inputSettings"][property], "[WindowsTerminal.exe]: Terminal:class:exe");
        assert_eq!(data["overlay"], true);
    }

    #[tokio::test]
    async fn test_change_window_capture_unknown_source() {
        let target = FakeTarget::connected("Main", &[(1, "Webcam", true)]);
        let err = run(
            &target,
            "change-window-capture",
            json!({"source": "Game", "window": "terminal"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::OutOfRange { ref param, .. } if param == "source"));
        assert!(target.last_call("GetInputPropertiesListPropertyItems").is_none());
    }

    #[test]
    fn test_find_window_lists_at_most_ten() {
        let windows: Vec<PropertyItem> = (0..15)
            .map(|n| PropertyItem {
                name: format!("Window {}", n),
                value: json!(n),
            })
            .collect();
        assert_eq!(find_window(&windows, "window 12").unwrap().value, json!(12));
        match find_window(&windows, "browser").unwrap_err() {
            ToolError::OutOfRange { detail, .. } => {
                assert!(detail.contains("'Window 9'"));
                assert!(!detail.contains("'Window 10'"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
