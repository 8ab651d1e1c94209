//! JSON frames exchanged with a caller over the session channel.
use serde::{Deserialize, Serialize};

/// Frames a caller sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Message {
        content: String,
    },
    VoiceStart,
    VoiceStop,
    ObsConnect {
        /// Falls back to the configured OBS port
        #[serde(default)]
        port: Option<u16>,
        #[serde(default)]
        password: String,
    },
}

/// Frames the server sends. Every `StreamStart` is matched by exactly one `StreamEnd`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    StreamStart,
    StreamDelta { content: String },
    StreamEnd,
    Transcription { content: String },
    VoiceStatus { listening: bool },
    ObsStatus { connected: bool, message: String },
    Error { content: String },
}

impl OutboundFrame {
    pub fn error<S: Into<String>>(content: S) -> Self {
        OutboundFrame::Error {
            content: content.into(),
        }
    }
}
