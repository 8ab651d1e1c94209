//! These models represent the objects passed around by the agent
//!
//! There are a few related formats we need to interact with:
//! - channel frames, exchanged with the caller (see [`crate::protocol`])
//! - openai-compatible chat messages/tools, sent from the agent to the LLM
//! - obs-websocket requests, sent from the tools to OBS
//!
//! We always convert those formats into the internal structs at the edge, so the
//! internal models are not an exact match to any of them.
pub mod message;
pub mod role;
pub mod tool;
