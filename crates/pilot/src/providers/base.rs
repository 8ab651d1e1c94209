use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::message::{Message, ToolRequest};
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// One piece of a streamed model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderChunk {
    /// Visible assistant text, in generation order
    Text(String),
    /// A fully assembled tool call; providers emit these once the turn is complete
    ToolRequest(ToolRequest),
    Usage(Usage),
}

pub type ChunkStream = BoxStream<'static, Result<ProviderChunk>>;

/// Base trait for model backends
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start generating the next assistant turn. Text arrives incrementally; tool
    /// calls are reported after the text of the same turn.
    async fn stream(&self, system: &str, messages: &[Message], tools: &[Tool])
        -> Result<ChunkStream>;
}
