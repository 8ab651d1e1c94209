use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream;
use std::sync::{Arc, Mutex};

use crate::models::message::Message;
use crate::models::tool::{Tool, ToolCall};
use crate::models::message::ToolRequest;
use crate::providers::base::{ChunkStream, Provider, ProviderChunk};

/// One scripted model turn; an `Err` item fails the stream at that point.
pub type MockTurn = Vec<Result<ProviderChunk, String>>;

/// A mock provider that replays pre-configured turns and records what it was asked
#[derive(Clone, Default)]
pub struct MockProvider {
    turns: Arc<Mutex<Vec<MockTurn>>>,
    pub requests: Arc<Mutex<Vec<(String, Vec<Message>)>>>,
}

impl MockProvider {
    pub fn new(turns: Vec<MockTurn>) -> Self {
        Self {
            turns: Arc::new(Mutex::new(turns)),
            requests: Arc::default(),
        }
    }

    pub fn text(text: &str) -> Result<ProviderChunk, String> {
        Ok(ProviderChunk::Text(text.to_string()))
    }

    pub fn tool(id: &str, call: ToolCall) -> Result<ProviderChunk, String> {
        Ok(ProviderChunk::ToolRequest(ToolRequest {
            id: id.to_string(),
            tool_call: Ok(call),
        }))
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        _tools: &[Tool],
    ) -> Result<ChunkStream> {
        self.requests
            .lock()
            .unwrap()
            .push((system.to_string(), messages.to_vec()));
        let mut turns = self.turns.lock().unwrap();
        if turns.is_empty() {
            return Err(anyhow!("mock provider has no more turns"));
        }
        let turn = turns.remove(0);
        Ok(Box::pin(stream::iter(
            turn.into_iter().map(|item| item.map_err(|e| anyhow!(e))),
        )))
    }
}
