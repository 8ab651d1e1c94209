use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::{AgentError, AgentResult, ToolResult};
use crate::models::message::{Message, MessageContent};
use crate::obs::requests;
use crate::obs::ControlTarget;
use crate::prompt_template::load_prompt_file;
use crate::providers::base::{Provider, ProviderChunk};
use crate::tools::ToolRegistry;

/// Sent when a generation finishes without producing anything to say
pub const EMPTY_REPLY: &str = "Sorry, I couldn't generate a response. Please try again.";

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    /// Model turns that may request tools before the generation is abandoned
    pub max_tool_rounds: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// What a generation produces, in order. `End` is always last on success.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Delta(String),
    ToolInvoked {
        name: String,
        arguments: Value,
        result: ToolResult<String>,
    },
    End,
}

pub type AgentStream = BoxStream<'static, AgentResult<AgentEvent>>;

#[derive(Debug, Serialize)]
struct PromptSource {
    id: i64,
    name: String,
    visible: bool,
}

#[derive(Debug, Serialize)]
struct PromptContext {
    connected: bool,
    scene: Option<String>,
    sources: Vec<PromptSource>,
    notice: Option<String>,
}

/// Render the system prompt with whatever the target can tell us about the current scene.
async fn system_prompt(target: &dyn ControlTarget) -> AgentResult<String> {
    let mut context = PromptContext {
        connected: target.status().is_connected(),
        scene: None,
        sources: Vec::new(),
        notice: None,
    };
    if context.connected {
        match requests::snapshot(target).await {
            Ok(scene) => {
                context.scene = Some(scene.name);
                context.sources = scene
                    .items
                    .into_iter()
                    .map(|item| PromptSource {
                        id: item.id,
                        name: item.name,
                        visible: item.enabled,
                    })
                    .collect();
            }
            Err(e) => {
                warn!(error = %e, "could not read the current scene");
                context.notice = Some(format!(
                    "The current scene could not be read ({}). Use list-sources to look it up.",
                    e
                ));
            }
        }
    }
    load_prompt_file("system.md", &context).map_err(|e| AgentError::Internal(e.to_string()))
}

/// One model conversation, bound to one control target.
///
/// At most one generation runs at a time; `submit` while another stream is
/// alive fails with [`AgentError::Busy`]. History lives as long as the agent.
pub struct Agent {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    target: Arc<dyn ControlTarget>,
    config: AgentConfig,
    history: Arc<Mutex<Vec<Message>>>,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        target: Arc<dyn ControlTarget>,
    ) -> Self {
        Self {
            provider,
            registry,
            target,
            config: AgentConfig::default(),
            history: Arc::default(),
        }
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.history.try_lock().is_err()
    }

    /// A copy of the conversation so far. Waits for a running generation.
    pub async fn history(&self) -> Vec<Message> {
        self.history.lock().await.clone()
    }

    /// Start a generation for `text`.
    ///
    /// The stream yields deltas and tool invocations in order and finishes
    /// with [`AgentEvent::End`], or with a single error after which the
    /// history is as it was before this call.
    pub fn submit<S: Into<String>>(&self, text: S) -> AgentResult<AgentStream> {
        let mut history = self
            .history
            .clone()
            .try_lock_owned()
            .map_err(|_| AgentError::Busy)?;

        let provider = self.provider.clone();
        let registry = self.registry.clone();
        let target = self.target.clone();
        let max_tool_rounds = self.config.max_tool_rounds;
        let checkpoint = history.len();
        history.push(Message::user().with_text(text));

        Ok(Box::pin(async_stream::stream! {
            let tools = registry.tools();
            let mut rounds = 0;
            let mut said_anything = false;
            let mut last_tool_result: Option<String> = None;

            loop {
                let system = match system_prompt(target.as_ref()).await {
                    Ok(system) => system,
                    Err(e) => {
                        history.truncate(checkpoint);
                        yield Err(e);
                        return;
                    }
                };

                let mut chunks = match provider.stream(&system, &history, &tools).await {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        warn!(error = %e, "generation failed");
                        history.truncate(checkpoint);
                        yield Err(AgentError::Generation(e.to_string()));
                        return;
                    }
                };

                let mut text = String::new();
                let mut requests = Vec::new();
                let mut failure = None;
                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(ProviderChunk::Text(delta)) => {
                            text.push_str(&delta);
                            said_anything = true;
                            yield Ok(AgentEvent::Delta(delta));
                        }
                        Ok(ProviderChunk::ToolRequest(request)) => requests.push(request),
                        Ok(ProviderChunk::Usage(usage)) => debug!(?usage, "model usage"),
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }
                if let Some(e) = failure {
                    warn!(error = %e, "generation failed mid-stream");
                    history.truncate(checkpoint);
                    yield Err(AgentError::Generation(e.to_string()));
                    return;
                }

                if requests.is_empty() {
                    if !said_anything {
                        let fallback = last_tool_result.take().unwrap_or_else(|| EMPTY_REPLY.to_string());
                        text.push_str(&fallback);
                        yield Ok(AgentEvent::Delta(fallback));
                    }
                    history.push(Message::assistant().with_text(text));
                    yield Ok(AgentEvent::End);
                    return;
                }

                rounds += 1;
                if rounds > max_tool_rounds {
                    warn!(rounds = max_tool_rounds, "tool round limit reached");
                    history.truncate(checkpoint);
                    yield Err(AgentError::ToolRoundLimit(max_tool_rounds));
                    return;
                }

                let mut reply = Message::assistant();
                if !text.is_empty() {
                    reply = reply.with_text(text);
                }
                for request in &requests {
                    reply = reply.with_content(MessageContent::ToolRequest(request.clone()));
                }
                history.push(reply);

                // tool calls of one turn run one after another, in the order requested
                let mut results = Message::user();
                for request in requests {
                    let result = match &request.tool_call {
                        Ok(call) => {
                            let result = registry.dispatch(call, target.as_ref()).await;
                            info!(tool = %call.name, ok = result.is_ok(), "tool call");
                            if let Ok(output) = &result {
                                last_tool_result = Some(output.clone());
                            }
                            yield Ok(AgentEvent::ToolInvoked {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                                result: result.clone(),
                            });
                            result
                        }
                        Err(e) => Err(e.clone()),
                    };
                    results = results.with_tool_response(request.id, result);
                }
                history.push(results);
            }
        }))
    }
}
