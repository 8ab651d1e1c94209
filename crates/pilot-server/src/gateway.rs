//! The Session Gateway: one actor per channel.
//!
//! All work for a channel happens on the actor's task, so generation, tool
//! calls and transcription handling are serialized without locks. The actor
//! owns the channel's Agent Session, control target and transcription source
//! and tears all of them down when the channel closes.
use std::collections::VecDeque;
use std::future::pending;
use std::pin::pin;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use pilot::agent::{Agent, AgentEvent, AgentStream};
use pilot::errors::{AgentResult, ConnectionError};
use pilot::obs::{ConnectParams, ConnectionState, ConnectionStatus, ControlTarget};
use pilot::protocol::{InboundFrame, OutboundFrame};
use pilot::voice::{clean_segment, TranscriptionSource};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;

pub struct Channel {
    state: AppState,
    outbound: mpsc::Sender<OutboundFrame>,
    target: Arc<dyn ControlTarget>,
    agent: Option<Agent>,
    active: Option<AgentStream>,
    pending: VecDeque<String>,
    connecting: Option<BoxFuture<'static, Result<String, ConnectionError>>>,
    transcriber: Option<Box<dyn TranscriptionSource>>,
    segments: Option<mpsc::UnboundedReceiver<String>>,
    closed: bool,
}

async fn next_event(active: &mut Option<AgentStream>) -> Option<AgentResult<AgentEvent>> {
    match active {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}

async fn next_segment(segments: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match segments {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn connect_result(
    connecting: &mut Option<BoxFuture<'static, Result<String, ConnectionError>>>,
) -> Result<String, ConnectionError> {
    match connecting {
        Some(future) => future.await,
        None => pending().await,
    }
}

impl Channel {
    pub fn new(state: AppState, outbound: mpsc::Sender<OutboundFrame>) -> Self {
        let target = (state.targets)();
        Self {
            state,
            outbound,
            target,
            agent: None,
            active: None,
            pending: VecDeque::new(),
            connecting: None,
            transcriber: None,
            segments: None,
            closed: false,
        }
    }

    /// Drive the channel until the caller goes away. `inbound` yields raw text frames.
    pub async fn run<S>(mut self, inbound: S)
    where
        S: Stream<Item = String>,
    {
        let mut inbound = pin!(inbound);
        let mut status = self.target.subscribe();

        while !self.closed {
            if self.active.is_none() {
                self.start_next().await;
            }

            tokio::select! {
                biased;

                frame = inbound.next() => match frame {
                    Some(text) => self.handle_frame(&text).await,
                    None => break,
                },
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = status.borrow_and_update().clone();
                    self.handle_status(current).await;
                }
                result = connect_result(&mut self.connecting), if self.connecting.is_some() => {
                    self.connecting = None;
                    match result {
                        Ok(message) => debug!(%message, "obs connect finished"),
                        Err(e) => debug!(error = %e, "obs connect failed"),
                    }
                }
                segment = next_segment(&mut self.segments), if self.segments.is_some() => {
                    self.handle_segment(segment).await;
                }
                event = next_event(&mut self.active), if self.active.is_some() => {
                    self.handle_event(event).await;
                }
            }
        }

        self.shutdown().await;
    }

    async fn send(&mut self, frame: OutboundFrame) {
        if self.closed {
            return;
        }
        if self.outbound.send(frame).await.is_err() {
            debug!("channel writer is gone");
            self.closed = true;
        }
    }

    async fn handle_frame(&mut self, text: &str) {
        let frame = match serde_json::from_str::<InboundFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "ignoring malformed frame");
                return;
            }
        };

        match frame {
            InboundFrame::Message { content } => {
                let content = content.trim();
                if content.is_empty() {
                    debug!("ignoring empty message");
                    return;
                }
                self.enqueue(content.to_string()).await;
            }
            InboundFrame::VoiceStart => self.start_voice().await,
            InboundFrame::VoiceStop => self.stop_voice().await,
            InboundFrame::ObsConnect { port, password } => {
                let params = ConnectParams::new(
                    self.state.obs_host.clone(),
                    port.unwrap_or(self.state.obs_port),
                    password,
                );
                info!(address = %params.address(), "connecting to obs");
                let target = self.target.clone();
                self.connecting = Some(Box::pin(async move { target.connect(params).await }));
            }
        }
    }

    async fn enqueue(&mut self, text: String) {
        if self.pending.len() >= self.state.max_pending {
            warn!(pending = self.pending.len(), "dropping message, queue is full");
            self.send(OutboundFrame::error(
                "Too many messages are waiting. Try again when the current reply is done.",
            ))
            .await;
            return;
        }
        self.pending.push_back(text);
    }

    async fn start_next(&mut self) {
        let Some(text) = self.pending.pop_front() else {
            return;
        };

        let state = &self.state;
        let target = &self.target;
        let agent = self.agent.get_or_insert_with(|| {
            Agent::new(state.provider.clone(), state.registry.clone(), target.clone())
                .with_config(state.agent)
        });
        let submitted = agent.submit(text);

        self.send(OutboundFrame::StreamStart).await;
        match submitted {
            Ok(stream) => self.active = Some(stream),
            Err(e) => {
                self.send(OutboundFrame::error(e.to_string())).await;
                self.send(OutboundFrame::StreamEnd).await;
            }
        }
    }

    async fn handle_event(&mut self, event: Option<AgentResult<AgentEvent>>) {
        match event {
            Some(Ok(AgentEvent::Delta(content))) => {
                self.send(OutboundFrame::StreamDelta { content }).await;
            }
            Some(Ok(AgentEvent::ToolInvoked { name, result, .. })) => {
                debug!(tool = %name, ok = result.is_ok(), "tool finished");
            }
            Some(Ok(AgentEvent::End)) | None => {
                self.active = None;
                self.send(OutboundFrame::StreamEnd).await;
            }
            Some(Err(e)) => {
                self.active = None;
                self.send(OutboundFrame::error(e.to_string())).await;
                self.send(OutboundFrame::StreamEnd).await;
            }
        }
    }

    async fn handle_status(&mut self, status: ConnectionStatus) {
        let connected = match status.state {
            ConnectionState::Connecting => return,
            ConnectionState::Connected => true,
            ConnectionState::Disconnected => false,
        };
        self.send(OutboundFrame::ObsStatus {
            connected,
            message: status.message,
        })
        .await;
    }

    async fn start_voice(&mut self) {
        if self.segments.is_some() {
            self.send(OutboundFrame::VoiceStatus { listening: true }).await;
            return;
        }

        let Some(factory) = self.state.voice.clone() else {
            self.send(OutboundFrame::error(
                "Voice input is not configured. Set PILOT_VOICE__COMMAND to a transcriber.",
            ))
            .await;
            self.send(OutboundFrame::VoiceStatus { listening: false }).await;
            return;
        };

        let mut source = factory();
        let (tx, rx) = mpsc::unbounded_channel();
        match source.start(tx) {
            Ok(()) => {
                info!("voice capture started");
                self.transcriber = Some(source);
                self.segments = Some(rx);
                self.send(OutboundFrame::VoiceStatus { listening: true }).await;
            }
            Err(e) => {
                warn!(error = %e, "could not start voice capture");
                self.send(OutboundFrame::error(format!("Could not start voice input: {}", e)))
                    .await;
                self.send(OutboundFrame::VoiceStatus { listening: false }).await;
            }
        }
    }

    fn release_voice(&mut self) {
        if let Some(mut source) = self.transcriber.take() {
            source.stop();
        }
        self.segments = None;
    }

    async fn stop_voice(&mut self) {
        self.release_voice();
        self.send(OutboundFrame::VoiceStatus { listening: false }).await;
    }

    async fn handle_segment(&mut self, segment: Option<String>) {
        let Some(segment) = segment else {
            info!("transcriber stopped on its own");
            self.release_voice();
            self.send(OutboundFrame::VoiceStatus { listening: false }).await;
            return;
        };
        let Some(text) = clean_segment(&segment) else {
            return;
        };

        let command = match &self.state.wake_word {
            Some(wake) => match wake.command(&text) {
                Some(command) => command,
                None => {
                    debug!(%text, word = wake.word(), "ignoring segment without wake word");
                    return;
                }
            },
            None => text.clone(),
        };

        self.send(OutboundFrame::Transcription { content: text }).await;
        self.enqueue(command).await;
    }

    async fn shutdown(&mut self) {
        // dropping the stream cancels the generation and releases the agent
        self.active = None;
        self.connecting = None;
        self.pending.clear();
        self.release_voice();
        self.target.disconnect().await;
        info!("channel closed");
    }
}
