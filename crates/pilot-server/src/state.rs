use std::sync::Arc;

use anyhow::Result;
use pilot::agent::AgentConfig;
use pilot::obs::{ControlTarget, ObsClient};
use pilot::providers::{base::Provider, factory};
use pilot::tools::ToolRegistry;
use pilot::voice::{CommandTranscriber, TranscriptionSource, WakeWord};

use crate::configuration::Settings;

/// Builds the control target a new channel will own
pub type TargetFactory = Arc<dyn Fn() -> Arc<dyn ControlTarget> + Send + Sync>;

/// Builds the transcription source for a channel that starts listening
pub type VoiceFactory = Arc<dyn Fn() -> Box<dyn TranscriptionSource> + Send + Sync>;

/// Process-wide state shared by every channel. Nothing in here is mutable;
/// per-channel resources are created through the factories.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn Provider>,
    pub registry: Arc<ToolRegistry>,
    pub agent: AgentConfig,
    pub obs_host: String,
    pub obs_port: u16,
    pub targets: TargetFactory,
    pub voice: Option<VoiceFactory>,
    pub wake_word: Option<WakeWord>,
    pub max_pending: usize,
}

impl AppState {
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let provider: Arc<dyn Provider> = Arc::from(factory::get_provider(settings.provider.into_config())?);

        let connect_timeout = settings.obs.connect_timeout();
        let request_timeout = settings.obs.request_timeout();
        let targets: TargetFactory = Arc::new(move || {
            Arc::new(ObsClient::new(connect_timeout, request_timeout)) as Arc<dyn ControlTarget>
        });

        let voice = settings.voice.command.map(|program| {
            let args = settings.voice.args.clone();
            Arc::new(move || {
                Box::new(CommandTranscriber::new(program.clone(), args.clone()))
                    as Box<dyn TranscriptionSource>
            }) as VoiceFactory
        });

        let wake_word = settings
            .voice
            .wake_word
            .as_deref()
            .filter(|word| !word.trim().is_empty())
            .map(WakeWord::new)
            .transpose()?;

        Ok(Self {
            provider,
            registry: Arc::new(ToolRegistry::obs()),
            agent: AgentConfig {
                max_tool_rounds: settings.agent.max_tool_rounds,
            },
            obs_host: settings.obs.host,
            obs_port: settings.obs.port,
            targets,
            voice,
            wake_word,
            max_pending: settings.agent.max_pending,
        })
    }
}
