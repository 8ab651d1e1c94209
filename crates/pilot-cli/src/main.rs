mod chat;
mod supervisor;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

use crate::chat::Endpoint;
use crate::supervisor::Supervisor;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the backend, print its channel address and keep it running
    Launch {
        /// Path to the pilotd binary
        #[arg(long)]
        backend: Option<PathBuf>,
    },
    /// Send commands to the backend from the terminal
    Chat {
        /// Channel address of a running backend; one is launched when omitted
        #[arg(long)]
        url: Option<String>,

        /// Path to the pilotd binary
        #[arg(long)]
        backend: Option<PathBuf>,

        /// Seconds to wait between reconnect attempts
        #[arg(long, default_value_t = 2)]
        retry_secs: u64,
    },
}

/// Prefer a pilotd installed next to this binary, then whatever is on PATH.
fn backend_path(explicit: Option<PathBuf>) -> PathBuf {
    let name = format!("pilotd{}", std::env::consts::EXE_SUFFIX);
    explicit.unwrap_or_else(|| {
        std::env::current_exe()
            .ok()
            .map(|exe| exe.with_file_name(&name))
            .filter(|candidate| candidate.exists())
            .unwrap_or_else(|| PathBuf::from(&name))
    })
}

async fn launch(backend: PathBuf) -> Result<()> {
    let mut supervisor = Supervisor::new(backend);
    supervisor.start().await?;
    if let Some(url) = supervisor.url() {
        println!("{}", url);
    }

    tokio::select! {
        status = supervisor.wait() => {
            bail!("Backend exited ({})", status?);
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("{}", style("stopping backend").dim());
            supervisor.stop().await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Launch { backend } => launch(backend_path(backend)).await,
        Command::Chat {
            url,
            backend,
            retry_secs,
        } => {
            let endpoint = match url {
                Some(url) => Endpoint::Fixed(url),
                None => Endpoint::Supervised(Supervisor::new(backend_path(backend))),
            };
            chat::run(endpoint, Duration::from_secs(retry_secs)).await
        }
    }
}
