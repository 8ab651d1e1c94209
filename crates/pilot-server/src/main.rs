mod configuration;
mod error;
mod gateway;
mod routes;
mod state;

use std::io::Write;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::configuration::Settings;
use crate::state::AppState;

/// Backend for the OBS pilot: serves session channels over WebSocket
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Port to listen on; 0 picks a free one
    #[arg(long)]
    port: Option<u16>,
}

/// Tell the launcher where we listen. stdout carries nothing else.
fn announce_port(port: u16) -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "PORT={}", port)?;
    stdout.flush()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut settings = Settings::new()?;
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    let listener = TcpListener::bind(settings.server.bind_address()).await?;
    let address = listener.local_addr()?;

    let state = AppState::from_settings(settings)?;
    let app = routes::configure(state);

    announce_port(address.port())?;
    info!("listening on {}", address);
    axum::serve(listener, app).await?;
    Ok(())
}
