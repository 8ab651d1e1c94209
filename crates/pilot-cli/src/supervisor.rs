use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info};

/// How long a backend may take to announce its port
pub const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Parse the backend's one-shot readiness line, `PORT=<number>`.
pub fn parse_port_announcement(line: &str) -> Option<u16> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^PORT=(\d+)$").expect("valid pattern"));
    pattern
        .captures(line.trim())
        .and_then(|captures| captures[1].parse().ok())
        .filter(|port| *port != 0)
}

/// Launches the backend, learns its address and restarts it on request.
/// A backend that dies is reported, never restarted on its own.
pub struct Supervisor {
    program: PathBuf,
    args: Vec<String>,
    ready_timeout: Duration,
    child: Option<Child>,
    port: Option<u16>,
}

impl Supervisor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: vec!["--port".to_string(), "0".to_string()],
            ready_timeout: READY_TIMEOUT,
            child: None,
            port: None,
        }
    }

    /// Replace the arguments passed to the backend
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Channel address of the running backend
    pub fn url(&self) -> Option<String> {
        self.port.map(|port| format!("ws://127.0.0.1:{}/ws/chat", port))
    }

    pub async fn start(&mut self) -> Result<u16> {
        if let Some(port) = self.port {
            return Ok(port);
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start backend {}", self.program.display()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Backend stdout was not captured"))?;
        let mut lines = BufReader::new(stdout).lines();

        let announced = timeout(self.ready_timeout, async {
            while let Some(line) = lines.next_line().await? {
                match parse_port_announcement(&line) {
                    Some(port) => return Ok(Some(port)),
                    None => debug!(target: "backend", "{}", line),
                }
            }
            Ok::<_, std::io::Error>(None)
        })
        .await;

        let port = match announced {
            Ok(Ok(Some(port))) => port,
            Ok(Ok(None)) => {
                let status = child.wait().await?;
                bail!("Backend exited ({}) before announcing its port", status);
            }
            Ok(Err(e)) => return Err(e).context("Failed reading backend output"),
            Err(_) => {
                let _ = child.kill().await;
                bail!(
                    "Backend did not announce its port within {:?}",
                    self.ready_timeout
                );
            }
        };

        // keep draining so the backend never blocks on a full pipe
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "backend", "{}", line);
            }
        });

        info!(port, "backend ready");
        self.child = Some(child);
        self.port = Some(port);
        Ok(port)
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.port = None;
        if let Some(mut child) = self.child.take() {
            if child.try_wait()?.is_none() {
                child.kill().await.context("Failed to stop backend")?;
            }
            info!("backend stopped");
        }
        Ok(())
    }

    /// Stop the backend and start a fresh one. Returns the new port.
    pub async fn restart(&mut self) -> Result<u16> {
        self.stop().await?;
        self.start().await
    }

    /// Wait for the backend to exit on its own.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| anyhow!("Backend is not running"))?;
        let status = child.wait().await?;
        self.child = None;
        self.port = None;
        Ok(status)
    }
}
