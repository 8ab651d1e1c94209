use std::io::Write;
use std::time::Duration;

use anyhow::{anyhow, Result};
use console::style;
use futures::{SinkExt, StreamExt};
use pilot::protocol::{InboundFrame, OutboundFrame};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::supervisor::Supervisor;

const HELP: &str = "\
Type a command for OBS, or:
  /connect [port] [password]   connect the backend to OBS (port defaults to 4455)
  /voice on|off                start or stop voice input
  /restart                     restart the backend (only when launched from here)
  /quit                        leave";

/// Where the channel lives
pub enum Endpoint {
    Fixed(String),
    Supervised(Supervisor),
}

impl Endpoint {
    async fn url(&mut self) -> Result<String> {
        match self {
            Endpoint::Fixed(url) => Ok(url.clone()),
            Endpoint::Supervised(supervisor) => {
                supervisor.start().await?;
                supervisor
                    .url()
                    .ok_or_else(|| anyhow!("Backend has no address"))
            }
        }
    }

    async fn restart(&mut self) -> Result<()> {
        match self {
            Endpoint::Supervised(supervisor) => {
                let port = supervisor.restart().await?;
                eprintln!("{}", style(format!("backend restarted on port {}", port)).dim());
            }
            Endpoint::Fixed(_) => {
                eprintln!("{}", style("the backend was not launched by this session").yellow())
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        if let Endpoint::Supervised(supervisor) = self {
            supervisor.stop().await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Send(InboundFrame),
    Restart,
    Quit,
    Help,
    Nothing,
    Unknown(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Nothing;
    }
    if line.eq_ignore_ascii_case("exit") {
        return Input::Quit;
    }
    if !line.starts_with('/') {
        return Input::Send(InboundFrame::Message {
            content: line.to_string(),
        });
    }

    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();
    match (command, args.as_slice()) {
        ("/quit" | "/exit", _) => Input::Quit,
        ("/help", _) => Input::Help,
        ("/restart", _) => Input::Restart,
        ("/voice", ["on" | "start"]) => Input::Send(InboundFrame::VoiceStart),
        ("/voice", ["off" | "stop"]) => Input::Send(InboundFrame::VoiceStop),
        ("/connect", args) => {
            let (port, rest) = match args.first().map(|a| a.parse::<u16>()) {
                Some(Ok(port)) => (Some(port), &args[1..]),
                _ => (None, args),
            };
            Input::Send(InboundFrame::ObsConnect {
                port,
                password: rest.join(" "),
            })
        }
        _ => Input::Unknown(line.to_string()),
    }
}

/// Terminal text for a frame. Deltas are printed as they come, without newlines.
pub fn render(frame: &OutboundFrame) -> String {
    match frame {
        OutboundFrame::StreamStart => format!("{} ", style("pilot>").cyan().bold()),
        OutboundFrame::StreamDelta { content } => content.clone(),
        OutboundFrame::StreamEnd => "\n".to_string(),
        OutboundFrame::Transcription { content } => {
            format!("{} {}\n", style("heard>").magenta(), content)
        }
        OutboundFrame::VoiceStatus { listening: true } => {
            format!("{}\n", style("listening...").dim())
        }
        OutboundFrame::VoiceStatus { listening: false } => {
            format!("{}\n", style("voice input off").dim())
        }
        OutboundFrame::ObsStatus {
            connected: true,
            message,
        } => format!("{}\n", style(message).green()),
        OutboundFrame::ObsStatus {
            connected: false,
            message,
        } => format!("{}\n", style(format!("OBS: {}", message)).red()),
        OutboundFrame::Error { content } => format!("{}\n", style(format!("error: {}", content)).red()),
    }
}

fn show(frame: &OutboundFrame) {
    let mut stdout = std::io::stdout().lock();
    let _ = write!(stdout, "{}", render(frame));
    let _ = stdout.flush();
}

/// Read lines from the terminal and talk to the backend until the user quits.
/// A lost connection is retried every `retry_delay`.
pub async fn run(mut endpoint: Endpoint, retry_delay: Duration) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!(
        "OBS pilot {}",
        style("- type /help for commands, /quit to leave").dim()
    );

    'session: loop {
        let url = endpoint.url().await?;
        let socket = match connect_async(url.as_str()).await {
            Ok((socket, _)) => socket,
            Err(e) => {
                eprintln!(
                    "{}",
                    style(format!("could not reach {} ({}), retrying", url, e)).dim()
                );
                tokio::select! {
                    _ = tokio::time::sleep(retry_delay) => continue 'session,
                    line = lines.next_line() => match line?.map(|l| parse_input(&l)) {
                        None | Some(Input::Quit) => break 'session,
                        Some(Input::Restart) => endpoint.restart().await?,
                        Some(_) => eprintln!("{}", style("not connected yet").yellow()),
                    },
                }
                continue 'session;
            }
        };
        debug!(%url, "connected");
        let (mut sink, mut stream) = socket.split();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break 'session;
                    };
                    match parse_input(&line) {
                        Input::Nothing => {}
                        Input::Quit => break 'session,
                        Input::Help => println!("{}", HELP),
                        Input::Unknown(command) => {
                            eprintln!("{}", style(format!("unknown command {}, try /help", command)).yellow())
                        }
                        Input::Restart => {
                            endpoint.restart().await?;
                            continue 'session;
                        }
                        Input::Send(frame) => {
                            let text = serde_json::to_string(&frame)?;
                            if sink.send(Message::Text(text)).await.is_err() {
                                eprintln!("{}", style("connection lost, reconnecting").yellow());
                                continue 'session;
                            }
                        }
                    }
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<OutboundFrame>(&text) {
                        Ok(frame) => show(&frame),
                        Err(e) => debug!(error = %e, "unreadable frame"),
                    },
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        eprintln!("{}", style("connection lost, reconnecting").yellow());
                        tokio::time::sleep(retry_delay).await;
                        continue 'session;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    endpoint.shutdown().await
}
