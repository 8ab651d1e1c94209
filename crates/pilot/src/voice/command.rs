use std::process::Stdio;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{clean_segment, TranscriptionSource};

/// Runs an external recognizer and treats every stdout line as one segment.
///
/// The child is killed when capture stops or the transcriber is dropped.
pub struct CommandTranscriber {
    program: String,
    args: Vec<String>,
    task: Option<JoinHandle<()>>,
}

impl CommandTranscriber {
    pub fn new<S: Into<String>>(program: S, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            task: None,
        }
    }
}

impl TranscriptionSource for CommandTranscriber {
    fn start(&mut self, segments: mpsc::UnboundedSender<String>) -> Result<()> {
        if self.is_listening() {
            bail!("Transcriber is already running");
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start transcriber '{}'", self.program))?;
        let stdout = child
            .stdout
            .take()
            .context("Transcriber stdout was not captured")?;
        info!(program = %self.program, "transcriber started");

        let program = self.program.clone();
        self.task = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(segment) = clean_segment(&line) else {
                            continue;
                        };
                        debug!(%segment, "heard");
                        if segments.send(segment).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "failed reading transcriber output");
                        break;
                    }
                }
            }
            match child.try_wait() {
                Ok(Some(status)) => info!(%program, %status, "transcriber exited"),
                _ => debug!(%program, "transcriber output closed"),
            }
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            // the task owns the child, so aborting it kills the process
            task.abort();
            info!(program = %self.program, "transcriber stopped");
        }
    }

    fn is_listening(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for CommandTranscriber {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn shell(script: &str) -> CommandTranscriber {
        CommandTranscriber::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_stdout_lines_become_segments() {
        let mut source = shell("echo 'obs show webcam'; echo ''; echo '[BLANK_AUDIO]'; echo 'hide capture six'");
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.start(tx).unwrap();

        let mut heard = Vec::new();
        while let Ok(Some(segment)) = timeout(Duration::from_secs(5), rx.recv()).await {
            heard.push(segment);
        }
        assert_eq!(heard, vec!["obs show webcam", "hide capture six"]);
    }

    #[tokio::test]
    async fn test_stop_ends_capture() {
        let mut source = shell("echo ready; sleep 30");
        let (tx, mut rx) = mpsc::unbounded_channel();
        source.start(tx).unwrap();
        assert_eq!(
            timeout(Duration::from_secs(5), rx.recv()).await.unwrap(),
            Some("ready".to_string())
        );
        assert!(source.is_listening());

        source.stop();
        assert!(!source.is_listening());
        // the sender went away with the aborted task
        assert_eq!(timeout(Duration::from_secs(5), rx.recv()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let mut source = CommandTranscriber::new("definitely-not-a-transcriber", vec![]);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(source.start(tx).is_err());
        assert!(!source.is_listening());
    }
}
