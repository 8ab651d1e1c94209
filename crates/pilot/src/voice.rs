//! Transcription sources: something that listens and yields recognized text.
use tokio::sync::mpsc;

pub mod command;
pub mod wake;

pub use command::CommandTranscriber;
pub use wake::WakeWord;

pub trait TranscriptionSource: Send {
    /// Begin capturing. Each recognized segment is sent on `segments`; the
    /// sender is dropped when the source stops on its own.
    fn start(&mut self, segments: mpsc::UnboundedSender<String>) -> anyhow::Result<()>;

    fn stop(&mut self);

    fn is_listening(&self) -> bool;
}

/// Trim a raw segment, dropping blanks and recognizer annotations like `[BLANK_AUDIO]`.
pub fn clean_segment(raw: &str) -> Option<String> {
    let text = raw.trim();
    if text.is_empty() || text.starts_with('[') || (text.starts_with('(') && text.ends_with(')')) {
        return None;
    }
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_segment() {
        assert_eq!(clean_segment("  hide capture six \n"), Some("hide capture six".into()));
        assert_eq!(clean_segment("   "), None);
        assert_eq!(clean_segment("[BLANK_AUDIO]"), None);
        assert_eq!(clean_segment("(keyboard clicking)"), None);
        assert_eq!(clean_segment("start (the) recording"), Some("start (the) recording".into()));
    }
}
