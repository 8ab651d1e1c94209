use anyhow::Result;
use regex::Regex;

/// Optional wake word: only "<word> <command>" segments are acted on.
#[derive(Debug, Clone)]
pub struct WakeWord {
    word: String,
    pattern: Regex,
}

impl WakeWord {
    pub fn new(word: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(r"(?i)\b{}[\s,.:!?]+(.+)", regex::escape(word.trim())))?;
        Ok(Self {
            word: word.trim().to_string(),
            pattern,
        })
    }

    pub fn word(&self) -> &str {
        &self.word
    }

    /// The command following the wake word, if the segment has one.
    pub fn command(&self, segment: &str) -> Option<String> {
        self.pattern
            .captures(segment.trim())
            .and_then(|captures| captures.get(1))
            .map(|command| command.as_str().trim().to_string())
            .filter(|command| !command.is_empty())
    }
}
