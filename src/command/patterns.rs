//! Control-word matching
//!
//! Wake, stop and back words are matched as whole words on accent-folded,
//! lowercased text, so "Escuta!" and "silencio" match their configured forms.

use regex::Regex;

use crate::config::DispatcherConfig;
use crate::text::transcript_key;
use crate::{Error, Result};

/// Control word found in a transcript, in admission priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlWord {
    Wake,
    Stop,
    Back,
}

/// Compiled control-word patterns
#[derive(Debug, Clone)]
pub struct ControlPatterns {
    wake: Regex,
    stop: Regex,
    back: Regex,
}

fn word_pattern(kind: &str, words: &[String]) -> Result<Regex> {
    let alternation = words
        .iter()
        .map(|w| transcript_key(w))
        .filter(|w| !w.is_empty())
        .map(|w| regex::escape(&w))
        .collect::<Vec<_>>()
        .join("|");
    if alternation.is_empty() {
        return Err(Error::Config(format!("no {kind} words configured")));
    }

    Regex::new(&format!(r"\b(?:{alternation})\b"))
        .map_err(|e| Error::Config(format!("invalid {kind} words: {e}")))
}

impl ControlPatterns {
    /// Compile the dispatcher's word lists
    ///
    /// # Errors
    ///
    /// Returns error if a list is empty or cannot be compiled
    pub fn new(config: &DispatcherConfig) -> Result<Self> {
        Ok(Self {
            wake: word_pattern("wake", &config.wake_words)?,
            stop: word_pattern("stop", &config.stop_words)?,
            back: word_pattern("back", &config.back_words)?,
        })
    }

    /// First control word present, checked wake, then stop, then back
    #[must_use]
    pub fn detect(&self, text: &str) -> Option<ControlWord> {
        let key = transcript_key(text);
        if self.wake.is_match(&key) {
            Some(ControlWord::Wake)
        } else if self.stop.is_match(&key) {
            Some(ControlWord::Stop)
        } else if self.back.is_match(&key) {
            Some(ControlWord::Back)
        } else {
            None
        }
    }
}
