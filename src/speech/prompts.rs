//! Removal of phrases the app itself speaks from transcripts

use regex::{Regex, RegexBuilder};

use crate::text::collapse_whitespace;
use crate::{Error, Result};

/// Strips known system-prompt fragments on word boundaries
#[derive(Debug, Clone)]
pub struct PromptFilter {
    pattern: Option<Regex>,
}

impl PromptFilter {
    /// Build a filter for the given fragments (case-insensitive)
    ///
    /// # Errors
    ///
    /// Returns error if the combined pattern cannot be compiled
    pub fn new(fragments: &[String]) -> Result<Self> {
        let mut fragments: Vec<&str> = fragments
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect();
        if fragments.is_empty() {
            return Ok(Self { pattern: None });
        }

        // longest first so "pode falar agora" wins over "pode falar"
        fragments.sort_by_key(|f| std::cmp::Reverse(f.chars().count()));
        let alternation = fragments
            .iter()
            .map(|f| regex::escape(f))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = RegexBuilder::new(&format!(r"\b(?:{alternation})\b"))
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Config(format!("invalid prompt fragment: {e}")))?;

        Ok(Self {
            pattern: Some(pattern),
        })
    }

    /// Remove every fragment and collapse the remaining whitespace
    #[must_use]
    pub fn clean(&self, text: &str) -> String {
        match &self.pattern {
            Some(pattern) => collapse_whitespace(&pattern.replace_all(text, " ")),
            None => collapse_whitespace(text),
        }
    }
}
