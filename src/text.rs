//! Text normalization shared by the classifier and the speech arbiter

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

/// Drop diacritics: canonical decomposition, then remove combining marks
#[must_use]
pub fn fold_accents(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Replace every punctuation character with a space
#[must_use]
pub fn strip_punctuation(text: &str) -> String {
    PUNCTUATION.replace_all(text, " ").into_owned()
}

/// Collapse whitespace runs into single spaces and trim both ends
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical comparison key for a transcript or a spoken text
///
/// Lowercased, accent-folded, punctuation removed and whitespace collapsed,
/// so "Vai para o Histórico!" and "vai para o historico" share a key.
#[must_use]
pub fn transcript_key(text: &str) -> String {
    collapse_whitespace(&strip_punctuation(&fold_accents(&text.to_lowercase())))
}
