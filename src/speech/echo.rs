//! Echo suppression: transcripts that are the device hearing itself

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::text::transcript_key;

/// Texts shorter than this (in chars) are also compared by similarity
const SHORT_TEXT_CHARS: usize = 20;

/// Similarity above which a short transcript is treated as echo
const SIMILARITY_THRESHOLD: f32 = 0.9;

/// Why a transcript was classified as echo
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EchoMatch {
    /// Exact member of the recently spoken set
    Exact,
    /// Near match against the last spoken text
    Similar(f32),
}

/// Strategy deciding whether a transcript is synthesized-speech echo
pub trait EchoFilter: Send {
    /// Register text that is about to be (or was just) spoken
    fn remember(&mut self, text: &str, now: Instant);

    /// Check a normalized transcript key against recently spoken text
    fn check(&mut self, key: &str, now: Instant) -> Option<EchoMatch>;

    /// Forget everything (speech was interrupted)
    fn clear(&mut self);
}

/// Expiry policy: short utterances expire faster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoTtl {
    pub base: Duration,
    pub per_char: Duration,
    pub max: Duration,
}

impl Default for EchoTtl {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1500),
            per_char: Duration::from_millis(50),
            max: Duration::from_millis(8000),
        }
    }
}

impl EchoTtl {
    /// Time-to-live for a key of `chars` characters
    #[must_use]
    pub fn for_len(&self, chars: usize) -> Duration {
        let chars = u32::try_from(chars).unwrap_or(u32::MAX);
        self.base
            .saturating_add(self.per_char.saturating_mul(chars))
            .min(self.max)
    }
}

/// Exact-match cache plus a similarity heuristic on the last spoken text
#[derive(Debug)]
pub struct SpokenEchoFilter {
    entries: HashMap<String, Instant>,
    last_spoken: Option<(String, Instant)>,
    ttl: EchoTtl,
}

impl SpokenEchoFilter {
    #[must_use]
    pub fn new(ttl: EchoTtl) -> Self {
        Self {
            entries: HashMap::new(),
            last_spoken: None,
            ttl,
        }
    }

    fn insert(&mut self, key: String, now: Instant) {
        let expiry = now + self.ttl.for_len(key.chars().count());
        let slot = self.entries.entry(key).or_insert(expiry);
        *slot = (*slot).max(expiry);
    }

    fn purge(&mut self, now: Instant) {
        self.entries.retain(|_, expiry| *expiry > now);
        if self.last_spoken.as_ref().is_some_and(|(_, expiry)| *expiry <= now) {
            self.last_spoken = None;
        }
    }
}

impl Default for SpokenEchoFilter {
    fn default() -> Self {
        Self::new(EchoTtl::default())
    }
}

impl EchoFilter for SpokenEchoFilter {
    fn remember(&mut self, text: &str, now: Instant) {
        let key = transcript_key(text);
        if key.is_empty() {
            return;
        }

        // recognizers often return a single sentence of a longer prompt
        let sentences: Vec<String> = text
            .split(['.', '!', '?', ';'])
            .map(transcript_key)
            .filter(|s| !s.is_empty() && *s != key)
            .collect();
        for sentence in sentences {
            self.insert(sentence, now);
        }

        let expiry = now + self.ttl.for_len(key.chars().count());
        self.insert(key.clone(), now);
        self.last_spoken = Some((key, expiry));
    }

    fn check(&mut self, key: &str, now: Instant) -> Option<EchoMatch> {
        self.purge(now);

        if self.entries.contains_key(key) {
            return Some(EchoMatch::Exact);
        }

        if key.chars().count() < SHORT_TEXT_CHARS {
            if let Some((spoken, _)) = &self.last_spoken {
                let score = similarity(key, spoken);
                if score > SIMILARITY_THRESHOLD {
                    return Some(EchoMatch::Similar(score));
                }
            }
        }

        None
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.last_spoken = None;
    }
}

/// Cheap similarity: containment scores 0.9, otherwise the share of the
/// longer string's characters matched by the shorter one
#[must_use]
pub fn similarity(a: &str, b: &str) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    if longer.contains(shorter) {
        return 0.9;
    }

    let mut pool: HashMap<char, usize> = HashMap::new();
    for c in longer.chars() {
        *pool.entry(c).or_default() += 1;
    }
    let mut matched = 0usize;
    for c in shorter.chars() {
        if let Some(n) = pool.get_mut(&c) {
            if *n > 0 {
                *n -= 1;
                matched += 1;
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let ratio = matched as f32 / longer.chars().count() as f32;
    ratio
}
