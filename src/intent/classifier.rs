//! Utterance -> intent inference

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::IntentModel;
use crate::text::{fold_accents, strip_punctuation};
use crate::{Error, Result};

/// Reserved label for utterances the model cannot place
pub const OUT_OF_SCOPE: &str = "out_of_scope";

/// Below this probability the prediction is reported as not understood
pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.35;

/// Tokens are runs of two or more word characters
static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("valid regex"));

/// Outcome of a single classification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Class label, or [`OUT_OF_SCOPE`]
    pub intent: String,

    /// Probability of the arg-max class, in `[0, 1]`
    pub confidence: f32,

    /// True when `intent` was forced to [`OUT_OF_SCOPE`]
    pub not_understood: bool,
}

impl PredictionResult {
    fn fallback() -> Self {
        Self {
            intent: OUT_OF_SCOPE.to_string(),
            confidence: 0.0,
            not_understood: true,
        }
    }
}

/// Linear text classifier over TF-IDF features
///
/// Classification is pure and never fails: any inconsistency in the model is
/// reported as an [`OUT_OF_SCOPE`] result with zero confidence.
#[derive(Debug, Clone)]
pub struct IntentClassifier {
    model: IntentModel,
}

impl IntentClassifier {
    /// Wrap a model without validating it
    #[must_use]
    pub const fn new(model: IntentModel) -> Self {
        Self { model }
    }

    /// Classifier over the bundled model
    ///
    /// # Errors
    ///
    /// Returns error if the bundled model is malformed
    pub fn embedded() -> Result<Self> {
        let model = IntentModel::embedded()?;
        model.validate()?;
        Ok(Self::new(model))
    }

    /// Classifier over a model file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be loaded or fails validation
    pub fn from_path(path: &Path) -> Result<Self> {
        let model = IntentModel::load(path)?;
        model.validate()?;
        Ok(Self::new(model))
    }

    /// Class labels known to the model
    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.model.classes
    }

    /// Classify an utterance
    #[must_use]
    pub fn classify(&self, text: &str) -> PredictionResult {
        match self.predict(text) {
            Ok((class, confidence)) if confidence >= LOW_CONFIDENCE_THRESHOLD => {
                PredictionResult {
                    intent: self.model.classes[class].clone(),
                    confidence,
                    not_understood: false,
                }
            }
            Ok((class, confidence)) => {
                tracing::debug!(
                    text,
                    best = %self.model.classes[class],
                    confidence,
                    "low confidence prediction"
                );
                PredictionResult {
                    intent: OUT_OF_SCOPE.to_string(),
                    confidence,
                    not_understood: true,
                }
            }
            Err(e) => {
                tracing::warn!(text, error = %e, "classification failed");
                PredictionResult::fallback()
            }
        }
    }

    /// Arg-max class index and its probability
    fn predict(&self, text: &str) -> Result<(usize, f32)> {
        let features = self.features(text)?;
        let scores = self.scores(&features)?;
        let probabilities = softmax(&scores);

        let (class, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or_else(|| Error::Model("no classes".to_string()))?;

        if class >= self.model.classes.len() || !confidence.is_finite() {
            return Err(Error::Model(format!("invalid prediction for class {class}")));
        }

        Ok((class, confidence.clamp(0.0, 1.0)))
    }

    fn normalize(&self, text: &str) -> String {
        let mut text = if self.model.lowercase {
            text.to_lowercase()
        } else {
            text.to_string()
        };
        if self.model.strip_accents {
            text = fold_accents(&text);
        }
        strip_punctuation(&text)
    }

    fn ngrams(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = TOKEN.find_iter(text).map(|m| m.as_str()).collect();
        let (min_n, max_n) = self.model.ngram_range;

        let mut grams = Vec::new();
        for n in min_n.max(1)..=max_n {
            grams.extend(words.windows(n).map(|w| w.join(" ")));
        }
        grams
    }

    /// Sparse, L2-normalized TF-IDF vector as `(column, weight)` pairs
    fn features(&self, text: &str) -> Result<Vec<(usize, f32)>> {
        if self.model.vocabulary.is_empty() {
            return Err(Error::Model("empty vocabulary".to_string()));
        }

        let mut counts: BTreeMap<usize, f32> = BTreeMap::new();
        for gram in self.ngrams(&self.normalize(text)) {
            if let Some(&column) = self.model.vocabulary.get(&gram) {
                *counts.entry(column).or_default() += 1.0;
            }
        }

        let mut features = Vec::with_capacity(counts.len());
        for (column, tf) in counts {
            let idf = self
                .model
                .idf
                .get(column)
                .ok_or_else(|| Error::Model(format!("no idf for column {column}")))?;
            let tf = if self.model.sublinear_tf { 1.0 + tf.ln() } else { tf };
            features.push((column, tf * idf));
        }

        let norm = features.iter().map(|(_, w)| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, w) in &mut features {
                *w /= norm;
            }
        }

        Ok(features)
    }

    /// Raw per-class decision values
    fn scores(&self, features: &[(usize, f32)]) -> Result<Vec<f32>> {
        let mut rows = Vec::with_capacity(self.model.coef.len());
        for (row, weights) in self.model.coef.iter().enumerate() {
            let intercept = self
                .model
                .intercept
                .get(row)
                .ok_or_else(|| Error::Model(format!("no intercept for row {row}")))?;
            let mut score = *intercept;
            for &(column, value) in features {
                let weight = weights.get(column).ok_or_else(|| {
                    Error::Model(format!("row {row} has no weight for column {column}"))
                })?;
                score += weight * value;
            }
            if !score.is_finite() {
                return Err(Error::Model(format!("non-finite score for row {row}")));
            }
            rows.push(score);
        }

        if self.model.is_binary() {
            return Ok(vec![0.0, rows[0]]);
        }
        if rows.len() != self.model.classes.len() || rows.is_empty() {
            return Err(Error::Model(format!(
                "{} score rows for {} classes",
                rows.len(),
                self.model.classes.len()
            )));
        }
        Ok(rows)
    }
}

/// Softmax with the maximum subtracted before exponentiating
fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
