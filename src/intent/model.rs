//! Serialized intent model
//!
//! The JSON layout mirrors a TF-IDF vectorizer + logistic regression export:
//! vocabulary term -> column, idf per column, n-gram range, class labels,
//! one coefficient row per class and one intercept per row.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const EMBEDDED_MODEL: &str = include_str!("../../models/intent_model.json");

const fn default_true() -> bool {
    true
}

/// Static intent model, immutable once loaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentModel {
    /// Term (unigram or space-joined n-gram) to feature column
    pub vocabulary: HashMap<String, usize>,

    /// Inverse document frequency per feature column
    pub idf: Vec<f32>,

    /// Inclusive n-gram range
    pub ngram_range: (usize, usize),

    /// Lowercase input before tokenizing
    #[serde(default = "default_true")]
    pub lowercase: bool,

    /// Fold diacritics before tokenizing
    #[serde(default)]
    pub strip_accents: bool,

    /// Use `1 + ln(tf)` instead of raw term counts
    #[serde(default)]
    pub sublinear_tf: bool,

    /// Class labels, ordered as the coefficient rows
    pub classes: Vec<String>,

    /// Coefficients, `[class][column]`
    pub coef: Vec<Vec<f32>>,

    /// Intercept per coefficient row
    pub intercept: Vec<f32>,
}

impl IntentModel {
    /// Parse the model bundled with the crate
    ///
    /// # Errors
    ///
    /// Returns error if the bundled JSON is malformed
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED_MODEL)
    }

    /// Parse a model from JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the JSON does not match the model schema
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a model from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let model = Self::from_json(&content)?;
        tracing::debug!(
            path = %path.display(),
            terms = model.vocabulary.len(),
            classes = model.classes.len(),
            "loaded intent model"
        );
        Ok(model)
    }

    /// Number of feature columns
    #[must_use]
    pub fn width(&self) -> usize {
        self.idf.len()
    }

    /// True when the model stores a single decision row for two classes
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.classes.len() == 2 && self.coef.len() == 1
    }

    /// Check that every dimension of the model lines up
    ///
    /// # Errors
    ///
    /// Returns error describing the first inconsistency found
    pub fn validate(&self) -> Result<()> {
        if self.vocabulary.is_empty() {
            return Err(Error::Model("empty vocabulary".to_string()));
        }
        if self.idf.len() != self.vocabulary.len() {
            return Err(Error::Model(format!(
                "idf has {} entries for {} terms",
                self.idf.len(),
                self.vocabulary.len()
            )));
        }
        if let Some((term, index)) = self.vocabulary.iter().find(|(_, i)| **i >= self.width()) {
            return Err(Error::Model(format!("term {term:?} maps to column {index} out of range")));
        }

        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(Error::Model(format!("invalid ngram range ({min_n}, {max_n})")));
        }

        if self.classes.is_empty() {
            return Err(Error::Model("no classes".to_string()));
        }
        if self.coef.len() != self.classes.len() && !self.is_binary() {
            return Err(Error::Model(format!(
                "{} coefficient rows for {} classes",
                self.coef.len(),
                self.classes.len()
            )));
        }
        if self.intercept.len() != self.coef.len() {
            return Err(Error::Model(format!(
                "{} intercepts for {} coefficient rows",
                self.intercept.len(),
                self.coef.len()
            )));
        }
        if let Some(row) = self.coef.iter().position(|r| r.len() != self.width()) {
            return Err(Error::Model(format!(
                "coefficient row {row} has {} columns, expected {}",
                self.coef[row].len(),
                self.width()
            )));
        }

        let finite = self.idf.iter().chain(&self.intercept).all(|v| v.is_finite())
            && self.coef.iter().flatten().all(|v| v.is_finite());
        if !finite {
            return Err(Error::Model("non-finite weight".to_string()));
        }

        Ok(())
    }
}
