//! Lumen - voice interaction engine for screen-reader first mobile clients
//!
//! This library arbitrates one microphone/speaker pair between continuous
//! wake-word listening and screen-owned dialogs:
//! - Speech arbitration (echo suppression, auto-restart, listener fan-out)
//! - Dialog-scoped recognition for forms and modals
//! - Wake-word command state machine
//! - Embedded TF-IDF intent classifier
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │             Platform recognizer / synthesizer        │
//! └────────────────────┬────────────────────────────────┘
//!                      │ NativeEvent
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Speech Arbiter                      │
//! │   echo filter  │  dedup  │  restarts  │  routing     │
//! └──────────┬─────────────────────────────┬────────────┘
//!            │ local                       │ global
//! ┌──────────▼──────────┐     ┌────────────▼────────────┐
//! │  Dialog recognition │     │   Command dispatcher     │
//! └─────────────────────┘     │   classifier → actions   │
//!                             └─────────────────────────┘
//! ```

pub mod command;
pub mod config;
pub mod console;
pub mod dedup;
pub mod dialog;
pub mod error;
pub mod intent;
pub mod speech;
pub mod text;

pub use command::{AppActions, CommandDispatcher, ScreenHandlers, ScreenRegistry, VoiceState};
pub use config::Config;
pub use dialog::DialogRecognition;
pub use error::{Error, Result};
pub use intent::{Intent, IntentClassifier, PredictionResult};
pub use speech::{EngineState, RecognitionMode, SpeechArbiter};
