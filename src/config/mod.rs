//! Configuration management for the voice engine

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Result;
use crate::speech::EchoTtl;
use file::LumenConfigFile;

/// Voice engine configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Speech arbiter timing and filtering
    pub arbiter: ArbiterConfig,

    /// Wake-word dispatcher vocabulary and windows
    pub dispatcher: DispatcherConfig,

    /// Dialog-scoped recognition
    pub dialog: DialogConfig,

    /// Intent classifier
    pub classifier: ClassifierConfig,
}

/// Speech arbiter configuration
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Recognition language passed to the native recognizer
    pub language: String,

    /// Minimum time between two native starts
    pub min_restart_interval: Duration,

    /// End events closer than this to the previous one are ignored
    pub end_debounce: Duration,

    /// Delay before restarting global listening after a natural end
    pub auto_restart_delay: Duration,

    /// Delay before `enable()` starts global listening
    pub enable_settle: Duration,

    /// Delay before re-listening after speech that did not pause recognition
    pub post_speech_settle: Duration,

    /// Delay before re-listening after speech that paused recognition
    pub post_pause_settle: Duration,

    /// Restart delay after a transient recognizer error
    pub transient_restart_delay: Duration,

    /// Linear backoff step per consecutive persistent error
    pub error_backoff_step: Duration,

    /// Backoff cap
    pub max_error_backoff: Duration,

    /// Primary duplicate-final window (normalized text)
    pub duplicate_window: Duration,

    /// Secondary duplicate-final window (cleaned text)
    pub secondary_duplicate_window: Duration,

    /// Echo cache expiry policy
    pub echo_ttl: EchoTtl,

    /// Phrases the app speaks that are stripped from transcripts
    pub prompt_fragments: Vec<String>,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            language: "pt-BR".to_string(),
            min_restart_interval: Duration::from_millis(500),
            end_debounce: Duration::from_millis(500),
            auto_restart_delay: Duration::from_millis(300),
            enable_settle: Duration::from_millis(300),
            post_speech_settle: Duration::from_millis(300),
            post_pause_settle: Duration::from_millis(800),
            transient_restart_delay: Duration::from_millis(1000),
            error_backoff_step: Duration::from_millis(1000),
            max_error_backoff: Duration::from_millis(10_000),
            duplicate_window: Duration::from_millis(1000),
            secondary_duplicate_window: Duration::from_millis(2000),
            echo_ttl: EchoTtl::default(),
            prompt_fragments: [
                "estou ouvindo",
                "pode falar",
                "diga escuta",
                "diga um comando",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// Wake-word dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Words that wake the dispatcher (or reset it while listening)
    pub wake_words: Vec<String>,

    /// Words that cancel speech and return to waiting for the wake word
    pub stop_words: Vec<String>,

    /// Words that navigate back
    pub back_words: Vec<String>,

    /// Identical transcripts closer than this are dropped
    pub duplicate_transcript_window: Duration,

    /// The same intent executed twice within this window runs once
    pub duplicate_intent_window: Duration,

    /// Upper bound between admitting a command and returning to idle
    pub completion_window: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            wake_words: ["escuta", "escute"].map(String::from).to_vec(),
            stop_words: ["pare", "parar", "cancela", "cancelar", "silêncio"]
                .map(String::from)
                .to_vec(),
            back_words: ["voltar", "volta", "volte"].map(String::from).to_vec(),
            duplicate_transcript_window: Duration::from_millis(2000),
            duplicate_intent_window: Duration::from_millis(5000),
            completion_window: Duration::from_millis(3500),
        }
    }
}

/// Dialog hook configuration
#[derive(Debug, Clone)]
pub struct DialogConfig {
    /// How often the hook mirrors arbiter state
    pub poll_interval: Duration,

    /// Silence after the last final transcript before dictation is committed
    pub commit_window: Duration,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            commit_window: Duration::from_millis(1500),
        }
    }
}

/// Classifier configuration
#[derive(Debug, Clone, Default)]
pub struct ClassifierConfig {
    /// Model file replacing the embedded model
    pub model_path: Option<PathBuf>,
}

fn millis(value: Option<u64>, default: Duration) -> Duration {
    value.map_or(default, Duration::from_millis)
}

impl Config {
    /// Load configuration from the standard config file path
    ///
    /// A missing or unreadable file yields defaults; `LUMEN_MODEL_PATH` and
    /// `LUMEN_LANGUAGE` override the file.
    #[must_use]
    pub fn load() -> Self {
        Self::from_file_config(file::load_config_file()).with_env_overrides()
    }

    /// Load configuration from an explicit file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load_from(path: &Path) -> Result<Self> {
        let fc = file::read_config_file(path)?;
        Ok(Self::from_file_config(fc).with_env_overrides())
    }

    /// Overlay a parsed config file on top of the defaults
    #[must_use]
    pub fn from_file_config(fc: LumenConfigFile) -> Self {
        let a = ArbiterConfig::default();
        let fa = fc.arbiter;
        let echo_ttl = EchoTtl {
            base: millis(fa.echo_base_ttl_ms, a.echo_ttl.base),
            per_char: millis(fa.echo_ttl_per_char_ms, a.echo_ttl.per_char),
            max: millis(fa.echo_max_ttl_ms, a.echo_ttl.max),
        };
        let arbiter = ArbiterConfig {
            language: fa.language.unwrap_or(a.language),
            min_restart_interval: millis(fa.min_restart_interval_ms, a.min_restart_interval),
            end_debounce: millis(fa.end_debounce_ms, a.end_debounce),
            auto_restart_delay: millis(fa.auto_restart_delay_ms, a.auto_restart_delay),
            enable_settle: millis(fa.enable_settle_ms, a.enable_settle),
            post_speech_settle: millis(fa.post_speech_settle_ms, a.post_speech_settle),
            post_pause_settle: millis(fa.post_pause_settle_ms, a.post_pause_settle),
            transient_restart_delay: millis(
                fa.transient_restart_delay_ms,
                a.transient_restart_delay,
            ),
            error_backoff_step: millis(fa.error_backoff_step_ms, a.error_backoff_step),
            max_error_backoff: millis(fa.max_error_backoff_ms, a.max_error_backoff),
            duplicate_window: millis(fa.duplicate_window_ms, a.duplicate_window),
            secondary_duplicate_window: millis(
                fa.secondary_duplicate_window_ms,
                a.secondary_duplicate_window,
            ),
            echo_ttl,
            prompt_fragments: fa.prompt_fragments.unwrap_or(a.prompt_fragments),
        };

        let d = DispatcherConfig::default();
        let fd = fc.dispatcher;
        let dispatcher = DispatcherConfig {
            wake_words: fd.wake_words.unwrap_or(d.wake_words),
            stop_words: fd.stop_words.unwrap_or(d.stop_words),
            back_words: fd.back_words.unwrap_or(d.back_words),
            duplicate_transcript_window: millis(
                fd.duplicate_transcript_window_ms,
                d.duplicate_transcript_window,
            ),
            duplicate_intent_window: millis(
                fd.duplicate_intent_window_ms,
                d.duplicate_intent_window,
            ),
            completion_window: millis(fd.completion_window_ms, d.completion_window),
        };

        let g = DialogConfig::default();
        let dialog = DialogConfig {
            poll_interval: millis(fc.dialog.poll_interval_ms, g.poll_interval),
            commit_window: millis(fc.dialog.commit_window_ms, g.commit_window),
        };

        let classifier = ClassifierConfig {
            model_path: fc.classifier.model_path.map(PathBuf::from),
        };

        Self {
            arbiter,
            dispatcher,
            dialog,
            classifier,
        }
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("LUMEN_MODEL_PATH") {
            self.classifier.model_path = Some(PathBuf::from(path));
        }
        if let Ok(language) = std::env::var("LUMEN_LANGUAGE") {
            self.arbiter.language = language;
        }
        self
    }
}
