//! Native speech provider seams
//!
//! The platform recognizer and synthesizer are driven through these traits;
//! their callbacks come back into the arbiter as [`NativeEvent`]s.

use async_trait::async_trait;

use crate::Result;

/// Identifies one call to [`SynthesisProvider::speak`]
pub type UtteranceId = u64;

/// Options passed to the native recognizer on start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// BCP-47 language tag (e.g. "pt-BR")
    pub language: String,

    /// Emit non-final hypotheses while the user is speaking
    pub interim_results: bool,

    /// Keep the session open across pauses
    pub continuous: bool,
}

/// Platform speech recognizer
#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    /// Ask the user for microphone and recognition permission
    ///
    /// # Errors
    ///
    /// Returns error if the permission prompt could not be shown
    async fn request_permissions(&self) -> Result<bool>;

    /// Begin a recognition session
    ///
    /// # Errors
    ///
    /// Returns error if the native engine refuses to start
    fn start(&self, options: &RecognitionOptions) -> Result<()>;

    /// Request the current session to end; completion arrives as an `End` event
    ///
    /// # Errors
    ///
    /// Returns error if the native engine rejects the request
    fn stop(&self) -> Result<()>;
}

/// Platform text-to-speech engine
pub trait SynthesisProvider: Send + Sync {
    /// Start speaking `text`; completion arrives as a [`SynthesisEvent`]
    ///
    /// # Errors
    ///
    /// Returns error if synthesis cannot be started
    fn speak(&self, utterance: UtteranceId, text: &str) -> Result<()>;

    /// Interrupt any ongoing speech
    ///
    /// # Errors
    ///
    /// Returns error if the native engine rejects the request
    fn stop(&self) -> Result<()>;
}

/// Recognizer error classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    /// Session ended without any speech
    NoSpeech,
    /// Client-side failure, usually a stop/start race
    Client,
    Network,
    NetworkTimeout,
    SpeechTimeout,
    /// Recognizer service is busy with another session
    Busy,
    /// Audio capture failed
    Audio,
    Server,
    /// Permission missing or revoked
    Permission,
    Other,
}

impl RecognitionErrorKind {
    /// Map a platform error code (Android/iOS/web spellings) to a kind
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().replace('_', "-").as_str() {
            "no-speech" | "no-match" => Self::NoSpeech,
            "client" | "aborted" => Self::Client,
            "network" => Self::Network,
            "network-timeout" => Self::NetworkTimeout,
            "speech-timeout" => Self::SpeechTimeout,
            "busy" | "recognizer-busy" => Self::Busy,
            "audio" | "audio-capture" => Self::Audio,
            "server" | "service-not-allowed" => Self::Server,
            "not-allowed" | "permissions" | "insufficient-permissions" | "permission" => {
                Self::Permission
            }
            _ => Self::Other,
        }
    }

    /// Errors that are recovered by a quick silent restart
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::NoSpeech
                | Self::Client
                | Self::Network
                | Self::NetworkTimeout
                | Self::SpeechTimeout
        )
    }
}

/// Events emitted by the native recognizer
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    Start,
    End,
    Error {
        kind: RecognitionErrorKind,
        message: String,
    },
    Result {
        transcript: String,
        is_final: bool,
    },
}

/// Events emitted by the native synthesizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    Done(UtteranceId),
    Stopped(UtteranceId),
    Error {
        utterance: UtteranceId,
        message: String,
    },
}

/// Any native callback, for feeding the arbiter from a channel
#[derive(Debug, Clone, PartialEq)]
pub enum NativeEvent {
    Recognition(RecognitionEvent),
    Synthesis(SynthesisEvent),
}
