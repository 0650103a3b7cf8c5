//! Speech engine
//!
//! The [`SpeechArbiter`] owns the recognizer/synthesizer pair; everything
//! else in this module is policy it applies to native events.

mod arbiter;
mod echo;
mod prompts;
mod provider;
mod state;

pub use arbiter::{
    ListenerId, LocalCallback, LocalSessionId, SpeakOptions, SpeechArbiter, SpeechCallback,
    SpeechHandle, SpeechOutcome, StartOutcome, TranscriptListener,
};
pub use echo::{EchoFilter, EchoMatch, EchoTtl, SpokenEchoFilter, similarity};
pub use prompts::PromptFilter;
pub use provider::{
    NativeEvent, RecognitionErrorKind, RecognitionEvent, RecognitionOptions, RecognitionProvider,
    SynthesisEvent, SynthesisProvider, UtteranceId,
};
pub use state::{EngineState, PermissionState, RecognitionMode};
