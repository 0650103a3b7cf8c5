//! Engine state shared with consumers as read-only snapshots

use tokio::time::Instant;

/// Who receives final transcripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionMode {
    /// Continuous background listening, fanned out to wake-word listeners
    Global,
    /// Screen-owned session, delivered to one exclusive callback
    Local,
}

/// Microphone permission as last reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// Snapshot of the arbiter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineState {
    pub is_recognizing: bool,
    pub is_speaking: bool,
    /// Master switch; when false nothing restarts recognition automatically
    pub is_enabled: bool,
    pub current_mode: Option<RecognitionMode>,
    pub permission: PermissionState,
    pub consecutive_error_count: u32,
    pub last_start: Option<Instant>,
    pub last_end: Option<Instant>,
    pub last_error: Option<Instant>,
}
