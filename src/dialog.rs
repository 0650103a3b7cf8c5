//! Dialog-scoped recognition
//!
//! A per-screen façade over the [`SpeechArbiter`]. In local mode the screen
//! drives it explicitly and gets the transcript of its own session; in global
//! mode it follows an `enabled` flag and the engine's master switch and
//! mirrors the engine state for presentation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::Result;
use crate::config::DialogConfig;
use crate::speech::{
    LocalCallback, LocalSessionId, RecognitionMode, SpeakOptions, SpeechArbiter, SpeechHandle,
    SpeechOutcome,
};

/// Receives accumulated dictation once the speaker pauses
pub type CommitCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct DialogState {
    finals: Vec<String>,
    interim: Option<String>,
    session: Option<LocalSessionId>,
    /// Global mode only: last mirrored engine flags
    is_listening: bool,
    is_speaking: bool,
    enabled: bool,
    /// Bumped on every final so only the last one arms the commit
    commit_generation: u64,
}

impl DialogState {
    fn text(&self) -> String {
        let mut parts: Vec<&str> = self.finals.iter().map(String::as_str).collect();
        if let Some(interim) = &self.interim {
            parts.push(interim);
        }
        parts.join(" ")
    }
}

fn lock(state: &Mutex<DialogState>) -> MutexGuard<'_, DialogState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Recognition hook owned by one screen
pub struct DialogRecognition {
    arbiter: SpeechArbiter,
    config: DialogConfig,
    mode: RecognitionMode,
    state: Arc<Mutex<DialogState>>,
    commit: Option<CommitCallback>,
    poller: Option<JoinHandle<()>>,
}

impl DialogRecognition {
    /// Hook for a screen running its own recognition session
    ///
    /// Nothing starts until [`Self::start_listening`] is called.
    #[must_use]
    pub fn local(arbiter: SpeechArbiter, config: DialogConfig) -> Self {
        Self {
            arbiter,
            config,
            mode: RecognitionMode::Local,
            state: Arc::new(Mutex::new(DialogState::default())),
            commit: None,
            poller: None,
        }
    }

    /// Hook following global listening
    ///
    /// Starts recognition when `enabled` and the engine's master switch are
    /// both on, and mirrors engine state every poll interval. Must be called
    /// within a Tokio runtime.
    #[must_use]
    pub fn global(arbiter: SpeechArbiter, config: DialogConfig, enabled: bool) -> Self {
        let state = Arc::new(Mutex::new(DialogState::default()));
        let poller = tokio::spawn(mirror_engine_state(
            arbiter.clone(),
            Arc::downgrade(&state),
            config.clone(),
        ));

        let hook = Self {
            arbiter,
            config,
            mode: RecognitionMode::Global,
            state,
            commit: None,
            poller: Some(poller),
        };
        hook.set_enabled(enabled);
        hook
    }

    /// Commit accumulated local dictation after the configured silence window
    #[must_use]
    pub fn with_commit(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.commit = Some(Arc::new(callback));
        self
    }

    /// Mode this hook was created for
    #[must_use]
    pub const fn mode(&self) -> RecognitionMode {
        self.mode
    }

    /// Turn the global hook on or off
    ///
    /// Turning it on starts global listening if the master switch is on and
    /// the engine is idle; turning it off stops global listening. Ignored in
    /// local mode.
    pub fn set_enabled(&self, enabled: bool) {
        if self.mode != RecognitionMode::Global {
            return;
        }
        lock(&self.state).enabled = enabled;

        let engine = self.arbiter.state();
        if enabled {
            if engine.is_enabled && !engine.is_recognizing && !engine.is_speaking {
                if let Err(e) = self.arbiter.start_recognition(RecognitionMode::Global) {
                    tracing::warn!(error = %e, "dialog could not start global listening");
                }
            }
        } else if engine.is_recognizing && engine.current_mode == Some(RecognitionMode::Global) {
            self.arbiter.stop_recognition();
        }
    }

    /// Start listening
    ///
    /// In local mode this opens a session owned by this hook and clears the
    /// previous transcript.
    ///
    /// # Errors
    ///
    /// Returns error if recognition cannot be started
    pub fn start_listening(&self) -> Result<()> {
        if self.mode == RecognitionMode::Global {
            self.arbiter.start_recognition(RecognitionMode::Global)?;
            return Ok(());
        }

        {
            let mut s = lock(&self.state);
            s.finals.clear();
            s.interim = None;
            s.commit_generation += 1;
        }

        let session = self.arbiter.start_local(self.transcript_callback())?;
        lock(&self.state).session = Some(session);
        tracing::debug!(?session, "dialog listening");
        Ok(())
    }

    fn transcript_callback(&self) -> LocalCallback {
        let state = Arc::downgrade(&self.state);
        let commit = self.commit.clone();
        let window = self.config.commit_window;

        Arc::new(move |text: &str, is_final: bool| {
            let Some(state) = state.upgrade() else {
                return;
            };

            let generation = {
                let mut s = lock(&state);
                if !is_final {
                    s.interim = Some(text.to_string());
                    return;
                }
                s.finals.push(text.to_string());
                s.interim = None;
                s.commit_generation += 1;
                s.commit_generation
            };

            let Some(commit) = commit.clone() else {
                return;
            };
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                tracing::warn!("no runtime for dictation commit");
                return;
            };
            let weak = Arc::downgrade(&state);
            runtime.spawn(async move {
                tokio::time::sleep(window).await;
                let Some(state) = weak.upgrade() else {
                    return;
                };
                let text = {
                    let mut s = lock(&state);
                    if s.commit_generation != generation {
                        return;
                    }
                    let text = s.text();
                    s.finals.clear();
                    s.interim = None;
                    text
                };
                if !text.is_empty() {
                    tracing::debug!(text = %text, "committing dictation");
                    commit(&text);
                }
            });
        })
    }

    /// Stop listening
    ///
    /// In local mode only this hook's own session is stopped.
    pub fn stop_listening(&self) {
        match self.mode {
            RecognitionMode::Local => self.release(),
            RecognitionMode::Global => self.arbiter.stop_recognition(),
        }
    }

    fn release(&self) {
        let session = {
            let mut s = lock(&self.state);
            s.commit_generation += 1;
            s.session.take()
        };
        if let Some(session) = session {
            self.arbiter.release_local(session);
        }
    }

    /// Speak, pausing recognition for the duration
    pub fn speak(&self, text: &str) -> SpeechHandle {
        self.arbiter
            .speak(text, SpeakOptions::default().pause_recognition())
    }

    /// Speak and run `on_done` once playback completes
    pub fn speak_then(
        &self,
        text: &str,
        on_done: impl FnOnce(SpeechOutcome) + Send + 'static,
    ) -> SpeechHandle {
        self.arbiter.speak(
            text,
            SpeakOptions::default().pause_recognition().on_done(on_done),
        )
    }

    pub fn stop_speaking(&self) {
        self.arbiter.stop_speaking();
    }

    /// Final transcripts so far followed by the current interim hypothesis
    #[must_use]
    pub fn recognized_text(&self) -> String {
        lock(&self.state).text()
    }

    /// Forget the accumulated transcript
    pub fn clear_text(&self) {
        let mut s = lock(&self.state);
        s.finals.clear();
        s.interim = None;
        s.commit_generation += 1;
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        match self.mode {
            RecognitionMode::Local => {
                let session = lock(&self.state).session;
                session.is_some()
                    && self.arbiter.local_owner() == session
                    && self.arbiter.state().is_recognizing
            }
            RecognitionMode::Global => lock(&self.state).is_listening,
        }
    }

    #[must_use]
    pub fn is_speaking(&self) -> bool {
        match self.mode {
            RecognitionMode::Local => self.arbiter.state().is_speaking,
            RecognitionMode::Global => lock(&self.state).is_speaking,
        }
    }
}

impl Drop for DialogRecognition {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        if self.mode == RecognitionMode::Local {
            self.release();
        }
    }
}

/// Copy engine flags into the hook state until the hook is dropped
async fn mirror_engine_state(
    arbiter: SpeechArbiter,
    state: Weak<Mutex<DialogState>>,
    config: DialogConfig,
) {
    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(state) = state.upgrade() else {
            break;
        };

        let engine = arbiter.state();
        let mut s = lock(&state);
        s.is_listening = s.enabled && engine.is_recognizing;
        s.is_speaking = engine.is_speaking;
    }
}
