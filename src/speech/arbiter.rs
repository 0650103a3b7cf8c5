//! Speech arbiter
//!
//! Sole owner of the native recognizer and synthesizer. Every consumer starts,
//! stops and speaks through a [`SpeechArbiter`] handle; native callbacks come
//! back in through [`SpeechArbiter::on_native_event`].
//!
//! Locking rule: the state mutex is never held while calling a provider,
//! a listener or a speech continuation, so any of those may call back into
//! the arbiter.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use super::echo::{EchoFilter, SpokenEchoFilter};
use super::prompts::PromptFilter;
use super::provider::{
    NativeEvent, RecognitionErrorKind, RecognitionEvent, RecognitionOptions, RecognitionProvider,
    SynthesisEvent, SynthesisProvider, UtteranceId,
};
use super::state::{EngineState, PermissionState, RecognitionMode};
use crate::config::ArbiterConfig;
use crate::dedup::DuplicateWindow;
use crate::text::transcript_key;
use crate::{Error, Result};

/// Global (wake-word) transcript listener
pub type TranscriptListener = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// Exclusive local-mode callback: `(text, is_final)`
pub type LocalCallback = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// Continuation run once when an utterance completes
pub type SpeechCallback = Box<dyn FnOnce(SpeechOutcome) + Send>;

/// Handle returned by [`SpeechArbiter::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Identifies the owner of a local recognition session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalSessionId(u64);

/// How an utterance ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Played to the end
    Done,
    /// Interrupted by `stop_speaking` or a newer utterance
    Stopped,
    /// Synthesis failed
    Failed,
}

/// Result of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Native start issued
    Started,
    /// Already recognizing; only the mode was updated
    AlreadyActive,
    /// Too soon after the previous start; retried when the interval elapses
    Deferred,
}

/// Options for [`SpeechArbiter::speak`]
#[derive(Default)]
pub struct SpeakOptions {
    pause_recognition: bool,
    on_done: Option<SpeechCallback>,
}

impl SpeakOptions {
    /// Stop recognition while speaking and resume it afterwards
    #[must_use]
    pub const fn pause_recognition(mut self) -> Self {
        self.pause_recognition = true;
        self
    }

    /// Run `f` once the utterance completes, whatever the outcome
    #[must_use]
    pub fn on_done(mut self, f: impl FnOnce(SpeechOutcome) + Send + 'static) -> Self {
        self.on_done = Some(Box::new(f));
        self
    }
}

/// Future resolving when an utterance completes
#[derive(Debug)]
pub struct SpeechHandle {
    utterance: UtteranceId,
    rx: oneshot::Receiver<SpeechOutcome>,
}

impl SpeechHandle {
    /// Utterance id passed to the synthesizer
    #[must_use]
    pub const fn utterance(&self) -> UtteranceId {
        self.utterance
    }
}

impl Future for SpeechHandle {
    type Output = SpeechOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(SpeechOutcome::Stopped))
    }
}

/// Where an accepted final transcript goes, resolved once per result
enum DeliveryTarget {
    Local(LocalCallback),
    Global(Vec<(ListenerId, TranscriptListener)>),
}

struct PendingUtterance {
    id: UtteranceId,
    text: String,
    on_done: Option<SpeechCallback>,
    done_tx: oneshot::Sender<SpeechOutcome>,
    /// Mode to resume once speech completes (recognition was paused)
    resume: Option<RecognitionMode>,
}

impl PendingUtterance {
    fn finish(self, outcome: SpeechOutcome) {
        let _ = self.done_tx.send(outcome);
        if let Some(on_done) = self.on_done {
            if catch_unwind(AssertUnwindSafe(|| on_done(outcome))).is_err() {
                tracing::warn!(utterance = self.id, "speech continuation panicked");
            }
        }
    }
}

struct ArbiterState {
    permission: PermissionState,
    is_recognizing: bool,
    is_speaking: bool,
    is_enabled: bool,
    mode: Option<RecognitionMode>,
    local: Option<(LocalSessionId, LocalCallback)>,
    consecutive_errors: u32,
    last_start: Option<Instant>,
    last_end: Option<Instant>,
    last_error: Option<Instant>,
    /// Set when we asked the recognizer to stop; consumed by the next `End`
    intentional_stop: bool,
    /// Set when an error already scheduled the restart; consumed by the next `End`
    recovering: bool,
    listeners: Vec<(ListenerId, TranscriptListener)>,
    next_id: u64,
    echo: Box<dyn EchoFilter>,
    recent: DuplicateWindow,
    recent_cleaned: DuplicateWindow,
    last_interim: Option<String>,
    utterance: Option<PendingUtterance>,
    /// Bumped whenever a scheduled start becomes obsolete
    start_generation: u64,
}

impl ArbiterState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn snapshot(&self) -> EngineState {
        EngineState {
            is_recognizing: self.is_recognizing,
            is_speaking: self.is_speaking,
            is_enabled: self.is_enabled,
            current_mode: self.mode,
            permission: self.permission,
            consecutive_error_count: self.consecutive_errors,
            last_start: self.last_start,
            last_end: self.last_end,
            last_error: self.last_error,
        }
    }

    /// Mark the session as stopped on purpose
    fn halt(&mut self) {
        self.intentional_stop = true;
        self.recovering = false;
        self.is_recognizing = false;
        self.start_generation += 1;
    }
}

struct Inner {
    recognizer: Arc<dyn RecognitionProvider>,
    synthesizer: Arc<dyn SynthesisProvider>,
    config: ArbiterConfig,
    prompts: PromptFilter,
    state: Mutex<ArbiterState>,
}

/// Shared handle to the process-wide speech engine
///
/// Scheduled restarts are spawned on the current Tokio runtime.
#[derive(Clone)]
pub struct SpeechArbiter {
    inner: Arc<Inner>,
}

impl SpeechArbiter {
    /// Create an arbiter with the default echo strategy
    ///
    /// # Errors
    ///
    /// Returns error if the prompt fragments cannot be compiled
    pub fn new(
        recognizer: Arc<dyn RecognitionProvider>,
        synthesizer: Arc<dyn SynthesisProvider>,
        config: ArbiterConfig,
    ) -> Result<Self> {
        let echo = Box::new(SpokenEchoFilter::new(config.echo_ttl));
        Self::with_echo_filter(recognizer, synthesizer, config, echo)
    }

    /// Create an arbiter with a custom echo strategy
    ///
    /// # Errors
    ///
    /// Returns error if the prompt fragments cannot be compiled
    pub fn with_echo_filter(
        recognizer: Arc<dyn RecognitionProvider>,
        synthesizer: Arc<dyn SynthesisProvider>,
        config: ArbiterConfig,
        echo: Box<dyn EchoFilter>,
    ) -> Result<Self> {
        let prompts = PromptFilter::new(&config.prompt_fragments)?;
        let state = ArbiterState {
            permission: PermissionState::Unknown,
            is_recognizing: false,
            is_speaking: false,
            is_enabled: false,
            mode: None,
            local: None,
            consecutive_errors: 0,
            last_start: None,
            last_end: None,
            last_error: None,
            intentional_stop: false,
            recovering: false,
            listeners: Vec::new(),
            next_id: 0,
            echo,
            recent: DuplicateWindow::new(config.duplicate_window),
            recent_cleaned: DuplicateWindow::new(config.secondary_duplicate_window),
            last_interim: None,
            utterance: None,
            start_generation: 0,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                recognizer,
                synthesizer,
                config,
                prompts,
                state: Mutex::new(state),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ArbiterState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Read-only snapshot of the engine state
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.lock().snapshot()
    }

    /// Arbiter configuration
    #[must_use]
    pub fn config(&self) -> &ArbiterConfig {
        &self.inner.config
    }

    // -- permissions and master switch -------------------------------------

    /// Ask the platform for microphone permission
    ///
    /// A refusal (or a failed prompt) blocks every start until this is
    /// called again and succeeds.
    pub async fn request_permissions(&self) -> bool {
        let granted = match self.inner.recognizer.request_permissions().await {
            Ok(granted) => granted,
            Err(e) => {
                tracing::warn!(error = %e, "permission request failed");
                false
            }
        };

        self.lock().permission = if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        };
        tracing::info!(granted, "microphone permission");
        granted
    }

    /// Turn the master switch on and start global listening after a settle delay
    pub fn enable(&self) {
        let idle = {
            let mut s = self.lock();
            s.is_enabled = true;
            !s.is_recognizing && !s.is_speaking
        };
        tracing::info!("voice engine enabled");

        if idle {
            self.schedule_start(
                self.inner.config.enable_settle,
                RecognitionMode::Global,
                true,
            );
        }
    }

    /// Turn the master switch off; nothing restarts until [`Self::enable`]
    pub fn disable(&self) {
        self.lock().is_enabled = false;
        tracing::info!("voice engine disabled");
        self.stop_recognition();
    }

    // -- recognition --------------------------------------------------------

    /// Start recognition in `mode`
    ///
    /// # Errors
    ///
    /// Returns error if permission is missing or the native start fails
    pub fn start_recognition(&self, mode: RecognitionMode) -> Result<StartOutcome> {
        self.start_inner(mode, false)
    }

    fn start_inner(&self, mode: RecognitionMode, require_enabled: bool) -> Result<StartOutcome> {
        let now = Instant::now();
        let deferred = {
            let mut s = self.lock();
            if s.permission != PermissionState::Granted {
                return Err(Error::Permission(
                    "microphone permission not granted".to_string(),
                ));
            }

            if s.is_recognizing {
                if s.mode != Some(mode) {
                    tracing::debug!(?mode, "switching recognition mode");
                    s.mode = Some(mode);
                    if mode == RecognitionMode::Global {
                        s.local = None;
                    }
                }
                return Ok(StartOutcome::AlreadyActive);
            }

            let interval = self.inner.config.min_restart_interval;
            match s.last_start.map(|last| now.duration_since(last)) {
                Some(elapsed) if elapsed < interval => Some(interval - elapsed),
                _ => {
                    s.last_start = Some(now);
                    s.start_generation += 1;
                    None
                }
            }
        };

        if let Some(remaining) = deferred {
            tracing::debug!(?mode, ?remaining, "start debounced");
            self.schedule_start(remaining, mode, require_enabled);
            return Ok(StartOutcome::Deferred);
        }

        let options = RecognitionOptions {
            language: self.inner.config.language.clone(),
            interim_results: mode == RecognitionMode::Local,
            continuous: mode == RecognitionMode::Global,
        };

        if let Err(e) = self.inner.recognizer.stop() {
            tracing::trace!(error = %e, "pre-start stop failed");
        }

        match self.inner.recognizer.start(&options) {
            Ok(()) => {
                let mut s = self.lock();
                s.is_recognizing = true;
                s.is_enabled = true;
                s.mode = Some(mode);
                s.intentional_stop = false;
                s.recovering = false;
                s.last_interim = None;
                drop(s);
                tracing::info!(?mode, "recognition started");
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                self.lock().last_error = Some(now);
                tracing::warn!(?mode, error = %e, "recognition start failed");
                Err(e)
            }
        }
    }

    /// Start a screen-owned local session delivering to `callback`
    ///
    /// # Errors
    ///
    /// Returns error if recognition cannot be started
    pub fn start_local(&self, callback: LocalCallback) -> Result<LocalSessionId> {
        let id = {
            let mut s = self.lock();
            let id = LocalSessionId(s.next_id());
            s.local = Some((id, callback));
            s.last_interim = None;
            if s.is_recognizing {
                s.mode = Some(RecognitionMode::Local);
            }
            id
        };

        if let Err(e) = self.start_recognition(RecognitionMode::Local) {
            let mut s = self.lock();
            if s.local.as_ref().is_some_and(|(owner, _)| *owner == id) {
                s.local = None;
            }
            return Err(e);
        }
        Ok(id)
    }

    /// Owner of the current local session, if local mode is active
    #[must_use]
    pub fn local_owner(&self) -> Option<LocalSessionId> {
        let s = self.lock();
        match (&s.local, s.mode) {
            (Some((id, _)), Some(RecognitionMode::Local)) => Some(*id),
            _ => None,
        }
    }

    /// End the local session owned by `id` and hand the microphone back to
    /// global listening
    ///
    /// Returns `false` (and does nothing) if `id` no longer owns local mode.
    pub fn release_local(&self, id: LocalSessionId) -> bool {
        if self.local_owner() != Some(id) {
            tracing::debug!(?id, "local session no longer owned, not stopping");
            return false;
        }

        self.stop_recognition();
        if self.lock().is_enabled {
            self.schedule_start(
                self.inner.config.post_pause_settle,
                RecognitionMode::Global,
                true,
            );
        }
        true
    }

    /// Stop recognition on purpose; no automatic restart follows
    pub fn stop_recognition(&self) {
        {
            let mut s = self.lock();
            s.halt();
            s.mode = None;
            s.local = None;
            s.last_interim = None;
            if let Some(utterance) = s.utterance.as_mut() {
                utterance.resume = None;
            }
        }
        tracing::debug!("recognition stopped");

        if let Err(e) = self.inner.recognizer.stop() {
            tracing::warn!(error = %e, "native stop failed");
        }
    }

    /// Register a global (wake-word mode) listener
    pub fn add_listener(&self, listener: TranscriptListener) -> ListenerId {
        let mut s = self.lock();
        let id = ListenerId(s.next_id());
        s.listeners.push((id, listener));
        id
    }

    /// Remove a global listener; returns `false` if it was not registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut s = self.lock();
        let before = s.listeners.len();
        s.listeners.retain(|(lid, _)| *lid != id);
        s.listeners.len() != before
    }

    // -- synthesis ------------------------------------------------------------

    /// Speak `text`
    ///
    /// The text is registered as potential echo before synthesis starts.
    /// Completion (done, stopped or failed) is reported exactly once, through
    /// both the returned handle and the optional continuation.
    pub fn speak(&self, text: &str, options: SpeakOptions) -> SpeechHandle {
        let now = Instant::now();
        let (done_tx, rx) = oneshot::channel();

        let (id, previous, paused) = {
            let mut s = self.lock();
            let id = s.next_id();
            s.echo.remember(text, now);

            let previous = s.utterance.take();
            let paused = options.pause_recognition && s.is_recognizing;
            let resume = if paused && s.is_enabled {
                s.mode
            } else {
                previous.as_ref().and_then(|p| p.resume)
            };
            if paused {
                s.halt();
            }

            s.is_speaking = true;
            s.utterance = Some(PendingUtterance {
                id,
                text: text.to_string(),
                on_done: options.on_done,
                done_tx,
                resume,
            });
            (id, previous, paused)
        };

        if let Some(previous) = previous {
            tracing::debug!(utterance = previous.id, "utterance superseded");
            if let Err(e) = self.inner.synthesizer.stop() {
                tracing::warn!(error = %e, "failed to stop previous utterance");
            }
            previous.finish(SpeechOutcome::Stopped);
        }

        if paused {
            tracing::debug!(utterance = id, "pausing recognition for speech");
            if let Err(e) = self.inner.recognizer.stop() {
                tracing::warn!(error = %e, "native stop failed");
            }
        }

        tracing::debug!(utterance = id, text, "speaking");
        if text.trim().is_empty() {
            self.complete_utterance(id, SpeechOutcome::Done);
        } else if let Err(e) = self.inner.synthesizer.speak(id, text) {
            tracing::warn!(utterance = id, error = %e, "synthesis failed to start");
            self.complete_utterance(id, SpeechOutcome::Failed);
        }

        SpeechHandle { utterance: id, rx }
    }

    /// Interrupt speech immediately and forget pending echo
    pub fn stop_speaking(&self) {
        if let Err(e) = self.inner.synthesizer.stop() {
            tracing::warn!(error = %e, "native synthesis stop failed");
        }

        let pending = {
            let mut s = self.lock();
            s.echo.clear();
            s.is_speaking = false;
            s.utterance.as_ref().map(|u| u.id)
        };

        if let Some(id) = pending {
            self.complete_utterance(id, SpeechOutcome::Stopped);
        }
    }

    /// Single completion path for an utterance; later calls for the same id
    /// are ignored
    fn complete_utterance(&self, id: UtteranceId, outcome: SpeechOutcome) {
        let now = Instant::now();
        let (utterance, restart) = {
            let mut s = self.lock();
            let Some(utterance) = s.utterance.take_if(|u| u.id == id) else {
                tracing::trace!(utterance = id, ?outcome, "ignoring stale completion");
                return;
            };

            s.is_speaking = false;
            if outcome != SpeechOutcome::Stopped {
                // echo may trail the end of playback
                s.echo.remember(&utterance.text, now);
            }

            let restart = if !s.is_enabled || s.is_recognizing {
                None
            } else if let Some(mode) = utterance.resume {
                Some((mode, self.inner.config.post_pause_settle))
            } else if s.mode == Some(RecognitionMode::Global) {
                Some((RecognitionMode::Global, self.inner.config.post_speech_settle))
            } else {
                None
            };
            (utterance, restart)
        };

        tracing::debug!(utterance = id, ?outcome, "speech complete");
        if let Some((mode, delay)) = restart {
            self.schedule_start(delay, mode, true);
        }
        utterance.finish(outcome);
    }

    // -- native events ------------------------------------------------------

    /// Feed one native callback into the arbiter
    pub fn on_native_event(&self, event: NativeEvent) {
        match event {
            NativeEvent::Recognition(event) => self.on_recognition_event(event),
            NativeEvent::Synthesis(event) => self.on_synthesis_event(event),
        }
    }

    /// Consume native events until the channel closes
    pub async fn drive(&self, mut events: mpsc::UnboundedReceiver<NativeEvent>) {
        while let Some(event) = events.recv().await {
            self.on_native_event(event);
        }
        tracing::debug!("native event channel closed");
    }

    /// Native recognizer callback
    pub fn on_recognition_event(&self, event: RecognitionEvent) {
        match event {
            // the error count survives a native start; only accepted speech resets it
            RecognitionEvent::Start => self.lock().is_recognizing = true,
            RecognitionEvent::End => self.handle_end(),
            RecognitionEvent::Error { kind, message } => self.handle_error(kind, &message),
            RecognitionEvent::Result {
                transcript,
                is_final: true,
            } => self.handle_result(&transcript),
            RecognitionEvent::Result {
                transcript,
                is_final: false,
            } => self.handle_interim(&transcript),
        }
    }

    /// Native synthesizer callback
    pub fn on_synthesis_event(&self, event: SynthesisEvent) {
        match event {
            SynthesisEvent::Done(id) => self.complete_utterance(id, SpeechOutcome::Done),
            SynthesisEvent::Stopped(id) => self.complete_utterance(id, SpeechOutcome::Stopped),
            SynthesisEvent::Error { utterance, message } => {
                tracing::warn!(utterance, error = %message, "synthesis error");
                self.complete_utterance(utterance, SpeechOutcome::Failed);
            }
        }
    }

    fn handle_end(&self) {
        let now = Instant::now();
        let restart = {
            let mut s = self.lock();
            if s
                .last_end
                .is_some_and(|last| now.duration_since(last) < self.inner.config.end_debounce)
            {
                tracing::trace!("ignoring re-entrant end");
                return;
            }
            s.last_end = Some(now);
            s.is_recognizing = false;

            if s.intentional_stop {
                s.intentional_stop = false;
                tracing::debug!("session ended on request");
                return;
            }
            if s.recovering {
                s.recovering = false;
                tracing::debug!("session ended after error, restart already scheduled");
                return;
            }

            s.permission == PermissionState::Granted
                && s.is_enabled
                && !s.is_speaking
                && s.mode == Some(RecognitionMode::Global)
        };

        if restart {
            tracing::debug!("session ended, restarting global listening");
            self.schedule_start(
                self.inner.config.auto_restart_delay,
                RecognitionMode::Global,
                true,
            );
        }
    }

    fn handle_error(&self, kind: RecognitionErrorKind, message: &str) {
        let now = Instant::now();
        let plan = {
            let mut s = self.lock();
            s.last_error = Some(now);
            s.is_recognizing = false;

            if kind == RecognitionErrorKind::Permission {
                s.permission = PermissionState::Denied;
                drop(s);
                tracing::warn!(error = message, "recognition permission revoked");
                return;
            }

            if s.intentional_stop || !s.is_enabled {
                tracing::debug!(?kind, error = message, "recognition error after stop");
                return;
            }

            s.recovering = true;
            let mode = s.mode.unwrap_or(RecognitionMode::Global);
            if kind.is_transient() {
                (mode, self.inner.config.transient_restart_delay, None)
            } else {
                s.consecutive_errors += 1;
                (mode, self.backoff(s.consecutive_errors), Some(s.consecutive_errors))
            }
        };

        let (mode, delay, count) = plan;
        match count {
            None => tracing::debug!(?kind, error = message, ?delay, "transient recognition error"),
            Some(count) => {
                tracing::warn!(
                    ?kind,
                    error = message,
                    count,
                    ?delay,
                    "recognition error, backing off"
                );
            }
        }
        self.schedule_start(delay, mode, true);
    }

    /// Linear backoff for the `count`th consecutive error, capped
    fn backoff(&self, count: u32) -> Duration {
        self.inner
            .config
            .error_backoff_step
            .saturating_mul(count)
            .min(self.inner.config.max_error_backoff)
    }

    fn handle_result(&self, transcript: &str) {
        let text = transcript.trim();
        if text.is_empty() {
            return;
        }

        let cleaned = self.inner.prompts.clean(text);
        let key = transcript_key(&cleaned);
        if key.is_empty() {
            tracing::debug!(transcript = text, "transcript was only system prompt");
            return;
        }

        let now = Instant::now();
        let target = {
            let mut s = self.lock();
            if s.recent.check_and_record(&key, now) {
                tracing::debug!(transcript = %cleaned, "duplicate final dropped");
                return;
            }
            if s.recent_cleaned.check_and_record(&cleaned, now) {
                tracing::debug!(transcript = %cleaned, "duplicate final dropped (secondary)");
                return;
            }
            if let Some(echo) = s.echo.check(&key, now) {
                tracing::debug!(transcript = %cleaned, ?echo, "echo suppressed");
                return;
            }

            s.consecutive_errors = 0;
            match (&s.local, s.mode) {
                (Some((_, callback)), Some(RecognitionMode::Local)) => {
                    DeliveryTarget::Local(Arc::clone(callback))
                }
                _ => DeliveryTarget::Global(s.listeners.clone()),
            }
        };

        match target {
            DeliveryTarget::Local(callback) => {
                tracing::debug!(transcript = %cleaned, "delivering to local session");
                if catch_unwind(AssertUnwindSafe(|| callback(&cleaned, true))).is_err() {
                    tracing::warn!("local callback panicked");
                }
            }
            DeliveryTarget::Global(listeners) => {
                tracing::debug!(
                    transcript = %cleaned,
                    listeners = listeners.len(),
                    "delivering to global listeners"
                );
                for (id, listener) in listeners {
                    match catch_unwind(AssertUnwindSafe(|| listener(&cleaned))) {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::warn!(?id, error = %e, "listener failed"),
                        Err(_) => tracing::warn!(?id, "listener panicked"),
                    }
                }
            }
        }
    }

    fn handle_interim(&self, transcript: &str) {
        let (callback, cleaned) = {
            let mut s = self.lock();
            if s.mode != Some(RecognitionMode::Local) {
                return;
            }
            let Some((_, callback)) = &s.local else {
                return;
            };
            let callback = Arc::clone(callback);

            let cleaned = self.inner.prompts.clean(transcript);
            if cleaned.is_empty() || s.last_interim.as_deref() == Some(cleaned.as_str()) {
                return;
            }
            s.last_interim = Some(cleaned.clone());
            (callback, cleaned)
        };

        if catch_unwind(AssertUnwindSafe(|| callback(&cleaned, false))).is_err() {
            tracing::warn!("local callback panicked on interim result");
        }
    }

    // -- scheduling -----------------------------------------------------------

    /// Start `mode` after `delay` unless something newer supersedes it
    fn schedule_start(&self, delay: Duration, mode: RecognitionMode, require_enabled: bool) {
        let generation = {
            let mut s = self.lock();
            s.start_generation += 1;
            s.start_generation
        };

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Self { inner }.run_scheduled_start(generation, mode, require_enabled);
            }
        });
    }

    fn run_scheduled_start(&self, generation: u64, mode: RecognitionMode, require_enabled: bool) {
        {
            let s = self.lock();
            if s.start_generation != generation {
                tracing::trace!(generation, "scheduled start superseded");
                return;
            }
            if s.is_recognizing {
                return;
            }
            if require_enabled && (!s.is_enabled || s.is_speaking) {
                tracing::trace!(?mode, "scheduled start skipped");
                return;
            }
        }

        let Err(e) = self.start_inner(mode, require_enabled) else {
            return;
        };

        // a failed restart counts as a persistent error and is retried
        let delay = {
            let mut s = self.lock();
            if s.permission != PermissionState::Granted || !s.is_enabled {
                drop(s);
                tracing::warn!(?mode, error = %e, "scheduled start failed, not retrying");
                return;
            }
            s.consecutive_errors += 1;
            let count = s.consecutive_errors;
            drop(s);
            let delay = self.backoff(count);
            tracing::warn!(?mode, error = %e, count, ?delay, "scheduled start failed, backing off");
            delay
        };
        self.schedule_start(delay, mode, require_enabled);
    }
}
