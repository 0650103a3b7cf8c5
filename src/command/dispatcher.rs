//! Wake-word command state machine
//!
//! ```text
//!   waiting_wake --"escuta" + ack played--> listening_command
//!        ^                                        |
//!        |              command admitted (busy)   |
//!        +---- reply played / stop / back / ------+
//!              wake reset / completion window
//! ```
//!
//! Every admitted command bumps an epoch. Continuations (speech completion,
//! the completion watchdog) carry the epoch they were created under and do
//! nothing once a newer transition has happened, so a cancelled command can
//! never clear the state of the one that replaced it.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::time::Instant;

use super::actions::{AppActions, Route, ScreenAction, ScreenRegistry, Theme};
use super::messages;
use super::patterns::{ControlPatterns, ControlWord};
use crate::config::DispatcherConfig;
use crate::dedup::DuplicateWindow;
use crate::intent::{Intent, IntentClassifier};
use crate::speech::{ListenerId, SpeakOptions, SpeechArbiter, SpeechOutcome};
use crate::text::transcript_key;
use crate::{Error, Result};

/// Listening state of the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    /// Passive: only control words are acted on
    WaitingWake,
    /// The next transcript is classified as a command
    ListeningCommand,
}

/// What the dispatcher did with a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Empty, or not listening for commands
    Ignored,
    /// Same transcript seen within the duplicate window
    Duplicate,
    /// Wake word while idle; listening once the acknowledgement finishes
    Woken,
    /// Wake word while listening; back to waiting
    Reset,
    Stopped,
    Back,
    /// A command is still executing
    Busy,
    /// The classifier could not place the utterance
    NotUnderstood,
    /// The intent was handed to its action
    Dispatched(Intent),
}

/// How an intent is carried out
enum Action {
    Screen(ScreenAction),
    Navigate(Route),
    Theme(Theme),
    Logout,
    Tutorial,
}

impl From<Intent> for Action {
    fn from(intent: Intent) -> Self {
        match intent {
            Intent::TakePhoto => Self::Screen(ScreenAction::TakePhoto),
            Intent::OpenCamera => Self::Screen(ScreenAction::OpenCamera),
            Intent::ActivateMic => Self::Screen(ScreenAction::ActivateMic),
            Intent::SendAudio => Self::Screen(ScreenAction::SendAudio),
            Intent::GoHome => Self::Navigate(Route::Home),
            Intent::GoHistory => Self::Navigate(Route::History),
            Intent::GoSettings => Self::Navigate(Route::Settings),
            Intent::GoAccount => Self::Navigate(Route::Account),
            Intent::LightTheme => Self::Theme(Theme::Light),
            Intent::DarkTheme => Self::Theme(Theme::Dark),
            Intent::Logout => Self::Logout,
            Intent::Tutorial => Self::Tutorial,
        }
    }
}

/// Spoken outcome of an executed intent
enum Reply {
    Say(String),
    Tutorial,
}

impl Reply {
    fn say(text: impl Into<String>) -> Self {
        Self::Say(text.into())
    }
}

struct DispatchState {
    voice: VoiceState,
    busy: bool,
    epoch: u64,
    recent_transcripts: DuplicateWindow,
    recent_intents: DuplicateWindow,
}

impl DispatchState {
    /// Invalidate pending continuations and return to waiting
    fn reset(&mut self) -> u64 {
        self.epoch += 1;
        self.busy = false;
        self.voice = VoiceState::WaitingWake;
        self.epoch
    }
}

struct Inner {
    arbiter: SpeechArbiter,
    classifier: IntentClassifier,
    app: Arc<dyn AppActions>,
    screens: ScreenRegistry,
    patterns: ControlPatterns,
    config: DispatcherConfig,
    state: Mutex<DispatchState>,
    listener: Mutex<Option<ListenerId>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let listener = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = listener {
            self.arbiter.remove_listener(id);
        }
    }
}

/// Turns global transcripts into application actions
#[derive(Clone)]
pub struct CommandDispatcher {
    inner: Arc<Inner>,
}

impl CommandDispatcher {
    /// Create a dispatcher; call [`Self::attach`] to start receiving transcripts
    ///
    /// # Errors
    ///
    /// Returns error if the control word lists cannot be compiled
    pub fn new(
        arbiter: SpeechArbiter,
        classifier: IntentClassifier,
        app: Arc<dyn AppActions>,
        screens: ScreenRegistry,
        config: DispatcherConfig,
    ) -> Result<Self> {
        let patterns = ControlPatterns::new(&config)?;
        let state = DispatchState {
            voice: VoiceState::WaitingWake,
            busy: false,
            epoch: 0,
            recent_transcripts: DuplicateWindow::new(config.duplicate_transcript_window),
            recent_intents: DuplicateWindow::new(config.duplicate_intent_window),
        };

        Ok(Self {
            inner: Arc::new(Inner {
                arbiter,
                classifier,
                app,
                screens,
                patterns,
                config,
                state: Mutex::new(state),
                listener: Mutex::new(None),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to the arbiter's global transcripts
    pub fn attach(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let id = self.inner.arbiter.add_listener(Arc::new(move |text: &str| {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.handle_transcript(text);
            }
            Ok(())
        }));

        let previous = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(id);
        if let Some(previous) = previous {
            self.inner.arbiter.remove_listener(previous);
        }
        tracing::debug!(?id, "dispatcher attached");
    }

    /// Stop receiving transcripts
    pub fn detach(&self) {
        let listener = self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = listener {
            self.inner.arbiter.remove_listener(id);
            tracing::debug!(?id, "dispatcher detached");
        }
    }

    #[must_use]
    pub fn voice_state(&self) -> VoiceState {
        self.lock().voice
    }

    /// Whether a command is executing
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    /// Apply admission rules to one final transcript
    pub fn handle_transcript(&self, text: &str) -> Admission {
        let text = text.trim();
        let key = transcript_key(text);
        if key.is_empty() {
            return Admission::Ignored;
        }

        let now = Instant::now();
        if self.lock().recent_transcripts.check_and_record(&key, now) {
            tracing::debug!(transcript = text, "duplicate transcript dropped");
            return Admission::Duplicate;
        }

        match self.inner.patterns.detect(text) {
            Some(ControlWord::Wake) => return self.on_wake(),
            Some(ControlWord::Stop) => return self.on_stop(),
            Some(ControlWord::Back) => return self.on_back(),
            None => {}
        }

        let epoch = {
            let mut s = self.lock();
            if s.busy {
                tracing::debug!(transcript = text, "busy, transcript dropped");
                return Admission::Busy;
            }
            if s.voice == VoiceState::WaitingWake {
                tracing::trace!(transcript = text, "waiting for wake word");
                return Admission::Ignored;
            }
            s.busy = true;
            s.epoch += 1;
            s.epoch
        };
        self.arm_watchdog(epoch);

        let prediction = self.inner.classifier.classify(text);
        let intent = if prediction.not_understood {
            None
        } else {
            Intent::from_str(&prediction.intent)
                .inspect_err(|e| tracing::warn!(error = %e, "model produced unknown intent"))
                .ok()
        };

        let Some(intent) = intent else {
            tracing::info!(
                transcript = text,
                confidence = prediction.confidence,
                "command not understood"
            );
            self.reply(epoch, messages::NOT_UNDERSTOOD);
            return Admission::NotUnderstood;
        };

        tracing::info!(
            transcript = text,
            %intent,
            confidence = prediction.confidence,
            "dispatching command"
        );
        let reply = match catch_unwind(AssertUnwindSafe(|| self.execute(intent, text))) {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::warn!(%intent, error = %e, "command failed");
                Reply::say(messages::ACTION_FAILED)
            }
            Err(_) => {
                tracing::warn!(%intent, "command panicked");
                Reply::say(messages::ACTION_FAILED)
            }
        };

        match reply {
            Reply::Say(message) => self.reply(epoch, &message),
            Reply::Tutorial => self.play_tutorial(epoch),
        }
        Admission::Dispatched(intent)
    }

    fn on_wake(&self) -> Admission {
        let (was_listening, epoch) = {
            let mut s = self.lock();
            let was_listening = s.voice == VoiceState::ListeningCommand;
            (was_listening, s.reset())
        };

        if was_listening {
            tracing::info!("wake word while listening, resetting");
            self.inner.arbiter.stop_speaking();
            return Admission::Reset;
        }

        tracing::info!("wake word detected");
        let this = Arc::downgrade(&self.inner);
        self.inner.arbiter.speak(
            messages::WAKE_ACK,
            SpeakOptions::default().on_done(move |outcome| {
                let Some(inner) = this.upgrade() else {
                    return;
                };
                let dispatcher = Self { inner };
                let mut s = dispatcher.lock();
                if s.epoch == epoch && outcome != SpeechOutcome::Stopped {
                    s.voice = VoiceState::ListeningCommand;
                    drop(s);
                    tracing::debug!("listening for command");
                    // a wake with no follow-up command times out
                    dispatcher.arm_watchdog(epoch);
                }
            }),
        );
        Admission::Woken
    }

    fn on_stop(&self) -> Admission {
        self.lock().reset();
        tracing::info!("stop word, cancelling");
        self.inner.arbiter.stop_speaking();
        Admission::Stopped
    }

    fn on_back(&self) -> Admission {
        let epoch = {
            let mut s = self.lock();
            s.reset();
            s.busy = true;
            s.epoch
        };
        self.inner.arbiter.stop_speaking();
        self.arm_watchdog(epoch);

        if !self.inner.app.can_go_back() {
            tracing::info!("back requested with empty history");
            self.reply(epoch, messages::CANNOT_GO_BACK);
            return Admission::Back;
        }

        tracing::info!("navigating back");
        let this = Arc::downgrade(&self.inner);
        self.inner.arbiter.speak(
            messages::GOING_BACK,
            SpeakOptions::default()
                .pause_recognition()
                .on_done(move |_| {
                    let Some(inner) = this.upgrade() else {
                        return;
                    };
                    let dispatcher = Self { inner };
                    if dispatcher.lock().epoch == epoch {
                        if let Err(e) = dispatcher.inner.app.go_back() {
                            tracing::warn!(error = %e, "back navigation failed");
                        }
                    }
                    dispatcher.finish(epoch);
                }),
        );
        Admission::Back
    }

    /// Run the side effect for `intent` and decide what to say
    fn execute(&self, intent: Intent, text: &str) -> Result<Reply> {
        let now = Instant::now();
        match Action::from(intent) {
            Action::Navigate(route) => {
                if self.inner.app.current_route() == route {
                    return Ok(Reply::say(messages::already_on(route)));
                }
                if self.already_executed(intent, now) {
                    return Ok(Reply::say(messages::ALREADY_DONE));
                }
                self.inner
                    .app
                    .navigate(route)
                    .map_err(|e| Error::Navigation(format!("{route}: {e}")))?;
                self.record(intent, now);
                Ok(Reply::say(messages::navigating_to(route)))
            }
            Action::Theme(theme) => {
                if self.inner.app.current_theme() == theme {
                    return Ok(Reply::say(messages::theme_already(theme)));
                }
                if self.already_executed(intent, now) {
                    return Ok(Reply::say(messages::ALREADY_DONE));
                }
                self.inner.app.set_theme(theme)?;
                self.record(intent, now);
                Ok(Reply::say(messages::theme_applied(theme)))
            }
            Action::Screen(action) => {
                let Some(handler) = self.inner.screens.handler(action) else {
                    tracing::info!(?action, "no screen registered for action");
                    return Ok(Reply::say(messages::screen_action_unavailable(action)));
                };
                if self.already_executed(intent, now) {
                    return Ok(Reply::say(messages::ALREADY_DONE));
                }
                handler(text).map_err(|e| Error::Action(format!("{action:?}: {e}")))?;
                self.record(intent, now);
                Ok(Reply::say(messages::screen_action_done(action)))
            }
            Action::Logout => {
                if self.already_executed(intent, now) {
                    return Ok(Reply::say(messages::ALREADY_DONE));
                }
                self.inner.app.logout()?;
                self.record(intent, now);
                Ok(Reply::say(messages::LOGGING_OUT))
            }
            Action::Tutorial => {
                if self.already_executed(intent, now) {
                    return Ok(Reply::say(messages::ALREADY_DONE));
                }
                self.record(intent, now);
                Ok(Reply::Tutorial)
            }
        }
    }

    fn already_executed(&self, intent: Intent, now: Instant) -> bool {
        let recent = self.lock().recent_intents.is_recent(intent.as_str(), now);
        if recent {
            tracing::info!(%intent, "intent already executed recently");
        }
        recent
    }

    fn record(&self, intent: Intent, now: Instant) {
        self.lock().recent_intents.check_and_record(intent.as_str(), now);
    }

    /// Speak `message`, then return to waiting
    fn reply(&self, epoch: u64, message: &str) {
        let this = Arc::downgrade(&self.inner);
        self.inner.arbiter.speak(
            message,
            SpeakOptions::default()
                .pause_recognition()
                .on_done(move |_| {
                    if let Some(inner) = this.upgrade() {
                        Self { inner }.finish(epoch);
                    }
                }),
        );
    }

    /// Tutorial speech must not be heard as commands, so the microphone is
    /// off until it ends
    fn play_tutorial(&self, epoch: u64) {
        tracing::info!("playing tutorial, microphone disabled");
        self.inner.arbiter.disable();

        let this = Arc::downgrade(&self.inner);
        self.inner.arbiter.speak(
            messages::TUTORIAL,
            SpeakOptions::default().on_done(move |_| {
                if let Some(inner) = this.upgrade() {
                    let dispatcher = Self { inner };
                    dispatcher.finish(epoch);
                    dispatcher.inner.arbiter.enable();
                }
            }),
        );
    }

    /// Clear `busy` and return to waiting if nothing newer happened
    fn finish(&self, epoch: u64) -> bool {
        let mut s = self.lock();
        if s.epoch != epoch {
            return false;
        }
        s.busy = false;
        s.voice = VoiceState::WaitingWake;
        true
    }

    /// Force the command admitted under `epoch` to complete within the
    /// completion window
    fn arm_watchdog(&self, epoch: u64) {
        let window = self.inner.config.completion_window;
        let this = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let Some(inner) = this.upgrade() else {
                return;
            };
            let dispatcher = Self { inner };
            let pending = {
                let s = dispatcher.lock();
                s.epoch == epoch && (s.busy || s.voice != VoiceState::WaitingWake)
            };
            if pending && dispatcher.finish(epoch) {
                tracing::warn!(epoch, "command did not complete in time, returning to idle");
            }
        });
    }
}
