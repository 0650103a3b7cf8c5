//! Console stand-ins for the platform and the host app
//!
//! Used by `lumen simulate`: recognition is fed from stdin by the caller,
//! synthesis is printed, and app actions are printed and tracked in memory.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::command::{AppActions, Route, Theme};
use crate::speech::{
    NativeEvent, RecognitionEvent, RecognitionOptions, RecognitionProvider, SynthesisEvent,
    SynthesisProvider, UtteranceId,
};
use crate::{Error, Result};

fn emit(events: &mpsc::UnboundedSender<NativeEvent>, event: NativeEvent) -> Result<()> {
    events
        .send(event)
        .map_err(|_| Error::Recognition("native event channel closed".to_string()))
}

fn say(line: &str) {
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{line}") {
        tracing::warn!(error = %e, "failed to write to stdout");
    }
}

/// Recognizer whose sessions open and close instantly; transcripts are
/// injected by the caller
pub struct ConsoleRecognizer {
    events: mpsc::UnboundedSender<NativeEvent>,
    active: AtomicBool,
}

impl ConsoleRecognizer {
    #[must_use]
    pub const fn new(events: mpsc::UnboundedSender<NativeEvent>) -> Self {
        Self {
            events,
            active: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RecognitionProvider for ConsoleRecognizer {
    async fn request_permissions(&self) -> Result<bool> {
        Ok(true)
    }

    fn start(&self, options: &RecognitionOptions) -> Result<()> {
        tracing::debug!(
            language = %options.language,
            continuous = options.continuous,
            "console recognizer start"
        );
        self.active.store(true, Ordering::SeqCst);
        emit(&self.events, NativeEvent::Recognition(RecognitionEvent::Start))
    }

    fn stop(&self) -> Result<()> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        emit(&self.events, NativeEvent::Recognition(RecognitionEvent::End))
    }
}

/// Synthesizer that prints each utterance and finishes it immediately
pub struct ConsoleSynthesizer {
    events: mpsc::UnboundedSender<NativeEvent>,
}

impl ConsoleSynthesizer {
    #[must_use]
    pub const fn new(events: mpsc::UnboundedSender<NativeEvent>) -> Self {
        Self { events }
    }
}

impl SynthesisProvider for ConsoleSynthesizer {
    fn speak(&self, utterance: UtteranceId, text: &str) -> Result<()> {
        say(&format!("[fala] {text}"));
        emit(
            &self.events,
            NativeEvent::Synthesis(SynthesisEvent::Done(utterance)),
        )
        .map_err(|e| Error::Synthesis(e.to_string()))
    }

    fn stop(&self) -> Result<()> {
        Ok(())
    }
}

struct AppState {
    stack: Vec<Route>,
    theme: Theme,
    signed_in: bool,
}

/// In-memory app: a navigation stack, a theme and a session flag
pub struct ConsoleApp {
    state: Mutex<AppState>,
}

impl ConsoleApp {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(AppState {
                stack: Vec::new(),
                theme: Theme::Light,
                signed_in: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AppState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConsoleApp {
    fn default() -> Self {
        Self::new()
    }
}

impl AppActions for ConsoleApp {
    fn current_route(&self) -> Route {
        self.lock().stack.last().copied().unwrap_or(Route::Home)
    }

    fn navigate(&self, route: Route) -> Result<()> {
        let mut s = self.lock();
        if !s.signed_in {
            return Err(Error::Navigation("signed out".to_string()));
        }
        s.stack.push(route);
        drop(s);
        say(&format!("[app] navigate -> {route}"));
        Ok(())
    }

    fn can_go_back(&self) -> bool {
        !self.lock().stack.is_empty()
    }

    fn go_back(&self) -> Result<()> {
        let popped = self.lock().stack.pop();
        match popped {
            Some(route) => {
                say(&format!("[app] back from {route}"));
                Ok(())
            }
            None => Err(Error::Navigation("history is empty".to_string())),
        }
    }

    fn current_theme(&self) -> Theme {
        self.lock().theme
    }

    fn set_theme(&self, theme: Theme) -> Result<()> {
        self.lock().theme = theme;
        say(&format!("[app] theme -> {theme}"));
        Ok(())
    }

    fn logout(&self) -> Result<()> {
        let mut s = self.lock();
        s.signed_in = false;
        s.stack.clear();
        drop(s);
        say("[app] logged out");
        Ok(())
    }
}
