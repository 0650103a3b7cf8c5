//! Shared test utilities

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use lumen_voice::command::{AppActions, Route, Theme};
use lumen_voice::config::ArbiterConfig;
use lumen_voice::speech::{
    RecognitionEvent, RecognitionOptions, RecognitionProvider, SynthesisEvent, SynthesisProvider,
    UtteranceId,
};
use lumen_voice::{Error, Result, SpeechArbiter};

/// Recognizer that records every call
#[derive(Default)]
pub struct FakeRecognizer {
    deny: bool,
    starts: Mutex<Vec<RecognitionOptions>>,
    stops: Mutex<usize>,
    failing_starts: Mutex<usize>,
}

impl FakeRecognizer {
    /// Recognizer whose permission prompt is refused
    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.lock().unwrap().len()
    }

    pub fn last_options(&self) -> Option<RecognitionOptions> {
        self.starts.lock().unwrap().last().cloned()
    }

    pub fn stops(&self) -> usize {
        *self.stops.lock().unwrap()
    }

    /// Make the next `n` start attempts fail after being recorded
    pub fn fail_next_starts(&self, n: usize) {
        *self.failing_starts.lock().unwrap() = n;
    }
}

#[async_trait]
impl RecognitionProvider for FakeRecognizer {
    async fn request_permissions(&self) -> Result<bool> {
        Ok(!self.deny)
    }

    fn start(&self, options: &RecognitionOptions) -> Result<()> {
        self.starts.lock().unwrap().push(options.clone());
        let mut failing = self.failing_starts.lock().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(Error::Recognition("recognizer busy".into()));
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        *self.stops.lock().unwrap() += 1;
        Ok(())
    }
}

/// Synthesizer whose completions are delivered by the test
#[derive(Default)]
pub struct FakeSynthesizer {
    spoken: Mutex<Vec<(UtteranceId, String)>>,
    stops: Mutex<usize>,
}

impl FakeSynthesizer {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn last_spoken(&self) -> Option<String> {
        self.spoken.lock().unwrap().last().map(|(_, t)| t.clone())
    }

    pub fn last_utterance(&self) -> Option<UtteranceId> {
        self.spoken.lock().unwrap().last().map(|(id, _)| *id)
    }

    pub fn stops(&self) -> usize {
        *self.stops.lock().unwrap()
    }
}

impl SynthesisProvider for FakeSynthesizer {
    fn speak(&self, utterance: UtteranceId, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push((utterance, text.to_string()));
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        *self.stops.lock().unwrap() += 1;
        Ok(())
    }
}

pub struct Engine {
    pub arbiter: SpeechArbiter,
    pub recognizer: Arc<FakeRecognizer>,
    pub synth: Arc<FakeSynthesizer>,
}

impl Engine {
    /// Arbiter with default config and no permission requested yet
    pub fn new() -> Self {
        Self::with_recognizer(FakeRecognizer::default())
    }

    pub fn with_recognizer(recognizer: FakeRecognizer) -> Self {
        let recognizer = Arc::new(recognizer);
        let synth = Arc::new(FakeSynthesizer::default());
        let arbiter = SpeechArbiter::new(
            recognizer.clone(),
            synth.clone(),
            ArbiterConfig::default(),
        )
        .unwrap();
        Self {
            arbiter,
            recognizer,
            synth,
        }
    }

    /// Arbiter with microphone permission granted
    pub async fn granted() -> Self {
        let engine = Self::new();
        assert!(engine.arbiter.request_permissions().await);
        engine
    }

    /// Deliver a final transcript from the recognizer
    pub fn hear(&self, text: &str) {
        self.arbiter.on_recognition_event(RecognitionEvent::Result {
            transcript: text.to_string(),
            is_final: true,
        });
    }

    /// Deliver an interim transcript from the recognizer
    pub fn hear_interim(&self, text: &str) {
        self.arbiter.on_recognition_event(RecognitionEvent::Result {
            transcript: text.to_string(),
            is_final: false,
        });
    }

    /// Report the most recent utterance as played to the end
    pub fn finish_speaking(&self) {
        let id = self.synth.last_utterance().expect("nothing was spoken");
        self.arbiter.on_synthesis_event(SynthesisEvent::Done(id));
    }
}

/// Records transcripts delivered to a global listener
pub fn recording_listener(arbiter: &SpeechArbiter) -> Arc<Mutex<Vec<String>>> {
    let heard = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&heard);
    arbiter.add_listener(Arc::new(move |text: &str| {
        sink.lock().unwrap().push(text.to_string());
        Ok(())
    }));
    heard
}

#[derive(Default)]
struct AppState {
    stack: Vec<Route>,
    theme: Option<Theme>,
    navigations: Vec<Route>,
    backs: usize,
    theme_changes: Vec<Theme>,
    logouts: usize,
    fail_navigation: bool,
}

/// Host app double
#[derive(Default)]
pub struct FakeApp {
    state: Mutex<AppState>,
}

impl FakeApp {
    /// App on the home screen with no history
    pub fn new() -> Self {
        Self::at(Route::Home, 0)
    }

    /// App showing `route`, with `depth` home screens of history below it
    pub fn at(route: Route, depth: usize) -> Self {
        let app = Self::default();
        {
            let mut s = app.state.lock().unwrap();
            s.stack = vec![Route::Home; depth];
            s.stack.push(route);
        }
        app
    }

    pub fn with_theme(self, theme: Theme) -> Self {
        self.state.lock().unwrap().theme = Some(theme);
        self
    }

    pub fn failing_navigation(self) -> Self {
        self.state.lock().unwrap().fail_navigation = true;
        self
    }

    pub fn navigations(&self) -> Vec<Route> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn backs(&self) -> usize {
        self.state.lock().unwrap().backs
    }

    pub fn theme_changes(&self) -> Vec<Theme> {
        self.state.lock().unwrap().theme_changes.clone()
    }

    pub fn logouts(&self) -> usize {
        self.state.lock().unwrap().logouts
    }
}

impl AppActions for FakeApp {
    fn current_route(&self) -> Route {
        self.state
            .lock()
            .unwrap()
            .stack
            .last()
            .copied()
            .unwrap_or(Route::Home)
    }

    fn navigate(&self, route: Route) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        if s.fail_navigation {
            return Err(Error::Navigation("route unavailable".to_string()));
        }
        s.stack.push(route);
        s.navigations.push(route);
        Ok(())
    }

    fn can_go_back(&self) -> bool {
        self.state.lock().unwrap().stack.len() > 1
    }

    fn go_back(&self) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.stack.pop();
        s.backs += 1;
        Ok(())
    }

    fn current_theme(&self) -> Theme {
        self.state.lock().unwrap().theme.unwrap_or(Theme::Light)
    }

    fn set_theme(&self, theme: Theme) -> Result<()> {
        let mut s = self.state.lock().unwrap();
        s.theme = Some(theme);
        s.theme_changes.push(theme);
        Ok(())
    }

    fn logout(&self) -> Result<()> {
        self.state.lock().unwrap().logouts += 1;
        Ok(())
    }
}
