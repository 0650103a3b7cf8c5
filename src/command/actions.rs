//! Application collaborators invoked by the dispatcher
//!
//! Navigation, theming and account actions belong to the host app and are
//! reached through [`AppActions`]. Screen-bound actions (camera, microphone,
//! audio) are only available while the owning screen is registered in the
//! [`ScreenRegistry`].

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::Result;

/// Top-level screens reachable by voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    History,
    Settings,
    Account,
}

impl Route {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::History => "history",
            Self::Settings => "settings",
            Self::Account => "account",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    Light,
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Light => "light",
            Self::Dark => "dark",
        })
    }
}

/// Host application surface
///
/// Implementations should return quickly; long work belongs on the host's
/// own tasks.
pub trait AppActions: Send + Sync {
    /// Screen currently shown
    fn current_route(&self) -> Route;

    /// Push `route`
    ///
    /// # Errors
    ///
    /// Returns error if navigation fails
    fn navigate(&self, route: Route) -> Result<()>;

    /// Whether the navigation stack has somewhere to go back to
    fn can_go_back(&self) -> bool;

    /// Pop the navigation stack
    ///
    /// # Errors
    ///
    /// Returns error if navigation fails
    fn go_back(&self) -> Result<()>;

    fn current_theme(&self) -> Theme;

    /// # Errors
    ///
    /// Returns error if the theme cannot be applied
    fn set_theme(&self, theme: Theme) -> Result<()>;

    /// Sign the user out
    ///
    /// # Errors
    ///
    /// Returns error if the account action fails
    fn logout(&self) -> Result<()>;
}

/// Actions that only exist while a specific screen is mounted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenAction {
    ActivateMic,
    TakePhoto,
    OpenCamera,
    SendAudio,
}

/// Callback for a screen action; receives the utterance that triggered it
pub type ScreenCallback = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// Action callbacks supplied by one screen
#[derive(Clone, Default)]
pub struct ScreenHandlers {
    activate_mic: Option<ScreenCallback>,
    take_photo: Option<ScreenCallback>,
    open_camera: Option<ScreenCallback>,
    send_audio: Option<ScreenCallback>,
}

impl ScreenHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_activate_mic(mut self, f: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.activate_mic = Some(Arc::new(move |_: &str| f()));
        self
    }

    /// Photo capture; the callback gets the spoken request as the question
    /// to ask about the picture
    #[must_use]
    pub fn on_take_photo(
        mut self,
        f: impl Fn(&str) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.take_photo = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_open_camera(mut self, f: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.open_camera = Some(Arc::new(move |_: &str| f()));
        self
    }

    #[must_use]
    pub fn on_send_audio(mut self, f: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.send_audio = Some(Arc::new(move |_: &str| f()));
        self
    }

    fn get(&self, action: ScreenAction) -> Option<&ScreenCallback> {
        match action {
            ScreenAction::ActivateMic => self.activate_mic.as_ref(),
            ScreenAction::TakePhoto => self.take_photo.as_ref(),
            ScreenAction::OpenCamera => self.open_camera.as_ref(),
            ScreenAction::SendAudio => self.send_audio.as_ref(),
        }
    }
}

#[derive(Default)]
struct Registrations {
    next_id: u64,
    /// Mount order; later screens shadow earlier ones
    screens: Vec<(u64, String, ScreenHandlers)>,
}

/// Registry of mounted screens' action callbacks
#[derive(Clone, Default)]
pub struct ScreenRegistry {
    inner: Arc<Mutex<Registrations>>,
}

impl ScreenRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registrations> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a screen's handlers until the returned guard is dropped
    #[must_use = "dropping the guard unregisters the screen immediately"]
    pub fn register(&self, screen: impl Into<String>, handlers: ScreenHandlers) -> ScreenGuard {
        let screen = screen.into();
        let mut r = self.lock();
        r.next_id += 1;
        let id = r.next_id;
        tracing::debug!(screen = %screen, "screen registered");
        r.screens.push((id, screen, handlers));

        ScreenGuard {
            registry: self.clone(),
            id,
        }
    }

    /// Callback for `action` from the most recently mounted screen providing it
    #[must_use]
    pub fn handler(&self, action: ScreenAction) -> Option<ScreenCallback> {
        self.lock()
            .screens
            .iter()
            .rev()
            .find_map(|(_, _, handlers)| handlers.get(action).cloned())
    }

    /// Number of mounted screens
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().screens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unregister(&self, id: u64) {
        let mut r = self.lock();
        if let Some(pos) = r.screens.iter().position(|(sid, _, _)| *sid == id) {
            let (_, screen, _) = r.screens.remove(pos);
            tracing::debug!(screen = %screen, "screen unregistered");
        }
    }
}

/// Keeps a screen's handlers registered; unregisters on drop
pub struct ScreenGuard {
    registry: ScreenRegistry,
    id: u64,
}

impl Drop for ScreenGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
