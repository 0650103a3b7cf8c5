//! Wake-word command handling
//!
//! Global transcripts flow into the [`CommandDispatcher`], which gates them on
//! the wake word, classifies commands and executes them against the host
//! app's [`AppActions`] and the mounted screens' [`ScreenHandlers`].

mod actions;
mod dispatcher;
pub mod messages;
mod patterns;

pub use actions::{
    AppActions, Route, ScreenAction, ScreenCallback, ScreenGuard, ScreenHandlers, ScreenRegistry,
    Theme,
};
pub use dispatcher::{Admission, CommandDispatcher, VoiceState};
pub use patterns::{ControlPatterns, ControlWord};
