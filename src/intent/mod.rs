//! Intent classification
//!
//! Maps a free-form utterance onto a closed vocabulary of intents with an
//! embedded TF-IDF vectorizer and a linear (multinomial logistic) model.

mod classifier;
mod model;

use std::fmt;
use std::str::FromStr;

pub use classifier::{IntentClassifier, LOW_CONFIDENCE_THRESHOLD, OUT_OF_SCOPE, PredictionResult};
pub use model::IntentModel;

use crate::Error;

/// Intents the command dispatcher knows how to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Capture a photo and ask about it (camera screen)
    TakePhoto,
    /// Open the camera screen's capture view
    OpenCamera,
    /// Activate the chat microphone (chat screen)
    ActivateMic,
    /// Send the recorded audio question (chat screen)
    SendAudio,
    GoHome,
    GoHistory,
    GoSettings,
    GoAccount,
    LightTheme,
    DarkTheme,
    Logout,
    /// Play the spoken tutorial
    Tutorial,
}

impl Intent {
    /// Every executable intent, in label order
    pub const ALL: [Self; 12] = [
        Self::TakePhoto,
        Self::OpenCamera,
        Self::ActivateMic,
        Self::SendAudio,
        Self::GoHome,
        Self::GoHistory,
        Self::GoSettings,
        Self::GoAccount,
        Self::LightTheme,
        Self::DarkTheme,
        Self::Logout,
        Self::Tutorial,
    ];

    /// Label used by the classifier model
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TakePhoto => "tirar_foto",
            Self::OpenCamera => "abrir_camera",
            Self::ActivateMic => "ativar_microfone",
            Self::SendAudio => "enviar_audio",
            Self::GoHome => "ir_para_inicio",
            Self::GoHistory => "ir_para_historico",
            Self::GoSettings => "ir_para_configuracoes",
            Self::GoAccount => "ir_para_conta",
            Self::LightTheme => "tema_claro",
            Self::DarkTheme => "tema_escuro",
            Self::Logout => "sair_da_conta",
            Self::Tutorial => "tutorial",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == s)
            .ok_or_else(|| Error::Model(format!("unknown intent label: {s}")))
    }
}
