//! Spoken feedback (pt-BR)

use super::actions::{Route, ScreenAction, Theme};

pub const WAKE_ACK: &str = "Estou ouvindo. Pode falar.";
pub const NOT_UNDERSTOOD: &str = "Não entendi o comando. Diga escuta para tentar de novo.";
pub const GOING_BACK: &str = "Voltando.";
pub const CANNOT_GO_BACK: &str = "Não há tela anterior para voltar.";
pub const ALREADY_DONE: &str = "Esse comando já foi executado.";
pub const ACTION_FAILED: &str = "Não consegui executar o comando.";
pub const LOGGING_OUT: &str = "Saindo da conta.";
pub const TUTORIAL: &str = "Bem-vindo. Diga escuta e, em seguida, um comando. \
    Por exemplo: tirar foto, abrir câmera, ir para o histórico, tema escuro ou sair da conta. \
    Diga pare para interromper e voltar para retornar à tela anterior.";

const fn route_name(route: Route) -> &'static str {
    match route {
        Route::Home => "o início",
        Route::History => "o histórico",
        Route::Settings => "as configurações",
        Route::Account => "a sua conta",
    }
}

#[must_use]
pub fn navigating_to(route: Route) -> String {
    format!("Abrindo {}.", route_name(route))
}

#[must_use]
pub const fn already_on(route: Route) -> &'static str {
    match route {
        Route::Home => "Você já está no início.",
        Route::History => "Você já está no histórico.",
        Route::Settings => "Você já está nas configurações.",
        Route::Account => "Você já está na sua conta.",
    }
}

#[must_use]
pub const fn theme_applied(theme: Theme) -> &'static str {
    match theme {
        Theme::Light => "Tema claro ativado.",
        Theme::Dark => "Tema escuro ativado.",
    }
}

#[must_use]
pub const fn theme_already(theme: Theme) -> &'static str {
    match theme {
        Theme::Light => "O tema claro já está ativo.",
        Theme::Dark => "O tema escuro já está ativo.",
    }
}

#[must_use]
pub const fn screen_action_done(action: ScreenAction) -> &'static str {
    match action {
        ScreenAction::ActivateMic => "Microfone ativado.",
        ScreenAction::TakePhoto => "Tirando foto.",
        ScreenAction::OpenCamera => "Abrindo a câmera.",
        ScreenAction::SendAudio => "Enviando áudio.",
    }
}

#[must_use]
pub const fn screen_action_unavailable(action: ScreenAction) -> &'static str {
    match action {
        ScreenAction::ActivateMic => "O microfone só pode ser ativado na tela de conversa.",
        ScreenAction::TakePhoto => "Para tirar foto, abra a câmera primeiro.",
        ScreenAction::OpenCamera => "A câmera não está disponível nesta tela.",
        ScreenAction::SendAudio => "Só é possível enviar áudio na tela de conversa.",
    }
}
