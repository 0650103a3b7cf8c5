//! Speech arbiter integration tests
//!
//! Drive the arbiter with fake providers and a paused clock

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use lumen_voice::{Error, Result};
use lumen_voice::speech::{
    NativeEvent, PermissionState, RecognitionErrorKind, RecognitionEvent, RecognitionMode,
    SpeakOptions, SpeechOutcome, StartOutcome, SynthesisEvent,
};

mod common;

use common::{Engine, FakeRecognizer, recording_listener};

fn error(kind: RecognitionErrorKind) -> RecognitionEvent {
    RecognitionEvent::Error {
        kind,
        message: format!("{kind:?}"),
    }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[tokio::test]
async fn test_start_requires_permission() {
    let engine = Engine::new();
    let err = engine
        .arbiter
        .start_recognition(RecognitionMode::Global)
        .unwrap_err();

    assert!(matches!(err, Error::Permission(_)));
    assert_eq!(engine.recognizer.starts(), 0);
}

#[tokio::test]
async fn test_denied_permission_blocks_start() {
    let engine = Engine::with_recognizer(FakeRecognizer::denying());
    assert!(!engine.arbiter.request_permissions().await);

    assert_eq!(engine.arbiter.state().permission, PermissionState::Denied);
    assert!(engine.arbiter.start_recognition(RecognitionMode::Global).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_start_sets_engine_state() {
    let engine = Engine::granted().await;
    let outcome = engine
        .arbiter
        .start_recognition(RecognitionMode::Global)
        .unwrap();

    assert_eq!(outcome, StartOutcome::Started);
    let state = engine.arbiter.state();
    assert!(state.is_recognizing);
    assert!(state.is_enabled);
    assert_eq!(state.current_mode, Some(RecognitionMode::Global));

    // native stop is always issued before start
    assert_eq!(engine.recognizer.stops(), 1);
    let options = engine.recognizer.last_options().unwrap();
    assert_eq!(options.language, "pt-BR");
    assert!(options.continuous);
    assert!(!options.interim_results);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_active_only_updates_mode() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();

    let outcome = engine
        .arbiter
        .start_recognition(RecognitionMode::Local)
        .unwrap();

    assert_eq!(outcome, StartOutcome::AlreadyActive);
    assert_eq!(engine.arbiter.state().current_mode, Some(RecognitionMode::Local));
    assert_eq!(engine.recognizer.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_restart_is_deferred() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    engine.arbiter.stop_recognition();

    let outcome = engine
        .arbiter
        .start_recognition(RecognitionMode::Global)
        .unwrap();
    assert_eq!(outcome, StartOutcome::Deferred);
    assert_eq!(engine.recognizer.starts(), 1);

    sleep(ms(600)).await;
    assert_eq!(engine.recognizer.starts(), 2);
    assert!(engine.arbiter.state().is_recognizing);
}

#[tokio::test(start_paused = true)]
async fn test_own_speech_is_not_heard() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    let heard = recording_listener(&engine.arbiter);

    let _speech = engine
        .arbiter
        .speak("Tira uma foto agora", SpeakOptions::default());
    engine.hear("tira uma foto agora");
    assert!(heard.lock().unwrap().is_empty());

    // still suppressed right after playback ends
    engine.finish_speaking();
    sleep(ms(1100)).await;
    engine.hear("Tira uma foto, agora");
    assert!(heard.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_repeated_finals_delivered_once() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    let heard = recording_listener(&engine.arbiter);

    engine.hear("abre a câmera");
    sleep(ms(900)).await;
    engine.hear("Abre a câmera");
    assert_eq!(heard.lock().unwrap().len(), 1);

    // secondary window still covers it
    sleep(ms(400)).await;
    engine.hear("abre a câmera");
    assert_eq!(heard.lock().unwrap().len(), 1);

    sleep(ms(2100)).await;
    engine.hear("abre a câmera");
    assert_eq!(heard.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_system_prompts_are_stripped() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    let heard = recording_listener(&engine.arbiter);

    engine.hear("estou ouvindo tira uma foto");
    engine.hear("Pode falar.");
    engine.hear("   ");

    assert_eq!(*heard.lock().unwrap(), vec!["tira uma foto".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_local_session_receives_exclusively() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    let global = recording_listener(&engine.arbiter);

    let local = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&local);
    engine
        .arbiter
        .start_local(Arc::new(move |text: &str, is_final: bool| {
            sink.lock().unwrap().push((text.to_string(), is_final));
        }))
        .unwrap();

    engine.hear("azul");
    assert_eq!(*local.lock().unwrap(), vec![("azul".to_string(), true)]);
    assert!(global.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_interim_results_only_in_local_mode() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    let global = recording_listener(&engine.arbiter);
    engine.hear_interim("tira");
    assert!(global.lock().unwrap().is_empty());

    let interims = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&interims);
    engine
        .arbiter
        .start_local(Arc::new(move |_: &str, is_final: bool| {
            if !is_final {
                count.fetch_add(1, Ordering::SeqCst);
            }
        }))
        .unwrap();

    engine.hear_interim("qual");
    engine.hear_interim("qual");
    engine.hear_interim("qual é");
    assert_eq!(interims.load(Ordering::SeqCst), 2);
    assert!(global.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failing_listener_does_not_block_others() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();

    engine
        .arbiter
        .add_listener(Arc::new(|_: &str| -> Result<()> {
            Err(Error::Action("broken".to_string()))
        }));
    engine
        .arbiter
        .add_listener(Arc::new(|_: &str| -> Result<()> { panic!("listener bug") }));
    let heard = recording_listener(&engine.arbiter);

    engine.hear("oi tudo bem");
    assert_eq!(heard.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_removed_listener_is_not_called() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&calls);
    let id = engine.arbiter.add_listener(Arc::new(move |_: &str| {
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    assert!(engine.arbiter.remove_listener(id));
    assert!(!engine.arbiter.remove_listener(id));

    engine.hear("oi");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_natural_end_restarts_global() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    sleep(ms(1000)).await;

    engine.arbiter.on_recognition_event(RecognitionEvent::End);
    assert!(!engine.arbiter.state().is_recognizing);

    sleep(ms(200)).await;
    assert_eq!(engine.recognizer.starts(), 1);
    sleep(ms(200)).await;
    assert_eq!(engine.recognizer.starts(), 2);
    assert!(engine.arbiter.state().is_recognizing);
}

#[tokio::test(start_paused = true)]
async fn test_reentrant_end_is_ignored() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();

    engine.arbiter.on_recognition_event(RecognitionEvent::End);
    let first_end = engine.arbiter.state().last_end;
    sleep(ms(100)).await;
    engine.arbiter.on_recognition_event(RecognitionEvent::End);

    assert!(first_end.is_some());
    assert_eq!(engine.arbiter.state().last_end, first_end);
}

#[tokio::test(start_paused = true)]
async fn test_intentional_stop_does_not_restart() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    engine.arbiter.stop_recognition();
    engine.arbiter.on_recognition_event(RecognitionEvent::End);

    sleep(ms(3000)).await;
    assert_eq!(engine.recognizer.starts(), 1);
    let state = engine.arbiter.state();
    assert!(!state.is_recognizing);
    assert_eq!(state.current_mode, None);
}

#[tokio::test(start_paused = true)]
async fn test_transient_error_restarts_quietly() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    sleep(ms(1000)).await;

    engine
        .arbiter
        .on_recognition_event(error(RecognitionErrorKind::NoSpeech));
    assert_eq!(engine.arbiter.state().consecutive_error_count, 0);

    sleep(ms(900)).await;
    assert_eq!(engine.recognizer.starts(), 1);
    sleep(ms(200)).await;
    assert_eq!(engine.recognizer.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_errors_back_off_linearly() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    sleep(ms(1000)).await;

    engine.arbiter.on_recognition_event(error(RecognitionErrorKind::Audio));
    assert_eq!(engine.arbiter.state().consecutive_error_count, 1);
    sleep(ms(900)).await;
    assert_eq!(engine.recognizer.starts(), 1);
    sleep(ms(200)).await;
    assert_eq!(engine.recognizer.starts(), 2);

    engine.arbiter.on_recognition_event(error(RecognitionErrorKind::Audio));
    assert_eq!(engine.arbiter.state().consecutive_error_count, 2);
    sleep(ms(1900)).await;
    assert_eq!(engine.recognizer.starts(), 2);
    sleep(ms(200)).await;
    assert_eq!(engine.recognizer.starts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_is_capped() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();

    for _ in 0..12 {
        engine.arbiter.on_recognition_event(error(RecognitionErrorKind::Server));
    }
    assert_eq!(engine.arbiter.state().consecutive_error_count, 12);

    sleep(ms(9900)).await;
    assert_eq!(engine.recognizer.starts(), 1);
    sleep(ms(200)).await;
    assert_eq!(engine.recognizer.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_end_after_error_keeps_backoff() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    sleep(ms(1000)).await;

    for _ in 0..3 {
        engine.arbiter.on_recognition_event(error(RecognitionErrorKind::Audio));
    }
    engine.arbiter.on_recognition_event(RecognitionEvent::End);
    assert_eq!(engine.arbiter.state().consecutive_error_count, 3);

    sleep(ms(400)).await;
    assert_eq!(engine.recognizer.starts(), 1);
    sleep(ms(2500)).await;
    assert_eq!(engine.recognizer.starts(), 1);
    sleep(ms(200)).await;
    assert_eq!(engine.recognizer.starts(), 2);

    // the next end is a natural one again
    sleep(ms(1000)).await;
    engine.arbiter.on_recognition_event(RecognitionEvent::End);
    sleep(ms(400)).await;
    assert_eq!(engine.recognizer.starts(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_restart_keeps_retrying() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    sleep(ms(1000)).await;

    engine.recognizer.fail_next_starts(2);
    engine
        .arbiter
        .on_recognition_event(error(RecognitionErrorKind::NoSpeech));

    sleep(ms(1100)).await;
    assert_eq!(engine.recognizer.starts(), 2);
    let state = engine.arbiter.state();
    assert_eq!(state.consecutive_error_count, 1);
    assert!(!state.is_recognizing);

    sleep(ms(1000)).await;
    assert_eq!(engine.recognizer.starts(), 3);
    assert_eq!(engine.arbiter.state().consecutive_error_count, 2);

    sleep(ms(1800)).await;
    assert_eq!(engine.recognizer.starts(), 3);
    sleep(ms(200)).await;
    assert_eq!(engine.recognizer.starts(), 4);
    assert!(engine.arbiter.state().is_recognizing);
}

#[tokio::test(start_paused = true)]
async fn test_native_start_keeps_error_count() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    sleep(ms(1000)).await;

    engine.arbiter.on_recognition_event(error(RecognitionErrorKind::Audio));
    sleep(ms(1100)).await;
    assert_eq!(engine.recognizer.starts(), 2);

    engine.arbiter.on_recognition_event(RecognitionEvent::Start);
    engine.arbiter.on_recognition_event(error(RecognitionErrorKind::Audio));
    assert_eq!(engine.arbiter.state().consecutive_error_count, 2);
    sleep(ms(1900)).await;
    assert_eq!(engine.recognizer.starts(), 2);
    sleep(ms(200)).await;
    assert_eq!(engine.recognizer.starts(), 3);

    engine.hear("oi");
    assert_eq!(engine.arbiter.state().consecutive_error_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_permission_error_stops_retrying() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    engine
        .arbiter
        .on_recognition_event(error(RecognitionErrorKind::Permission));

    sleep(ms(15_000)).await;
    assert_eq!(engine.recognizer.starts(), 1);
    assert_eq!(engine.arbiter.state().permission, PermissionState::Denied);
    assert!(engine.arbiter.start_recognition(RecognitionMode::Global).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_disable_prevents_any_restart() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    sleep(ms(1000)).await;

    engine.arbiter.disable();
    let state = engine.arbiter.state();
    assert!(!state.is_enabled);
    assert!(!state.is_recognizing);

    engine.arbiter.on_recognition_event(RecognitionEvent::End);
    engine
        .arbiter
        .on_recognition_event(error(RecognitionErrorKind::Network));
    sleep(ms(5000)).await;
    assert_eq!(engine.recognizer.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_enable_starts_after_settle_delay() {
    let engine = Engine::granted().await;
    engine.arbiter.enable();
    assert_eq!(engine.recognizer.starts(), 0);

    sleep(ms(400)).await;
    assert_eq!(engine.recognizer.starts(), 1);
    let state = engine.arbiter.state();
    assert!(state.is_enabled);
    assert_eq!(state.current_mode, Some(RecognitionMode::Global));
}

#[tokio::test(start_paused = true)]
async fn test_paused_recognition_resumes_after_speech() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    sleep(ms(1000)).await;

    let speech = engine.arbiter.speak(
        "Abrindo o histórico.",
        SpeakOptions::default().pause_recognition(),
    );
    let state = engine.arbiter.state();
    assert!(!state.is_recognizing);
    assert!(state.is_speaking);
    assert_eq!(engine.recognizer.stops(), 2);

    engine.finish_speaking();
    assert_eq!(speech.await, SpeechOutcome::Done);

    sleep(ms(700)).await;
    assert_eq!(engine.recognizer.starts(), 1);
    sleep(ms(200)).await;
    assert_eq!(engine.recognizer.starts(), 2);
    assert_eq!(engine.arbiter.state().current_mode, Some(RecognitionMode::Global));
}

#[tokio::test(start_paused = true)]
async fn test_disable_during_paused_speech_prevents_resume() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    sleep(ms(1000)).await;

    let _speech = engine
        .arbiter
        .speak("Um momento.", SpeakOptions::default().pause_recognition());
    engine.arbiter.disable();
    engine.arbiter.on_recognition_event(RecognitionEvent::End);
    engine.finish_speaking();

    sleep(ms(3000)).await;
    assert_eq!(engine.recognizer.starts(), 1);
    assert!(!engine.arbiter.state().is_recognizing);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_paused_speech_prevents_resume() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    sleep(ms(1000)).await;

    let _speech = engine
        .arbiter
        .speak("Um momento.", SpeakOptions::default().pause_recognition());
    engine.arbiter.stop_recognition();
    engine.finish_speaking();

    sleep(ms(3000)).await;
    assert_eq!(engine.recognizer.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_completion_runs_exactly_once() {
    let engine = Engine::granted().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&calls);

    let speech = engine.arbiter.speak(
        "olá",
        SpeakOptions::default().on_done(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        }),
    );
    let id = speech.utterance();

    engine.arbiter.on_synthesis_event(SynthesisEvent::Done(id));
    engine.arbiter.on_synthesis_event(SynthesisEvent::Stopped(id));
    engine.arbiter.on_synthesis_event(SynthesisEvent::Error {
        utterance: id,
        message: "late".to_string(),
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(speech.await, SpeechOutcome::Done);
    assert!(!engine.arbiter.state().is_speaking);
}

#[tokio::test(start_paused = true)]
async fn test_new_speech_supersedes_previous() {
    let engine = Engine::granted().await;
    let first = engine.arbiter.speak("primeira", SpeakOptions::default());
    let second = engine.arbiter.speak("segunda", SpeakOptions::default());

    assert_eq!(first.await, SpeechOutcome::Stopped);
    assert_eq!(engine.synth.stops(), 1);

    engine.finish_speaking();
    assert_eq!(second.await, SpeechOutcome::Done);
}

#[tokio::test(start_paused = true)]
async fn test_synthesis_error_completes_as_failed() {
    let engine = Engine::granted().await;
    let speech = engine.arbiter.speak("olá", SpeakOptions::default());
    engine.arbiter.on_synthesis_event(SynthesisEvent::Error {
        utterance: speech.utterance(),
        message: "engine unavailable".to_string(),
    });

    assert_eq!(speech.await, SpeechOutcome::Failed);
    assert!(!engine.arbiter.state().is_speaking);
}

#[tokio::test(start_paused = true)]
async fn test_stop_speaking_forgets_echo() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    let heard = recording_listener(&engine.arbiter);

    let speech = engine.arbiter.speak("tema escuro", SpeakOptions::default());
    engine.arbiter.stop_speaking();
    assert_eq!(speech.await, SpeechOutcome::Stopped);
    assert!(!engine.arbiter.state().is_speaking);

    engine.hear("tema escuro");
    assert_eq!(heard.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_echo_expires_after_playback() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    let heard = recording_listener(&engine.arbiter);

    let _speech = engine.arbiter.speak("sim", SpeakOptions::default());
    engine.finish_speaking();

    sleep(ms(500)).await;
    engine.hear("sim");
    assert!(heard.lock().unwrap().is_empty());

    sleep(ms(2500)).await;
    engine.hear("sim");
    assert_eq!(heard.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_release_local_rearms_global() {
    let engine = Engine::granted().await;
    let session = engine
        .arbiter
        .start_local(Arc::new(|_: &str, _: bool| {}))
        .unwrap();
    assert_eq!(engine.arbiter.local_owner(), Some(session));
    sleep(ms(1000)).await;

    assert!(engine.arbiter.release_local(session));
    assert!(!engine.arbiter.state().is_recognizing);
    assert!(!engine.arbiter.release_local(session));

    sleep(ms(900)).await;
    assert_eq!(engine.recognizer.starts(), 2);
    assert_eq!(engine.arbiter.state().current_mode, Some(RecognitionMode::Global));
    assert_eq!(engine.arbiter.local_owner(), None);
}

#[tokio::test(start_paused = true)]
async fn test_stale_local_session_cannot_stop_newer_one() {
    let engine = Engine::granted().await;
    let first = engine
        .arbiter
        .start_local(Arc::new(|_: &str, _: bool| {}))
        .unwrap();
    let second = engine
        .arbiter
        .start_local(Arc::new(|_: &str, _: bool| {}))
        .unwrap();

    assert!(!engine.arbiter.release_local(first));
    assert_eq!(engine.arbiter.local_owner(), Some(second));
    assert!(engine.arbiter.state().is_recognizing);
}

#[tokio::test(start_paused = true)]
async fn test_drive_pumps_native_events() {
    let engine = Engine::granted().await;
    engine.arbiter.start_recognition(RecognitionMode::Global).unwrap();
    let heard = recording_listener(&engine.arbiter);

    let (tx, rx) = mpsc::unbounded_channel();
    let arbiter = engine.arbiter.clone();
    let driver = tokio::spawn(async move { arbiter.drive(rx).await });

    tx.send(NativeEvent::Recognition(RecognitionEvent::Result {
        transcript: "qual o meu saldo".to_string(),
        is_final: true,
    }))
    .unwrap();
    drop(tx);
    driver.await.unwrap();

    assert_eq!(*heard.lock().unwrap(), vec!["qual o meu saldo".to_string()]);
}
