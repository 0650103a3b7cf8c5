use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use lumen_voice::console::{ConsoleApp, ConsoleRecognizer, ConsoleSynthesizer};
use lumen_voice::speech::{NativeEvent, RecognitionEvent};
use lumen_voice::{
    CommandDispatcher, Config, IntentClassifier, ScreenHandlers, ScreenRegistry, SpeechArbiter,
};

/// Lumen - voice interaction engine
#[derive(Parser)]
#[command(name = "lumen", version, about)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, env = "LUMEN_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify an utterance and print the prediction as JSON
    Classify {
        /// Utterance to classify
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Run the full engine against stdin, one final transcript per line
    Simulate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "info,lumen_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    tracing::debug!(?config, "loaded configuration");

    let classifier = match &config.classifier.model_path {
        Some(path) => IntentClassifier::from_path(path)?,
        None => IntentClassifier::embedded()?,
    };

    match cli.command {
        Command::Classify { text } => classify(&classifier, &text.join(" ")),
        Command::Simulate => simulate(config, classifier).await,
    }
}

fn classify(classifier: &IntentClassifier, text: &str) -> anyhow::Result<()> {
    let prediction = classifier.classify(text);
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

async fn simulate(config: Config, classifier: IntentClassifier) -> anyhow::Result<()> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let arbiter = SpeechArbiter::new(
        Arc::new(ConsoleRecognizer::new(events_tx.clone())),
        Arc::new(ConsoleSynthesizer::new(events_tx.clone())),
        config.arbiter.clone(),
    )?;

    let driver = tokio::spawn({
        let arbiter = arbiter.clone();
        async move { arbiter.drive(events_rx).await }
    });

    let screens = ScreenRegistry::new();
    let _camera = screens.register(
        "camera",
        ScreenHandlers::new()
            .on_open_camera(|| {
                println!("[app] camera opened");
                Ok(())
            })
            .on_take_photo(|question| {
                println!("[app] photo taken, question: {question}");
                Ok(())
            }),
    );
    let _chat = screens.register(
        "chat",
        ScreenHandlers::new()
            .on_activate_mic(|| {
                println!("[app] chat microphone on");
                Ok(())
            })
            .on_send_audio(|| {
                println!("[app] audio sent");
                Ok(())
            }),
    );

    let dispatcher = CommandDispatcher::new(
        arbiter.clone(),
        classifier,
        Arc::new(ConsoleApp::new()),
        screens,
        config.dispatcher.clone(),
    )?;
    dispatcher.attach();

    if !arbiter.request_permissions().await {
        anyhow::bail!("microphone permission denied");
    }
    arbiter.enable();
    tracing::info!("simulator ready, say \"escuta\" to wake");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let transcript = line.trim();
        if transcript.is_empty() {
            continue;
        }
        events_tx.send(NativeEvent::Recognition(RecognitionEvent::Result {
            transcript: transcript.to_string(),
            is_final: true,
        }))?;
        // leave room for replies and settle delays between lines
        tokio::time::sleep(config.arbiter.post_pause_settle).await;
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    dispatcher.detach();
    arbiter.disable();
    driver.abort();
    Ok(())
}
