use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use kubic_assistant::voice::{
    AudioCapture, AudioFrame, FrameSource, SynthesisPipeline, Voice, write_beep_wav,
};
use kubic_assistant::{Assistant, Config, DialogueClient};

/// Kubic - wake-word voice assistant
#[derive(Parser)]
#[command(name = "kubic", version, about)]
struct Cli {
    /// Configuration file (JSON, or TOML with a .toml extension)
    #[arg(short, long, env = "KUBIC_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the assistant (default)
    Run,
    /// Send one prompt to the remote model and print the streamed reply
    Ask {
        /// Prompt text
        text: String,
    },
    /// Speak text through the synthesis pipeline
    Say {
        /// Text to speak
        #[arg(default_value = "Hola, soy Kubic. Esto es una prueba de voz.")]
        text: String,
    },
    /// Play the acknowledgement tone
    Beep,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,kubic_assistant=info",
        1 => "info,kubic_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_assistant(config).await,
        Command::Ask { text } => ask(&config, &text).await,
        Command::Say { text } => say(&config, &text).await,
        Command::Beep => beep(&config).await,
        Command::TestMic { duration } => test_mic(duration).await,
    }
}

/// Run the wake word loop until interrupted
#[allow(clippy::future_not_send)]
async fn run_assistant(config: Config) -> anyhow::Result<()> {
    write_beep_wav(&config.speech.beep_path)?;

    let wake_word = config.wake_word.clone();
    let voice = SynthesisPipeline::from_config(&config);
    let mut assistant = Assistant::from_config(config)?;

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    tracing::info!("kubic ready - say \"{wake_word}\"");
    voice.play_tone().await;
    capture.discard_pending();

    let result = assistant.run(&mut capture).await;
    capture.stop();

    result.map_err(Into::into)
}

/// Send one prompt and print the answer as it streams
async fn ask(config: &Config, text: &str) -> anyhow::Result<()> {
    let client = DialogueClient::from_config(config)?;
    let mut answer = client.send(text);

    let mut stdout = std::io::stdout();
    while let Some(delta) = answer.next().await {
        print!("{delta}");
        stdout.flush()?;
    }
    println!();

    Ok(())
}

/// Speak text through piper and the audio sink
async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Speaking: \"{text}\"");

    let voice = SynthesisPipeline::from_config(config);
    let report = voice.speak(text).await;

    if !report.is_success() {
        anyhow::bail!("playback failed: {:?}", report.outcome);
    }

    println!("If you heard the speech, synthesis is working!");
    Ok(())
}

/// Play the acknowledgement tone
async fn beep(config: &Config) -> anyhow::Result<()> {
    write_beep_wav(&config.speech.beep_path)?;
    SynthesisPipeline::from_config(config).play_tone().await;
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.peek_buffer();
        let frame = AudioFrame::from_f32(&samples);
        let energy = frame.rms();
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );

        capture.discard_pending();
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");
    println!("  3. Try: alsamixer (to check capture levels)");

    Ok(())
}
