use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;
use tracing::info;

use talkwire::{AudioSource, BaseRealtime, ClientConfig, RealtimeClient};

/// Built-in default instructions: a strict translation persona. Overridable
/// via `--instructions` or `TALKWIRE_INSTRUCTIONS`.
const DEFAULT_INSTRUCTIONS: &str = "\
You are a translation machine. Your sole function is to translate the input \
text from English to Cantonese. Do not add, omit, or alter any information. \
Do not provide explanations, opinions, or any additional text beyond the \
direct translation. Wait until the speaker is done speaking before \
translating, and translate the entire input from their turn.";

/// Talkwire - turn-based realtime voice conversation client
#[derive(Parser, Debug)]
#[command(name = "talkwire")]
#[command(version, about, long_about = None)]
struct Cli {
    /// WAV file to submit for this turn
    #[arg(default_value = "input.wav")]
    input: PathBuf,

    /// Path for the synthesized reply audio
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Realtime model identifier
    #[arg(short, long)]
    model: Option<String>,

    /// Behavioral instructions for the session
    #[arg(short, long)]
    instructions: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(output) = cli.output {
        config.output_path = output;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(instructions) = cli.instructions {
        config.instructions = Some(instructions);
    }
    if config.instructions.is_none() {
        config.instructions = Some(DEFAULT_INSTRUCTIONS.to_string());
    }

    let client = RealtimeClient::new(config)?;
    client.connect().await?;
    info!("connected, submitting {}", cli.input.display());

    let handle = client.submit_audio(AudioSource::WavFile(cli.input)).await?;
    let output = handle.wait().await?;

    println!("Text output: {}", output.text);
    println!("Audio transcript: {}", output.transcript);
    if let Some(path) = output.audio_path {
        println!("Reply audio written to {}", path.display());
    }

    client.disconnect().await?;
    Ok(())
}
