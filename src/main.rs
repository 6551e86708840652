use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use avatar_relay::delivery::StyleId;
use avatar_relay::segment::split_sentences;
use avatar_relay::tts::Synthesizer;
use avatar_relay::{Config, Daemon};

/// Relay - voice and text conversation relay for a talking avatar
#[derive(Parser)]
#[command(name = "relay", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long, env = "RELAY_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP relay (default)
    Serve,
    /// List the allowed voice styles
    Styles,
    /// Show how text splits into sentences
    Segment {
        /// Text to segment
        text: String,
    },
    /// Synthesize one artifact and print its path
    TestTts {
        /// Text to speak
        #[arg(default_value = "こんにちは！音声合成のテストだよ。")]
        text: String,
        /// Style id
        #[arg(short, long)]
        style: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,avatar_relay=info",
        1 => "info,avatar_relay=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
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
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.port).await,
        Command::Styles => {
            list_styles();
            Ok(())
        }
        Command::Segment { text } => {
            segment(&text);
            Ok(())
        }
        Command::TestTts { text, style } => test_tts(&text, style).await,
    }
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let port = port.unwrap_or(config.server.port);

    tracing::info!(port, output_dir = %config.server.output_dir.display(), "starting avatar relay");

    Daemon::new(config, port).run().await?;
    Ok(())
}

fn list_styles() {
    for style in StyleId::ALL {
        println!("{:>3}  {}", style.id(), style.label());
    }
}

fn segment(text: &str) {
    let (sentences, remainder) = split_sentences(text);
    for (i, sentence) in sentences.iter().enumerate() {
        println!("{}: {sentence}", i + 1);
    }
    if !remainder.is_empty() {
        println!("remainder: {remainder}");
    }
}

async fn test_tts(text: &str, style: Option<i64>) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let style = style
        .and_then(StyleId::from_id)
        .unwrap_or(config.coeiroink.style_id);
    let synthesizer = Daemon::synthesizer(&config)?;

    println!("Synthesizing speech with style {} ({})...", style.id(), style.label());
    let artifact = synthesizer
        .synthesize(text, style, None)
        .await
        .map_err(|e| anyhow::anyhow!("TTS synthesis failed: {e}"))?;

    println!("{}", artifact.path.display());
    Ok(())
}
