use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use voicegate::{
    create_router, AppState, AudioNormalizer, Config, FileCaptureProvider, FileProviderOptions,
    HttpTranscriber, RecordedBlob, Transcriber,
};

#[derive(Parser)]
#[command(name = "voicegate", about = "Silence-gated capture and transcription service")]
struct Cli {
    /// Configuration file (without extension)
    #[arg(long, default_value = "config/voicegate")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API with a file-backed capture source
    Serve {
        /// Audio file replayed as the capture stream
        #[arg(long)]
        source: PathBuf,
    },
    /// Normalize and transcribe one audio file, print the text, exit
    Transcribe {
        /// Audio file to transcribe
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config);

    match cli.command {
        Command::Serve { source } => serve(config, source).await,
        Command::Transcribe { file } => transcribe_file(config, file).await,
    }
}

async fn serve(config: Config, source: PathBuf) -> Result<()> {
    info!("{} starting", config.service.name);

    let transcriber = Arc::new(
        HttpTranscriber::new(config.transcription.client_config())
            .context("Failed to create transcription client")?,
    );
    let provider = Arc::new(FileCaptureProvider::new(
        &source,
        FileProviderOptions::default(),
    ));

    let state = AppState::new(provider, transcriber, Arc::new(config.clone()));
    let router = create_router(state);

    let addr = format!("{}:{}", config.service.http.bind, config.service.http.port);
    info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router)
        .await
        .context("HTTP server error")?;

    Ok(())
}

async fn transcribe_file(config: Config, file: PathBuf) -> Result<()> {
    let transcriber = HttpTranscriber::new(config.transcription.client_config())
        .context("Failed to create transcription client")?;
    let normalizer = AudioNormalizer::new(config.normalize.resolve());

    let data = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("wav");
    let blob = RecordedBlob::new(data, format!("audio/{}", ext));

    let wav = tokio::task::spawn_blocking(move || normalizer.normalize(&blob))
        .await
        .context("Normalizer task failed")??;
    info!(
        "Normalized {}: {:.1}s at {}Hz",
        file.display(),
        wav.duration_seconds(),
        wav.sample_rate
    );

    let text = transcriber
        .transcribe(&wav, &config.transcription.request())
        .await?;
    println!("{}", text);

    Ok(())
}
