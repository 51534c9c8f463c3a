use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use vox_capture::{
    create_router, AppState, Artifact, ArtifactCallback, BackendFactory, CaptureConfig,
    CaptureSource, Config, RecordingSession, SessionConfig, SessionState,
};

#[derive(Parser)]
#[command(name = "vox-capture")]
#[command(about = "Audio recording session manager")]
struct Cli {
    /// Config file path (without extension)
    #[arg(short, long, default_value = "config/vox-capture")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control service
    Serve,

    /// Record from the microphone for a fixed duration, then export the
    /// received artifact as a WAV file
    Record {
        /// Duration to record in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,

        /// Output WAV path
        #[arg(short, long, default_value = "capture.wav")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v0.1.0", cfg.service.name);

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Record { duration, output } => record(cfg, duration, &output).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let state = AppState::new(capture_config(&cfg));
    let router = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    info!("HTTP server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, router)
        .await
        .context("HTTP server failed")?;

    Ok(())
}

async fn record(cfg: Config, duration: u64, output: &Path) -> Result<()> {
    let capture = capture_config(&cfg);
    let session_config = SessionConfig {
        sample_rate: capture.sample_rate,
        channels: capture.channels,
        ..SessionConfig::default()
    };

    // The session hands the finished artifact to this callback; the CLI is
    // the collaborator that decides what to do with it.
    let (artifact_tx, mut artifact_rx) = tokio::sync::mpsc::channel(1);
    let callback: ArtifactCallback = Arc::new(move |artifact| {
        let _ = artifact_tx.try_send(artifact);
    });

    let session = RecordingSession::new(session_config, callback);
    let backend = BackendFactory::create(CaptureSource::Microphone, capture)?;

    session.begin(backend).await;

    // Wait for acquisition to resolve
    loop {
        match session.state().await {
            SessionState::Recording => break,
            SessionState::Failed => {
                let status = session.status().await;
                anyhow::bail!(
                    "recording failed: {}",
                    status.error.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }

    info!("Recording for {} seconds", duration);

    for _ in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let status = session.status().await;
        info!(
            "Recording... {} ({} bytes buffered)",
            status.elapsed, status.buffered_bytes
        );
    }

    session.stop().await;

    let artifact = artifact_rx
        .recv()
        .await
        .context("Recording produced no artifact")?;

    info!(
        "Captured {} bytes ({})",
        artifact.data.len(),
        artifact.media_type
    );

    write_wav(&artifact, output)?;
    info!("Saved {}", output.display());

    Ok(())
}

fn capture_config(cfg: &Config) -> CaptureConfig {
    CaptureConfig {
        sample_rate: cfg.audio.sample_rate,
        channels: cfg.audio.channels,
        buffer_duration_ms: cfg.audio.buffer_duration_ms,
    }
}

/// Wrap the artifact's raw PCM bytes into a WAV container.
fn write_wav(artifact: &Artifact, path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: artifact.channels,
        sample_rate: artifact.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

    for sample in artifact.data.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
            .context("Failed to write sample to WAV")?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;

    Ok(())
}
