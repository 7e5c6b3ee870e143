//! Mux narration onto a recording.

use std::path::PathBuf;
use std::sync::Arc;

use reel_common::config::AppConfig;
use reel_common::process::TokioProcessRunner;
use reel_render_engine::{MuxSettings, Muxer, AUDIO_LEAD_IN_MS};

pub async fn run(
    config: &AppConfig,
    video: PathBuf,
    audio: PathBuf,
    output: PathBuf,
) -> anyhow::Result<()> {
    let muxer = Muxer::new(
        Arc::new(TokioProcessRunner::new()),
        MuxSettings::from_config(config),
    );
    muxer.mux(&video, &audio, &output).await?;
    println!(
        "Muxed {} (narration delayed {AUDIO_LEAD_IN_MS} ms)",
        output.display()
    );
    Ok(())
}
