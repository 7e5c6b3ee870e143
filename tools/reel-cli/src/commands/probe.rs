//! Measure an audio file.

use std::path::PathBuf;
use std::sync::Arc;

use reel_common::config::AppConfig;
use reel_common::process::TokioProcessRunner;
use reel_render_engine::{AudioDurationProbe, DurationSource, ProbeSettings};

pub async fn run(config: &AppConfig, path: PathBuf, retries: Option<u32>) -> anyhow::Result<()> {
    let settings = ProbeSettings::from_config(config);
    let retries = retries.unwrap_or(settings.max_retries);
    let probe = AudioDurationProbe::new(Arc::new(TokioProcessRunner::new()), settings);

    let duration = probe.probe(&path, retries).await?;
    let source = match &duration.source {
        DurationSource::Measured => "measured".to_string(),
        DurationSource::Reencoded { attempt, path } => {
            format!("re-encoded (attempt {attempt}, {})", path.display())
        }
        DurationSource::Default => "default (file missing)".to_string(),
    };
    println!("{:.3}", duration.secs);
    eprintln!("source: {source}");
    Ok(())
}
