//! Record a single visual.

use std::path::PathBuf;
use std::sync::Arc;

use reel_capture_engine::{
    BrowserRecorder, ChromeDriverLauncher, Recorder, RecordingRequest, RecordingSettings,
};
use reel_common::config::AppConfig;
use reel_common::process::{ProcessRunner, TokioProcessRunner};

pub async fn run(
    config: &AppConfig,
    visual: String,
    output: PathBuf,
    duration: f64,
    fps: Option<u32>,
) -> anyhow::Result<()> {
    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner::new());
    let launcher = Arc::new(ChromeDriverLauncher::from_config(runner.clone(), config)?);
    let recorder = BrowserRecorder::new(launcher, runner, RecordingSettings::from_config(config));

    let mut request = RecordingRequest::new(visual, output, duration);
    if let Some(fps) = fps {
        request = request.with_frame_rate(fps);
    }

    let report = recorder.record(&request).await?;
    println!("Recorded: {}", report.output.display());
    println!(
        "  Window: {}x{} at ({}, {})",
        report.geometry.width, report.geometry.height, report.geometry.x, report.geometry.y
    );
    println!("  Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    Ok(())
}
