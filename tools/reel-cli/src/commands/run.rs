//! Run the whole pipeline for a batch.

use std::path::PathBuf;

use reel_common::config::AppConfig;
use reel_pipeline::{run_batch, PipelineDeps, VideoOutcome};
use reel_project_model::{ArtifactNaming, RecordBatch, WorkDir};
use reel_render_engine::CombineOutcome;

pub async fn run(
    mut config: AppConfig,
    records: PathBuf,
    output_parent: PathBuf,
    visuals: Option<PathBuf>,
) -> anyhow::Result<()> {
    let batch =
        RecordBatch::load(&records).map_err(|e| anyhow::anyhow!("Failed to load records: {e}"))?;
    if visuals.is_some() {
        config.stages.visual_source = visuals;
    }

    let workdir = WorkDir::create(&output_parent, ArtifactNaming::from_config(&config, batch.len()))?;
    println!("Work directory: {}", workdir.root().display());

    let deps = PipelineDeps::from_config(&config)?;
    let report = run_batch(&config, &batch, &workdir, &deps).await?;

    println!();
    println!("Records:");
    for (index, outcome) in &report.records {
        let video = match &outcome.video {
            Some(VideoOutcome::Recorded { recording_secs, .. }) => {
                format!("recorded {recording_secs:.1}s")
            }
            Some(VideoOutcome::Skipped { reason }) => format!("skipped ({reason})"),
            Some(VideoOutcome::Failed { error }) => format!("failed ({error})"),
            None => "-".to_string(),
        };
        let combine = match &outcome.combine {
            Some(CombineOutcome::Muxed { .. }) => "combined".to_string(),
            Some(CombineOutcome::SkippedNoAudio) => "no narration".to_string(),
            Some(CombineOutcome::SkippedNoVideo) => "no video".to_string(),
            Some(CombineOutcome::Failed { error }) => format!("failed ({error})"),
            None => "-".to_string(),
        };
        println!(
            "  [{index:>4}] audio: {:<3} video: {video}  combine: {combine}",
            if outcome.has_audio { "yes" } else { "no" }
        );
    }

    println!();
    if let Some(path) = &report.metadata {
        println!("Metadata: {}", path.display());
    }
    match &report.final_artifact {
        Some(path) => println!(
            "Final video: {} ({} clips)",
            path.display(),
            report.concatenated.len()
        ),
        None => println!("No final video (combining disabled)"),
    }
    Ok(())
}
