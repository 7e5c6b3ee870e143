//! Concatenate the combined clips of a work directory.

use std::path::PathBuf;
use std::sync::Arc;

use reel_common::config::AppConfig;
use reel_common::process::TokioProcessRunner;
use reel_project_model::{ArtifactNaming, WorkDir};
use reel_render_engine::{ConcatSettings, Concatenator};

pub async fn run(config: &AppConfig, dir: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    let naming = ArtifactNaming::new(config.naming.index_width, config.capture.extension.clone());
    let workdir = WorkDir::open(dir, naming)?;
    let output = output.unwrap_or_else(|| workdir.final_artifact());

    let concat = Concatenator::new(
        Arc::new(TokioProcessRunner::new()),
        ConcatSettings::from_config(config),
    );
    let clips = concat
        .concatenate(workdir.root(), &workdir.naming().combined_ending(), &output)
        .await?;

    for clip in &clips {
        println!("  {clip}");
    }
    println!("Concatenated {} clips into {}", clips.len(), output.display());
    Ok(())
}
