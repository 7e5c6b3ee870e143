//! Write metadata.json for a directory.

use std::path::PathBuf;
use std::sync::Arc;

use reel_common::config::AppConfig;
use reel_common::process::TokioProcessRunner;
use reel_render_engine::MetadataReporter;

pub async fn run(config: &AppConfig, dir: PathBuf) -> anyhow::Result<()> {
    let reporter = MetadataReporter::new(
        Arc::new(TokioProcessRunner::new()),
        config.tools.ffprobe.clone(),
    )
    .with_extension(&config.capture.extension);

    let path = reporter.write_report(&dir).await?;
    println!("{}", std::fs::read_to_string(&path)?);
    eprintln!("Wrote {}", path.display());
    Ok(())
}
