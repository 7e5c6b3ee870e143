//! Final concatenation of combined clips.

use std::path::Path;
use std::sync::Arc;

use reel_common::config::AppConfig;
use reel_common::error::{ReelError, ReelResult};
use reel_common::process::{CommandSpec, ProcessRunner};
use reel_project_model::workdir::{is_scratch, MANIFEST_NAME};

/// Encoder parameters of the concat re-encode.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcatSettings {
    pub ffmpeg: String,
    pub video_codec: String,
    pub preset: String,
    pub crf: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl ConcatSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ffmpeg: config.tools.ffmpeg.clone(),
            video_codec: config.encode.video_codec.clone(),
            preset: config.encode.concat_preset.clone(),
            crf: config.encode.concat_crf,
            audio_codec: config.encode.audio_codec.clone(),
            audio_bitrate: config.encode.concat_audio_bitrate.clone(),
        }
    }
}

impl Default for ConcatSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Joins every combined clip in a directory, in filename order.
pub struct Concatenator {
    runner: Arc<dyn ProcessRunner>,
    settings: ConcatSettings,
}

impl Concatenator {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: ConcatSettings) -> Self {
        Self { runner, settings }
    }

    /// Concatenate the files in `dir` ending with `clip_ending` into
    /// `output`.
    ///
    /// The `file_list.txt` manifest is removed afterwards whatever the
    /// outcome. An encoder failure is [`ReelError::Concat`], which is fatal
    /// for the batch; nothing is retried and no partial `output` is kept.
    pub async fn concatenate(
        &self,
        dir: &Path,
        clip_ending: &str,
        output: &Path,
    ) -> ReelResult<Vec<String>> {
        let clips = select_clips(dir, clip_ending)?;
        let manifest = dir.join(MANIFEST_NAME);
        std::fs::write(&manifest, manifest_contents(&clips))?;
        tracing::info!(
            clips = clips.len(),
            manifest = %manifest.display(),
            output = %output.display(),
            "Concatenating clips"
        );
        if clips.is_empty() {
            tracing::warn!(dir = %dir.display(), "No combined clips to concatenate");
        }

        let spec = concat_command(&self.settings, &manifest, output);
        let result = self.runner.run(&spec).await;

        if let Err(e) = std::fs::remove_file(&manifest) {
            tracing::warn!(manifest = %manifest.display(), error = %e, "Failed to remove manifest");
        }

        let failure = match result {
            Ok(status) if status.success() => None,
            Ok(status) => Some(format!(
                "ffmpeg exited with {:?}: {}",
                status.code,
                status.stderr.trim()
            )),
            Err(e) => Some(e.to_string()),
        };
        if let Some(message) = failure {
            discard_partial(output);
            return Err(ReelError::concat(message));
        }
        tracing::info!(output = %output.display(), "Videos concatenated");
        Ok(clips)
    }
}

/// Remove whatever the encoder left at `output` before failing.
pub(crate) fn discard_partial(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => tracing::debug!(output = %output.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(output = %output.display(), error = %e, "Failed to remove partial output"),
    }
}

/// Names of files in `dir` ending with `ending`, sorted lexicographically.
pub fn select_clips(dir: &Path, ending: &str) -> ReelResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(ending) && !is_scratch(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// ffmpeg concat-demuxer list; names are relative to the manifest.
pub fn manifest_contents(clips: &[String]) -> String {
    clips
        .iter()
        .map(|name| format!("file '{}'\n", name.replace('\'', r"'\''")))
        .collect()
}

/// `ffmpeg -f concat -safe 0 -i LIST -c:v libx264 -preset fast -crf 22 -c:a aac -b:a 192k OUT`
pub fn concat_command(settings: &ConcatSettings, manifest: &Path, output: &Path) -> CommandSpec {
    CommandSpec::new(&settings.ffmpeg).args([
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        manifest.display().to_string(),
        "-c:v".to_string(),
        settings.video_codec.clone(),
        "-preset".to_string(),
        settings.preset.clone(),
        "-crf".to_string(),
        settings.crf.to_string(),
        "-c:a".to_string(),
        settings.audio_codec.clone(),
        "-b:a".to_string(),
        settings.audio_bitrate.clone(),
        output.display().to_string(),
    ])
}
