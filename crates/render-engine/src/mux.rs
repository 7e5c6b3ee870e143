//! Audio/video muxing.

use std::path::Path;
use std::sync::Arc;

use reel_common::config::AppConfig;
use reel_common::error::{ReelError, ReelResult};
use reel_common::process::{CommandSpec, ProcessRunner};

use crate::concat::discard_partial;

/// Narration starts this long after the first video frame.
pub const AUDIO_LEAD_IN_MS: u64 = 2000;

/// Tools and codecs used for muxing.
#[derive(Debug, Clone, PartialEq)]
pub struct MuxSettings {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub video_codec: String,
    pub audio_codec: String,
}

impl MuxSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ffmpeg: config.tools.ffmpeg.clone(),
            ffprobe: config.tools.ffprobe.clone(),
            video_codec: config.encode.video_codec.clone(),
            audio_codec: config.encode.audio_codec.clone(),
        }
    }
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Combines one video and one narration track into a clip.
#[derive(Clone)]
pub struct Muxer {
    runner: Arc<dyn ProcessRunner>,
    settings: MuxSettings,
}

impl Muxer {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: MuxSettings) -> Self {
        Self { runner, settings }
    }

    /// Mux `audio` onto `video` with the fixed lead-in, re-encoding both.
    ///
    /// Both inputs must be regular files; otherwise this fails with
    /// [`ReelError::InvalidInput`] before any process is started. A failed
    /// mux removes whatever was written to `output`.
    pub async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> ReelResult<()> {
        require_file(video, "video")?;
        require_file(audio, "audio")?;

        let video_has_audio = self.has_audio_stream(video).await;
        let spec = mux_command(&self.settings, video, audio, output, video_has_audio);

        tracing::debug!(
            video = %video.display(),
            audio = %audio.display(),
            output = %output.display(),
            video_has_audio,
            "Muxing"
        );
        let failure = match self.runner.run(&spec).await {
            Ok(result) if result.success() => None,
            Ok(result) => Some(ReelError::mux(format!(
                "ffmpeg exited with {:?} muxing {}: {}",
                result.code,
                output.display(),
                result.stderr.trim()
            ))),
            Err(e) => Some(e),
        };
        if let Some(e) = failure {
            discard_partial(output);
            return Err(e);
        }
        tracing::info!(output = %output.display(), "Muxed clip");
        Ok(())
    }

    /// Whether `video` already carries an audio stream to mix with.
    async fn has_audio_stream(&self, video: &Path) -> bool {
        let spec = CommandSpec::new(&self.settings.ffprobe).args([
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "a".to_string(),
            "-show_entries".to_string(),
            "stream=index".to_string(),
            "-of".to_string(),
            "csv=p=0".to_string(),
            video.display().to_string(),
        ]);
        match self.runner.run(&spec).await {
            Ok(output) if output.success() => !output.stdout.trim().is_empty(),
            Ok(output) => {
                tracing::warn!(video = %video.display(), stderr = %output.stderr.trim(), "ffprobe failed; assuming silent video");
                false
            }
            Err(e) => {
                tracing::warn!(video = %video.display(), error = %e, "ffprobe unavailable; assuming silent video");
                false
            }
        }
    }
}

fn require_file(path: &Path, role: &str) -> ReelResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ReelError::invalid_input(format!(
            "Invalid {role} file path: {}",
            path.display()
        )))
    }
}

/// Audio filter graph delaying narration by [`AUDIO_LEAD_IN_MS`] and, when
/// the video has its own audio, mixing the two.
pub fn lead_in_filter(video_has_audio: bool) -> String {
    let delay = format!("adelay=delays={AUDIO_LEAD_IN_MS}:all=1");
    if video_has_audio {
        format!("[1:a]{delay}[narr];[0:a][narr]amix=inputs=2:duration=longest,apad[aout]")
    } else {
        format!("[1:a]{delay},apad[aout]")
    }
}

/// Full mux invocation. Output length follows the video.
pub fn mux_command(
    settings: &MuxSettings,
    video: &Path,
    audio: &Path,
    output: &Path,
    video_has_audio: bool,
) -> CommandSpec {
    CommandSpec::new(&settings.ffmpeg).args([
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
        video.display().to_string(),
        "-i".to_string(),
        audio.display().to_string(),
        "-filter_complex".to_string(),
        lead_in_filter(video_has_audio),
        "-map".to_string(),
        "0:v".to_string(),
        "-map".to_string(),
        "[aout]".to_string(),
        "-c:v".to_string(),
        settings.video_codec.clone(),
        "-c:a".to_string(),
        settings.audio_codec.clone(),
        "-shortest".to_string(),
        output.display().to_string(),
    ])
}
