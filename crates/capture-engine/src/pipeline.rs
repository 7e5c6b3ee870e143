//! Screen-region capture through `ffmpeg -f x11grab`.

use std::path::Path;

use reel_common::config::AppConfig;
use reel_common::error::{ReelError, ReelResult};
use reel_common::process::{CommandSpec, ProcessRunner, SupervisedProcess};
use reel_platform_linux::WindowGeometry;

/// Containers a capture may be written to.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "mkv", "webm", "mov", "avi"];

/// Fixed parameters of a region capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub ffmpeg: String,
    /// X display, e.g. `:0.0`.
    pub display: String,
    pub frame_rate: u32,
    pub video_codec: String,
}

impl CaptureSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ffmpeg: config.tools.ffmpeg.clone(),
            display: config.capture.display.clone(),
            frame_rate: config.capture.frame_rate,
            video_codec: config.encode.video_codec.clone(),
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Reject outputs whose container the capture cannot produce.
pub fn validate_output_extension(output: &Path) -> ReelResult<&str> {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| {
            ReelError::unsupported(format!("Output {} has no file extension", output.display()))
        })?;
    if !SUPPORTED_EXTENSIONS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(ext))
    {
        return Err(ReelError::unsupported(format!(
            "Unsupported output extension '.{ext}' (expected one of {})",
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }
    Ok(ext)
}

/// `ffmpeg -y -f x11grab -video_size WxH -i :0.0+x,y -codec:v libx264 -r 30 -t SECS out`
pub fn x11grab_command(
    settings: &CaptureSettings,
    geometry: WindowGeometry,
    bound_secs: f64,
    output: &Path,
) -> CommandSpec {
    let geometry = geometry.clamped();
    CommandSpec::new(&settings.ffmpeg).args([
        "-y".to_string(),
        "-f".to_string(),
        "x11grab".to_string(),
        "-video_size".to_string(),
        geometry.size_arg(),
        "-i".to_string(),
        format!("{}+{},{}", settings.display, geometry.x, geometry.y),
        "-codec:v".to_string(),
        settings.video_codec.clone(),
        "-r".to_string(),
        settings.frame_rate.to_string(),
        "-t".to_string(),
        format!("{bound_secs:?}"),
        output.display().to_string(),
    ])
}

/// A running region capture. Stopping it is a graceful terminate so the
/// encoder can finalize the container.
pub struct ScreenCapture {
    process: SupervisedProcess,
}

impl ScreenCapture {
    pub async fn start(
        runner: &dyn ProcessRunner,
        settings: &CaptureSettings,
        geometry: WindowGeometry,
        bound_secs: f64,
        output: &Path,
    ) -> ReelResult<Self> {
        let spec = x11grab_command(settings, geometry, bound_secs, output);
        let process = SupervisedProcess::start(runner, "screen-capture", &spec)
            .await
            .map_err(|e| ReelError::capture(format!("Failed to start screen capture: {e}")))?;
        tracing::info!(
            output = %output.display(),
            region = %geometry.size_arg(),
            bound_secs,
            "Screen capture started"
        );
        Ok(Self { process })
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// Terminate and reap the encoder.
    pub async fn stop(&mut self) -> ReelResult<()> {
        let code = self.process.shutdown().await?;
        tracing::debug!(?code, "Screen capture stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_x11grab_command_is_exact() {
        let spec = x11grab_command(
            &CaptureSettings::default(),
            WindowGeometry {
                x: -3,
                y: 40,
                width: 1920,
                height: 1050,
            },
            6.0,
            Path::new("/w/comment_0000.mp4"),
        );
        assert_eq!(spec.program, "ffmpeg");
        assert_eq!(
            spec.args,
            vec![
                "-y",
                "-f",
                "x11grab",
                "-video_size",
                "1920x1050",
                "-i",
                ":0.0+0,40",
                "-codec:v",
                "libx264",
                "-r",
                "30",
                "-t",
                "6.0",
                "/w/comment_0000.mp4",
            ]
        );
    }

    #[test]
    fn test_bound_keeps_fraction() {
        let spec = x11grab_command(
            &CaptureSettings::default(),
            WindowGeometry {
                x: 0,
                y: 0,
                width: 10,
                height: 10,
            },
            7.25,
            Path::new("o.mkv"),
        );
        assert_eq!(spec.args[12], "7.25");
    }

    #[test]
    fn test_extension_validation() {
        assert_eq!(validate_output_extension(Path::new("a/b.mp4")).unwrap(), "mp4");
        assert_eq!(validate_output_extension(Path::new("b.MKV")).unwrap(), "MKV");
        assert!(matches!(
            validate_output_extension(Path::new("b.gif")),
            Err(ReelError::Unsupported { .. })
        ));
        assert!(validate_output_extension(Path::new("noext")).is_err());
    }
}
