//! Application configuration.
//!
//! Every constant the pipeline depends on (timing slack, codec names,
//! tool binaries, naming width) lives here and is passed explicitly into
//! each component. Nothing reads ambient process state after load.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Which pipeline stages run.
    pub stages: StageToggles,

    /// Slack constants applied to the measured audio duration.
    pub timing: TimingConfig,

    /// Browser and screen-capture settings.
    pub capture: CaptureConfig,

    /// Encoder settings shared by the mux and concat stages.
    pub encode: EncodeConfig,

    /// Combine-stage worker pool.
    pub combine: CombineConfig,

    /// Artifact naming.
    pub naming: NamingConfig,

    /// External tool binaries.
    pub tools: ToolPaths,

    /// Optional external speech synthesizer.
    pub synthesizer: Option<SynthesizerConfig>,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Per-stage enable switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageToggles {
    /// Synthesize narration for every record.
    pub audio_generation: bool,

    /// Copy pre-made `.mp3` narration from `audio_collection_source`
    /// instead of synthesizing (only consulted when generation is off).
    pub audio_collection: bool,

    /// Source folder for audio collection.
    pub audio_collection_source: Option<PathBuf>,

    /// Folder holding rendered `comment_NNNN.html` visuals to copy into
    /// the work directory before recording.
    pub visual_source: Option<PathBuf>,

    /// Record one video per record.
    pub video_generation: bool,

    /// Mux and concatenate into the final artifact.
    pub combining: bool,
}

/// Duration conventions. Each stage adds its own slack to the same base
/// duration; the values are pinned because they shape final timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Added to the measured audio duration to get the recording duration.
    pub recording_pad_secs: f64,

    /// Added to the recording duration to bound the capture process.
    pub capture_slack_secs: f64,

    /// Added to the recording duration to bound the render-signal wait.
    pub signal_timeout_slack_secs: f64,

    /// Time given to the page to settle after navigation.
    pub page_settle_secs: f64,

    /// Duration assumed for a record whose audio file does not exist.
    pub default_audio_secs: f64,

    /// Re-encode attempts after a failed decode.
    pub max_probe_retries: u32,

    /// Audio bitrate used when re-encoding an undecodable file.
    pub reencode_bitrate: String,
}

/// Browser and capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// X11 display the capture tool reads from.
    pub display: String,

    /// Capture frame rate.
    pub frame_rate: u32,

    /// Browser viewport.
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Title injected into the page so its window can be located.
    pub window_title: String,

    /// WebDriver server binary.
    pub chromedriver: String,

    /// Optional explicit browser binary handed to the WebDriver server.
    pub browser_binary: Option<PathBuf>,

    /// Video container extension for recorded and combined clips.
    pub extension: String,
}

/// Encoder constants for the mux and concat stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    pub video_codec: String,
    pub audio_codec: String,
    pub concat_preset: String,
    pub concat_crf: u32,
    pub concat_audio_bitrate: String,
}

/// Worker pool sizing for the combine stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    /// Fixed worker count. `None` sizes the pool from the host.
    pub workers: Option<usize>,
}

/// Artifact naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Minimum digits for record indices in file names.
    pub index_width: usize,
}

/// External tool binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub xdotool: String,
}

/// External text-to-speech command.
///
/// `{text}` and `{output}` in `args` are replaced per record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    pub program: String,
    pub args: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "reel=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            audio_generation: true,
            audio_collection: false,
            audio_collection_source: None,
            visual_source: None,
            video_generation: true,
            combining: true,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            recording_pad_secs: 3.0,
            capture_slack_secs: 1.0,
            signal_timeout_slack_secs: 10.0,
            page_settle_secs: 1.0,
            default_audio_secs: 2.0,
            max_probe_retries: 3,
            reencode_bitrate: "192k".to_string(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            display: ":0.0".to_string(),
            frame_rate: 30,
            viewport_width: 1920,
            viewport_height: 1080,
            window_title: "Sample HTML".to_string(),
            chromedriver: "chromedriver".to_string(),
            browser_binary: None,
            extension: "mp4".to_string(),
        }
    }
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            concat_preset: "fast".to_string(),
            concat_crf: 22,
            concat_audio_bitrate: "192k".to_string(),
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self { index_width: 4 }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            xdotool: "xdotool".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl TimingConfig {
    /// Recording duration for a given audio duration.
    pub fn recording_secs(&self, audio_secs: f64) -> f64 {
        audio_secs + self.recording_pad_secs
    }

    /// Upper bound handed to the capture process.
    pub fn capture_bound_secs(&self, recording_secs: f64) -> f64 {
        (recording_secs + self.capture_slack_secs).max(0.0)
    }

    /// How long to wait for the render-complete signal.
    pub fn signal_timeout(&self, recording_secs: f64) -> Duration {
        Duration::from_secs_f64((recording_secs + self.signal_timeout_slack_secs).max(0.0))
    }

    pub fn page_settle(&self) -> Duration {
        Duration::from_secs_f64(self.page_settle_secs.max(0.0))
    }
}

impl CombineConfig {
    /// Effective pool size: the configured value, or `min(32, cpus + 4)`.
    pub fn effective_workers(&self) -> usize {
        match self.workers {
            Some(n) => n.max(1),
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                (cpus + 4).min(32)
            }
        }
    }
}

impl AppConfig {
    /// Load config from an explicit path or the standard location,
    /// falling back to defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the given path, or the standard location.
    pub fn save(&self, path: Option<&Path>) -> Result<(), std::io::Error> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("commentreel").join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_defaults_are_pinned() {
        let timing = TimingConfig::default();
        assert_eq!(timing.recording_pad_secs, 3.0);
        assert_eq!(timing.capture_slack_secs, 1.0);
        assert_eq!(timing.signal_timeout_slack_secs, 10.0);
        assert_eq!(timing.page_settle_secs, 1.0);
        assert_eq!(timing.max_probe_retries, 3);
    }

    #[test]
    fn duration_conventions_stack_on_recording_duration() {
        let timing = TimingConfig::default();
        let recording = timing.recording_secs(2.0);
        assert_eq!(recording, 5.0);
        assert_eq!(timing.capture_bound_secs(recording), 6.0);
        assert_eq!(timing.signal_timeout(recording), Duration::from_secs(15));
    }

    #[test]
    fn negative_slack_clamps_to_zero() {
        let timing = TimingConfig {
            capture_slack_secs: -30.0,
            signal_timeout_slack_secs: -30.0,
            ..TimingConfig::default()
        };
        assert_eq!(timing.capture_bound_secs(5.0), 0.0);
        assert_eq!(timing.signal_timeout(5.0), Duration::ZERO);
    }

    #[test]
    fn encode_defaults_match_concat_command() {
        let encode = EncodeConfig::default();
        assert_eq!(encode.video_codec, "libx264");
        assert_eq!(encode.audio_codec, "aac");
        assert_eq!(encode.concat_preset, "fast");
        assert_eq!(encode.concat_crf, 22);
        assert_eq!(encode.concat_audio_bitrate, "192k");
    }

    #[test]
    fn worker_pool_is_bounded() {
        let auto = CombineConfig::default().effective_workers();
        assert!((1..=32).contains(&auto));
        assert_eq!(CombineConfig { workers: Some(0) }.effective_workers(), 1);
        assert_eq!(CombineConfig { workers: Some(3) }.effective_workers(), 3);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"timing": {"default_audio_secs": 1.5}}"#).unwrap();
        assert_eq!(config.timing.default_audio_secs, 1.5);
        assert_eq!(config.timing.recording_pad_secs, 3.0);
        assert_eq!(config.capture.window_title, "Sample HTML");
        assert!(config.synthesizer.is_none());
    }

    #[test]
    fn load_falls_back_to_defaults_on_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        let config = AppConfig::load(Some(&path));
        assert_eq!(config.naming.index_width, 4);
    }

    #[test]
    fn save_then_load_preserves_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = AppConfig::default();
        config.capture.frame_rate = 24;
        config.save(Some(&path)).unwrap();
        assert_eq!(AppConfig::load(Some(&path)).capture.frame_rate, 24);
    }
}
