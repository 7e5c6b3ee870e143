//! Audio duration measurement.
//!
//! Synthesized audio is not trusted: its duration is measured by decoding
//! the file. A file that does not decode is re-encoded from the original
//! into a fresh scratch copy and measured again, a bounded number of times.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reel_common::config::AppConfig;
use reel_common::error::{ReelError, ReelResult};
use reel_common::process::{CommandSpec, ProcessRunner};

/// Result of one decode attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeAttempt {
    /// Decoded cleanly; duration in seconds.
    Decoded(f64),
    /// Did not decode; a re-encoded copy may.
    Retryable(String),
    /// Cannot be measured at all.
    Fatal(String),
}

/// Measures the playable duration of an audio file.
#[async_trait]
pub trait AudioDecoder: Send + Sync {
    async fn decode_duration(&self, path: &Path) -> ProbeAttempt;
}

/// Where a probed duration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum DurationSource {
    /// The file decoded as-is.
    Measured,
    /// The `attempt`-th re-encoded copy decoded.
    Reencoded { attempt: u32, path: PathBuf },
    /// No audio file; the configured placeholder was used.
    Default,
}

/// A probed audio duration.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioDuration {
    pub secs: f64,
    pub source: DurationSource,
}

/// Probe parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSettings {
    pub ffmpeg: String,
    /// Duration reported for a missing file.
    pub default_secs: f64,
    pub max_retries: u32,
    /// Bitrate of re-encoded copies, e.g. `192k`.
    pub reencode_bitrate: String,
}

impl ProbeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ffmpeg: config.tools.ffmpeg.clone(),
            default_secs: config.timing.default_audio_secs,
            max_retries: config.timing.max_probe_retries,
            reencode_bitrate: config.timing.reencode_bitrate.clone(),
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Determines audio durations with decode-or-reencode recovery.
pub struct AudioDurationProbe {
    runner: Arc<dyn ProcessRunner>,
    decoder: Arc<dyn AudioDecoder>,
    settings: ProbeSettings,
}

impl AudioDurationProbe {
    /// Probe decoding through [`FfmpegDecoder`] on the same runner.
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: ProbeSettings) -> Self {
        let decoder = Arc::new(FfmpegDecoder::new(runner.clone(), settings.ffmpeg.clone()));
        Self {
            runner,
            decoder,
            settings,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn AudioDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    /// Probe with the configured retry count.
    pub async fn duration(&self, path: &Path) -> ReelResult<AudioDuration> {
        self.probe(path, self.settings.max_retries).await
    }

    /// Measure `path`, re-encoding up to `max_retries` times.
    ///
    /// A missing file yields the configured default. Running out of retries
    /// is [`ReelError::Probe`]: the caller must skip the record rather than
    /// guess a duration.
    pub async fn probe(&self, path: &Path, max_retries: u32) -> ReelResult<AudioDuration> {
        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                default_secs = self.settings.default_secs,
                "No audio file; using default duration"
            );
            return Ok(AudioDuration {
                secs: self.settings.default_secs,
                source: DurationSource::Default,
            });
        }

        let mut reason = match self.decoder.decode_duration(path).await {
            ProbeAttempt::Decoded(secs) => {
                tracing::debug!(path = %path.display(), secs, "Measured audio duration");
                return Ok(AudioDuration {
                    secs,
                    source: DurationSource::Measured,
                });
            }
            ProbeAttempt::Fatal(reason) => return Err(fatal(path, &reason)),
            ProbeAttempt::Retryable(reason) => reason,
        };

        for attempt in 1..=max_retries {
            tracing::warn!(
                path = %path.display(),
                attempt,
                max_retries,
                reason = %reason,
                "Audio did not decode; re-encoding"
            );
            let copy = reencode_path(path, attempt);
            match self.reencode(path, &copy).await? {
                Some(failure) => reason = failure,
                None => match self.decoder.decode_duration(&copy).await {
                    ProbeAttempt::Decoded(secs) => {
                        tracing::info!(path = %copy.display(), secs, attempt, "Re-encoded audio decoded");
                        return Ok(AudioDuration {
                            secs,
                            source: DurationSource::Reencoded {
                                attempt,
                                path: copy,
                            },
                        });
                    }
                    ProbeAttempt::Fatal(reason) => return Err(fatal(path, &reason)),
                    ProbeAttempt::Retryable(failure) => reason = failure,
                },
            }
        }

        Err(ReelError::probe(format!(
            "{} did not decode after {max_retries} re-encode attempts: {reason}",
            path.display()
        )))
    }

    /// Re-encode `source` to `copy`. `Some(reason)` when the encoder failed.
    async fn reencode(&self, source: &Path, copy: &Path) -> ReelResult<Option<String>> {
        let spec = reencode_command(&self.settings, source, copy);
        let output = self.runner.run(&spec).await?;
        if output.success() {
            Ok(None)
        } else {
            Ok(Some(format!(
                "re-encode exited with {:?}: {}",
                output.code,
                last_line(&output.stderr)
            )))
        }
    }
}

fn fatal(path: &Path, reason: &str) -> ReelError {
    ReelError::probe(format!("{}: {reason}", path.display()))
}

/// `comment_0001.mp3` -> `comment_0001.reencode-2.tmp.mp3`
pub fn reencode_path(source: &Path, attempt: u32) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{stem}.reencode-{attempt}.tmp.mp3"))
}

/// `ffmpeg -y -i SOURCE -b:a 192k -f mp3 COPY`
pub fn reencode_command(settings: &ProbeSettings, source: &Path, copy: &Path) -> CommandSpec {
    CommandSpec::new(&settings.ffmpeg).args([
        "-y".to_string(),
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
        source.display().to_string(),
        "-b:a".to_string(),
        settings.reencode_bitrate.clone(),
        "-f".to_string(),
        "mp3".to_string(),
        copy.display().to_string(),
    ])
}

/// Decodes WAV natively and everything else through an ffmpeg conversion
/// to a scratch WAV next to the source.
pub struct FfmpegDecoder {
    runner: Arc<dyn ProcessRunner>,
    ffmpeg: String,
}

impl FfmpegDecoder {
    pub fn new(runner: Arc<dyn ProcessRunner>, ffmpeg: impl Into<String>) -> Self {
        Self {
            runner,
            ffmpeg: ffmpeg.into(),
        }
    }

    fn decode_command(&self, source: &Path, scratch: &Path) -> CommandSpec {
        CommandSpec::new(&self.ffmpeg).args([
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-i".to_string(),
            source.display().to_string(),
            "-vn".to_string(),
            "-map_metadata".to_string(),
            "-1".to_string(),
            "-flags".to_string(),
            "+bitexact".to_string(),
            "-c:a".to_string(),
            "pcm_s16le".to_string(),
            "-f".to_string(),
            "wav".to_string(),
            scratch.display().to_string(),
        ])
    }
}

#[async_trait]
impl AudioDecoder for FfmpegDecoder {
    async fn decode_duration(&self, path: &Path) -> ProbeAttempt {
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
        if is_wav {
            return match wav_duration_secs(path) {
                Ok(secs) => ProbeAttempt::Decoded(secs),
                Err(e) => ProbeAttempt::Retryable(e.to_string()),
            };
        }

        let scratch = decode_scratch_path(path);
        let output = match self.runner.run(&self.decode_command(path, &scratch)).await {
            Ok(output) => output,
            Err(e) => return ProbeAttempt::Fatal(e.to_string()),
        };

        let attempt = if output.success() {
            match wav_duration_secs(&scratch) {
                Ok(secs) => ProbeAttempt::Decoded(secs),
                Err(e) => ProbeAttempt::Retryable(e.to_string()),
            }
        } else {
            ProbeAttempt::Retryable(format!(
                "decoder exited with {:?}: {}",
                output.code,
                last_line(&output.stderr)
            ))
        };
        if scratch.exists() {
            let _ = std::fs::remove_file(&scratch);
        }
        attempt
    }
}

/// `comment_0001.mp3` -> `comment_0001.mp3.decode.tmp.wav`
pub fn decode_scratch_path(source: &Path) -> PathBuf {
    let name = source
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!("{name}.decode.tmp.wav"))
}

/// Duration of a PCM WAV file from its header.
pub fn wav_duration_secs(path: &Path) -> ReelResult<f64> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| ReelError::decode(format!("invalid WAV {}: {e}", path.display())))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(ReelError::decode(format!(
            "{} reports a zero sample rate",
            path.display()
        )));
    }
    Ok(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}
