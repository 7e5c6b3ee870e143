//! Per-record recording: probe the narration, then record the visual for
//! the narration's length plus the configured pad.

use std::sync::Arc;

use reel_capture_engine::{Recorder, RecordingReport, RecordingRequest};
use reel_common::config::{AppConfig, TimingConfig};
use reel_common::error::{ReelError, ReelResult};
use reel_project_model::{Record, WorkDir};
use reel_render_engine::{AudioDuration, AudioDurationProbe};

/// Record field that points a record at a remote visual instead of its
/// local `comment_NNNN.html`.
pub const VISUAL_URL_FIELD: &str = "visual_url";

/// A recorded clip and the durations that shaped it.
#[derive(Debug, Clone)]
pub struct AssembledClip {
    pub index: usize,
    pub audio: AudioDuration,
    pub recording_secs: f64,
    pub recording: RecordingReport,
}

/// Records one video per record.
pub struct ClipAssembler {
    probe: AudioDurationProbe,
    recorder: Arc<dyn Recorder>,
    timing: TimingConfig,
    frame_rate: Option<u32>,
}

impl ClipAssembler {
    pub fn new(probe: AudioDurationProbe, recorder: Arc<dyn Recorder>, timing: TimingConfig) -> Self {
        Self {
            probe,
            recorder,
            timing,
            frame_rate: None,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        probe: AudioDurationProbe,
        recorder: Arc<dyn Recorder>,
    ) -> Self {
        Self::new(probe, recorder, config.timing.clone())
    }

    /// Record at `fps` instead of the capture default.
    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = Some(fps);
        self
    }

    /// Record the visual of record `index` into the work directory.
    ///
    /// A missing visual is [`ReelError::FileNotFound`] and nothing is
    /// probed or launched. An undecodable narration fails the record
    /// rather than falling back to a guessed duration.
    pub async fn assemble(
        &self,
        index: usize,
        record: Option<&Record>,
        workdir: &WorkDir,
    ) -> ReelResult<AssembledClip> {
        let visual = visual_reference(index, record, workdir)?;

        let audio = self.probe.duration(&workdir.audio(index)).await?;
        let recording_secs = self.timing.recording_secs(audio.secs);
        tracing::info!(
            index,
            audio_secs = audio.secs,
            recording_secs,
            source = ?audio.source,
            "Recording record"
        );

        let mut request = RecordingRequest::new(visual, workdir.video(index), recording_secs);
        if let Some(fps) = self.frame_rate {
            request = request.with_frame_rate(fps);
        }
        let recording = self.recorder.record(&request).await?;

        Ok(AssembledClip {
            index,
            audio,
            recording_secs,
            recording,
        })
    }
}

/// The visual for record `index`: its `visual_url` field when that is an
/// `http(s)` address, otherwise `comment_NNNN.html` in the work directory.
pub fn visual_reference(
    index: usize,
    record: Option<&Record>,
    workdir: &WorkDir,
) -> ReelResult<String> {
    let remote = record
        .and_then(|r| r.extra.get(VISUAL_URL_FIELD))
        .and_then(|v| v.as_str())
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"));
    if let Some(url) = remote {
        return Ok(url.to_string());
    }

    let local = workdir.visual(index);
    if !local.is_file() {
        return Err(ReelError::FileNotFound { path: local });
    }
    Ok(local.display().to_string())
}
