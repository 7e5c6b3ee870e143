//! End-to-end batch run.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use reel_capture_engine::{BrowserRecorder, ChromeDriverLauncher, Recorder, RecordingSettings};
use reel_common::config::AppConfig;
use reel_common::error::{ErrorClass, ReelError, ReelResult};
use reel_common::process::{ProcessRunner, TokioProcessRunner};
use reel_project_model::{RecordBatch, WorkDir};
use reel_render_engine::{
    AudioDurationProbe, BatchCombiner, CombineOutcome, ConcatSettings, Concatenator,
    DurationSource, MetadataReporter, MuxSettings, Muxer, ProbeSettings,
};

use crate::assembler::ClipAssembler;
use crate::collect::{collect_audio_files, collect_visuals};
use crate::synth::{synthesize_batch, CommandSynthesizer, SpeechSynthesizer};

/// External collaborators of a batch run.
pub struct PipelineDeps {
    pub runner: Arc<dyn ProcessRunner>,
    pub recorder: Arc<dyn Recorder>,
    pub synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
}

impl PipelineDeps {
    pub fn new(runner: Arc<dyn ProcessRunner>, recorder: Arc<dyn Recorder>) -> Self {
        Self {
            runner,
            recorder,
            synthesizer: None,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Real processes, a chromedriver-backed recorder and the configured
    /// synthesizer command, if any.
    pub fn from_config(config: &AppConfig) -> ReelResult<Self> {
        let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner::new());
        let launcher = Arc::new(ChromeDriverLauncher::from_config(runner.clone(), config)?);
        let recorder = Arc::new(BrowserRecorder::new(
            launcher,
            runner.clone(),
            RecordingSettings::from_config(config),
        ));

        let mut deps = Self::new(runner.clone(), recorder);
        if let Some(synth) = &config.synthesizer {
            deps = deps.with_synthesizer(Arc::new(CommandSynthesizer::new(runner, synth.clone())?));
        }
        Ok(deps)
    }
}

/// What happened to one record's recording.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoOutcome {
    Recorded {
        output: PathBuf,
        audio_secs: f64,
        audio_source: DurationSource,
        recording_secs: f64,
    },
    /// Nothing to record from, e.g. the visual is missing.
    Skipped { reason: String },
    Failed { error: String },
}

/// Per-record outcome across every stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordOutcome {
    /// Narration present after the audio stage.
    pub has_audio: bool,
    /// `None` when the video stage did not run.
    pub video: Option<VideoOutcome>,
    /// `None` when the combine stage did not run.
    pub combine: Option<CombineOutcome>,
}

/// Result of a whole batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub workdir: PathBuf,
    pub records: BTreeMap<usize, RecordOutcome>,
    pub metadata: Option<PathBuf>,
    /// Clips concatenated into the final artifact, in order.
    pub concatenated: Vec<String>,
    pub final_artifact: Option<PathBuf>,
}

impl BatchReport {
    fn new(workdir: &WorkDir, records: &RecordBatch) -> Self {
        Self {
            workdir: workdir.root().to_path_buf(),
            records: records
                .indices()
                .map(|i| (i, RecordOutcome::default()))
                .collect(),
            metadata: None,
            concatenated: Vec::new(),
            final_artifact: None,
        }
    }

    /// Indices with a recorded video, ascending.
    pub fn recorded(&self) -> Vec<usize> {
        self.records
            .iter()
            .filter(|(_, o)| matches!(o.video, Some(VideoOutcome::Recorded { .. })))
            .map(|(i, _)| *i)
            .collect()
    }

    /// Indices with a combined clip, ascending.
    pub fn combined(&self) -> Vec<usize> {
        self.records
            .iter()
            .filter(|(_, o)| matches!(o.combine, Some(CombineOutcome::Muxed { .. })))
            .map(|(i, _)| *i)
            .collect()
    }
}

/// Run every enabled stage for `records` inside `workdir`.
///
/// Stages run in order: narration, recording (one record at a time),
/// combining, metadata, concatenation. Record-level failures are logged
/// and recorded in the report; a concatenation failure is returned.
pub async fn run_batch(
    config: &AppConfig,
    records: &RecordBatch,
    workdir: &WorkDir,
    deps: &PipelineDeps,
) -> ReelResult<BatchReport> {
    let stages = &config.stages;
    let mut report = BatchReport::new(workdir, records);
    tracing::info!(
        records = records.len(),
        workdir = %workdir.root().display(),
        "Starting batch"
    );

    if stages.audio_generation {
        let synthesizer = deps.synthesizer.as_deref().ok_or_else(|| {
            ReelError::config("Audio generation is enabled but no synthesizer is configured")
        })?;
        synthesize_batch(synthesizer, records, workdir).await;
    } else if stages.audio_collection {
        let source = stages.audio_collection_source.as_deref().ok_or_else(|| {
            ReelError::config("Audio collection is enabled but no source folder is configured")
        })?;
        collect_audio_files(source, workdir)?;
    }
    for (index, outcome) in report.records.iter_mut() {
        outcome.has_audio = workdir.audio(*index).is_file();
    }

    if stages.video_generation {
        if let Some(source) = &stages.visual_source {
            collect_visuals(source, workdir)?;
        }
        let probe = AudioDurationProbe::new(deps.runner.clone(), ProbeSettings::from_config(config));
        let assembler = ClipAssembler::from_config(config, probe, deps.recorder.clone());
        for (index, record) in records.iter() {
            let outcome = match assembler.assemble(index, Some(record), workdir).await {
                Ok(clip) => VideoOutcome::Recorded {
                    output: clip.recording.output,
                    audio_secs: clip.audio.secs,
                    audio_source: clip.audio.source,
                    recording_secs: clip.recording_secs,
                },
                Err(e) if e.class() == ErrorClass::InvalidInput => {
                    tracing::warn!(index, error = %e, "Record skipped");
                    VideoOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
                Err(e) => {
                    tracing::error!(index, error = %e, "Recording failed; record skipped");
                    VideoOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            if let Some(entry) = report.records.get_mut(&index) {
                entry.video = Some(outcome);
            }
        }
    }

    let combining = stages.combining
        && (stages.audio_generation || stages.audio_collection)
        && stages.video_generation;

    if combining {
        let muxer = Muxer::new(deps.runner.clone(), MuxSettings::from_config(config));
        let combiner = BatchCombiner::new(muxer, config.combine.effective_workers());
        let combined = combiner.combine_all(records, workdir).await;
        for (index, outcome) in combined.outcomes {
            if let Some(entry) = report.records.get_mut(&index) {
                entry.combine = Some(outcome);
            }
        }
    }

    let reporter = MetadataReporter::new(deps.runner.clone(), config.tools.ffprobe.clone())
        .with_extension(workdir.naming().extension());
    match reporter.write_report(workdir.root()).await {
        Ok(path) => report.metadata = Some(path),
        Err(e) => tracing::warn!(error = %e, "Failed to write metadata report"),
    }

    if combining {
        let output = workdir.final_artifact();
        let concat = Concatenator::new(deps.runner.clone(), ConcatSettings::from_config(config));
        report.concatenated = concat
            .concatenate(workdir.root(), &workdir.naming().combined_ending(), &output)
            .await?;
        report.final_artifact = Some(output);
    }

    tracing::info!(
        recorded = report.recorded().len(),
        combined = report.combined().len(),
        final_artifact = ?report.final_artifact,
        "Batch finished"
    );
    Ok(report)
}
