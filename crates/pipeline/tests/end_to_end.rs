use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reel_capture_engine::{Recorder, RecordingReport, RecordingRequest, SessionState};
use reel_common::config::AppConfig;
use reel_common::error::{ReelError, ReelResult};
use reel_common::process::{CommandOutput, CommandSpec};
use reel_common::testing::{failed_output, ok_output, program_is, stdout_output, touch_last_arg, MockRunner};
use reel_pipeline::{run_batch, PipelineDeps, SpeechSynthesizer, VideoOutcome};
use reel_platform_linux::WindowGeometry;
use reel_project_model::{ArtifactNaming, RecordBatch, WorkDir};
use reel_render_engine::{CombineOutcome, DurationSource};

const PROBE_JSON: &str = r#"{
    "streams": [{"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080}],
    "format": {"duration": "5.0", "size": "1024", "bit_rate": "1000"}
}"#;

fn load_fixture_records() -> RecordBatch {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join("sample-batch")
        .join("records.json");
    RecordBatch::load(&path).expect("fixture records should load")
}

fn write_wav(path: &Path, millis: u32) -> std::io::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(std::io::Error::other)?;
    for _ in 0..millis * 8 {
        writer.write_sample(0i16).map_err(std::io::Error::other)?;
    }
    writer.finalize().map_err(std::io::Error::other)
}

/// Writes WAV narration whose length is looked up by comment text; texts
/// without an entry fail.
struct ScriptedSynthesizer {
    millis: HashMap<String, u32>,
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str, output: &Path) -> ReelResult<()> {
        match self.millis.get(text) {
            Some(&millis) => Ok(write_wav(output, millis)?),
            None => Err(ReelError::process("tts: voice model crashed")),
        }
    }
}

#[derive(Default)]
struct FakeRecorder {
    durations: Mutex<Vec<(PathBuf, f64)>>,
}

#[async_trait]
impl Recorder for FakeRecorder {
    async fn record(&self, request: &RecordingRequest) -> ReelResult<RecordingReport> {
        self.durations
            .lock()
            .unwrap()
            .push((request.output.clone(), request.duration_secs));
        std::fs::write(&request.output, b"video")?;
        Ok(RecordingReport {
            output: request.output.clone(),
            geometry: WindowGeometry {
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
            },
            elapsed: Duration::from_secs_f64(request.duration_secs),
            transitions: vec![SessionState::Completed, SessionState::Closed],
        })
    }
}

fn input_of(spec: &CommandSpec) -> String {
    let i = spec.args.iter().position(|a| a == "-i").unwrap();
    spec.args[i + 1].clone()
}

fn has_arg(spec: &CommandSpec, arg: &str) -> bool {
    spec.args.iter().any(|a| a == arg)
}

/// ffmpeg/ffprobe double: decodes are copies (the fixtures are WAV), the
/// concat manifest is captured, every other encode touches its output.
fn media_runner(manifest: Arc<Mutex<Option<String>>>, concat_fails: bool) -> MockRunner {
    MockRunner::new()
        .on_run(
            |spec| spec.program == "ffmpeg" && has_arg(spec, "pcm_s16le"),
            |spec| -> ReelResult<CommandOutput> {
                std::fs::copy(input_of(spec), spec.last_arg().unwrap())?;
                Ok(ok_output())
            },
        )
        .on_run(
            |spec| spec.program == "ffmpeg" && has_arg(spec, "concat"),
            move |spec| {
                *manifest.lock().unwrap() = Some(std::fs::read_to_string(input_of(spec))?);
                if concat_fails {
                    Ok(failed_output(1, "Invalid data found when processing input"))
                } else {
                    touch_last_arg(spec)
                }
            },
        )
        .on_run(program_is("ffmpeg"), touch_last_arg)
        .on_run(
            |spec| spec.program == "ffprobe" && has_arg(spec, "-show_streams"),
            |_| Ok(stdout_output(PROBE_JSON)),
        )
}

struct Fixture {
    _parent: tempfile::TempDir,
    workdir: WorkDir,
    records: RecordBatch,
    recorder: Arc<FakeRecorder>,
    runner: Arc<MockRunner>,
    manifest: Arc<Mutex<Option<String>>>,
    deps: PipelineDeps,
}

fn fixture(concat_fails: bool) -> Fixture {
    let records = load_fixture_records();
    let parent = tempfile::tempdir().unwrap();
    let workdir = WorkDir::create(
        parent.path(),
        ArtifactNaming::from_config(&AppConfig::default(), records.len()),
    )
    .unwrap();
    for index in records.indices() {
        std::fs::write(workdir.visual(index), "<html><body></body></html>").unwrap();
    }

    let millis = HashMap::from([
        (records.get(0).unwrap().comment.clone(), 2000),
        (records.get(2).unwrap().comment.clone(), 4000),
    ]);
    let manifest = Arc::new(Mutex::new(None));
    let runner = Arc::new(media_runner(manifest.clone(), concat_fails));
    let recorder = Arc::new(FakeRecorder::default());
    let deps = PipelineDeps::new(runner.clone(), recorder.clone())
        .with_synthesizer(Arc::new(ScriptedSynthesizer { millis }));

    Fixture {
        _parent: parent,
        workdir,
        records,
        recorder,
        runner,
        manifest,
        deps,
    }
}

#[tokio::test]
async fn batch_produces_final_clip_in_record_order() {
    let f = fixture(false);
    let report = run_batch(&AppConfig::default(), &f.records, &f.workdir, &f.deps)
        .await
        .unwrap();

    // Narration of 2s and 4s; the record without narration gets the 2s default.
    let durations: Vec<f64> = f
        .recorder
        .durations
        .lock()
        .unwrap()
        .iter()
        .map(|(_, secs)| *secs)
        .collect();
    assert_eq!(durations, vec![5.0, 5.0, 7.0]);
    assert_eq!(report.recorded(), vec![0, 1, 2]);
    assert!(matches!(
        &report.records[&1].video,
        Some(VideoOutcome::Recorded {
            audio_source: DurationSource::Default,
            ..
        })
    ));

    assert_eq!(report.combined(), vec![0, 2]);
    assert_eq!(report.records[&1].combine, Some(CombineOutcome::SkippedNoAudio));
    assert!(!report.records[&1].has_audio);
    assert!(f.workdir.combined(0).exists());
    assert!(!f.workdir.combined(1).exists());
    assert!(f.workdir.combined(2).exists());

    assert_eq!(
        f.manifest.lock().unwrap().as_deref(),
        Some("file 'comment_0000_with_audio.mp4'\nfile 'comment_0002_with_audio.mp4'\n")
    );
    assert!(!f.workdir.manifest().exists());
    assert_eq!(report.final_artifact, Some(f.workdir.final_artifact()));
    assert!(f.workdir.final_artifact().exists());
    assert_eq!(report.metadata, Some(f.workdir.metadata()));

    // No scratch decode files survive.
    let leftovers: Vec<String> = std::fs::read_dir(f.workdir.root())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains(".tmp."))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[tokio::test]
async fn missing_visual_skips_only_that_record() {
    let f = fixture(false);
    std::fs::remove_file(f.workdir.visual(2)).unwrap();

    let report = run_batch(&AppConfig::default(), &f.records, &f.workdir, &f.deps)
        .await
        .unwrap();

    assert!(matches!(
        report.records[&2].video,
        Some(VideoOutcome::Skipped { .. })
    ));
    assert_eq!(report.combined(), vec![0]);
    assert_eq!(
        report.records[&2].combine,
        Some(CombineOutcome::SkippedNoVideo)
    );
    assert_eq!(report.concatenated, vec!["comment_0000_with_audio.mp4"]);
}

#[tokio::test]
async fn concat_failure_fails_the_batch() {
    let f = fixture(true);
    let err = run_batch(&AppConfig::default(), &f.records, &f.workdir, &f.deps)
        .await
        .unwrap_err();

    assert!(err.is_batch_fatal());
    assert!(!f.workdir.manifest().exists());
    // Per-record work still happened.
    assert!(f.workdir.combined(0).exists());
    assert!(f.workdir.metadata().exists());
}

#[tokio::test]
async fn generation_without_synthesizer_is_a_config_error() {
    let f = fixture(false);
    let deps = PipelineDeps::new(f.runner.clone(), f.recorder.clone());
    let err = run_batch(&AppConfig::default(), &f.records, &f.workdir, &deps)
        .await
        .unwrap_err();
    assert!(matches!(err, ReelError::Config { .. }));
    assert_eq!(f.runner.invocations(), 0);
}

#[tokio::test]
async fn collected_audio_feeds_the_combine_stage() {
    let f = fixture(false);
    let source = tempfile::tempdir().unwrap();
    write_wav(&source.path().join("comment_0001.mp3"), 1500).unwrap();

    let mut config = AppConfig::default();
    config.stages.audio_generation = false;
    config.stages.audio_collection = true;
    config.stages.audio_collection_source = Some(source.path().to_path_buf());

    let report = run_batch(&config, &f.records, &f.workdir, &f.deps)
        .await
        .unwrap();

    let durations: Vec<f64> = f
        .recorder
        .durations
        .lock()
        .unwrap()
        .iter()
        .map(|(_, secs)| *secs)
        .collect();
    assert_eq!(durations, vec![5.0, 4.5, 5.0]);
    assert_eq!(report.combined(), vec![1]);
    assert_eq!(report.concatenated, vec!["comment_0001_with_audio.mp4"]);
}

#[tokio::test]
async fn unpadded_collected_audio_is_matched_by_index() {
    let f = fixture(false);
    let source = tempfile::tempdir().unwrap();
    write_wav(&source.path().join("comment_2.mp3"), 1000).unwrap();

    let mut config = AppConfig::default();
    config.stages.audio_generation = false;
    config.stages.audio_collection = true;
    config.stages.audio_collection_source = Some(source.path().to_path_buf());

    let report = run_batch(&config, &f.records, &f.workdir, &f.deps)
        .await
        .unwrap();

    assert!(report.records[&2].has_audio);
    assert!(matches!(
        &report.records[&2].video,
        Some(VideoOutcome::Recorded {
            audio_source: DurationSource::Measured,
            recording_secs,
            ..
        }) if (*recording_secs - 4.0).abs() < 1e-6
    ));
    assert_eq!(report.combined(), vec![2]);
    assert_eq!(report.concatenated, vec!["comment_0002_with_audio.mp4"]);
}

#[tokio::test]
async fn disabled_video_stage_skips_combine_and_concat() {
    let f = fixture(false);
    let mut config = AppConfig::default();
    config.stages.video_generation = false;

    let report = run_batch(&config, &f.records, &f.workdir, &f.deps)
        .await
        .unwrap();

    assert!(f.recorder.durations.lock().unwrap().is_empty());
    assert!(report.records.values().all(|o| o.video.is_none() && o.combine.is_none()));
    assert!(report.final_artifact.is_none());
    assert!(f.runner.runs_of("ffmpeg").iter().all(|s| !has_arg(s, "concat")));
    assert!(report.metadata.is_some());
}

#[tokio::test]
async fn visuals_are_collected_before_recording() {
    let f = fixture(false);
    let visuals = tempfile::tempdir().unwrap();
    for index in f.records.indices() {
        let name = f.workdir.naming().visual(index);
        std::fs::rename(f.workdir.visual(index), visuals.path().join(name)).unwrap();
    }

    let mut config = AppConfig::default();
    config.stages.visual_source = Some(visuals.path().to_path_buf());
    let report = run_batch(&config, &f.records, &f.workdir, &f.deps)
        .await
        .unwrap();

    assert_eq!(report.recorded(), vec![0, 1, 2]);
    assert!(f.workdir.visual(1).exists());
}
