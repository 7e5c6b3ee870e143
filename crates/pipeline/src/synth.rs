//! Narration through an external speech synthesizer.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reel_common::config::SynthesizerConfig;
use reel_common::error::{ReelError, ReelResult};
use reel_common::process::{CommandSpec, ProcessRunner};
use reel_project_model::{RecordBatch, WorkDir};

/// Placeholder replaced by the narrated text.
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// Placeholder replaced by the output path.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Turns text into an audio file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, output: &Path) -> ReelResult<()>;
}

/// Synthesizer backed by an external command taking `{text}` and
/// `{output}` arguments, e.g. `espeak-ng -w {output} {text}`.
pub struct CommandSynthesizer {
    runner: Arc<dyn ProcessRunner>,
    config: SynthesizerConfig,
}

impl CommandSynthesizer {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: SynthesizerConfig) -> ReelResult<Self> {
        if config.program.trim().is_empty() {
            return Err(ReelError::config("Synthesizer program is empty"));
        }
        if !config.args.iter().any(|a| a.contains(OUTPUT_PLACEHOLDER)) {
            return Err(ReelError::config(format!(
                "Synthesizer args must contain {OUTPUT_PLACEHOLDER}"
            )));
        }
        Ok(Self { runner, config })
    }

    pub fn command(&self, text: &str, output: &Path) -> CommandSpec {
        let output = output.display().to_string();
        CommandSpec::new(&self.config.program).args(self.config.args.iter().map(|arg| {
            arg.replace(OUTPUT_PLACEHOLDER, &output)
                .replace(TEXT_PLACEHOLDER, text)
        }))
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn synthesize(&self, text: &str, output: &Path) -> ReelResult<()> {
        let spec = self.command(text, output);
        let result = self.runner.run(&spec).await?;
        if !result.success() {
            return Err(ReelError::process(format!(
                "{} exited with {:?}: {}",
                self.config.program,
                result.code,
                result.stderr.trim()
            )));
        }
        if !output.is_file() {
            return Err(ReelError::process(format!(
                "{} produced no file at {}",
                self.config.program,
                output.display()
            )));
        }
        Ok(())
    }
}

/// Synthesize narration for every record, sequentially.
///
/// Returns the indices that got audio. A failed or empty record is logged
/// and left without narration; a partial output is removed.
pub async fn synthesize_batch(
    synthesizer: &dyn SpeechSynthesizer,
    records: &RecordBatch,
    workdir: &WorkDir,
) -> BTreeSet<usize> {
    let mut produced = BTreeSet::new();
    for (index, record) in records.iter() {
        let text = record.comment.trim();
        if text.is_empty() {
            tracing::warn!(index, "Empty comment; no narration");
            continue;
        }
        let output = workdir.audio(index);
        match synthesizer.synthesize(text, &output).await {
            Ok(()) => {
                tracing::info!(index, path = %output.display(), "Narration generated");
                produced.insert(index);
            }
            Err(e) => {
                tracing::error!(index, error = %e, "Speech synthesis failed; record has no narration");
                if output.exists() {
                    let _ = std::fs::remove_file(&output);
                }
            }
        }
    }
    produced
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use reel_common::testing::{failed_output, touch_last_arg, MockRunner};
    use reel_project_model::{ArtifactNaming, Record};

    fn config(args: &[&str]) -> SynthesizerConfig {
        SynthesizerConfig {
            program: "tts".to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_placeholders_are_substituted() {
        let synth = CommandSynthesizer::new(
            Arc::new(MockRunner::new()),
            config(&["--text", "{text}", "--out={output}"]),
        )
        .unwrap();
        let spec = synth.command("it's fine", Path::new("/w/comment_0000.mp3"));
        assert_eq!(spec.program, "tts");
        assert_eq!(
            spec.args,
            vec!["--text", "it's fine", "--out=/w/comment_0000.mp3"]
        );
    }

    #[test]
    fn test_output_placeholder_is_required() {
        let err = CommandSynthesizer::new(Arc::new(MockRunner::new()), config(&["{text}"]))
            .err()
            .unwrap();
        assert!(matches!(err, ReelError::Config { .. }));
    }

    #[tokio::test]
    async fn test_success_without_file_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let synth =
            CommandSynthesizer::new(Arc::new(MockRunner::new()), config(&["{text}", "{output}"]))
                .unwrap();
        let err = synth
            .synthesize("hello", &dir.path().join("a.mp3"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("produced no file"));
    }

    #[tokio::test]
    async fn test_batch_failures_leave_no_narration() {
        let parent = tempfile::tempdir().unwrap();
        let dir =
            WorkDir::create_named(parent.path(), "output_test", ArtifactNaming::new(4, "mp4")).unwrap();
        let runner = Arc::new(MockRunner::new().on_run(
            |_| true,
            |spec| {
                if spec.args[0] == "boom" {
                    std::fs::write(spec.last_arg().unwrap(), b"partial")?;
                    Ok(failed_output(1, "model crashed"))
                } else {
                    touch_last_arg(spec)
                }
            },
        ));
        let synth = CommandSynthesizer::new(runner.clone(), config(&["{text}", "{output}"])).unwrap();
        let records = RecordBatch::new(vec![
            Record::new("a", 1, "first"),
            Record::new("b", 2, "boom"),
            Record::new("c", 3, "   "),
            Record::new("d", 4, "fourth"),
        ]);

        let produced = synthesize_batch(&synth, &records, &dir).await;
        assert_eq!(produced.into_iter().collect::<Vec<_>>(), vec![0, 3]);
        assert!(dir.audio(0).exists());
        assert!(!dir.audio(1).exists());
        assert!(!dir.audio(2).exists());
        assert_eq!(runner.runs().len(), 3);
    }

    struct Recording(Mutex<Vec<String>>);

    #[async_trait]
    impl SpeechSynthesizer for Recording {
        async fn synthesize(&self, text: &str, output: &Path) -> ReelResult<()> {
            self.0.lock().unwrap().push(text.to_string());
            std::fs::write(output, b"a")?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_batch_narrates_trimmed_text_in_order() {
        let parent = tempfile::tempdir().unwrap();
        let dir =
            WorkDir::create_named(parent.path(), "output_test", ArtifactNaming::new(4, "mp4")).unwrap();
        let synth = Recording(Mutex::new(Vec::new()));
        let records = RecordBatch::new(vec![Record::new("a", 1, " one "), Record::new("b", 1, "two")]);

        synthesize_batch(&synth, &records, &dir).await;
        assert_eq!(*synth.0.lock().unwrap(), vec!["one", "two"]);
    }
}
