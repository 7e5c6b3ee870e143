//! Parallel muxing of a whole batch.
//!
//! Every record with a narration file becomes a mux job on a queue drained
//! by a fixed number of workers. The batch waits for all of them; one
//! record's failure never cancels another's.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use reel_project_model::{RecordBatch, WorkDir};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::mux::Muxer;

/// What happened to one record in the combine stage.
#[derive(Debug, Clone, PartialEq)]
pub enum CombineOutcome {
    Muxed { output: PathBuf },
    /// No narration file; the record had nothing to mux.
    SkippedNoAudio,
    /// Narration present but no recording to put it on.
    SkippedNoVideo,
    Failed { error: String },
}

/// Per-record outcomes of one combine run, keyed by record index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombineReport {
    pub outcomes: BTreeMap<usize, CombineOutcome>,
}

impl CombineReport {
    /// Indices that produced a clip, ascending.
    pub fn muxed(&self) -> Vec<usize> {
        self.indices_where(|o| matches!(o, CombineOutcome::Muxed { .. }))
    }

    pub fn failed(&self) -> Vec<usize> {
        self.indices_where(|o| matches!(o, CombineOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> Vec<usize> {
        self.indices_where(|o| {
            matches!(
                o,
                CombineOutcome::SkippedNoAudio | CombineOutcome::SkippedNoVideo
            )
        })
    }

    fn indices_where(&self, pred: impl Fn(&CombineOutcome) -> bool) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter(|(_, o)| pred(o))
            .map(|(i, _)| *i)
            .collect()
    }
}

/// Runs the muxer for a batch under a bounded worker pool.
pub struct BatchCombiner {
    muxer: Muxer,
    workers: usize,
}

impl BatchCombiner {
    pub fn new(muxer: Muxer, workers: usize) -> Self {
        Self {
            muxer,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Combine every record of `records` found in `workdir`.
    pub async fn combine_all(&self, records: &RecordBatch, workdir: &WorkDir) -> CombineReport {
        self.combine_indices(records.indices(), workdir).await
    }

    /// Combine the given record indices. Returns once every job finished.
    pub async fn combine_indices(
        &self,
        indices: impl IntoIterator<Item = usize>,
        workdir: &WorkDir,
    ) -> CombineReport {
        let mut report = CombineReport::default();
        let mut jobs = Vec::new();

        for index in indices {
            let audio = workdir.audio(index);
            let video = workdir.video(index);
            if !audio.is_file() {
                tracing::debug!(index, "No narration; skipping combine");
                report.outcomes.insert(index, CombineOutcome::SkippedNoAudio);
                continue;
            }
            if !video.is_file() {
                tracing::warn!(index, video = %video.display(), "Narration without recording; skipping combine");
                report.outcomes.insert(index, CombineOutcome::SkippedNoVideo);
                continue;
            }
            jobs.push(MuxJob {
                index,
                video,
                audio,
                output: workdir.combined(index),
            });
        }

        let workers = self.workers.min(jobs.len());
        tracing::info!(jobs = jobs.len(), workers, "Combining clips");
        let mut pending: BTreeSet<usize> = jobs.iter().map(|job| job.index).collect();

        let (tx, rx) = mpsc::channel(jobs.len().max(1));
        for job in jobs {
            if tx.send(job).await.is_err() {
                break;
            }
        }
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let mut tasks = JoinSet::new();
        for _ in 0..workers {
            let queue = queue.clone();
            let muxer = self.muxer.clone();
            tasks.spawn(async move {
                let mut done = Vec::new();
                loop {
                    let next = queue.lock().await.recv().await;
                    let Some(job) = next else { break };
                    let result = muxer.mux(&job.video, &job.audio, &job.output).await;
                    done.push((job.index, job.output, result));
                }
                done
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let done = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(error = %e, "Combine worker aborted");
                    continue;
                }
            };
            for (index, output, result) in done {
                pending.remove(&index);
                let outcome = match result {
                    Ok(()) => CombineOutcome::Muxed { output },
                    Err(e) => {
                        tracing::error!(index, error = %e, "Combine failed; record skipped");
                        CombineOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                report.outcomes.insert(index, outcome);
            }
        }

        // Jobs of a worker that panicked never reported back.
        for index in pending {
            report.outcomes.insert(
                index,
                CombineOutcome::Failed {
                    error: "combine worker aborted".to_string(),
                },
            );
        }

        tracing::info!(
            muxed = report.muxed().len(),
            failed = report.failed().len(),
            skipped = report.skipped().len(),
            "Combine stage finished"
        );
        report
    }
}

/// One record waiting for a worker.
struct MuxJob {
    index: usize,
    video: PathBuf,
    audio: PathBuf,
    output: PathBuf,
}
