//! Bringing externally produced artifacts into the work directory.
//!
//! Source files are matched to records by the index in their name, so
//! `comment_1.mp3` and `comment_0001.mp3` both land on record 1 under the
//! work directory's own naming.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reel_common::error::{ReelError, ReelResult};
use reel_project_model::workdir::{ARTIFACT_PREFIX, AUDIO_EXTENSION};
use reel_project_model::{ArtifactNaming, WorkDir};

/// Copy every `comment_<index>.mp3` in `source` to its record's narration
/// path. Returns the copied paths in index order.
pub fn collect_audio_files(source: &Path, workdir: &WorkDir) -> ReelResult<Vec<PathBuf>> {
    let copied = copy_by_index(source, AUDIO_EXTENSION, |i| workdir.audio(i))?;
    tracing::info!(
        source = %source.display(),
        files = copied.len(),
        "Collected audio files"
    );
    Ok(copied)
}

/// Copy rendered `comment_<index>.html` visuals from `source` to their
/// record's visual path.
pub fn collect_visuals(source: &Path, workdir: &WorkDir) -> ReelResult<Vec<PathBuf>> {
    let copied = copy_by_index(source, "html", |i| workdir.visual(i))?;
    tracing::info!(
        source = %source.display(),
        files = copied.len(),
        "Collected visuals"
    );
    Ok(copied)
}

/// Record index of an artifact stem such as `comment_7` or `comment_0007`.
fn artifact_index(stem: &str) -> Option<usize> {
    let digits = stem.strip_prefix(ARTIFACT_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    ArtifactNaming::index_of(stem)
}

fn copy_by_index(
    source: &Path,
    extension: &str,
    destination: impl Fn(usize) -> PathBuf,
) -> ReelResult<Vec<PathBuf>> {
    if !source.is_dir() {
        return Err(ReelError::FileNotFound {
            path: source.to_path_buf(),
        });
    }

    let mut by_index: BTreeMap<usize, PathBuf> = BTreeMap::new();
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        let Some(index) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(artifact_index)
        else {
            tracing::warn!(file = %path.display(), "No record index in file name; not collected");
            continue;
        };
        if let Some(previous) = by_index.insert(index, path.clone()) {
            tracing::warn!(
                index,
                kept = %path.display(),
                ignored = %previous.display(),
                "Two source files for one record"
            );
        }
    }

    let mut copied = Vec::with_capacity(by_index.len());
    for (index, from) in by_index {
        let to = destination(index);
        std::fs::copy(&from, &to)?;
        tracing::debug!(index, from = %from.display(), to = %to.display(), "Copied");
        copied.push(to);
    }
    Ok(copied)
}
