//! Work directory and artifact naming.
//!
//! All artifacts for one run live flat inside a single directory. Names are
//! derived from the record index only, zero-padded so that lexicographic
//! filename order equals index order for the whole batch.

use std::path::{Path, PathBuf};

use reel_common::config::AppConfig;
use reel_common::error::{ReelError, ReelResult};

/// Common prefix of every per-record artifact.
pub const ARTIFACT_PREFIX: &str = "comment_";

/// Discriminating suffix (before the extension) of muxed clips.
pub const COMBINED_SUFFIX: &str = "_with_audio";

/// Marker carried by scratch files that must never be treated as artifacts.
pub const TEMP_MARKER: &str = ".tmp.";

/// Concat manifest file name.
pub const MANIFEST_NAME: &str = "file_list.txt";

/// Metadata summary file name.
pub const METADATA_NAME: &str = "metadata.json";

/// Audio artifact extension.
pub const AUDIO_EXTENSION: &str = "mp3";

/// Maps record indices to artifact file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNaming {
    index_width: usize,
    extension: String,
}

impl ArtifactNaming {
    pub fn new(index_width: usize, extension: impl Into<String>) -> Self {
        Self {
            index_width: index_width.max(1),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    /// Naming wide enough that every index of a batch of `len` records
    /// sorts correctly, never narrower than `min_width`.
    pub fn for_batch(len: usize, min_width: usize, extension: impl Into<String>) -> Self {
        let digits = len.saturating_sub(1).to_string().len();
        Self::new(digits.max(min_width), extension)
    }

    pub fn from_config(config: &AppConfig, batch_len: usize) -> Self {
        Self::for_batch(
            batch_len,
            config.naming.index_width,
            config.capture.extension.clone(),
        )
    }

    pub fn index_width(&self) -> usize {
        self.index_width
    }

    /// Video container extension, without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `comment_0007`
    pub fn stem(&self, index: usize) -> String {
        format!("{ARTIFACT_PREFIX}{index:0width$}", width = self.index_width)
    }

    pub fn audio(&self, index: usize) -> String {
        format!("{}.{AUDIO_EXTENSION}", self.stem(index))
    }

    pub fn visual(&self, index: usize) -> String {
        format!("{}.html", self.stem(index))
    }

    pub fn video(&self, index: usize) -> String {
        format!("{}.{}", self.stem(index), self.extension)
    }

    pub fn combined(&self, index: usize) -> String {
        format!("{}{COMBINED_SUFFIX}.{}", self.stem(index), self.extension)
    }

    /// Filename ending that selects combined clips, e.g. `_with_audio.mp4`.
    pub fn combined_ending(&self) -> String {
        format!("{COMBINED_SUFFIX}.{}", self.extension)
    }

    pub fn final_artifact(&self) -> String {
        format!("output.{}", self.extension)
    }

    /// Parse the record index back out of any artifact name.
    pub fn index_of(name: &str) -> Option<usize> {
        let rest = name.strip_prefix(ARTIFACT_PREFIX)?;
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    }
}

/// Whether `name` is a scratch file rather than an artifact.
pub fn is_scratch(name: &str) -> bool {
    name.contains(TEMP_MARKER)
}

/// The flat directory holding every artifact of one batch run.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
    naming: ArtifactNaming,
}

impl WorkDir {
    /// Create a fresh `output_{timestamp}` directory under `parent`.
    ///
    /// Fails if the directory already exists: work directories are never
    /// shared between runs.
    pub fn create(parent: &Path, naming: ArtifactNaming) -> ReelResult<Self> {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        Self::create_named(parent, &format!("output_{stamp}"), naming)
    }

    /// Create a fresh directory with an explicit name under `parent`.
    pub fn create_named(parent: &Path, name: &str, naming: ArtifactNaming) -> ReelResult<Self> {
        std::fs::create_dir_all(parent)?;
        let root = parent.join(name);
        std::fs::create_dir(&root).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                ReelError::invalid_input(format!(
                    "Work directory {} already exists; refusing to reuse it",
                    root.display()
                ))
            } else {
                e.into()
            }
        })?;
        tracing::info!(path = %root.display(), "Created work directory");
        Ok(Self { root, naming })
    }

    /// Use an existing directory (for single-stage commands).
    pub fn open(root: impl Into<PathBuf>, naming: ArtifactNaming) -> ReelResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ReelError::FileNotFound { path: root });
        }
        Ok(Self { root, naming })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn naming(&self) -> &ArtifactNaming {
        &self.naming
    }

    pub fn audio(&self, index: usize) -> PathBuf {
        self.root.join(self.naming.audio(index))
    }

    pub fn visual(&self, index: usize) -> PathBuf {
        self.root.join(self.naming.visual(index))
    }

    pub fn video(&self, index: usize) -> PathBuf {
        self.root.join(self.naming.video(index))
    }

    pub fn combined(&self, index: usize) -> PathBuf {
        self.root.join(self.naming.combined(index))
    }

    pub fn final_artifact(&self) -> PathBuf {
        self.root.join(self.naming.final_artifact())
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join(MANIFEST_NAME)
    }

    pub fn metadata(&self) -> PathBuf {
        self.root.join(METADATA_NAME)
    }
}
