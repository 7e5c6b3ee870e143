//! `metadata.json` summary of a work directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reel_common::error::{ReelError, ReelResult};
use reel_common::process::{CommandSpec, ProcessRunner};
use reel_project_model::report::{
    format_bitrate, format_duration, format_size, FileMetadata, StreamMetadata,
};
use reel_project_model::workdir::{is_scratch, METADATA_NAME};
use serde::Deserialize;

/// Extensions included in the report by default.
pub const REPORTED_EXTENSIONS: &[&str] = &["mp4", "mp3"];

/// Probes media files and writes the summary.
pub struct MetadataReporter {
    runner: Arc<dyn ProcessRunner>,
    ffprobe: String,
    extensions: Vec<String>,
}

impl MetadataReporter {
    pub fn new(runner: Arc<dyn ProcessRunner>, ffprobe: impl Into<String>) -> Self {
        Self {
            runner,
            ffprobe: ffprobe.into(),
            extensions: REPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Also report files with `extension` (e.g. a non-mp4 video container).
    pub fn with_extension(mut self, extension: &str) -> Self {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if !self.extensions.contains(&extension) {
            self.extensions.push(extension);
        }
        self
    }

    /// Probe every reported file in `dir` and write `metadata.json` there.
    pub async fn write_report(&self, dir: &Path) -> ReelResult<PathBuf> {
        let entries = self.collect(dir).await?;
        let path = dir.join(METADATA_NAME);
        std::fs::write(&path, serde_json::to_string_pretty(&entries)?)?;
        tracing::info!(path = %path.display(), files = entries.len(), "Wrote metadata report");
        Ok(path)
    }

    /// Metadata for every reported file in `dir`, sorted by filename.
    /// Files whose probe fails are logged and left out.
    pub async fn collect(&self, dir: &Path) -> ReelResult<Vec<FileMetadata>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_scratch(&name) || !self.is_reported(&path) {
                continue;
            }
            files.push((name, path));
        }
        files.sort();

        let mut entries = Vec::with_capacity(files.len());
        for (name, path) in files {
            match self.probe_file(&path).await {
                Ok(meta) => entries.push(meta),
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "Error retrieving metadata");
                }
            }
        }
        Ok(entries)
    }

    fn is_reported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }

    async fn probe_file(&self, path: &Path) -> ReelResult<FileMetadata> {
        let spec = CommandSpec::new(&self.ffprobe).args([
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration,bit_rate,size".to_string(),
            "-show_streams".to_string(),
            "-of".to_string(),
            "json".to_string(),
            path.display().to_string(),
        ]);
        let output = self.runner.run(&spec).await?;
        if !output.success() {
            return Err(ReelError::probe(format!(
                "ffprobe exited with {:?}: {}",
                output.code,
                output.stderr.trim()
            )));
        }
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        parse_ffprobe(&filename, &output.stdout)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

// ffprobe prints numbers as JSON strings.
#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    bit_rate: Option<String>,
}

/// Build a report entry from `ffprobe -of json` output.
pub fn parse_ffprobe(filename: &str, json: &str) -> ReelResult<FileMetadata> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    let format = probe.format;

    let duration = number(format.duration.as_deref()).unwrap_or(0.0);
    let bitrate = number(format.bit_rate.as_deref()).unwrap_or(0.0) as u64;
    let size = number(format.size.as_deref()).unwrap_or(0.0) as u64;

    let streams = probe
        .streams
        .into_iter()
        .map(|s| StreamMetadata {
            codec_type: s.codec_type,
            codec_name: s.codec_name,
            width: s.width,
            height: s.height,
            bit_rate: s
                .bit_rate
                .as_deref()
                .and_then(|b| number(Some(b)))
                .map(|b| format_bitrate(b as u64)),
        })
        .collect();

    Ok(FileMetadata {
        filename: filename.to_string(),
        duration: format_duration(duration),
        bitrate: format_bitrate(bitrate),
        size: format_size(size),
        streams,
    })
}

fn number(value: Option<&str>) -> Option<f64> {
    value?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
