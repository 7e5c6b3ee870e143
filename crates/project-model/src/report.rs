//! Metadata summary of a finished work directory (`metadata.json`).

use serde::{Deserialize, Serialize};

/// Descriptive metadata for one media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    /// `HH:MM:SS`
    pub duration: String,
    pub bitrate: String,
    pub size: String,
    pub streams: Vec<StreamMetadata>,
}

/// One stream inside a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bit_rate: Option<String>,
}

const SIZE_UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
const BITRATE_UNITS: [&str; 6] = ["bps", "Kbps", "Mbps", "Gbps", "Tbps", "Pbps"];

/// Human-readable byte size using 1024-based units.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }
    let (value, unit) = scale(bytes as f64, 1024.0, &SIZE_UNITS);
    format!("{value:.2} {unit}")
}

/// Human-readable bitrate using 1000-based units.
pub fn format_bitrate(bits_per_sec: u64) -> String {
    if bits_per_sec == 0 {
        return "0 bps".to_string();
    }
    let (value, unit) = scale(bits_per_sec as f64, 1000.0, &BITRATE_UNITS);
    format!("{value:.2} {unit}")
}

/// `HH:MM:SS`, truncating fractional seconds.
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

fn scale<'a>(value: f64, base: f64, units: &[&'a str]) -> (f64, &'a str) {
    let exponent = (value.ln() / base.ln()).floor().max(0.0) as usize;
    let exponent = exponent.min(units.len() - 1);
    (value / base.powi(exponent as i32), units[exponent])
}
