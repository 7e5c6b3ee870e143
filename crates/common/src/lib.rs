//! CommentReel Common Utilities
//!
//! Shared infrastructure for all CommentReel crates:
//! - Error types, result aliases, and the per-record/per-batch error taxonomy
//! - Configuration loading
//! - Tracing/logging initialization
//! - Supervised external processes (ffmpeg, chromedriver, xdotool)

pub mod config;
pub mod error;
pub mod logging;
pub mod process;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::*;
pub use error::*;
