//! Error types shared across CommentReel crates.

use std::path::PathBuf;

/// Top-level error type for CommentReel operations.
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Audio decode error: {message}")]
    Decode { message: String },

    #[error("Audio probe error: {message}")]
    Probe { message: String },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Browser error: {message}")]
    Browser { message: String },

    #[error("Window not found: {title}")]
    WindowNotFound { title: String },

    #[error("Timed out after {secs:.1}s waiting for {what}")]
    Timeout { what: String, secs: f64 },

    #[error("Mux error: {message}")]
    Mux { message: String },

    #[error("Concatenation error: {message}")]
    Concat { message: String },

    #[error("Process error: {message}")]
    Process { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelError.
pub type ReelResult<T> = Result<T, ReelError>;

/// How far a failure is allowed to travel.
///
/// Per-record classes stop at the batch combiner; only `FatalForBatch`
/// reaches the top-level caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rejected before any process was spawned. Never retried.
    InvalidInput,
    /// Handled locally (retry, fallback); does not abort the batch.
    RecoverableRecord,
    /// The record is skipped; its missing clip is the signal.
    FatalForRecord,
    /// Surfaced to the caller; no final artifact is produced.
    FatalForBatch,
}

impl ReelError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe {
            message: msg.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn browser(msg: impl Into<String>) -> Self {
        Self::Browser {
            message: msg.into(),
        }
    }

    pub fn mux(msg: impl Into<String>) -> Self {
        Self::Mux {
            message: msg.into(),
        }
    }

    pub fn concat(msg: impl Into<String>) -> Self {
        Self::Concat {
            message: msg.into(),
        }
    }

    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    pub fn timeout(what: impl Into<String>, secs: f64) -> Self {
        Self::Timeout {
            what: what.into(),
            secs,
        }
    }

    /// Classify this error against the pipeline's propagation policy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidInput { .. } | Self::FileNotFound { .. } | Self::Unsupported { .. } => {
                ErrorClass::InvalidInput
            }
            Self::Decode { .. } => ErrorClass::RecoverableRecord,
            Self::Concat { .. } | Self::Config { .. } => ErrorClass::FatalForBatch,
            Self::Probe { .. }
            | Self::Capture { .. }
            | Self::Browser { .. }
            | Self::WindowNotFound { .. }
            | Self::Timeout { .. }
            | Self::Mux { .. }
            | Self::Process { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Http(_)
            | Self::Other(_) => ErrorClass::FatalForRecord,
        }
    }

    /// Whether this error must stop the whole batch.
    pub fn is_batch_fatal(&self) -> bool {
        self.class() == ErrorClass::FatalForBatch
    }
}
