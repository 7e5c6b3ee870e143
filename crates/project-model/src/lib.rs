//! CommentReel Project Model
//!
//! Data types shared by every pipeline stage:
//! - [`record`]: input records and batch loading
//! - [`workdir`]: the flat per-run directory and index-based artifact names
//! - [`report`]: the metadata summary written after a run

pub mod record;
pub mod report;
pub mod workdir;

pub use record::{Record, RecordBatch};
pub use workdir::{ArtifactNaming, WorkDir};
