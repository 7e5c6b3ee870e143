//! CommentReel Render Engine
//!
//! Turns per-record recordings and narration into the final video.
//!
//! # Pipeline Architecture
//!
//! ```text
//! comment_NNNN.mp3 ── AudioDurationProbe ──> duration (for recording)
//!
//! comment_NNNN.mp4 ──┐
//!                    ├── Muxer (2s narration lead-in)   ┐
//! comment_NNNN.mp3 ──┘                                  ├── BatchCombiner
//!                                                       ┘   (bounded pool)
//!                                                               │
//!                               comment_NNNN_with_audio.mp4 ────┤
//!                                                               ▼
//!                                                         Concatenator
//!                                                               │
//!                                                               ▼
//!                                                          output.mp4
//! ```

pub mod batch;
pub mod concat;
pub mod metadata;
pub mod mux;
pub mod probe;

pub use batch::{BatchCombiner, CombineOutcome, CombineReport};
pub use concat::{ConcatSettings, Concatenator};
pub use metadata::MetadataReporter;
pub use mux::{MuxSettings, Muxer, AUDIO_LEAD_IN_MS};
pub use probe::{
    AudioDecoder, AudioDuration, AudioDurationProbe, DurationSource, FfmpegDecoder, ProbeAttempt,
    ProbeSettings,
};
