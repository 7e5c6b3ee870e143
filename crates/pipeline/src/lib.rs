//! CommentReel Pipeline
//!
//! Drives one batch of records through every stage:
//!
//! 1. narration: synthesize per record, or collect pre-made `.mp3` files
//! 2. recording: probe each narration, record the visual for that long
//! 3. combining: mux narration onto every recording, in parallel
//! 4. reporting: `metadata.json` for the work directory
//! 5. concatenation: one final clip in record order
//!
//! Per-record failures are logged and leave that record's artifact
//! missing; only a concatenation failure fails the batch.

pub mod assembler;
pub mod collect;
pub mod run;
pub mod synth;

pub use assembler::{AssembledClip, ClipAssembler};
pub use collect::{collect_audio_files, collect_visuals};
pub use run::{run_batch, BatchReport, PipelineDeps, RecordOutcome, VideoOutcome};
pub use synth::{synthesize_batch, CommandSynthesizer, SpeechSynthesizer};
