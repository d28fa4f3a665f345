// Shared Frame Store
// Training-frame storage shared between the trainer and the pipeline tooling

//! # Frame Store
//!
//! Immutable training frames in two interchangeable encodings (Arrow IPC
//! stream and JSON array), with keyed best-seed write-back, the associative
//! jitter index over the slot columns, and the per-token checkpoint table.

use thiserror::Error;

pub mod arrow_codec;
pub mod checkpoint;
pub mod jitter;
pub mod json_codec;
pub mod record;
pub mod seed_writer;
pub mod store;

pub use checkpoint::{CheckpointEntry, CheckpointStore};
pub use jitter::JitterOracle;
pub use record::{seed_key, TrainingRecord};
pub use seed_writer::{DualFormatWriter, SeedWriter};
pub use store::{
    codec_for_path, read_training_records, ArrowFrameCodec, FrameCodec, FrameFormat,
    JsonFrameCodec,
};

#[derive(Error, Debug)]
pub enum FrameStoreError {
    #[error("frame file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("arrow codec error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("checkpoint store error: {0}")]
    Checkpoint(#[from] sled::Error),
    #[error("refusing empty seed write for token {token_id}")]
    EmptySeed { token_id: i32 },
    #[error("unsupported frame format for path '{0}'")]
    UnsupportedFormat(String),
    #[error("frame schema mismatch: {0}")]
    SchemaMismatch(String),
}
