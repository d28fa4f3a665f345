//! Frame codec selection and training-read semantics.

use std::path::Path;

use crate::arrow_codec::{read_arrow_records, write_arrow_records};
use crate::json_codec::{read_json_records, write_json_records};
use crate::record::TrainingRecord;
use crate::FrameStoreError;

/// Frame encoding capability set: read the full list, write the full list.
pub trait FrameCodec: Send + Sync {
    fn read_records(&self, path: &Path) -> Result<Vec<TrainingRecord>, FrameStoreError>;
    fn write_records(
        &self,
        path: &Path,
        records: &[TrainingRecord],
    ) -> Result<(), FrameStoreError>;
}

/// Columnar Arrow IPC stream codec.
#[derive(Debug, Clone, Default)]
pub struct ArrowFrameCodec;

impl FrameCodec for ArrowFrameCodec {
    fn read_records(&self, path: &Path) -> Result<Vec<TrainingRecord>, FrameStoreError> {
        read_arrow_records(path)
    }

    fn write_records(
        &self,
        path: &Path,
        records: &[TrainingRecord],
    ) -> Result<(), FrameStoreError> {
        write_arrow_records(path, records)
    }
}

/// JSON array codec.
#[derive(Debug, Clone, Default)]
pub struct JsonFrameCodec;

impl FrameCodec for JsonFrameCodec {
    fn read_records(&self, path: &Path) -> Result<Vec<TrainingRecord>, FrameStoreError> {
        read_json_records(path)
    }

    fn write_records(
        &self,
        path: &Path,
        records: &[TrainingRecord],
    ) -> Result<(), FrameStoreError> {
        write_json_records(path, records)
    }
}

/// Supported frame encodings, selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Arrow,
    Json,
}

impl FrameFormat {
    pub fn for_path(path: &Path) -> Option<FrameFormat> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("arrow") => Some(FrameFormat::Arrow),
            Some("json") => Some(FrameFormat::Json),
            _ => None,
        }
    }

    pub fn codec(&self) -> Box<dyn FrameCodec> {
        match self {
            FrameFormat::Arrow => Box::new(ArrowFrameCodec),
            FrameFormat::Json => Box::new(JsonFrameCodec),
        }
    }
}

/// Resolve the codec for a frame path or fail with the offending path.
pub fn codec_for_path(path: &Path) -> Result<Box<dyn FrameCodec>, FrameStoreError> {
    FrameFormat::for_path(path)
        .map(|format| format.codec())
        .ok_or_else(|| FrameStoreError::UnsupportedFormat(path.display().to_string()))
}

/// Read the frames still awaiting training: file order, records that already
/// carry a non-empty best seed are skipped.
pub fn read_training_records(path: &Path) -> Result<Vec<TrainingRecord>, FrameStoreError> {
    let codec = codec_for_path(path)?;
    let records = codec.read_records(path)?;
    Ok(records
        .into_iter()
        .filter(|record| !record.has_best_seed())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_codec::write_json_records;
    use std::path::PathBuf;

    fn record(target: i32, seed: Option<Vec<u8>>) -> TrainingRecord {
        TrainingRecord {
            source_file: "paper.pdf".to_string(),
            chunk_id: target,
            window_start: 0,
            window_end: 16,
            context_length: 16,
            slots: [target; 12],
            target_token_id: target,
            token_sequence: vec![target],
            best_seed: seed,
        }
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            FrameFormat::for_path(&PathBuf::from("a/training_frames.arrow")),
            Some(FrameFormat::Arrow)
        );
        assert_eq!(
            FrameFormat::for_path(&PathBuf::from("training_frames.json")),
            Some(FrameFormat::Json)
        );
        assert_eq!(FrameFormat::for_path(&PathBuf::from("frames.parquet")), None);
    }

    #[test]
    fn test_training_read_skips_trained_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.json");
        write_json_records(
            &path,
            &[
                record(1, None),
                record(2, Some(vec![0xFF])),
                record(3, None),
            ],
        )
        .unwrap();

        let pending = read_training_records(&path).unwrap();
        let targets: Vec<i32> = pending.iter().map(|r| r.target_token_id).collect();
        assert_eq!(targets, vec![1, 3]);
    }

    #[test]
    fn test_unknown_format_is_an_error() {
        assert!(codec_for_path(&PathBuf::from("frames.bin")).is_err());
    }
}
