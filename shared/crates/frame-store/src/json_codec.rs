//! JSON array encoding of training frames.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::record::TrainingRecord;
use crate::FrameStoreError;

/// Read every record from a JSON frame file, in file order.
pub fn read_json_records(path: &Path) -> Result<Vec<TrainingRecord>, FrameStoreError> {
    let file = File::open(path)?;
    let records: Vec<TrainingRecord> = serde_json::from_reader(BufReader::new(file))?;
    Ok(records.into_iter().map(TrainingRecord::normalize).collect())
}

/// Serialize the full record list and replace `path` atomically.
pub fn write_json_records(
    path: &Path,
    records: &[TrainingRecord],
) -> Result<(), FrameStoreError> {
    let tmp = path.with_extension("json.tmp");
    {
        let file = File::create(&tmp)?;
        serde_json::to_writer_pretty(BufWriter::new(file), records)?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(target: i32) -> TrainingRecord {
        TrainingRecord {
            source_file: "chapter.pdf".to_string(),
            chunk_id: 1,
            window_start: 0,
            window_end: 32,
            context_length: 32,
            slots: [target, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
            target_token_id: target,
            token_sequence: vec![target, target + 1],
            best_seed: None,
        }
    }

    #[test]
    fn test_round_trip_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.json");
        let mut records = vec![record(7), record(9)];
        records[1].best_seed = Some(vec![0x01, 0x02, 0x03]);

        write_json_records(&path, &records).unwrap();
        let back = read_json_records(&path).unwrap();

        assert_eq!(back, records);
    }

    #[test]
    fn test_snake_case_keys_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.json");
        write_json_records(&path, &[record(5)]).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        for key in [
            "source_file",
            "chunk_id",
            "window_start",
            "window_end",
            "context_length",
            "asic_slots",
            "target_token_id",
            "token_sequence",
        ] {
            assert!(raw.contains(key), "missing key {key}");
        }
    }
}
