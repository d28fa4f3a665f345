//! Buffered, frame-addressed seed write-back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::record::{seed_key, TrainingRecord};
use crate::store::{codec_for_path, FrameCodec};
use crate::FrameStoreError;

struct WriterState {
    pending: HashMap<String, Vec<u8>>,
    cached: Option<Vec<TrainingRecord>>,
}

/// Coalescing writer of best seeds into one frame file.
///
/// Pending writes accumulate in memory keyed by the canonical 13-tuple key;
/// `write_back` rewrites the sink file in one atomic replacement and keeps
/// the record cache for subsequent flushes.
pub struct SeedWriter {
    source: PathBuf,
    sink: PathBuf,
    codec: Box<dyn FrameCodec>,
    state: Mutex<WriterState>,
}

impl SeedWriter {
    pub fn new(source: PathBuf, sink: PathBuf) -> Result<Self, FrameStoreError> {
        let codec = codec_for_path(&sink)?;
        Ok(Self {
            source,
            sink,
            codec,
            state: Mutex::new(WriterState {
                pending: HashMap::new(),
                cached: None,
            }),
        })
    }

    pub fn sink_path(&self) -> &Path {
        &self.sink
    }

    /// Queue a best seed for the record addressed by (slots, target token).
    /// Empty seeds are rejected; repeated writes for one key are last-wins.
    pub fn add_seed_write(
        &self,
        slots: &[i32; 12],
        target_token_id: i32,
        seed: &[u8],
    ) -> Result<(), FrameStoreError> {
        if seed.is_empty() {
            return Err(FrameStoreError::EmptySeed {
                token_id: target_token_id,
            });
        }
        let key = seed_key(slots, target_token_id);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.pending.insert(key, seed.to_vec());
        Ok(())
    }

    pub fn pending_len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.pending.len()
    }

    /// Commit all pending seeds: load the record list once (preferring the
    /// sink if it already exists), patch matching records, rewrite the sink
    /// through a temp file rename, then clear the pending map. The cache is
    /// retained so later flushes skip the re-read.
    pub fn write_back(&self) -> Result<usize, FrameStoreError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.cached.is_none() {
            let load_from = if self.sink.exists() {
                &self.sink
            } else {
                &self.source
            };
            state.cached = Some(self.codec.read_records(load_from)?);
        }

        let pending = std::mem::take(&mut state.pending);
        let mut updated = 0usize;
        if let Some(records) = state.cached.as_mut() {
            for record in records.iter_mut() {
                if let Some(seed) = pending.get(&record.seed_key()) {
                    record.best_seed = Some(seed.clone());
                    updated += 1;
                }
            }
            if let Err(error) = self.codec.write_records(&self.sink, records) {
                // restore the map so the caller can retry the same flush
                state.pending = pending;
                return Err(error);
            }
        }
        Ok(updated)
    }
}

/// Writer pair applying one logical pending map to both frame encodings.
pub struct DualFormatWriter {
    writers: Vec<SeedWriter>,
}

impl DualFormatWriter {
    pub fn new(
        arrow_source: PathBuf,
        arrow_sink: PathBuf,
        json_source: PathBuf,
        json_sink: PathBuf,
    ) -> Result<Self, FrameStoreError> {
        Ok(Self {
            writers: vec![
                SeedWriter::new(arrow_source, arrow_sink)?,
                SeedWriter::new(json_source, json_sink)?,
            ],
        })
    }

    pub fn from_writers(writers: Vec<SeedWriter>) -> Self {
        Self { writers }
    }

    pub fn add_seed_write(
        &self,
        slots: &[i32; 12],
        target_token_id: i32,
        seed: &[u8],
    ) -> Result<(), FrameStoreError> {
        for writer in &self.writers {
            writer.add_seed_write(slots, target_token_id, seed)?;
        }
        Ok(())
    }

    pub fn pending_len(&self) -> usize {
        self.writers
            .first()
            .map(|writer| writer.pending_len())
            .unwrap_or(0)
    }

    /// Flush every encoding sequentially. A failure in a later writer does
    /// not roll back earlier ones; callers treat writes as idempotent.
    pub fn write_back(&self) -> Result<usize, FrameStoreError> {
        let mut updated = 0usize;
        for writer in &self.writers {
            updated = writer.write_back()?;
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrow_codec::{read_arrow_records, write_arrow_records};
    use crate::json_codec::write_json_records;

    fn record(target: i32) -> TrainingRecord {
        TrainingRecord {
            source_file: "paper.pdf".to_string(),
            chunk_id: target,
            window_start: 0,
            window_end: 8,
            context_length: 8,
            slots: [target; 12],
            target_token_id: target,
            token_sequence: vec![target],
            best_seed: None,
        }
    }

    #[test]
    fn test_arrow_write_back_targets_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("frames.arrow");
        let sink = dir.path().join("frames_with_seeds.arrow");
        write_arrow_records(&source, &[record(10), record(20)]).unwrap();

        let writer = SeedWriter::new(source, sink.clone()).unwrap();
        writer.add_seed_write(&[10; 12], 10, &[0xAA]).unwrap();
        let updated = writer.write_back().unwrap();
        assert_eq!(updated, 1);

        let back = read_arrow_records(&sink).unwrap();
        let seeded: Vec<&TrainingRecord> =
            back.iter().filter(|r| r.has_best_seed()).collect();
        assert_eq!(seeded.len(), 1);
        assert_eq!(seeded[0].target_token_id, 10);
        assert_eq!(seeded[0].best_seed, Some(vec![0xAA]));
        assert_eq!(
            back.iter().find(|r| r.target_token_id == 20).unwrap().best_seed,
            None
        );
    }

    #[test]
    fn test_pending_cleared_and_cache_retained() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("frames.json");
        let sink = dir.path().join("frames_with_seeds.json");
        write_json_records(&source, &[record(1)]).unwrap();

        let writer = SeedWriter::new(source.clone(), sink).unwrap();
        writer.add_seed_write(&[1; 12], 1, &[0x01]).unwrap();
        writer.write_back().unwrap();

        assert_eq!(writer.pending_len(), 0);
        let state = writer.state.lock().unwrap();
        assert!(state.cached.is_some());
    }

    #[test]
    fn test_write_back_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("frames.json");
        let sink = dir.path().join("frames_with_seeds.json");
        write_json_records(&source, &[record(4), record(5)]).unwrap();

        let writer = SeedWriter::new(source, sink.clone()).unwrap();
        writer.add_seed_write(&[4; 12], 4, &[0xCC]).unwrap();
        writer.write_back().unwrap();
        let first = std::fs::read_to_string(&sink).unwrap();

        writer.add_seed_write(&[4; 12], 4, &[0xCC]).unwrap();
        writer.write_back().unwrap();
        let second = std::fs::read_to_string(&sink).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_seed_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("frames.json");
        let sink = dir.path().join("frames_with_seeds.json");
        write_json_records(&source, &[record(3)]).unwrap();

        let writer = SeedWriter::new(source, sink).unwrap();
        assert!(writer.add_seed_write(&[3; 12], 3, &[]).is_err());
        assert_eq!(writer.pending_len(), 0);
    }

    #[test]
    fn test_last_write_wins_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("frames.json");
        let sink = dir.path().join("frames_with_seeds.json");
        write_json_records(&source, &[record(6)]).unwrap();

        let writer = SeedWriter::new(source, sink.clone()).unwrap();
        writer.add_seed_write(&[6; 12], 6, &[0x01]).unwrap();
        writer.add_seed_write(&[6; 12], 6, &[0x02]).unwrap();
        assert_eq!(writer.pending_len(), 1);
        writer.write_back().unwrap();

        let back = crate::json_codec::read_json_records(&sink).unwrap();
        assert_eq!(back[0].best_seed, Some(vec![0x02]));
    }

    #[test]
    fn test_dual_format_applies_both_encodings() {
        let dir = tempfile::tempdir().unwrap();
        let arrow_source = dir.path().join("frames.arrow");
        let json_source = dir.path().join("frames.json");
        let arrow_sink = dir.path().join("frames_with_seeds.arrow");
        let json_sink = dir.path().join("frames_with_seeds.json");
        write_arrow_records(&arrow_source, &[record(8)]).unwrap();
        write_json_records(&json_source, &[record(8)]).unwrap();

        let dual = DualFormatWriter::new(
            arrow_source,
            arrow_sink.clone(),
            json_source,
            json_sink.clone(),
        )
        .unwrap();
        dual.add_seed_write(&[8; 12], 8, &[0xEE]).unwrap();
        assert_eq!(dual.write_back().unwrap(), 1);

        let arrow_back = read_arrow_records(&arrow_sink).unwrap();
        let json_back = crate::json_codec::read_json_records(&json_sink).unwrap();
        assert_eq!(arrow_back[0].best_seed, Some(vec![0xEE]));
        assert_eq!(json_back[0].best_seed, Some(vec![0xEE]));
    }
}
