//! Per-token checkpoint table of best-observed seeds.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::FrameStoreError;

/// Best-observed seed for one target token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub token_id: i32,
    #[serde(with = "hex_digest")]
    pub seed_hash: [u8; 32],
    #[serde(with = "hex_bytes")]
    pub best_seed: Vec<u8>,
    pub fitness: f64,
    pub last_updated: String,
}

impl CheckpointEntry {
    pub fn new(token_id: i32, seed_hash: [u8; 32], best_seed: Vec<u8>, fitness: f64) -> Self {
        Self {
            token_id,
            seed_hash,
            best_seed,
            fitness,
            last_updated: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Sled-backed checkpoint table keyed by the token id as 4 little-endian
/// bytes. Updates are monotonic in fitness: a worse entry never replaces a
/// better one.
pub struct CheckpointStore {
    db: sled::Db,
}

impl CheckpointStore {
    pub fn open(path: &Path) -> Result<Self, FrameStoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn key(token_id: i32) -> [u8; 4] {
        token_id.to_le_bytes()
    }

    /// Save an entry if it improves on the stored fitness. Returns whether
    /// the entry was written.
    pub fn save(&self, entry: &CheckpointEntry) -> Result<bool, FrameStoreError> {
        if let Some(existing) = self.load(entry.token_id)? {
            if existing.fitness >= entry.fitness {
                return Ok(false);
            }
        }
        let value = serde_json::to_vec(entry)?;
        self.db.insert(Self::key(entry.token_id), value)?;
        self.db.flush()?;
        Ok(true)
    }

    pub fn load(&self, token_id: i32) -> Result<Option<CheckpointEntry>, FrameStoreError> {
        match self.db.get(Self::key(token_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

mod hex_digest {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(digest: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(digest))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("seed hash must be 32 bytes"))
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(token_id: i32, fitness: f64) -> CheckpointEntry {
        CheckpointEntry::new(token_id, [7u8; 32], vec![1, 2, 3, 4], fitness)
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(&dir.path().join("checkpoints")).unwrap();

        assert!(store.save(&entry(5, 1.5)).unwrap());
        let loaded = store.load(5).unwrap().unwrap();
        assert_eq!(loaded.token_id, 5);
        assert_eq!(loaded.best_seed, vec![1, 2, 3, 4]);
        assert!((loaded.fitness - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_updates_are_monotonic_in_fitness() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(&dir.path().join("checkpoints")).unwrap();

        assert!(store.save(&entry(9, 2.0)).unwrap());
        assert!(!store.save(&entry(9, 1.0)).unwrap());
        assert!((store.load(9).unwrap().unwrap().fitness - 2.0).abs() < f64::EPSILON);

        assert!(store.save(&entry(9, 3.0)).unwrap());
        assert!((store.load(9).unwrap().unwrap().fitness - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_token_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(&dir.path().join("checkpoints")).unwrap();
        assert!(store.load(404).unwrap().is_none());
    }
}
