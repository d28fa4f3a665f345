//! Training record model shared by both frame encodings.

use serde::{Deserialize, Serialize};

/// One training frame: twelve semantic slots, a target token, and the best
/// seed found so far (if any).
///
/// Slots 0..7 form the prev-block-hash region of the candidate header;
/// slots 8..11 seed the first sixteen bytes of the merkle-root region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub source_file: String,
    pub chunk_id: i32,
    pub window_start: i32,
    pub window_end: i32,
    pub context_length: i32,
    #[serde(rename = "asic_slots")]
    pub slots: [i32; 12],
    pub target_token_id: i32,
    #[serde(default)]
    pub token_sequence: Vec<i32>,
    #[serde(default, with = "hex_seed", skip_serializing_if = "Option::is_none")]
    pub best_seed: Option<Vec<u8>>,
}

impl TrainingRecord {
    /// A record is valid iff the token sequence is non-empty, the target
    /// token is positive, and the slot vector is not all zero.
    pub fn is_valid(&self) -> bool {
        !self.token_sequence.is_empty()
            && self.target_token_id > 0
            && self.slots.iter().any(|slot| *slot != 0)
    }

    /// Whether the frame already carries a winning seed.
    pub fn has_best_seed(&self) -> bool {
        self.best_seed
            .as_ref()
            .map(|seed| !seed.is_empty())
            .unwrap_or(false)
    }

    /// Slots reinterpreted as the u32 lanes that enter the header.
    pub fn slots_u32(&self) -> [u32; 12] {
        let mut lanes = [0u32; 12];
        for (lane, slot) in lanes.iter_mut().zip(self.slots.iter()) {
            *lane = *slot as u32;
        }
        lanes
    }

    /// Canonical pending-write key for this record.
    pub fn seed_key(&self) -> String {
        seed_key(&self.slots, self.target_token_id)
    }

    /// Columnar reads carry no token sequence; restore the singleton form.
    pub fn normalize(mut self) -> Self {
        if self.token_sequence.is_empty() {
            self.token_sequence = vec![self.target_token_id];
        }
        self
    }
}

/// Canonical colon-joined key over the 13-tuple (slots, target token).
pub fn seed_key(slots: &[i32; 12], target_token_id: i32) -> String {
    let mut key = String::with_capacity(12 * 6 + 12);
    for slot in slots {
        key.push_str(&slot.to_string());
        key.push(':');
    }
    key.push_str(&target_token_id.to_string());
    key
}

/// Hex transport encoding for optional seed bytes in JSON frames.
pub(crate) mod hex_seed {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        seed: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match seed {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let text: Option<String> = Option::deserialize(deserializer)?;
        match text {
            Some(text) if !text.is_empty() => {
                hex::decode(&text).map(Some).map_err(serde::de::Error::custom)
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> TrainingRecord {
        TrainingRecord {
            source_file: "paper.pdf".to_string(),
            chunk_id: 3,
            window_start: 0,
            window_end: 128,
            context_length: 128,
            slots: [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
            target_token_id: 42,
            token_sequence: vec![42],
            best_seed: None,
        }
    }

    #[test]
    fn test_validity() {
        assert!(sample_record().is_valid());

        let mut no_tokens = sample_record();
        no_tokens.token_sequence.clear();
        assert!(!no_tokens.is_valid());

        let mut bad_target = sample_record();
        bad_target.target_token_id = 0;
        assert!(!bad_target.is_valid());

        let mut zero_slots = sample_record();
        zero_slots.slots = [0; 12];
        assert!(!zero_slots.is_valid());
    }

    #[test]
    fn test_seed_key_canonical() {
        let record = sample_record();
        assert_eq!(record.seed_key(), "1:2:3:4:5:6:7:8:9:10:11:12:42");
    }

    #[test]
    fn test_best_seed_presence() {
        let mut record = sample_record();
        assert!(!record.has_best_seed());
        record.best_seed = Some(vec![]);
        assert!(!record.has_best_seed());
        record.best_seed = Some(vec![0xAA]);
        assert!(record.has_best_seed());
    }

    #[test]
    fn test_json_seed_round_trip() {
        let mut record = sample_record();
        record.best_seed = Some(vec![0xDE, 0xAD]);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"best_seed\":\"dead\""));
        assert!(json.contains("\"asic_slots\""));
        let back: TrainingRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_normalize_restores_singleton() {
        let mut record = sample_record();
        record.token_sequence.clear();
        let record = record.normalize();
        assert_eq!(record.token_sequence, vec![42]);
    }
}
