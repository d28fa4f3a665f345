//! Associative jitter index over the frame slot columns.

use crate::record::TrainingRecord;

/// Read-only nearest-neighbour index from the probe dimension (slot 0) to a
/// sibling dimension (slot 1).
///
/// Built once per training run; `lookup` is pure and deterministic for a
/// fixed column pair.
#[derive(Debug, Clone)]
pub struct JitterOracle {
    slot0: Vec<u32>,
    slot1: Vec<u32>,
}

impl JitterOracle {
    /// Index the slot-0/slot-1 columns of a record list, sorted by slot 0.
    pub fn from_records(records: &[TrainingRecord]) -> Self {
        let pairs = records
            .iter()
            .map(|record| (record.slots[0] as u32, record.slots[1] as u32))
            .collect();
        Self::from_pairs(pairs)
    }

    pub fn from_pairs(mut pairs: Vec<(u32, u32)>) -> Self {
        pairs.sort_unstable_by_key(|(probe, _)| *probe);
        let slot0 = pairs.iter().map(|(probe, _)| *probe).collect();
        let slot1 = pairs.iter().map(|(_, jitter)| *jitter).collect();
        Self { slot0, slot1 }
    }

    pub fn len(&self) -> usize {
        self.slot0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slot0.is_empty()
    }

    /// Jitter word for a 32-bit probe.
    ///
    /// Returns `slot1[i]` where `slot0[i] <= probe < slot0[i+1]`; probes
    /// below the first entry clamp to index 0, probes at or above the last
    /// entry clamp to the last index. An empty index yields 0 (XOR identity).
    pub fn lookup(&self, probe: u32) -> u32 {
        if self.slot0.is_empty() {
            return 0;
        }
        let upper = self.slot0.partition_point(|value| *value <= probe);
        let index = upper.saturating_sub(1);
        self.slot1[index]
    }
}
