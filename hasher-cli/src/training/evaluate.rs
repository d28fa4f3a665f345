//! The 21-pass associative-jitter recurrence over a candidate population.

use std::collections::HashSet;

use frame_store::JitterOracle;
use hash_kernel::{
    assemble_header, digest_prefix_u32, patch_merkle_lane, DigestBytes, HashBackend,
    HeaderBytes,
};

use super::fitness::{
    alignment, is_winning, matching_bits, reward, stability_from_intermediates, SeedResult,
};
use super::population::Population;

/// Passes of the hash/jitter recurrence per candidate.
pub const RECURRENCE_PASSES: usize = 21;
/// Intermediate prefixes retained for the stability proxy.
const STABILITY_WINDOW: usize = 5;

/// Evaluate every candidate against one record.
///
/// All candidates advance together: each pass assembles the whole
/// population's headers into one batch hash call, then applies the jitter
/// feedback per candidate. The jitter word XORs into the working copy of
/// merkle lane `pass % 4`, so the recurrence evolves instead of fixpointing.
pub fn evaluate_population(
    backend: &dyn HashBackend,
    oracle: &JitterOracle,
    slots: &[u32; 12],
    target: u32,
    population: &Population,
    timestamp: u32,
    difficulty_bits: u32,
    token_map: &HashSet<u32>,
) -> Vec<SeedResult> {
    let count = population.len();
    if count == 0 {
        return Vec::new();
    }

    let mut headers: Vec<HeaderBytes> = population
        .seeds
        .iter()
        .map(|seed| assemble_header(slots, seed.nonce(), timestamp))
        .collect();
    let mut working_lanes: Vec<[u32; 4]> =
        vec![[slots[8], slots[9], slots[10], slots[11]]; count];
    let mut recent: Vec<Vec<u32>> = vec![Vec::with_capacity(STABILITY_WINDOW); count];
    let mut final_digests: Vec<DigestBytes> = vec![[0u8; 32]; count];

    for pass in 0..RECURRENCE_PASSES {
        let digests = backend.hash_many(&headers);
        let lane = pass % 4;
        for (candidate, digest) in digests.into_iter().enumerate() {
            let probe = digest_prefix_u32(&digest);
            let window = &mut recent[candidate];
            if window.len() == STABILITY_WINDOW {
                window.remove(0);
            }
            window.push(probe);

            let jitter = oracle.lookup(probe);
            working_lanes[candidate][lane] ^= jitter;
            patch_merkle_lane(&mut headers[candidate], lane, working_lanes[candidate][lane]);
            final_digests[candidate] = digest;
        }
    }

    population
        .seeds
        .iter()
        .enumerate()
        .map(|(candidate, seed)| {
            let hash_output = digest_prefix_u32(&final_digests[candidate]);
            let winning = is_winning(hash_output, target, difficulty_bits);
            let matched = matching_bits(hash_output, target);
            let align = alignment(matched, winning);
            let stability = stability_from_intermediates(&recent[candidate]);
            let format = if token_map.contains(&hash_output) {
                1.0
            } else {
                0.0
            };
            let exact = hash_output == target;
            SeedResult {
                seed_id: seed.seed_id,
                seed: seed.bytes.clone(),
                hash_output,
                alignment: align,
                stability,
                format,
                reward: reward(align, stability, format, exact),
                advantage: 0.0,
            }
        })
        .collect()
}
