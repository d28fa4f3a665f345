//! Bit-match fitness, difficulty scaling, and group-relative advantage.

/// Difficulty defaults: starting prefix bits and the clamp range.
pub const DEFAULT_DIFFICULTY_BITS: u32 = 12;
pub const MIN_DIFFICULTY_BITS: u32 = 8;
pub const MAX_DIFFICULTY_BITS: u32 = 32;

/// Advantage bonus applied to candidates that pass the winning predicate.
pub const WINNING_ADVANTAGE_BONUS: f64 = 2.0;
/// Reward bonus for an exact 32-bit match.
pub const EXACT_MATCH_BONUS: f64 = 0.5;

/// Spread scale for the stability proxy.
const STABILITY_SCALE: f64 = (1u64 << 24) as f64;

/// Evaluated candidate: result hash prefix plus the fitness decomposition.
#[derive(Debug, Clone)]
pub struct SeedResult {
    pub seed_id: u32,
    pub seed: Vec<u8>,
    pub hash_output: u32,
    pub alignment: f64,
    pub stability: f64,
    pub format: f64,
    pub reward: f64,
    pub advantage: f64,
}

/// Bits of agreement between a result and the target token.
pub fn matching_bits(hash_output: u32, target: u32) -> u32 {
    32 - (hash_output ^ target).count_ones()
}

/// Bit-prefix mask with exactly `bits` leading ones.
pub fn difficulty_mask(bits: u32) -> u32 {
    match bits {
        0 => 0,
        b if b >= 32 => u32::MAX,
        b => (!0u32) << (32 - b),
    }
}

/// Winning predicate: result and target agree on the masked prefix.
pub fn is_winning(hash_output: u32, target: u32, bits: u32) -> bool {
    let mask = difficulty_mask(bits);
    (hash_output & mask) == (target & mask)
}

/// Dynamic difficulty scaling: target bits for a 1-based epoch.
pub fn target_bits_for_epoch(epoch: u32) -> u32 {
    let epoch = epoch.max(1);
    let scaled = DEFAULT_DIFFICULTY_BITS + (1.33 * (epoch - 1) as f64).round() as u32;
    scaled.clamp(MIN_DIFFICULTY_BITS, MAX_DIFFICULTY_BITS)
}

/// Alignment component: bit share with a winning bump and a small floor so
/// advantages never go flat.
pub fn alignment(matching: u32, winning: bool) -> f64 {
    let base = 0.85 * matching as f64 / 32.0;
    let bump = if winning { 0.10 } else { 0.0 };
    base + bump + 0.001
}

/// Stability proxy in [0,1] from the last five intermediate hash prefixes:
/// lower spread means higher stability.
pub fn stability_from_intermediates(recent: &[u32]) -> f64 {
    if recent.len() < 2 {
        return 1.0;
    }
    let n = recent.len() as f64;
    let mean = recent.iter().map(|v| *v as f64).sum::<f64>() / n;
    let variance = recent
        .iter()
        .map(|v| {
            let d = *v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let sigma = variance.sqrt();
    1.0 / (1.0 + sigma / STABILITY_SCALE)
}

/// Full reward: alignment + stability + format + exact-match bonus.
pub fn reward(alignment: f64, stability: f64, format: f64, exact: bool) -> f64 {
    alignment + stability + format + if exact { EXACT_MATCH_BONUS } else { 0.0 }
}

/// Group-relative advantage over bit-match shares, with the winning bonus.
///
/// Scores are standardized against the population mean and standard
/// deviation; a zero spread leaves every advantage at zero before the bonus.
pub fn compute_advantages(results: &mut [SeedResult], target: u32, bits: u32) {
    if results.is_empty() {
        return;
    }
    let scores: Vec<f64> = results
        .iter()
        .map(|r| matching_bits(r.hash_output, target) as f64 / 32.0)
        .collect();
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores
        .iter()
        .map(|s| {
            let d = s - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let sigma = variance.sqrt();

    for (result, score) in results.iter_mut().zip(scores.iter()) {
        let mut advantage = if sigma == 0.0 {
            0.0
        } else {
            (score - mean) / sigma
        };
        if is_winning(result.hash_output, target, bits) {
            advantage += WINNING_ADVANTAGE_BONUS;
        }
        result.advantage = advantage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(seed_id: u32, hash_output: u32) -> SeedResult {
        SeedResult {
            seed_id,
            seed: vec![0u8; 32],
            hash_output,
            alignment: 0.0,
            stability: 0.0,
            format: 0.0,
            reward: 0.0,
            advantage: 0.0,
        }
    }

    #[test]
    fn test_matching_bits() {
        assert_eq!(matching_bits(0xFFFF_FFFF, 0xFFFF_FFFF), 32);
        assert_eq!(matching_bits(0, 0xFFFF_FFFF), 0);
        assert_eq!(matching_bits(0xF0F0_F0F0, 0xF0F0_F0F0), 32);
        assert_eq!(matching_bits(0b1010, 0b1000), 31);
    }

    #[test]
    fn test_mask_has_exact_leading_ones() {
        for bits in 0..=32u32 {
            let mask = difficulty_mask(bits);
            assert_eq!(mask.leading_ones(), bits, "bits={bits}");
            assert_eq!(mask.count_ones(), bits, "bits={bits}");
        }
    }

    #[test]
    fn test_winning_prefix() {
        // agree on the top 16 bits, disagree below
        assert!(is_winning(0xABCD_E000, 0xABCD_F123, 16));
        assert!(!is_winning(0xABCD_E000, 0xABCD_F123, 20));
    }

    #[test]
    fn test_difficulty_scaling() {
        assert_eq!(target_bits_for_epoch(1), 12);
        assert_eq!(target_bits_for_epoch(10), 24);
        assert_eq!(target_bits_for_epoch(100), 32);
    }

    #[test]
    fn test_alignment_floor_is_positive() {
        assert!(alignment(0, false) > 0.0);
        let full = alignment(32, true);
        assert!((full - (0.85 + 0.10 + 0.001)).abs() < 1e-12);
    }

    #[test]
    fn test_stability_prefers_low_spread() {
        let steady = stability_from_intermediates(&[100, 100, 100, 100, 100]);
        let wild =
            stability_from_intermediates(&[0, u32::MAX, 0, u32::MAX, 0]);
        assert!(steady > wild);
        assert!((0.0..=1.0).contains(&steady));
        assert!((0.0..=1.0).contains(&wild));
        assert_eq!(stability_from_intermediates(&[5]), 1.0);
    }

    #[test]
    fn test_zero_spread_means_zero_advantage() {
        let mut results = vec![result(0, 0x1234), result(1, 0x1234), result(2, 0x1234)];
        // target far from every result so none win at 32 bits
        compute_advantages(&mut results, 0xFFFF_0000, 32);
        for r in &results {
            assert_eq!(r.advantage, 0.0);
        }
    }

    #[test]
    fn test_better_match_gets_higher_advantage() {
        let target = 0xFFFF_FFFF;
        let mut results = vec![
            result(0, 0xFFFF_FFF0),
            result(1, 0x0000_0000),
            result(2, 0xFF00_0000),
        ];
        compute_advantages(&mut results, target, 32);
        assert!(results[0].advantage > results[2].advantage);
        assert!(results[2].advantage > results[1].advantage);
    }

    #[test]
    fn test_winning_bonus_applied() {
        let target = 0xABCD_0000;
        let mut results = vec![result(0, 0xABCD_0001), result(1, 0x0000_0001)];
        compute_advantages(&mut results, target, 16);
        // standardized scores are symmetric; the winner carries the +2 bonus
        assert!(results[0].advantage - results[1].advantage > WINNING_ADVANTAGE_BONUS);
    }

    #[test]
    fn test_reward_composition() {
        let r = reward(0.5, 0.9, 1.0, true);
        assert!((r - (0.5 + 0.9 + 1.0 + EXACT_MATCH_BONUS)).abs() < 1e-12);
    }
}
