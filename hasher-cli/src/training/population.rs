//! Candidate seed populations and mutation.

use rand::{Rng, RngCore};

/// Seed material length in bytes. The trailing four bytes are the candidate
/// nonce, big-endian.
pub const SEED_LEN: usize = 32;

/// One candidate seed.
#[derive(Debug, Clone)]
pub struct Seed {
    pub seed_id: u32,
    pub bytes: Vec<u8>,
    pub generation: i32,
    pub fitness: f64,
}

impl Seed {
    pub fn random(seed_id: u32, generation: i32, rng: &mut dyn RngCore) -> Self {
        let mut bytes = vec![0u8; SEED_LEN];
        rng.fill_bytes(&mut bytes);
        Self {
            seed_id,
            bytes,
            generation,
            fitness: 0.0,
        }
    }

    /// The candidate nonce: big-endian view of the last four seed bytes.
    /// Seeds shorter than four bytes have no nonce region and read as 0.
    pub fn nonce(&self) -> u32 {
        nonce_of(&self.bytes)
    }
}

/// Big-endian nonce from arbitrary seed material.
pub fn nonce_of(bytes: &[u8]) -> u32 {
    if bytes.len() < 4 {
        return 0;
    }
    let tail = &bytes[bytes.len() - 4..];
    u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]])
}

/// Fixed-size population evaluated against one training record.
#[derive(Debug)]
pub struct Population {
    pub seeds: Vec<Seed>,
    pub generation: i32,
    pub target_token: i32,
    pub context_hash: u64,
    pub next_seed_id: u32,
}

impl Population {
    pub fn new(
        size: usize,
        target_token: i32,
        context_hash: u64,
        rng: &mut dyn RngCore,
    ) -> Self {
        let seeds = (0..size as u32)
            .map(|seed_id| Seed::random(seed_id, 0, rng))
            .collect();
        Self {
            seeds,
            generation: 0,
            target_token,
            context_hash,
            next_seed_id: size as u32,
        }
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn allocate_seed_id(&mut self) -> u32 {
        let id = self.next_seed_id;
        self.next_seed_id = self.next_seed_id.wrapping_add(1);
        id
    }
}

/// Flip `flips` random bits. 70% of flips land in the nonce region (last
/// four bytes), the rest anywhere before it. Seeds shorter than four bytes
/// fall back to whole-seed mutation.
pub fn mutate_seed(bytes: &mut [u8], flips: u32, rng: &mut dyn RngCore) {
    if bytes.is_empty() {
        return;
    }
    let len = bytes.len();
    for _ in 0..flips {
        let index = if len < 4 {
            rng.gen_range(0..len)
        } else if rng.gen_bool(0.7) {
            len - 4 + rng.gen_range(0..4)
        } else if len > 4 {
            rng.gen_range(0..len - 4)
        } else {
            rng.gen_range(0..len)
        };
        let bit = rng.gen_range(0..8);
        bytes[index] ^= 1 << bit;
    }
}
