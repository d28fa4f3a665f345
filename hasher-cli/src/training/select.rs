//! Elite selection, mutation pressure, and population refill.

use std::cmp::Ordering;

use rand::RngCore;

use super::fitness::SeedResult;
use super::population::{mutate_seed, Population, Seed};

/// Share of the population kept verbatim as elites.
pub const ELITE_KEEP_RATE: f64 = 0.25;
/// Numerator of the advantage-scaled mutation rate.
pub const MUTATION_RATE_BASE: f64 = 10.0;

/// Bit flips for a child of a candidate with the given advantage: strong
/// candidates get gentle mutation, weak ones get the full rate.
pub fn mutation_flips(advantage: f64) -> u32 {
    let rate = MUTATION_RATE_BASE / (advantage.abs() + 1.0);
    rate.clamp(1.0, 10.0) as u32
}

/// Build the next generation: elites kept verbatim, one mutated child per
/// elite, fresh random seeds filling the remainder. The population size is
/// preserved exactly.
pub fn next_generation(
    population: &mut Population,
    results: &[SeedResult],
    rng: &mut dyn RngCore,
) -> Population {
    let size = population.len();
    let generation = population.generation + 1;

    let mut order: Vec<usize> = (0..results.len()).collect();
    order.sort_by(|a, b| {
        results[*b]
            .advantage
            .partial_cmp(&results[*a].advantage)
            .unwrap_or(Ordering::Equal)
    });

    let elite_count = ((size as f64) * ELITE_KEEP_RATE).ceil() as usize;
    let mut seeds: Vec<Seed> = Vec::with_capacity(size);

    for &index in order.iter().take(elite_count) {
        if seeds.len() >= size {
            break;
        }
        let elite = &results[index];
        seeds.push(Seed {
            seed_id: elite.seed_id,
            bytes: elite.seed.clone(),
            generation,
            fitness: elite.reward,
        });
        if seeds.len() < size {
            let mut child_bytes = elite.seed.clone();
            mutate_seed(&mut child_bytes, mutation_flips(elite.advantage), rng);
            seeds.push(Seed {
                seed_id: population.allocate_seed_id(),
                bytes: child_bytes,
                generation,
                fitness: 0.0,
            });
        }
    }

    while seeds.len() < size {
        let seed_id = population.allocate_seed_id();
        seeds.push(Seed::random(seed_id, generation, rng));
    }

    let mut next = Population::new(0, population.target_token, population.context_hash, rng);
    next.seeds = seeds;
    next.generation = generation;
    next.next_seed_id = population.next_seed_id;
    next
}
