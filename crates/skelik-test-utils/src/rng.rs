//! Deterministic RNG utilities for reproducible tests.

use nalgebra::Vector3;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Create a deterministic `ChaCha8Rng` from a seed.
///
/// All test randomization should go through this to ensure reproducibility.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Generate a deterministic `Vec<f32>` in `[0, 1)` of length `dim` from a seed.
pub fn deterministic_vec(dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = seeded_rng(seed);
    (0..dim).map(|_| rng.r#gen::<f32>()).collect()
}

/// Random displacement with each component in `[-extent, extent]`.
pub fn random_offset(rng: &mut impl Rng, extent: f32) -> Vector3<f32> {
    Vector3::from_fn(|_, _| rng.gen_range(-extent..=extent))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
