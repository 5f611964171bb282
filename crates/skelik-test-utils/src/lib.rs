//! Shared test fixtures and utilities for skelik crates.
//!
//! Provides deterministic RNG setup, small procedural skeletons, and pose
//! snapshots for before/after comparisons.

pub mod pose;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use pose::{PoseSnapshot, assert_pose_finite, bent_chain};
pub use rng::{deterministic_vec, random_offset, seeded_rng};
