//! Jacobian-transpose inverse kinematics for skelik skeletons.
//!
//! Moves the joint Euler angles of a [`Skeleton`](skelik_skeleton::Skeleton)
//! so that its effector joints approach world-space targets, using a
//! finite-difference Jacobian and an optimal step length along `J^T e`.
//!
//! # Architecture
//!
//! ```text
//! Skeleton ──► IkContext ──► JacobianTransposeSolver ──► joint angles
//!                 ▲ targets          │
//!                 └──── FK ◄─────────┘
//! ```
//!
//! The [`IkContext`] owns the skeleton, the per-effector targets and every
//! buffer the solver needs, sized once at (re)initialization. Structural
//! edits to the skeleton make the context stale until
//! [`IkContext::reinitialize`] is called.
//!
//! The Bevy plugin lives behind the default `bevy` feature.

pub mod context;
pub mod jacobian;
#[cfg(feature = "bevy")]
pub mod plugin;
pub mod solver;

pub use context::IkContext;
#[cfg(feature = "bevy")]
pub use plugin::{IkJoint, IkRigEntry, IkRigMap, IkSolverConfig, SkelikIkPlugin};
pub use solver::{JacobianTransposeSolver, SolveOutcome, SolveReport, solve_skeleton};
