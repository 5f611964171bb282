//! Articulated skeleton model for the skelik IK solver.
//!
//! A [`Skeleton`] is an arena of [`Joint`]s linked by [`JointId`] handles.
//! It exposes one canonical pre-order traversal (used for index assignment
//! and bulk iteration) and a forward-kinematics evaluator that can refresh
//! either the whole tree or a single subtree.
//!
//! ```text
//! Joint angles ──► FK (whole tree | subtree) ──► world transforms + positions
//! ```
//!
//! [`JointId`]: skelik_core::types::JointId

pub mod fk;
pub mod joint;
pub mod presets;
pub mod skeleton;

pub use joint::{AxisLimit, Joint, euler_xyz, normalize_degrees};
pub use skeleton::{Ancestors, Indexing, Skeleton, Traversal};
