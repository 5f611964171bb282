use thiserror::Error;

use crate::types::JointId;

/// Top-level error type for skelik.
#[derive(Debug, Error)]
pub enum SkelikError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Skeleton error: {0}")]
    Skeleton(#[from] SkeletonError),

    #[error("IK error: {0}")]
    Ik(#[from] IkError),

    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid cutoff: {0} (must be finite and >= 0)")]
    InvalidCutoff(f32),

    #[error("max_iterations must be >= 1")]
    ZeroIterations,

    #[error("Invalid perturbation: {0} (must be finite and > 0)")]
    InvalidPerturbation(f32),

    #[error("Duplicate joint name: {0}")]
    DuplicateJoint(String),

    #[error("Joint {joint} references unknown parent {parent} (parents must be declared first)")]
    UnknownParent { joint: String, parent: String },

    #[error("Skeleton has no root joint")]
    NoRoot,

    #[error("Skeleton has more than one root: {0} and {1}")]
    MultipleRoots(String, String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Structural errors on the joint arena.
///
/// Copy + cheap so tree edits can propagate them freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkeletonError {
    #[error("Unknown joint {0}")]
    UnknownJoint(JointId),

    #[error("Joint {0} cannot be attached to itself")]
    SelfAttach(JointId),

    #[error("Attaching {child} under {parent} would create a cycle")]
    WouldCycle { parent: JointId, child: JointId },
}

/// Precondition violations at the solver boundary.
///
/// Numerical trouble (degenerate steps, unreachable targets) is never
/// reported here; it shows up in the solve outcome instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IkError {
    #[error("Context is stale: skeleton revision {current}, indexed at {indexed}; call reinitialize()")]
    StaleContext { indexed: u64, current: u64 },

    #[error("Joint {0} is not an effector of this context")]
    NotAnEffector(JointId),

    #[error("Skeleton has no root joint")]
    MissingRoot,

    #[error(transparent)]
    Skeleton(#[from] SkeletonError),
}
