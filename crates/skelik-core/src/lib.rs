// skelik-core: Handles, errors and configuration shared by the skelik crates.

pub mod config;
pub mod error;
pub mod types;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::config::{IkConfig, JointConfig, SkeletonConfig, SolverConfig};
    pub use crate::error::{ConfigError, IkError, SkelikError, SkeletonError};
    pub use crate::types::{Axis, JointId, RigId};
}
