use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_cutoff() -> f32 {
    0.005
}
const fn default_max_iterations() -> u32 {
    100
}
const fn default_perturbation() -> f32 {
    0.5
}
const fn default_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}
fn default_skeleton_name() -> String {
    "skeleton".into()
}

/// Joint angles and limits live in `[-MAX_DEGREES, MAX_DEGREES]`.
pub const MAX_DEGREES: f32 = 180.0;

// ---------------------------------------------------------------------------
// SolverConfig
// ---------------------------------------------------------------------------

/// Parameters for one Jacobian-transpose solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Convergence tolerance on the maximum effector error (world units).
    #[serde(default = "default_cutoff")]
    pub cutoff: f32,

    /// Iteration ceiling per solve (default: 100).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Finite-difference step for the Jacobian, in degrees (default: 0.5).
    #[serde(default = "default_perturbation")]
    pub perturbation: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            cutoff: default_cutoff(),
            max_iterations: default_max_iterations(),
            perturbation: default_perturbation(),
        }
    }
}

impl SolverConfig {
    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidCutoff`], [`ConfigError::ZeroIterations`] or
    /// [`ConfigError::InvalidPerturbation`] for the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.cutoff.is_finite() || self.cutoff < 0.0 {
            return Err(ConfigError::InvalidCutoff(self.cutoff));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if !self.perturbation.is_finite() || self.perturbation <= 0.0 {
            return Err(ConfigError::InvalidPerturbation(self.perturbation));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JointConfig
// ---------------------------------------------------------------------------

/// Description of a single joint in a [`SkeletonConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointConfig {
    /// Unique joint name.
    pub name: String,

    /// Name of the parent joint. Must be declared earlier in the list.
    /// Exactly one joint per skeleton omits it (the root).
    #[serde(default)]
    pub parent: Option<String>,

    /// Fixed local translation applied after the joint rotation.
    #[serde(default)]
    pub offset: [f32; 3],

    /// Render scale of the bone geometry. Does not affect kinematics.
    #[serde(default = "default_scale")]
    pub scale: [f32; 3],

    /// Translation applied to the bone geometry after scaling (rendering only).
    #[serde(default)]
    pub geometry_offset: [f32; 3],

    /// Initial Euler angles in degrees (XYZ).
    #[serde(default)]
    pub angles: [f32; 3],

    /// Whether this joint is driven toward a target.
    #[serde(default)]
    pub effector: bool,

    /// Whether the angles are frozen.
    #[serde(default)]
    pub is_static: bool,

    /// Optional `[min, max]` limits per axis, in degrees.
    #[serde(default)]
    pub limit_x: Option<[f32; 2]>,
    #[serde(default)]
    pub limit_y: Option<[f32; 2]>,
    #[serde(default)]
    pub limit_z: Option<[f32; 2]>,
}

impl JointConfig {
    /// A joint with the given name and offset; everything else defaulted.
    pub fn new(name: impl Into<String>, offset: [f32; 3]) -> Self {
        Self {
            name: name.into(),
            parent: None,
            offset,
            scale: default_scale(),
            geometry_offset: [0.0; 3],
            angles: [0.0; 3],
            effector: false,
            is_static: false,
            limit_x: None,
            limit_y: None,
            limit_z: None,
        }
    }

    /// Limits in X, Y, Z order.
    pub const fn limits(&self) -> [Option<[f32; 2]>; 3] {
        [self.limit_x, self.limit_y, self.limit_z]
    }
}

// ---------------------------------------------------------------------------
// SkeletonConfig
// ---------------------------------------------------------------------------

/// Data-driven skeleton description.
///
/// Parents must precede their children, which makes cycles impossible to
/// express.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonConfig {
    #[serde(default = "default_skeleton_name")]
    pub name: String,

    /// World translation of the skeleton root.
    #[serde(default)]
    pub placement: [f32; 3],

    #[serde(default)]
    pub joints: Vec<JointConfig>,
}

impl Default for SkeletonConfig {
    fn default() -> Self {
        Self {
            name: default_skeleton_name(),
            placement: [0.0; 3],
            joints: Vec::new(),
        }
    }
}

impl SkeletonConfig {
    /// Validate names, parent references, the single root and limit ranges.
    ///
    /// # Errors
    ///
    /// Returns the first problem found, walking joints in declaration order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(self.joints.len());
        let mut root: Option<&str> = None;

        for joint in &self.joints {
            match &joint.parent {
                Some(parent) if !seen.contains(parent.as_str()) => {
                    return Err(ConfigError::UnknownParent {
                        joint: joint.name.clone(),
                        parent: parent.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    if let Some(existing) = root {
                        return Err(ConfigError::MultipleRoots(
                            existing.to_string(),
                            joint.name.clone(),
                        ));
                    }
                    root = Some(&joint.name);
                }
            }

            for (axis, limit) in ["x", "y", "z"].iter().zip(joint.limits()) {
                if let Some([min, max]) = limit {
                    let in_range = |v: f32| (-MAX_DEGREES..=MAX_DEGREES).contains(&v);
                    if !(in_range(min) && in_range(max)) || min > max {
                        return Err(ConfigError::InvalidValue {
                            field: format!("{}.limit_{axis}", joint.name),
                            message: format!(
                                "expected -{MAX_DEGREES} <= min <= max <= {MAX_DEGREES}, got [{min}, {max}]"
                            ),
                        });
                    }
                }
            }

            if !seen.insert(&joint.name) {
                return Err(ConfigError::DuplicateJoint(joint.name.clone()));
            }
        }

        if root.is_none() {
            return Err(ConfigError::NoRoot);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// IkConfig
// ---------------------------------------------------------------------------

/// A complete rig description: skeleton plus solver parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IkConfig {
    #[serde(default)]
    pub solver: SolverConfig,

    #[serde(default)]
    pub skeleton: SkeletonConfig,
}

impl IkConfig {
    /// # Errors
    ///
    /// Solver errors first, then skeleton errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.solver.validate()?;
        self.skeleton.validate()
    }

    /// Load from TOML file.
    ///
    /// # Errors
    ///
    /// I/O and TOML parse errors, then anything [`IkConfig::validate`] rejects.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
