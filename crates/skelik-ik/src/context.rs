//! Per-skeleton IK state: effector targets plus the solver's work buffers.

use nalgebra::{DMatrix, DVector, Vector3};
use tracing::debug;

use skelik_core::error::{IkError, SkeletonError};
use skelik_core::types::JointId;
use skelik_skeleton::Skeleton;

/// Solve state bound to one [`Skeleton`].
///
/// The context owns the skeleton so that structural edits go through
/// [`IkContext::skeleton_mut`] and are detected by revision: after any
/// edit that changes the tree or the effector/static flags, call
/// [`IkContext::reinitialize`] before solving again.
///
/// Buffer layout for `K` effectors and `N` joints:
///
/// - targets: `K` world positions, ordered by effector index
/// - jacobian: `3K x 3N`; column `3 * joint_index + axis`
/// - `delta_angles`: `3N`
/// - `errors`, `expected`: `3K`
#[derive(Debug, Clone)]
pub struct IkContext {
    pub(crate) skeleton: Skeleton,
    pub(crate) joints: Vec<JointId>,
    pub(crate) effectors: Vec<JointId>,
    pub(crate) targets: Vec<Vector3<f32>>,
    pub(crate) jacobian: DMatrix<f32>,
    pub(crate) delta_angles: DVector<f32>,
    pub(crate) errors: DVector<f32>,
    pub(crate) expected: DVector<f32>,
    revision: u64,
}

impl IkContext {
    /// Build a context for `skeleton`.
    ///
    /// Runs FK once and initializes every target to its effector's current
    /// world position, so a fresh context reports zero error.
    ///
    /// # Errors
    ///
    /// [`IkError::MissingRoot`] if the skeleton has no root.
    pub fn new(skeleton: Skeleton) -> Result<Self, IkError> {
        let mut ctx = Self {
            skeleton,
            joints: Vec::new(),
            effectors: Vec::new(),
            targets: Vec::new(),
            jacobian: DMatrix::zeros(0, 0),
            delta_angles: DVector::zeros(0),
            errors: DVector::zeros(0),
            expected: DVector::zeros(0),
            revision: 0,
        };
        ctx.reinitialize()?;
        Ok(ctx)
    }

    /// Reassign joint/effector indices and resize all buffers.
    ///
    /// Effectors that were already present keep their targets; new ones
    /// start at their current world position. Idempotent while the skeleton
    /// is unchanged.
    ///
    /// # Errors
    ///
    /// [`IkError::MissingRoot`] if the skeleton has no root.
    pub fn reinitialize(&mut self) -> Result<(), IkError> {
        if self.skeleton.root().is_none() {
            return Err(IkError::MissingRoot);
        }

        let indexing = self.skeleton.assign_indices();
        self.skeleton.update_world();

        let targets: Vec<Vector3<f32>> = indexing
            .effectors
            .iter()
            .map(|&id| {
                self.effectors
                    .iter()
                    .position(|&old| old == id)
                    .map_or_else(|| self.skeleton[id].world_position(), |slot| self.targets[slot])
            })
            .collect();

        let k = indexing.effectors.len();
        let n = indexing.joints.len();
        self.targets = targets;
        self.joints = indexing.joints;
        self.effectors = indexing.effectors;
        self.jacobian = DMatrix::zeros(3 * k, 3 * n);
        self.delta_angles = DVector::zeros(3 * n);
        self.errors = DVector::zeros(3 * k);
        self.expected = DVector::zeros(3 * k);
        self.revision = indexing.revision;

        debug!(
            skeleton = self.skeleton.name(),
            joints = n,
            effectors = k,
            revision = self.revision,
            "IK context initialized"
        );
        Ok(())
    }

    pub const fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    /// Mutable access to the skeleton. Angle edits are picked up by the
    /// next solve; structural edits require [`IkContext::reinitialize`].
    pub const fn skeleton_mut(&mut self) -> &mut Skeleton {
        &mut self.skeleton
    }

    pub fn into_skeleton(self) -> Skeleton {
        self.skeleton
    }

    /// Joints in index order.
    pub fn joints(&self) -> &[JointId] {
        &self.joints
    }

    /// Effectors in index order.
    pub fn effectors(&self) -> &[JointId] {
        &self.effectors
    }

    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    pub fn num_effectors(&self) -> usize {
        self.effectors.len()
    }

    /// Jacobian from the most recent build.
    pub const fn jacobian(&self) -> &DMatrix<f32> {
        &self.jacobian
    }

    /// Angle update (degrees) applied by the most recent solver step.
    pub const fn delta_angles(&self) -> &DVector<f32> {
        &self.delta_angles
    }

    /// Whether the skeleton changed structurally since the last
    /// (re)initialization.
    pub const fn is_stale(&self) -> bool {
        self.skeleton.revision() != self.revision
    }

    pub(crate) const fn ensure_current(&self) -> Result<(), IkError> {
        if self.is_stale() {
            return Err(IkError::StaleContext {
                indexed: self.revision,
                current: self.skeleton.revision(),
            });
        }
        Ok(())
    }

    fn effector_slot(&self, effector: JointId) -> Result<usize, IkError> {
        self.ensure_current()?;
        self.skeleton
            .get(effector)
            .ok_or(SkeletonError::UnknownJoint(effector))?
            .effector_index()
            .ok_or(IkError::NotAnEffector(effector))
    }

    /// Set the world-space goal for `effector`. Joint angles are not touched.
    ///
    /// # Errors
    ///
    /// [`IkError::StaleContext`] after a structural edit, an unknown handle,
    /// or [`IkError::NotAnEffector`].
    pub fn set_target(&mut self, effector: JointId, target: Vector3<f32>) -> Result<(), IkError> {
        let slot = self.effector_slot(effector)?;
        self.targets[slot] = target;
        Ok(())
    }

    /// Current goal for `effector`.
    ///
    /// # Errors
    ///
    /// Same as [`IkContext::set_target`].
    pub fn target(&self, effector: JointId) -> Result<Vector3<f32>, IkError> {
        let slot = self.effector_slot(effector)?;
        Ok(self.targets[slot])
    }

    /// All goals, ordered by effector index.
    pub fn targets(&self) -> &[Vector3<f32>] {
        &self.targets
    }

    /// Move every goal onto its effector's current position.
    ///
    /// # Errors
    ///
    /// [`IkError::StaleContext`] after a structural edit.
    pub fn reset_targets(&mut self) -> Result<(), IkError> {
        self.ensure_current()?;
        self.skeleton.update_world();
        for (target, &id) in self.targets.iter_mut().zip(&self.effectors) {
            *target = self.skeleton[id].world_position();
        }
        Ok(())
    }

    /// Largest distance between an effector and its goal, using positions
    /// from the last FK pass.
    pub fn max_error(&self) -> f32 {
        self.effectors
            .iter()
            .zip(&self.targets)
            .map(|(&id, target)| (target - self.skeleton[id].world_position()).norm())
            .fold(0.0, f32::max)
    }

    /// Fill the stacked error vector from the last FK pass and return the
    /// largest per-effector error.
    pub(crate) fn stack_errors(&mut self) -> f32 {
        let mut max_error = 0.0_f32;
        for (slot, (&id, target)) in self.effectors.iter().zip(&self.targets).enumerate() {
            let error = target - self.skeleton[id].world_position();
            self.errors.fixed_rows_mut::<3>(3 * slot).copy_from(&error);
            max_error = max_error.max(error.norm());
        }
        max_error
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
