//! Bevy ECS integration for the IK solver.
//!
//! Provides [`SkelikIkPlugin`] which solves every active rig in
//! [`IkRigMap`] once per frame and then copies the solved joint transforms
//! onto entities tagged with [`IkJoint`].
//!
//! # Usage
//!
//! 1. Add [`SkelikIkPlugin`] to your app.
//! 2. Register a skeleton with [`IkRigMap::insert`] or
//!    [`IkRigMap::build_and_insert`].
//! 3. Spawn one entity per joint you want to draw, with an [`IkJoint`] and a
//!    [`Transform`].
//! 4. Move goals with [`IkRigMap::set_target`]; the rig becomes active.

use std::collections::HashMap;

use bevy::prelude::*;
use nalgebra::{Matrix4, Vector3};
use tracing::warn;

use skelik_core::config::{SkeletonConfig, SolverConfig};
use skelik_core::error::{IkError, SkelikError};
use skelik_core::types::{JointId, RigId};
use skelik_skeleton::Skeleton;

use crate::context::IkContext;
use crate::solver::{JacobianTransposeSolver, SolveReport};

/// Bevy plugin that adds IK solving each frame.
///
/// Solving runs in [`Update`], chained before the transform sync so drawn
/// joints always reflect this frame's solve.
pub struct SkelikIkPlugin;

impl Plugin for SkelikIkPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<IkRigMap>()
            .init_resource::<IkSolverConfig>()
            .add_systems(Update, (ik_solve_system, sync_joint_transforms).chain());
    }
}

/// Links an entity to one joint of a registered rig.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IkJoint {
    pub rig: RigId,
    pub joint: JointId,
}

/// Per-rig IK state.
#[derive(Debug)]
pub struct IkRigEntry {
    pub context: IkContext,
    /// Inactive rigs keep their pose and are skipped by the solve system.
    pub active: bool,
    /// Report from the most recent solve, if any.
    pub last_report: Option<SolveReport>,
}

impl IkRigEntry {
    pub const fn new(context: IkContext) -> Self {
        Self {
            context,
            active: false,
            last_report: None,
        }
    }
}

/// Resource mapping [`RigId`] to IK state.
#[derive(Resource, Debug, Default)]
pub struct IkRigMap {
    rigs: HashMap<RigId, IkRigEntry>,
}

impl IkRigMap {
    /// Register a context for a rig, replacing any previous one.
    pub fn insert(&mut self, rig: RigId, context: IkContext) {
        self.rigs.insert(rig, IkRigEntry::new(context));
    }

    /// Build a [`Skeleton`] from configuration and register it.
    ///
    /// # Errors
    ///
    /// Invalid configuration, or a skeleton the IK context cannot index.
    pub fn build_and_insert(
        &mut self,
        rig: RigId,
        config: &SkeletonConfig,
    ) -> Result<(), SkelikError> {
        let skeleton = Skeleton::from_config(config)?;
        self.insert(rig, IkContext::new(skeleton)?);
        Ok(())
    }

    /// Set an effector goal and activate the rig.
    ///
    /// Unknown rigs are ignored and return `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Whatever [`IkContext::set_target`] rejects.
    pub fn set_target(
        &mut self,
        rig: RigId,
        effector: JointId,
        target: Vector3<f32>,
    ) -> Result<bool, IkError> {
        let Some(entry) = self.rigs.get_mut(&rig) else {
            return Ok(false);
        };
        entry.context.set_target(effector, target)?;
        entry.active = true;
        Ok(true)
    }

    /// Set a goal for the effector called `name`.
    ///
    /// Returns `true` if the rig and effector were found.
    pub fn set_target_by_name(&mut self, rig: RigId, name: &str, x: f32, y: f32, z: f32) -> bool {
        let Some(effector) = self
            .rigs
            .get(&rig)
            .and_then(|entry| entry.context.skeleton().find(name))
        else {
            return false;
        };
        matches!(self.set_target(rig, effector, Vector3::new(x, y, z)), Ok(true))
    }

    /// Stop solving a rig. Its pose stays where the last solve left it.
    pub fn deactivate(&mut self, rig: RigId) {
        if let Some(entry) = self.rigs.get_mut(&rig) {
            entry.active = false;
        }
    }

    pub fn remove(&mut self, rig: RigId) -> Option<IkRigEntry> {
        self.rigs.remove(&rig)
    }

    pub fn get(&self, rig: RigId) -> Option<&IkRigEntry> {
        self.rigs.get(&rig)
    }

    pub fn get_mut(&mut self, rig: RigId) -> Option<&mut IkRigEntry> {
        self.rigs.get_mut(&rig)
    }

    pub fn len(&self) -> usize {
        self.rigs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rigs.is_empty()
    }
}

/// Resource for IK solver configuration.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct IkSolverConfig(pub SolverConfig);

/// System that solves IK for all active rigs.
///
/// A rig whose context has gone stale is deactivated with a warning rather
/// than re-indexed behind the caller's back.
#[allow(clippy::needless_pass_by_value)]
pub fn ik_solve_system(mut rigs: ResMut<IkRigMap>, solver_config: Res<IkSolverConfig>) {
    let solver = JacobianTransposeSolver::new(solver_config.0);

    for (rig, entry) in &mut rigs.rigs {
        if !entry.active {
            continue;
        }
        match solver.solve(&mut entry.context) {
            Ok(report) => entry.last_report = Some(report),
            Err(err) => {
                warn!(%rig, %err, "IK solve skipped");
                entry.active = false;
            }
        }
    }
}

/// System that writes each tagged joint's world transform to its entity.
#[allow(clippy::needless_pass_by_value)]
pub fn sync_joint_transforms(rigs: Res<IkRigMap>, mut joints: Query<(&IkJoint, &mut Transform)>) {
    for (link, mut transform) in &mut joints {
        let Some(joint) = rigs
            .get(link.rig)
            .and_then(|entry| entry.context.skeleton().get(link.joint))
        else {
            continue;
        };
        *transform = Transform::from_matrix(to_mat4(joint.world_transform()));
    }
}

/// nalgebra and glam both store matrices column-major.
pub fn to_mat4(m: &Matrix4<f32>) -> Mat4 {
    Mat4::from_cols_slice(m.as_slice())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use skelik_core::config::JointConfig;
    use skelik_skeleton::presets;

    use super::*;

    fn arm_app() -> (App, JointId) {
        let mut app = App::new();
        app.add_plugins(SkelikIkPlugin);
        app.finish();
        app.cleanup();

        let context = IkContext::new(presets::two_link_arm()).unwrap();
        let hand = context.skeleton().find("hand").unwrap();
        app.world_mut().resource_mut::<IkRigMap>().insert(RigId(0), context);
        (app, hand)
    }

    #[test]
    fn plugin_builds() {
        let mut app = App::new();
        app.add_plugins(SkelikIkPlugin);
        app.finish();
        app.cleanup();
        app.update();

        assert!(app.world().get_resource::<IkRigMap>().is_some());
        assert!(app.world().get_resource::<IkSolverConfig>().is_some());
    }

    #[test]
    fn build_and_insert_from_config() {
        let config = SkeletonConfig {
            name: "arm".into(),
            joints: vec![
                JointConfig::new("shoulder", [1.0, 0.0, 0.0]),
                JointConfig {
                    parent: Some("shoulder".into()),
                    effector: true,
                    ..JointConfig::new("hand", [1.0, 0.0, 0.0])
                },
            ],
            ..SkeletonConfig::default()
        };

        let mut map = IkRigMap::default();
        map.build_and_insert(RigId(3), &config).unwrap();
        let entry = map.get(RigId(3)).unwrap();
        assert_eq!(entry.context.num_effectors(), 1);
        assert!(!entry.active);
    }

    #[test]
    fn build_and_insert_rejects_bad_config() {
        let config = SkeletonConfig {
            joints: vec![JointConfig {
                parent: Some("missing".into()),
                ..JointConfig::new("orphan", [0.0, 1.0, 0.0])
            }],
            ..SkeletonConfig::default()
        };
        let mut map = IkRigMap::default();
        assert!(matches!(
            map.build_and_insert(RigId(0), &config),
            Err(SkelikError::Config(_))
        ));
        assert!(map.is_empty());
    }

    #[test]
    fn set_target_activates_and_deactivate_stops() {
        let mut map = IkRigMap::default();
        map.insert(RigId(0), IkContext::new(presets::two_link_arm()).unwrap());

        assert!(map.set_target_by_name(RigId(0), "hand", 1.0, 1.0, 0.0));
        assert!(map.get(RigId(0)).unwrap().active);
        assert!(!map.set_target_by_name(RigId(0), "elbow", 0.0, 0.0, 0.0));
        assert!(!map.set_target_by_name(RigId(1), "hand", 0.0, 0.0, 0.0));
        assert!(!map.set_target_by_name(RigId(0), "shoulder", 0.0, 0.0, 0.0));

        map.deactivate(RigId(0));
        assert!(!map.get(RigId(0)).unwrap().active);
    }

    #[test]
    fn solve_system_moves_joint_entities() {
        let (mut app, hand) = arm_app();
        let entity = app
            .world_mut()
            .spawn((IkJoint { rig: RigId(0), joint: hand }, Transform::default()))
            .id();

        app.world_mut()
            .resource_mut::<IkRigMap>()
            .set_target(RigId(0), hand, Vector3::new(1.0, 1.0, 0.0))
            .unwrap();
        app.update();

        let report = app.world().resource::<IkRigMap>().get(RigId(0)).unwrap().last_report.unwrap();
        assert!(report.converged(), "{report:?}");

        let translation = app.world().get::<Transform>(entity).unwrap().translation;
        assert!((translation - Vec3::new(1.0, 1.0, 0.0)).length() < 0.01, "{translation}");
    }

    #[test]
    fn inactive_rig_is_not_solved() {
        let (mut app, hand) = arm_app();
        app.update();
        let entry = app.world().resource::<IkRigMap>().get(RigId(0)).unwrap();
        assert!(entry.last_report.is_none());
        assert_eq!(entry.context.skeleton()[hand].angles, Vector3::zeros());
    }

    #[test]
    fn stale_rig_is_deactivated() {
        let (mut app, hand) = arm_app();
        {
            let mut rigs = app.world_mut().resource_mut::<IkRigMap>();
            rigs.set_target(RigId(0), hand, Vector3::new(1.0, 1.0, 0.0)).unwrap();
            let context = &mut rigs.get_mut(RigId(0)).unwrap().context;
            context.skeleton_mut().set_static(hand, true).unwrap();
        }
        app.update();
        let entry = app.world().resource::<IkRigMap>().get(RigId(0)).unwrap();
        assert!(!entry.active);
        assert!(entry.last_report.is_none());
    }

    #[test]
    fn to_mat4_keeps_translation() {
        let m = Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0));
        let mat = to_mat4(&m);
        assert_eq!(mat.w_axis, Vec4::new(1.0, 2.0, 3.0, 1.0));
    }
}
