//! Forward kinematics: joint angles -> world transforms and positions.
//!
//! For each joint, `world = parent_world * R_xyz(angles) * T(offset)`, and
//! its world position is `world * (0, 0, 0, 1)`. The root uses the
//! skeleton's placement as its parent transform.

use nalgebra::{Matrix4, Vector4};

use skelik_core::types::JointId;

use crate::joint::euler_xyz;
use crate::skeleton::Skeleton;

impl Skeleton {
    /// Recompute transforms for the whole tree.
    pub fn update_world(&mut self) {
        if let Some(root) = self.root() {
            self.update_subtree(root);
        }
    }

    /// Recompute transforms for the subtree rooted at `top`.
    ///
    /// The parent of `top` must already hold a current world transform.
    /// Unknown handles are ignored.
    pub fn update_subtree(&mut self, top: JointId) {
        if self.get(top).is_none() {
            return;
        }

        let mut stack = std::mem::take(&mut self.fk_stack);
        stack.clear();
        stack.push(top);

        while let Some(id) = stack.pop() {
            let parent_world = self.parent_world(id);
            let joint = &mut self[id];
            joint.local = euler_xyz(&joint.angles);
            joint.world = parent_world * joint.local * Matrix4::new_translation(&joint.offset);
            joint.position = joint.world * Vector4::w();
            // reversed so the first child is evaluated first
            stack.extend(joint.children.iter().rev());
        }

        self.fk_stack = stack;
    }

    /// The transform a joint's local contribution is composed onto.
    fn parent_world(&self, id: JointId) -> Matrix4<f32> {
        match self[id].parent() {
            Some(parent) if self.root() != Some(id) => self[parent].world,
            _ => *self.placement(),
        }
    }

    /// Model matrix for drawing `id`'s bone geometry:
    /// `parent_world * local_rotation * scale * geometry_offset`.
    ///
    /// Uses the transforms from the last FK pass.
    pub fn render_transform(&self, id: JointId) -> Option<Matrix4<f32>> {
        let joint = self.get(id)?;
        Some(
            self.parent_world(id)
                * joint.local
                * Matrix4::new_nonuniform_scaling(&joint.scale)
                * Matrix4::new_translation(&joint.geometry_offset),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use super::*;
    use crate::joint::Joint;

    fn planar_arm() -> (Skeleton, JointId, JointId) {
        let mut sk = Skeleton::new("arm");
        let upper = sk.add_root(Joint::new("upper").with_offset(Vector3::new(1.0, 0.0, 0.0)));
        let lower = sk
            .add_child(
                upper,
                Joint::new("lower")
                    .with_offset(Vector3::new(1.0, 0.0, 0.0))
                    .effector(),
            )
            .unwrap();
        (sk, upper, lower)
    }

    #[test]
    fn rest_pose_positions() {
        let (mut sk, upper, lower) = planar_arm();
        sk.update_world();
        assert_relative_eq!(sk[upper].world_position(), Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(sk[lower].world_position(), Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(sk[lower].position().w, 1.0);
    }

    #[test]
    fn root_rotation_swings_whole_arm() {
        let (mut sk, upper, lower) = planar_arm();
        sk[upper].angles.z = 90.0;
        sk.update_world();
        assert_relative_eq!(sk[upper].world_position(), Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(sk[lower].world_position(), Vector3::new(0.0, 2.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn child_rotation_bends_its_own_link() {
        let (mut sk, upper, lower) = planar_arm();
        sk[lower].angles.z = 90.0;
        sk.update_world();
        assert_relative_eq!(sk[upper].world_position(), Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(sk[lower].world_position(), Vector3::new(1.0, 1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn y_rotation_lifts_out_of_plane() {
        let (mut sk, upper, lower) = planar_arm();
        sk[upper].angles.y = -90.0;
        sk.update_world();
        // Ry(-90) maps +x to +z.
        assert_relative_eq!(sk[lower].world_position(), Vector3::new(0.0, 0.0, 2.0), epsilon = 1e-6);
        assert_relative_eq!(sk[upper].world_position(), Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn placement_moves_everything() {
        let (mut sk, _, lower) = planar_arm();
        sk.set_placement(Matrix4::new_translation(&Vector3::new(0.0, 0.0, 5.0)));
        sk.update_world();
        assert_relative_eq!(sk[lower].world_position(), Vector3::new(2.0, 0.0, 5.0), epsilon = 1e-6);
    }

    #[test]
    fn subtree_update_matches_full_update() {
        let (mut sk, _, lower) = planar_arm();
        sk.update_world();
        sk[lower].angles = Vector3::new(10.0, 20.0, 30.0);
        sk.update_subtree(lower);
        let partial = *sk[lower].world_transform();
        sk.update_world();
        assert_relative_eq!(partial, *sk[lower].world_transform(), epsilon = 1e-6);
    }

    #[test]
    fn fk_is_deterministic() {
        let (mut sk, upper, lower) = planar_arm();
        sk[upper].angles = Vector3::new(12.5, -33.0, 71.0);
        sk[lower].angles = Vector3::new(-5.0, 44.0, 9.0);
        sk.update_world();
        let first = *sk[lower].world_transform();
        for _ in 0..10 {
            sk.update_world();
        }
        assert_eq!(first, *sk[lower].world_transform());
    }

    #[test]
    fn render_transform_scales_bone_from_parent_end() {
        let mut sk = Skeleton::new("bone");
        let root = sk.add_root(
            Joint::new("root")
                .with_offset(Vector3::new(1.0, 0.0, 0.0))
                .with_scale(Vector3::new(0.5, 0.1, 0.1))
                .with_geometry_offset(Vector3::new(1.0, 0.0, 0.0)),
        );
        sk.update_world();
        let m = sk.render_transform(root).unwrap();
        // Unit-cube corner (0,0,0) lands at scale * geometry_offset.
        let origin = m * Vector4::w();
        assert_relative_eq!(origin.xyz(), Vector3::new(0.5, 0.0, 0.0), epsilon = 1e-6);
        assert!(sk.render_transform(JointId(7)).is_none());
    }

    #[test]
    fn update_ignores_unknown_joint() {
        let (mut sk, _, _) = planar_arm();
        sk.update_subtree(JointId(42));
        sk.update_world();
    }
}
