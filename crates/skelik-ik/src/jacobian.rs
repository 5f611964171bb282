//! Finite-difference Jacobian of effector positions with respect to joint
//! Euler angles.
//!
//! For each effector, the builder walks the ancestor chain (effector
//! through root). Each free axis of each non-static joint on that chain is
//! bumped by the perturbation, the joint's subtree is re-evaluated, and the
//! effector's displacement divided by the perturbation becomes the column
//! entry. Entries for joints off every effector's chain stay zero.

use nalgebra::DMatrix;

use skelik_core::error::IkError;
use skelik_core::types::{Axis, JointId};
use skelik_skeleton::Skeleton;

use crate::context::IkContext;

impl IkContext {
    /// Rebuild the Jacobian around the current pose.
    ///
    /// Expects world transforms to be current. Joint angles are restored
    /// exactly afterwards.
    ///
    /// # Errors
    ///
    /// [`IkError::StaleContext`] after a structural edit.
    pub fn compute_jacobian(&mut self, perturbation: f32) -> Result<&DMatrix<f32>, IkError> {
        self.ensure_current()?;
        build_jacobian(&mut self.skeleton, &self.effectors, perturbation, &mut self.jacobian);
        Ok(&self.jacobian)
    }
}

/// Fill `jacobian` (`3K x 3N`) for `effectors` in index order.
pub(crate) fn build_jacobian(
    skeleton: &mut Skeleton,
    effectors: &[JointId],
    perturbation: f32,
    jacobian: &mut DMatrix<f32>,
) {
    debug_assert_eq!(jacobian.nrows(), 3 * effectors.len());
    debug_assert!(perturbation > 0.0, "perturbation must be positive");
    jacobian.fill(0.0);

    for (slot, &effector) in effectors.iter().enumerate() {
        let row = 3 * slot;
        let mut link = Some(effector);

        while let Some(id) = link {
            link = skeleton[id].parent();
            let Some(joint_index) = skeleton[id].joint_index() else {
                continue;
            };

            for axis in Axis::ALL {
                if !skeleton[id].is_axis_free(axis) {
                    continue;
                }

                let before = skeleton[effector].world_position();
                let saved = skeleton[id].angle(axis);

                skeleton[id].set_angle(axis, saved + perturbation);
                skeleton.update_subtree(id);
                let after = skeleton[effector].world_position();

                skeleton[id].set_angle(axis, saved);
                skeleton.update_subtree(id);

                let column = 3 * joint_index + axis.index();
                jacobian
                    .fixed_view_mut::<3, 1>(row, column)
                    .copy_from(&((after - before) / perturbation));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use skelik_skeleton::{AxisLimit, Joint, presets};

    use super::*;

    fn column(ctx: &IkContext, joint: JointId, axis: Axis, slot: usize) -> Vector3<f32> {
        let index = ctx.skeleton()[joint].joint_index().unwrap();
        ctx.jacobian()
            .fixed_view::<3, 1>(3 * slot, 3 * index + axis.index())
            .into_owned()
    }

    #[test]
    fn two_link_arm_columns() {
        let mut ctx = IkContext::new(presets::two_link_arm()).unwrap();
        let shoulder = ctx.skeleton().find("shoulder").unwrap();
        let hand = ctx.skeleton().find("hand").unwrap();
        ctx.compute_jacobian(0.01).unwrap();

        // Rotating about z swings the tip along +y, by lever arm * radians per degree.
        let per_degree = 1.0_f32.to_radians();
        assert_relative_eq!(
            column(&ctx, shoulder, Axis::Z, 0),
            Vector3::new(0.0, 2.0 * per_degree, 0.0),
            epsilon = 1e-3
        );
        assert_relative_eq!(
            column(&ctx, hand, Axis::Z, 0),
            Vector3::new(0.0, per_degree, 0.0),
            epsilon = 1e-3
        );
        // Spinning about the link's own axis does not move the tip.
        assert_relative_eq!(column(&ctx, shoulder, Axis::X, 0), Vector3::zeros(), epsilon = 1e-4);
        // Ry(+) maps +x towards -z.
        assert!(column(&ctx, shoulder, Axis::Y, 0).z < 0.0);
    }

    #[test]
    fn angles_restored_after_build() {
        let mut ctx = IkContext::new(presets::two_link_arm()).unwrap();
        let shoulder = ctx.skeleton().find("shoulder").unwrap();
        let hand = ctx.skeleton().find("hand").unwrap();
        ctx.skeleton_mut()[shoulder].angles = Vector3::new(13.7, -21.3, 44.1);
        ctx.skeleton_mut().update_world();
        let angles = ctx.skeleton()[shoulder].angles;
        let tip = *ctx.skeleton()[hand].world_transform();

        ctx.compute_jacobian(0.5).unwrap();
        assert_eq!(ctx.skeleton()[shoulder].angles, angles);
        assert_relative_eq!(*ctx.skeleton()[hand].world_transform(), tip, epsilon = 1e-6);
    }

    #[test]
    fn static_joints_and_locked_axes_have_zero_columns() {
        let mut sk = presets::two_link_arm();
        let shoulder = sk.find("shoulder").unwrap();
        let hand = sk.find("hand").unwrap();
        sk.set_static(shoulder, true).unwrap();
        sk[hand].limits[Axis::Z.index()] = Some(AxisLimit::locked(0.0));

        let mut ctx = IkContext::new(sk).unwrap();
        ctx.compute_jacobian(0.5).unwrap();
        for axis in Axis::ALL {
            assert_eq!(column(&ctx, shoulder, axis, 0), Vector3::zeros());
        }
        assert_eq!(column(&ctx, hand, Axis::Z, 0), Vector3::zeros());
        assert!(column(&ctx, hand, Axis::Y, 0).norm() > 0.0);
    }

    #[test]
    fn joints_off_the_chain_stay_zero() {
        let mut ctx = IkContext::new(presets::humanoid()).unwrap();
        ctx.compute_jacobian(0.5).unwrap();
        let hand_l = ctx.skeleton().find("ForeArmL").unwrap();
        let arm_r = ctx.skeleton().find("ArmR").unwrap();
        let slot = ctx.skeleton()[hand_l].effector_index().unwrap();
        for axis in Axis::ALL {
            assert_eq!(column(&ctx, arm_r, axis, slot), Vector3::zeros());
        }
    }

    #[test]
    fn small_step_matches_larger_step() {
        let mut sk = Skeleton::new("bent");
        let a = sk.add_root(Joint::new("a").with_offset(Vector3::new(1.0, 0.0, 0.0)));
        let b = sk
            .add_child(a, Joint::new("b").with_offset(Vector3::new(1.0, 0.0, 0.0)).with_angles(Vector3::new(0.0, 0.0, 30.0)))
            .unwrap();
        sk.add_child(b, Joint::new("tip").with_offset(Vector3::new(0.5, 0.0, 0.0)).effector())
            .unwrap();

        let mut ctx = IkContext::new(sk).unwrap();
        let coarse = ctx.compute_jacobian(0.5).unwrap().clone();
        let fine = ctx.compute_jacobian(0.05).unwrap().clone();
        assert_relative_eq!(coarse, fine, epsilon = 1e-3);
    }

    #[test]
    fn stale_context_refuses_to_build() {
        let mut ctx = IkContext::new(presets::two_link_arm()).unwrap();
        let shoulder = ctx.skeleton().find("shoulder").unwrap();
        ctx.skeleton_mut().set_static(shoulder, true).unwrap();
        assert!(matches!(ctx.compute_jacobian(0.5), Err(IkError::StaleContext { .. })));
    }
}
