//! Ready-made skeletons for demos and tests.

use nalgebra::Vector3;

use skelik_core::types::JointId;

use crate::joint::Joint;
use crate::skeleton::Skeleton;

/// Bone thickness used by [`humanoid`] for limb geometry.
pub const LIMB_THICKNESS: f32 = 0.04;

/// Two unit links along +X: `shoulder` (root) and `hand` (effector at the tip).
///
/// At rest the hand sits at `(2, 0, 0)`; its reach is a sphere of radius 2
/// around the origin.
pub fn two_link_arm() -> Skeleton {
    let mut sk = Skeleton::new("two_link_arm");
    let shoulder = sk.add_root(
        Joint::new("shoulder")
            .with_offset(Vector3::new(1.0, 0.0, 0.0))
            .with_scale(Vector3::new(1.0, LIMB_THICKNESS, LIMB_THICKNESS))
            .with_geometry_offset(Vector3::new(0.5, 0.0, 0.0)),
    );
    link(
        &mut sk,
        shoulder,
        Joint::new("hand")
            .with_offset(Vector3::new(1.0, 0.0, 0.0))
            .with_scale(Vector3::new(1.0, LIMB_THICKNESS, LIMB_THICKNESS))
            .with_geometry_offset(Vector3::new(0.5, 0.0, 0.0))
            .effector(),
    );
    sk
}

/// Full-body figure hanging from a static head.
///
/// Hands (`ForeArmL`, `ForeArmR`) and feet (`ForeLegL`, `ForeLegR`) are
/// effectors. Head, shoulders and torso are static; the neck, upper arms
/// and thighs are free. Y is up.
pub fn humanoid() -> Skeleton {
    let t = LIMB_THICKNESS;
    let left = Vector3::new(-0.5, 0.0, 0.0);
    let right = Vector3::new(0.5, 0.0, 0.0);
    let down = Vector3::new(0.0, -0.5, 0.0);

    let mut sk = Skeleton::new("humanoid");
    let head = sk.add_root(
        Joint::new("Head")
            .with_offset(Vector3::new(0.0, -0.16, 0.0))
            .with_scale(Vector3::repeat(0.15))
            .with_geometry_offset(down)
            .fixed(),
    );
    // Invisible link between head and body.
    let neck = link(
        &mut sk,
        head,
        Joint::new("Neck")
            .with_offset(Vector3::new(0.0, -0.01, 0.0))
            .with_scale(Vector3::zeros())
            .with_geometry_offset(down),
    );

    for (side, sign, decenter) in [("L", -1.0_f32, left), ("R", 1.0, right)] {
        let shoulder = link(
            &mut sk,
            neck,
            Joint::new(format!("Shoulder{side}"))
                .with_offset(Vector3::new(sign * 0.14, 0.0, 0.0))
                .with_scale(Vector3::new(0.15, t, t))
                .with_geometry_offset(decenter)
                .fixed(),
        );
        let arm = link(
            &mut sk,
            shoulder,
            Joint::new(format!("Arm{side}"))
                .with_offset(Vector3::new(sign * 0.36, 0.0, 0.0))
                .with_scale(Vector3::new(0.35, t, t))
                .with_geometry_offset(decenter),
        );
        link(
            &mut sk,
            arm,
            Joint::new(format!("ForeArm{side}"))
                .with_offset(Vector3::new(sign * 0.26, 0.0, 0.0))
                .with_scale(Vector3::new(0.25, t, t))
                .with_geometry_offset(decenter)
                .effector(),
        );
    }

    let torso = link(
        &mut sk,
        neck,
        Joint::new("Torso")
            .with_offset(Vector3::new(0.0, -0.56, 0.0))
            .with_scale(Vector3::new(t, 0.55, t))
            .with_geometry_offset(down)
            .fixed(),
    );
    for side in ["L", "R"] {
        let leg = link(
            &mut sk,
            torso,
            Joint::new(format!("Leg{side}"))
                .with_offset(Vector3::new(0.0, -0.41, 0.0))
                .with_scale(Vector3::new(t, 0.4, t))
                .with_geometry_offset(down),
        );
        link(
            &mut sk,
            leg,
            Joint::new(format!("ForeLeg{side}"))
                .with_offset(Vector3::new(0.0, -0.36, 0.0))
                .with_scale(Vector3::new(t, 0.35, t))
                .with_geometry_offset(down)
                .effector(),
        );
    }

    sk
}

/// Add `joint` under `parent`, where `parent` was returned by this skeleton.
fn link(sk: &mut Skeleton, parent: JointId, joint: Joint) -> JointId {
    let id = sk.add_joint(joint);
    sk.link(parent, id);
    id
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn two_link_arm_rest_pose() {
        let mut sk = two_link_arm();
        sk.update_world();
        let hand = sk.find("hand").unwrap();
        assert!(sk[hand].is_effector());
        assert_relative_eq!(sk[hand].world_position(), Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(sk.reach(hand), 2.0);
    }

    #[test]
    fn humanoid_layout() {
        let mut sk = humanoid();
        let names: Vec<&str> = sk.traverse().map(|id| sk[id].name().unwrap()).collect();
        assert_eq!(
            names,
            vec![
                "Head", "Neck", "ShoulderL", "ArmL", "ForeArmL", "ShoulderR", "ArmR",
                "ForeArmR", "Torso", "LegL", "ForeLegL", "LegR", "ForeLegR",
            ]
        );

        let indexing = sk.assign_indices();
        assert_eq!(indexing.joints.len(), 13);
        let effectors: Vec<&str> = indexing
            .effectors
            .iter()
            .map(|&id| sk[id].name().unwrap())
            .collect();
        assert_eq!(effectors, vec!["ForeArmL", "ForeArmR", "ForeLegL", "ForeLegR"]);

        for name in ["Head", "ShoulderL", "ShoulderR", "Torso"] {
            assert!(sk[sk.find(name).unwrap()].is_static(), "{name} should be static");
        }
    }

    #[test]
    fn every_preset_joint_is_reachable() {
        for sk in [two_link_arm(), humanoid()] {
            assert_eq!(sk.traverse().count(), sk.len(), "{}", sk.name());
            let root = sk.root().unwrap();
            for (id, joint) in sk.iter() {
                assert_eq!(joint.parent().is_none(), id == root, "{}", sk.name());
            }
        }
    }

    #[test]
    fn humanoid_rest_positions() {
        let mut sk = humanoid();
        sk.update_world();
        let hand = sk.find("ForeArmL").unwrap();
        let foot = sk.find("ForeLegR").unwrap();
        // -0.14 - 0.36 - 0.26
        assert_relative_eq!(sk[hand].world_position(), Vector3::new(-0.76, -0.17, 0.0), epsilon = 1e-5);
        // -0.16 - 0.01 - 0.56 - 0.41 - 0.36
        assert_relative_eq!(sk[foot].world_position(), Vector3::new(0.0, -1.5, 0.0), epsilon = 1e-5);
    }
}
