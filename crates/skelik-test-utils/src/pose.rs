//! Skeleton builders and pose assertions.

use nalgebra::Vector3;

use skelik_core::types::JointId;
use skelik_skeleton::{Joint, Skeleton};

/// Planar chain of `links` unit links along +X.
///
/// Every joint after the root is pre-bent by `bend` degrees about Z. The
/// last joint is the only effector. Returns the skeleton and the effector.
///
/// # Panics
///
/// Panics if `links` is zero.
pub fn bent_chain(links: usize, bend: f32) -> (Skeleton, JointId) {
    assert!(links > 0, "chain needs at least one link");
    let mut sk = Skeleton::new(format!("chain{links}"));
    let mut tip = sk.add_root(Joint::new("j0").with_offset(Vector3::x()));
    for i in 1..links {
        let mut joint = Joint::new(format!("j{i}"))
            .with_offset(Vector3::x())
            .with_angles(Vector3::new(0.0, 0.0, bend));
        if i == links - 1 {
            joint = joint.effector();
        }
        tip = sk.add_child(tip, joint).expect("tip is in the arena");
    }
    if links == 1 {
        sk.set_effector(tip, true).expect("root is in the arena");
    }
    (sk, tip)
}

/// Joint angles captured at one instant, for before/after comparisons.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSnapshot {
    angles: Vec<(JointId, Vector3<f32>)>,
}

impl PoseSnapshot {
    pub fn capture(skeleton: &Skeleton) -> Self {
        Self {
            angles: skeleton.iter().map(|(id, joint)| (id, joint.angles)).collect(),
        }
    }

    /// Angles of `id` at capture time.
    pub fn angles(&self, id: JointId) -> Option<Vector3<f32>> {
        self.angles
            .iter()
            .find(|(joint, _)| *joint == id)
            .map(|&(_, angles)| angles)
    }

    /// Joints whose angles differ from `skeleton`'s current ones.
    pub fn changed(&self, skeleton: &Skeleton) -> Vec<JointId> {
        self.angles
            .iter()
            .filter(|&&(id, angles)| skeleton.get(id).is_none_or(|joint| joint.angles != angles))
            .map(|&(id, _)| id)
            .collect()
    }
}

/// Assert every joint angle and world position is finite.
///
/// # Panics
///
/// Panics naming the first offending joint.
pub fn assert_pose_finite(skeleton: &Skeleton) {
    for (id, joint) in skeleton.iter() {
        assert!(
            joint.angles.iter().all(|a| a.is_finite()),
            "joint {id} has non-finite angles {}",
            joint.angles
        );
        assert!(
            joint.world_position().iter().all(|p| p.is_finite()),
            "joint {id} has non-finite position {}",
            joint.world_position()
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
