//! Joint arena with parent/child links and the canonical traversal order.
//!
//! Joints live in a flat `Vec` and refer to each other through [`JointId`]
//! handles. Each joint stores its parent and an ordered child list, so the
//! pre-order walk used for index assignment never needs raw back-pointers.
//!
//! Every structural edit (adding a joint, attach, detach, changing the root
//! or an effector/static flag) bumps [`Skeleton::revision`]. Consumers that
//! cache traversal indices compare revisions to detect stale state.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use nalgebra::{Matrix4, Vector3};
use tracing::debug;

use skelik_core::config::SkeletonConfig;
use skelik_core::error::{ConfigError, SkeletonError};
use skelik_core::types::JointId;

use crate::joint::Joint;

/// Result of an index assignment pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indexing {
    /// Reachable joints in traversal order; position == joint index.
    pub joints: Vec<JointId>,
    /// Effectors in traversal order; position == effector index.
    pub effectors: Vec<JointId>,
    /// Skeleton revision the indices were assigned at.
    pub revision: u64,
}

/// A tree of joints rooted at a single joint.
#[derive(Debug, Clone)]
pub struct Skeleton {
    name: String,
    joints: Vec<Joint>,
    root: Option<JointId>,
    placement: Matrix4<f32>,
    revision: u64,
    /// Reused DFS stack for forward kinematics.
    pub(crate) fk_stack: Vec<JointId>,
}

impl Default for Skeleton {
    fn default() -> Self {
        Self::new("skeleton")
    }
}

impl Skeleton {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            joints: Vec::new(),
            root: None,
            placement: Matrix4::identity(),
            revision: 0,
            fk_stack: Vec::new(),
        }
    }

    /// Build a skeleton from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error of `config`.
    pub fn from_config(config: &SkeletonConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut skeleton = Self::new(config.name.clone());
        skeleton.set_placement(Matrix4::new_translation(&Vector3::from(config.placement)));

        let mut by_name: HashMap<&str, JointId> = HashMap::with_capacity(config.joints.len());
        for joint_cfg in &config.joints {
            let id = skeleton.add_joint(Joint::from_config(joint_cfg));
            match joint_cfg.parent.as_deref() {
                Some(parent) => {
                    let Some(&parent_id) = by_name.get(parent) else {
                        return Err(ConfigError::UnknownParent {
                            joint: joint_cfg.name.clone(),
                            parent: parent.to_string(),
                        });
                    };
                    skeleton.link(parent_id, id);
                }
                None => skeleton.root = Some(id),
            }
            by_name.insert(&joint_cfg.name, id);
        }

        debug!(
            skeleton = %skeleton.name,
            joints = skeleton.len(),
            "built skeleton from config"
        );
        Ok(skeleton)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of joints in the arena, reachable or not.
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub const fn root(&self) -> Option<JointId> {
        self.root
    }

    /// Structural revision; changes whenever cached indices become invalid.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Global placement pre-multiplied onto the root during FK.
    pub const fn placement(&self) -> &Matrix4<f32> {
        &self.placement
    }

    pub fn set_placement(&mut self, placement: Matrix4<f32>) {
        self.placement = placement;
    }

    pub fn get(&self, id: JointId) -> Option<&Joint> {
        self.joints.get(id.0)
    }

    pub fn get_mut(&mut self, id: JointId) -> Option<&mut Joint> {
        self.joints.get_mut(id.0)
    }

    /// Look up a joint by name.
    pub fn find(&self, name: &str) -> Option<JointId> {
        self.joints
            .iter()
            .position(|j| j.name() == Some(name))
            .map(JointId)
    }

    /// Iterate over `(id, joint)` in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (JointId, &Joint)> {
        self.joints.iter().enumerate().map(|(i, j)| (JointId(i), j))
    }

    fn check(&self, id: JointId) -> Result<(), SkeletonError> {
        if id.0 < self.joints.len() {
            Ok(())
        } else {
            Err(SkeletonError::UnknownJoint(id))
        }
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    /// Add an unattached joint to the arena.
    pub fn add_joint(&mut self, mut joint: Joint) -> JointId {
        let id = JointId(self.joints.len());
        joint.parent = None;
        joint.children.clear();
        joint.joint_index = None;
        joint.effector_index = None;
        self.joints.push(joint);
        self.bump();
        id
    }

    /// Add a joint and make it the root.
    pub fn add_root(&mut self, joint: Joint) -> JointId {
        let id = self.add_joint(joint);
        self.root = Some(id);
        id
    }

    /// Add a joint and attach it as the last child of `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`SkeletonError::UnknownJoint`] if `parent` is not in the arena.
    pub fn add_child(&mut self, parent: JointId, joint: Joint) -> Result<JointId, SkeletonError> {
        self.check(parent)?;
        let id = self.add_joint(joint);
        self.link(parent, id);
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns [`SkeletonError::UnknownJoint`] if `root` is not in the arena.
    pub fn set_root(&mut self, root: JointId) -> Result<(), SkeletonError> {
        self.check(root)?;
        if self.root != Some(root) {
            self.root = Some(root);
            self.bump();
        }
        Ok(())
    }

    /// Append `child` to `parent`'s children and record the back-reference.
    ///
    /// A child that already has a parent is moved.
    ///
    /// # Errors
    ///
    /// Unknown handles, `parent == child`, or `child` being an ancestor of
    /// `parent`.
    pub fn attach(&mut self, parent: JointId, child: JointId) -> Result<(), SkeletonError> {
        self.check(parent)?;
        self.check(child)?;
        if parent == child {
            return Err(SkeletonError::SelfAttach(child));
        }
        if self.ancestors(parent).any(|id| id == child) {
            return Err(SkeletonError::WouldCycle { parent, child });
        }
        self.link(parent, child);
        Ok(())
    }

    /// Link two known joints without the checks [`Skeleton::attach`] makes.
    pub(crate) fn link(&mut self, parent: JointId, child: JointId) {
        if let Some(old) = self.joints[child.0].parent {
            self.joints[old.0].children.retain(|&c| c != child);
        }
        self.joints[parent.0].children.push(child);
        self.joints[child.0].parent = Some(parent);
        self.bump();
    }

    /// Remove `child` from `parent`'s children if present and clear its
    /// parent link. Descendants of `child` stay attached to it.
    ///
    /// Returns whether a removal happened.
    ///
    /// # Errors
    ///
    /// Returns [`SkeletonError::UnknownJoint`] for unknown handles.
    pub fn detach(&mut self, parent: JointId, child: JointId) -> Result<bool, SkeletonError> {
        self.check(parent)?;
        self.check(child)?;
        let children = &mut self.joints[parent.0].children;
        let Some(pos) = children.iter().position(|&c| c == child) else {
            return Ok(false);
        };
        children.remove(pos);
        self.joints[child.0].parent = None;
        self.bump();
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns [`SkeletonError::UnknownJoint`] for an unknown handle.
    pub fn set_effector(&mut self, id: JointId, is_effector: bool) -> Result<(), SkeletonError> {
        self.check(id)?;
        if self.joints[id.0].is_effector != is_effector {
            self.joints[id.0].is_effector = is_effector;
            self.bump();
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`SkeletonError::UnknownJoint`] for an unknown handle.
    pub fn set_static(&mut self, id: JointId, is_static: bool) -> Result<(), SkeletonError> {
        self.check(id)?;
        if self.joints[id.0].is_static != is_static {
            self.joints[id.0].is_static = is_static;
            self.bump();
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Traversal
    // -----------------------------------------------------------------------

    /// Next joint in canonical pre-order: the first child if any, else the
    /// next sibling of the nearest ancestor (including `id`) that has one.
    ///
    /// Returns `None` for an unknown handle.
    pub fn next(&self, id: JointId) -> Option<JointId> {
        self.next_within(id, None)
    }

    fn next_within(&self, id: JointId, top: Option<JointId>) -> Option<JointId> {
        if let Some(&first) = self.get(id)?.children.first() {
            return Some(first);
        }
        let mut current = id;
        while Some(current) != top {
            let parent = self.joints[current.0].parent?;
            let siblings = &self.joints[parent.0].children;
            let pos = siblings.iter().position(|&c| c == current)?;
            if let Some(&sibling) = siblings.get(pos + 1) {
                return Some(sibling);
            }
            current = parent;
        }
        None
    }

    /// Canonical traversal of the whole tree from the root.
    pub fn traverse(&self) -> Traversal<'_> {
        Traversal {
            skeleton: self,
            next: self.root,
            top: self.root,
        }
    }

    /// Canonical traversal of the subtree rooted at `top`.
    pub fn subtree(&self, top: JointId) -> Traversal<'_> {
        Traversal {
            skeleton: self,
            next: self.get(top).map(|_| top),
            top: Some(top),
        }
    }

    /// The chain from `id` up to and including the root.
    pub fn ancestors(&self, id: JointId) -> Ancestors<'_> {
        Ancestors {
            skeleton: self,
            next: self.get(id).map(|_| id),
        }
    }

    /// Sum of link lengths along the chain from `id` to the root: an upper
    /// bound on how far `id` can be from the root's pivot.
    pub fn reach(&self, id: JointId) -> f32 {
        self.ancestors(id).map(|j| self[j].offset.norm()).sum()
    }

    /// Assign joint and effector indices in canonical order.
    ///
    /// Every reachable joint gets the next joint index; effectors also get
    /// the next effector index. Joints not reachable from the root have
    /// their indices cleared. Idempotent while the structure is unchanged.
    pub fn assign_indices(&mut self) -> Indexing {
        for joint in &mut self.joints {
            joint.joint_index = None;
            joint.effector_index = None;
        }

        let order: Vec<JointId> = self.traverse().collect();
        let mut effectors = Vec::new();
        for (index, &id) in order.iter().enumerate() {
            let joint = &mut self.joints[id.0];
            joint.joint_index = Some(index);
            if joint.is_effector {
                joint.effector_index = Some(effectors.len());
                effectors.push(id);
            }
        }

        Indexing {
            joints: order,
            effectors,
            revision: self.revision,
        }
    }
}

impl Index<JointId> for Skeleton {
    type Output = Joint;

    fn index(&self, id: JointId) -> &Joint {
        &self.joints[id.0]
    }
}

impl IndexMut<JointId> for Skeleton {
    fn index_mut(&mut self, id: JointId) -> &mut Joint {
        &mut self.joints[id.0]
    }
}

// ---------------------------------------------------------------------------
// Iterators
// ---------------------------------------------------------------------------

/// Pre-order iterator produced by [`Skeleton::traverse`] and [`Skeleton::subtree`].
pub struct Traversal<'a> {
    skeleton: &'a Skeleton,
    next: Option<JointId>,
    top: Option<JointId>,
}

impl Iterator for Traversal<'_> {
    type Item = JointId;

    fn next(&mut self) -> Option<JointId> {
        let current = self.next?;
        self.next = self.skeleton.next_within(current, self.top);
        Some(current)
    }
}

/// Walks parent links up to the root. Produced by [`Skeleton::ancestors`].
pub struct Ancestors<'a> {
    skeleton: &'a Skeleton,
    next: Option<JointId>,
}

impl Iterator for Ancestors<'_> {
    type Item = JointId;

    fn next(&mut self) -> Option<JointId> {
        let current = self.next?;
        self.next = self.skeleton[current].parent;
        Some(current)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
