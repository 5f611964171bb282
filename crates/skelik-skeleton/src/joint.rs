//! A single joint of the skeleton tree.
//!
//! A [`Joint`] carries its pose parameters (Euler angles, fixed offset),
//! rendering extents, optional per-axis limits, and the derived transforms
//! that forward kinematics writes back into it.

use nalgebra::{Matrix4, Rotation3, Vector3, Vector4};

use skelik_core::config::{JointConfig, MAX_DEGREES};
use skelik_core::types::{Axis, JointId};

// ---------------------------------------------------------------------------
// Angle helpers
// ---------------------------------------------------------------------------

/// Wrap an angle in degrees into the canonical range `[-180, 180]`.
pub fn normalize_degrees(angle: f32) -> f32 {
    (angle + MAX_DEGREES).rem_euclid(2.0 * MAX_DEGREES) - MAX_DEGREES
}

/// Local rotation for Euler angles in degrees, composed intrinsically X, then Y, then Z.
pub fn euler_xyz(angles: &Vector3<f32>) -> Matrix4<f32> {
    let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), angles.x.to_radians());
    let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), angles.y.to_radians());
    let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), angles.z.to_radians());
    (rx * ry * rz).to_homogeneous()
}

// ---------------------------------------------------------------------------
// AxisLimit
// ---------------------------------------------------------------------------

/// Allowed range of one joint axis, in degrees.
///
/// A limit with `min == max` locks the axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisLimit {
    pub min: f32,
    pub max: f32,
}

impl AxisLimit {
    /// Both bounds must lie in the canonical range with `min <= max`.
    pub fn new(min: f32, max: f32) -> Self {
        debug_assert!(
            (-MAX_DEGREES..=MAX_DEGREES).contains(&min)
                && (-MAX_DEGREES..=MAX_DEGREES).contains(&max)
                && min <= max,
            "axis limit [{min}, {max}] outside [-{MAX_DEGREES}, {MAX_DEGREES}]"
        );
        Self { min, max }
    }

    /// A limit that pins the axis at `angle`.
    pub fn locked(angle: f32) -> Self {
        Self::new(angle, angle)
    }

    #[allow(clippy::float_cmp)]
    pub fn is_locked(self) -> bool {
        self.min == self.max
    }

    pub fn contains(self, angle: f32) -> bool {
        angle >= self.min && angle <= self.max
    }

    /// Clamp `angle` into the range. Never panics, even on inverted bounds.
    pub fn clamp(self, angle: f32) -> f32 {
        angle.max(self.min).min(self.max)
    }
}

impl From<[f32; 2]> for AxisLimit {
    fn from([min, max]: [f32; 2]) -> Self {
        Self::new(min, max)
    }
}

// ---------------------------------------------------------------------------
// Joint
// ---------------------------------------------------------------------------

/// One node of the skeleton tree.
///
/// Pose parameters are public. Structural state (parent, children) and the
/// effector/static flags are changed through [`Skeleton`](crate::Skeleton)
/// so that the skeleton can track when its indices go stale.
#[derive(Debug, Clone)]
pub struct Joint {
    name: Option<String>,

    /// Euler angles in degrees (intrinsic XYZ).
    pub angles: Vector3<f32>,
    /// Fixed local translation applied after the rotation.
    pub offset: Vector3<f32>,
    /// Render scale of the bone geometry.
    pub scale: Vector3<f32>,
    /// Render translation of the bone geometry, applied after scaling.
    pub geometry_offset: Vector3<f32>,
    /// Optional limits in X, Y, Z order.
    pub limits: [Option<AxisLimit>; 3],

    pub(crate) is_effector: bool,
    pub(crate) is_static: bool,
    pub(crate) parent: Option<JointId>,
    pub(crate) children: Vec<JointId>,
    pub(crate) joint_index: Option<usize>,
    pub(crate) effector_index: Option<usize>,

    pub(crate) local: Matrix4<f32>,
    pub(crate) world: Matrix4<f32>,
    pub(crate) position: Vector4<f32>,
}

impl Default for Joint {
    fn default() -> Self {
        Self {
            name: None,
            angles: Vector3::zeros(),
            offset: Vector3::zeros(),
            scale: Vector3::repeat(1.0),
            geometry_offset: Vector3::zeros(),
            limits: [None; 3],
            is_effector: false,
            is_static: false,
            parent: None,
            children: Vec::new(),
            joint_index: None,
            effector_index: None,
            local: Matrix4::identity(),
            world: Matrix4::identity(),
            position: Vector4::w(),
        }
    }
}

impl Joint {
    /// Create a named joint at the origin of its parent.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Create an unnamed joint.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Build a joint from its configuration entry. The parent link is
    /// resolved by the skeleton builder.
    pub fn from_config(config: &JointConfig) -> Self {
        let mut joint = Self::new(config.name.clone())
            .with_offset(Vector3::from(config.offset))
            .with_scale(Vector3::from(config.scale))
            .with_geometry_offset(Vector3::from(config.geometry_offset))
            .with_angles(Vector3::from(config.angles));
        joint.is_effector = config.effector;
        joint.is_static = config.is_static;
        for (axis, limit) in Axis::ALL.into_iter().zip(config.limits()) {
            joint.limits[axis.index()] = limit.map(AxisLimit::from);
        }
        joint
    }

    #[must_use]
    pub fn with_offset(mut self, offset: Vector3<f32>) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Vector3<f32>) -> Self {
        self.scale = scale;
        self
    }

    #[must_use]
    pub fn with_geometry_offset(mut self, offset: Vector3<f32>) -> Self {
        self.geometry_offset = offset;
        self
    }

    #[must_use]
    pub fn with_angles(mut self, angles: Vector3<f32>) -> Self {
        self.angles = angles;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, axis: Axis, limit: AxisLimit) -> Self {
        self.limits[axis.index()] = Some(limit);
        self
    }

    /// Mark as an effector before adding to a skeleton.
    #[must_use]
    pub fn effector(mut self) -> Self {
        self.is_effector = true;
        self
    }

    /// Mark as static before adding to a skeleton.
    #[must_use]
    pub fn fixed(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub const fn is_effector(&self) -> bool {
        self.is_effector
    }

    pub const fn is_static(&self) -> bool {
        self.is_static
    }

    pub const fn parent(&self) -> Option<JointId> {
        self.parent
    }

    pub fn children(&self) -> &[JointId] {
        &self.children
    }

    /// Traversal-order index assigned by the last index assignment, or
    /// `None` if the joint was not reachable from the root at that time.
    pub const fn joint_index(&self) -> Option<usize> {
        self.joint_index
    }

    pub const fn effector_index(&self) -> Option<usize> {
        self.effector_index
    }

    pub fn angle(&self, axis: Axis) -> f32 {
        self.angles[axis.index()]
    }

    pub fn set_angle(&mut self, axis: Axis, degrees: f32) {
        self.angles[axis.index()] = degrees;
    }

    pub const fn limit(&self, axis: Axis) -> Option<AxisLimit> {
        self.limits[axis.index()]
    }

    /// Whether `axis` can change during solving.
    pub fn is_axis_free(&self, axis: Axis) -> bool {
        !self.is_static && !self.limit(axis).is_some_and(AxisLimit::is_locked)
    }

    /// Add `delta` degrees to `axis`, wrap into the canonical range and
    /// clamp against the axis limit. Static joints and locked axes are left
    /// untouched.
    pub fn apply_angle_delta(&mut self, axis: Axis, delta: f32) {
        if !self.is_axis_free(axis) {
            return;
        }
        let mut angle = normalize_degrees(self.angle(axis) + delta);
        if let Some(limit) = self.limit(axis) {
            angle = limit.clamp(angle);
        }
        self.set_angle(axis, angle);
    }

    /// Local rotation transform from the last FK pass.
    pub const fn local_rotation(&self) -> &Matrix4<f32> {
        &self.local
    }

    /// Composite world transform from the last FK pass.
    pub const fn world_transform(&self) -> &Matrix4<f32> {
        &self.world
    }

    /// Homogeneous world position (w = 1) from the last FK pass.
    pub const fn position(&self) -> &Vector4<f32> {
        &self.position
    }

    pub fn world_position(&self) -> Vector3<f32> {
        self.position.xyz()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
