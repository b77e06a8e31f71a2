//! Math types for PetalSonic Director

pub use glam::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * (-Vec3::Z)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Transforms a point given in this pose's local space into world space.
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Converts a world-space vector into the backend's axis convention.
///
/// The backend is right-handed with Y and Z pointing the opposite way to the
/// scene, so both components are negated. Applied to positions, velocities
/// and orientation vectors alike.
pub fn to_backend_axes(v: Vec3) -> Vec3 {
    Vec3::new(v.x, -v.y, -v.z)
}
