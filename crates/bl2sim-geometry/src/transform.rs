//! Placements: rigid transformations of a daughter volume inside its mother.
//!
//! Rotations compose the way the engine's rotation matrices do: each
//! `rotate_*` call applies a further rotation after the ones already held,
//! so `Placement::identity().rotate_y(a).rotate_z(b)` is `Rz(b) * Ry(a)`.

use nalgebra::{Rotation3, Vector3};

/// Rotation followed by translation, expressed in the mother's frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub rotation: Rotation3<f64>,
    /// Translation (mm).
    pub translation: Vector3<f64>,
}

impl Default for Placement {
    fn default() -> Self {
        Self::identity()
    }
}

impl Placement {
    pub fn identity() -> Self {
        Self {
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// A pure translation.
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            rotation: Rotation3::identity(),
            translation: Vector3::new(x, y, z),
        }
    }

    /// A translation along the beam (z) axis.
    pub fn along_z(z: f64) -> Self {
        Self::at(0.0, 0.0, z)
    }

    pub fn rotate_y(mut self, angle: f64) -> Self {
        self.rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), angle) * self.rotation;
        self
    }

    pub fn rotate_z(mut self, angle: f64) -> Self {
        self.rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), angle) * self.rotation;
        self
    }

    /// Replace the translation, keeping the rotation.
    pub fn with_translation(mut self, translation: Vector3<f64>) -> Self {
        self.translation = translation;
        self
    }

    /// Map a point from the daughter frame into the mother frame.
    pub fn apply(&self, point: &[f64; 3]) -> [f64; 3] {
        let v = Vector3::new(point[0], point[1], point[2]);
        let result = self.rotation * v + self.translation;
        [result.x, result.y, result.z]
    }
}

/// Rotate a vector about the z axis.
pub fn rotate_z(v: Vector3<f64>, angle: f64) -> Vector3<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), angle) * v
}
