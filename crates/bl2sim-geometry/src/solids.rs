//! Constructive solids.
//!
//! Each solid describes a closed shape in its own local frame, centred on
//! the origin. Solids carry no material and no position: a
//! [`LogicalVolume`](crate::volumes::LogicalVolume) pairs a solid with a
//! material, and a placement positions it inside a mother volume.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transform::Placement;

/// Errors raised while describing or storing geometry.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Invalid solid '{name}': {reason}")]
    InvalidSolid { name: String, reason: String },

    #[error("Logical volume not found: {0}")]
    UnknownLogicalVolume(String),

    #[error("Logical volume '{0}' already exists")]
    DuplicateLogicalVolume(String),

    #[error("Volume id {0} does not exist in this store")]
    InvalidVolumeId(usize),
}

/// A named solid.
#[derive(Debug, Clone)]
pub struct Solid {
    pub name: String,
    pub shape: Shape,
}

/// The supported shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Shape {
    Box(BoxShape),
    Tubs(Tubs),
    Trd(Trd),
    Polycone(Polycone),
    #[serde(skip)]
    Subtraction(Subtraction),
}

/// An axis-aligned box given by its half-lengths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxShape {
    pub half_x: f64,
    pub half_y: f64,
    pub half_z: f64,
}

/// A cylindrical section (tube segment) along z.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tubs {
    pub r_min: f64,
    pub r_max: f64,
    pub half_z: f64,
    /// Start of the phi segment (rad).
    pub start_phi: f64,
    /// Opening angle of the phi segment (rad).
    pub delta_phi: f64,
}

/// A trapezoid with x and y half-lengths that vary linearly along z.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trd {
    /// Half-length along x at -dz.
    pub dx1: f64,
    /// Half-length along x at +dz.
    pub dx2: f64,
    /// Half-length along y at -dz.
    pub dy1: f64,
    /// Half-length along y at +dz.
    pub dy2: f64,
    pub dz: f64,
}

/// A solid of revolution given by z-planes with inner and outer radii.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Polycone {
    pub start_phi: f64,
    pub delta_phi: f64,
    pub z_planes: Vec<f64>,
    pub r_inner: Vec<f64>,
    pub r_outer: Vec<f64>,
}

/// `minuend` with `subtrahend` removed, the latter placed in the
/// minuend's frame.
#[derive(Debug, Clone)]
pub struct Subtraction {
    pub minuend: Box<Shape>,
    pub subtrahend: Box<Shape>,
    pub placement: Placement,
}

impl Solid {
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    /// Check the shape parameters, returning the solid unchanged if valid.
    pub fn validated(self) -> Result<Self, GeometryError> {
        self.shape.validate().map_err(|reason| GeometryError::InvalidSolid {
            name: self.name.clone(),
            reason,
        })?;
        Ok(self)
    }

    /// Subtract `cutter`, placed by `placement`, from this solid.
    pub fn subtract(self, name: impl Into<String>, cutter: &Solid, placement: Placement) -> Solid {
        Solid {
            name: name.into(),
            shape: Shape::Subtraction(Subtraction {
                minuend: Box::new(self.shape),
                subtrahend: Box::new(cutter.shape.clone()),
                placement,
            }),
        }
    }
}

impl Shape {
    /// Full cylinder or ring.
    pub fn tube(r_min: f64, r_max: f64, half_z: f64) -> Self {
        Shape::Tubs(Tubs {
            r_min,
            r_max,
            half_z,
            start_phi: 0.0,
            delta_phi: 2.0 * std::f64::consts::PI,
        })
    }

    pub fn boxed(half_x: f64, half_y: f64, half_z: f64) -> Self {
        Shape::Box(BoxShape {
            half_x,
            half_y,
            half_z,
        })
    }

    pub fn trd(dx1: f64, dx2: f64, dy1: f64, dy2: f64, dz: f64) -> Self {
        Shape::Trd(Trd {
            dx1,
            dx2,
            dy1,
            dy2,
            dz,
        })
    }

    /// Full-revolution polycone.
    pub fn polycone(z_planes: &[f64], r_inner: &[f64], r_outer: &[f64]) -> Self {
        Shape::Polycone(Polycone {
            start_phi: 0.0,
            delta_phi: 2.0 * std::f64::consts::PI,
            z_planes: z_planes.to_vec(),
            r_inner: r_inner.to_vec(),
            r_outer: r_outer.to_vec(),
        })
    }

    /// Validate parameters, returning a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Shape::Box(b) => {
                if b.half_x <= 0.0 || b.half_y <= 0.0 || b.half_z <= 0.0 {
                    return Err("box half-lengths must be positive".into());
                }
            }
            Shape::Tubs(t) => {
                if t.r_min < 0.0 || t.r_max <= t.r_min {
                    return Err(format!(
                        "radii must satisfy 0 <= r_min < r_max (got {} / {})",
                        t.r_min, t.r_max
                    ));
                }
                if t.half_z <= 0.0 {
                    return Err("half-length must be positive".into());
                }
                check_phi(t.delta_phi)?;
            }
            Shape::Trd(t) => {
                if t.dx1 < 0.0 || t.dx2 < 0.0 || t.dy1 < 0.0 || t.dy2 < 0.0 || t.dz <= 0.0 {
                    return Err("trapezoid half-lengths must be non-negative, dz positive".into());
                }
            }
            Shape::Polycone(p) => {
                if p.z_planes.len() < 2 {
                    return Err("polycone needs at least two z-planes".into());
                }
                if p.r_inner.len() != p.z_planes.len() || p.r_outer.len() != p.z_planes.len() {
                    return Err("z-plane and radius arrays differ in length".into());
                }
                let increasing = p.z_planes.windows(2).all(|w| w[1] >= w[0]);
                let decreasing = p.z_planes.windows(2).all(|w| w[1] <= w[0]);
                if !increasing && !decreasing {
                    return Err("z-planes must be monotonic".into());
                }
                if p
                    .r_inner
                    .iter()
                    .zip(&p.r_outer)
                    .any(|(ri, ro)| *ri < 0.0 || ro < ri)
                {
                    return Err("radii must satisfy 0 <= r_inner <= r_outer".into());
                }
                check_phi(p.delta_phi)?;
            }
            Shape::Subtraction(s) => {
                s.minuend.validate()?;
                s.subtrahend.validate()?;
            }
        }
        Ok(())
    }

    /// Cubic volume in mm³, where it has a closed form.
    ///
    /// Boolean solids return `None`.
    pub fn cubic_volume(&self) -> Option<f64> {
        match self {
            Shape::Box(b) => Some(8.0 * b.half_x * b.half_y * b.half_z),
            Shape::Tubs(t) => {
                Some(t.delta_phi * (t.r_max * t.r_max - t.r_min * t.r_min) * t.half_z)
            }
            Shape::Trd(t) => {
                // Cross-section area is bilinear in z, Simpson's rule is exact.
                let a1 = 4.0 * t.dx1 * t.dy1;
                let a2 = 4.0 * t.dx2 * t.dy2;
                let am = (t.dx1 + t.dx2) * (t.dy1 + t.dy2);
                Some(2.0 * t.dz * (a1 + 4.0 * am + a2) / 6.0)
            }
            Shape::Polycone(p) => {
                let mut volume = 0.0;
                for i in 1..p.z_planes.len() {
                    let h = (p.z_planes[i] - p.z_planes[i - 1]).abs();
                    volume += frustum(p.r_outer[i - 1], p.r_outer[i], h)
                        - frustum(p.r_inner[i - 1], p.r_inner[i], h);
                }
                Some(volume * p.delta_phi / (2.0 * std::f64::consts::PI))
            }
            Shape::Subtraction(_) => None,
        }
    }
}

fn check_phi(delta_phi: f64) -> Result<(), String> {
    if delta_phi <= 0.0 || delta_phi > 2.0 * std::f64::consts::PI + 1e-12 {
        return Err(format!("phi opening {} rad is outside (0, 2pi]", delta_phi));
    }
    Ok(())
}

fn frustum(r1: f64, r2: f64, h: f64) -> f64 {
    std::f64::consts::PI * h * (r1 * r1 + r1 * r2 + r2 * r2) / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tube_volume() {
        let ring = Shape::tube(1.0, 2.0, 5.0);
        let expected = std::f64::consts::PI * (4.0 - 1.0) * 10.0;
        assert_relative_eq!(ring.cubic_volume().unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_trd_reduces_to_box() {
        let trd = Shape::trd(1.0, 1.0, 2.0, 2.0, 3.0);
        let cube = Shape::boxed(1.0, 2.0, 3.0);
        assert_relative_eq!(
            trd.cubic_volume().unwrap(),
            cube.cubic_volume().unwrap(),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_polycone_cylinder_volume() {
        let pc = Shape::polycone(&[0.0, 10.0], &[0.0, 0.0], &[2.0, 2.0]);
        let expected = std::f64::consts::PI * 4.0 * 10.0;
        assert_relative_eq!(pc.cubic_volume().unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_radii_rejected() {
        let solid = Solid::new("bad", Shape::tube(3.0, 2.0, 1.0));
        let err = solid.validated().unwrap_err();
        assert!(matches!(err, GeometryError::InvalidSolid { ref name, .. } if name == "bad"));
    }

    #[test]
    fn test_non_monotonic_polycone_rejected() {
        let pc = Shape::polycone(&[0.0, 5.0, 2.0], &[0.0; 3], &[1.0; 3]);
        assert!(pc.validate().is_err());
    }

    #[test]
    fn test_subtraction_has_no_closed_volume() {
        let disc = Solid::new("disc", Shape::tube(0.0, 10.0, 1.0));
        let hole = Solid::new("hole", Shape::tube(0.0, 1.0, 2.0));
        let cut = disc.subtract("disc_cut", &hole, Placement::identity());
        assert!(cut.shape.cubic_volume().is_none());
        assert!(cut.shape.validate().is_ok());
    }
}
