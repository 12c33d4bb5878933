//! System of units.
//!
//! Quantities are stored in the transport engine's internal units: lengths in
//! millimetres, angles in radians and energies in MeV. Multiply a literal by
//! the unit constant to store it, divide by the constant to read it back in
//! that unit.

pub const MM: f64 = 1.0;
pub const UM: f64 = 1e-3 * MM;
pub const CM: f64 = 10.0 * MM;

pub const RAD: f64 = 1.0;
pub const DEG: f64 = std::f64::consts::PI / 180.0 * RAD;

pub const MEV: f64 = 1.0;
pub const KEV: f64 = 1e-3 * MEV;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversions() {
        assert!((2.5 * CM / MM - 25.0).abs() < 1e-12);
        assert!((100.0 * UM / MM - 0.1).abs() < 1e-12);
        assert!((180.0 * DEG - std::f64::consts::PI).abs() < 1e-12);
        assert!((511.0 * KEV - 0.511).abs() < 1e-12);
    }
}
