//! # BL2 Geometry
//!
//! Geometry description for the BL2 simulation. This crate provides:
//!
//! - **Units** ([`units`]): The engine's internal system of units.
//! - **Solids** ([`solids`]): Boxes, tubes, trapezoids, polycones and
//!   boolean subtractions.
//! - **Placements** ([`transform`]): Rotations and translations of daughter
//!   volumes inside their mothers.
//! - **Volume arena** ([`volumes`]): Logical volumes and placements, owned
//!   by a [`VolumeStore`](volumes::VolumeStore) and referred to by index.

pub mod solids;
pub mod transform;
pub mod units;
pub mod volumes;

pub use solids::{GeometryError, Shape, Solid};
pub use transform::Placement;
pub use volumes::{Colour, LogicalId, PhysicalId, VolumeStore};
