//! Target holder with its target, water cooling and O-ring.
//!
//! The holder is a stepped polycone whose dimensions depend on the holder
//! variant. The target layer sits at the holder face; the beam hits it at
//! z = 0.

use bl2sim_core::module::{ConfigureError, GeometryModule, ModuleError};
use bl2sim_geometry::units::{MM, UM};
use bl2sim_geometry::{Colour, LogicalId, Placement, Shape, Solid, VolumeStore};

/// What is mounted on the holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Graphite disc in front of the tantalum backing.
    Graphite,
    /// Thin tantalum calibration source disc.
    Source,
    /// Evaporated layer on tantalum.
    Evaporated,
}

impl TargetKind {
    const CHOICES: [&'static str; 3] = ["graphite", "source", "evaporated"];

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "graphite" => Some(TargetKind::Graphite),
            "source" => Some(TargetKind::Source),
            "evaporated" => Some(TargetKind::Evaporated),
            _ => None,
        }
    }
}

/// Which holder is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderKind {
    Aluminium,
    Brass,
}

impl HolderKind {
    const CHOICES: [&'static str; 2] = ["aluminium", "brass"];

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "aluminium" | "aluminum" | "al" => Some(HolderKind::Aluminium),
            "brass" => Some(HolderKind::Brass),
            _ => None,
        }
    }
}

/// Length and radii of one holder section (mm).
#[derive(Debug, Clone, Copy)]
struct Section {
    length: f64,
    r_inner: f64,
    r_outer: f64,
}

impl Section {
    const fn new(length: f64, r_inner: f64, r_outer: f64) -> Self {
        Self {
            length,
            r_inner,
            r_outer,
        }
    }
}

/// Holder sections from the beam side outwards, plus target and cooling.
#[derive(Debug, Clone)]
struct HolderDimensions {
    material: &'static str,
    lower: Section,
    mid_low: Section,
    mid: Section,
    upper: Section,
    top: Section,
    target: Section,
    /// Cooling water polycone, z-planes relative to the target back face.
    water_z: Vec<f64>,
    water_r_outer: Vec<f64>,
}

impl HolderDimensions {
    fn aluminium() -> Self {
        let mid_low = Section::new(3.0 * MM, 0.5 * 54.0 * MM, 0.5 * 58.0 * MM);
        let water_length = 9.2 * MM - 100.0 * UM;
        let water_r = 0.5 * 23.2 * MM - 100.0 * UM;
        Self {
            material: "Alloy",
            lower: Section::new(7.0 * MM, 0.5 * 52.0 * MM + 1.0 * UM, 0.5 * 58.0 * MM),
            mid_low,
            mid: Section::new(1.7 * MM, 0.5 * 23.2 * MM, 0.5 * 58.0 * MM),
            upper: Section::new(7.5 * MM, 0.5 * 23.2 * MM, 0.5 * 40.5 * MM),
            top: Section::new(3.5 * MM, 0.0, 0.5 * 40.5 * MM),
            target: Section::new(0.25 * MM, 0.0, 0.5 * 41.0 * MM),
            water_z: vec![mid_low.length, mid_low.length + water_length],
            water_r_outer: vec![water_r, water_r],
        }
    }

    fn brass() -> Self {
        let lower = Section::new(10.0 * MM, 0.5 * 50.3 * MM, 0.5 * 57.0 * MM);
        let mid = Section::new((19.7 - 14.0) * MM, 0.5 * 29.5 * MM, 0.5 * 57.0 * MM);
        let upper = Section::new((14.0 - 5.3) * MM, 0.5 * 23.2 * MM, 0.5 * 41.2 * MM);
        let water_mid = mid.length - 100.0 * UM;
        let water_upper = upper.length - 100.0 * UM;
        let r_mid = 0.5 * 29.5 * MM - 100.0 * UM;
        let r_upper = 0.5 * 23.2 * MM - 100.0 * UM;
        Self {
            material: "G4_BRASS",
            lower,
            // The brass holder has no intermediate step.
            mid_low: Section::new(0.0, lower.r_inner, lower.r_outer),
            mid,
            upper,
            top: Section::new(5.3 * MM, 0.0, 0.5 * 41.2 * MM),
            target: Section::new(0.25 * MM, 0.0, 0.5 * 30.0 * MM),
            water_z: vec![0.0, water_mid, water_mid, water_mid + water_upper],
            water_r_outer: vec![r_mid, r_mid, r_upper, r_upper],
        }
    }

    fn holder_shape(&self) -> Shape {
        let sections = [self.lower, self.mid_low, self.mid, self.upper, self.top];
        let mut z = Vec::with_capacity(2 * sections.len());
        let mut r_inner = Vec::with_capacity(2 * sections.len());
        let mut r_outer = Vec::with_capacity(2 * sections.len());
        let mut start = 0.0;
        for section in sections {
            for plane in [start, start + section.length] {
                z.push(plane);
                r_inner.push(section.r_inner);
                r_outer.push(section.r_outer);
            }
            start += section.length;
        }
        Shape::polycone(&z, &r_inner, &r_outer)
    }
}

const GRAPHITE_THICKNESS: f64 = 6.0 * MM;
const GRAPHITE_RADIUS: f64 = 0.5 * 25.0 * MM;
const SOURCE_THICKNESS: f64 = 0.1 * MM;
const SOURCE_RADIUS: f64 = 0.5 * 20.0 * MM;
const ORING: Section = Section::new(1.0 * MM, 0.5 * 27.0 * MM, 0.5 * 40.0 * MM);

pub struct TargetHolder {
    target: TargetKind,
    holder: HolderKind,
    mother: Option<String>,
}

impl TargetHolder {
    pub const NAME: &'static str = "TargetHolder";

    pub fn new() -> Self {
        Self {
            target: TargetKind::Evaporated,
            holder: HolderKind::Aluminium,
            mother: None,
        }
    }

    /// Place the module inside `mother`'s envelope, or in the world for
    /// `None`.
    pub fn with_mother(mut self, mother: Option<&str>) -> Self {
        self.mother = mother.map(String::from);
        self
    }

    pub fn target(&self) -> TargetKind {
        self.target
    }

    pub fn holder(&self) -> HolderKind {
        self.holder
    }

    fn dimensions(&self) -> HolderDimensions {
        match self.holder {
            HolderKind::Aluminium => HolderDimensions::aluminium(),
            HolderKind::Brass => HolderDimensions::brass(),
        }
    }
}

impl Default for TargetHolder {
    fn default() -> Self {
        Self::new()
    }
}

impl GeometryModule for TargetHolder {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn mother(&self) -> Option<&str> {
        self.mother.as_deref()
    }

    fn construct(
        &mut self,
        mother: LogicalId,
        volumes: &mut VolumeStore,
    ) -> Result<Option<LogicalId>, ModuleError> {
        let dims = self.dimensions();
        let mid_low = dims.mid_low.length;
        let target_length = dims.target.length;

        let holder = volumes.add_logical(
            Solid::new("TargetHolder_Holder", dims.holder_shape()),
            dims.material,
            Colour::Red,
        )?;
        volumes.place(
            holder,
            mother,
            Placement::along_z(-(dims.lower.length - target_length)),
            0,
        )?;

        let r_inner = vec![0.0; dims.water_z.len()];
        let water = volumes.add_logical(
            Solid::new(
                "TargetHolder_Water",
                Shape::polycone(&dims.water_z, &r_inner, &dims.water_r_outer),
            ),
            "G4_WATER",
            Colour::Blue,
        )?;
        volumes.place(water, mother, Placement::along_z(target_length), 0)?;

        match self.target {
            TargetKind::Source => {
                let source = volumes.add_logical(
                    Solid::new(
                        "TargetHolder_Source",
                        Shape::tube(0.0, SOURCE_RADIUS, 0.5 * SOURCE_THICKNESS),
                    ),
                    "G4_Ta",
                    Colour::Grey,
                )?;
                volumes.place(
                    source,
                    mother,
                    Placement::along_z(mid_low + 0.5 * SOURCE_THICKNESS),
                    0,
                )?;
            }
            TargetKind::Evaporated | TargetKind::Graphite => {
                let target = volumes.add_logical(
                    Solid::new(
                        "TargetHolder_Target",
                        Shape::polycone(
                            &[0.0, target_length],
                            &[dims.target.r_inner; 2],
                            &[dims.target.r_outer; 2],
                        ),
                    ),
                    "G4_Ta",
                    Colour::Grey,
                )?;
                volumes.place(target, mother, Placement::along_z(mid_low), 0)?;
            }
        }

        if self.target == TargetKind::Graphite {
            let graphite = volumes.add_logical(
                Solid::new(
                    "TargetHolder_Graphite",
                    Shape::polycone(
                        &[0.0, -GRAPHITE_THICKNESS],
                        &[0.0; 2],
                        &[GRAPHITE_RADIUS; 2],
                    ),
                ),
                "G4_GRAPHITE",
                Colour::Grey,
            )?;
            volumes.place(graphite, mother, Placement::identity(), 0)?;
        }

        let oring = volumes.add_logical(
            Solid::new(
                "TargetHolder_ORing",
                Shape::tube(ORING.r_inner, ORING.r_outer, 0.5 * ORING.length),
            ),
            "Steel-316",
            Colour::Cyan,
        )?;
        volumes.place(
            oring,
            mother,
            Placement::along_z(mid_low - 0.5 * ORING.length - 1.0 * UM),
            0,
        )?;

        log::debug!(
            "target holder: {:?} holder, {:?} target",
            self.holder,
            self.target
        );
        Ok(None)
    }

    fn configure(&mut self, option: &str, value: &str) -> Result<(), ConfigureError> {
        match option {
            "target" => {
                self.target = TargetKind::parse(value).ok_or_else(|| {
                    ConfigureError::invalid_value(Self::NAME, option, value, &TargetKind::CHOICES)
                })?;
            }
            "holder" => {
                self.holder = HolderKind::parse(value).ok_or_else(|| {
                    ConfigureError::invalid_value(Self::NAME, option, value, &HolderKind::CHOICES)
                })?;
            }
            _ => return Err(ConfigureError::unknown_option(Self::NAME, option)),
        }
        Ok(())
    }
}
