//! Input beam descriptions for single-pass schemas. Every parameter is
//! a T/S pair so astigmatic sources can be described; the catalog
//! defaults fill both planes with the same value.

use serde::{Deserialize, Serialize};

use crate::matrix::TS;

/// The six supported ways to specify an input beam. Linear values are
/// SI meters, angles radians; `mq` is the beam quality factor M².
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum PumpMode {
    /// Gaussian beam with a known waist radius at a known distance
    /// before the schema entrance.
    Waist {
        waist: TS<f64>,
        distance: TS<f64>,
        mq: TS<f64>,
    },
    /// Gaussian beam with a known radius and wavefront curvature radius
    /// right at the schema entrance.
    Front {
        beam_radius: TS<f64>,
        front_radius: TS<f64>,
        mq: TS<f64>,
    },
    /// Geometric ray with a known offset and divergence angle measured
    /// at a distance before the entrance.
    RayVector {
        radius: TS<f64>,
        angle: TS<f64>,
        distance: TS<f64>,
    },
    /// Geometric ray through two radii measured a distance apart.
    TwoSections {
        radius1: TS<f64>,
        radius2: TS<f64>,
        distance: TS<f64>,
    },
    /// Components of the complex beam parameter q, meters.
    Complex {
        real: TS<f64>,
        imag: TS<f64>,
        mq: TS<f64>,
    },
    /// Components of the inverted complex beam parameter 1/q, inverse
    /// meters.
    InvComplex {
        real: TS<f64>,
        imag: TS<f64>,
        mq: TS<f64>,
    },
}

impl PumpMode {
    pub fn waist_default() -> Self {
        Self::Waist {
            waist: TS::both(100e-6),
            distance: TS::both(0.1),
            mq: TS::both(1.0),
        }
    }

    pub fn front_default() -> Self {
        Self::Front {
            beam_radius: TS::both(1000e-6),
            front_radius: TS::both(0.1),
            mq: TS::both(1.0),
        }
    }

    pub fn ray_vector_default() -> Self {
        Self::RayVector {
            radius: TS::both(100e-6),
            angle: TS::both(10f64.to_radians()),
            distance: TS::both(0.1),
        }
    }

    pub fn two_sections_default() -> Self {
        Self::TwoSections {
            radius1: TS::both(100e-6),
            radius2: TS::both(1000e-6),
            distance: TS::both(0.1),
        }
    }

    /// q = 100µm − 32.057µm·i describes a beam with a 100µm waist at
    /// 100mm distance for a 980nm wavelength.
    pub fn complex_default() -> Self {
        Self::Complex {
            real: TS::both(100e-6),
            imag: TS::both(-32.057e-6),
            mq: TS::both(1.0),
        }
    }

    /// 1/q = 0.009µm⁻¹ + 0.003µm⁻¹·i, near the same beam as the complex
    /// default.
    pub fn inv_complex_default() -> Self {
        Self::InvComplex {
            real: TS::both(0.009e6),
            imag: TS::both(0.003e6),
            mq: TS::both(1.0),
        }
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Waist { .. } => "Waist",
            Self::Front { .. } => "Front",
            Self::RayVector { .. } => "RayVector",
            Self::TwoSections { .. } => "TwoSections",
            Self::Complex { .. } => "Complex",
            Self::InvComplex { .. } => "InvComplex",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Waist { .. } => "Waist",
            Self::Front { .. } => "Front",
            Self::RayVector { .. } => "Ray Vector",
            Self::TwoSections { .. } => "Two Sections",
            Self::Complex { .. } => "Complex",
            Self::InvComplex { .. } => "Inv. Complex",
        }
    }

    /// Geometric pumps propagate as rays, the rest as Gaussian beams.
    pub fn is_geometric(&self) -> bool {
        matches!(self, Self::RayVector { .. } | Self::TwoSections { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pump {
    pub label: String,
    pub title: String,
    pub active: bool,
    pub mode: PumpMode,
}

impl Pump {
    pub fn new(mode: PumpMode) -> Self {
        Self {
            label: String::new(),
            title: String::new(),
            active: false,
            mode,
        }
    }

    pub fn label_prefix() -> &'static str {
        "P"
    }

    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            "(pump)"
        } else {
            &self.label
        }
    }
}
