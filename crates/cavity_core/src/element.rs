use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::equation_engine::FormulaProgram;
use crate::matrix::{abcd, Matrix, TS};

/// Formula-defined element description: the statement list, the custom
/// parameters it may reference, and whether it assigns separate T/S
/// matrices (`At..Ds`) or one shared matrix (`A..D`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaSpec {
    pub formula: String,
    pub params: Vec<(String, f64)>,
    pub split_planes: bool,
}

/// Element variants with their typed parameters. Values are SI units,
/// angles in radians.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ElementKind {
    FlatMirror,
    CurveMirror { r: f64, alpha: f64 },
    ThinLens { f: f64, alpha: f64 },
    CylinderLensT { f: f64, alpha: f64 },
    CylinderLensS { f: f64, alpha: f64 },
    EmptyRange { l: f64 },
    MediumRange { l: f64, n: f64 },
    Plate { l: f64, n: f64 },
    BrewsterCrystal { l: f64, n: f64 },
    BrewsterPlate { l: f64, n: f64 },
    TiltedCrystal { l: f64, n: f64, alpha: f64 },
    TiltedPlate { l: f64, n: f64, alpha: f64 },
    Matrix { t: [f64; 4], s: [f64; 4] },
    Matrix1 { m: [f64; 4] },
    Point,
    NormalInterface { n1: f64, n2: f64 },
    BrewsterInterface { n1: f64, n2: f64 },
    TiltedInterface { n1: f64, n2: f64, alpha: f64 },
    SphericalInterface { n1: f64, n2: f64, r: f64 },
    Formula(FormulaSpec),
}

/// Range capability snapshot: an element a beam travels through over a
/// finite length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeCap {
    /// The length parameter `L`.
    pub length: f64,
    /// Index of refraction of the medium.
    pub ior: f64,
    /// Geometric path along the beam axis; differs from `L` when the
    /// element is tilted against the beam.
    pub axis_length: f64,
}

impl RangeCap {
    pub fn optical_path(&self) -> f64 {
        self.axis_length * self.ior
    }
}

/// Interface capability snapshot: the two media ports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterfaceCap {
    pub n1: f64,
    pub n2: f64,
}

/// Half matrices of a range split at an internal point.
#[derive(Debug, Clone, Copy)]
pub struct SubRange {
    /// Split position along the axis, SI.
    pub point: f64,
    /// Entry side to the point; applied last on the return leg.
    pub m1: TS<Matrix>,
    /// Point to the exit side; applied first.
    pub m2: TS<Matrix>,
}

/// One optical element. Matrices are a pure function of the current
/// parameter values; every parameter mutation recomputes the cache.
/// The inverse pair describes back propagation and differs from the
/// forward pair only for asymmetrical elements (interfaces).
#[derive(Debug, Clone)]
pub struct Element {
    pub label: String,
    pub title: String,
    pub disabled: bool,
    kind: ElementKind,
    matrs: TS<Matrix>,
    matrs_inv: TS<Matrix>,
    sub: Option<SubRange>,
    program: Option<FormulaProgram>,
    fail: Option<String>,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        let mut elem = Self {
            label: String::new(),
            title: String::new(),
            disabled: false,
            kind,
            matrs: TS::unity(),
            matrs_inv: TS::unity(),
            sub: None,
            program: None,
            fail: None,
        };
        if let ElementKind::Formula(_) = elem.kind {
            elem.compile_formula();
        }
        elem.calc_matrix();
        elem
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn matrs(&self) -> &TS<Matrix> {
        &self.matrs
    }

    pub fn matrs_inv(&self) -> &TS<Matrix> {
        &self.matrs_inv
    }

    /// Formula elements enter a failed state when their formula does not
    /// compile or does not produce the required outputs; the matrices
    /// stay identity until the formula is fixed.
    pub fn failed(&self) -> bool {
        self.fail.is_some()
    }

    pub fn fail_reason(&self) -> Option<&str> {
        self.fail.as_deref()
    }

    /// A short display name: the label when set, the title otherwise.
    pub fn display_label(&self) -> &str {
        if !self.label.is_empty() {
            &self.label
        } else if !self.title.is_empty() {
            &self.title
        } else {
            "(unnamed)"
        }
    }

    // --- capabilities ---

    pub fn as_range(&self) -> Option<RangeCap> {
        let (length, ior) = match self.kind {
            ElementKind::EmptyRange { l } => (l, 1.0),
            ElementKind::MediumRange { l, n }
            | ElementKind::Plate { l, n }
            | ElementKind::BrewsterCrystal { l, n }
            | ElementKind::TiltedCrystal { l, n, .. } => (l, n),
            ElementKind::BrewsterPlate { l, n } => {
                return Some(RangeCap {
                    length: l,
                    ior: n,
                    axis_length: l * (n * n + 1.0).sqrt() / n,
                })
            }
            ElementKind::TiltedPlate { l, n, alpha } => {
                let cos_b = (alpha.sin() / n).asin().cos();
                return Some(RangeCap {
                    length: l,
                    ior: n,
                    axis_length: l / cos_b,
                });
            }
            _ => return None,
        };
        Some(RangeCap {
            length,
            ior,
            axis_length: length,
        })
    }

    pub fn as_interface(&self) -> Option<InterfaceCap> {
        match self.kind {
            ElementKind::NormalInterface { n1, n2 }
            | ElementKind::BrewsterInterface { n1, n2 }
            | ElementKind::TiltedInterface { n1, n2, .. }
            | ElementKind::SphericalInterface { n1, n2, .. } => Some(InterfaceCap { n1, n2 }),
            _ => None,
        }
    }

    /// Whether back propagation through the element differs from forward
    /// propagation (the inverse matrix pair is distinct).
    pub fn is_asymmetrical(&self) -> bool {
        self.as_interface().is_some()
    }

    /// Whether the element changes the wavefront curvature of a beam
    /// passing through (focusing elements and refracting surfaces).
    pub fn changes_wavefront(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::CurveMirror { .. }
                | ElementKind::ThinLens { .. }
                | ElementKind::CylinderLensT { .. }
                | ElementKind::CylinderLensS { .. }
        ) || self.as_interface().is_some()
    }

    /// Index of refraction of the element's medium; 1 for non-ranges.
    pub fn ior(&self) -> f64 {
        self.as_range().map(|r| r.ior).unwrap_or(1.0)
    }

    // --- sub-range ---

    /// Splits a range element at `point` (along the axis, SI) into the
    /// entry-side and exit-side half matrices. No effect on non-ranges.
    pub fn set_sub_range_si(&mut self, point: f64) {
        if self.as_range().is_none() {
            return;
        }
        self.sub = Some(SubRange {
            point,
            m1: self.calc_half(point, true),
            m2: self.calc_half(point, false),
        });
    }

    pub fn sub_range(&self) -> Option<&SubRange> {
        self.sub.as_ref()
    }

    // --- parameters ---

    pub fn param_names(&self) -> Vec<String> {
        let names: &[&str] = match &self.kind {
            ElementKind::FlatMirror | ElementKind::Point => &[],
            ElementKind::CurveMirror { .. } => &["R", "Alpha"],
            ElementKind::ThinLens { .. }
            | ElementKind::CylinderLensT { .. }
            | ElementKind::CylinderLensS { .. } => &["F", "Alpha"],
            ElementKind::EmptyRange { .. } => &["L"],
            ElementKind::MediumRange { .. }
            | ElementKind::Plate { .. }
            | ElementKind::BrewsterCrystal { .. }
            | ElementKind::BrewsterPlate { .. } => &["L", "n"],
            ElementKind::TiltedCrystal { .. } | ElementKind::TiltedPlate { .. } => {
                &["L", "n", "Alpha"]
            }
            ElementKind::Matrix { .. } => &["At", "Bt", "Ct", "Dt", "As", "Bs", "Cs", "Ds"],
            ElementKind::Matrix1 { .. } => &["A", "B", "C", "D"],
            ElementKind::NormalInterface { .. } | ElementKind::BrewsterInterface { .. } => {
                &["n1", "n2"]
            }
            ElementKind::TiltedInterface { .. } => &["n1", "n2", "Alpha"],
            ElementKind::SphericalInterface { .. } => &["n1", "n2", "R"],
            ElementKind::Formula(spec) => {
                return spec.params.iter().map(|(n, _)| n.clone()).collect()
            }
        };
        names.iter().map(|n| n.to_string()).collect()
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.param_names().iter().any(|n| n == name)
    }

    pub fn param(&self, name: &str) -> Option<f64> {
        let value = match (&self.kind, name) {
            (ElementKind::CurveMirror { r, .. }, "R") => *r,
            (ElementKind::CurveMirror { alpha, .. }, "Alpha") => *alpha,
            (
                ElementKind::ThinLens { f, .. }
                | ElementKind::CylinderLensT { f, .. }
                | ElementKind::CylinderLensS { f, .. },
                "F",
            ) => *f,
            (
                ElementKind::ThinLens { alpha, .. }
                | ElementKind::CylinderLensT { alpha, .. }
                | ElementKind::CylinderLensS { alpha, .. },
                "Alpha",
            ) => *alpha,
            (ElementKind::EmptyRange { l }, "L") => *l,
            (
                ElementKind::MediumRange { l, .. }
                | ElementKind::Plate { l, .. }
                | ElementKind::BrewsterCrystal { l, .. }
                | ElementKind::BrewsterPlate { l, .. }
                | ElementKind::TiltedCrystal { l, .. }
                | ElementKind::TiltedPlate { l, .. },
                "L",
            ) => *l,
            (
                ElementKind::MediumRange { n, .. }
                | ElementKind::Plate { n, .. }
                | ElementKind::BrewsterCrystal { n, .. }
                | ElementKind::BrewsterPlate { n, .. }
                | ElementKind::TiltedCrystal { n, .. }
                | ElementKind::TiltedPlate { n, .. },
                "n",
            ) => *n,
            (
                ElementKind::TiltedCrystal { alpha, .. } | ElementKind::TiltedPlate { alpha, .. },
                "Alpha",
            ) => *alpha,
            (ElementKind::Matrix { t, s }, _) => match name {
                "At" => t[0],
                "Bt" => t[1],
                "Ct" => t[2],
                "Dt" => t[3],
                "As" => s[0],
                "Bs" => s[1],
                "Cs" => s[2],
                "Ds" => s[3],
                _ => return None,
            },
            (ElementKind::Matrix1 { m }, _) => match name {
                "A" => m[0],
                "B" => m[1],
                "C" => m[2],
                "D" => m[3],
                _ => return None,
            },
            (
                ElementKind::NormalInterface { n1, .. }
                | ElementKind::BrewsterInterface { n1, .. }
                | ElementKind::TiltedInterface { n1, .. }
                | ElementKind::SphericalInterface { n1, .. },
                "n1",
            ) => *n1,
            (
                ElementKind::NormalInterface { n2, .. }
                | ElementKind::BrewsterInterface { n2, .. }
                | ElementKind::TiltedInterface { n2, .. }
                | ElementKind::SphericalInterface { n2, .. },
                "n2",
            ) => *n2,
            (ElementKind::TiltedInterface { alpha, .. }, "Alpha") => *alpha,
            (ElementKind::SphericalInterface { r, .. }, "R") => *r,
            (ElementKind::Formula(spec), _) => {
                return spec.params.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
            }
            _ => return None,
        };
        Some(value)
    }

    /// Sets a parameter by name and recomputes the matrices. Unknown
    /// names and values rejected by the parameter's validity rule fail.
    pub fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        match (&mut self.kind, name) {
            (ElementKind::CurveMirror { r, .. }, "R") => {
                if value == 0.0 {
                    bail!("Curvature radius can't be zero.");
                }
                *r = value;
            }
            (ElementKind::CurveMirror { alpha, .. }, "Alpha") => *alpha = value,
            (
                ElementKind::ThinLens { f, .. }
                | ElementKind::CylinderLensT { f, .. }
                | ElementKind::CylinderLensS { f, .. },
                "F",
            ) => {
                if value == 0.0 {
                    bail!("Focal length can't be zero.");
                }
                *f = value;
            }
            (
                ElementKind::ThinLens { alpha, .. }
                | ElementKind::CylinderLensT { alpha, .. }
                | ElementKind::CylinderLensS { alpha, .. },
                "Alpha",
            ) => *alpha = value,
            (ElementKind::EmptyRange { l }, "L") => *l = value,
            (
                ElementKind::MediumRange { l, .. }
                | ElementKind::Plate { l, .. }
                | ElementKind::BrewsterCrystal { l, .. }
                | ElementKind::BrewsterPlate { l, .. }
                | ElementKind::TiltedCrystal { l, .. }
                | ElementKind::TiltedPlate { l, .. },
                "L",
            ) => *l = value,
            (
                ElementKind::MediumRange { n, .. }
                | ElementKind::Plate { n, .. }
                | ElementKind::BrewsterCrystal { n, .. }
                | ElementKind::BrewsterPlate { n, .. }
                | ElementKind::TiltedCrystal { n, .. }
                | ElementKind::TiltedPlate { n, .. },
                "n",
            ) => *n = value,
            (
                ElementKind::TiltedCrystal { alpha, .. } | ElementKind::TiltedPlate { alpha, .. },
                "Alpha",
            ) => *alpha = value,
            (ElementKind::Matrix { t, s }, _) => match name {
                "At" => t[0] = value,
                "Bt" => t[1] = value,
                "Ct" => t[2] = value,
                "Dt" => t[3] = value,
                "As" => s[0] = value,
                "Bs" => s[1] = value,
                "Cs" => s[2] = value,
                "Ds" => s[3] = value,
                _ => bail!("Element has no parameter '{name}'."),
            },
            (ElementKind::Matrix1 { m }, _) => match name {
                "A" => m[0] = value,
                "B" => m[1] = value,
                "C" => m[2] = value,
                "D" => m[3] = value,
                _ => bail!("Element has no parameter '{name}'."),
            },
            (
                ElementKind::NormalInterface { n1, .. }
                | ElementKind::BrewsterInterface { n1, .. }
                | ElementKind::TiltedInterface { n1, .. }
                | ElementKind::SphericalInterface { n1, .. },
                "n1",
            ) => *n1 = value,
            (
                ElementKind::NormalInterface { n2, .. }
                | ElementKind::BrewsterInterface { n2, .. }
                | ElementKind::TiltedInterface { n2, .. }
                | ElementKind::SphericalInterface { n2, .. },
                "n2",
            ) => *n2 = value,
            (ElementKind::TiltedInterface { alpha, .. }, "Alpha") => *alpha = value,
            (ElementKind::SphericalInterface { r, .. }, "R") => {
                if value == 0.0 {
                    bail!("Curvature radius can't be zero.");
                }
                *r = value;
            }
            (ElementKind::Formula(spec), _) => {
                match spec.params.iter_mut().find(|(n, _)| n == name) {
                    Some((_, v)) => *v = value,
                    None => bail!("Element has no parameter '{name}'."),
                }
            }
            _ => bail!("Element has no parameter '{name}'."),
        }
        self.calc_matrix();
        Ok(())
    }

    /// Media ports are owned by the schema's interface linker, which
    /// rewrites both at once from the neighbor elements.
    pub(crate) fn set_interface_iors(&mut self, left: f64, right: f64) {
        match &mut self.kind {
            ElementKind::NormalInterface { n1, n2 }
            | ElementKind::BrewsterInterface { n1, n2 }
            | ElementKind::TiltedInterface { n1, n2, .. }
            | ElementKind::SphericalInterface { n1, n2, .. } => {
                *n1 = left;
                *n2 = right;
            }
            _ => return,
        }
        self.calc_matrix();
    }

    // --- formula elements ---

    /// Replaces the formula text and recompiles. A failing formula leaves
    /// the element in the failed state with identity matrices.
    pub fn set_formula(&mut self, formula: &str) {
        if let ElementKind::Formula(spec) = &mut self.kind {
            spec.formula = formula.to_string();
            self.compile_formula();
            self.calc_matrix();
        }
    }

    /// Declares one more custom parameter readable by the formula.
    pub fn add_formula_param(&mut self, name: &str, value: f64) {
        if let ElementKind::Formula(spec) = &mut self.kind {
            spec.params.push((name.to_string(), value));
            self.compile_formula();
            self.calc_matrix();
        }
    }

    fn compile_formula(&mut self) {
        let ElementKind::Formula(spec) = &self.kind else {
            return;
        };
        let names: Vec<String> = spec.params.iter().map(|(n, _)| n.clone()).collect();
        match FormulaProgram::compile(&spec.formula, &names) {
            Ok(program) => {
                self.program = Some(program);
                self.fail = None;
            }
            Err(err) => {
                self.program = None;
                self.fail = Some(err.to_string());
            }
        }
    }

    // --- matrices ---

    /// Recomputes the cached forward and inverse matrix pairs from the
    /// current parameter values.
    pub fn calc_matrix(&mut self) {
        match self.calc_matrices() {
            Ok((m, m_inv)) => {
                self.matrs = m;
                self.matrs_inv = m_inv;
                self.fail = None;
            }
            Err(reason) => {
                self.matrs = TS::unity();
                self.matrs_inv = TS::unity();
                self.fail = Some(reason);
            }
        }
    }

    fn calc_matrices(&self) -> std::result::Result<(TS<Matrix>, TS<Matrix>), String> {
        let symmetric = |m: TS<Matrix>| (m, m);
        Ok(match &self.kind {
            ElementKind::FlatMirror | ElementKind::Point => symmetric(TS::unity()),
            ElementKind::CurveMirror { r, alpha } => symmetric(TS::new(
                abcd(1.0, 0.0, -2.0 / r / alpha.cos(), 1.0),
                abcd(1.0, 0.0, -2.0 * alpha.cos() / r, 1.0),
            )),
            ElementKind::ThinLens { f, alpha } => symmetric(TS::new(
                abcd(1.0, 0.0, -1.0 / f / alpha.cos(), 1.0),
                abcd(1.0, 0.0, -1.0 / f * alpha.cos(), 1.0),
            )),
            ElementKind::CylinderLensT { f, alpha } => symmetric(TS::new(
                abcd(1.0, 0.0, -1.0 / f / alpha.cos(), 1.0),
                Matrix::identity(),
            )),
            ElementKind::CylinderLensS { f, alpha } => symmetric(TS::new(
                Matrix::identity(),
                abcd(1.0, 0.0, -1.0 / f * alpha.cos(), 1.0),
            )),
            ElementKind::EmptyRange { l } | ElementKind::MediumRange { l, .. } => {
                symmetric(TS::both(abcd(1.0, *l, 0.0, 1.0)))
            }
            ElementKind::Plate { l, n } => symmetric(TS::both(abcd(1.0, l / n, 0.0, 1.0))),
            ElementKind::BrewsterCrystal { l, n } => symmetric(TS::new(
                abcd(1.0, l / (n * n * n), 0.0, 1.0),
                abcd(1.0, l / n, 0.0, 1.0),
            )),
            ElementKind::BrewsterPlate { l, n } => {
                let axis = l * (n * n + 1.0).sqrt() / n;
                symmetric(TS::new(
                    abcd(1.0, axis / (n * n * n), 0.0, 1.0),
                    abcd(1.0, axis / n, 0.0, 1.0),
                ))
            }
            ElementKind::TiltedCrystal { l, n, alpha } => {
                let sin_a = alpha.sin();
                symmetric(TS::new(
                    abcd(1.0, l * n * alpha.cos().powi(2) / (n * n - sin_a * sin_a), 0.0, 1.0),
                    abcd(1.0, l / n, 0.0, 1.0),
                ))
            }
            ElementKind::TiltedPlate { l, n, alpha } => {
                let sin_a = alpha.sin();
                let s = n * n - sin_a * sin_a;
                symmetric(TS::new(
                    abcd(1.0, l * n * n * (1.0 - sin_a * sin_a) / (s * s * s).sqrt(), 0.0, 1.0),
                    abcd(1.0, l / s.sqrt(), 0.0, 1.0),
                ))
            }
            ElementKind::Matrix { t, s } => symmetric(TS::new(
                abcd(t[0], t[1], t[2], t[3]),
                abcd(s[0], s[1], s[2], s[3]),
            )),
            ElementKind::Matrix1 { m } => symmetric(TS::both(abcd(m[0], m[1], m[2], m[3]))),
            ElementKind::NormalInterface { n1, n2 } => (
                TS::both(abcd(1.0, 0.0, 0.0, n1 / n2)),
                TS::both(abcd(1.0, 0.0, 0.0, n2 / n1)),
            ),
            ElementKind::BrewsterInterface { n1, n2 } => (
                TS::new(
                    abcd(n2 / n1, 0.0, 0.0, (n1 / n2) * (n1 / n2)),
                    abcd(1.0, 0.0, 0.0, n1 / n2),
                ),
                TS::new(
                    abcd(n1 / n2, 0.0, 0.0, (n2 / n1) * (n2 / n1)),
                    abcd(1.0, 0.0, 0.0, n2 / n1),
                ),
            ),
            ElementKind::TiltedInterface { n1, n2, alpha } => {
                // negative angle means it is given at the n2 side
                let (cos_a, cos_b) = if *alpha < 0.0 {
                    (
                        (alpha.abs().sin() * n2 / n1).asin().cos(),
                        alpha.abs().cos(),
                    )
                } else {
                    (alpha.cos(), (alpha.sin() * n1 / n2).asin().cos())
                };
                (
                    TS::new(
                        abcd(cos_b / cos_a, 0.0, 0.0, (n1 / n2) * (cos_a / cos_b)),
                        abcd(1.0, 0.0, 0.0, n1 / n2),
                    ),
                    TS::new(
                        abcd(cos_a / cos_b, 0.0, 0.0, (n2 / n1) * (cos_b / cos_a)),
                        abcd(1.0, 0.0, 0.0, n2 / n1),
                    ),
                )
            }
            ElementKind::SphericalInterface { n1, n2, r } => {
                let c = if r.is_infinite() {
                    0.0
                } else {
                    (n1 - n2) / r / n2
                };
                let c_inv = if r.is_infinite() {
                    0.0
                } else {
                    (n2 - n1) / -r / n1
                };
                (
                    TS::both(abcd(1.0, 0.0, c, n1 / n2)),
                    TS::both(abcd(1.0, 0.0, c_inv, n2 / n1)),
                )
            }
            ElementKind::Formula(spec) => {
                let program = match &self.program {
                    Some(program) => program,
                    None => {
                        return Err(self
                            .fail
                            .clone()
                            .unwrap_or_else(|| "Formula is empty".to_string()))
                    }
                };
                let values: Vec<f64> = spec.params.iter().map(|(_, v)| *v).collect();
                let out = program.eval(&values);
                let fetch = |name: &str| -> std::result::Result<f64, String> {
                    out.get(name).copied().ok_or_else(|| {
                        format!("Formula doesn't contain an expression for '{name}'")
                    })
                };
                let m = if spec.split_planes {
                    TS::new(
                        abcd(fetch("At")?, fetch("Bt")?, fetch("Ct")?, fetch("Dt")?),
                        abcd(fetch("As")?, fetch("Bs")?, fetch("Cs")?, fetch("Ds")?),
                    )
                } else {
                    TS::both(abcd(fetch("A")?, fetch("B")?, fetch("C")?, fetch("D")?))
                };
                symmetric(m)
            }
        })
    }

    fn calc_half(&self, point: f64, entry_side: bool) -> TS<Matrix> {
        let l1 = point;
        match &self.kind {
            ElementKind::EmptyRange { .. } | ElementKind::MediumRange { .. } => {
                let l = self.as_range().map(|r| r.axis_length).unwrap_or(0.0);
                let b = if entry_side { l1 } else { l - l1 };
                TS::both(abcd(1.0, b, 0.0, 1.0))
            }
            ElementKind::Plate { l, n } => {
                if entry_side {
                    TS::both(abcd(1.0, l1 / n, 0.0, 1.0 / n))
                } else {
                    TS::both(abcd(1.0, l - l1, 0.0, *n))
                }
            }
            ElementKind::BrewsterCrystal { l, n } => {
                Self::brewster_half(*n, l1, l - l1, entry_side)
            }
            ElementKind::BrewsterPlate { n, .. } => {
                let axis = self.as_range().map(|r| r.axis_length).unwrap_or(0.0);
                Self::brewster_half(*n, l1, axis - l1, entry_side)
            }
            ElementKind::TiltedCrystal { l, n, alpha } => {
                Self::tilted_half(*n, *alpha, l1, l - l1, entry_side)
            }
            ElementKind::TiltedPlate { n, alpha, .. } => {
                let axis = self.as_range().map(|r| r.axis_length).unwrap_or(0.0);
                Self::tilted_half(*n, *alpha, l1, axis - l1, entry_side)
            }
            _ => TS::unity(),
        }
    }

    fn brewster_half(n: f64, l1: f64, l2: f64, entry_side: bool) -> TS<Matrix> {
        if entry_side {
            TS::new(
                abcd(n, l1 / (n * n), 0.0, 1.0 / (n * n)),
                abcd(1.0, l1 / n, 0.0, 1.0 / n),
            )
        } else {
            TS::new(
                abcd(1.0 / n, l2 / n, 0.0, n * n),
                abcd(1.0, l2, 0.0, n),
            )
        }
    }

    fn tilted_half(n: f64, alpha: f64, l1: f64, l2: f64, entry_side: bool) -> TS<Matrix> {
        let cos_a = alpha.cos();
        let cos_b = (alpha.sin() / n).asin().cos();
        let cos_ab = cos_a / cos_b;
        let cos_ba = cos_b / cos_a;
        if entry_side {
            TS::new(
                abcd(cos_ba, l1 / n * cos_ab, 0.0, cos_ab / n),
                abcd(1.0, l1 / n, 0.0, 1.0 / n),
            )
        } else {
            TS::new(
                abcd(cos_ab, l2 * cos_ab, 0.0, n * cos_ba),
                abcd(1.0, l2, 0.0, n),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Element, ElementKind, FormulaSpec};
    use crate::matrix::Matrix;

    fn det(m: &Matrix) -> f64 {
        m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)]
    }

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "expected {b}, got {a}");
    }

    fn whole_element_kinds() -> Vec<ElementKind> {
        vec![
            ElementKind::FlatMirror,
            ElementKind::Point,
            ElementKind::CurveMirror { r: 0.03, alpha: 5f64.to_radians() },
            ElementKind::ThinLens { f: 0.05, alpha: 11f64.to_radians() },
            ElementKind::CylinderLensT { f: 0.05, alpha: 7f64.to_radians() },
            ElementKind::CylinderLensS { f: 0.05, alpha: 7f64.to_radians() },
            ElementKind::EmptyRange { l: 0.056 },
            ElementKind::MediumRange { l: 0.082, n: 1.4 },
            ElementKind::Plate { l: 0.011, n: 1.5 },
            ElementKind::BrewsterCrystal { l: 0.013, n: 1.66 },
            ElementKind::BrewsterPlate { l: 0.013, n: 1.66 },
            ElementKind::TiltedCrystal { l: 0.014, n: 1.2, alpha: 12f64.to_radians() },
            ElementKind::TiltedPlate { l: 0.014, n: 1.2, alpha: 12f64.to_radians() },
        ]
    }

    #[test]
    fn whole_element_determinants_are_unity() {
        for kind in whole_element_kinds() {
            let elem = Element::new(kind);
            assert_close(det(&elem.matrs().t), 1.0, 1e-9);
            assert_close(det(&elem.matrs().s), 1.0, 1e-9);
            assert_close(det(&elem.matrs_inv().t), 1.0, 1e-9);
            assert_close(det(&elem.matrs_inv().s), 1.0, 1e-9);
        }
    }

    #[test]
    fn interface_determinants_follow_index_ratio() {
        let kinds = vec![
            ElementKind::NormalInterface { n1: 1.0, n2: 1.5 },
            ElementKind::BrewsterInterface { n1: 1.2, n2: 1.7 },
            ElementKind::TiltedInterface { n1: 1.1, n2: 1.6, alpha: 9f64.to_radians() },
            ElementKind::SphericalInterface { n1: 1.0, n2: 1.5, r: 0.09 },
        ];
        for kind in kinds {
            let elem = Element::new(kind);
            let ports = elem.as_interface().expect("interface capability");
            let ratio = ports.n1 / ports.n2;
            assert_close(det(&elem.matrs().t), ratio, 1e-9);
            assert_close(det(&elem.matrs().s), ratio, 1e-9);
            assert_close(det(&elem.matrs_inv().t), 1.0 / ratio, 1e-9);
            assert_close(det(&elem.matrs_inv().s), 1.0 / ratio, 1e-9);
            assert!(elem.is_asymmetrical());
        }
    }

    #[test]
    fn split_halves_compose_into_whole() {
        let ranges = vec![
            ElementKind::EmptyRange { l: 0.056 },
            ElementKind::MediumRange { l: 0.082, n: 1.4 },
            ElementKind::Plate { l: 0.011, n: 1.5 },
            ElementKind::BrewsterCrystal { l: 0.013, n: 1.66 },
            ElementKind::BrewsterPlate { l: 0.013, n: 1.66 },
            ElementKind::TiltedCrystal { l: 0.014, n: 1.2, alpha: 12f64.to_radians() },
            ElementKind::TiltedPlate { l: 0.014, n: 1.2, alpha: 12f64.to_radians() },
        ];
        for kind in ranges {
            let mut elem = Element::new(kind);
            let axis = elem.as_range().expect("range capability").axis_length;
            for fraction in [0.0, 0.25, 0.619, 1.0] {
                elem.set_sub_range_si(axis * fraction);
                let sub = elem.sub_range().expect("sub-range set");
                let whole_t = sub.m2.t * sub.m1.t;
                let whole_s = sub.m2.s * sub.m1.s;
                for (got, want) in [(whole_t, elem.matrs().t), (whole_s, elem.matrs().s)] {
                    for i in 0..2 {
                        for j in 0..2 {
                            assert_close(got[(i, j)], want[(i, j)], 1e-9);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn flat_spherical_interface_has_no_focusing_power() {
        let elem = Element::new(ElementKind::SphericalInterface {
            n1: 1.0,
            n2: 1.5,
            r: f64::INFINITY,
        });
        assert_eq!(elem.matrs().t[(1, 0)], 0.0);
        assert_close(elem.matrs().t[(1, 1)], 1.0 / 1.5, 1e-12);
    }

    #[test]
    fn tilted_interface_angle_can_be_given_at_either_side() {
        // the same physical surface described from the n1 and the n2 side
        let alpha = 9f64.to_radians();
        let n1 = 1.1;
        let n2 = 1.6;
        let beta = (alpha.sin() * n1 / n2).asin();
        let from_n1 = Element::new(ElementKind::TiltedInterface { n1, n2, alpha });
        let from_n2 = Element::new(ElementKind::TiltedInterface { n1, n2, alpha: -beta });
        for (a, b) in [
            (from_n1.matrs().t, from_n2.matrs().t),
            (from_n1.matrs().s, from_n2.matrs().s),
        ] {
            for i in 0..2 {
                for j in 0..2 {
                    assert_close(a[(i, j)], b[(i, j)], 1e-9);
                }
            }
        }
    }

    #[test]
    fn tilted_plate_axis_is_longer_than_thickness() {
        let elem = Element::new(ElementKind::TiltedPlate {
            l: 0.014,
            n: 1.2,
            alpha: 12f64.to_radians(),
        });
        let range = elem.as_range().expect("range capability");
        assert!(range.axis_length > range.length);
        assert_close(range.optical_path(), range.axis_length * 1.2, 1e-12);
    }

    #[test]
    fn zero_radius_and_focus_are_rejected() {
        let mut mirror = Element::new(ElementKind::CurveMirror { r: 0.1, alpha: 0.0 });
        let err = mirror.set_param("R", 0.0).expect_err("zero radius");
        assert!(format!("{err}").contains("Curvature radius"));

        let mut lens = Element::new(ElementKind::ThinLens { f: 0.1, alpha: 0.0 });
        let err = lens.set_param("F", 0.0).expect_err("zero focus");
        assert!(format!("{err}").contains("Focal length"));

        let err = lens.set_param("nope", 1.0).expect_err("unknown name");
        assert!(format!("{err}").contains("no parameter"));
    }

    #[test]
    fn formula_element_evaluates_both_planes() {
        let elem = Element::new(ElementKind::Formula(FormulaSpec {
            formula: "At = 1; Bt = L/n; Ct = 0; Dt = 1; \
                      As = 1; Bs = L; Cs = 0; Ds = 1"
                .to_string(),
            params: vec![("L".to_string(), 0.02), ("n".to_string(), 1.6)],
            split_planes: true,
        }));
        assert!(!elem.failed());
        assert_close(elem.matrs().t[(0, 1)], 0.0125, 1e-12);
        assert_close(elem.matrs().s[(0, 1)], 0.02, 1e-12);
    }

    #[test]
    fn formula_failures_keep_identity_matrices() {
        let empty = Element::new(ElementKind::Formula(FormulaSpec {
            formula: "  ".to_string(),
            params: vec![],
            split_planes: false,
        }));
        assert!(empty.failed());
        assert_eq!(empty.fail_reason(), Some("Formula is empty"));
        assert_eq!(empty.matrs().t, Matrix::identity());

        let unknown = Element::new(ElementKind::Formula(FormulaSpec {
            formula: "A = unknown_func(2)".to_string(),
            params: vec![],
            split_planes: false,
        }));
        assert!(unknown.failed());
        assert_eq!(unknown.fail_reason(), Some("Unknown function 'unknown_func'"));

        let missing = Element::new(ElementKind::Formula(FormulaSpec {
            formula: "At = 1".to_string(),
            params: vec![],
            split_planes: true,
        }));
        assert!(missing.failed());
        assert_eq!(
            missing.fail_reason(),
            Some("Formula doesn't contain an expression for 'Bt'")
        );
        assert_eq!(missing.matrs().t, Matrix::identity());
    }

    #[test]
    fn formula_param_updates_recompute_matrix() {
        let mut elem = Element::new(ElementKind::Formula(FormulaSpec {
            formula: "A = 1; B = L; C = 0; D = 1".to_string(),
            params: vec![("L".to_string(), 0.1)],
            split_planes: false,
        }));
        assert_close(elem.matrs().t[(0, 1)], 0.1, 1e-12);
        elem.set_param("L", 0.25).expect("set formula param");
        assert_close(elem.matrs().t[(0, 1)], 0.25, 1e-12);
        assert_close(elem.matrs().s[(0, 1)], 0.25, 1e-12);
    }
}
