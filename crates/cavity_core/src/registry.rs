//! Constructor catalog for the element types. Outer layers receive a
//! registry instance instead of reaching for a global singleton, so
//! alternative catalogs (trimmed or extended) can be injected.

use anyhow::{bail, Result};

use crate::element::{Element, ElementKind, FormulaSpec};

#[derive(Clone)]
pub struct RegistryEntry {
    /// Stable identifier used to request construction.
    pub key: &'static str,
    /// Human-readable type name.
    pub name: &'static str,
    /// Prefix for auto-generated labels (`M1`, `d2`, ...).
    pub label_prefix: &'static str,
    ctor: fn() -> ElementKind,
}

impl RegistryEntry {
    pub fn make_kind(&self) -> ElementKind {
        (self.ctor)()
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("label_prefix", &self.label_prefix)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ElementRegistry {
    entries: Vec<RegistryEntry>,
}

impl Default for ElementRegistry {
    fn default() -> Self {
        let entry = |key, name, label_prefix, ctor| RegistryEntry {
            key,
            name,
            label_prefix,
            ctor,
        };
        Self {
            entries: vec![
                entry("FlatMirror", "Flat mirror", "M", || ElementKind::FlatMirror),
                entry("CurveMirror", "Curved mirror", "M", || {
                    ElementKind::CurveMirror { r: 0.1, alpha: 0.0 }
                }),
                entry("ThinLens", "Thin lens", "F", || ElementKind::ThinLens {
                    f: 0.1,
                    alpha: 0.0,
                }),
                entry("CylinderLensT", "Cylindrical tangential lens", "F", || {
                    ElementKind::CylinderLensT { f: 0.1, alpha: 0.0 }
                }),
                entry("CylinderLensS", "Cylindrical sagittal lens", "F", || {
                    ElementKind::CylinderLensS { f: 0.1, alpha: 0.0 }
                }),
                entry("EmptyRange", "Empty space", "d", || ElementKind::EmptyRange {
                    l: 0.1,
                }),
                entry("MediumRange", "Space filled with medium", "d", || {
                    ElementKind::MediumRange { l: 0.1, n: 1.0 }
                }),
                entry("Plate", "Plate of matter", "G", || ElementKind::Plate {
                    l: 0.1,
                    n: 1.0,
                }),
                entry("BrewsterCrystal", "Brewster crystal", "G", || {
                    ElementKind::BrewsterCrystal { l: 0.1, n: 1.0 }
                }),
                entry("BrewsterPlate", "Brewster plate", "G", || {
                    ElementKind::BrewsterPlate { l: 0.1, n: 1.0 }
                }),
                entry("TiltedCrystal", "Tilted crystal", "G", || {
                    ElementKind::TiltedCrystal { l: 0.1, n: 1.0, alpha: 0.0 }
                }),
                entry("TiltedPlate", "Tilted plate", "G", || ElementKind::TiltedPlate {
                    l: 0.1,
                    n: 1.0,
                    alpha: 0.0,
                }),
                entry("Matrix", "Custom matrix", "C", || ElementKind::Matrix {
                    t: [1.0, 0.0, 0.0, 1.0],
                    s: [1.0, 0.0, 0.0, 1.0],
                }),
                entry("Matrix1", "Custom matrix (same planes)", "C", || {
                    ElementKind::Matrix1 { m: [1.0, 0.0, 0.0, 1.0] }
                }),
                entry("Point", "Point", "P", || ElementKind::Point),
                entry("NormalInterface", "Normal interface", "s", || {
                    ElementKind::NormalInterface { n1: 1.0, n2: 1.0 }
                }),
                entry("BrewsterInterface", "Brewster interface", "s", || {
                    ElementKind::BrewsterInterface { n1: 1.0, n2: 1.0 }
                }),
                entry("TiltedInterface", "Tilted interface", "s", || {
                    ElementKind::TiltedInterface { n1: 1.0, n2: 1.0, alpha: 0.0 }
                }),
                entry("SphericalInterface", "Spherical interface", "s", || {
                    ElementKind::SphericalInterface { n1: 1.0, n2: 1.0, r: 0.1 }
                }),
                entry("Formula", "Formula matrix", "C", || {
                    ElementKind::Formula(FormulaSpec {
                        formula: String::new(),
                        params: Vec::new(),
                        split_planes: false,
                    })
                }),
            ],
        }
    }
}

impl ElementRegistry {
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn find(&self, key: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Builds an element of the given type with catalog defaults. The
    /// label stays empty until a schema assigns one.
    pub fn create(&self, key: &str) -> Result<Element> {
        match self.find(key) {
            Some(entry) => Ok(Element::new(entry.make_kind())),
            None => bail!("Unknown element type '{key}'."),
        }
    }
}
