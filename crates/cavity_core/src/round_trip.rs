//! Round-trip matrix calculator: walks the active elements from a
//! reference element according to the trip type, then multiplies the
//! collected per-plane matrices into the full round-trip matrix.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::matrix::{Matrix, TS};
use crate::schema::{Schema, TripType};

/// How the stability parameter is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StabilityMode {
    /// P = (A + D) / 2; stable between -1 and 1.
    Normal,
    /// P = 1 - ((A + D) / 2)^2; stable between 0 and 1.
    Squared,
}

impl StabilityMode {
    /// Interval of reported values a stable system falls into; plots
    /// put the stability-boundary markers at its ends.
    pub fn stable_interval(self) -> (f64, f64) {
        match self {
            StabilityMode::Normal => (-1.0, 1.0),
            StabilityMode::Squared => (0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TripItem {
    index: usize,
    second_pass: bool,
}

/// Which cached matrix of which element enters the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatrixSel {
    Whole(usize),
    /// Second pass in a standing-wave system reads the back-propagation
    /// pair; it only differs from the forward pair for asymmetrical
    /// elements.
    Inverse(usize),
    /// Entry half of the split reference range; applied last.
    LeftHalf(usize),
    /// Exit half of the split reference range; applied first.
    RightHalf(usize),
}

/// The calculator captures the traversal structure once; matrix values
/// are read from the schema at multiplication time, so a sweep loop can
/// keep mutating parameters between `multiply` calls. Structural schema
/// changes (insert, remove, enable, trip type) invalidate the captured
/// traversal; rebuild after them.
#[derive(Debug, Clone)]
pub struct RoundTripCalculator {
    reference: usize,
    split: bool,
    items: Vec<TripItem>,
    plan: Vec<MatrixSel>,
    mode: StabilityMode,
}

impl RoundTripCalculator {
    pub fn build(schema: &Schema, reference: Option<usize>, split: bool) -> Result<Self> {
        let (reference, ref_elem) = match reference.and_then(|i| schema.element(i).map(|e| (i, e)))
        {
            Some(found) => found,
            None => bail!("Reference element is not set"),
        };
        if ref_elem.disabled {
            bail!(
                "Reference element {} is disabled",
                ref_elem.display_label()
            );
        }
        let active = schema.active_elements();
        if active.is_empty() {
            bail!("There are no active elements in the schema");
        }
        let pos = active
            .iter()
            .position(|&i| i == reference)
            .expect("enabled reference is active");

        let items = match schema.trip_type() {
            TripType::SW => Self::walk_sw(&active, pos),
            TripType::RR => Self::walk_rr(&active, pos),
            TripType::SP => Self::walk_sp(&active, pos),
        };
        let plan = Self::collect(schema, &items, reference, split, schema.trip_type());
        Ok(Self {
            reference,
            split,
            items,
            plan,
            mode: StabilityMode::Normal,
        })
    }

    /// Reference, down to the first element, up to the last one and
    /// back to the reference. The end elements are passed once, the
    /// middle ones twice; the return-leg occurrences are second passes.
    fn walk_sw(active: &[usize], pos: usize) -> Vec<TripItem> {
        let n = active.len() as isize;
        let r = pos as isize;
        let mut items = Vec::new();
        let mut i = r;
        while i > 0 {
            items.push(TripItem {
                index: active[i as usize],
                second_pass: false,
            });
            i -= 1;
        }
        let mut c = n;
        if r == n - 1 {
            c -= 1;
        }
        while i < c {
            items.push(TripItem {
                index: active[i as usize],
                second_pass: i != 0 && i != n - 1,
            });
            i += 1;
        }
        i -= 2;
        while i > r {
            items.push(TripItem {
                index: active[i as usize],
                second_pass: false,
            });
            i -= 1;
        }
        items
    }

    /// Reference down to the first element, then the tail from the last
    /// element back to the reference. Every element is passed once.
    fn walk_rr(active: &[usize], pos: usize) -> Vec<TripItem> {
        let r = pos as isize;
        let mut items = Vec::new();
        let mut i = r;
        while i >= 0 {
            items.push(TripItem {
                index: active[i as usize],
                second_pass: false,
            });
            i -= 1;
        }
        i = active.len() as isize - 1;
        while i > r {
            items.push(TripItem {
                index: active[i as usize],
                second_pass: false,
            });
            i -= 1;
        }
        items
    }

    /// Reference down to the first element only.
    fn walk_sp(active: &[usize], pos: usize) -> Vec<TripItem> {
        let mut items = Vec::new();
        let mut i = pos as isize;
        while i >= 0 {
            items.push(TripItem {
                index: active[i as usize],
                second_pass: false,
            });
            i -= 1;
        }
        items
    }

    fn collect(
        schema: &Schema,
        items: &[TripItem],
        reference: usize,
        split: bool,
        trip_type: TripType,
    ) -> Vec<MatrixSel> {
        let mut plan = Vec::with_capacity(items.len() + 1);
        let mut start = 0;
        let split_range = split
            && schema
                .element(reference)
                .map(|e| e.as_range().is_some())
                .unwrap_or(false);
        if split_range {
            plan.push(MatrixSel::LeftHalf(reference));
            start = 1;
        }
        for item in &items[start..] {
            plan.push(if item.second_pass {
                MatrixSel::Inverse(item.index)
            } else {
                MatrixSel::Whole(item.index)
            });
        }
        // single-pass trips end at the point, so the exit half stays out
        if split_range && trip_type != TripType::SP {
            plan.push(MatrixSel::RightHalf(reference));
        }
        plan
    }

    pub fn reference(&self) -> usize {
        self.reference
    }

    pub fn is_split(&self) -> bool {
        self.split
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }

    /// Element indices in traversal order.
    pub fn element_indices(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.index).collect()
    }

    /// Space-separated element labels in traversal order.
    pub fn round_trip_str(&self, schema: &Schema) -> String {
        self.items
            .iter()
            .filter_map(|item| schema.element(item.index))
            .map(|e| e.display_label().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Multiplies the matrices in traversal order; the rightmost factor
    /// acts on the beam first. Panics if a split reference range has no
    /// sub-range set; callers set it before every multiplication.
    pub fn multiply(&self, schema: &Schema) -> TS<Matrix> {
        let mut mt = Matrix::identity();
        let mut ms = Matrix::identity();
        for sel in &self.plan {
            let m = Self::fetch(schema, *sel);
            mt *= m.t;
            ms *= m.s;
        }
        TS::new(mt, ms)
    }

    fn fetch(schema: &Schema, sel: MatrixSel) -> TS<Matrix> {
        match sel {
            MatrixSel::Whole(i) => *Self::elem(schema, i).matrs(),
            MatrixSel::Inverse(i) => *Self::elem(schema, i).matrs_inv(),
            MatrixSel::LeftHalf(i) => {
                Self::elem(schema, i)
                    .sub_range()
                    .expect("sub-range must be set before multiplying a split round trip")
                    .m1
            }
            MatrixSel::RightHalf(i) => {
                Self::elem(schema, i)
                    .sub_range()
                    .expect("sub-range must be set before multiplying a split round trip")
                    .m2
            }
        }
    }

    fn elem(schema: &Schema, index: usize) -> &crate::element::Element {
        schema
            .element(index)
            .expect("round trip refers to a removed element")
    }

    // --- stability ---

    pub fn stability_mode(&self) -> StabilityMode {
        self.mode
    }

    pub fn set_stability_mode(&mut self, mode: StabilityMode) {
        self.mode = mode;
    }

    /// Stability parameter of a round-trip matrix in the current mode.
    pub fn stability(&self, m: &TS<Matrix>) -> TS<f64> {
        m.map(|m| {
            let p = (m[(0, 0)] + m[(1, 1)]) * 0.5;
            match self.mode {
                StabilityMode::Normal => p,
                StabilityMode::Squared => 1.0 - p * p,
            }
        })
    }

    /// Strict stability verdict; independent of the reporting mode.
    pub fn is_stable(m: &TS<Matrix>) -> TS<bool> {
        m.map(|m| {
            let p = (m[(0, 0)] + m[(1, 1)]) * 0.5;
            p > -1.0 && p < 1.0
        })
    }
}

/// Whole-schema stability verdict, computed against the first active
/// element. Schemas with no usable round trip count as unstable.
pub fn is_schema_stable(schema: &Schema) -> TS<bool> {
    let first = schema.active_elements().first().copied();
    match RoundTripCalculator::build(schema, first, false) {
        Ok(calc) => RoundTripCalculator::is_stable(&calc.multiply(schema)),
        Err(_) => TS::both(false),
    }
}

#[cfg(test)]
mod tests {
    use super::{is_schema_stable, RoundTripCalculator, StabilityMode};
    use crate::element::{Element, ElementKind};
    use crate::matrix::TS;
    use crate::schema::{Schema, TripType};

    fn labeled(label: &str, kind: ElementKind) -> Element {
        let mut elem = Element::new(kind);
        elem.label = label.to_string();
        elem
    }

    fn four_ranges(trip_type: TripType) -> Schema {
        let mut schema = Schema::new(trip_type);
        for label in ["e0", "e1", "e2", "e3"] {
            schema.add_element(labeled(label, ElementKind::EmptyRange { l: 0.1 }));
        }
        schema
    }

    /// Two curved mirrors, a folding flat and two spacers; curvatures
    /// and angles chosen so the cavity crosses in and out of stability
    /// when the first spacer length varies.
    fn folded_cavity() -> Schema {
        let mut schema = Schema::new(TripType::SW);
        schema.add_element(labeled(
            "M1",
            ElementKind::CurveMirror { r: 0.03, alpha: 5f64.to_radians() },
        ));
        schema.add_element(labeled("d1", ElementKind::EmptyRange { l: 0.056 }));
        schema.add_element(labeled(
            "M2",
            ElementKind::CurveMirror { r: 0.05, alpha: 10f64.to_radians() },
        ));
        schema.add_element(labeled("d2", ElementKind::EmptyRange { l: 0.420 }));
        schema.add_element(labeled("M3", ElementKind::FlatMirror));
        schema.set_wavelength(1000e-9).expect("wavelength");
        schema
    }

    fn trip_str(schema: &Schema, reference: usize) -> String {
        RoundTripCalculator::build(schema, Some(reference), false)
            .expect("round trip")
            .round_trip_str(schema)
    }

    #[test]
    fn standing_wave_traversal_orders() {
        let schema = four_ranges(TripType::SW);
        assert_eq!(trip_str(&schema, 2), "e2 e1 e0 e1 e2 e3");
        assert_eq!(trip_str(&schema, 0), "e0 e1 e2 e3 e2 e1");
        assert_eq!(trip_str(&schema, 3), "e3 e2 e1 e0 e1 e2");
    }

    #[test]
    fn ring_traversal_orders() {
        let schema = four_ranges(TripType::RR);
        assert_eq!(trip_str(&schema, 2), "e2 e1 e0 e3");
        assert_eq!(trip_str(&schema, 0), "e0 e3 e2 e1");
        assert_eq!(trip_str(&schema, 3), "e3 e2 e1 e0");
    }

    #[test]
    fn single_pass_traversal_stops_at_the_first_element() {
        let schema = four_ranges(TripType::SP);
        assert_eq!(trip_str(&schema, 2), "e2 e1 e0");
        assert_eq!(trip_str(&schema, 0), "e0");
        assert_eq!(trip_str(&schema, 3), "e3 e2 e1 e0");
    }

    #[test]
    fn second_pass_through_an_interface_uses_the_inverse_matrix() {
        let mut schema = Schema::new(TripType::SW);
        schema.add_element(labeled("d1", ElementKind::EmptyRange { l: 0.1 }));
        schema.add_element(labeled("s1", ElementKind::NormalInterface { n1: 1.0, n2: 1.0 }));
        schema.add_element(labeled("d2", ElementKind::MediumRange { l: 0.2, n: 1.5 }));
        schema.add_element(labeled("M1", ElementKind::FlatMirror));

        let calc = RoundTripCalculator::build(&schema, Some(0), false).expect("round trip");
        assert_eq!(calc.round_trip_str(&schema), "d1 s1 d2 M1 d2 s1");

        // the interface rescales the reduced angle on the way in and
        // back out, so the medium contributes its length over n twice
        let m = calc.multiply(&schema);
        let want_b = 0.1 + 2.0 * 0.2 / 1.5;
        for plane in [m.t, m.s] {
            assert!((plane[(0, 0)] - 1.0).abs() < 1e-12);
            assert!((plane[(0, 1)] - want_b).abs() < 1e-12);
            assert!(plane[(1, 0)].abs() < 1e-12);
            assert!((plane[(1, 1)] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn split_reference_closes_the_trip_through_both_halves() {
        let mut schema = Schema::new(TripType::SW);
        schema.add_element(labeled("M1", ElementKind::FlatMirror));
        schema.add_element(labeled("d1", ElementKind::EmptyRange { l: 0.1 }));
        schema.add_element(labeled("M2", ElementKind::FlatMirror));
        schema
            .element_mut(1)
            .expect("element")
            .set_sub_range_si(0.03);

        let calc = RoundTripCalculator::build(&schema, Some(1), true).expect("round trip");
        let m = calc.multiply(&schema);
        // point -> exit -> back through the whole range -> entry -> point
        assert!((m.t[(0, 1)] - 0.2).abs() < 1e-12);
        assert!((m.t[(0, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn split_single_pass_stops_at_the_point() {
        let mut schema = Schema::new(TripType::SP);
        schema.add_element(labeled("d1", ElementKind::EmptyRange { l: 0.1 }));
        schema
            .element_mut(0)
            .expect("element")
            .set_sub_range_si(0.03);
        let calc = RoundTripCalculator::build(&schema, Some(0), true).expect("round trip");
        let m = calc.multiply(&schema);
        assert!((m.t[(0, 1)] - 0.03).abs() < 1e-12);
    }

    #[test]
    fn stability_against_reference_cavity() {
        let mut schema = folded_cavity();
        let mut calc = RoundTripCalculator::build(&schema, Some(0), false).expect("round trip");

        let cases = [
            // (d1 length, pT, pS, stable)
            (0.030, 5.114896668, 4.091677496, false),
            (0.045, 8.820438181, 8.678370789, false),
            (0.056, -0.946404361, 0.411007405, true),
        ];
        for (length, want_t, want_s, stable) in cases {
            schema.set_param_raw(1, "L", length).expect("set L");
            let m = calc.multiply(&schema);
            let p = calc.stability(&m);
            assert!((p.t - want_t).abs() < 1e-6, "T at {length}: {}", p.t);
            assert!((p.s - want_s).abs() < 1e-6, "S at {length}: {}", p.s);
            let verdict = RoundTripCalculator::is_stable(&m);
            assert_eq!(verdict.t, stable, "T verdict at {length}");
            assert_eq!(verdict.s, stable, "S verdict at {length}");
        }

        calc.set_stability_mode(StabilityMode::Squared);
        schema.set_param_raw(1, "L", 0.056).expect("set L");
        let p = calc.stability(&calc.multiply(&schema));
        assert!((p.t - 0.104318786).abs() < 1e-6);
        assert!((p.s - 0.831072913).abs() < 1e-6);
    }

    #[test]
    fn marginal_cavity_sits_on_the_boundary_and_counts_as_unstable() {
        // plane-plane cavity: A = D = 1 exactly
        let mut schema = Schema::new(TripType::SW);
        schema.add_element(labeled("M1", ElementKind::FlatMirror));
        schema.add_element(labeled("d1", ElementKind::EmptyRange { l: 0.1 }));
        schema.add_element(labeled("M2", ElementKind::FlatMirror));

        let mut calc = RoundTripCalculator::build(&schema, Some(0), false).expect("round trip");
        let m = calc.multiply(&schema);
        let p = calc.stability(&m);
        assert_eq!(p, TS::both(1.0));
        assert_eq!(RoundTripCalculator::is_stable(&m), TS::both(false));

        calc.set_stability_mode(StabilityMode::Squared);
        assert_eq!(calc.stability(&m), TS::both(0.0));

        // the reported values sit exactly on the marker ends
        assert_eq!(StabilityMode::Normal.stable_interval(), (-1.0, 1.0));
        assert_eq!(StabilityMode::Squared.stable_interval(), (0.0, 1.0));
    }

    #[test]
    fn whole_schema_stability_uses_the_first_active_element() {
        let mut schema = folded_cavity();
        assert_eq!(is_schema_stable(&schema), TS::both(true));
        schema.set_param(1, "L", 0.045).expect("set L");
        assert_eq!(is_schema_stable(&schema), TS::both(false));
    }

    #[test]
    fn build_errors() {
        let mut schema = four_ranges(TripType::SW);

        let err = RoundTripCalculator::build(&schema, None, false).expect_err("no reference");
        assert_eq!(format!("{err}"), "Reference element is not set");

        schema.set_disabled(2, true).expect("disable");
        let err = RoundTripCalculator::build(&schema, Some(2), false).expect_err("disabled ref");
        assert_eq!(format!("{err}"), "Reference element e2 is disabled");

        for i in 0..schema.count() {
            schema.set_disabled(i, true).expect("disable");
        }
        let err = RoundTripCalculator::build(&schema, Some(0), false).expect_err("all disabled");
        assert!(format!("{err}").contains("disabled"));
    }

    #[test]
    fn disabled_elements_are_left_out_of_the_trip() {
        let mut schema = four_ranges(TripType::SW);
        schema.set_disabled(1, true).expect("disable");
        assert_eq!(trip_str(&schema, 2), "e2 e0 e2 e3");
    }
}
