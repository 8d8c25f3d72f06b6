//! Beam variation: beam radius at a fixed observation point while some
//! other element parameter sweeps.

use anyhow::{bail, Result};

use super::{
    check_arg, check_points, set_sub_range, FunctionRange, PlotFunction, PlotSegment, ResultSet,
};
use crate::beam::{AbcdBeamCalculator, PumpCalculator};
use crate::element::Element;
use crate::matrix::{Matrix, WorkPlane, TS};
use crate::round_trip::RoundTripCalculator;
use crate::schema::{ParamBackup, Schema};
use crate::variable::{PlotPosition, PlottingRange, Variable};

/// Beam radius at one position inside a range element as a function of
/// another parameter. Samples where the beam cannot be computed (an
/// unstable resonator, most commonly) leave gaps in the curves.
#[derive(Debug, Clone)]
pub struct BeamVariationFunction {
    arg: Variable,
    pos: PlotPosition,
    results: TS<ResultSet>,
    range: FunctionRange,
    ior: f64,
    calc: Option<RoundTripCalculator>,
    beam_calc: Option<AbcdBeamCalculator>,
    pump_calc: Option<TS<PumpCalculator>>,
}

impl BeamVariationFunction {
    pub fn new(arg: Variable, pos: PlotPosition) -> Self {
        Self {
            arg,
            pos,
            results: TS::new(ResultSet::new(), ResultSet::new()),
            range: FunctionRange::default(),
            ior: 1.0,
            calc: None,
            beam_calc: None,
            pump_calc: None,
        }
    }

    pub fn arg(&self) -> &Variable {
        &self.arg
    }

    pub fn pos(&self) -> &PlotPosition {
        &self.pos
    }

    pub fn calculate(&mut self, schema: &mut Schema) -> Result<()> {
        let result = self.calculate_impl(schema);
        if result.is_err() {
            self.clear_results();
        }
        result
    }

    fn calculate_impl(&mut self, schema: &mut Schema) -> Result<()> {
        let arg_index = check_arg(&self.arg)?;
        let pos_index = match self.pos.element {
            Some(index) => index,
            None => bail!("No position element is set"),
        };

        self.ior = 1.0;

        let range = self.arg.range.plotting_range()?;
        self.range.set(range.start(), range.stop());
        self.clear_results();

        let calc = RoundTripCalculator::build(schema, Some(pos_index), true)?;

        if let Some(cap) = schema.element(pos_index).and_then(Element::as_range) {
            self.ior = cap.ior;
            let offset = self.pos.offset.to_si(cap.axis_length);
            set_sub_range(schema, pos_index, offset);
        }

        let wavelength = schema.wavelength();
        if schema.trip_type().is_resonator() {
            self.beam_calc = Some(AbcdBeamCalculator::new(wavelength));
            self.pump_calc = None;
        } else {
            let mode = match schema.active_pump() {
                Some(pump) => pump.mode,
                None => bail!("There is no active pump in the schema"),
            };
            self.pump_calc = Some(TS::new(
                PumpCalculator::t(&mode, wavelength),
                PumpCalculator::s(&mode, wavelength),
            ));
            self.beam_calc = None;
        }

        let backup = ParamBackup::take(schema, arg_index, &self.arg.param)?;
        let outcome = self.sweep(schema, &calc, &range, arg_index, pos_index, wavelength);
        backup.restore(schema)?;
        self.calc = Some(calc);
        outcome?;
        check_points(&self.results)
    }

    fn sweep(
        &mut self,
        schema: &mut Schema,
        calc: &RoundTripCalculator,
        range: &PlottingRange,
        arg_index: usize,
        pos_index: usize,
        wavelength: f64,
    ) -> Result<()> {
        // Sweeping a parameter of the observed element itself can move
        // its exit face, so the offset resolves against the current
        // axis length on every step.
        let same_element = self.pos.element == self.arg.element;

        for &x in range.values() {
            schema.set_param_raw(arg_index, &self.arg.param, x)?;
            if same_element {
                if let Some(cap) = schema.element(pos_index).and_then(Element::as_range) {
                    let offset = self.pos.offset.to_si(cap.axis_length);
                    set_sub_range(schema, pos_index, offset);
                }
            }
            let m = calc.multiply(schema);
            let w = self.beam_radius(&m, wavelength);
            self.results.t.add_point(x, w.t);
            self.results.s.add_point(x, w.s);
        }
        Ok(())
    }

    /// Beam radius at the observation point for one value of the swept
    /// parameter, non-destructively. Needs a prior successful
    /// `calculate`.
    pub fn calculate_at(&self, schema: &mut Schema, x: f64) -> Result<TS<f64>> {
        let arg_index = check_arg(&self.arg)?;
        let pos_index = match self.pos.element {
            Some(index) => index,
            None => bail!("No position element is set"),
        };
        let calc = match &self.calc {
            Some(calc) => calc,
            None => bail!("Function is not calculated"),
        };
        let backup = ParamBackup::take(schema, arg_index, &self.arg.param)?;
        schema.set_param_raw(arg_index, &self.arg.param, x)?;
        if let Some(cap) = schema.element(pos_index).and_then(Element::as_range) {
            let offset = self.pos.offset.to_si(cap.axis_length);
            set_sub_range(schema, pos_index, offset);
        }
        let m = calc.multiply(schema);
        let w = self.beam_radius(&m, schema.wavelength());
        backup.restore(schema)?;
        Ok(w)
    }

    fn beam_radius(&self, m: &TS<Matrix>, wavelength: f64) -> TS<f64> {
        if let Some(beam_calc) = &self.beam_calc {
            TS::new(
                beam_calc.beam_radius(&m.t, self.ior),
                beam_calc.beam_radius(&m.s, self.ior),
            )
        } else if let Some(pump_calc) = &self.pump_calc {
            let lambda = wavelength / self.ior;
            TS::new(
                pump_calc.t.calc(&m.t, lambda).beam_radius,
                pump_calc.s.calc(&m.s, lambda).beam_radius,
            )
        } else {
            TS::new(f64::NAN, f64::NAN)
        }
    }

    fn clear_results(&mut self) {
        self.results.t.reset();
        self.results.s.reset();
    }
}

impl PlotFunction for BeamVariationFunction {
    fn name(&self) -> &'static str {
        "Beam Variation"
    }

    fn segment_count(&self, plane: WorkPlane) -> usize {
        self.results.plane(plane).segment_count()
    }

    fn segment(&self, plane: WorkPlane, index: usize) -> &PlotSegment {
        self.results.plane(plane).segment(index)
    }

    fn range(&self) -> &FunctionRange {
        &self.range
    }
}

#[cfg(test)]
mod tests {
    use super::BeamVariationFunction;
    use crate::element::{Element, ElementKind};
    use crate::functions::PlotFunction;
    use crate::matrix::{WorkPlane, TS};
    use crate::pump::{Pump, PumpMode};
    use crate::schema::{Schema, TripType};
    use crate::variable::{Offset, PlotPosition, Variable, VariableRange};

    fn labeled(label: &str, kind: ElementKind) -> Element {
        let mut elem = Element::new(kind);
        elem.label = label.to_string();
        elem
    }

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

    fn at_d1(offset: Offset) -> PlotPosition {
        PlotPosition { element: Some(1), offset }
    }

    #[test]
    fn watches_the_beam_while_a_mirror_bends() {
        let mut schema = folded_cavity();
        let mut func = BeamVariationFunction::new(
            Variable::new(2, "R", VariableRange::with_points(0.0495, 0.0515, 5)),
            at_d1(Offset::Si(0.028)),
        );
        func.calculate(&mut schema).expect("calculate");

        // the cavity is unstable in T at the first sample and in S at
        // the last two, so each plane keeps one shortened segment
        assert_eq!(func.segment_count(WorkPlane::T), 1);
        let seg_t = func.segment(WorkPlane::T, 0);
        assert_eq!(seg_t.points_count(), 4);
        assert!((seg_t.x()[0] - 0.050).abs() < 1e-9);
        let want_t = [
            6.971809379531e-5,
            4.472316421177e-5,
            4.110602777543e-5,
            4.021718483451e-5,
        ];
        for (i, want) in want_t.iter().enumerate() {
            assert!(
                (seg_t.y()[i] - want).abs() < 1e-12,
                "T w[{i}] = {}",
                seg_t.y()[i]
            );
        }

        assert_eq!(func.segment_count(WorkPlane::S), 1);
        let seg_s = func.segment(WorkPlane::S, 0);
        assert_eq!(seg_s.points_count(), 3);
        assert!((seg_s.x()[0] - 0.0495).abs() < 1e-9);
        let want_s = [4.471471878805e-5, 4.560755463687e-5, 5.025832935222e-5];
        for (i, want) in want_s.iter().enumerate() {
            assert!(
                (seg_s.y()[i] - want).abs() < 1e-12,
                "S w[{i}] = {}",
                seg_s.y()[i]
            );
        }

        // probing outside the sweep works and leaves the schema alone
        let p = func.calculate_at(&mut schema, 0.052).expect("probe");
        assert!((p.t - 4.095580674053e-5).abs() < 1e-12, "wT = {}", p.t);
        assert!(p.s.is_nan());
        assert!((schema.param(2, "R").expect("R") - 0.05).abs() < 1e-15);
    }

    #[test]
    fn sweep_with_no_computable_sample_fails() {
        let mut schema = folded_cavity();
        let mut func = BeamVariationFunction::new(
            Variable::new(2, "R", VariableRange::with_points(0.040, 0.060, 6)),
            at_d1(Offset::Si(0.028)),
        );
        // one plane has a single stable sample, the other none; a
        // lone point cannot form a curve
        let err = func.calculate(&mut schema).expect_err("no curve");
        assert_eq!(err.to_string(), "No one valid point was calculated");
        assert_eq!(func.segment(WorkPlane::T, 0).points_count(), 0);
        assert_eq!(func.segment(WorkPlane::S, 0).points_count(), 0);
    }

    #[test]
    fn sweeping_the_observed_element_moves_the_offset() {
        let mut schema = folded_cavity();
        let mut func = BeamVariationFunction::new(
            Variable::new(1, "L", VariableRange::with_points(0.054, 0.058, 5)),
            at_d1(Offset::Percent(50.0)),
        );
        func.calculate(&mut schema).expect("calculate");

        let seg_t = func.segment(WorkPlane::T, 0);
        assert_eq!(seg_t.points_count(), 2);
        assert!((seg_t.x()[0] - 0.055).abs() < 1e-9);
        assert!((seg_t.y()[0] - 5.196190331666e-5).abs() < 1e-12);
        assert!((seg_t.y()[1] - 6.971809379531e-5).abs() < 1e-12);

        let seg_s = func.segment(WorkPlane::S, 0);
        assert_eq!(seg_s.points_count(), 2);
        assert!((seg_s.x()[0] - 0.056).abs() < 1e-9);
        assert!((seg_s.y()[0] - 4.560755463687e-5).abs() < 1e-12);
        assert!((seg_s.y()[1] - 4.496481551843e-5).abs() < 1e-12);

        assert!((schema.param(1, "L").expect("L") - 0.056).abs() < 1e-15);
    }

    #[test]
    fn negative_offset_counts_from_the_exit_face() {
        let mut schema = folded_cavity();
        let mut func = BeamVariationFunction::new(
            Variable::new(2, "R", VariableRange::with_points(0.050, 0.051, 2)),
            at_d1(Offset::Si(-0.026)),
        );
        func.calculate(&mut schema).expect("calculate");

        // 26mm back from the exit is 30mm in
        let seg_t = func.segment(WorkPlane::T, 0);
        let seg_s = func.segment(WorkPlane::S, 0);
        assert!((seg_t.y()[0] - 9.659161038704e-6).abs() < 1e-12, "wT = {}", seg_t.y()[0]);
        assert!((seg_s.y()[0] - 1.567941073414e-5).abs() < 1e-12, "wS = {}", seg_s.y()[0]);
    }

    #[test]
    fn single_pass_watches_the_pump_beam() {
        let mut schema = Schema::new(TripType::SP);
        schema.add_element(labeled("F1", ElementKind::ThinLens { f: 0.05, alpha: 0.0 }));
        schema.add_element(labeled("d1", ElementKind::EmptyRange { l: 0.1 }));
        schema.set_wavelength(1e-6).expect("wavelength");

        let sweep = Variable::new(0, "F", VariableRange::with_points(0.04, 0.06, 3));
        let mut func = BeamVariationFunction::new(sweep.clone(), at_d1(Offset::Si(0.0)));
        let err = func.calculate(&mut schema).expect_err("no pump");
        assert_eq!(err.to_string(), "There is no active pump in the schema");

        schema.add_pump(Pump::new(PumpMode::Waist {
            waist: TS::both(100e-6),
            distance: TS::both(0.0),
            mq: TS::both(1.0),
        }));
        let mut func = BeamVariationFunction::new(sweep, at_d1(Offset::Si(0.0)));
        func.calculate(&mut schema).expect("calculate");

        // a lens bends the front but leaves the radius alone, so the
        // waist shows up unchanged right behind it for any focus
        let seg = func.segment(WorkPlane::T, 0);
        assert_eq!(seg.points_count(), 3);
        for i in 0..3 {
            assert!((seg.y()[i] - 1e-4).abs() < 1e-12);
        }
        let p = func.calculate_at(&mut schema, 0.05).expect("probe");
        assert!((p.s - 1e-4).abs() < 1e-12);
    }

    #[test]
    fn arguments_are_validated_in_order() {
        let mut schema = folded_cavity();

        let mut func = BeamVariationFunction::new(
            Variable::new(2, "", VariableRange::with_points(0.05, 0.051, 2)),
            at_d1(Offset::Si(0.0)),
        );
        let err = func.calculate(&mut schema).expect_err("no param");
        assert_eq!(err.to_string(), "No variable parameter is set");

        let mut func = BeamVariationFunction::new(
            Variable::new(2, "R", VariableRange::with_points(0.05, 0.051, 2)),
            PlotPosition { element: None, offset: Offset::Si(0.0) },
        );
        let err = func.calculate(&mut schema).expect_err("no position");
        assert_eq!(err.to_string(), "No position element is set");
    }
}
