//! Caustic: beam radius, wavefront curvature or divergence along one
//! range element of the schema.

use std::f64::consts::PI;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use super::{
    check_arg_elem, check_points, set_sub_range, FunctionRange, PlotFunction, PlotSegment,
    ResultSet,
};
use crate::beam::{AbcdBeamCalculator, PumpCalculator};
use crate::element::Element;
use crate::matrix::{Matrix, WorkPlane, TS};
use crate::pump::Pump;
use crate::round_trip::RoundTripCalculator;
use crate::schema::Schema;
use crate::variable::Variable;

/// What the caustic reports at each position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CausticMode {
    /// Beam radius `w`.
    BeamRadius,
    /// Wavefront curvature radius `R`.
    FrontRadius,
    /// Divergence half angle `V`.
    HalfAngle,
}

impl CausticMode {
    pub fn alias(&self) -> &'static str {
        match self {
            CausticMode::BeamRadius => "W",
            CausticMode::FrontRadius => "R",
            CausticMode::HalfAngle => "V",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CausticMode::BeamRadius => "Beam radius",
            CausticMode::FrontRadius => "Wavefront curvature radius",
            CausticMode::HalfAngle => "Half of divergence angle",
        }
    }
}

/// Waist located inside the swept range, with the far-field figures of
/// the embedded Gaussian estimated at that point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CausticWaist {
    /// Offset from the range entry face, meters.
    pub position: f64,
    pub radius: f64,
    /// Rayleigh distance.
    pub rayleigh: f64,
    /// Far-field divergence half angle.
    pub divergence: f64,
}

/// Beam caustic along one range element.
///
/// The variable names the range; the sweep walks the split point from
/// the entry face to the exit face and stores the selected beam figure
/// for both work planes. Resonator schemas take the self-consistent
/// mode of the split round trip, single-pass schemas propagate a pump
/// beam through the accumulated matrix.
#[derive(Debug, Clone)]
pub struct CausticFunction {
    arg: Variable,
    mode: CausticMode,
    pump: Option<Pump>,
    results: TS<ResultSet>,
    range: FunctionRange,
    ior: f64,
    calc: Option<RoundTripCalculator>,
    beam_calc: Option<AbcdBeamCalculator>,
    pump_calc: Option<TS<PumpCalculator>>,
}

impl CausticFunction {
    pub fn new(arg: Variable) -> Self {
        Self {
            arg,
            mode: CausticMode::BeamRadius,
            pump: None,
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

    pub fn mode(&self) -> CausticMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: CausticMode) {
        self.mode = mode;
    }

    /// Overrides the pump used on single-pass schemas; `None` falls
    /// back to the schema's active pump.
    pub fn set_pump(&mut self, pump: Option<Pump>) {
        self.pump = pump;
    }

    pub fn calculate(&mut self, schema: &mut Schema) -> Result<()> {
        let result = self.calculate_impl(schema);
        if result.is_err() {
            self.clear_results();
        }
        result
    }

    fn calculate_impl(&mut self, schema: &mut Schema) -> Result<()> {
        let index = check_arg_elem(&self.arg)?;
        let cap = schema
            .element(index)
            .and_then(Element::as_range)
            .ok_or_else(|| anyhow!("Variable element is not a range"))?;
        self.ior = cap.ior;

        // The given range only contributes the start; the sweep always
        // runs out to the exit face.
        let mut given = self.arg.range;
        given.stop = cap.axis_length;
        let range = given.plotting_range()?;
        self.range.set(range.start(), range.stop());
        self.clear_results();

        let calc = RoundTripCalculator::build(schema, Some(index), true)?;
        let wavelength = schema.wavelength();
        let is_resonator = schema.trip_type().is_resonator();
        if is_resonator {
            self.beam_calc = Some(AbcdBeamCalculator::new(wavelength));
            self.pump_calc = None;
        } else {
            let mode = match &self.pump {
                Some(pump) => pump.mode,
                None => match schema.active_pump() {
                    Some(pump) => pump.mode,
                    None => bail!("There is no active pump in the schema"),
                },
            };
            self.pump_calc = Some(TS::new(
                PumpCalculator::t(&mode, wavelength),
                PumpCalculator::s(&mode, wavelength),
            ));
            self.beam_calc = None;
        }

        set_sub_range(schema, index, range.values()[0]);
        let m = calc.multiply(schema);
        if is_resonator {
            let stable = RoundTripCalculator::is_stable(&m);
            if !stable.t && !stable.s {
                bail!("System is unstable, can't calculate caustic");
            }
        }

        let mut prev = TS::new(f64::NAN, f64::NAN);
        for &x in range.values() {
            set_sub_range(schema, index, x);
            let m = calc.multiply(schema);
            let res = self.beam_point(&m, wavelength);

            if self.mode == CausticMode::FrontRadius {
                // A sign change between finite samples is the pole at
                // the waist: end the segment there instead of letting
                // the plot draw a false vertical.
                if !prev.t.is_nan() && prev.t * res.t < 0.0 {
                    self.results.t.add_point(x, f64::NAN);
                }
                if !prev.s.is_nan() && prev.s * res.s < 0.0 {
                    self.results.s.add_point(x, f64::NAN);
                }
                prev = res;
            }

            self.results.t.add_point(x, res.t);
            self.results.s.add_point(x, res.s);
        }

        self.calc = Some(calc);
        check_points(&self.results)
    }

    /// Beam figure at one position inside the range, `x` clamped into
    /// `[0, axis_length]`. Needs a prior successful `calculate`.
    pub fn calculate_at(&self, schema: &mut Schema, x: f64) -> Result<TS<f64>> {
        let index = check_arg_elem(&self.arg)?;
        let calc = match &self.calc {
            Some(calc) => calc,
            None => bail!("Function is not calculated"),
        };
        let cap = schema
            .element(index)
            .and_then(Element::as_range)
            .ok_or_else(|| anyhow!("Variable element is not a range"))?;
        set_sub_range(schema, index, x.clamp(0.0, cap.axis_length));
        let m = calc.multiply(schema);
        Ok(self.beam_point(&m, schema.wavelength()))
    }

    /// Locates the waist inside the range by bisecting the sign change
    /// of the wavefront curvature. `None` in a plane where the front
    /// never flattens, and for purely geometric pumps.
    pub fn find_waist(&self, schema: &mut Schema) -> Result<TS<Option<CausticWaist>>> {
        let index = check_arg_elem(&self.arg)?;
        let calc = match &self.calc {
            Some(calc) => calc,
            None => bail!("Function is not calculated"),
        };
        let cap = schema
            .element(index)
            .and_then(Element::as_range)
            .ok_or_else(|| anyhow!("Variable element is not a range"))?;

        let is_gauss = self.beam_calc.is_some()
            || self.pump_calc.as_ref().is_some_and(|pc| pc.t.is_gauss());
        if !is_gauss {
            return Ok(TS::new(None, None));
        }

        let wavelength = schema.wavelength();
        let start_x = self.arg.range.start;
        let stop_x = cap.axis_length;

        set_sub_range(schema, index, start_x);
        let m_start = calc.multiply(schema);
        set_sub_range(schema, index, stop_x);
        let m_stop = calc.multiply(schema);

        const EPS_X: f64 = 1e-7;
        const INF_R: f64 = 1.0 / EPS_X;
        const MAX_ITERS: usize = 1000;

        let solve = |schema: &mut Schema, plane: WorkPlane| -> Option<CausticWaist> {
            let start_r = self.front_radius_of(&m_start, plane, wavelength);
            let stop_r = self.front_radius_of(&m_stop, plane, wavelength);

            let (x, w) = if start_r.abs() >= INF_R {
                // Flat front right at an end: the waist sits there.
                (start_x, self.beam_radius_of(&m_start, plane, wavelength))
            } else if stop_r.abs() >= INF_R {
                (stop_x, self.beam_radius_of(&m_stop, plane, wavelength))
            } else if start_r * stop_r < 0.0 {
                let (mut x1, mut x2) = (start_x, stop_x);
                let mut x0 = (x1 + x2) / 2.0;
                let mut r1 = start_r;
                let mut m = m_stop;
                let mut count = 0;
                while (x2 - x1).abs() > EPS_X && count < MAX_ITERS {
                    set_sub_range(schema, index, x0);
                    m = calc.multiply(schema);
                    let r0 = self.front_radius_of(&m, plane, wavelength);
                    if r1 * r0 < 0.0 {
                        x2 = x0;
                    } else {
                        x1 = x0;
                        r1 = r0;
                    }
                    x0 = (x1 + x2) / 2.0;
                    count += 1;
                }
                if count == MAX_ITERS {
                    return None;
                }
                (x0, self.beam_radius_of(&m, plane, wavelength))
            } else {
                return None;
            };

            if w.is_nan() || w <= 0.0 {
                return None;
            }
            let mi = match &self.pump_calc {
                Some(pc) => pc.plane(plane).mq(),
                None => 1.0,
            };
            let lambda = wavelength / self.ior;
            Some(CausticWaist {
                position: x,
                radius: w,
                rayleigh: PI * w * w / (mi * lambda),
                divergence: mi * lambda / (PI * w),
            })
        };

        let t = solve(schema, WorkPlane::T);
        let s = solve(schema, WorkPlane::S);
        Ok(TS::new(t, s))
    }

    fn beam_point(&self, m: &TS<Matrix>, wavelength: f64) -> TS<f64> {
        if let Some(beam_calc) = &self.beam_calc {
            match self.mode {
                CausticMode::BeamRadius => TS::new(
                    beam_calc.beam_radius(&m.t, self.ior),
                    beam_calc.beam_radius(&m.s, self.ior),
                ),
                CausticMode::FrontRadius => {
                    TS::new(beam_calc.front_radius(&m.t), beam_calc.front_radius(&m.s))
                }
                CausticMode::HalfAngle => TS::new(
                    beam_calc.half_angle(&m.t, self.ior),
                    beam_calc.half_angle(&m.s, self.ior),
                ),
            }
        } else if let Some(pump_calc) = &self.pump_calc {
            let lambda = wavelength / self.ior;
            let beam = TS::new(
                pump_calc.t.calc(&m.t, lambda),
                pump_calc.s.calc(&m.s, lambda),
            );
            match self.mode {
                CausticMode::BeamRadius => beam.map(|b| b.beam_radius),
                CausticMode::FrontRadius => beam.map(|b| b.front_radius),
                CausticMode::HalfAngle => beam.map(|b| b.half_angle),
            }
        } else {
            TS::new(f64::NAN, f64::NAN)
        }
    }

    fn beam_radius_of(&self, m: &TS<Matrix>, plane: WorkPlane, wavelength: f64) -> f64 {
        if let Some(beam_calc) = &self.beam_calc {
            beam_calc.beam_radius(m.plane(plane), self.ior)
        } else if let Some(pump_calc) = &self.pump_calc {
            pump_calc
                .plane(plane)
                .calc(m.plane(plane), wavelength / self.ior)
                .beam_radius
        } else {
            f64::NAN
        }
    }

    fn front_radius_of(&self, m: &TS<Matrix>, plane: WorkPlane, wavelength: f64) -> f64 {
        if let Some(beam_calc) = &self.beam_calc {
            beam_calc.front_radius(m.plane(plane))
        } else if let Some(pump_calc) = &self.pump_calc {
            pump_calc
                .plane(plane)
                .calc(m.plane(plane), wavelength / self.ior)
                .front_radius
        } else {
            f64::NAN
        }
    }

    pub(crate) fn clear_results(&mut self) {
        self.results.t.reset();
        self.results.s.reset();
    }
}

impl PlotFunction for CausticFunction {
    fn name(&self) -> &'static str {
        "Caustic"
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
