//! Stability map: the stability parameter of the round trip swept over
//! one element parameter, with stability-zone edge detection.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::{check_arg, check_points, FunctionRange, PlotFunction, PlotSegment, ResultSet};
use crate::matrix::{WorkPlane, TS};
use crate::round_trip::{RoundTripCalculator, StabilityMode};
use crate::schema::{ParamBackup, Schema};
use crate::variable::{PlottingRange, Variable};

/// One approximate edge of a stability zone. A non-exact edge means the
/// verdict flipped between `value` and the neighboring sample; an exact
/// edge sits on a range end that cut the zone off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StabilityBound {
    pub value: f64,
    pub exact: bool,
}

/// Sweeps one element parameter and reports the per-plane stability
/// value at every sample. While sweeping it also collects approximate
/// stability-zone edges, which `stability_bounds` can then sharpen.
#[derive(Debug, Clone)]
pub struct StabilityMapFunction {
    arg: Variable,
    mode: StabilityMode,
    results: TS<ResultSet>,
    range: FunctionRange,
    approx_bounds: TS<Vec<(StabilityBound, StabilityBound)>>,
    plot_range: Option<PlottingRange>,
    calc: Option<RoundTripCalculator>,
}

impl StabilityMapFunction {
    pub fn new(arg: Variable) -> Self {
        Self {
            arg,
            mode: StabilityMode::Normal,
            results: TS::new(ResultSet::new(), ResultSet::new()),
            range: FunctionRange::default(),
            approx_bounds: TS::new(Vec::new(), Vec::new()),
            plot_range: None,
            calc: None,
        }
    }

    pub fn arg(&self) -> &Variable {
        &self.arg
    }

    pub fn mode(&self) -> StabilityMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: StabilityMode) {
        self.mode = mode;
    }

    /// Zone edges as seen at sweep resolution.
    pub fn approx_bounds(&self, plane: WorkPlane) -> &[(StabilityBound, StabilityBound)] {
        self.approx_bounds.plane(plane)
    }

    pub fn calculate(&mut self, schema: &mut Schema) -> Result<()> {
        let result = self.calculate_impl(schema);
        if result.is_err() {
            self.clear_results();
        }
        result
    }

    fn calculate_impl(&mut self, schema: &mut Schema) -> Result<()> {
        self.approx_bounds.t.clear();
        self.approx_bounds.s.clear();

        let index = check_arg(&self.arg)?;
        let backup = ParamBackup::take(schema, index, &self.arg.param)?;
        let outcome = self.sweep(schema, index);
        backup.restore(schema)?;
        outcome
    }

    fn sweep(&mut self, schema: &mut Schema, index: usize) -> Result<()> {
        let range = self.arg.range.plotting_range()?;
        self.range.set(range.start(), range.stop());
        self.clear_results();

        let mut calc = RoundTripCalculator::build(schema, Some(index), false)?;
        calc.set_stability_mode(self.mode);

        let mut prev_x: Option<f64> = None;
        let mut zone_start: TS<Option<StabilityBound>> = TS::new(None, None);

        for &x in range.values() {
            schema.set_param_raw(index, &self.arg.param, x)?;
            let m = calc.multiply(schema);
            let p = calc.stability(&m);
            self.results.t.add_point(x, p.t);
            self.results.s.add_point(x, p.s);

            let stable = RoundTripCalculator::is_stable(&m);
            track_zone(
                &mut zone_start.t,
                &mut self.approx_bounds.t,
                stable.t,
                x,
                prev_x,
                range.start(),
            );
            track_zone(
                &mut zone_start.s,
                &mut self.approx_bounds.s,
                stable.s,
                x,
                prev_x,
                range.start(),
            );
            prev_x = Some(x);
        }

        // a zone still open at the end is cut off by the range
        let end = StabilityBound { value: range.stop(), exact: true };
        if let Some(opened) = zone_start.t.take() {
            self.approx_bounds.t.push((opened, end));
        }
        if let Some(opened) = zone_start.s.take() {
            self.approx_bounds.s.push((opened, end));
        }

        self.plot_range = Some(range);
        self.calc = Some(calc);
        check_points(&self.results)
    }

    /// Stability value at one parameter value, non-destructively. Needs
    /// a prior successful `calculate`.
    pub fn calculate_at(&self, schema: &mut Schema, x: f64) -> Result<TS<f64>> {
        let index = check_arg(&self.arg)?;
        let mut calc = match &self.calc {
            Some(calc) => calc.clone(),
            None => bail!("Function is not calculated"),
        };
        calc.set_stability_mode(self.mode);
        let backup = ParamBackup::take(schema, index, &self.arg.param)?;
        schema.set_param_raw(index, &self.arg.param, x)?;
        let p = calc.stability(&calc.multiply(schema));
        backup.restore(schema)?;
        Ok(p)
    }

    /// Sharpens the approximate zone edges by bisecting the squared
    /// stability value down to `1e-7`. Zones with an edge that fails to
    /// converge are dropped.
    pub fn stability_bounds(
        &self,
        schema: &mut Schema,
        plane: WorkPlane,
    ) -> Result<Vec<(f64, f64)>> {
        let index = check_arg(&self.arg)?;
        let calc = match &self.calc {
            Some(calc) => calc.clone(),
            None => bail!("Function is not calculated"),
        };
        let step = match &self.plot_range {
            Some(range) => range.step(),
            None => bail!("Function is not calculated"),
        };

        let backup = ParamBackup::take(schema, index, &self.arg.param)?;
        let outcome = self.refine_zones(schema, index, calc, step, plane);
        backup.restore(schema)?;
        outcome
    }

    fn refine_zones(
        &self,
        schema: &mut Schema,
        index: usize,
        mut calc: RoundTripCalculator,
        step: f64,
        plane: WorkPlane,
    ) -> Result<Vec<(f64, f64)>> {
        calc.set_stability_mode(StabilityMode::Squared);

        let solve = |schema: &mut Schema, mut x1: f64, mut x2: f64| -> Result<Option<f64>> {
            const EPS: f64 = 1e-7;
            const MAX_ITERS: usize = 100;
            schema.set_param_raw(index, &self.arg.param, x1)?;
            let mut p1 = *calc.stability(&calc.multiply(schema)).plane(plane);
            let mut x0 = (x1 + x2) / 2.0;
            let mut iter = 0;
            while p1.abs() > EPS && iter < MAX_ITERS {
                schema.set_param_raw(index, &self.arg.param, x0)?;
                let p0 = *calc.stability(&calc.multiply(schema)).plane(plane);
                if p1 * p0 < 0.0 {
                    x2 = x0;
                } else {
                    x1 = x0;
                    p1 = p0;
                }
                x0 = (x1 + x2) / 2.0;
                iter += 1;
            }
            if iter == MAX_ITERS {
                return Ok(None);
            }
            Ok(Some(x1))
        };

        let mut zones = Vec::new();
        for (start_bound, stop_bound) in self.approx_bounds.plane(plane) {
            let start = if start_bound.exact {
                Some(start_bound.value)
            } else {
                solve(schema, start_bound.value, start_bound.value + step)?
            };
            let stop = if stop_bound.exact {
                Some(stop_bound.value)
            } else {
                solve(schema, stop_bound.value - step, stop_bound.value)?
            };
            if let (Some(start), Some(stop)) = (start, stop) {
                zones.push((start, stop));
            }
        }
        Ok(zones)
    }

    fn clear_results(&mut self) {
        self.results.t.reset();
        self.results.s.reset();
    }
}

fn track_zone(
    zone_start: &mut Option<StabilityBound>,
    zones: &mut Vec<(StabilityBound, StabilityBound)>,
    is_stable: bool,
    x: f64,
    prev_x: Option<f64>,
    range_start: f64,
) {
    let was_stable = zone_start.is_some();
    if !was_stable && is_stable {
        *zone_start = Some(match prev_x {
            Some(prev) => StabilityBound { value: prev, exact: false },
            None => StabilityBound { value: range_start, exact: true },
        });
    } else if was_stable && !is_stable {
        if let Some(opened) = zone_start.take() {
            zones.push((opened, StabilityBound { value: x, exact: false }));
        }
    }
}

impl PlotFunction for StabilityMapFunction {
    fn name(&self) -> &'static str {
        "Stability Map"
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
