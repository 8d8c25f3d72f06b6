//! 2D stability map: the stability parameter swept over two element
//! parameters at once, stored as a per-plane grid.

use anyhow::{bail, Result};

use super::check_arg;
use crate::matrix::{WorkPlane, TS};
use crate::round_trip::{RoundTripCalculator, StabilityMode};
use crate::schema::{ParamBackup, Schema};
use crate::variable::{PlottingRange, Variable};

/// Sweeps two element parameters and stores the stability value of
/// every combination. The grid is row-major with the X axis outermost:
/// the value at `(ix, iy)` sits at `ix * ny + iy`.
#[derive(Debug, Clone)]
pub struct StabilityMap2DFunction {
    arg_x: Variable,
    arg_y: Variable,
    mode: StabilityMode,
    results: TS<Vec<f64>>,
    range_x: Option<PlottingRange>,
    range_y: Option<PlottingRange>,
    calc: Option<RoundTripCalculator>,
}

impl StabilityMap2DFunction {
    pub fn new(arg_x: Variable, arg_y: Variable) -> Self {
        Self {
            arg_x,
            arg_y,
            mode: StabilityMode::Normal,
            results: TS::new(Vec::new(), Vec::new()),
            range_x: None,
            range_y: None,
            calc: None,
        }
    }

    pub fn name(&self) -> &'static str {
        "2D Stability Map"
    }

    pub fn arg_x(&self) -> &Variable {
        &self.arg_x
    }

    pub fn arg_y(&self) -> &Variable {
        &self.arg_y
    }

    pub fn mode(&self) -> StabilityMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: StabilityMode) {
        self.mode = mode;
    }

    pub fn axis_x(&self) -> Option<&PlottingRange> {
        self.range_x.as_ref()
    }

    pub fn axis_y(&self) -> Option<&PlottingRange> {
        self.range_y.as_ref()
    }

    pub fn values(&self, plane: WorkPlane) -> &[f64] {
        self.results.plane(plane)
    }

    pub fn point_count(&self) -> usize {
        self.results.t.len()
    }

    /// Grid value at `(ix, iy)`. Panics when the indexes fall outside
    /// the calculated grid.
    pub fn value_at(&self, plane: WorkPlane, ix: usize, iy: usize) -> f64 {
        let ny = self.range_y.as_ref().map_or(0, |r| r.points());
        self.values(plane)[ix * ny + iy]
    }

    pub fn calculate(&mut self, schema: &mut Schema) -> Result<()> {
        let result = self.calculate_impl(schema);
        if result.is_err() {
            self.results.t.clear();
            self.results.s.clear();
        }
        result
    }

    fn calculate_impl(&mut self, schema: &mut Schema) -> Result<()> {
        let index_x = check_arg(&self.arg_x)?;
        let index_y = check_arg(&self.arg_y)?;
        let backup_x = ParamBackup::take(schema, index_x, &self.arg_x.param)?;
        let backup_y = ParamBackup::take(schema, index_y, &self.arg_y.param)?;
        let outcome = self.sweep(schema, index_x, index_y);
        backup_y.restore(schema)?;
        backup_x.restore(schema)?;
        outcome
    }

    fn sweep(&mut self, schema: &mut Schema, index_x: usize, index_y: usize) -> Result<()> {
        let range_x = self.arg_x.range.plotting_range()?;
        let range_y = self.arg_y.range.plotting_range()?;

        let mut calc = RoundTripCalculator::build(schema, Some(index_x), false)?;
        calc.set_stability_mode(self.mode);

        let count = range_x.points() * range_y.points();
        self.results.t.clear();
        self.results.s.clear();
        self.results.t.reserve(count);
        self.results.s.reserve(count);

        for &x in range_x.values() {
            schema.set_param_raw(index_x, &self.arg_x.param, x)?;
            for &y in range_y.values() {
                schema.set_param_raw(index_y, &self.arg_y.param, y)?;
                let p = calc.stability(&calc.multiply(schema));
                self.results.t.push(p.t);
                self.results.s.push(p.s);
            }
        }

        self.range_x = Some(range_x);
        self.range_y = Some(range_y);
        self.calc = Some(calc);
        Ok(())
    }

    /// Stability value at one parameter combination, non-destructively.
    /// Needs a prior successful `calculate`.
    pub fn calculate_at(&self, schema: &mut Schema, x: f64, y: f64) -> Result<TS<f64>> {
        let index_x = check_arg(&self.arg_x)?;
        let index_y = check_arg(&self.arg_y)?;
        let calc = match &self.calc {
            Some(calc) => calc,
            None => bail!("Function is not calculated"),
        };
        let backup_x = ParamBackup::take(schema, index_x, &self.arg_x.param)?;
        let backup_y = ParamBackup::take(schema, index_y, &self.arg_y.param)?;
        schema.set_param_raw(index_x, &self.arg_x.param, x)?;
        schema.set_param_raw(index_y, &self.arg_y.param, y)?;
        let p = calc.stability(&calc.multiply(schema));
        backup_y.restore(schema)?;
        backup_x.restore(schema)?;
        Ok(p)
    }
}
