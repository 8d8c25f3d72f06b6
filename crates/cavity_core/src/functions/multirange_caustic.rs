//! Multirange caustic: per-range caustics stitched into one plot over
//! the cumulative axis, and the per-pump multibeam variant.

use anyhow::{bail, Result};

use super::caustic::{CausticFunction, CausticMode};
use super::{FunctionRange, PlotFunction, PlotSegment};
use crate::element::Element;
use crate::matrix::{WorkPlane, TS};
use crate::pump::Pump;
use crate::schema::{Schema, TripType};
use crate::variable::Variable;

/// Caustics of several range elements plotted end to end. Each variable
/// names one range; disabled ranges are skipped, and positions along
/// the plot axis accumulate the axis lengths of the active ranges in
/// order.
#[derive(Debug, Clone)]
pub struct MultirangeCausticFunction {
    funcs: Vec<CausticFunction>,
    active: Vec<usize>,
    range: FunctionRange,
}

impl MultirangeCausticFunction {
    pub fn new(args: Vec<Variable>) -> Self {
        Self {
            funcs: args.into_iter().map(CausticFunction::new).collect(),
            active: Vec::new(),
            range: FunctionRange::default(),
        }
    }

    pub fn funcs(&self) -> &[CausticFunction] {
        &self.funcs
    }

    pub fn mode(&self) -> CausticMode {
        self.funcs.first().map_or(CausticMode::BeamRadius, |f| f.mode())
    }

    pub fn set_mode(&mut self, mode: CausticMode) {
        for func in &mut self.funcs {
            func.set_mode(mode);
        }
    }

    /// Overrides the pump of every sub-function; only matters on
    /// single-pass schemas.
    pub fn set_pump(&mut self, pump: Option<Pump>) {
        for func in &mut self.funcs {
            func.set_pump(pump.clone());
        }
    }

    pub fn calculate(&mut self, schema: &mut Schema) -> Result<()> {
        self.active.clear();
        self.range.reset();

        let mut disabled = 0;
        for i in 0..self.funcs.len() {
            if self.is_disabled(schema, i) {
                disabled += 1;
                continue;
            }
            if let Err(err) = self.funcs[i].calculate(schema) {
                for func in &mut self.funcs {
                    func.clear_results();
                }
                self.active.clear();
                return Err(err);
            }
            self.active.push(i);
        }
        if disabled == self.funcs.len() {
            bail!("All elements are disabled");
        }

        let total: f64 = self
            .active
            .iter()
            .map(|&i| self.axis_length_of(schema, i))
            .sum();
        self.range.set(0.0, total);
        Ok(())
    }

    /// Beam figure at a position along the stitched axis. A position is
    /// resolved against the active range it falls into; positions past
    /// the last range give NaN.
    pub fn calculate_at(&self, schema: &mut Schema, x: f64) -> Result<TS<f64>> {
        let mut remaining = x;
        for &i in &self.active {
            let length = self.axis_length_of(schema, i);
            if remaining - length <= 0.0 {
                return self.funcs[i].calculate_at(schema, remaining);
            }
            remaining -= length;
        }
        Ok(TS::new(f64::NAN, f64::NAN))
    }

    /// Running end positions of the active ranges along the stitched
    /// axis, for axis annotation.
    pub fn boundaries(&self, schema: &Schema) -> Vec<f64> {
        let mut sums = Vec::with_capacity(self.active.len());
        let mut total = 0.0;
        for &i in &self.active {
            total += self.axis_length_of(schema, i);
            sums.push(total);
        }
        sums
    }

    fn is_disabled(&self, schema: &Schema, i: usize) -> bool {
        self.funcs[i]
            .arg()
            .element
            .and_then(|index| schema.element(index))
            .is_some_and(|elem| elem.disabled)
    }

    fn axis_length_of(&self, schema: &Schema, i: usize) -> f64 {
        self.funcs[i]
            .arg()
            .element
            .and_then(|index| schema.element(index))
            .and_then(Element::as_range)
            .map_or(0.0, |cap| cap.axis_length)
    }
}

impl PlotFunction for MultirangeCausticFunction {
    fn name(&self) -> &'static str {
        "MR-Caustic"
    }

    fn segment_count(&self, plane: WorkPlane) -> usize {
        self.active
            .iter()
            .map(|&i| self.funcs[i].segment_count(plane))
            .sum()
    }

    fn segment(&self, plane: WorkPlane, index: usize) -> &PlotSegment {
        let mut base = 0;
        for &i in &self.active {
            let count = self.funcs[i].segment_count(plane);
            if index < base + count {
                return self.funcs[i].segment(plane, index - base);
            }
            base += count;
        }
        panic!("segment index {index} is out of range");
    }

    fn range(&self) -> &FunctionRange {
        &self.range
    }
}

/// Beam-radius curves of one pump, tagged with the pump label.
#[derive(Debug, Clone, PartialEq)]
pub struct PumpCaustic {
    label: String,
    segments: TS<Vec<PlotSegment>>,
}

impl PumpCaustic {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn segment_count(&self, plane: WorkPlane) -> usize {
        self.segments.plane(plane).len()
    }

    /// Panics when `index` is out of range.
    pub fn segment(&self, plane: WorkPlane, index: usize) -> &PlotSegment {
        &self.segments.plane(plane)[index]
    }
}

/// Beam-radius caustic of every pump of a single-pass schema, one
/// tagged curve set per pump. Pumps that fail to propagate are skipped.
#[derive(Debug, Clone)]
pub struct MultibeamCausticFunction {
    inner: MultirangeCausticFunction,
    beams: Vec<PumpCaustic>,
}

impl MultibeamCausticFunction {
    pub fn new(args: Vec<Variable>) -> Self {
        Self {
            inner: MultirangeCausticFunction::new(args),
            beams: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        "MB-Caustic"
    }

    pub fn beams(&self) -> &[PumpCaustic] {
        &self.beams
    }

    pub fn range(&self) -> &FunctionRange {
        self.inner.range()
    }

    pub fn calculate(&mut self, schema: &mut Schema) -> Result<()> {
        self.beams.clear();
        if schema.trip_type() != TripType::SP {
            bail!("This function can only operate on single-pass schemas");
        }
        self.inner.set_mode(CausticMode::BeamRadius);

        let pumps = schema.pumps().to_vec();
        for pump in pumps {
            self.inner.set_pump(Some(pump.clone()));
            if self.inner.calculate(schema).is_err() {
                continue;
            }
            let t = gather(&self.inner, WorkPlane::T);
            let s = gather(&self.inner, WorkPlane::S);
            self.beams.push(PumpCaustic {
                label: pump.display_label().to_string(),
                segments: TS::new(t, s),
            });
        }
        if self.beams.is_empty() {
            bail!("No points were calculated");
        }
        Ok(())
    }
}

fn gather(func: &MultirangeCausticFunction, plane: WorkPlane) -> Vec<PlotSegment> {
    (0..func.segment_count(plane))
        .map(|i| func.segment(plane, i).clone())
        .collect()
}
