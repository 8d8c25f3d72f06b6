//! Plot functions: parameter sweeps over a schema that produce per-plane
//! segmented curves, plus single-point probes via `calculate_at`.

pub mod beam_variation;
pub mod caustic;
pub mod multirange_caustic;
pub mod stability_map;
pub mod stability_map_2d;

pub use beam_variation::BeamVariationFunction;
pub use caustic::{CausticFunction, CausticMode, CausticWaist};
pub use multirange_caustic::{MultibeamCausticFunction, MultirangeCausticFunction, PumpCaustic};
pub use stability_map::{StabilityBound, StabilityMapFunction};
pub use stability_map_2d::StabilityMap2DFunction;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::matrix::{WorkPlane, TS};
use crate::schema::Schema;
use crate::variable::Variable;

/// Common read surface of the sweep functions, for outer layers that
/// plot any of them without knowing which one.
pub trait PlotFunction {
    fn name(&self) -> &'static str;

    /// Number of contiguous curve segments in the given plane.
    fn segment_count(&self, plane: WorkPlane) -> usize;

    /// A calculated segment. Panics when `index` is out of range.
    fn segment(&self, plane: WorkPlane, index: usize) -> &PlotSegment;

    /// X extent of the last calculation.
    fn range(&self) -> &FunctionRange;
}

/// Value extent accumulated over a calculation, used by outer layers to
/// scale plot axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FunctionRange {
    min: f64,
    max: f64,
    empty: bool,
}

impl Default for FunctionRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 0.0,
            empty: true,
        }
    }
}

impl FunctionRange {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn set(&mut self, v1: f64, v2: f64) {
        self.empty = false;
        self.min = v1;
        self.max = v2;
    }

    /// Widens the extent to include `v`.
    pub fn fit(&mut self, v: f64) {
        if self.empty {
            self.min = v;
            self.max = v;
            self.empty = false;
        } else if v < self.min {
            self.min = v;
        } else if v > self.max {
            self.max = v;
        }
    }

    pub fn has(&self, v: f64) -> bool {
        !self.empty && v >= self.min && v <= self.max
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// One contiguous run of samples: parallel `x`/`y` vectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotSegment {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl PlotSegment {
    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn points_count(&self) -> usize {
        self.x.len()
    }

    fn clear(&mut self) {
        self.x.clear();
        self.y.clear();
    }

    fn append(&mut self, x: f64, y: f64) {
        self.x.push(x);
        self.y.push(y);
    }
}

/// Segmented sample store for one work plane. A non-finite `y` ends the
/// current segment so that plots with poles (e.g. wavefront curvature
/// crossing a waist) break into separate lines instead of drawing a
/// false vertical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    segments: Vec<PlotSegment>,
    index: usize,
    segment_ended: bool,
    make_new_segment: bool,
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSet {
    pub fn new() -> Self {
        Self {
            segments: vec![PlotSegment::default()],
            index: 0,
            segment_ended: false,
            make_new_segment: false,
        }
    }

    /// Drops all samples, leaving exactly one empty segment.
    pub fn reset(&mut self) {
        self.index = 0;
        self.segments.truncate(1);
        self.segments[0].clear();
        self.segment_ended = false;
        self.make_new_segment = false;
    }

    /// Stores a sample. Non-finite `y` values are never stored: they end
    /// the current segment, and a 1-point segment is discarded in place
    /// so its slot is reused by the next run of finite samples.
    pub fn add_point(&mut self, x: f64, y: f64) {
        if !y.is_finite() {
            let segment_len = self.segments[self.index].points_count();
            if !self.segment_ended && segment_len > 0 {
                self.segment_ended = true;
                if segment_len < 2 {
                    self.segments[self.index].clear();
                    self.make_new_segment = false;
                } else {
                    self.make_new_segment = true;
                }
            }
        } else {
            if self.segment_ended {
                self.segment_ended = false;
                if self.make_new_segment {
                    self.segments.push(PlotSegment::default());
                    self.index += 1;
                }
            }
            self.segments[self.index].append(x, y);
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Panics when `index` is out of range.
    pub fn segment(&self, index: usize) -> &PlotSegment {
        &self.segments[index]
    }

    pub fn segments(&self) -> &[PlotSegment] {
        &self.segments
    }

    pub fn total_points(&self) -> usize {
        self.segments.iter().map(PlotSegment::points_count).sum()
    }
}

/// Resolves the element index of a sweep argument. Position sweeps only
/// need this; parameter sweeps go through [`check_arg`].
pub(crate) fn check_arg_elem(arg: &Variable) -> Result<usize> {
    match arg.element {
        Some(index) => Ok(index),
        None => bail!("No variable element is set"),
    }
}

/// Validates a sweep argument and resolves its element index.
pub(crate) fn check_arg(arg: &Variable) -> Result<usize> {
    let index = check_arg_elem(arg)?;
    if arg.param.is_empty() {
        bail!("No variable parameter is set");
    }
    Ok(index)
}

/// Post-sweep check shared by the plotting functions.
pub(crate) fn check_points(results: &TS<ResultSet>) -> Result<()> {
    if results.t.total_points() == 0 && results.s.total_points() == 0 {
        bail!("No one valid point was calculated");
    }
    Ok(())
}

/// Moves the split point of a range element. No-op for other kinds.
pub(crate) fn set_sub_range(schema: &mut Schema, index: usize, x: f64) {
    if let Some(elem) = schema.element_mut(index) {
        elem.set_sub_range_si(x);
    }
}
