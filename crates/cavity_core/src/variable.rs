//! Sweep arguments for the plot functions: which element parameter is
//! varied, over which range, and where on the schema a function
//! observes the beam.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Raw variation settings. Either the points count or the step value
/// drives the sampling, depending on `use_step`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VariableRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
    pub points: usize,
    pub use_step: bool,
}

impl VariableRange {
    pub fn with_points(start: f64, stop: f64, points: usize) -> Self {
        Self {
            start,
            stop,
            step: 0.0,
            points,
            use_step: false,
        }
    }

    pub fn with_step(start: f64, stop: f64, step: f64) -> Self {
        Self {
            start,
            stop,
            step,
            points: 100,
            use_step: true,
        }
    }

    /// Resolves the settings into ascending sample values.
    ///
    /// Points-driven ranges produce exactly `points` samples with the
    /// last one clamped to `stop` against accumulation drift.
    /// Step-driven ranges walk `start, start+step, ...` while below
    /// `stop` and then append `stop` itself, so 0..10 by 3 samples at
    /// 0, 3, 6, 9, 10; a step wider than the whole span degenerates to
    /// the two endpoints.
    pub fn plotting_range(&self) -> Result<PlottingRange> {
        let span = self.stop - self.start;
        if span <= 0.0 {
            bail!("Too few points for plotting");
        }
        let (step, values) = if self.use_step {
            if self.step <= 0.0 {
                bail!("Too few points for plotting");
            }
            let step = self.step.min(span);
            let mut values = Vec::new();
            let mut x = self.start;
            while x < self.stop - step * 1e-6 {
                values.push(x);
                x += step;
            }
            values.push(self.stop);
            (step, values)
        } else {
            if self.points < 2 {
                bail!("Too few points for plotting");
            }
            let step = span / (self.points - 1) as f64;
            let mut values: Vec<f64> = (0..self.points)
                .map(|i| self.start + step * i as f64)
                .collect();
            values[self.points - 1] = self.stop;
            (step, values)
        };
        Ok(PlottingRange {
            start: self.start,
            stop: self.stop,
            step,
            values,
        })
    }
}

/// Resolved plotting range: SI sample values ready to sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlottingRange {
    start: f64,
    stop: f64,
    step: f64,
    values: Vec<f64>,
}

impl PlottingRange {
    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn points(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Argument of the plot functions: the swept element parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// Index of the element whose parameter is varied.
    pub element: Option<usize>,
    /// Name of the varied parameter.
    pub param: String,
    pub range: VariableRange,
}

impl Variable {
    pub fn new(element: usize, param: &str, range: VariableRange) -> Self {
        Self {
            element: Some(element),
            param: param.to_string(),
            range,
        }
    }
}

/// Offset of an observation point inside a range element.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Offset {
    /// Meters from the entry face; negative values count back from the
    /// exit face.
    Si(f64),
    /// Percentage of the axis length.
    Percent(f64),
}

impl Offset {
    pub fn to_si(self, axis_length: f64) -> f64 {
        match self {
            Offset::Si(value) if value < 0.0 => value + axis_length,
            Offset::Si(value) => value,
            Offset::Percent(percent) => axis_length * percent / 100.0,
        }
    }
}

/// Where a function observes the beam while another parameter sweeps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlotPosition {
    pub element: Option<usize>,
    pub offset: Offset,
}
