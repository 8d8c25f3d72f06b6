use nalgebra::Matrix2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// ABCD ray transfer matrix: `[A B; C D]` acting on `(y, v)` column vectors.
pub type Matrix = Matrix2<f64>;

/// Builds an ABCD matrix from its components in reading order.
pub fn abcd(a: f64, b: f64, c: f64, d: f64) -> Matrix {
    Matrix::new(a, b, c, d)
}

/// Selects one of the two propagation planes of a [`TS`] pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkPlane {
    T,
    S,
}

/// A value carried separately for the tangential (T) and sagittal (S) planes.
/// Most elements are plane-asymmetric under non-normal incidence, so every
/// matrix and every beam figure comes as one of these pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TS<V> {
    pub t: V,
    pub s: V,
}

impl<V> TS<V> {
    pub fn new(t: V, s: V) -> Self {
        Self { t, s }
    }

    pub fn map<U>(&self, f: impl Fn(&V) -> U) -> TS<U> {
        TS {
            t: f(&self.t),
            s: f(&self.s),
        }
    }

    pub fn plane(&self, plane: WorkPlane) -> &V {
        match plane {
            WorkPlane::T => &self.t,
            WorkPlane::S => &self.s,
        }
    }
}

impl<V: Clone> TS<V> {
    /// Builds a pair with the same value in both planes.
    pub fn both(value: V) -> Self {
        Self {
            t: value.clone(),
            s: value,
        }
    }
}

impl TS<Matrix> {
    pub fn unity() -> Self {
        Self::both(Matrix::identity())
    }
}

/// Applies an ABCD matrix to the complex beam parameter:
/// `q' = (A q + B) / (C q + D)`.
pub fn propagate_q(m: &Matrix, q: Complex64) -> Complex64 {
    (q * m[(0, 0)] + m[(0, 1)]) / (q * m[(1, 0)] + m[(1, 1)])
}

/// Geometric ray: offset from the optical axis and slope angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub y: f64,
    pub v: f64,
}

impl Ray {
    pub fn new(y: f64, v: f64) -> Self {
        Self { y, v }
    }

    pub fn propagate(&self, m: &Matrix) -> Ray {
        Ray {
            y: m[(0, 0)] * self.y + m[(0, 1)] * self.v,
            v: m[(1, 0)] * self.y + m[(1, 1)] * self.v,
        }
    }
}
