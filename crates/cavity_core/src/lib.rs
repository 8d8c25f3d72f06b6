//! `cavity_core` is the optical engine behind the Cavity resonator designer.
//! A resonator is an ordered sequence of ABCD elements; the engine computes
//! round-trip matrices, cavity stability and Gaussian-beam caustics while
//! element parameters are swept over numeric ranges.
//!
//! Key components:
//! - **Elements**: per-element transfer matrices in the tangential and
//!   sagittal planes (`element`, `registry`).
//! - **Schema**: the element sequence plus trip type, wavelength, pumps and
//!   the interface index links (`schema`).
//! - **Round trip**: topology-dependent traversal and matrix product with
//!   the stability evaluator (`round_trip`).
//! - **Functions**: the parameter-sweep engine and the concrete plot
//!   functions built on it (`functions`).

pub mod beam;
pub mod element;
pub mod equation_engine;
pub mod functions;
pub mod matrix;
pub mod pump;
pub mod registry;
pub mod round_trip;
pub mod schema;
pub mod variable;
