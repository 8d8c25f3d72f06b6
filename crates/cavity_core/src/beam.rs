//! Beam size calculators. Resonators get the self-consistent Gaussian
//! mode derived from the round-trip matrix; single-pass schemas get an
//! input pump propagated through the element chain.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::matrix::{propagate_q, Matrix, Ray, TS};
use crate::pump::PumpMode;

/// Beam figures at one point of a schema: radius and wavefront
/// curvature radius in meters, divergence half angle in radians.
#[derive(Debug, Clone, Copy)]
pub struct BeamResult {
    pub beam_radius: f64,
    pub front_radius: f64,
    pub half_angle: f64,
}

/// Derives the self-consistent Gaussian mode of a resonator from a
/// round-trip ABCD matrix. Where the matrix is unstable the mode does
/// not exist and the figures come out NaN.
#[derive(Debug, Clone, Copy)]
pub struct AbcdBeamCalculator {
    wavelength: f64,
}

impl AbcdBeamCalculator {
    pub fn new(wavelength: f64) -> Self {
        Self { wavelength }
    }

    /// Mode radius at the point the round trip is referenced to.
    /// `ior` is the refractive index of the medium at that point.
    pub fn beam_radius(&self, m: &Matrix, ior: f64) -> f64 {
        let (a, b, d) = (m[(0, 0)], m[(0, 1)], m[(1, 1)]);
        let w2 = 1.0 - ((a + d) / 2.0).powi(2);
        if w2 <= 0.0 {
            return f64::NAN;
        }
        (self.wavelength / ior.abs() * b.abs() / PI / w2.sqrt()).sqrt()
    }

    /// Wavefront curvature radius of the mode. A flat front reads as
    /// infinity with the sign taken from B.
    pub fn front_radius(&self, m: &Matrix) -> f64 {
        let (a, b, d) = (m[(0, 0)], m[(0, 1)], m[(1, 1)]);
        if d != a {
            2.0 * b / (d - a)
        } else if b < 0.0 {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        }
    }

    /// Far-field divergence half angle of the mode.
    pub fn half_angle(&self, m: &Matrix, ior: f64) -> f64 {
        let (a, c, d) = (m[(0, 0)], m[(1, 0)], m[(1, 1)]);
        let s = 4.0 - (a + d).powi(2);
        if s <= 0.0 {
            return f64::NAN;
        }
        (self.wavelength / ior.abs() * 2.0 * c.abs() / PI / s.sqrt()).sqrt()
    }
}

#[derive(Debug, Clone, Copy)]
enum PumpInput {
    Gauss { q: Complex64, mq: f64 },
    Geometric(Ray),
}

/// Propagates one pump beam through a schema, one plane per calculator.
/// Gaussian pumps ride the complex beam parameter, geometric pumps the
/// plain ray vector.
#[derive(Debug, Clone, Copy)]
pub struct PumpCalculator {
    input: PumpInput,
}

impl PumpCalculator {
    /// Calculator for the tangential plane.
    pub fn t(pump: &PumpMode, wavelength: f64) -> Self {
        Self::init(pump, wavelength, |v| v.t)
    }

    /// Calculator for the sagittal plane.
    pub fn s(pump: &PumpMode, wavelength: f64) -> Self {
        Self::init(pump, wavelength, |v| v.s)
    }

    fn init(pump: &PumpMode, wavelength: f64, sel: impl Fn(TS<f64>) -> f64) -> Self {
        let input = match *pump {
            PumpMode::Waist { waist, distance, mq } => {
                let mq = sel(mq).abs();
                let w0 = sel(waist);
                let z = sel(distance);
                let w0_equiv_2 = w0 * w0 / mq;
                let z0_equiv = PI * w0_equiv_2 / wavelength;
                let w_equiv_2 = w0_equiv_2 * (1.0 + (z / z0_equiv).powi(2));
                let q_inv = if z == 0.0 {
                    Complex64::new(0.0, wavelength / PI / w_equiv_2)
                } else {
                    let r_equiv = z * (1.0 + (z0_equiv / z).powi(2));
                    Complex64::new(1.0 / r_equiv, wavelength / PI / w_equiv_2)
                };
                PumpInput::Gauss { q: q_inv.inv(), mq }
            }
            PumpMode::Front { beam_radius, front_radius, mq } => {
                let mq = sel(mq).abs();
                let w_equiv_2 = sel(beam_radius).powi(2) / mq;
                let q_inv =
                    Complex64::new(1.0 / sel(front_radius), wavelength / PI / w_equiv_2);
                PumpInput::Gauss { q: q_inv.inv(), mq }
            }
            PumpMode::RayVector { radius, angle, distance } => {
                let v = sel(angle);
                PumpInput::Geometric(Ray::new(sel(radius) + sel(distance) * v.tan(), v))
            }
            PumpMode::TwoSections { radius1, radius2, distance } => {
                let y1 = sel(radius1);
                let y2 = sel(radius2);
                PumpInput::Geometric(Ray::new(y2, ((y2 - y1) / sel(distance)).atan()))
            }
            PumpMode::Complex { real, imag, mq } => {
                let mq = sel(mq).abs();
                let q_inv = Complex64::new(sel(real), sel(imag)).inv();
                PumpInput::Gauss {
                    q: Complex64::new(q_inv.re, q_inv.im * mq).inv(),
                    mq,
                }
            }
            PumpMode::InvComplex { real, imag, mq } => {
                let mq = sel(mq).abs();
                PumpInput::Gauss {
                    q: Complex64::new(sel(real), sel(imag) * mq).inv(),
                    mq,
                }
            }
        };
        Self { input }
    }

    pub fn is_gauss(&self) -> bool {
        matches!(self.input, PumpInput::Gauss { .. })
    }

    /// Beam quality factor of a Gauss input, 1 for a geometric one.
    pub fn mq(&self) -> f64 {
        match self.input {
            PumpInput::Gauss { mq, .. } => mq,
            PumpInput::Geometric(_) => 1.0,
        }
    }

    /// Beam figures after the matrix. `wavelength` must already be
    /// divided by the refractive index of the medium at the exit point.
    pub fn calc(&self, m: &Matrix, wavelength: f64) -> BeamResult {
        match self.input {
            PumpInput::Gauss { q, mq } => {
                let q_inv = propagate_q(m, q).inv();
                let front_radius = 1.0 / q_inv.re;
                let w_equiv_2 = wavelength / PI / q_inv.im;
                let beam_radius = (w_equiv_2 * mq).sqrt();
                // Locate the equivalent waist to take the divergence from.
                let tmp = (w_equiv_2 * PI).powi(2);
                let z = tmp * front_radius
                    / ((wavelength * front_radius).powi(2) + tmp);
                let z0 = (z * (front_radius - z)).sqrt();
                let w0 = (z0 * mq * wavelength / PI).sqrt();
                BeamResult {
                    beam_radius,
                    front_radius,
                    half_angle: w0 / z0,
                }
            }
            PumpInput::Geometric(ray) => {
                let out = ray.propagate(m);
                BeamResult {
                    beam_radius: out.y,
                    front_radius: out.y / out.v.sin(),
                    half_angle: out.v,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AbcdBeamCalculator, PumpCalculator};
    use crate::matrix::{abcd, Matrix, TS};
    use crate::pump::PumpMode;

    const LAMBDA: f64 = 1e-6;

    fn space(l: f64) -> Matrix {
        abcd(1.0, l, 0.0, 1.0)
    }

    // Round-trip matrices of a three-mirror cavity, one stable plane
    // fixture per plane plus an unstable one.
    fn stable_t() -> Matrix {
        abcd(1.22740581, 0.933155617, -5.17573851, -3.12021454)
    }

    fn stable_s() -> Matrix {
        abcd(1.07321435, 0.805228946, -1.57668319, -0.251199535)
    }

    fn unstable() -> Matrix {
        abcd(-0.577181785, -0.511906815, 24.6309496, 20.1128159)
    }

    #[test]
    fn resonator_mode_radius_matches_reference_matrices() {
        let calc = AbcdBeamCalculator::new(LAMBDA);
        let wt = calc.beam_radius(&stable_t(), 1.0);
        let ws = calc.beam_radius(&stable_s(), 1.0);
        assert!((wt - 958.984241e-6).abs() < 1e-12, "wt = {wt}");
        assert!((ws - 530.243033e-6).abs() < 1e-12, "ws = {ws}");
        assert!(calc.beam_radius(&unstable(), 1.0).is_nan());
    }

    #[test]
    fn resonator_front_radius_matches_reference_matrices() {
        let calc = AbcdBeamCalculator::new(LAMBDA);
        let rt = calc.front_radius(&stable_t());
        let rs = calc.front_radius(&stable_s());
        assert!((rt - -0.429271897).abs() < 1e-9, "rt = {rt}");
        assert!((rs - -1.21597781).abs() < 1e-8, "rs = {rs}");
    }

    #[test]
    fn flat_front_is_signed_infinity() {
        let calc = AbcdBeamCalculator::new(LAMBDA);
        assert_eq!(calc.front_radius(&abcd(1.0, 1.0, 0.0, 1.0)), f64::INFINITY);
        assert_eq!(
            calc.front_radius(&abcd(1.0, -1.0, 0.0, 1.0)),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn resonator_divergence_matches_reference_matrices() {
        let calc = AbcdBeamCalculator::new(LAMBDA);
        let vt = calc.half_angle(&stable_t(), 1.0);
        let vs = calc.half_angle(&stable_s(), 1.0);
        assert!((vt - 0.129402667f64.to_radians()).abs() < 1e-11, "vt = {vt}");
        assert!((vs - 0.0425118626f64.to_radians()).abs() < 1e-11, "vs = {vs}");
        assert!(calc.half_angle(&unstable(), 1.0).is_nan());
    }

    #[test]
    fn higher_ior_shrinks_the_mode() {
        let calc = AbcdBeamCalculator::new(LAMBDA);
        let w_vac = calc.beam_radius(&stable_t(), 1.0);
        let w_glass = calc.beam_radius(&stable_t(), 1.5);
        assert!((w_glass - w_vac / 1.5f64.sqrt()).abs() < 1e-15);
    }

    #[test]
    fn waist_pump_propagates_along_free_space() {
        let pump = PumpMode::Waist {
            waist: TS::both(100e-6),
            distance: TS::both(0.0),
            mq: TS::both(1.0),
        };
        let calc = PumpCalculator::t(&pump, LAMBDA);

        let at_waist = calc.calc(&Matrix::identity(), LAMBDA);
        assert!((at_waist.beam_radius - 100e-6).abs() < 1e-15);
        assert_eq!(at_waist.front_radius, f64::INFINITY);
        assert!(at_waist.half_angle.is_nan());

        let mid = calc.calc(&space(0.05), LAMBDA);
        assert!((mid.beam_radius - 1.879635494201e-4).abs() < 1e-13);
        assert!((mid.front_radius - 6.973920880218e-2).abs() < 1e-10);
        assert!((mid.half_angle - 3.183098861838e-3).abs() < 1e-12);

        let far = calc.calc(&space(0.1), LAMBDA);
        assert!((far.beam_radius - 3.336482933305e-4).abs() < 1e-13);
    }

    #[test]
    fn waist_distance_shifts_the_start_point() {
        let pump = PumpMode::Waist {
            waist: TS::both(100e-6),
            distance: TS::both(0.05),
            mq: TS::both(1.0),
        };
        let calc = PumpCalculator::t(&pump, LAMBDA);

        let at_input = calc.calc(&Matrix::identity(), LAMBDA);
        assert!((at_input.beam_radius - 1.879635494201e-4).abs() < 1e-13);
        assert!((at_input.front_radius - 6.973920880218e-2).abs() < 1e-10);

        let moved = calc.calc(&space(0.05), LAMBDA);
        assert!((moved.beam_radius - 3.336482933305e-4).abs() < 1e-13);
        assert!((moved.front_radius - 1.098696044011e-1).abs() < 1e-10);
    }

    #[test]
    fn beam_quality_widens_the_hyper_gauss() {
        let pump = PumpMode::Waist {
            waist: TS::both(100e-6),
            distance: TS::both(0.0),
            mq: TS::both(2.0),
        };
        let calc = PumpCalculator::s(&pump, LAMBDA);
        let out = calc.calc(&space(0.1), LAMBDA);
        assert!((out.beam_radius - 6.444258953280e-4).abs() < 1e-13);
        assert!((out.front_radius - 1.024674011003e-1).abs() < 1e-10);
        assert!((out.half_angle - 6.366197723676e-3).abs() < 1e-12);
    }

    #[test]
    fn front_pump_converges_to_its_center() {
        let pump = PumpMode::Front {
            beam_radius: TS::both(1e-3),
            front_radius: TS::both(-0.1),
            mq: TS::both(1.0),
        };
        let calc = PumpCalculator::t(&pump, LAMBDA);

        let at_input = calc.calc(&Matrix::identity(), LAMBDA);
        assert!((at_input.beam_radius - 1e-3).abs() < 1e-14);
        assert!((at_input.front_radius - -0.1).abs() < 1e-12);
        assert!((at_input.half_angle - 1.000506477658e-2).abs() < 1e-12);

        let mid = calc.calc(&space(0.05), LAMBDA);
        assert!((mid.beam_radius - 5.002532388292e-4).abs() < 1e-13);
        assert!((mid.front_radius - -5.010142394759e-2).abs() < 1e-10);
    }

    #[test]
    fn ray_vector_pump_propagates_geometrically() {
        let pump = PumpMode::RayVector {
            radius: TS::both(1e-3),
            angle: TS::both(0.01),
            distance: TS::both(0.0),
        };
        let calc = PumpCalculator::t(&pump, LAMBDA);

        let at_input = calc.calc(&Matrix::identity(), LAMBDA);
        assert!((at_input.beam_radius - 1e-3).abs() < 1e-15);
        assert!((at_input.half_angle - 0.01).abs() < 1e-15);
        assert!((at_input.front_radius - 1.000016666861e-1).abs() < 1e-10);

        let far = calc.calc(&space(0.1), LAMBDA);
        assert!((far.beam_radius - 2e-3).abs() < 1e-15);
        assert!((far.front_radius - 2.000033333722e-1).abs() < 1e-10);
    }

    #[test]
    fn two_section_pump_defines_the_ray_by_two_radii() {
        let pump = PumpMode::TwoSections {
            radius1: TS::both(0.5e-3),
            radius2: TS::both(1.5e-3),
            distance: TS::both(0.1),
        };
        let calc = PumpCalculator::s(&pump, LAMBDA);

        let at_input = calc.calc(&Matrix::identity(), LAMBDA);
        assert!((at_input.beam_radius - 1.5e-3).abs() < 1e-15);
        assert!((at_input.half_angle - 9.999666686665e-3).abs() < 1e-15);

        let far = calc.calc(&space(0.2), LAMBDA);
        assert!((far.beam_radius - 3.499933337333e-3).abs() < 1e-15);
    }

    #[test]
    fn complex_pumps_match_the_equivalent_waist() {
        // q = -i z0 and 1/q = i/z0 both describe a 100um waist at the
        // input for a 1um wavelength.
        let z0 = std::f64::consts::PI * 1e-8 / LAMBDA;
        let complex = PumpMode::Complex {
            real: TS::both(0.0),
            imag: TS::both(-z0),
            mq: TS::both(1.0),
        };
        let inv_complex = PumpMode::InvComplex {
            real: TS::both(0.0),
            imag: TS::both(1.0 / z0),
            mq: TS::both(1.0),
        };
        for pump in [complex, inv_complex] {
            let calc = PumpCalculator::t(&pump, LAMBDA);
            let out = calc.calc(&space(0.1), LAMBDA);
            assert!(
                (out.beam_radius - 3.336482933305e-4).abs() < 1e-13,
                "{}: w = {}",
                pump.mode_name(),
                out.beam_radius
            );
        }
    }
}
