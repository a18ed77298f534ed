//! Seismic source representations.
//!
//! A source is always reducible to a coefficient vector that combines
//! linearly with a Green's-function basis:
//!
//! - a moment tensor has 6 independent components (Up-South-East / GCMT
//!   ordering: `Mrr, Mtt, Mpp, Mrt, Mrp, Mtp`)
//! - a point force has 3 components (`Fr, Ft, Fp`)
//!
//! Conversions from fault-plane angles (strike/dip/rake) and from moment
//! magnitude follow the standard Aki & Richards formulas.

use serde::{Deserialize, Serialize};

/// Convert moment magnitude `Mw` to scalar moment `M0` (N·m).
pub fn scalar_moment(mw: f64) -> f64 {
    10f64.powf(1.5 * mw + 9.1)
}

/// Symmetric moment tensor, stored as its 6 independent components in
/// Up-South-East ordering: `(Mrr, Mtt, Mpp, Mrt, Mrp, Mtp)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentTensor {
    pub m: [f64; 6],
}

impl MomentTensor {
    pub fn new(m: [f64; 6]) -> Self {
        Self { m }
    }

    /// Build a pure double-couple tensor from fault-plane angles (degrees)
    /// and moment magnitude.
    ///
    /// Strike is measured clockwise from north, dip down from horizontal,
    /// rake counterclockwise in the fault plane (Aki & Richards convention).
    pub fn from_double_couple(strike_deg: f64, dip_deg: f64, rake_deg: f64, mw: f64) -> Self {
        let m0 = scalar_moment(mw);
        let phi = strike_deg.to_radians();
        let delta = dip_deg.to_radians();
        let lam = rake_deg.to_radians();

        let (sin_p, cos_p) = phi.sin_cos();
        let sin_2p = (2.0 * phi).sin();
        let cos_2p = (2.0 * phi).cos();
        let (sin_d, cos_d) = delta.sin_cos();
        let sin_2d = (2.0 * delta).sin();
        let cos_2d = (2.0 * delta).cos();
        let (sin_l, cos_l) = lam.sin_cos();

        let mrr = m0 * sin_2d * sin_l;
        let mtt = -m0 * (sin_d * cos_l * sin_2p + sin_2d * sin_l * sin_p * sin_p);
        let mpp = m0 * (sin_d * cos_l * sin_2p - sin_2d * sin_l * cos_p * cos_p);
        let mrt = -m0 * (cos_d * cos_l * cos_p + cos_2d * sin_l * sin_p);
        let mrp = m0 * (cos_d * cos_l * sin_p - cos_2d * sin_l * cos_p);
        let mtp = -m0 * (sin_d * cos_l * cos_2p + 0.5 * sin_2d * sin_l * sin_2p);

        Self { m: [mrr, mtt, mpp, mrt, mrp, mtp] }
    }
}

/// Point force in Up-South-East ordering: `(Fr, Ft, Fp)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Force {
    pub f: [f64; 3],
}

impl Force {
    pub fn new(f: [f64; 3]) -> Self {
        Self { f }
    }

    /// Build a force vector from magnitude (N) and orientation angles
    /// (degrees): azimuth clockwise from north, inclination down from
    /// vertical.
    pub fn from_angles(magnitude: f64, azimuth_deg: f64, inclination_deg: f64) -> Self {
        let az = azimuth_deg.to_radians();
        let inc = inclination_deg.to_radians();

        let fr = magnitude * inc.cos();
        let ft = -magnitude * inc.sin() * az.cos();
        let fp = magnitude * inc.sin() * az.sin();

        Self { f: [fr, ft, fp] }
    }
}

/// A candidate source mechanism.
///
/// Either family reduces to a coefficient vector compatible with a
/// Green's-function basis of the same parameter family (6 generators for
/// moment tensors, 3 for forces).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Source {
    MomentTensor(MomentTensor),
    Force(Force),
}

impl Source {
    /// Coefficients for the linear basis combination.
    pub fn coefficients(&self) -> &[f64] {
        match self {
            Source::MomentTensor(mt) => &mt.m,
            Source::Force(f) => &f.f,
        }
    }

    /// Number of independent generators for this source family.
    pub fn dimension(&self) -> usize {
        self.coefficients().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const M0_TOL: f64 = 1e-9;

    #[test]
    fn scalar_moment_reference_values() {
        // Mw 4.5 in N·m.
        let m0 = scalar_moment(4.5);
        assert!((m0 / 10f64.powf(15.85) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn vertical_strike_slip_is_pure_mtp() {
        let m0 = scalar_moment(5.0);
        let mt = MomentTensor::from_double_couple(0.0, 90.0, 0.0, 5.0);
        let [mrr, mtt, mpp, mrt, mrp, mtp] = mt.m;
        assert!(mrr.abs() < M0_TOL * m0);
        assert!(mtt.abs() < M0_TOL * m0);
        assert!(mpp.abs() < M0_TOL * m0);
        assert!(mrt.abs() < M0_TOL * m0);
        assert!(mrp.abs() < M0_TOL * m0);
        assert!((mtp + m0).abs() < M0_TOL * m0);
    }

    #[test]
    fn forty_five_degree_thrust() {
        // strike 0, dip 45, rake 90: (Mrr, Mtt, Mpp) = (M0, 0, -M0).
        let m0 = scalar_moment(5.0);
        let mt = MomentTensor::from_double_couple(0.0, 45.0, 90.0, 5.0);
        let [mrr, mtt, mpp, mrt, mrp, mtp] = mt.m;
        assert!((mrr - m0).abs() < M0_TOL * m0);
        assert!(mtt.abs() < M0_TOL * m0);
        assert!((mpp + m0).abs() < M0_TOL * m0);
        assert!(mrt.abs() < M0_TOL * m0);
        assert!(mrp.abs() < M0_TOL * m0);
        assert!(mtp.abs() < M0_TOL * m0);
    }

    #[test]
    fn double_couple_is_traceless() {
        let mt = MomentTensor::from_double_couple(37.0, 62.0, -113.0, 4.8);
        let trace = mt.m[0] + mt.m[1] + mt.m[2];
        assert!(trace.abs() < 1e-6 * scalar_moment(4.8));
    }

    #[test]
    fn vertical_force_points_up() {
        let f = Force::from_angles(2.0, 0.0, 0.0);
        assert!((f.f[0] - 2.0).abs() < 1e-12);
        assert!(f.f[1].abs() < 1e-12);
        assert!(f.f[2].abs() < 1e-12);
    }

    #[test]
    fn source_dimension_matches_family() {
        let mt = Source::MomentTensor(MomentTensor::new([1.0; 6]));
        let f = Source::Force(Force::new([1.0; 3]));
        assert_eq!(mt.dimension(), 6);
        assert_eq!(f.dimension(), 3);
    }
}
