//! Non-bonded pair potentials.
//!
//! Each potential stores the raw constants it was configured with plus any
//! quantities derived from them at configuration time. The pair kernels take
//! the separation vector `d = r1 - r2`, its length and the two particle
//! directors, and return the force on particle 1 together with the torques
//! on both particles. The force on particle 2 is always the negation.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Force on the first particle of a pair and the torques on both.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PairForce {
    /// Force on particle 1; particle 2 receives `-force`.
    pub force: DVec3,
    /// Torque on particle 1.
    pub torque1: DVec3,
    /// Torque on particle 2.
    pub torque2: DVec3,
}

impl PairForce {
    /// No force, no torque.
    pub const ZERO: Self = Self {
        force: DVec3::ZERO,
        torque1: DVec3::ZERO,
        torque2: DVec3::ZERO,
    };
}

impl std::ops::AddAssign for PairForce {
    fn add_assign(&mut self, rhs: Self) {
        self.force += rhs.force;
        self.torque1 += rhs.torque1;
        self.torque2 += rhs.torque2;
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::parameter(name, format!("must be a finite value >= 0, got {value}")));
    }
    Ok(())
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::parameter(name, format!("must be a finite value > 0, got {value}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Lennard-Jones
// ---------------------------------------------------------------------------

/// Shifted, offset Lennard-Jones potential.
///
/// `U(r) = 4 eps [(sig/(r-offset))^12 - (sig/(r-offset))^6 + shift]` for
/// `r < cut + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LennardJones {
    /// Well depth.
    pub eps: f64,
    /// Particle size.
    pub sig: f64,
    /// Cutoff measured from the offset.
    pub cut: f64,
    /// Energy shift in units of `4 eps`.
    #[serde(default)]
    pub shift: f64,
    /// Radial offset.
    #[serde(default)]
    pub offset: f64,
}

impl LennardJones {
    /// Validate raw constants.
    pub fn new(eps: f64, sig: f64, cut: f64, shift: f64, offset: f64) -> Result<Self, ConfigError> {
        check_non_negative("epsilon", eps)?;
        check_non_negative("sigma", sig)?;
        check_non_negative("cutoff", cut)?;
        if !shift.is_finite() {
            return Err(ConfigError::parameter("shift", "must be finite"));
        }
        if !offset.is_finite() {
            return Err(ConfigError::parameter("offset", "must be finite"));
        }
        Ok(Self { eps, sig, cut, shift, offset })
    }

    /// Shift that makes the potential continuous at the cutoff.
    pub fn auto_shift(sig: f64, cut: f64) -> f64 {
        if cut <= 0.0 {
            return 0.0;
        }
        let frac6 = (sig / cut).powi(6);
        -(frac6 * frac6 - frac6)
    }

    /// Range beyond which the potential vanishes.
    pub fn max_cutoff(&self) -> f64 {
        self.cut + self.offset
    }

    /// Force on particle 1 for separation `d = r1 - r2` of length `dist`.
    pub fn pair_force(&self, d: DVec3, dist: f64) -> DVec3 {
        if dist >= self.max_cutoff() || dist <= self.offset {
            return DVec3::ZERO;
        }
        let r_off = dist - self.offset;
        let frac6 = (self.sig / r_off).powi(6);
        let fac = 48.0 * self.eps * frac6 * (frac6 - 0.5) / (r_off * dist);
        fac * d
    }

    /// Pair energy at distance `dist`.
    pub fn pair_energy(&self, dist: f64) -> f64 {
        if dist >= self.max_cutoff() || dist <= self.offset {
            return 0.0;
        }
        let frac6 = (self.sig / (dist - self.offset)).powi(6);
        4.0 * self.eps * (frac6 * frac6 - frac6 + self.shift)
    }
}

// ---------------------------------------------------------------------------
// Gay-Berne
// ---------------------------------------------------------------------------

/// Gay-Berne potential for uniaxial ellipsoids.
///
/// Anisotropy enters through the derived `chi1` (shape) and `chi2` (energy)
/// parameters, computed once when the record is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GayBerne {
    /// Well depth.
    pub eps: f64,
    /// Particle size across the short axis.
    pub sig: f64,
    /// Cutoff.
    pub cut: f64,
    /// Length-to-breadth ratio.
    pub k1: f64,
    /// Side-by-side to end-to-end well depth ratio.
    pub k2: f64,
    /// Energy anisotropy exponent.
    pub mu: f64,
    /// Orientation-dependence exponent.
    pub nu: f64,
    /// Derived shape anisotropy `(k1^2 - 1) / (k1^2 + 1)`.
    pub chi1: f64,
    /// Derived energy anisotropy `(k2^(1/mu) - 1) / (k2^(1/mu) + 1)`.
    pub chi2: f64,
}

/// Partial derivatives of the orientation function
/// `S(chi) = (a+b)^2/(1+chi c) + (a-b)^2/(1-chi c)`.
struct Orientation {
    s: f64,
    ds_da: f64,
    ds_db: f64,
    ds_dc: f64,
}

impl Orientation {
    fn new(chi: f64, a: f64, b: f64, c: f64) -> Self {
        let plus = a + b;
        let minus = a - b;
        let den_p = 1.0 + chi * c;
        let den_m = 1.0 - chi * c;
        Self {
            s: plus * plus / den_p + minus * minus / den_m,
            ds_da: 2.0 * plus / den_p + 2.0 * minus / den_m,
            ds_db: 2.0 * plus / den_p - 2.0 * minus / den_m,
            ds_dc: -chi * plus * plus / (den_p * den_p) + chi * minus * minus / (den_m * den_m),
        }
    }
}

impl GayBerne {
    /// Validate raw constants and derive `chi1` and `chi2`.
    pub fn new(eps: f64, sig: f64, cut: f64, k1: f64, k2: f64, mu: f64, nu: f64) -> Result<Self, ConfigError> {
        check_non_negative("eps", eps)?;
        check_positive("sig", sig)?;
        check_non_negative("cut", cut)?;
        check_positive("k1", k1)?;
        check_positive("k2", k2)?;
        if !mu.is_finite() || mu == 0.0 {
            return Err(ConfigError::parameter("mu", format!("must be finite and non-zero, got {mu}")));
        }
        if !nu.is_finite() {
            return Err(ConfigError::parameter("nu", format!("must be finite, got {nu}")));
        }
        let k1_sq = k1 * k1;
        let k2_root = k2.powf(1.0 / mu);
        Ok(Self {
            eps,
            sig,
            cut,
            k1,
            k2,
            mu,
            nu,
            chi1: (k1_sq - 1.0) / (k1_sq + 1.0),
            chi2: (k2_root - 1.0) / (k2_root + 1.0),
        })
    }

    /// Range beyond which the potential vanishes.
    pub fn max_cutoff(&self) -> f64 {
        self.cut
    }

    /// Pair energy for directors `u1`, `u2` and separation `d = r1 - r2`.
    pub fn pair_energy(&self, u1: DVec3, u2: DVec3, d: DVec3, dist: f64) -> f64 {
        if dist >= self.cut || dist <= 0.0 {
            return 0.0;
        }
        let r_hat = d / dist;
        let (a, b, c) = (r_hat.dot(u1), r_hat.dot(u2), u1.dot(u2));
        let shape = Orientation::new(self.chi1, a, b, c);
        let energy = Orientation::new(self.chi2, a, b, c);
        let sigma = self.sig / (1.0 - 0.5 * self.chi1 * shape.s).sqrt();
        let eps1 = 1.0 / (1.0 - self.chi1 * self.chi1 * c * c).sqrt();
        let eps2 = 1.0 - 0.5 * self.chi2 * energy.s;
        let epsilon = self.eps * eps1.powf(self.nu) * eps2.powf(self.mu);
        let x6 = (self.sig / (dist - sigma + self.sig)).powi(6);
        4.0 * epsilon * (x6 * x6 - x6)
    }

    /// Force on particle 1 and torques on both particles.
    ///
    /// Obtained from the analytic gradient of [`Self::pair_energy`] with
    /// respect to the separation and the two directors.
    pub fn pair_force(&self, u1: DVec3, u2: DVec3, d: DVec3, dist: f64) -> PairForce {
        if dist >= self.cut || dist <= 0.0 {
            return PairForce::ZERO;
        }
        let r_hat = d / dist;
        let (a, b, c) = (r_hat.dot(u1), r_hat.dot(u2), u1.dot(u2));
        let shape = Orientation::new(self.chi1, a, b, c);
        let energy = Orientation::new(self.chi2, a, b, c);

        let sigma_term = 1.0 - 0.5 * self.chi1 * shape.s;
        let sigma = self.sig / sigma_term.sqrt();
        let dsigma_ds = 0.25 * self.chi1 * self.sig / (sigma_term * sigma_term.sqrt());

        let eps1 = 1.0 / (1.0 - self.chi1 * self.chi1 * c * c).sqrt();
        let eps2 = 1.0 - 0.5 * self.chi2 * energy.s;
        let epsilon = self.eps * eps1.powf(self.nu) * eps2.powf(self.mu);
        let deps_ds2 = -0.5 * self.chi2 * self.mu * epsilon / eps2;
        let deps_dc_eps1 = self.nu * epsilon * self.chi1 * self.chi1 * c * eps1 * eps1;

        let rho = dist - sigma + self.sig;
        let x6 = (self.sig / rho).powi(6);
        let shape_fn = 4.0 * (x6 * x6 - x6);
        let du_drho = -24.0 * epsilon * (2.0 * x6 * x6 - x6) / rho;

        let du_dr = du_drho;
        let du_da = shape_fn * deps_ds2 * energy.ds_da - du_drho * dsigma_ds * shape.ds_da;
        let du_db = shape_fn * deps_ds2 * energy.ds_db - du_drho * dsigma_ds * shape.ds_db;
        let du_dc = shape_fn * (deps_dc_eps1 + deps_ds2 * energy.ds_dc) - du_drho * dsigma_ds * shape.ds_dc;

        let grad = du_dr * r_hat + du_da * (u1 - a * r_hat) / dist + du_db * (u2 - b * r_hat) / dist;
        PairForce {
            force: -grad,
            torque1: -u1.cross(du_da * r_hat + du_dc * u2),
            torque2: -u2.cross(du_db * r_hat + du_dc * u1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lj_force_is_zero_at_minimum() {
        let lj = LennardJones::new(1.0, 1.0, 2.5, 0.0, 0.0).unwrap();
        let r_min = 2f64.powf(1.0 / 6.0);
        let f = lj.pair_force(DVec3::new(r_min, 0.0, 0.0), r_min);
        assert!(f.length() < 1e-12, "force at minimum: {f:?}");
    }

    #[test]
    fn lj_is_repulsive_inside_minimum() {
        let lj = LennardJones::new(1.0, 1.0, 2.5, 0.0, 0.0).unwrap();
        let f = lj.pair_force(DVec3::new(0.9, 0.0, 0.0), 0.9);
        assert!(f.x > 0.0);
    }

    #[test]
    fn lj_vanishes_at_cutoff() {
        let lj = LennardJones::new(1.0, 1.0, 2.5, 0.0, 0.0).unwrap();
        assert_eq!(lj.pair_force(DVec3::new(2.5, 0.0, 0.0), 2.5), DVec3::ZERO);
        assert_eq!(lj.pair_energy(2.5), 0.0);
    }

    #[test]
    fn lj_auto_shift_zeroes_energy_at_cutoff() {
        let shift = LennardJones::auto_shift(1.0, 2.5);
        let lj = LennardJones::new(1.0, 1.0, 2.5, shift, 0.0).unwrap();
        assert!(lj.pair_energy(2.5 - 1e-9).abs() < 1e-8);
    }

    #[test]
    fn lj_rejects_negative_epsilon() {
        let err = LennardJones::new(-1.0, 1.0, 2.5, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "epsilon", .. }));
    }

    #[test]
    fn gb_derives_chi() {
        let gb = GayBerne::new(1.0, 1.0, 4.0, 3.0, 5.0, 2.0, 1.0).unwrap();
        assert!((gb.chi1 - 0.8).abs() < 1e-15);
        let root = 5f64.sqrt();
        assert!((gb.chi2 - (root - 1.0) / (root + 1.0)).abs() < 1e-15);
    }

    #[test]
    fn gb_rejects_zero_mu() {
        let err = GayBerne::new(1.0, 1.0, 4.0, 3.0, 5.0, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "mu", .. }));
    }

    #[test]
    fn isotropic_gb_matches_lj() {
        let gb = GayBerne::new(1.3, 0.9, 3.0, 1.0, 1.0, 2.0, 1.0).unwrap();
        let lj = LennardJones::new(1.3, 0.9, 3.0, 0.0, 0.0).unwrap();
        let u1 = DVec3::new(0.3, 0.4, 0.5).normalize();
        let u2 = DVec3::new(-0.7, 0.1, 0.2).normalize();
        let d = DVec3::new(0.6, 0.5, -0.4);
        let dist = d.length();
        let gb_force = gb.pair_force(u1, u2, d, dist);
        let lj_force = lj.pair_force(d, dist);
        assert!((gb_force.force - lj_force).length() < 1e-10);
        assert!(gb_force.torque1.length() < 1e-12);
        assert!(gb_force.torque2.length() < 1e-12);
    }

    #[test]
    fn gb_conserves_angular_momentum() {
        let gb = GayBerne::new(1.0, 1.0, 4.0, 3.0, 5.0, 2.0, 1.0).unwrap();
        let u1 = DVec3::new(1.0, 0.2, 0.1).normalize();
        let u2 = DVec3::new(0.3, 1.0, -0.4).normalize();
        let d = DVec3::new(1.1, 0.7, 0.9);
        let pf = gb.pair_force(u1, u2, d, d.length());
        let total = pf.torque1 + pf.torque2 + d.cross(pf.force);
        assert!(total.length() < 1e-9 * pf.force.length().max(1.0), "net angular momentum change {total:?}");
    }
}
