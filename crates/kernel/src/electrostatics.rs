//! Electrostatics: real-space Coulomb pair kernels, the long-range slot and
//! the ICC* induced-charge extension.

use std::f64::consts::PI;
use std::ops::Range;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ForceError};
use crate::long_range::LongRangeSolver;
use crate::particle::{ParticleArrays, ParticleId};

/// Real-space Coulomb pair kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoulombKernel {
    /// Bare Coulomb truncated at `r_cut`.
    Cutoff {
        /// Electrostatic prefactor (Bjerrum length times kT).
        prefactor: f64,
        /// Cutoff.
        r_cut: f64,
    },
    /// Screened Coulomb with inverse Debye length `kappa`.
    DebyeHueckel {
        /// Electrostatic prefactor.
        prefactor: f64,
        /// Inverse screening length.
        kappa: f64,
        /// Cutoff.
        r_cut: f64,
    },
}

impl CoulombKernel {
    /// Check prefactor, screening and cutoff.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (prefactor, r_cut) = (self.prefactor(), self.cutoff());
        if !prefactor.is_finite() || prefactor <= 0.0 {
            return Err(ConfigError::parameter("prefactor", "must be > 0"));
        }
        if !r_cut.is_finite() || r_cut < 0.0 {
            return Err(ConfigError::parameter("r_cut", "must be >= 0"));
        }
        if let Self::DebyeHueckel { kappa, .. } = self {
            if !kappa.is_finite() || *kappa < 0.0 {
                return Err(ConfigError::parameter("kappa", "must be >= 0"));
            }
        }
        Ok(())
    }

    /// Electrostatic prefactor.
    pub fn prefactor(&self) -> f64 {
        match *self {
            Self::Cutoff { prefactor, .. } | Self::DebyeHueckel { prefactor, .. } => prefactor,
        }
    }

    /// Real-space cutoff.
    pub fn cutoff(&self) -> f64 {
        match *self {
            Self::Cutoff { r_cut, .. } | Self::DebyeHueckel { r_cut, .. } => r_cut,
        }
    }

    /// Force on particle 1 for charge product `q1q2` and separation `d = r1 - r2`.
    pub fn pair_force(&self, q1q2: f64, d: DVec3, dist: f64) -> DVec3 {
        if dist >= self.cutoff() || dist <= 0.0 {
            return DVec3::ZERO;
        }
        let fac = match *self {
            Self::Cutoff { prefactor, .. } => prefactor * q1q2 / (dist * dist * dist),
            Self::DebyeHueckel { prefactor, kappa, .. } => {
                prefactor * q1q2 * (-kappa * dist).exp() * (1.0 + kappa * dist) / (dist * dist * dist)
            }
        };
        fac * d
    }
}

/// Electrostatics state of one rank.
#[derive(Default)]
pub struct Electrostatics {
    /// Real-space pair kernel.
    pub kernel: Option<CoulombKernel>,
    /// Long-range solver.
    pub solver: Option<Box<dyn LongRangeSolver>>,
    /// Induced-charge extension.
    pub icc: Option<IccStar>,
}

impl Electrostatics {
    /// Pair cutoff, `0.0` when no pair kernel is active.
    pub fn cutoff(&self) -> f64 {
        self.kernel.map_or(0.0, |k| k.cutoff())
    }

    /// Add the long-range contribution, if a solver is installed.
    pub fn add_long_range_force(&mut self, particles: &mut ParticleArrays, local: Range<usize>) {
        if let Some(solver) = self.solver.as_mut() {
            tracing::trace!("electrostatics long-range solver {}", solver.name());
            solver.add_long_range_force(particles, local);
        }
    }
}

// ---------------------------------------------------------------------------
// ICC*
// ---------------------------------------------------------------------------

/// Parameters of the ICC* induced-charge iteration.
///
/// ICC particles occupy the contiguous id block `first_id .. first_id + n_icc`;
/// the per-particle vectors are indexed by `id - first_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IccParams {
    /// Number of ICC particles.
    pub n_icc: usize,
    /// Id of the first ICC particle.
    pub first_id: ParticleId,
    /// Permittivity of the surrounding medium.
    pub eps_out: f64,
    /// Under-relaxation factor in `(0, 2]`.
    pub relaxation: f64,
    /// Iteration limit.
    pub max_iterations: usize,
    /// Convergence threshold on the largest relative charge change.
    pub convergence: f64,
    /// Homogeneous external field.
    #[serde(default)]
    pub ext_field: DVec3,
    /// Surface element areas.
    pub areas: Vec<f64>,
    /// Surface element permittivities.
    pub epsilons: Vec<f64>,
    /// Bare surface charge densities.
    pub sigmas: Vec<f64>,
    /// Outward surface normals.
    pub normals: Vec<DVec3>,
}

impl IccParams {
    /// Check the scalar parameters and the per-particle vector lengths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_icc == 0 {
            return Err(ConfigError::parameter("n_icc", "must be > 0"));
        }
        if !(self.eps_out > 0.0) {
            return Err(ConfigError::parameter("epsilon", "must be > 0"));
        }
        if !(self.relaxation > 0.0 && self.relaxation <= 2.0) {
            return Err(ConfigError::parameter("relaxation", "must be in (0, 2]"));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::parameter("max_iterations", "must be > 0"));
        }
        if !(self.convergence > 0.0) {
            return Err(ConfigError::parameter("convergence", "must be > 0"));
        }
        let n = self.n_icc;
        if self.areas.len() != n || self.epsilons.len() != n || self.sigmas.len() != n || self.normals.len() != n {
            return Err(ConfigError::parameter("n_icc", "areas, epsilons, sigmas and normals need n_icc entries"));
        }
        Ok(())
    }
}

/// The ICC* extension with its iteration counter.
#[derive(Debug, Clone, PartialEq)]
pub struct IccStar {
    /// Parameters.
    pub params: IccParams,
    /// Iterations used by the last force evaluation.
    pub citeration: usize,
}

impl IccStar {
    /// Validate and wrap parameters.
    pub fn new(params: IccParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self { params, citeration: 0 })
    }

    /// Index of particle `id` in the ICC block.
    pub fn slot(&self, id: ParticleId) -> Option<usize> {
        let offset = id.checked_sub(self.params.first_id)? as usize;
        (offset < self.params.n_icc).then_some(offset)
    }

    /// One charge update on the local ICC particles.
    ///
    /// `particles.force` must hold the purely electrostatic force of the
    /// current charges. Returns the largest relative charge density change.
    pub fn update_charges(
        &self,
        particles: &mut ParticleArrays,
        local: Range<usize>,
        prefactor: f64,
    ) -> Result<f64, ForceError> {
        let cfg = &self.params;
        let pref = 1.0 / (prefactor * 2.0 * PI);
        let mut max_diff = 0.0_f64;
        for i in local {
            let Some(slot) = self.slot(particles.id[i]) else {
                continue;
            };
            let q_old = particles.charge[i];
            if q_old == 0.0 {
                return Err(ForceError::IccZeroCharge(particles.id[i]));
            }
            let eps_in = cfg.epsilons[slot];
            let del_eps = (eps_in - cfg.eps_out) / (eps_in + cfg.eps_out);
            let field = particles.force[i] / q_old + cfg.ext_field;
            let density_old = q_old / cfg.areas[slot];
            let density_update = del_eps * pref * field.dot(cfg.normals[slot])
                + 2.0 * cfg.eps_out / (cfg.eps_out + eps_in) * cfg.sigmas[slot];
            let density_new = (1.0 - cfg.relaxation) * density_old + cfg.relaxation * density_update;
            let denom = density_new.abs() + density_old.abs();
            if denom > 0.0 {
                max_diff = max_diff.max((density_new - density_old).abs() / denom);
            }
            particles.charge[i] = density_new * cfg.areas[slot];
        }
        Ok(max_diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Particle;

    fn params(n: usize) -> IccParams {
        IccParams {
            n_icc: n,
            first_id: 10,
            eps_out: 1.0,
            relaxation: 1.0,
            max_iterations: 10,
            convergence: 1e-6,
            ext_field: DVec3::ZERO,
            areas: vec![2.0; n],
            epsilons: vec![1.0; n],
            sigmas: vec![0.25; n],
            normals: vec![DVec3::Z; n],
        }
    }

    #[test]
    fn coulomb_like_charges_repel() {
        let k = CoulombKernel::Cutoff { prefactor: 1.0, r_cut: 3.0 };
        let f = k.pair_force(1.0, DVec3::new(2.0, 0.0, 0.0), 2.0);
        assert!((f.x - 0.25).abs() < 1e-15);
        assert_eq!(k.pair_force(1.0, DVec3::new(3.0, 0.0, 0.0), 3.0), DVec3::ZERO);
    }

    #[test]
    fn debye_hueckel_reduces_to_coulomb_without_screening() {
        let dh = CoulombKernel::DebyeHueckel { prefactor: 2.0, kappa: 0.0, r_cut: 5.0 };
        let bare = CoulombKernel::Cutoff { prefactor: 2.0, r_cut: 5.0 };
        let d = DVec3::new(1.0, 1.0, 0.5);
        assert!((dh.pair_force(-1.0, d, d.length()) - bare.pair_force(-1.0, d, d.length())).length() < 1e-15);
    }

    #[test]
    fn kernel_validation() {
        assert!(CoulombKernel::Cutoff { prefactor: 0.0, r_cut: 1.0 }.validate().is_err());
        assert!(CoulombKernel::DebyeHueckel { prefactor: 1.0, kappa: -1.0, r_cut: 1.0 }.validate().is_err());
        assert!(CoulombKernel::Cutoff { prefactor: 1.0, r_cut: 1.0 }.validate().is_ok());
    }

    #[test]
    fn icc_params_require_matching_lengths() {
        let mut p = params(2);
        p.areas.pop();
        assert!(IccStar::new(p).is_err());
    }

    #[test]
    fn icc_slot_lookup() {
        let icc = IccStar::new(params(3)).unwrap();
        assert_eq!(icc.slot(9), None);
        assert_eq!(icc.slot(10), Some(0));
        assert_eq!(icc.slot(12), Some(2));
        assert_eq!(icc.slot(13), None);
    }

    #[test]
    fn icc_matched_permittivity_gives_bare_charge() {
        let icc = IccStar::new(params(1)).unwrap();
        let mut particles = ParticleArrays::new();
        particles.push(Particle::new(10, DVec3::ZERO).with_charge(1.0));
        particles.force[0] = DVec3::new(0.0, 0.0, 3.0);
        let diff = icc.update_charges(&mut particles, 0..1, 1.0).unwrap();
        assert!((particles.charge[0] - 0.5).abs() < 1e-15);
        assert!(diff > 0.0);
        let diff = icc.update_charges(&mut particles, 0..1, 1.0).unwrap();
        assert_eq!(diff, 0.0);
    }

    #[test]
    fn icc_zero_charge_is_an_error() {
        let icc = IccStar::new(params(1)).unwrap();
        let mut particles = ParticleArrays::new();
        particles.push(Particle::new(10, DVec3::ZERO));
        let err = icc.update_charges(&mut particles, 0..1, 1.0).unwrap_err();
        assert_eq!(err, ForceError::IccZeroCharge(10));
    }
}
