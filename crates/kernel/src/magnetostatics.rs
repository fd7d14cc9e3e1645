//! Magnetostatics: point-dipole pair kernel and the long-range slot.

use std::ops::Range;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::long_range::LongRangeSolver;
use crate::nonbonded::PairForce;
use crate::particle::ParticleArrays;

/// Real-space dipolar pair kernel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DipolarKernel {
    /// Direct dipole-dipole interaction truncated at `r_cut`.
    DirectCutoff {
        /// Magnetostatic prefactor.
        prefactor: f64,
        /// Cutoff.
        r_cut: f64,
    },
}

impl DipolarKernel {
    /// Check prefactor and cutoff.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Self::DirectCutoff { prefactor, r_cut } = *self;
        if !prefactor.is_finite() || prefactor <= 0.0 {
            return Err(ConfigError::parameter("prefactor", "must be > 0"));
        }
        if !r_cut.is_finite() || r_cut < 0.0 {
            return Err(ConfigError::parameter("r_cut", "must be >= 0"));
        }
        Ok(())
    }

    /// Real-space cutoff.
    pub fn cutoff(&self) -> f64 {
        let Self::DirectCutoff { r_cut, .. } = *self;
        r_cut
    }

    /// Force on dipole 1 and torques on both for moments `m1`, `m2` and
    /// separation `d = r1 - r2`.
    pub fn pair_force(&self, m1: DVec3, m2: DVec3, d: DVec3, dist: f64) -> PairForce {
        let Self::DirectCutoff { prefactor, r_cut } = *self;
        if dist >= r_cut || dist <= 0.0 {
            return PairForce::ZERO;
        }
        let r2 = dist * dist;
        let r3_inv = 1.0 / (r2 * dist);
        let r5_inv = r3_inv / r2;
        let m1_d = m1.dot(d);
        let m2_d = m2.dot(d);
        let force = prefactor
            * (3.0 * r5_inv * (m1.dot(m2) * d + m2_d * m1 + m1_d * m2) - 15.0 * r5_inv / r2 * m1_d * m2_d * d);
        let field_at_1 = 3.0 * m2_d * r5_inv * d - m2 * r3_inv;
        let field_at_2 = 3.0 * m1_d * r5_inv * d - m1 * r3_inv;
        PairForce {
            force,
            torque1: prefactor * m1.cross(field_at_1),
            torque2: prefactor * m2.cross(field_at_2),
        }
    }
}

/// Magnetostatics state of one rank.
#[derive(Default)]
pub struct Magnetostatics {
    /// Real-space pair kernel.
    pub kernel: Option<DipolarKernel>,
    /// Long-range solver.
    pub solver: Option<Box<dyn LongRangeSolver>>,
}

impl Magnetostatics {
    /// Pair cutoff, `0.0` when no pair kernel is active.
    pub fn cutoff(&self) -> f64 {
        self.kernel.map_or(0.0, |k| k.cutoff())
    }

    /// Add the long-range contribution, if a solver is installed.
    pub fn add_long_range_force(&mut self, particles: &mut ParticleArrays, local: Range<usize>) {
        if let Some(solver) = self.solver.as_mut() {
            tracing::trace!("magnetostatics long-range solver {}", solver.name());
            solver.add_long_range_force(particles, local);
        }
    }
}
