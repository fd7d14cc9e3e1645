//! Long-range solver seam.
//!
//! Mesh or field solvers are opaque to the force pipeline: it only asks them
//! to add their contribution to the local particles once per step.

use std::ops::Range;

use crate::particle::ParticleArrays;

/// A solver for the long-range (k-space or field) part of an interaction.
pub trait LongRangeSolver: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Add this solver's force and torque to every particle in `local`.
    fn add_long_range_force(&mut self, particles: &mut ParticleArrays, local: Range<usize>);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use glam::DVec3;

    /// Adds `q * field` to every local particle and counts invocations.
    pub struct UniformFieldSolver {
        pub field: DVec3,
        pub calls: usize,
    }

    impl LongRangeSolver for UniformFieldSolver {
        fn name(&self) -> &str {
            "uniform-field"
        }

        fn add_long_range_force(&mut self, particles: &mut ParticleArrays, local: Range<usize>) {
            self.calls += 1;
            for i in local {
                particles.force[i] += particles.charge[i] * self.field;
            }
        }
    }
}
