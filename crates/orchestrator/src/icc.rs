//! ICC* fixed-point driver.
//!
//! Each iteration evaluates the purely electrostatic force on a scratch
//! force state, updates the induced charges on every rank, refreshes the
//! ghost charges and reduces the largest relative change. The provisional
//! force state of the step is restored afterwards, whatever the outcome.

use kernel::short_range::compute_pair_forces;
use kernel::{CellStructure, ForceError, IccStar, InteractionTable, PairKernels, VerletCriterion};

use crate::comm::Communicator;
use crate::system::ForceSystem;

impl<C: Communicator> ForceSystem<C> {
    /// Run the induced-charge iteration to convergence. Collective.
    pub(crate) fn iterate_icc(&mut self, skin: f64) -> Result<(), ForceError> {
        let Some(mut icc) = self.electrostatics.icc.take() else {
            return Ok(());
        };
        let snapshot = self.cells.particles().snapshot_forces();
        let outcome = self.icc_iterations(&mut icc, skin);
        self.cells.particles_mut().restore_forces(snapshot);
        self.electrostatics.icc = Some(icc);
        outcome
    }

    fn icc_iterations(&mut self, icc: &mut IccStar, skin: f64) -> Result<(), ForceError> {
        let Some(kernel) = self.electrostatics.kernel else {
            return Ok(());
        };
        let prefactor = kernel.prefactor();
        // Empty table: only charged pairs pass the cutoff filter.
        let coulomb_only = InteractionTable::new();
        let criterion = VerletCriterion {
            skin,
            table: &coulomb_only,
            coulomb_cut: kernel.cutoff(),
            dipolar_cut: 0.0,
            collision_cut: 0.0,
        };
        let kernels = PairKernels { coulomb: Some(&kernel), ..Default::default() };

        let mut last_change = f64::INFINITY;
        icc.citeration = 0;
        for iteration in 1..=icc.params.max_iterations {
            let local = self.cells.local_range();
            let all = 0..self.cells.particles().len();
            self.cells.particles_mut().zero_forces(all);

            let outcome = compute_pair_forces(self.cells.particles(), self.cells.verlet_pairs(), &criterion, &kernels);
            outcome.apply(self.cells.particles_mut());
            self.electrostatics.add_long_range_force(self.cells.particles_mut(), local.clone());
            self.cells.reduce_ghost_forces()?;

            let updated = icc.update_charges(self.cells.particles_mut(), local, prefactor);
            last_change = self.agree(updated)?.into_iter().fold(0.0, f64::max);
            self.cells.update_ghosts()?;

            icc.citeration = iteration;
            tracing::trace!("ICC iteration {iteration}: max relative change {last_change:e}");
            if last_change <= icc.params.convergence {
                tracing::debug!("ICC converged after {iteration} iterations");
                return Ok(());
            }
        }
        Err(ForceError::IccNotConverged {
            iterations: icc.citeration,
            last_change,
        })
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;
    use kernel::{CellStructure, CoulombKernel, ForceError, IccParams, Particle};

    use crate::comm::SingleRank;
    use crate::system::ForceSystem;

    fn icc_system(n_icc: usize, max_iterations: usize, convergence: f64) -> ForceSystem<SingleRank> {
        let mut system = ForceSystem::new(SingleRank, DVec3::ZERO, DVec3::splat(10.0));
        system.set_skin(0.2).unwrap();
        system.set_coulomb(CoulombKernel::Cutoff { prefactor: 1.0, r_cut: 5.0 }).unwrap();
        system
            .set_icc(IccParams {
                n_icc,
                first_id: 10,
                eps_out: 1.0,
                relaxation: 0.7,
                max_iterations,
                convergence,
                ext_field: DVec3::ZERO,
                areas: vec![1.0; n_icc],
                epsilons: vec![10.0; n_icc],
                sigmas: vec![0.0; n_icc],
                normals: vec![DVec3::X; n_icc],
            })
            .unwrap();
        system.add_particle(Particle::new(0, DVec3::new(1.0, 1.0, 1.0)).with_charge(1.0)).unwrap();
        system.add_particle(Particle::new(10, DVec3::new(2.0, 1.0, 1.0)).with_charge(0.1)).unwrap();
        system
    }

    #[test]
    fn induced_charge_reaches_fixed_point() {
        let mut system = icc_system(1, 200, 1e-8);
        system.calculate_forces(0.0).unwrap();
        let icc = system.electrostatics().icc.as_ref().unwrap();
        assert!(icc.citeration > 1);
        // Unit field along the normal: sigma = (eps_in - eps_out) / (eps_in + eps_out) / (2 pi).
        let expected = 9.0 / 11.0 / (2.0 * std::f64::consts::PI);
        let p = system.cells().particles();
        let q_icc = p.charge[system.cells().find(10).unwrap()];
        assert!((q_icc - expected).abs() < 1e-6, "induced charge {q_icc}, expected {expected}");
    }

    #[test]
    fn exhausted_iterations_fail_the_step() {
        let mut system = icc_system(1, 1, 1e-12);
        let err = system.calculate_forces(0.0).unwrap_err();
        assert!(matches!(err, ForceError::IccNotConverged { iterations: 1, .. }));
    }

    #[test]
    fn zero_icc_charge_fails_the_step() {
        let mut system = icc_system(2, 10, 1e-6);
        system.add_particle(Particle::new(11, DVec3::new(4.0, 1.0, 1.0))).unwrap();
        let err = system.calculate_forces(0.0).unwrap_err();
        assert_eq!(err, ForceError::IccZeroCharge(11));
    }
}
