//! The short-range loop: bonded forces plus every pairwise contribution of
//! the Verlet pairs.
//!
//! Pair kernels are evaluated in parallel over the pair list into a buffer,
//! and the buffer is then applied in pair order. Two threads therefore never
//! write the same particle, and the summation order does not depend on the
//! thread schedule.

use glam::DVec3;
use rayon::prelude::*;

use crate::bond_breakage::BondBreakage;
use crate::bonded::{compute_bonded_forces, BondedInteractions};
use crate::cells::CellStructure;
use crate::collision::{detect_collision, CollisionEvent, CollisionParams, CollisionQueue};
use crate::electrostatics::CoulombKernel;
use crate::error::ForceError;
use crate::interaction::InteractionTable;
use crate::magnetostatics::DipolarKernel;
use crate::neighbor::VerletCriterion;
use crate::nonbonded::PairForce;
use crate::particle::ParticleArrays;

/// Pairwise contributions evaluated for every visited pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairKernels<'a> {
    /// Non-bonded potentials; `None` skips them.
    pub table: Option<&'a InteractionTable>,
    /// Real-space Coulomb kernel.
    pub coulomb: Option<&'a CoulombKernel>,
    /// Real-space dipolar kernel.
    pub dipoles: Option<&'a DipolarKernel>,
    /// Collision detection, checked on the same squared distance.
    pub collision: Option<&'a CollisionParams>,
}

/// Sum of all active pair contributions between `i` and `j`, with
/// `d = r_i - r_j`.
pub fn non_bonded_pair_force(
    p: &ParticleArrays,
    i: usize,
    j: usize,
    d: DVec3,
    dist: f64,
    kernels: &PairKernels<'_>,
) -> PairForce {
    let mut out = PairForce::ZERO;
    if let Some(table) = kernels.table {
        let ia = table.get(p.ptype[i], p.ptype[j]);
        if ia.is_active() {
            out += ia.pair_force(p.director(i), p.director(j), d, dist);
        }
    }
    if let Some(coulomb) = kernels.coulomb {
        let q1q2 = p.charge[i] * p.charge[j];
        if q1q2 != 0.0 {
            out.force += coulomb.pair_force(q1q2, d, dist);
        }
    }
    if let Some(dipoles) = kernels.dipoles {
        if p.dipm[i] * p.dipm[j] != 0.0 {
            out += dipoles.pair_force(p.dipole(i), p.dipole(j), d, dist);
        }
    }
    out
}

/// Buffered results of the pair kernels.
#[derive(Debug, Default)]
pub struct PairOutcome {
    /// `(i, j, contribution)` for every pair inside its cutoff.
    pub forces: Vec<(usize, usize, PairForce)>,
    /// Collisions detected on the visited pairs.
    pub collisions: Vec<CollisionEvent>,
}

impl PairOutcome {
    /// Add the buffered contributions: `+force` on `i`, `-force` on `j`.
    pub fn apply(&self, particles: &mut ParticleArrays) {
        for &(i, j, pf) in &self.forces {
            particles.force[i] += pf.force;
            particles.force[j] -= pf.force;
            particles.torque[i] += pf.torque1;
            particles.torque[j] += pf.torque2;
        }
    }
}

/// Evaluate the pair kernels for every candidate pair.
///
/// A pair is visited only if its distance is strictly below the largest
/// active cutoff for that pair.
pub fn compute_pair_forces(
    particles: &ParticleArrays,
    pairs: &[(usize, usize)],
    criterion: &VerletCriterion<'_>,
    kernels: &PairKernels<'_>,
) -> PairOutcome {
    let visited: Vec<(usize, usize, PairForce, Option<CollisionEvent>)> = pairs
        .par_iter()
        .filter_map(|&(i, j)| {
            let d = particles.pos[i] - particles.pos[j];
            let dist2 = d.length_squared();
            let cut = criterion.pair_cutoff(particles, i, j);
            if dist2 >= cut * cut {
                return None;
            }
            let dist = dist2.sqrt();
            let pf = non_bonded_pair_force(particles, i, j, d, dist, kernels);
            let collision = kernels
                .collision
                .and_then(|params| detect_collision(params, particles, i, j, dist2));
            Some((i, j, pf, collision))
        })
        .collect();

    let mut outcome = PairOutcome {
        forces: Vec::with_capacity(visited.len()),
        collisions: Vec::new(),
    };
    for (i, j, pf, collision) in visited {
        outcome.forces.push((i, j, pf));
        outcome.collisions.extend(collision);
    }
    outcome
}

/// Run bonded and non-bonded force evaluation over `cells`.
///
/// Breakage events go to `breakage`, collisions to `collisions`.
pub fn short_range_loop(
    cells: &mut dyn CellStructure,
    bonded: &BondedInteractions,
    breakage: &mut BondBreakage,
    criterion: &VerletCriterion<'_>,
    kernels: &PairKernels<'_>,
    collisions: &mut CollisionQueue,
) -> Result<(), ForceError> {
    let bonded_outcome = compute_bonded_forces(&*cells, bonded, breakage)?;
    let pair_outcome = compute_pair_forces(cells.particles(), cells.verlet_pairs(), criterion, kernels);

    let particles = cells.particles_mut();
    bonded_outcome.apply(particles);
    pair_outcome.apply(particles);
    breakage.extend(bonded_outcome.breakage);
    for event in pair_outcome.collisions {
        collisions.record(event);
    }
    tracing::trace!(
        "short-range loop: {} pair contributions, {} bonded contributions",
        pair_outcome.forces.len(),
        bonded_outcome.forces.len()
    );
    Ok(())
}
