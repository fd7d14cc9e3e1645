//! The particle container seen by the force kernels.
//!
//! [`CellStructure`] hides whether the particles come from a single process
//! or from one rank of a domain decomposition. [`LocalCells`] is the
//! single-process implementation: it has no ghosts, so ghost reduction is a
//! no-op.

use std::ops::Range;

use glam::DVec3;
use rustc_hash::FxHashMap;

use crate::error::ForceError;
use crate::neighbor::{VerletCriterion, VerletList};
use crate::particle::{Particle, ParticleArrays, ParticleId};

/// Particle storage with local/ghost split, id lookup and Verlet pairs.
pub trait CellStructure: Sync {
    /// All particles, local first, ghosts after.
    fn particles(&self) -> &ParticleArrays;

    /// Mutable access to all particles.
    fn particles_mut(&mut self) -> &mut ParticleArrays;

    /// Index range of the particles owned by this rank.
    fn local_range(&self) -> Range<usize>;

    /// Index range of the ghost replicas.
    fn ghost_range(&self) -> Range<usize>;

    /// Index of particle `id`, local or ghost, preferring the local copy.
    fn find(&self, id: ParticleId) -> Option<usize>;

    /// Candidate pairs of the current Verlet list.
    fn verlet_pairs(&self) -> &[(usize, usize)];

    /// Add every ghost's force and torque to its owner exactly once, then
    /// zero the ghost accumulators.
    fn reduce_ghost_forces(&mut self) -> Result<(), ForceError>;

    /// Whether particle `i` is a ghost.
    fn is_ghost(&self, i: usize) -> bool {
        self.ghost_range().contains(&i)
    }
}

/// Single-process particle container.
#[derive(Debug, Clone, Default)]
pub struct LocalCells {
    particles: ParticleArrays,
    index: FxHashMap<ParticleId, usize>,
    verlet: VerletList,
}

impl LocalCells {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a container holding `particles`.
    pub fn from_particles(particles: impl IntoIterator<Item = Particle>) -> Self {
        let mut cells = Self::new();
        for p in particles {
            cells.add_particle(p);
        }
        cells
    }

    /// Add a particle; invalidates the Verlet list.
    pub fn add_particle(&mut self, p: Particle) {
        self.index.insert(p.id, self.particles.len());
        self.particles.push(p);
        self.verlet.invalidate();
    }

    /// Rebuild the Verlet list if the skin criterion or the table demand it.
    ///
    /// Returns `true` if a rebuild happened.
    pub fn update_verlet_list(&mut self, criterion: &VerletCriterion<'_>) -> bool {
        let n = self.particles.len();
        if !self
            .verlet
            .needs_rebuild(&self.particles.pos, criterion.skin, criterion.table.version())
        {
            return false;
        }
        self.verlet.rebuild(&self.particles, n, criterion, |_, _| false);
        true
    }

    /// Move particle `i` to `pos`.
    pub fn set_position(&mut self, i: usize, pos: DVec3) {
        self.particles.pos[i] = pos;
    }
}

impl CellStructure for LocalCells {
    fn particles(&self) -> &ParticleArrays {
        &self.particles
    }

    fn particles_mut(&mut self) -> &mut ParticleArrays {
        &mut self.particles
    }

    fn local_range(&self) -> Range<usize> {
        0..self.particles.len()
    }

    fn ghost_range(&self) -> Range<usize> {
        let n = self.particles.len();
        n..n
    }

    fn find(&self, id: ParticleId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    fn verlet_pairs(&self) -> &[(usize, usize)] {
        self.verlet.pairs()
    }

    fn reduce_ghost_forces(&mut self) -> Result<(), ForceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::InteractionTable;
    use crate::nonbonded::LennardJones;

    #[test]
    fn lookup_and_ranges() {
        let cells = LocalCells::from_particles([
            Particle::new(4, DVec3::ZERO),
            Particle::new(9, DVec3::X),
        ]);
        assert_eq!(cells.find(9), Some(1));
        assert_eq!(cells.find(5), None);
        assert_eq!(cells.local_range(), 0..2);
        assert!(cells.ghost_range().is_empty());
        assert!(!cells.is_ghost(1));
    }

    #[test]
    fn verlet_list_rebuilds_only_when_needed() {
        let mut table = InteractionTable::new();
        table
            .set_lennard_jones(0, 0, LennardJones::new(1.0, 1.0, 1.5, 0.0, 0.0).unwrap())
            .unwrap();
        let criterion = VerletCriterion { skin: 0.4, table: &table, coulomb_cut: 0.0, dipolar_cut: 0.0, collision_cut: 0.0 };
        let mut cells = LocalCells::from_particles([
            Particle::new(0, DVec3::ZERO),
            Particle::new(1, DVec3::new(1.2, 0.0, 0.0)),
        ]);
        assert!(cells.update_verlet_list(&criterion));
        assert_eq!(cells.verlet_pairs(), &[(0, 1)]);
        assert!(!cells.update_verlet_list(&criterion));
        cells.set_position(1, DVec3::new(1.5, 0.0, 0.0));
        assert!(cells.update_verlet_list(&criterion));
    }
}
