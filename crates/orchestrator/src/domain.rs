//! Domain decomposition: slab ownership, particle migration, ghost layers
//! and ghost force reduction.
//!
//! The box is cut into equal slabs along its longest axis, one per rank. The
//! box is open: the first and last slab extend to infinity, so every
//! position has exactly one owner. Each rank receives as ghosts the
//! particles of other ranks that lie within the ghost width of its slab.

use std::ops::Range;

use glam::{DQuat, DVec3};
use kernel::{
    CellStructure, ForceError, Particle, ParticleArrays, ParticleId, PropagationMode, VerletCriterion, VerletList,
};
use kernel::particle::GhostState;
use rustc_hash::FxHashMap;

use crate::comm::Communicator;

// ---------------------------------------------------------------------------
// Slabs
// ---------------------------------------------------------------------------

/// Equal-width slabs along one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlabDecomposition {
    axis: usize,
    origin: f64,
    width: f64,
    n_slabs: usize,
}

impl SlabDecomposition {
    /// Split the box `[box_min, box_max]` into `n_slabs` slabs along its
    /// longest axis.
    pub fn new(box_min: DVec3, box_max: DVec3, n_slabs: usize) -> Self {
        let extent = box_max - box_min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        let n_slabs = n_slabs.max(1);
        Self {
            axis,
            origin: box_min[axis],
            width: extent[axis] / n_slabs as f64,
            n_slabs,
        }
    }

    /// Index of the decomposed axis.
    pub fn axis(&self) -> usize {
        self.axis
    }

    /// Number of slabs.
    pub fn len(&self) -> usize {
        self.n_slabs
    }

    /// `true` if there are no slabs; never the case.
    pub fn is_empty(&self) -> bool {
        self.n_slabs == 0
    }

    /// Bounds of slab `rank` along the axis; edge slabs are unbounded.
    pub fn bounds(&self, rank: usize) -> (f64, f64) {
        let lower = if rank == 0 {
            f64::NEG_INFINITY
        } else {
            self.origin + rank as f64 * self.width
        };
        let upper = if rank + 1 >= self.n_slabs {
            f64::INFINITY
        } else {
            self.origin + (rank + 1) as f64 * self.width
        };
        (lower, upper)
    }

    /// Rank owning position `pos`.
    pub fn owner(&self, pos: DVec3) -> usize {
        if self.n_slabs == 1 || self.width <= 0.0 {
            return 0;
        }
        let x = pos[self.axis];
        (0..self.n_slabs)
            .find(|&rank| x < self.bounds(rank).1)
            .unwrap_or(self.n_slabs - 1)
    }

    /// Distance along the axis from `pos` to slab `rank`, zero inside it.
    pub fn distance_to_slab(&self, pos: DVec3, rank: usize) -> f64 {
        let x = pos[self.axis];
        let (lower, upper) = self.bounds(rank);
        if x < lower {
            lower - x
        } else if x > upper {
            x - upper
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Decomposed cell structure
// ---------------------------------------------------------------------------

/// One rank's share of a slab-decomposed particle system.
///
/// Layout: owned particles `0..n_local`, then ghosts grouped by source rank
/// in rank order.
pub struct DomainDecomposition<C: Communicator> {
    comm: C,
    slabs: SlabDecomposition,
    particles: ParticleArrays,
    n_local: usize,
    index: FxHashMap<ParticleId, usize>,
    ghost_owner: Vec<usize>,
    ghost_ranges: Vec<Range<usize>>,
    send_lists: Vec<Vec<usize>>,
    verlet: VerletList,
    needs_resort: bool,
    used_propagations: PropagationMode,
}

impl<C: Communicator> DomainDecomposition<C> {
    /// Create an empty decomposition of the box `[box_min, box_max]`.
    pub fn new(comm: C, box_min: DVec3, box_max: DVec3) -> Self {
        let slabs = SlabDecomposition::new(box_min, box_max, comm.size());
        let size = comm.size();
        Self {
            comm,
            slabs,
            particles: ParticleArrays::new(),
            n_local: 0,
            index: FxHashMap::default(),
            ghost_owner: Vec::new(),
            ghost_ranges: vec![0..0; size],
            send_lists: vec![Vec::new(); size],
            verlet: VerletList::new(),
            needs_resort: true,
            used_propagations: PropagationMode::NONE,
        }
    }

    /// The slab geometry.
    pub fn slabs(&self) -> &SlabDecomposition {
        &self.slabs
    }

    /// Union of the propagation modes of all particles on all ranks, as of
    /// the last resort.
    pub fn used_propagations(&self) -> PropagationMode {
        self.used_propagations
    }

    /// Request a full resort before the next evaluation.
    pub fn invalidate(&mut self) {
        self.needs_resort = true;
        self.verlet.invalidate();
    }

    fn drop_ghosts(&mut self) {
        self.particles.truncate(self.n_local);
        self.ghost_owner.clear();
        for range in &mut self.ghost_ranges {
            *range = self.n_local..self.n_local;
        }
        for list in &mut self.send_lists {
            list.clear();
        }
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (i, &id) in self.particles.id.iter().enumerate() {
            self.index.entry(id).or_insert(i);
        }
    }

    /// Add a particle. Only the owning rank stores it; returns whether this
    /// rank did.
    pub fn add_particle(&mut self, p: Particle) -> bool {
        if self.slabs.owner(p.pos) != self.comm.rank() {
            return false;
        }
        self.drop_ghosts();
        self.index.insert(p.id, self.n_local);
        self.particles.push(p);
        self.n_local += 1;
        self.invalidate();
        true
    }

    /// Move a local particle; ownership is re-evaluated on the next resort.
    pub fn set_position(&mut self, id: ParticleId, pos: DVec3) -> bool {
        match self.index.get(&id) {
            Some(&i) if i < self.n_local => {
                self.particles.pos[i] = pos;
                true
            }
            _ => false,
        }
    }

    /// Rotate a local particle.
    pub fn set_orientation(&mut self, id: ParticleId, quat: DQuat) -> bool {
        match self.index.get(&id) {
            Some(&i) if i < self.n_local => {
                self.particles.quat[i] = quat;
                true
            }
            _ => false,
        }
    }

    /// Migrate particles to their owners and rebuild the ghost layer.
    pub fn resort(&mut self, ghost_width: f64) -> Result<(), ForceError> {
        let rank = self.comm.rank();
        let size = self.comm.size();

        // --- 1. Migration ---
        let mut kept = ParticleArrays::new();
        let mut outgoing: Vec<Vec<Particle>> = vec![Vec::new(); size];
        for i in 0..self.n_local {
            let p = self.particles.particle(i);
            let owner = self.slabs.owner(p.pos);
            if owner == rank {
                kept.push(p);
            } else {
                outgoing[owner].push(p);
            }
        }
        let migrated: usize = outgoing.iter().map(Vec::len).sum();
        for incoming in self.comm.exchange(outgoing)? {
            for p in incoming {
                kept.push(p);
            }
        }
        self.n_local = kept.len();
        self.particles = kept;

        // --- 2. Ghost layer ---
        let mut outgoing: Vec<Vec<Particle>> = vec![Vec::new(); size];
        for (dest, list) in self.send_lists.iter_mut().enumerate() {
            list.clear();
            if dest == rank {
                continue;
            }
            for i in 0..self.n_local {
                if self.slabs.distance_to_slab(self.particles.pos[i], dest) <= ghost_width {
                    list.push(i);
                    let mut ghost = self.particles.particle(i);
                    ghost.force = DVec3::ZERO;
                    ghost.torque = DVec3::ZERO;
                    outgoing[dest].push(ghost);
                }
            }
        }
        self.ghost_owner.clear();
        for (source, incoming) in self.comm.exchange(outgoing)?.into_iter().enumerate() {
            let start = self.particles.len();
            for p in incoming {
                self.particles.push(p);
                self.ghost_owner.push(source);
            }
            self.ghost_ranges[source] = start..self.particles.len();
        }
        self.rebuild_index();

        // --- 3. System-wide propagation modes ---
        let local_bits = self.particles.propagation[..self.n_local]
            .iter()
            .fold(0, |acc, m| acc | m.bits());
        self.used_propagations = PropagationMode::from_bits(self.comm.all_reduce_or(local_bits)?);

        self.needs_resort = false;
        self.verlet.invalidate();
        tracing::info!(
            "rank {rank}: resort done, {} local, {} ghosts, {migrated} migrated out",
            self.n_local,
            self.ghost_owner.len()
        );
        Ok(())
    }

    /// Refresh position, orientation, velocities and charge of every ghost
    /// from its owner.
    pub fn update_ghosts(&mut self) -> Result<(), ForceError> {
        let outgoing: Vec<Vec<GhostState>> = self
            .send_lists
            .iter()
            .map(|list| list.iter().map(|&i| self.particles.ghost_state(i)).collect())
            .collect();
        let incoming = self.comm.exchange(outgoing)?;
        for (source, states) in incoming.into_iter().enumerate() {
            let range = self.ghost_ranges[source].clone();
            if states.len() != range.len() {
                return Err(ForceError::Collective(format!(
                    "ghost layer out of sync: rank {source} sent {} states for {} ghosts",
                    states.len(),
                    range.len()
                )));
            }
            for (g, state) in range.zip(&states) {
                self.particles.apply_ghost_state(g, state);
            }
        }
        Ok(())
    }

    /// Bring the neighbor structures up to date for the next evaluation.
    ///
    /// A rebuild anywhere triggers a resort everywhere; otherwise only the
    /// ghost state is refreshed. Returns whether a rebuild happened.
    pub fn update(&mut self, criterion: &VerletCriterion<'_>, ghost_width: f64) -> Result<bool, ForceError> {
        let local_rebuild = self.needs_resort
            || self.verlet.needs_rebuild(
                &self.particles.pos[..self.n_local],
                criterion.skin,
                criterion.table.version(),
            );
        let rebuild = self.comm.any(local_rebuild)?;
        if !rebuild {
            self.update_ghosts()?;
            return Ok(false);
        }
        self.resort(ghost_width)?;
        let rank = self.comm.rank();
        let n_local = self.n_local;
        let ghost_owner = &self.ghost_owner;
        self.verlet.rebuild(&self.particles, n_local, criterion, |_, j| {
            ghost_owner[j - n_local] > rank
        });
        Ok(true)
    }
}

impl<C: Communicator> CellStructure for DomainDecomposition<C> {
    fn particles(&self) -> &ParticleArrays {
        &self.particles
    }

    fn particles_mut(&mut self) -> &mut ParticleArrays {
        &mut self.particles
    }

    fn local_range(&self) -> Range<usize> {
        0..self.n_local
    }

    fn ghost_range(&self) -> Range<usize> {
        self.n_local..self.particles.len()
    }

    fn find(&self, id: ParticleId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    fn verlet_pairs(&self) -> &[(usize, usize)] {
        self.verlet.pairs()
    }

    fn reduce_ghost_forces(&mut self) -> Result<(), ForceError> {
        let outgoing: Vec<Vec<(DVec3, DVec3)>> = self
            .ghost_ranges
            .iter()
            .map(|range| range.clone().map(|g| (self.particles.force[g], self.particles.torque[g])).collect())
            .collect();
        let incoming = self.comm.exchange(outgoing)?;
        for (dest, contributions) in incoming.into_iter().enumerate() {
            let list = &self.send_lists[dest];
            if contributions.len() != list.len() {
                return Err(ForceError::Collective(format!(
                    "ghost layer out of sync: rank {dest} returned {} forces for {} sent particles",
                    contributions.len(),
                    list.len()
                )));
            }
            for (&i, (f, t)) in list.iter().zip(contributions) {
                self.particles.force[i] += f;
                self.particles.torque[i] += t;
            }
        }
        let ghosts = self.ghost_range();
        self.particles.zero_forces(ghosts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{run_ranks, SingleRank};

    #[test]
    fn slabs_cover_the_longest_axis() {
        let slabs = SlabDecomposition::new(DVec3::ZERO, DVec3::new(2.0, 8.0, 4.0), 4);
        assert_eq!(slabs.axis(), 1);
        assert_eq!(slabs.owner(DVec3::new(0.0, 1.0, 0.0)), 0);
        assert_eq!(slabs.owner(DVec3::new(0.0, 2.0, 0.0)), 1);
        assert_eq!(slabs.owner(DVec3::new(0.0, 7.9, 0.0)), 3);
    }

    #[test]
    fn edge_slabs_extend_to_infinity() {
        let slabs = SlabDecomposition::new(DVec3::ZERO, DVec3::splat(4.0), 2);
        assert_eq!(slabs.owner(DVec3::new(-100.0, 0.0, 0.0)), 0);
        assert_eq!(slabs.owner(DVec3::new(100.0, 0.0, 0.0)), 1);
        assert_eq!(slabs.distance_to_slab(DVec3::new(-100.0, 0.0, 0.0), 0), 0.0);
        assert!((slabs.distance_to_slab(DVec3::new(1.5, 0.0, 0.0), 1) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn single_rank_has_no_ghosts() {
        let mut dd = DomainDecomposition::new(SingleRank, DVec3::ZERO, DVec3::splat(4.0));
        assert!(dd.add_particle(Particle::new(0, DVec3::ONE)));
        assert!(dd.add_particle(Particle::new(1, DVec3::splat(2.0))));
        dd.resort(1.0).unwrap();
        assert_eq!(dd.local_range(), 0..2);
        assert!(dd.ghost_range().is_empty());
        assert_eq!(dd.find(1), Some(1));
    }

    #[test]
    fn particles_migrate_and_ghosts_reduce_once() {
        let results = run_ranks(2, |comm| {
            let rank = comm.rank();
            let mut dd = DomainDecomposition::new(comm, DVec3::ZERO, DVec3::new(4.0, 1.0, 1.0));
            // Both particles start on rank 0's side, then one moves across.
            dd.add_particle(Particle::new(0, DVec3::new(1.8, 0.5, 0.5)));
            dd.add_particle(Particle::new(1, DVec3::new(1.5, 0.5, 0.5)));
            dd.set_position(1, DVec3::new(2.2, 0.5, 0.5));
            dd.resort(0.5).unwrap();

            let ghosts = dd.ghost_range();
            for g in ghosts.clone() {
                dd.particles_mut().force[g] = DVec3::new(1.0, 0.0, 0.0);
            }
            dd.reduce_ghost_forces().unwrap();
            let local: Vec<(ParticleId, DVec3)> = dd
                .local_range()
                .map(|i| (dd.particles().id[i], dd.particles().force[i]))
                .collect();
            let ghost_forces_zero = ghosts.clone().all(|g| dd.particles().force[g] == DVec3::ZERO);
            (rank, local, ghosts.len(), ghost_forces_zero)
        })
        .unwrap();

        for (rank, local, n_ghosts, zeroed) in results {
            assert_eq!(local.len(), 1, "rank {rank} owns one particle");
            assert_eq!(local[0].0, rank as ParticleId);
            assert_eq!(n_ghosts, 1);
            assert!(zeroed);
            assert_eq!(local[0].1, DVec3::new(1.0, 0.0, 0.0), "ghost force reduced exactly once");
        }
    }
}
