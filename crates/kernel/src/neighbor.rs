//! Uniform-grid neighbor search and Verlet list validity.
//!
//! The grid uses sorted-index + cell-offset arrays rather than a hash map, so
//! a rebuild is a counting sort over the particles. Verlet lists are built
//! with the interaction range plus a skin and stay valid until some particle
//! has moved more than half the skin.

use glam::DVec3;
use rayon::prelude::*;

use crate::interaction::InteractionTable;
use crate::particle::ParticleArrays;

/// Upper bound on cells per axis; larger domains get coarser cells.
const MAX_CELLS_PER_AXIS: f64 = 256.0;

/// Uniform-grid spatial hash for O(1) neighbor cell lookup.
///
/// Cell size must be at least the search radius so that the 27 (3x3x3)
/// adjacent cells contain every neighbor.
pub struct NeighborGrid {
    cell_size: f64,
    grid_min: DVec3,
    grid_dims: [u32; 3],
    /// Cell index for each particle.
    cell_indices: Vec<u32>,
    /// Particle indices sorted by cell index.
    sorted_indices: Vec<u32>,
    /// Start offset in `sorted_indices` for each cell.
    cell_offsets: Vec<u32>,
    /// Number of particles in each cell.
    cell_counts: Vec<u32>,
}

impl NeighborGrid {
    /// Create a new neighbor grid covering `[domain_min, domain_max]`.
    pub fn new(cell_size: f64, domain_min: DVec3, domain_max: DVec3) -> Self {
        assert!(cell_size > 0.0, "cell_size must be positive");
        let extent = (domain_max - domain_min).max(DVec3::ZERO);
        let cell_size = cell_size.max(extent.max_element() / MAX_CELLS_PER_AXIS);
        let dims = [
            (extent.x / cell_size).ceil().max(1.0) as u32,
            (extent.y / cell_size).ceil().max(1.0) as u32,
            (extent.z / cell_size).ceil().max(1.0) as u32,
        ];
        let total_cells = (dims[0] as usize) * (dims[1] as usize) * (dims[2] as usize);
        Self {
            cell_size,
            grid_min: domain_min,
            grid_dims: dims,
            cell_indices: Vec::new(),
            sorted_indices: Vec::new(),
            cell_offsets: vec![0; total_cells],
            cell_counts: vec![0; total_cells],
        }
    }

    /// Grid covering the bounding box of `positions`.
    pub fn covering(cell_size: f64, positions: &[DVec3]) -> Self {
        let (min, max) = positions.iter().fold(
            (DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)),
            |(lo, hi), &p| (lo.min(p), hi.max(p)),
        );
        if positions.is_empty() {
            return Self::new(cell_size, DVec3::ZERO, DVec3::ZERO);
        }
        Self::new(cell_size, min, max)
    }

    /// Total number of cells in the grid.
    fn total_cells(&self) -> usize {
        (self.grid_dims[0] as usize) * (self.grid_dims[1] as usize) * (self.grid_dims[2] as usize)
    }

    /// Map a position to a cell (cx, cy, cz), clamped to grid bounds.
    #[inline]
    fn pos_to_cell(&self, p: DVec3) -> (u32, u32, u32) {
        let rel = (p - self.grid_min) / self.cell_size;
        let clamp = |v: f64, dim: u32| v.floor().max(0.0).min((dim - 1) as f64) as u32;
        (
            clamp(rel.x, self.grid_dims[0]),
            clamp(rel.y, self.grid_dims[1]),
            clamp(rel.z, self.grid_dims[2]),
        )
    }

    /// Flat cell index from (cx, cy, cz).
    #[inline]
    fn cell_hash(&self, cx: u32, cy: u32, cz: u32) -> u32 {
        cx + cy * self.grid_dims[0] + cz * self.grid_dims[0] * self.grid_dims[1]
    }

    /// Rebuild the grid from current particle positions.
    pub fn update(&mut self, positions: &[DVec3]) {
        let n = positions.len();
        let total_cells = self.total_cells();

        // --- 1. Compute cell index for each particle ---
        self.cell_indices.resize(n, 0);
        for (i, &p) in positions.iter().enumerate() {
            let (cx, cy, cz) = self.pos_to_cell(p);
            self.cell_indices[i] = self.cell_hash(cx, cy, cz);
        }

        // --- 2. Count particles per cell ---
        self.cell_counts.clear();
        self.cell_counts.resize(total_cells, 0);
        for &ci in &self.cell_indices {
            self.cell_counts[ci as usize] += 1;
        }

        // --- 3. Prefix-sum to get cell offsets ---
        self.cell_offsets.clear();
        self.cell_offsets.resize(total_cells, 0);
        let mut running = 0u32;
        for c in 0..total_cells {
            self.cell_offsets[c] = running;
            running += self.cell_counts[c];
        }

        // --- 4. Scatter particle indices into sorted order ---
        self.sorted_indices.resize(n, 0);
        let mut write_heads: Vec<u32> = self.cell_offsets.clone();
        for i in 0..n {
            let ci = self.cell_indices[i] as usize;
            let pos = write_heads[ci] as usize;
            self.sorted_indices[pos] = i as u32;
            write_heads[ci] += 1;
        }
    }

    /// Iterate over all neighbors of `particle_idx` within `radius`.
    ///
    /// The closure receives the neighbor index and the squared distance.
    pub fn for_each_neighbor<F>(&self, particle_idx: usize, positions: &[DVec3], radius: f64, mut f: F)
    where
        F: FnMut(usize, f64),
    {
        let p = positions[particle_idx];
        let (cx, cy, cz) = self.pos_to_cell(p);
        let radius_sq = radius * radius;

        for dz in -1i32..=1 {
            let nz = cz as i32 + dz;
            if nz < 0 || nz >= self.grid_dims[2] as i32 {
                continue;
            }
            for dy in -1i32..=1 {
                let ny = cy as i32 + dy;
                if ny < 0 || ny >= self.grid_dims[1] as i32 {
                    continue;
                }
                for dx in -1i32..=1 {
                    let nx = cx as i32 + dx;
                    if nx < 0 || nx >= self.grid_dims[0] as i32 {
                        continue;
                    }
                    let cell = self.cell_hash(nx as u32, ny as u32, nz as u32) as usize;
                    let start = self.cell_offsets[cell] as usize;
                    let count = self.cell_counts[cell] as usize;

                    for s in start..start + count {
                        let j = self.sorted_indices[s] as usize;
                        if j == particle_idx {
                            continue;
                        }
                        let dist_sq = (p - positions[j]).length_squared();
                        if dist_sq <= radius_sq {
                            f(j, dist_sq);
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Verlet criterion
// ---------------------------------------------------------------------------

/// Decides which particle pairs interact and at which range.
///
/// A cutoff of `0.0` marks a contribution as inactive.
#[derive(Debug, Clone, Copy)]
pub struct VerletCriterion<'a> {
    /// Verlet skin.
    pub skin: f64,
    /// Non-bonded parameter table.
    pub table: &'a InteractionTable,
    /// Coulomb pair cutoff.
    pub coulomb_cut: f64,
    /// Dipolar pair cutoff.
    pub dipolar_cut: f64,
    /// Collision detection distance.
    pub collision_cut: f64,
}

impl VerletCriterion<'_> {
    /// Largest cutoff of any contribution for any pair.
    pub fn max_range(&self) -> f64 {
        self.table
            .max_cut()
            .max(self.coulomb_cut)
            .max(self.dipolar_cut)
            .max(self.collision_cut)
    }

    /// Largest active cutoff for the specific pair `(i, j)`.
    pub fn pair_cutoff(&self, p: &ParticleArrays, i: usize, j: usize) -> f64 {
        let mut cut = self.table.get(p.ptype[i], p.ptype[j]).max_cut;
        if self.coulomb_cut > 0.0 && p.charge[i] * p.charge[j] != 0.0 {
            cut = cut.max(self.coulomb_cut);
        }
        if self.dipolar_cut > 0.0 && p.dipm[i] * p.dipm[j] != 0.0 {
            cut = cut.max(self.dipolar_cut);
        }
        cut.max(self.collision_cut)
    }

    /// Whether the pair belongs into a Verlet list built with this skin.
    pub fn accepts(&self, p: &ParticleArrays, i: usize, j: usize, dist_sq: f64) -> bool {
        let cut = self.pair_cutoff(p, i, j);
        if cut <= 0.0 {
            return false;
        }
        let with_skin = cut + self.skin;
        dist_sq <= with_skin * with_skin
    }
}

// ---------------------------------------------------------------------------
// Verlet list
// ---------------------------------------------------------------------------

/// Cached candidate pairs plus the positions they were built from.
#[derive(Debug, Clone, Default)]
pub struct VerletList {
    pairs: Vec<(usize, usize)>,
    reference: Vec<DVec3>,
    table_version: Option<u64>,
}

impl VerletList {
    /// Create an empty, invalid list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a rebuild on the next check.
    pub fn invalidate(&mut self) {
        self.table_version = None;
    }

    /// Candidate pairs `(i, j)`; `i` is always local.
    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    /// Largest displacement of a local particle since the last build.
    ///
    /// Infinite when the local particle count changed.
    pub fn max_displacement(&self, local_positions: &[DVec3]) -> f64 {
        if local_positions.len() != self.reference.len() {
            return f64::INFINITY;
        }
        local_positions
            .iter()
            .zip(&self.reference)
            .map(|(p, r)| p.distance_squared(*r))
            .fold(0.0, f64::max)
            .sqrt()
    }

    /// Whether the list must be rebuilt before it can be used.
    pub fn needs_rebuild(&self, local_positions: &[DVec3], skin: f64, table_version: u64) -> bool {
        match self.table_version {
            None => true,
            Some(v) if v != table_version => true,
            Some(_) => self.max_displacement(local_positions) > 0.5 * skin,
        }
    }

    /// Rebuild from scratch.
    ///
    /// Pairs of two local particles are stored once with `i < j`. Pairs with a
    /// ghost `j` are kept only if `keep_ghost_pair(i, j)` agrees; ghost-ghost
    /// pairs are never stored.
    pub fn rebuild<F>(
        &mut self,
        particles: &ParticleArrays,
        n_local: usize,
        criterion: &VerletCriterion<'_>,
        keep_ghost_pair: F,
    ) where
        F: Fn(usize, usize) -> bool + Sync,
    {
        let positions = &particles.pos;
        self.reference = positions[..n_local].to_vec();
        self.table_version = Some(criterion.table.version());

        let range = criterion.max_range();
        if range <= 0.0 || n_local == 0 {
            self.pairs.clear();
            return;
        }
        let radius = range + criterion.skin;
        let mut grid = NeighborGrid::covering(radius, positions);
        grid.update(positions);

        self.pairs = (0..n_local)
            .into_par_iter()
            .flat_map_iter(|i| {
                let mut found = Vec::new();
                grid.for_each_neighbor(i, positions, radius, |j, dist_sq| {
                    let eligible = if j < n_local { j > i } else { keep_ghost_pair(i, j) };
                    if eligible && criterion.accepts(particles, i, j, dist_sq) {
                        found.push((i, j));
                    }
                });
                found.sort_unstable();
                found
            })
            .collect();
        tracing::debug!("verlet list rebuilt: {} pairs, radius {radius}", self.pairs.len());
    }
}
