//! Collision detection.
//!
//! During the pair loop every visited pair closer than the collision distance
//! becomes a [`CollisionEvent`]. Events are normalised so the smaller id comes
//! first and de-duplicated, so a pair is recorded at most once per step.
//! Resolution happens after the force evaluation, on the globally merged
//! queue.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::cells::CellStructure;
use crate::error::ConfigError;
use crate::particle::{Bond, ParticleArrays, ParticleId};

/// What happens when two particles collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CollisionMode {
    /// Detection disabled.
    #[default]
    Off,
    /// Bind the two particle centres with a bond.
    BindCenters,
}

/// Collision detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CollisionParams {
    /// Active mode.
    pub mode: CollisionMode,
    /// Distance below which particles collide.
    pub distance: f64,
    /// Bond type used to bind the centres.
    pub bond_centers: usize,
}

impl CollisionParams {
    /// Check the distance and the bond type.
    pub fn validate(&self, n_bond_types: usize) -> Result<(), ConfigError> {
        if self.mode == CollisionMode::Off {
            return Ok(());
        }
        if !self.distance.is_finite() || self.distance <= 0.0 {
            return Err(ConfigError::parameter("distance", "must be > 0"));
        }
        if self.bond_centers >= n_bond_types {
            return Err(ConfigError::UnknownBond(self.bond_centers));
        }
        Ok(())
    }

    /// Range the pair loop must cover, `0.0` when detection is off.
    pub fn cutoff(&self) -> f64 {
        match self.mode {
            CollisionMode::Off => 0.0,
            CollisionMode::BindCenters => self.distance,
        }
    }
}

/// A detected collision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionEvent {
    /// Smaller particle id.
    pub pp1: ParticleId,
    /// Larger particle id.
    pub pp2: ParticleId,
    /// Squared distance at detection.
    pub dist2: f64,
}

fn has_bond_to(bonds: &[Bond], bond_id: usize, partner: ParticleId) -> bool {
    bonds
        .iter()
        .any(|b| b.bond_id == bond_id && b.partners.first() == Some(&partner))
}

/// Collision test for a visited pair, reusing its squared distance.
///
/// Virtual sites never collide; pairs already bound by the collision bond
/// are skipped.
pub fn detect_collision(
    params: &CollisionParams,
    particles: &ParticleArrays,
    i: usize,
    j: usize,
    dist2: f64,
) -> Option<CollisionEvent> {
    if params.mode == CollisionMode::Off || dist2 > params.distance * params.distance {
        return None;
    }
    if particles.is_virtual[i] || particles.is_virtual[j] {
        return None;
    }
    let (id_i, id_j) = (particles.id[i], particles.id[j]);
    if has_bond_to(&particles.bonds[i], params.bond_centers, id_j)
        || has_bond_to(&particles.bonds[j], params.bond_centers, id_i)
    {
        return None;
    }
    Some(CollisionEvent {
        pp1: id_i.min(id_j),
        pp2: id_i.max(id_j),
        dist2,
    })
}

/// Rank-local collision queue.
#[derive(Debug, Clone, Default)]
pub struct CollisionQueue {
    events: Vec<CollisionEvent>,
    seen: FxHashSet<(ParticleId, ParticleId)>,
}

impl CollisionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all events; called once at the start of every step.
    pub fn clear(&mut self) {
        self.events.clear();
        self.seen.clear();
    }

    /// Record an event unless its pair is already queued.
    pub fn record(&mut self, event: CollisionEvent) -> bool {
        if !self.seen.insert((event.pp1, event.pp2)) {
            return false;
        }
        self.events.push(event);
        true
    }

    /// Queued events in detection order.
    pub fn events(&self) -> &[CollisionEvent] {
        &self.events
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Merge per-rank queues into one sorted, duplicate-free list.
pub fn merge_queues(queues: impl IntoIterator<Item = Vec<CollisionEvent>>) -> Vec<CollisionEvent> {
    let mut merged: Vec<CollisionEvent> = queues.into_iter().flatten().collect();
    merged.sort_by(|a, b| (a.pp1, a.pp2).cmp(&(b.pp1, b.pp2)));
    merged.dedup_by_key(|e| (e.pp1, e.pp2));
    merged
}

/// Bind the centres of every collided pair whose first particle is local.
///
/// Returns the number of bonds created.
pub fn bind_centers(cells: &mut dyn CellStructure, events: &[CollisionEvent], bond_id: usize) -> usize {
    let mut created = 0;
    for event in events {
        let Some(i) = cells.find(event.pp1) else {
            continue;
        };
        if cells.is_ghost(i) {
            continue;
        }
        let bonds = &mut cells.particles_mut().bonds[i];
        if has_bond_to(bonds, bond_id, event.pp2) {
            continue;
        }
        bonds.push(Bond::new(bond_id, &[event.pp2]));
        created += 1;
    }
    created
}
