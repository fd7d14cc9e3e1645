//! Bond breakage bookkeeping.
//!
//! Bond types with a [`BreakageSpec`] are breakable: when such a bond grows
//! beyond its breakage length, or its partner cannot be found, the bond is
//! queued instead of producing a force. The queue is cleared at the start of
//! every force evaluation and processed after it.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cells::CellStructure;
use crate::particle::ParticleId;

/// What to do with a queued bond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakageAction {
    /// Only record the event.
    None,
    /// Remove the bond from the particle that stores it.
    DeleteBond,
}

/// Breakage rule of one bond type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakageSpec {
    /// Bond length at and beyond which the bond breaks.
    pub breakage_length: f64,
    /// Action taken when processing the queue.
    pub action: BreakageAction,
}

/// One queued breakage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueEntry {
    /// Particle storing the bond.
    pub particle_id: ParticleId,
    /// First partner of the bond.
    pub bond_partner_id: ParticleId,
    /// Bonded interaction id.
    pub bond_type: usize,
}

/// Breakage specifications and the per-step queue.
#[derive(Debug, Clone, Default)]
pub struct BondBreakage {
    specs: FxHashMap<usize, BreakageSpec>,
    queue: Vec<QueueEntry>,
}

impl BondBreakage {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make bond type `bond_type` breakable.
    pub fn insert_spec(&mut self, bond_type: usize, spec: BreakageSpec) {
        self.specs.insert(bond_type, spec);
    }

    /// Breakage rule of `bond_type`, if any.
    pub fn spec(&self, bond_type: usize) -> Option<&BreakageSpec> {
        self.specs.get(&bond_type)
    }

    /// Drop all queued events.
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// Events queued during the current step.
    pub fn queue(&self) -> &[QueueEntry] {
        &self.queue
    }

    /// Queue events collected by the bonded evaluator.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = QueueEntry>) {
        self.queue.extend(entries);
    }

    /// Event for a bond of length `distance`, if it has to break.
    pub fn check(
        &self,
        particle_id: ParticleId,
        bond_partner_id: ParticleId,
        bond_type: usize,
        distance: f64,
    ) -> Option<QueueEntry> {
        let spec = self.specs.get(&bond_type)?;
        (distance >= spec.breakage_length).then_some(QueueEntry {
            particle_id,
            bond_partner_id,
            bond_type,
        })
    }

    /// Event for a breakable bond whose partner is not available.
    pub fn check_missing_partner(
        &self,
        particle_id: ParticleId,
        bond_partner_id: ParticleId,
        bond_type: usize,
    ) -> Option<QueueEntry> {
        self.specs.contains_key(&bond_type).then_some(QueueEntry {
            particle_id,
            bond_partner_id,
            bond_type,
        })
    }

    /// Apply the queued actions to locally owned particles.
    ///
    /// Returns the number of bonds removed.
    pub fn process_queue(&self, cells: &mut dyn CellStructure) -> usize {
        let mut removed = 0;
        for entry in &self.queue {
            let Some(spec) = self.specs.get(&entry.bond_type) else {
                continue;
            };
            if spec.action != BreakageAction::DeleteBond {
                continue;
            }
            let Some(i) = cells.find(entry.particle_id) else {
                continue;
            };
            if cells.is_ghost(i) {
                continue;
            }
            let bonds = &mut cells.particles_mut().bonds[i];
            if let Some(pos) = bonds
                .iter()
                .position(|b| b.bond_id == entry.bond_type && b.partners.first() == Some(&entry.bond_partner_id))
            {
                bonds.remove(pos);
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!("bond breakage removed {removed} bonds");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::LocalCells;
    use crate::particle::{Bond, Particle};
    use glam::DVec3;

    fn spec(length: f64) -> BreakageSpec {
        BreakageSpec {
            breakage_length: length,
            action: BreakageAction::DeleteBond,
        }
    }

    #[test]
    fn only_breakable_types_are_queued() {
        let mut bb = BondBreakage::new();
        bb.insert_spec(1, spec(2.0));
        assert!(bb.check(0, 1, 0, 10.0).is_none());
        assert!(bb.check(0, 1, 1, 1.9).is_none());
        assert!(bb.check(0, 1, 1, 2.0).is_some());
        assert!(bb.check_missing_partner(0, 1, 0).is_none());
        assert!(bb.check_missing_partner(0, 1, 1).is_some());
    }

    #[test]
    fn processing_deletes_queued_bond() {
        let mut bb = BondBreakage::new();
        bb.insert_spec(0, spec(1.0));
        let mut cells = LocalCells::from_particles([
            Particle::new(0, DVec3::ZERO).with_bond(Bond::new(0, &[1])),
            Particle::new(1, DVec3::X),
        ]);
        let entry = bb.check(0, 1, 0, 1.5);
        bb.extend(entry);
        assert_eq!(bb.process_queue(&mut cells), 1);
        assert!(cells.particles().bonds[0].is_empty());
        bb.clear_queue();
        assert!(bb.queue().is_empty());
    }
}
