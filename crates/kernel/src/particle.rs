//! Particle data structures using struct-of-arrays layout.
//!
//! A [`ParticleArrays`] holds the particles owned by one rank followed by the
//! ghost replicas it received from its neighbors. The [`Particle`] record is
//! the array-of-structs form used for construction, migration and ghost
//! creation.

use std::ops::Range;

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::propagation::PropagationMode;

/// Stable particle identity, unique across all ranks.
pub type ParticleId = u64;

/// One bond stored on the particle that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    /// Index into the bonded interaction table.
    pub bond_id: usize,
    /// Ids of the other particles taking part in the bond.
    pub partners: SmallVec<[ParticleId; 2]>,
}

impl Bond {
    /// Create a bond of type `bond_id` with the given partners.
    pub fn new(bond_id: usize, partners: &[ParticleId]) -> Self {
        Self {
            bond_id,
            partners: SmallVec::from_slice(partners),
        }
    }
}

/// Self-propulsion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Swimming {
    /// Magnitude of the propulsion force along the director.
    pub f_swim: f64,
    /// Whether the particle swims at all.
    pub swimming: bool,
    /// When set, the engine force is applied to the fluid instead of the particle.
    pub is_engine_force_on_fluid: bool,
}

/// Rigid placement of a virtual site relative to a physical particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VsRelative {
    /// Id of the physical reference particle.
    pub to_particle_id: ParticleId,
    /// Distance from the reference particle.
    pub distance: f64,
    /// Orientation of the connection vector in the reference's body frame.
    pub rel_orientation: DQuat,
    /// Orientation of the virtual site in the reference's body frame.
    pub quat: DQuat,
}

/// Array-of-structs particle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Stable id.
    pub id: ParticleId,
    /// Type index used for interaction lookup.
    pub ptype: i32,
    /// Molecule / object id.
    pub mol_id: i32,
    /// Mass.
    pub mass: f64,
    /// Position.
    pub pos: DVec3,
    /// Orientation (body frame to lab frame).
    pub quat: DQuat,
    /// Velocity.
    pub vel: DVec3,
    /// Angular velocity (lab frame).
    pub omega: DVec3,
    /// Accumulated force.
    pub force: DVec3,
    /// Accumulated torque (lab frame).
    pub torque: DVec3,
    /// Electric charge.
    pub charge: f64,
    /// Magnitude of the point dipole, oriented along the director.
    pub dipm: f64,
    /// Constant external force.
    pub ext_force: DVec3,
    /// Constant external torque.
    pub ext_torque: DVec3,
    /// Self-propulsion parameters.
    pub swimming: Swimming,
    /// Whether this is a virtual site.
    pub is_virtual: bool,
    /// Relative virtual-site relation, if any.
    pub vs_relative: Option<VsRelative>,
    /// How this particle is propagated.
    pub propagation: PropagationMode,
    /// Bonds stored on this particle.
    pub bonds: Vec<Bond>,
}

impl Particle {
    /// Create a unit-mass, uncharged particle of type 0 at `pos`.
    pub fn new(id: ParticleId, pos: DVec3) -> Self {
        Self {
            id,
            ptype: 0,
            mol_id: 0,
            mass: 1.0,
            pos,
            quat: DQuat::IDENTITY,
            vel: DVec3::ZERO,
            omega: DVec3::ZERO,
            force: DVec3::ZERO,
            torque: DVec3::ZERO,
            charge: 0.0,
            dipm: 0.0,
            ext_force: DVec3::ZERO,
            ext_torque: DVec3::ZERO,
            swimming: Swimming::default(),
            is_virtual: false,
            vs_relative: None,
            propagation: PropagationMode::SYSTEM_DEFAULT,
            bonds: Vec::new(),
        }
    }

    /// Set the type index.
    pub fn with_type(mut self, ptype: i32) -> Self {
        self.ptype = ptype;
        self
    }

    /// Set the charge.
    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge;
        self
    }

    /// Set the mass.
    pub fn with_mass(mut self, mass: f64) -> Self {
        self.mass = mass;
        self
    }

    /// Set the orientation.
    pub fn with_quat(mut self, quat: DQuat) -> Self {
        self.quat = quat;
        self
    }

    /// Set the external force.
    pub fn with_ext_force(mut self, ext_force: DVec3) -> Self {
        self.ext_force = ext_force;
        self
    }

    /// Add a bond.
    pub fn with_bond(mut self, bond: Bond) -> Self {
        self.bonds.push(bond);
        self
    }

    /// Director: the body z axis in the lab frame.
    pub fn director(&self) -> DVec3 {
        self.quat * DVec3::Z
    }
}

/// Per-step state refreshed on ghost replicas without a full resort.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GhostState {
    /// Position.
    pub pos: DVec3,
    /// Orientation.
    pub quat: DQuat,
    /// Velocity.
    pub vel: DVec3,
    /// Angular velocity.
    pub omega: DVec3,
    /// Charge (changes under induced-charge iteration).
    pub charge: f64,
}

/// Saved force and torque fields, used to evaluate a provisional force state
/// without disturbing the accumulated one.
#[derive(Debug, Clone)]
pub struct ForceSnapshot {
    force: Vec<DVec3>,
    torque: Vec<DVec3>,
}

/// Struct-of-arrays particle storage.
///
/// All arrays are parallel: index `i` across every array refers to the same particle.
#[derive(Debug, Clone, Default)]
pub struct ParticleArrays {
    // ---- Identity ----
    /// Particle ids.
    pub id: Vec<ParticleId>,
    /// Type indices.
    pub ptype: Vec<i32>,
    /// Molecule / object ids.
    pub mol_id: Vec<i32>,
    /// Masses.
    pub mass: Vec<f64>,

    // ---- Kinematics ----
    /// Positions.
    pub pos: Vec<DVec3>,
    /// Orientations.
    pub quat: Vec<DQuat>,
    /// Velocities.
    pub vel: Vec<DVec3>,
    /// Angular velocities.
    pub omega: Vec<DVec3>,

    // ---- Accumulators ----
    /// Forces.
    pub force: Vec<DVec3>,
    /// Torques.
    pub torque: Vec<DVec3>,

    // ---- Electromagnetic properties ----
    /// Charges.
    pub charge: Vec<f64>,
    /// Dipole magnitudes.
    pub dipm: Vec<f64>,

    // ---- External drive ----
    /// External forces.
    pub ext_force: Vec<DVec3>,
    /// External torques.
    pub ext_torque: Vec<DVec3>,
    /// Self-propulsion parameters.
    pub swimming: Vec<Swimming>,

    // ---- Virtual sites and topology ----
    /// Virtual flags.
    pub is_virtual: Vec<bool>,
    /// Relative virtual-site relations.
    pub vs_relative: Vec<Option<VsRelative>>,
    /// Propagation modes.
    pub propagation: Vec<PropagationMode>,
    /// Bond lists.
    pub bonds: Vec<Vec<Bond>>,
}

impl ParticleArrays {
    /// Create an empty particle collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the number of particles currently stored.
    pub fn len(&self) -> usize {
        self.id.len()
    }

    /// Return `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// Append a particle record.
    pub fn push(&mut self, p: Particle) {
        self.id.push(p.id);
        self.ptype.push(p.ptype);
        self.mol_id.push(p.mol_id);
        self.mass.push(p.mass);
        self.pos.push(p.pos);
        self.quat.push(p.quat);
        self.vel.push(p.vel);
        self.omega.push(p.omega);
        self.force.push(p.force);
        self.torque.push(p.torque);
        self.charge.push(p.charge);
        self.dipm.push(p.dipm);
        self.ext_force.push(p.ext_force);
        self.ext_torque.push(p.ext_torque);
        self.swimming.push(p.swimming);
        self.is_virtual.push(p.is_virtual);
        self.vs_relative.push(p.vs_relative);
        self.propagation.push(p.propagation);
        self.bonds.push(p.bonds);
    }

    /// Copy particle `i` out as a record.
    pub fn particle(&self, i: usize) -> Particle {
        Particle {
            id: self.id[i],
            ptype: self.ptype[i],
            mol_id: self.mol_id[i],
            mass: self.mass[i],
            pos: self.pos[i],
            quat: self.quat[i],
            vel: self.vel[i],
            omega: self.omega[i],
            force: self.force[i],
            torque: self.torque[i],
            charge: self.charge[i],
            dipm: self.dipm[i],
            ext_force: self.ext_force[i],
            ext_torque: self.ext_torque[i],
            swimming: self.swimming[i],
            is_virtual: self.is_virtual[i],
            vs_relative: self.vs_relative[i],
            propagation: self.propagation[i],
            bonds: self.bonds[i].clone(),
        }
    }

    /// Drop every particle at index `n` and above.
    pub fn truncate(&mut self, n: usize) {
        self.id.truncate(n);
        self.ptype.truncate(n);
        self.mol_id.truncate(n);
        self.mass.truncate(n);
        self.pos.truncate(n);
        self.quat.truncate(n);
        self.vel.truncate(n);
        self.omega.truncate(n);
        self.force.truncate(n);
        self.torque.truncate(n);
        self.charge.truncate(n);
        self.dipm.truncate(n);
        self.ext_force.truncate(n);
        self.ext_torque.truncate(n);
        self.swimming.truncate(n);
        self.is_virtual.truncate(n);
        self.vs_relative.truncate(n);
        self.propagation.truncate(n);
        self.bonds.truncate(n);
    }

    /// Director of particle `i`.
    #[inline]
    pub fn director(&self, i: usize) -> DVec3 {
        self.quat[i] * DVec3::Z
    }

    /// Dipole moment of particle `i`.
    #[inline]
    pub fn dipole(&self, i: usize) -> DVec3 {
        self.dipm[i] * self.director(i)
    }

    /// State sent to ghost replicas of particle `i` on every step.
    pub fn ghost_state(&self, i: usize) -> GhostState {
        GhostState {
            pos: self.pos[i],
            quat: self.quat[i],
            vel: self.vel[i],
            omega: self.omega[i],
            charge: self.charge[i],
        }
    }

    /// Overwrite the per-step state of ghost `i`.
    pub fn apply_ghost_state(&mut self, i: usize, state: &GhostState) {
        self.pos[i] = state.pos;
        self.quat[i] = state.quat;
        self.vel[i] = state.vel;
        self.omega[i] = state.omega;
        self.charge[i] = state.charge;
    }

    /// Set force and torque of every particle in `range` to zero.
    pub fn zero_forces(&mut self, range: Range<usize>) {
        for i in range {
            self.force[i] = DVec3::ZERO;
            self.torque[i] = DVec3::ZERO;
        }
    }

    /// Save the force and torque fields.
    pub fn snapshot_forces(&self) -> ForceSnapshot {
        ForceSnapshot {
            force: self.force.clone(),
            torque: self.torque.clone(),
        }
    }

    /// Restore force and torque fields saved by [`Self::snapshot_forces`].
    ///
    /// The particle count must not have changed in between.
    pub fn restore_forces(&mut self, snapshot: ForceSnapshot) {
        debug_assert_eq!(snapshot.force.len(), self.len());
        self.force = snapshot.force;
        self.torque = snapshot.torque;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_empty() {
        let p = ParticleArrays::new();
        assert_eq!(p.len(), 0);
        assert!(p.is_empty());
    }

    #[test]
    fn push_and_read_back() {
        let mut arrays = ParticleArrays::new();
        let record = Particle::new(7, DVec3::new(1.0, 2.0, 3.0))
            .with_type(2)
            .with_charge(-1.5)
            .with_bond(Bond::new(0, &[8]));
        arrays.push(record.clone());
        assert_eq!(arrays.len(), 1);
        assert_eq!(arrays.particle(0), record);
    }

    #[test]
    fn director_follows_orientation() {
        let mut arrays = ParticleArrays::new();
        let quat = DQuat::from_rotation_y(std::f64::consts::FRAC_PI_2);
        arrays.push(Particle::new(0, DVec3::ZERO).with_quat(quat));
        let u = arrays.director(0);
        assert!((u - DVec3::X).length() < 1e-12, "director was {u:?}");
    }

    #[test]
    fn snapshot_restores_forces() {
        let mut arrays = ParticleArrays::new();
        arrays.push(Particle::new(0, DVec3::ZERO));
        arrays.force[0] = DVec3::X;
        let saved = arrays.snapshot_forces();
        arrays.force[0] = DVec3::Y;
        arrays.restore_forces(saved);
        assert_eq!(arrays.force[0], DVec3::X);
    }
}
