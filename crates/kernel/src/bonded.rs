//! Bonded interactions and the bonded force evaluator.
//!
//! Bonds are stored on one particle and name their partners by id. The
//! evaluator walks the bonds of the local particles, resolves the partners
//! among local particles and ghosts, and returns the per-particle force
//! contributions together with the breakage events it observed.

use glam::DVec3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bond_breakage::{BondBreakage, QueueEntry};
use crate::cells::CellStructure;
use crate::error::{ConfigError, ForceError};
use crate::particle::ParticleArrays;

/// Distances below this are treated as coincident.
const ROUND_ERROR_PREC: f64 = 1.0e-14;

/// One bonded interaction type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondedInteraction {
    /// Harmonic spring; breaks beyond `r_cut` when `r_cut > 0`.
    Harmonic {
        /// Spring constant.
        k: f64,
        /// Rest length.
        r0: f64,
        /// Maximal length, `0` for unbounded.
        #[serde(default)]
        r_cut: f64,
    },
    /// Finitely extensible nonlinear elastic bond.
    Fene {
        /// Stiffness.
        k: f64,
        /// Maximal extension around `r0`.
        drmax: f64,
        /// Rest length.
        #[serde(default)]
        r0: f64,
    },
    /// Friction on the pair's centre-of-mass and relative motion.
    ThermalizedBond {
        /// Friction on the centre-of-mass velocity.
        gamma_com: f64,
        /// Friction on the relative velocity.
        gamma_distance: f64,
        /// Maximal length, `0` for unbounded.
        #[serde(default)]
        r_cut: f64,
    },
    /// Triangle of a closed surface whose area and volume are penalised globally.
    OifGlobalForces {
        /// Target surface area.
        a0_g: f64,
        /// Area stiffness.
        ka_g: f64,
        /// Target volume.
        v0: f64,
        /// Volume stiffness.
        kv: f64,
    },
    /// Triangle of a soft object subject to volume conservation.
    IbmTriangle {
        /// Soft object id.
        soft_id: i32,
    },
    /// Bond without force, used to keep particles in each other's ghost layers.
    Virtual,
}

impl BondedInteraction {
    /// Number of partners besides the particle storing the bond.
    pub fn n_partners(&self) -> usize {
        match self {
            Self::OifGlobalForces { .. } | Self::IbmTriangle { .. } => 2,
            _ => 1,
        }
    }

    /// Whether the bond is evaluated by a global-quantity stage rather than
    /// by the bonded loop.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::OifGlobalForces { .. } | Self::IbmTriangle { .. })
    }

    /// Range the bond needs partners within.
    pub fn cutoff(&self) -> f64 {
        match *self {
            Self::Harmonic { r0, r_cut, .. } => {
                if r_cut > 0.0 {
                    r_cut
                } else {
                    r0
                }
            }
            Self::Fene { drmax, r0, .. } => r0 + drmax,
            Self::ThermalizedBond { r_cut, .. } => r_cut.max(0.0),
            _ => 0.0,
        }
    }

    /// Check the constants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite_non_negative = |name: &'static str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::parameter(name, format!("must be a finite value >= 0, got {v}")))
            }
        };
        let positive = |name: &'static str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::parameter(name, format!("must be > 0, got {v}")))
            }
        };
        match *self {
            Self::Harmonic { k, r0, r_cut } => {
                finite_non_negative("k", k)?;
                finite_non_negative("r_0", r0)?;
                finite_non_negative("r_cut", r_cut)
            }
            Self::Fene { k, drmax, r0 } => {
                finite_non_negative("k", k)?;
                positive("d_r_max", drmax)?;
                finite_non_negative("r_0", r0)
            }
            Self::ThermalizedBond { gamma_com, gamma_distance, r_cut } => {
                finite_non_negative("gamma_com", gamma_com)?;
                finite_non_negative("gamma_distance", gamma_distance)?;
                finite_non_negative("r_cut", r_cut)
            }
            Self::OifGlobalForces { a0_g, ka_g, v0, kv } => {
                positive("A0_g", a0_g)?;
                finite_non_negative("ka_g", ka_g)?;
                positive("V0", v0)?;
                finite_non_negative("kv", kv)
            }
            Self::IbmTriangle { .. } | Self::Virtual => Ok(()),
        }
    }

    /// Forces on particle `i` and its partner `j` for `d = r_i - r_j`.
    ///
    /// `None` means the bond is over-stretched.
    pub fn pair_force(&self, p: &ParticleArrays, i: usize, j: usize, d: DVec3, dist: f64) -> Option<(DVec3, DVec3)> {
        match *self {
            Self::Harmonic { k, r0, r_cut } => {
                if r_cut > 0.0 && dist > r_cut {
                    return None;
                }
                let fac = if dist > ROUND_ERROR_PREC { -k * (dist - r0) / dist } else { 0.0 };
                Some((fac * d, -fac * d))
            }
            Self::Fene { k, drmax, r0 } => {
                let dr = dist - r0;
                if dr >= drmax {
                    return None;
                }
                let mut fac = -k * dr / (1.0 - dr * dr / (drmax * drmax));
                fac = if dist > ROUND_ERROR_PREC { fac / dist } else { 0.0 };
                Some((fac * d, -fac * d))
            }
            Self::ThermalizedBond { gamma_com, gamma_distance, r_cut } => {
                if r_cut > 0.0 && dist > r_cut {
                    return None;
                }
                let (m1, m2) = (p.mass[i], p.mass[j]);
                let mass_tot = m1 + m2;
                let com_vel = (m1 * p.vel[i] + m2 * p.vel[j]) / mass_tot;
                let com_part = -gamma_com * com_vel;
                let dist_part = gamma_distance * (p.vel[j] - p.vel[i]);
                Some((m1 / mass_tot * com_part + dist_part, m2 / mass_tot * com_part - dist_part))
            }
            Self::OifGlobalForces { .. } | Self::IbmTriangle { .. } | Self::Virtual => Some((DVec3::ZERO, DVec3::ZERO)),
        }
    }
}

/// Bonded interaction types indexed by bond id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BondedInteractions {
    bonds: Vec<BondedInteraction>,
}

impl BondedInteractions {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validated bond type and return its id.
    pub fn add(&mut self, bond: BondedInteraction) -> Result<usize, ConfigError> {
        bond.validate()?;
        self.bonds.push(bond);
        Ok(self.bonds.len() - 1)
    }

    /// Bond type `id`.
    pub fn get(&self, id: usize) -> Option<&BondedInteraction> {
        self.bonds.get(id)
    }

    /// Number of bond types.
    pub fn len(&self) -> usize {
        self.bonds.len()
    }

    /// `true` if no bond type is registered.
    pub fn is_empty(&self) -> bool {
        self.bonds.is_empty()
    }

    /// All bond types in id order.
    pub fn iter(&self) -> impl Iterator<Item = &BondedInteraction> {
        self.bonds.iter()
    }

    /// Largest partner range over all bond types.
    pub fn max_cutoff(&self) -> f64 {
        self.bonds.iter().map(|b| b.cutoff()).fold(0.0, f64::max)
    }
}

/// Result of one pass of the bonded evaluator.
#[derive(Debug, Default)]
pub struct BondedOutcome {
    /// Force contributions `(particle index, force)`, in evaluation order.
    pub forces: Vec<(usize, DVec3)>,
    /// Breakage events observed.
    pub breakage: Vec<QueueEntry>,
    /// Number of bonds skipped because a partner was not available.
    pub missing_partners: usize,
}

impl BondedOutcome {
    /// Add the collected forces to `particles`.
    pub fn apply(&self, particles: &mut ParticleArrays) {
        for &(i, f) in &self.forces {
            particles.force[i] += f;
        }
    }
}

/// Evaluate the pair bonds of every local particle.
///
/// A bond whose partner is not visible contributes nothing and is queued if
/// breakable. A bond at or beyond its breakage length is queued instead of
/// evaluated. An over-stretched bond without a breakage rule is an error.
pub fn compute_bonded_forces(
    cells: &dyn CellStructure,
    bonded: &BondedInteractions,
    breakage: &BondBreakage,
) -> Result<BondedOutcome, ForceError> {
    let particles = cells.particles();
    let per_particle: Vec<BondedOutcome> = cells
        .local_range()
        .into_par_iter()
        .map(|i| -> Result<BondedOutcome, ForceError> {
            let mut out = BondedOutcome::default();
            for bond in &particles.bonds[i] {
                let Some(kind) = bonded.get(bond.bond_id) else {
                    tracing::warn!("particle {} has unknown bond type {}", particles.id[i], bond.bond_id);
                    continue;
                };
                if kind.is_global() {
                    continue;
                }
                let Some(&partner) = bond.partners.first() else {
                    continue;
                };
                let Some(j) = cells.find(partner) else {
                    out.missing_partners += 1;
                    out.breakage
                        .extend(breakage.check_missing_partner(particles.id[i], partner, bond.bond_id));
                    continue;
                };
                let d = particles.pos[i] - particles.pos[j];
                let dist = d.length();
                if let Some(entry) = breakage.check(particles.id[i], partner, bond.bond_id, dist) {
                    out.breakage.push(entry);
                    continue;
                }
                let (f1, f2) = kind.pair_force(particles, i, j, d, dist).ok_or(ForceError::BondBroken {
                    id: particles.id[i],
                    partner,
                    bond_id: bond.bond_id,
                })?;
                out.forces.push((i, f1));
                out.forces.push((j, f2));
            }
            Ok(out)
        })
        .collect::<Result<_, _>>()?;

    let mut outcome = BondedOutcome::default();
    for part in per_particle {
        outcome.forces.extend(part.forces);
        outcome.breakage.extend(part.breakage);
        outcome.missing_partners += part.missing_partners;
    }
    if outcome.missing_partners > 0 {
        tracing::warn!("{} bonds skipped: partner not available on this rank", outcome.missing_partners);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bond_breakage::{BreakageAction, BreakageSpec};
    use crate::cells::LocalCells;
    use crate::particle::{Bond, Particle};

    fn bonded_pair(bond: BondedInteraction, dist: f64) -> (LocalCells, BondedInteractions) {
        let mut table = BondedInteractions::new();
        let id = table.add(bond).unwrap();
        let cells = LocalCells::from_particles([
            Particle::new(0, DVec3::ZERO).with_bond(Bond::new(id, &[1])),
            Particle::new(1, DVec3::new(dist, 0.0, 0.0)),
        ]);
        (cells, table)
    }

    #[test]
    fn harmonic_pulls_stretched_pair_together() {
        let (cells, table) = bonded_pair(BondedInteraction::Harmonic { k: 2.0, r0: 1.0, r_cut: 0.0 }, 1.5);
        let out = compute_bonded_forces(&cells, &table, &BondBreakage::new()).unwrap();
        assert_eq!(out.forces.len(), 2);
        assert!((out.forces[0].1.x - 1.0).abs() < 1e-14);
        assert!((out.forces[1].1.x + 1.0).abs() < 1e-14);
    }

    #[test]
    fn fene_overstretch_is_fatal_without_breakage_rule() {
        let (cells, table) = bonded_pair(BondedInteraction::Fene { k: 1.0, drmax: 1.0, r0: 0.0 }, 1.2);
        let err = compute_bonded_forces(&cells, &table, &BondBreakage::new()).unwrap_err();
        assert_eq!(err, ForceError::BondBroken { id: 0, partner: 1, bond_id: 0 });
    }

    #[test]
    fn breakable_bond_is_queued_instead_of_evaluated() {
        let (cells, table) = bonded_pair(BondedInteraction::Fene { k: 1.0, drmax: 1.0, r0: 0.0 }, 1.2);
        let mut breakage = BondBreakage::new();
        breakage.insert_spec(0, BreakageSpec { breakage_length: 1.1, action: BreakageAction::DeleteBond });
        let out = compute_bonded_forces(&cells, &table, &breakage).unwrap();
        assert!(out.forces.is_empty());
        assert_eq!(out.breakage.len(), 1);
    }

    #[test]
    fn missing_partner_contributes_nothing() {
        let mut table = BondedInteractions::new();
        table.add(BondedInteraction::Harmonic { k: 1.0, r0: 1.0, r_cut: 0.0 }).unwrap();
        let cells = LocalCells::from_particles([Particle::new(0, DVec3::ZERO).with_bond(Bond::new(0, &[42]))]);
        let mut breakage = BondBreakage::new();
        let out = compute_bonded_forces(&cells, &table, &breakage).unwrap();
        assert!(out.forces.is_empty());
        assert!(out.breakage.is_empty());
        assert_eq!(out.missing_partners, 1);

        breakage.insert_spec(0, BreakageSpec { breakage_length: 5.0, action: BreakageAction::DeleteBond });
        let out = compute_bonded_forces(&cells, &table, &breakage).unwrap();
        assert_eq!(out.breakage.len(), 1);
    }

    #[test]
    fn thermalized_bond_damps_relative_motion() {
        let mut table = BondedInteractions::new();
        table
            .add(BondedInteraction::ThermalizedBond { gamma_com: 0.0, gamma_distance: 2.0, r_cut: 0.0 })
            .unwrap();
        let mut a = Particle::new(0, DVec3::ZERO).with_bond(Bond::new(0, &[1]));
        a.vel = DVec3::new(1.0, 0.0, 0.0);
        let b = Particle::new(1, DVec3::X);
        let cells = LocalCells::from_particles([a, b]);
        let out = compute_bonded_forces(&cells, &table, &BondBreakage::new()).unwrap();
        assert!(out.forces[0].1.x < 0.0);
        assert!((out.forces[0].1 + out.forces[1].1).length() < 1e-15);
    }

    #[test]
    fn validation_rejects_bad_constants() {
        assert!(BondedInteraction::Fene { k: 1.0, drmax: 0.0, r0: 0.0 }.validate().is_err());
        assert!(BondedInteraction::OifGlobalForces { a0_g: 0.0, ka_g: 1.0, v0: 1.0, kv: 1.0 }.validate().is_err());
        assert!(BondedInteraction::Virtual.validate().is_ok());
    }
}
