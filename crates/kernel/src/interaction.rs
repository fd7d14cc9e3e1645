//! Non-bonded interaction parameter table.
//!
//! Parameters are keyed by an unordered pair of particle types and stored in
//! upper-triangular order, so growing the table to admit a new type never
//! moves existing records.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::nonbonded::{GayBerne, LennardJones, PairForce};
use glam::DVec3;

/// Parameters of every non-bonded potential active between one type pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InteractionParams {
    /// Lennard-Jones contribution.
    pub lj: Option<LennardJones>,
    /// Gay-Berne contribution.
    pub gay_berne: Option<GayBerne>,
    /// Largest cutoff over the active contributions; `0.0` when none is active.
    pub max_cut: f64,
}

impl InteractionParams {
    /// Recompute [`Self::max_cut`] from the active contributions.
    pub fn recalc_max_cut(&mut self) {
        let lj = self.lj.map_or(0.0, |lj| lj.max_cutoff());
        let gb = self.gay_berne.map_or(0.0, |gb| gb.max_cutoff());
        self.max_cut = lj.max(gb);
    }

    /// `true` if any non-bonded potential is configured.
    pub fn is_active(&self) -> bool {
        self.max_cut > 0.0
    }

    /// Sum of all active contributions for directors `u1`, `u2` and
    /// separation `d = r1 - r2`.
    pub fn pair_force(&self, u1: DVec3, u2: DVec3, d: DVec3, dist: f64) -> PairForce {
        let mut out = PairForce::ZERO;
        if let Some(lj) = &self.lj {
            out.force += lj.pair_force(d, dist);
        }
        if let Some(gb) = &self.gay_berne {
            out += gb.pair_force(u1, u2, d, dist);
        }
        out
    }

    /// Sum of all active pair energies.
    pub fn pair_energy(&self, u1: DVec3, u2: DVec3, d: DVec3, dist: f64) -> f64 {
        let lj = self.lj.map_or(0.0, |lj| lj.pair_energy(dist));
        let gb = self.gay_berne.map_or(0.0, |gb| gb.pair_energy(u1, u2, d, dist));
        lj + gb
    }
}

/// Table of [`InteractionParams`] for every unordered type pair.
///
/// Every mutation bumps [`Self::version`] so cached neighbor lists can tell
/// that cutoffs may have changed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InteractionTable {
    n_types: usize,
    params: Vec<InteractionParams>,
    version: u64,
}

#[inline]
fn pair_index(a: usize, b: usize) -> usize {
    let (i, j) = if a <= b { (a, b) } else { (b, a) };
    j * (j + 1) / 2 + i
}

fn type_index(t: i32) -> Result<usize, ConfigError> {
    usize::try_from(t).map_err(|_| ConfigError::InvalidType(t))
}

impl InteractionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of types the table currently has slots for.
    pub fn n_types(&self) -> usize {
        self.n_types
    }

    /// Mutation counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Grow the table so that `max_type` has a slot.
    fn make_room(&mut self, max_type: usize) {
        if max_type < self.n_types {
            return;
        }
        self.n_types = max_type + 1;
        self.params
            .resize(self.n_types * (self.n_types + 1) / 2, InteractionParams::default());
    }

    /// Validate a type pair without mutating anything.
    pub fn check_types(a: i32, b: i32) -> Result<(usize, usize), ConfigError> {
        Ok((type_index(a)?, type_index(b)?))
    }

    /// Parameters for types `a` and `b`; inactive if either type has no slot.
    pub fn get(&self, a: i32, b: i32) -> InteractionParams {
        match (usize::try_from(a), usize::try_from(b)) {
            (Ok(a), Ok(b)) if a < self.n_types && b < self.n_types => self.params[pair_index(a, b)],
            _ => InteractionParams::default(),
        }
    }

    /// Store a complete record for types `a` and `b`.
    ///
    /// The record's `max_cut` is recomputed before it is stored.
    pub fn set(&mut self, a: i32, b: i32, mut params: InteractionParams) -> Result<(), ConfigError> {
        let (a, b) = Self::check_types(a, b)?;
        self.make_room(a.max(b));
        params.recalc_max_cut();
        self.params[pair_index(a, b)] = params;
        self.version += 1;
        Ok(())
    }

    /// Replace the Lennard-Jones contribution for types `a` and `b`.
    pub fn set_lennard_jones(&mut self, a: i32, b: i32, lj: LennardJones) -> Result<(), ConfigError> {
        let mut params = self.get_checked(a, b)?;
        params.lj = Some(lj);
        self.set(a, b, params)
    }

    /// Replace the Gay-Berne contribution for types `a` and `b`.
    pub fn set_gay_berne(&mut self, a: i32, b: i32, gb: GayBerne) -> Result<(), ConfigError> {
        let mut params = self.get_checked(a, b)?;
        params.gay_berne = Some(gb);
        self.set(a, b, params)
    }

    fn get_checked(&self, a: i32, b: i32) -> Result<InteractionParams, ConfigError> {
        Self::check_types(a, b)?;
        Ok(self.get(a, b))
    }

    /// Largest non-bonded cutoff over all type pairs.
    pub fn max_cut(&self) -> f64 {
        self.params.iter().map(|p| p.max_cut).fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lj(cut: f64) -> LennardJones {
        LennardJones::new(1.0, 1.0, cut, 0.0, 0.0).unwrap()
    }

    #[test]
    fn lookup_is_symmetric() {
        let mut table = InteractionTable::new();
        table.set_lennard_jones(2, 0, lj(2.5)).unwrap();
        assert_eq!(table.get(0, 2), table.get(2, 0));
        assert_eq!(table.get(0, 2).max_cut, 2.5);
        assert!(!table.get(1, 1).is_active());
    }

    #[test]
    fn growing_keeps_existing_records() {
        let mut table = InteractionTable::new();
        table.set_lennard_jones(0, 1, lj(1.5)).unwrap();
        table.set_lennard_jones(5, 5, lj(3.0)).unwrap();
        assert_eq!(table.n_types(), 6);
        assert_eq!(table.get(1, 0).max_cut, 1.5);
        assert_eq!(table.max_cut(), 3.0);
    }

    #[test]
    fn negative_type_is_rejected_without_mutation() {
        let mut table = InteractionTable::new();
        table.set_lennard_jones(0, 0, lj(2.5)).unwrap();
        let before = table.clone();
        let err = table.set_lennard_jones(-1, 0, lj(1.0)).unwrap_err();
        assert_eq!(err, ConfigError::InvalidType(-1));
        assert_eq!(table, before);
    }

    #[test]
    fn max_cut_covers_all_contributions() {
        let mut table = InteractionTable::new();
        table.set_lennard_jones(0, 0, lj(1.2)).unwrap();
        let gb = GayBerne::new(1.0, 1.0, 4.0, 3.0, 5.0, 2.0, 1.0).unwrap();
        table.set_gay_berne(0, 0, gb).unwrap();
        assert_eq!(table.get(0, 0).max_cut, 4.0);
    }

    #[test]
    fn version_bumps_on_mutation() {
        let mut table = InteractionTable::new();
        let v0 = table.version();
        table.set_lennard_jones(0, 0, lj(1.0)).unwrap();
        assert!(table.version() > v0);
    }
}
