//! Centre-of-mass fixing.
//!
//! For every fixed type the total force on that type is removed, each
//! particle giving up a share proportional to its mass. The per-type sums
//! are rank-local here; the caller reduces them across ranks.

use std::ops::Range;

use glam::DVec3;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::particle::ParticleArrays;

/// Per-type `[fx, fy, fz, mass]` sums, indexed by type.
pub type TypeSums = Vec<[f64; 4]>;

/// Set of types whose centre of mass is held fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComFixed {
    types: Vec<i32>,
}

impl ComFixed {
    /// Fix the given types; negative types are ignored.
    pub fn new(types: impl IntoIterator<Item = i32>) -> Self {
        let unique: FxHashSet<i32> = types.into_iter().filter(|t| *t >= 0).collect();
        let mut types: Vec<i32> = unique.into_iter().collect();
        types.sort_unstable();
        Self { types }
    }

    /// Fixed types in ascending order.
    pub fn types(&self) -> &[i32] {
        &self.types
    }

    /// `true` if no type is fixed.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn slot(&self, ptype: i32) -> Option<usize> {
        self.types.binary_search(&ptype).ok()
    }

    /// Local force and mass sums of the fixed types, one entry per fixed type.
    pub fn local_sums(&self, p: &ParticleArrays, local: Range<usize>) -> TypeSums {
        let mut sums = vec![[0.0; 4]; self.types.len()];
        for i in local {
            let Some(slot) = self.slot(p.ptype[i]) else {
                continue;
            };
            let f = p.force[i];
            let s = &mut sums[slot];
            s[0] += f.x;
            s[1] += f.y;
            s[2] += f.z;
            s[3] += p.mass[i];
        }
        sums
    }

    /// Subtract `m / M_type * F_type` from every local particle of a fixed
    /// type, given the globally reduced sums.
    pub fn apply(&self, p: &mut ParticleArrays, local: Range<usize>, totals: &[[f64; 4]]) {
        for i in local {
            let Some(slot) = self.slot(p.ptype[i]) else {
                continue;
            };
            let [fx, fy, fz, mass] = totals[slot];
            if mass <= 0.0 {
                continue;
            }
            p.force[i] -= p.mass[i] / mass * DVec3::new(fx, fy, fz);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Particle;

    #[test]
    fn fixed_type_total_force_vanishes() {
        let mut p = ParticleArrays::new();
        p.push(Particle::new(0, DVec3::ZERO).with_type(1).with_mass(1.0));
        p.push(Particle::new(1, DVec3::X).with_type(1).with_mass(3.0));
        p.push(Particle::new(2, DVec3::Y).with_type(0));
        p.force[0] = DVec3::new(4.0, 0.0, 0.0);
        p.force[1] = DVec3::new(0.0, 8.0, 0.0);
        p.force[2] = DVec3::new(1.0, 1.0, 1.0);

        let com = ComFixed::new([1, 1, -3]);
        assert_eq!(com.types(), &[1]);
        let sums = com.local_sums(&p, 0..3);
        assert_eq!(sums, vec![[4.0, 8.0, 0.0, 4.0]]);
        com.apply(&mut p, 0..3, &sums);

        let total = p.force[0] + p.force[1];
        assert!(total.length() < 1e-12);
        assert!((p.force[0] - DVec3::new(3.0, -2.0, 0.0)).length() < 1e-12);
        assert_eq!(p.force[2], DVec3::new(1.0, 1.0, 1.0));
    }
}
