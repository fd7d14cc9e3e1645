//! Force initialisation and force capping.

use std::ops::Range;

use glam::DVec3;

use crate::particle::ParticleArrays;

/// Force a particle carries before any interaction is evaluated: its
/// external force plus, for swimmers whose engine acts on the particle, the
/// propulsion force along the director.
pub fn external_force(p: &ParticleArrays, i: usize) -> DVec3 {
    let mut f = p.ext_force[i];
    let swim = &p.swimming[i];
    if swim.swimming && !swim.is_engine_force_on_fluid {
        f += swim.f_swim * p.director(i);
    }
    f
}

/// Reset the accumulators for a new evaluation.
///
/// Local particles start from their external force and torque, ghosts from
/// zero.
pub fn init_forces(p: &mut ParticleArrays, local: Range<usize>, ghosts: Range<usize>) {
    for i in local {
        p.force[i] = external_force(p, i);
        p.torque[i] = p.ext_torque[i];
    }
    p.zero_forces(ghosts);
}

/// Rescale every local force longer than `force_cap` to exactly that length.
///
/// Disabled for `force_cap <= 0`. Torques are never touched. Returns the
/// number of capped forces.
pub fn force_capping(p: &mut ParticleArrays, local: Range<usize>, force_cap: f64) -> usize {
    if force_cap <= 0.0 {
        return 0;
    }
    let cap_sq = force_cap * force_cap;
    let mut capped = 0;
    for f in &mut p.force[local] {
        let f_sq = f.length_squared();
        if f_sq > cap_sq {
            *f *= force_cap / f_sq.sqrt();
            capped += 1;
        }
    }
    capped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{Particle, Swimming};

    fn swimmer(on_fluid: bool) -> Particle {
        let mut p = Particle::new(0, DVec3::ZERO).with_ext_force(DVec3::new(1.0, 0.0, 0.0));
        p.swimming = Swimming { f_swim: 2.0, swimming: true, is_engine_force_on_fluid: on_fluid };
        p
    }

    #[test]
    fn init_adds_swim_force_along_director() {
        let mut p = ParticleArrays::new();
        p.push(swimmer(false));
        p.push(swimmer(true));
        p.push(Particle::new(2, DVec3::X));
        p.force[2] = DVec3::splat(5.0);
        p.ext_torque[0] = DVec3::Y;
        init_forces(&mut p, 0..2, 2..3);
        assert_eq!(p.force[0], DVec3::new(1.0, 0.0, 2.0));
        assert_eq!(p.torque[0], DVec3::Y);
        assert_eq!(p.force[1], DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(p.force[2], DVec3::ZERO, "ghosts start from zero");
    }

    #[test]
    fn capping_rescales_to_cap() {
        let mut p = ParticleArrays::new();
        p.push(Particle::new(0, DVec3::ZERO));
        p.push(Particle::new(1, DVec3::X));
        p.force[0] = DVec3::new(30.0, 40.0, 0.0);
        p.force[1] = DVec3::new(0.1, 0.0, 0.0);
        p.torque[0] = DVec3::splat(100.0);
        assert_eq!(force_capping(&mut p, 0..2, 10.0), 1);
        assert!((p.force[0] - DVec3::new(6.0, 8.0, 0.0)).length() < 1e-12);
        assert_eq!(p.force[1], DVec3::new(0.1, 0.0, 0.0));
        assert_eq!(p.torque[0], DVec3::splat(100.0));
    }

    #[test]
    fn capping_is_idempotent_and_disabled_at_zero() {
        let mut p = ParticleArrays::new();
        p.push(Particle::new(0, DVec3::ZERO));
        p.force[0] = DVec3::new(0.0, -50.0, 0.0);
        assert_eq!(force_capping(&mut p, 0..1, 0.0), 0);
        assert_eq!(p.force[0].y, -50.0);
        force_capping(&mut p, 0..1, 5.0);
        let once = p.force[0];
        force_capping(&mut p, 0..1, 5.0);
        assert!((p.force[0] - once).length() < 1e-14);
        assert!((p.force[0].length() - 5.0).abs() < 1e-12);
    }
}
