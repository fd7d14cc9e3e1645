//! Particle-fluid coupling and thermostat hooks.
//!
//! The fluid solver itself lives outside the force pipeline. It is reached
//! through [`FluidCoupling`], which sees owned particles and ghosts and adds
//! its force in place.

use std::ops::Range;

use glam::DVec3;

use crate::particle::ParticleArrays;

/// Coupling of particles to a background fluid.
pub trait FluidCoupling: Send {
    /// Add the fluid force to the owned particles.
    ///
    /// Ghosts are passed for schemes that interpolate over neighbors; their
    /// forces are reduced to the owners afterwards.
    fn couple(&mut self, particles: &mut ParticleArrays, owned: Range<usize>, ghosts: Range<usize>, time_step: f64);
}

/// Stokes drag in a uniform flow, `F = gamma (u - v)`.
///
/// Swimmers whose engine acts on the fluid feel no drag here; their
/// propulsion is handed to the fluid instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformFlowCoupling {
    /// Friction coefficient.
    pub gamma: f64,
    /// Fluid velocity.
    pub fluid_velocity: DVec3,
    /// Momentum transferred to the fluid so far.
    pub momentum_to_fluid: DVec3,
}

impl UniformFlowCoupling {
    /// Drag with friction `gamma` in a flow of velocity `fluid_velocity`.
    pub fn new(gamma: f64, fluid_velocity: DVec3) -> Self {
        Self {
            gamma,
            fluid_velocity,
            momentum_to_fluid: DVec3::ZERO,
        }
    }
}

impl FluidCoupling for UniformFlowCoupling {
    fn couple(&mut self, p: &mut ParticleArrays, owned: Range<usize>, _ghosts: Range<usize>, time_step: f64) {
        for i in owned {
            if p.is_virtual[i] {
                continue;
            }
            let swim = p.swimming[i];
            if swim.swimming && swim.is_engine_force_on_fluid {
                self.momentum_to_fluid += swim.f_swim * p.director(i) * time_step;
                continue;
            }
            let drag = self.gamma * (self.fluid_velocity - p.vel[i]);
            p.force[i] += drag;
            self.momentum_to_fluid -= drag * time_step;
        }
    }
}

/// Thermostat seam. Noise generation stays outside the pipeline; the hook
/// only learns the thermal energy and step length of the coming evaluation.
pub trait Thermostat: Send {
    /// Called once per force evaluation right after force initialisation.
    fn force_init(&mut self, kt: f64, time_step: f64);
}

/// Thermostat that records what it was told, for runs without noise.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AthermalThermostat {
    /// Thermal energy of the last evaluation.
    pub kt: f64,
    /// Step length of the last evaluation.
    pub time_step: f64,
    /// Number of evaluations seen.
    pub calls: u64,
}

impl Thermostat for AthermalThermostat {
    fn force_init(&mut self, kt: f64, time_step: f64) {
        self.kt = kt;
        self.time_step = time_step;
        self.calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{Particle, Swimming};

    #[test]
    fn drag_relaxes_towards_flow() {
        let mut p = ParticleArrays::new();
        let mut moving = Particle::new(0, DVec3::ZERO);
        moving.vel = DVec3::new(1.0, 0.0, 0.0);
        p.push(moving);
        let mut vs = Particle::new(1, DVec3::X);
        vs.is_virtual = true;
        p.push(vs);
        let mut lb = UniformFlowCoupling::new(2.0, DVec3::new(0.0, 0.5, 0.0));
        lb.couple(&mut p, 0..2, 2..2, 0.1);
        assert!((p.force[0] - DVec3::new(-2.0, 1.0, 0.0)).length() < 1e-12);
        assert_eq!(p.force[1], DVec3::ZERO);
        assert!((lb.momentum_to_fluid - DVec3::new(0.2, -0.1, 0.0)).length() < 1e-12);
    }

    #[test]
    fn engine_on_fluid_is_handed_to_the_fluid() {
        let mut p = ParticleArrays::new();
        let mut swimmer = Particle::new(0, DVec3::ZERO);
        swimmer.swimming = Swimming { f_swim: 3.0, swimming: true, is_engine_force_on_fluid: true };
        p.push(swimmer);
        let mut lb = UniformFlowCoupling::new(1.0, DVec3::X);
        lb.couple(&mut p, 0..1, 1..1, 1.0);
        assert_eq!(p.force[0], DVec3::ZERO);
        assert!((lb.momentum_to_fluid - DVec3::new(0.0, 0.0, 3.0)).length() < 1e-12);
    }

    #[test]
    fn thermostat_hook_records_step() {
        let mut t = AthermalThermostat::default();
        t.force_init(1.5, 0.01);
        assert_eq!((t.kt, t.time_step, t.calls), (1.5, 0.01, 1));
    }
}
