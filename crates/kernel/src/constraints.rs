//! Constraints: external and geometry-defined forces on local particles.
//!
//! Shape constraints interact with particles through the non-bonded table,
//! as if the closest surface point were a particle of the constraint's type.

use std::ops::Range;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::ForceError;
use crate::interaction::InteractionTable;
use crate::particle::ParticleArrays;

/// Geometry of a shape constraint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Plane `pos · normal = dist`; particles live on the side the normal points to.
    Wall {
        /// Unit normal.
        normal: DVec3,
        /// Offset along the normal.
        dist: f64,
    },
    /// Sphere; `direction = 1` keeps particles outside, `-1` inside.
    Sphere {
        /// Centre.
        center: DVec3,
        /// Radius.
        radius: f64,
        /// Which side is allowed.
        direction: f64,
    },
}

impl Shape {
    /// Signed distance to the surface and the vector from the closest
    /// surface point to `pos`.
    pub fn distance(&self, pos: DVec3) -> (f64, DVec3) {
        match *self {
            Shape::Wall { normal, dist } => {
                let d = pos.dot(normal) - dist;
                (d, normal * d)
            }
            Shape::Sphere { center, radius, direction } => {
                let del = pos - center;
                let len = del.length();
                let gap = len - radius;
                let vec = if len > 0.0 { del * (gap / len) } else { DVec3::ZERO };
                (direction * gap, vec)
            }
        }
    }
}

/// One constraint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Surface interacting through the non-bonded table.
    Shape {
        /// Geometry.
        shape: Shape,
        /// Type used for the table lookup.
        particle_type: i32,
        /// Whether particles may cross the surface.
        #[serde(default)]
        penetrable: bool,
        /// For penetrable shapes, only act on the allowed side.
        #[serde(default)]
        only_positive: bool,
    },
    /// Uniform acceleration: `F = m g`.
    Gravity {
        /// Acceleration.
        g: DVec3,
    },
    /// `F = q E0 sin(k · x - omega t + phi)`.
    ElectricPlaneWave {
        /// Amplitude.
        e0: DVec3,
        /// Wave vector.
        k: DVec3,
        /// Angular frequency.
        omega: f64,
        /// Phase.
        phi: f64,
    },
    /// Torque `mu × B` on dipolar particles.
    HomogeneousMagneticField {
        /// Field.
        b: DVec3,
    },
}

impl Constraint {
    fn add_force(
        &self,
        p: &mut ParticleArrays,
        i: usize,
        table: &InteractionTable,
        sim_time: f64,
    ) -> Result<(), ForceError> {
        match *self {
            Constraint::Shape { shape, particle_type, penetrable, only_positive } => {
                let ia = table.get(p.ptype[i], particle_type);
                if !ia.is_active() {
                    return Ok(());
                }
                let (dist, vec) = shape.distance(p.pos[i]);
                let (d, r) = if dist > 0.0 {
                    (vec, dist)
                } else if penetrable {
                    if only_positive || dist == 0.0 {
                        return Ok(());
                    }
                    (vec, -dist)
                } else {
                    return Err(ForceError::ConstraintViolated { id: p.id[i], dist });
                };
                if r >= ia.max_cut {
                    return Ok(());
                }
                let pf = ia.pair_force(p.director(i), DVec3::Z, d, r);
                p.force[i] += pf.force;
                p.torque[i] += pf.torque1;
            }
            Constraint::Gravity { g } => p.force[i] += p.mass[i] * g,
            Constraint::ElectricPlaneWave { e0, k, omega, phi } => {
                p.force[i] += p.charge[i] * e0 * (k.dot(p.pos[i]) - omega * sim_time + phi).sin();
            }
            Constraint::HomogeneousMagneticField { b } => {
                let torque = p.dipole(i).cross(b);
                p.torque[i] += torque;
            }
        }
        Ok(())
    }
}

/// All registered constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    constraints: Vec<Constraint>,
}

impl Constraints {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constraint.
    pub fn add(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    /// `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Add every constraint's contribution to the local particles.
    pub fn add_forces(
        &self,
        p: &mut ParticleArrays,
        local: Range<usize>,
        table: &InteractionTable,
        sim_time: f64,
    ) -> Result<(), ForceError> {
        for constraint in &self.constraints {
            for i in local.clone() {
                constraint.add_force(p, i, table, sim_time)?;
            }
        }
        Ok(())
    }
}
