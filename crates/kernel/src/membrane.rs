//! Forces derived from global quantities of closed triangulated surfaces.
//!
//! Each triangle is a bond stored on its first vertex with the other two
//! vertices as partners, oriented so that its normal points outwards. Only
//! triangles stored on local particles are summed, so every triangle counts
//! once across all ranks. The rank-local partial sums are reduced by the
//! caller; forces on ghost vertices reach their owners through ghost
//! reduction.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::bonded::{BondedInteraction, BondedInteractions};
use crate::cells::CellStructure;
use crate::particle::ParticleArrays;

// ---------------------------------------------------------------------------
// Triangle geometry
// ---------------------------------------------------------------------------

/// Area of triangle `(a, b, c)`.
pub fn triangle_area(a: DVec3, b: DVec3, c: DVec3) -> f64 {
    0.5 * (b - a).cross(c - a).length()
}

/// Signed volume of the tetrahedron spanned by the origin and `(a, b, c)`.
///
/// Summed over a closed, outward-oriented surface this is the enclosed volume.
pub fn triangle_volume(a: DVec3, b: DVec3, c: DVec3) -> f64 {
    a.dot(b.cross(c)) / 6.0
}

/// Gradient of [`triangle_area`] with respect to each vertex.
pub fn area_gradient(a: DVec3, b: DVec3, c: DVec3) -> [DVec3; 3] {
    let n = (b - a).cross(c - a).normalize_or_zero();
    [
        0.5 * n.cross(c - b),
        0.5 * n.cross(a - c),
        0.5 * n.cross(b - a),
    ]
}

/// Gradient of [`triangle_volume`] with respect to each vertex.
pub fn volume_gradient(a: DVec3, b: DVec3, c: DVec3) -> [DVec3; 3] {
    [b.cross(c) / 6.0, c.cross(a) / 6.0, a.cross(b) / 6.0]
}

#[derive(Debug, Clone, Copy)]
struct Triangle {
    vertices: [usize; 3],
    kind: BondedInteraction,
    mol_id: i32,
}

impl Triangle {
    fn positions(&self, p: &ParticleArrays) -> (DVec3, DVec3, DVec3) {
        let [a, b, c] = self.vertices;
        (p.pos[a], p.pos[b], p.pos[c])
    }
}

fn local_triangles(cells: &dyn CellStructure, bonded: &BondedInteractions) -> Vec<Triangle> {
    let p = cells.particles();
    let mut out = Vec::new();
    for i in cells.local_range() {
        for bond in &p.bonds[i] {
            let Some(kind) = bonded.get(bond.bond_id) else {
                continue;
            };
            if !kind.is_global() {
                continue;
            }
            let [p2, p3] = match bond.partners.as_slice() {
                [p2, p3] => [*p2, *p3],
                _ => continue,
            };
            let (Some(j), Some(k)) = (cells.find(p2), cells.find(p3)) else {
                tracing::warn!("triangle on particle {} is missing partner {} or {}", p.id[i], p2, p3);
                continue;
            };
            out.push(Triangle { vertices: [i, j, k], kind: *kind, mol_id: p.mol_id[i] });
        }
    }
    out
}

fn add_gradient_force(p: &mut ParticleArrays, vertices: [usize; 3], grad: [DVec3; 3], scale: f64) {
    for (v, g) in vertices.into_iter().zip(grad) {
        p.force[v] -= scale * g;
    }
}

// ---------------------------------------------------------------------------
// OIF global area and volume
// ---------------------------------------------------------------------------

/// Rank-local area and volume of every OIF object, indexed by molecule id.
///
/// The result is as long as one past the largest molecule id seen locally.
pub fn oif_local_partials(cells: &dyn CellStructure, bonded: &BondedInteractions) -> Vec<[f64; 2]> {
    let p = cells.particles();
    let mut partials: Vec<[f64; 2]> = Vec::new();
    for tri in local_triangles(cells, bonded) {
        if !matches!(tri.kind, BondedInteraction::OifGlobalForces { .. }) {
            continue;
        }
        let Ok(object) = usize::try_from(tri.mol_id) else {
            continue;
        };
        if partials.len() <= object {
            partials.resize(object + 1, [0.0; 2]);
        }
        let (a, b, c) = tri.positions(p);
        partials[object][0] += triangle_area(a, b, c);
        partials[object][1] += triangle_volume(a, b, c);
    }
    partials
}

/// Apply the area and volume penalty forces of object `object`, given its
/// reduced `[area, volume]`.
pub fn oif_apply_forces(
    cells: &mut dyn CellStructure,
    bonded: &BondedInteractions,
    object: usize,
    totals: [f64; 2],
) {
    let [area, volume] = totals;
    let triangles = local_triangles(&*cells, bonded);
    let p = cells.particles_mut();
    for tri in triangles {
        let BondedInteraction::OifGlobalForces { a0_g, ka_g, v0, kv } = tri.kind else {
            continue;
        };
        if usize::try_from(tri.mol_id).ok() != Some(object) {
            continue;
        }
        let (a, b, c) = tri.positions(p);
        add_gradient_force(p, tri.vertices, area_gradient(a, b, c), ka_g * (area - a0_g) / a0_g);
        add_gradient_force(p, tri.vertices, volume_gradient(a, b, c), kv * (volume - v0) / v0);
    }
}

// ---------------------------------------------------------------------------
// Volume conservation of soft objects
// ---------------------------------------------------------------------------

/// Volume conservation of one soft object built from IBM triangles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeConservation {
    /// Soft object id matched against the triangles' `soft_id`.
    pub soft_id: i32,
    /// Stiffness.
    pub kappa_v: f64,
    /// Reference volume; taken from the first evaluation when unset.
    #[serde(default)]
    pub target: Option<f64>,
}

impl VolumeConservation {
    /// Rank-local volume of this object.
    pub fn local_volume(&self, cells: &dyn CellStructure, bonded: &BondedInteractions) -> f64 {
        let p = cells.particles();
        local_triangles(cells, bonded)
            .into_iter()
            .filter(|tri| matches!(tri.kind, BondedInteraction::IbmTriangle { soft_id } if soft_id == self.soft_id))
            .map(|tri| {
                let (a, b, c) = tri.positions(p);
                triangle_volume(a, b, c)
            })
            .sum()
    }

    /// Apply `-kappa_v (V - V0) / V0 dV/dx`, given the reduced volume.
    pub fn apply(&mut self, cells: &mut dyn CellStructure, bonded: &BondedInteractions, volume: f64) {
        let soft_id = self.soft_id;
        let v0 = *self.target.get_or_insert_with(|| {
            tracing::info!("volume conservation: soft object {soft_id} reference volume {volume}");
            volume
        });
        if v0 == 0.0 {
            return;
        }
        let scale = self.kappa_v * (volume - v0) / v0;
        let triangles = local_triangles(&*cells, bonded);
        let p = cells.particles_mut();
        for tri in triangles {
            if !matches!(tri.kind, BondedInteraction::IbmTriangle { soft_id } if soft_id == self.soft_id) {
                continue;
            }
            let (a, b, c) = tri.positions(p);
            add_gradient_force(p, tri.vertices, volume_gradient(a, b, c), scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::LocalCells;
    use crate::particle::{Bond, Particle};

    const OFFSET: DVec3 = DVec3::new(0.3, -0.2, 0.5);

    /// Unit corner tetrahedron with outward-oriented faces.
    fn tetrahedron(bond_id: usize, scale: f64) -> LocalCells {
        let corners = [DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z];
        let faces: [(u64, u64, u64); 4] = [(0, 2, 1), (0, 1, 3), (0, 3, 2), (1, 2, 3)];
        let mut particles: Vec<Particle> = corners
            .iter()
            .enumerate()
            .map(|(id, c)| Particle::new(id as u64, OFFSET + scale * *c))
            .collect();
        for (a, b, c) in faces {
            particles[a as usize].bonds.push(Bond::new(bond_id, &[b, c]));
        }
        LocalCells::from_particles(particles)
    }

    fn oif_bonds(v0: f64) -> BondedInteractions {
        let mut bonded = BondedInteractions::new();
        bonded
            .add(BondedInteraction::OifGlobalForces { a0_g: 1.0, ka_g: 0.0, v0, kv: 1.0 })
            .unwrap();
        bonded
    }

    #[test]
    fn closed_surface_volume_and_area() {
        let cells = tetrahedron(0, 1.0);
        let partials = oif_local_partials(&cells, &oif_bonds(1.0));
        assert_eq!(partials.len(), 1);
        let expected_area = 1.5 + 3.0_f64.sqrt() / 2.0;
        assert!((partials[0][0] - expected_area).abs() < 1e-12);
        assert!((partials[0][1] - 1.0 / 6.0).abs() < 1e-12, "volume {}", partials[0][1]);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let (a, b, c) = (DVec3::new(0.1, 0.2, 0.0), DVec3::new(1.3, -0.1, 0.4), DVec3::new(0.2, 0.9, 0.7));
        let h = 1e-6;
        let ga = area_gradient(a, b, c)[0];
        let gv = volume_gradient(a, b, c)[0];
        for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
            let fd_a = (triangle_area(a + h * axis, b, c) - triangle_area(a - h * axis, b, c)) / (2.0 * h);
            let fd_v = (triangle_volume(a + h * axis, b, c) - triangle_volume(a - h * axis, b, c)) / (2.0 * h);
            assert!((fd_a - ga.dot(axis)).abs() < 1e-7);
            assert!((fd_v - gv.dot(axis)).abs() < 1e-7);
        }
    }

    #[test]
    fn inflated_object_is_pulled_inwards_without_net_force() {
        let mut cells = tetrahedron(0, 2.0);
        let bonded = oif_bonds(1.0 / 6.0);
        let partials = oif_local_partials(&cells, &bonded);
        oif_apply_forces(&mut cells, &bonded, 0, partials[0]);
        let p = cells.particles();
        let net: DVec3 = p.force.iter().copied().sum();
        assert!(net.length() < 1e-12, "net force {net:?}");
        let apex = p.force[3];
        assert!(apex.z < 0.0, "apex force {apex:?}");
    }

    #[test]
    fn volume_conservation_takes_first_volume_as_reference() {
        let mut bonded = BondedInteractions::new();
        bonded.add(BondedInteraction::IbmTriangle { soft_id: 4 }).unwrap();
        let mut cells = tetrahedron(0, 1.0);
        let mut vc = VolumeConservation { soft_id: 4, kappa_v: 2.0, target: None };
        let v = vc.local_volume(&cells, &bonded);
        vc.apply(&mut cells, &bonded, v);
        assert_eq!(vc.target, Some(v));
        assert!(cells.particles().force.iter().all(|f| f.length() < 1e-15));

        vc.apply(&mut cells, &bonded, 2.0 * v);
        assert!(cells.particles().force[3].z < 0.0);
        let other = VolumeConservation { soft_id: 5, ..vc };
        assert_eq!(other.local_volume(&cells, &bonded), 0.0);
    }
}
