//! Virtual sites.
//!
//! A virtual site is a massless particle rigidly attached to a physical
//! reference particle. Forces acting on it are moved to the reference, where
//! they also produce a torque through the lever arm.

use glam::DVec3;

use crate::cells::CellStructure;
use crate::error::ForceError;
use crate::particle::{ParticleArrays, VsRelative};

/// A virtual-site scheme.
pub trait VirtualSitesScheme: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Place local virtual sites from their reference particles.
    fn update(&self, cells: &mut dyn CellStructure) -> Result<(), ForceError>;

    /// Move the force and torque of every virtual site to its reference and
    /// zero the virtual site's accumulators.
    ///
    /// Reduces ghost forces before reading them, so it must be called on
    /// every rank.
    fn back_transfer_forces_and_torques(&self, cells: &mut dyn CellStructure) -> Result<(), ForceError>;
}

/// No virtual sites.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualSitesOff;

impl VirtualSitesScheme for VirtualSitesOff {
    fn name(&self) -> &str {
        "off"
    }

    fn update(&self, _cells: &mut dyn CellStructure) -> Result<(), ForceError> {
        Ok(())
    }

    fn back_transfer_forces_and_torques(&self, _cells: &mut dyn CellStructure) -> Result<(), ForceError> {
        Ok(())
    }
}

/// Virtual sites at a fixed offset in the body frame of their reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualSitesRelative;

fn reference_index(
    cells: &dyn CellStructure,
    i: usize,
) -> Result<Option<(usize, VsRelative)>, ForceError> {
    let p = cells.particles();
    if !p.is_virtual[i] {
        return Ok(None);
    }
    let Some(vs) = p.vs_relative[i] else {
        return Ok(None);
    };
    let r = cells.find(vs.to_particle_id).ok_or(ForceError::VirtualSiteReferenceMissing {
        id: p.id[i],
        reference: vs.to_particle_id,
    })?;
    Ok(Some((r, vs)))
}

/// Lab-frame vector from the reference to the virtual site.
fn connection(p: &ParticleArrays, reference: usize, vs: &VsRelative) -> DVec3 {
    (p.quat[reference] * vs.rel_orientation) * DVec3::Z * vs.distance
}

impl VirtualSitesScheme for VirtualSitesRelative {
    fn name(&self) -> &str {
        "relative"
    }

    fn update(&self, cells: &mut dyn CellStructure) -> Result<(), ForceError> {
        for i in cells.local_range() {
            let Some((r, vs)) = reference_index(&*cells, i)? else {
                continue;
            };
            let p = cells.particles_mut();
            let arm = connection(p, r, &vs);
            p.pos[i] = p.pos[r] + arm;
            p.quat[i] = p.quat[r] * vs.quat;
            p.vel[i] = p.vel[r] + p.omega[r].cross(arm);
            p.omega[i] = p.omega[r];
        }
        Ok(())
    }

    fn back_transfer_forces_and_torques(&self, cells: &mut dyn CellStructure) -> Result<(), ForceError> {
        cells.reduce_ghost_forces()?;
        let mut transferred = 0usize;
        for i in cells.local_range() {
            let Some((r, _)) = reference_index(&*cells, i)? else {
                continue;
            };
            let p = cells.particles_mut();
            let f = p.force[i];
            let arm = p.pos[i] - p.pos[r];
            p.force[r] += f;
            let torque = arm.cross(f) + p.torque[i];
            p.torque[r] += torque;
            p.force[i] = DVec3::ZERO;
            p.torque[i] = DVec3::ZERO;
            transferred += 1;
        }
        tracing::trace!("virtual sites: transferred {transferred} forces to references");
        Ok(())
    }
}
