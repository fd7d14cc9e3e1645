//! Per-rank force system: process-wide interaction state plus the per-step
//! force pipeline.
//!
//! Every rank holds one [`ForceSystem`] and runs the same calls in the same
//! order. Configuration setters validate on rank 0 and broadcast the outcome,
//! so either every rank applies the identical record or every rank reports
//! the identical error and nothing changes.

use glam::{DQuat, DVec3};
use kernel::collision::{bind_centers, merge_queues};
use kernel::forces::{force_capping, init_forces};
use kernel::membrane::{oif_apply_forces, oif_local_partials};
use kernel::short_range::short_range_loop;
use kernel::{
    BondBreakage, BondedInteraction, BondedInteractions, BreakageSpec, CellStructure, CollisionMode,
    CollisionParams, CollisionQueue, ComFixed, ConfigError, Constraint, Constraints, CoulombKernel, DipolarKernel,
    Electrostatics, FluidCoupling, ForceError, IccParams, IccStar, InteractionTable, LongRangeSolver,
    Magnetostatics, PairKernels, Particle, ParticleId, Propagation, Thermostat, VerletCriterion, VirtualSitesOff,
    VirtualSitesScheme, VolumeConservation,
};

use crate::comm::Communicator;
use crate::config::{ForceConfig, GayBerneParams, LennardJonesParams};
use crate::domain::DomainDecomposition;

/// Reduced area and volume below which an OIF object counts as absent.
const OIF_DEGENERATE: f64 = 1.0e-100;

/// Per-id force and torque of an owned particle after a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceRecord {
    /// Particle id.
    pub id: ParticleId,
    /// Final force.
    pub force: DVec3,
    /// Final torque.
    pub torque: DVec3,
}

/// One rank's view of the simulated system.
pub struct ForceSystem<C: Communicator> {
    pub(crate) comm: C,
    pub(crate) cells: DomainDecomposition<C>,
    pub(crate) table: InteractionTable,
    pub(crate) bonded: BondedInteractions,
    pub(crate) breakage: BondBreakage,
    pub(crate) collision: CollisionParams,
    pub(crate) collisions: CollisionQueue,
    pub(crate) electrostatics: Electrostatics,
    pub(crate) magnetostatics: Magnetostatics,
    pub(crate) constraints: Constraints,
    pub(crate) volume_conservation: Vec<VolumeConservation>,
    pub(crate) fluid: Option<Box<dyn FluidCoupling>>,
    pub(crate) thermostat: Option<Box<dyn Thermostat>>,
    pub(crate) virtual_sites: Box<dyn VirtualSitesScheme>,
    pub(crate) com_fixed: ComFixed,
    pub(crate) propagation: Propagation,
    pub(crate) skin: Option<f64>,
    pub(crate) time_step: f64,
    pub(crate) sim_time: f64,
    pub(crate) force_cap: f64,
    pub(crate) min_global_cut: f64,
}

fn verlet_criterion<'a>(
    skin: f64,
    table: &'a InteractionTable,
    electrostatics: &Electrostatics,
    magnetostatics: &Magnetostatics,
    collision: &CollisionParams,
) -> VerletCriterion<'a> {
    VerletCriterion {
        skin,
        table,
        coulomb_cut: electrostatics.cutoff(),
        dipolar_cut: magnetostatics.cutoff(),
        collision_cut: collision.cutoff(),
    }
}

impl<C: Communicator> ForceSystem<C> {
    /// Create an empty system decomposed over `comm`.
    pub fn new(comm: C, box_min: DVec3, box_max: DVec3) -> Self {
        let cells = DomainDecomposition::new(comm.clone(), box_min, box_max);
        Self {
            comm,
            cells,
            table: InteractionTable::new(),
            bonded: BondedInteractions::new(),
            breakage: BondBreakage::new(),
            collision: CollisionParams::default(),
            collisions: CollisionQueue::new(),
            electrostatics: Electrostatics::default(),
            magnetostatics: Magnetostatics::default(),
            constraints: Constraints::new(),
            volume_conservation: Vec::new(),
            fluid: None,
            thermostat: None,
            virtual_sites: Box::new(VirtualSitesOff),
            com_fixed: ComFixed::default(),
            propagation: Propagation { recalc_forces: true, ..Default::default() },
            skin: None,
            time_step: 0.01,
            sim_time: 0.0,
            force_cap: 0.0,
            min_global_cut: 0.0,
        }
    }

    /// Build a system from a validated configuration.
    ///
    /// Collective: every rank must call it with the same configuration.
    pub fn from_config(comm: C, config: &ForceConfig) -> Result<Self, ConfigError> {
        let mut system = Self::new(comm, config.domain.min(), config.domain.max());
        if let Some(skin) = config.skin {
            system.set_skin(skin)?;
        }
        system.set_time_step(config.time_step)?;
        system.set_force_cap(config.force_cap)?;
        system.set_min_global_cut(config.min_global_cut)?;
        for entry in &config.non_bonded {
            if let Some(lj) = &entry.lennard_jones {
                system.set_lennard_jones(entry.type_a, entry.type_b, lj)?;
            }
            if let Some(gb) = &entry.gay_berne {
                system.set_gay_berne(entry.type_a, entry.type_b, gb)?;
            }
        }
        for bond in &config.bonded {
            system.add_bonded_interaction(*bond)?;
        }
        for entry in &config.bond_breakage {
            system.insert_breakage_spec(entry.bond_type, entry.spec)?;
        }
        if let Some(es) = &config.electrostatics {
            system.set_coulomb(es.kernel)?;
            if let Some(icc) = &es.icc {
                system.set_icc(icc.clone())?;
            }
        }
        if let Some(kernel) = config.magnetostatics {
            system.set_dipolar(kernel)?;
        }
        system.set_collision_params(config.collision)?;
        system.set_com_fixed(config.com_fixed_types.iter().copied());
        for vc in &config.volume_conservation {
            system.add_volume_conservation(*vc)?;
        }
        for constraint in &config.constraints {
            system.add_constraint(*constraint);
        }
        tracing::info!("rank {}: force system '{}' configured", system.comm.rank(), config.name);
        Ok(system)
    }

    // -----------------------------------------------------------------------
    // Collective agreement
    // -----------------------------------------------------------------------

    /// Gather every rank's outcome; all ranks return the first error in rank
    /// order, or every rank's value.
    pub(crate) fn agree<T: Clone + Send + 'static>(&self, local: Result<T, ForceError>) -> Result<Vec<T>, ForceError> {
        self.comm.all_gather(local)?.into_iter().collect()
    }

    /// Distribute rank 0's validation outcome. Arguments on other ranks are
    /// ignored.
    fn broadcast_setting<T: Clone + Send + 'static>(
        &self,
        local: impl FnOnce() -> Result<T, ConfigError>,
    ) -> Result<T, ConfigError> {
        let outcome = (self.comm.rank() == 0).then(local);
        self.comm.broadcast(0, outcome)?
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Set Lennard-Jones constants for a type pair. Collective.
    pub fn set_lennard_jones(&mut self, a: i32, b: i32, params: &LennardJonesParams) -> Result<(), ConfigError> {
        let (a, b, lj) = self.broadcast_setting(|| {
            InteractionTable::check_types(a, b)?;
            Ok((a, b, params.build()?))
        })?;
        self.table.set_lennard_jones(a, b, lj)?;
        self.propagation.recalc_forces = true;
        tracing::info!("lennard-jones set for types ({a}, {b}), cut {}", lj.cut);
        Ok(())
    }

    /// Set Gay-Berne constants for a type pair. Collective.
    pub fn set_gay_berne(&mut self, a: i32, b: i32, params: &GayBerneParams) -> Result<(), ConfigError> {
        let (a, b, gb) = self.broadcast_setting(|| {
            InteractionTable::check_types(a, b)?;
            Ok((a, b, params.build()?))
        })?;
        self.table.set_gay_berne(a, b, gb)?;
        self.propagation.recalc_forces = true;
        tracing::info!("gay-berne set for types ({a}, {b}), cut {}", params.cut);
        Ok(())
    }

    /// Register a bonded interaction type; returns its id. Collective.
    pub fn add_bonded_interaction(&mut self, bond: BondedInteraction) -> Result<usize, ConfigError> {
        let bond = self.broadcast_setting(|| {
            bond.validate()?;
            Ok(bond)
        })?;
        let id = self.bonded.add(bond)?;
        self.cells.invalidate();
        self.propagation.recalc_forces = true;
        Ok(id)
    }

    /// Make a bond type breakable. Collective.
    pub fn insert_breakage_spec(&mut self, bond_type: usize, spec: BreakageSpec) -> Result<(), ConfigError> {
        let n_bonds = self.bonded.len();
        let spec = self.broadcast_setting(|| {
            if bond_type >= n_bonds {
                return Err(ConfigError::UnknownBond(bond_type));
            }
            if !(spec.breakage_length > 0.0) {
                return Err(ConfigError::parameter("breakage_length", "must be > 0"));
            }
            Ok(spec)
        })?;
        self.breakage.insert_spec(bond_type, spec);
        Ok(())
    }

    /// Install a real-space Coulomb kernel. Collective.
    pub fn set_coulomb(&mut self, kernel: CoulombKernel) -> Result<(), ConfigError> {
        let kernel = self.broadcast_setting(|| {
            kernel.validate()?;
            Ok(kernel)
        })?;
        self.electrostatics.kernel = Some(kernel);
        self.cells.invalidate();
        self.propagation.recalc_forces = true;
        Ok(())
    }

    /// Install a real-space dipolar kernel. Collective.
    pub fn set_dipolar(&mut self, kernel: DipolarKernel) -> Result<(), ConfigError> {
        let kernel = self.broadcast_setting(|| {
            kernel.validate()?;
            Ok(kernel)
        })?;
        self.magnetostatics.kernel = Some(kernel);
        self.cells.invalidate();
        self.propagation.recalc_forces = true;
        Ok(())
    }

    /// Install the induced-charge iteration; needs a Coulomb kernel. Collective.
    pub fn set_icc(&mut self, params: IccParams) -> Result<(), ConfigError> {
        let has_kernel = self.electrostatics.kernel.is_some();
        let icc = self.broadcast_setting(|| {
            if !has_kernel {
                return Err(ConfigError::Invalid("ICC requires an electrostatics kernel".into()));
            }
            IccStar::new(params)
        })?;
        self.electrostatics.icc = Some(icc);
        self.propagation.recalc_forces = true;
        Ok(())
    }

    /// Install long-range solvers. Each rank supplies its own instance.
    pub fn set_long_range_solvers(
        &mut self,
        electrostatics: Option<Box<dyn LongRangeSolver>>,
        magnetostatics: Option<Box<dyn LongRangeSolver>>,
    ) {
        self.electrostatics.solver = electrostatics;
        self.magnetostatics.solver = magnetostatics;
        self.propagation.recalc_forces = true;
    }

    /// Set collision detection parameters. Collective.
    pub fn set_collision_params(&mut self, params: CollisionParams) -> Result<(), ConfigError> {
        let n_bonds = self.bonded.len();
        let params = self.broadcast_setting(|| {
            params.validate(n_bonds)?;
            Ok(params)
        })?;
        self.collision = params;
        self.cells.invalidate();
        Ok(())
    }

    /// Set the Verlet skin. Collective.
    pub fn set_skin(&mut self, skin: f64) -> Result<(), ConfigError> {
        let skin = self.broadcast_setting(|| {
            if !(skin >= 0.0 && skin.is_finite()) {
                return Err(ConfigError::parameter("skin", "must be >= 0"));
            }
            Ok(skin)
        })?;
        self.skin = Some(skin);
        self.cells.invalidate();
        Ok(())
    }

    /// Set the step length. Collective.
    pub fn set_time_step(&mut self, time_step: f64) -> Result<(), ConfigError> {
        self.time_step = self.broadcast_setting(|| {
            if !(time_step > 0.0) {
                return Err(ConfigError::parameter("time_step", "must be > 0"));
            }
            Ok(time_step)
        })?;
        Ok(())
    }

    /// Set the force cap; `<= 0` disables capping. Collective.
    pub fn set_force_cap(&mut self, force_cap: f64) -> Result<(), ConfigError> {
        self.force_cap = self.broadcast_setting(|| {
            if force_cap.is_nan() {
                return Err(ConfigError::parameter("force_cap", "must be a number"));
            }
            Ok(force_cap)
        })?;
        self.propagation.recalc_forces = true;
        Ok(())
    }

    /// Set the lower bound on the ghost layer width. Collective.
    pub fn set_min_global_cut(&mut self, min_global_cut: f64) -> Result<(), ConfigError> {
        self.min_global_cut = self.broadcast_setting(|| {
            if !(min_global_cut >= 0.0) {
                return Err(ConfigError::parameter("min_global_cut", "must be >= 0"));
            }
            Ok(min_global_cut)
        })?;
        self.cells.invalidate();
        Ok(())
    }

    /// Fix the centre of mass of the given types.
    pub fn set_com_fixed(&mut self, types: impl IntoIterator<Item = i32>) {
        self.com_fixed = ComFixed::new(types);
    }

    /// Add volume conservation for a soft object. Collective.
    pub fn add_volume_conservation(&mut self, vc: VolumeConservation) -> Result<(), ConfigError> {
        let vc = self.broadcast_setting(|| {
            if !vc.kappa_v.is_finite() {
                return Err(ConfigError::parameter("kappa_v", "must be finite"));
            }
            Ok(vc)
        })?;
        self.volume_conservation.push(vc);
        Ok(())
    }

    /// Register a constraint.
    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.add(constraint);
        self.propagation.recalc_forces = true;
    }

    /// Install a fluid coupling.
    pub fn set_fluid_coupling(&mut self, fluid: Option<Box<dyn FluidCoupling>>) {
        self.fluid = fluid;
    }

    /// Install a thermostat hook.
    pub fn set_thermostat(&mut self, thermostat: Option<Box<dyn Thermostat>>) {
        self.thermostat = thermostat;
    }

    /// Select the virtual-site scheme.
    pub fn set_virtual_sites(&mut self, scheme: Box<dyn VirtualSitesScheme>) {
        tracing::info!("virtual sites: {}", scheme.name());
        self.virtual_sites = scheme;
        self.propagation.recalc_forces = true;
    }

    /// Set the simulation time seen by time-dependent constraints.
    pub fn set_sim_time(&mut self, sim_time: f64) {
        self.sim_time = sim_time;
    }

    /// Add a particle after checking its type and bond ids. Only the owning
    /// rank stores it; returns whether this rank did.
    pub fn add_particle(&mut self, p: Particle) -> Result<bool, ConfigError> {
        InteractionTable::check_types(p.ptype, p.ptype)?;
        for bond in &p.bonds {
            let Some(kind) = self.bonded.get(bond.bond_id) else {
                return Err(ConfigError::UnknownBond(bond.bond_id));
            };
            if bond.partners.len() != kind.n_partners() {
                return Err(ConfigError::parameter("partners", "wrong number of bond partners"));
            }
        }
        self.propagation.recalc_forces = true;
        Ok(self.cells.add_particle(p))
    }

    /// Move an owned particle.
    pub fn set_position(&mut self, id: ParticleId, pos: DVec3) -> bool {
        self.propagation.recalc_forces = true;
        self.cells.set_position(id, pos)
    }

    /// Rotate an owned particle.
    pub fn set_orientation(&mut self, id: ParticleId, quat: DQuat) -> bool {
        self.propagation.recalc_forces = true;
        self.cells.set_orientation(id, quat)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// This rank's communicator.
    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// The interaction parameter table.
    pub fn interaction_table(&self) -> &InteractionTable {
        &self.table
    }

    /// Registered bonded interactions.
    pub fn bonded_interactions(&self) -> &BondedInteractions {
        &self.bonded
    }

    /// The local cell structure.
    pub fn cells(&self) -> &DomainDecomposition<C> {
        &self.cells
    }

    /// Mutable access to the local cell structure.
    pub fn cells_mut(&mut self) -> &mut DomainDecomposition<C> {
        &mut self.cells
    }

    /// Electrostatics state.
    pub fn electrostatics(&self) -> &Electrostatics {
        &self.electrostatics
    }

    /// Propagation state.
    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    /// `true` once a step has completed and nothing changed since.
    pub fn forces_valid(&self) -> bool {
        !self.propagation.recalc_forces
    }

    /// Collisions detected by the last step on this rank.
    pub fn collision_queue(&self) -> &CollisionQueue {
        &self.collisions
    }

    /// Bond breakage state, including the last step's queue.
    pub fn bond_breakage(&self) -> &BondBreakage {
        &self.breakage
    }

    /// Force and torque of every owned particle.
    pub fn force_records(&self) -> Vec<ForceRecord> {
        let p = self.cells.particles();
        self.cells
            .local_range()
            .map(|i| ForceRecord { id: p.id[i], force: p.force[i], torque: p.torque[i] })
            .collect()
    }

    /// Width of the ghost layer for a given skin.
    fn ghost_width(&self, skin: f64) -> f64 {
        let criterion =
            verlet_criterion(skin, &self.table, &self.electrostatics, &self.magnetostatics, &self.collision);
        criterion
            .max_range()
            .max(self.bonded.max_cutoff())
            .max(self.min_global_cut)
            + skin
    }

    // -----------------------------------------------------------------------
    // Force pipeline
    // -----------------------------------------------------------------------

    /// Compute the forces of one step. Collective.
    ///
    /// On error no rank's forces are meaningful and every rank returns the
    /// same error.
    pub fn calculate_forces(&mut self, kt: f64) -> Result<(), ForceError> {
        // --- 0. Neighbor structures and virtual-site positions ---
        let skin = self.skin.ok_or(ForceError::SkinNotSet)?;
        let ghost_width = self.ghost_width(skin);
        let criterion =
            verlet_criterion(skin, &self.table, &self.electrostatics, &self.magnetostatics, &self.collision);
        self.cells.update(&criterion, ghost_width)?;
        self.propagation.used_propagations = self.cells.used_propagations();
        if self.propagation.needs_vs_back_transfer() {
            let placed = self.virtual_sites.update(&mut self.cells);
            self.agree(placed)?;
            // Placed sites may have moved past the skin or out of their slab.
            self.cells.update(&criterion, ghost_width)?;
        }

        // --- 1. Per-step transient state ---
        self.collisions.clear();
        self.breakage.clear_queue();

        // --- 2. Force initialisation ---
        let local = self.cells.local_range();
        let ghosts = self.cells.ghost_range();
        init_forces(self.cells.particles_mut(), local.clone(), ghosts.clone());
        if let Some(thermostat) = self.thermostat.as_mut() {
            thermostat.force_init(kt, self.time_step);
        }

        // --- 3. Induced charges ---
        if self.electrostatics.icc.is_some() {
            self.iterate_icc(skin)?;
        }

        // --- 4. Long-range contributions ---
        self.electrostatics.add_long_range_force(self.cells.particles_mut(), local.clone());
        self.magnetostatics.add_long_range_force(self.cells.particles_mut(), local.clone());

        // --- 5. Bonded and pairwise loop ---
        let criterion =
            verlet_criterion(skin, &self.table, &self.electrostatics, &self.magnetostatics, &self.collision);
        let kernels = PairKernels {
            table: Some(&self.table),
            coulomb: self.electrostatics.kernel.as_ref(),
            dipoles: self.magnetostatics.kernel.as_ref(),
            collision: (self.collision.mode != CollisionMode::Off).then_some(&self.collision),
        };
        let pairs = short_range_loop(
            &mut self.cells,
            &self.bonded,
            &mut self.breakage,
            &criterion,
            &kernels,
            &mut self.collisions,
        );
        self.agree(pairs)?;

        // --- 6. Constraints ---
        let constrained = self
            .constraints
            .add_forces(self.cells.particles_mut(), local.clone(), &self.table, self.sim_time);
        self.agree(constrained)?;

        // --- 7. Global surface and volume forces ---
        self.apply_oif_global_forces()?;

        // --- 8. Volume conservation ---
        for vc in &mut self.volume_conservation {
            let volume = self.comm.all_reduce_sum(vc.local_volume(&self.cells, &self.bonded))?;
            vc.apply(&mut self.cells, &self.bonded, volume);
        }

        // --- 9. Fluid coupling ---
        if let Some(fluid) = self.fluid.as_mut() {
            fluid.couple(self.cells.particles_mut(), local.clone(), ghosts, self.time_step);
        }

        // --- 10. Virtual-site back-transfer ---
        if self.propagation.needs_vs_back_transfer() {
            let transferred = self.virtual_sites.back_transfer_forces_and_torques(&mut self.cells);
            self.agree(transferred)?;
        }

        // --- 11. Ghost force reduction ---
        self.cells.reduce_ghost_forces()?;

        // --- 12. Centre-of-mass fixing ---
        if !self.com_fixed.is_empty() {
            let sums = self.com_fixed.local_sums(self.cells.particles(), local.clone());
            let flat: Vec<f64> = sums.iter().flatten().copied().collect();
            let reduced = self.comm.all_reduce_sum_vec(flat)?;
            let totals: Vec<[f64; 4]> = reduced
                .chunks_exact(4)
                .map(|c| [c[0], c[1], c[2], c[3]])
                .collect();
            self.com_fixed.apply(self.cells.particles_mut(), local.clone(), &totals);
        }

        // --- 13. Force capping ---
        let capped = force_capping(self.cells.particles_mut(), local, self.force_cap);

        // --- 14. Forces valid ---
        self.propagation.recalc_forces = false;
        tracing::debug!(
            "rank {}: forces computed, {} collisions, {} breakage events, {capped} capped",
            self.comm.rank(),
            self.collisions.len(),
            self.breakage.queue().len()
        );
        Ok(())
    }

    /// Area and volume penalties of OIF objects: local partials, one
    /// reduction per object, then the forces. Stops at the first object whose
    /// reduced area and volume are both degenerate.
    fn apply_oif_global_forces(&mut self) -> Result<(), ForceError> {
        let active = self
            .bonded
            .iter()
            .any(|b| matches!(b, BondedInteraction::OifGlobalForces { .. }));
        if !active {
            return Ok(());
        }
        let partials = oif_local_partials(&self.cells, &self.bonded);
        let n_objects = self.comm.all_reduce_max_usize(partials.len())?;
        for object in 0..n_objects {
            let local = partials.get(object).copied().unwrap_or_default();
            let totals = self.comm.all_reduce_sum_vec(local.to_vec())?;
            let &[area, volume] = totals.as_slice() else {
                return Err(ForceError::Collective("OIF reduction returned a malformed result".into()));
            };
            if area.abs() < OIF_DEGENERATE && volume.abs() < OIF_DEGENERATE {
                break;
            }
            oif_apply_forces(&mut self.cells, &self.bonded, object, [area, volume]);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Post-step topology changes
    // -----------------------------------------------------------------------

    /// Merge the collision queues of all ranks and bind the collided centres.
    /// Collective; returns the number of bonds created on this rank.
    pub fn handle_collisions(&mut self) -> Result<usize, ForceError> {
        if self.collision.mode == CollisionMode::Off {
            return Ok(0);
        }
        let gathered = self.comm.all_gather(self.collisions.events().to_vec())?;
        let merged = merge_queues(gathered);
        if merged.is_empty() {
            return Ok(0);
        }
        let created = bind_centers(&mut self.cells, &merged, self.collision.bond_centers);
        self.cells.invalidate();
        self.propagation.recalc_forces = true;
        tracing::info!(
            "rank {}: {} collisions resolved, {created} bonds created locally",
            self.comm.rank(),
            merged.len()
        );
        Ok(created)
    }

    /// Apply the queued bond breakage actions. Collective; returns the number
    /// of bonds removed on this rank.
    pub fn process_bond_breakage(&mut self) -> Result<usize, ForceError> {
        let removed = self.breakage.process_queue(&mut self.cells);
        if self.comm.any(removed > 0)? {
            self.cells.invalidate();
            self.propagation.recalc_forces = true;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::SingleRank;
    use kernel::{Bond, BreakageAction};

    fn lj() -> LennardJonesParams {
        LennardJonesParams { eps: 1.0, sig: 1.0, cut: 2.5, shift: Some(0.0), offset: 0.0 }
    }

    fn system() -> ForceSystem<SingleRank> {
        let mut system = ForceSystem::new(SingleRank, DVec3::ZERO, DVec3::splat(10.0));
        system.set_skin(0.3).unwrap();
        system.set_lennard_jones(0, 0, &lj()).unwrap();
        system
    }

    #[test]
    fn missing_skin_is_fatal() {
        let mut system = ForceSystem::new(SingleRank, DVec3::ZERO, DVec3::splat(10.0));
        assert_eq!(system.calculate_forces(0.0), Err(ForceError::SkinNotSet));
    }

    #[test]
    fn invalid_type_leaves_table_unchanged() {
        let mut system = system();
        let before = system.interaction_table().version();
        let err = system.set_lennard_jones(-1, 0, &lj()).unwrap_err();
        assert_eq!(err, ConfigError::InvalidType(-1));
        assert_eq!(system.interaction_table().version(), before);
    }

    #[test]
    fn step_marks_forces_valid() {
        let mut system = system();
        system.add_particle(Particle::new(0, DVec3::splat(1.0))).unwrap();
        system.add_particle(Particle::new(1, DVec3::new(2.1, 1.0, 1.0))).unwrap();
        assert!(!system.forces_valid());
        system.calculate_forces(0.0).unwrap();
        assert!(system.forces_valid());
        let records = system.force_records();
        assert!((records[0].force + records[1].force).length() < 1e-12);
        assert!(records[0].force.x < 0.0, "overlapping pair repels");
    }

    #[test]
    fn unknown_bond_id_is_rejected() {
        let mut system = system();
        let p = Particle::new(0, DVec3::ONE).with_bond(Bond::new(4, &[1]));
        assert_eq!(system.add_particle(p), Err(ConfigError::UnknownBond(4)));
    }

    #[test]
    fn breakage_removes_overstretched_bond() {
        let mut system = system();
        let id = system
            .add_bonded_interaction(BondedInteraction::Harmonic { k: 1.0, r0: 1.0, r_cut: 0.0 })
            .unwrap();
        system
            .insert_breakage_spec(id, BreakageSpec { breakage_length: 1.5, action: BreakageAction::DeleteBond })
            .unwrap();
        system
            .add_particle(Particle::new(0, DVec3::ONE).with_type(1).with_bond(Bond::new(id, &[1])))
            .unwrap();
        system.add_particle(Particle::new(1, DVec3::new(3.0, 1.0, 1.0)).with_type(1)).unwrap();
        system.calculate_forces(0.0).unwrap();
        assert_eq!(system.bond_breakage().queue().len(), 1);
        assert_eq!(system.process_bond_breakage().unwrap(), 1);
        assert!(system.cells().particles().bonds[0].is_empty());
    }

    #[test]
    fn icc_without_kernel_is_rejected() {
        let mut system = system();
        let params = IccParams {
            n_icc: 1,
            first_id: 0,
            eps_out: 1.0,
            relaxation: 0.7,
            max_iterations: 10,
            convergence: 1e-3,
            ext_field: DVec3::ZERO,
            areas: vec![1.0],
            epsilons: vec![10.0],
            sigmas: vec![0.0],
            normals: vec![DVec3::Z],
        };
        assert!(matches!(system.set_icc(params), Err(ConfigError::Invalid(_))));
        assert!(system.electrostatics().icc.is_none());
    }
}
