//! Particle Force Kernel
//!
//! This crate provides the single-rank building blocks of the per-step force
//! computation of a particle simulator. Everything here works on one rank's
//! particle set, owned particles followed by ghost replicas, seen through the
//! [`CellStructure`] seam; the distributed pipeline lives in the
//! orchestrator crate.
//!
//! # Modules
//! - [`particle`] -- Struct-of-arrays particle storage and the `Particle` record.
//! - [`neighbor`] -- Uniform-grid neighbor search, Verlet validity criterion and list.
//! - [`cells`] -- The `CellStructure` trait and the single-process `LocalCells`.
//! - [`interaction`] -- Per-type-pair non-bonded parameter table.
//! - [`nonbonded`] -- Lennard-Jones and Gay-Berne pair kernels.
//! - [`electrostatics`] / [`magnetostatics`] -- Coulomb and dipolar pair kernels, ICC*.
//! - [`bonded`] / [`bond_breakage`] -- Bonded interactions and bond breakage.
//! - [`short_range`] -- The combined bonded and pairwise loop.
//! - [`collision`] -- Collision detection queue.
//! - [`virtual_sites`] -- Virtual-site placement and force back-transfer.
//! - [`constraints`] -- Walls, spheres and external fields.
//! - [`membrane`] -- Area and volume forces of closed surfaces.
//! - [`fluid`] -- Fluid coupling and thermostat hooks.
//! - [`comfixed`] -- Centre-of-mass fixing.
//! - [`forces`] -- Force initialisation and capping.

#![warn(missing_docs)]

pub mod bond_breakage;
pub mod bonded;
pub mod cells;
pub mod collision;
pub mod comfixed;
pub mod constraints;
pub mod electrostatics;
pub mod error;
pub mod fluid;
pub mod forces;
pub mod interaction;
pub mod long_range;
pub mod magnetostatics;
pub mod membrane;
pub mod neighbor;
pub mod nonbonded;
pub mod particle;
pub mod propagation;
pub mod short_range;
pub mod virtual_sites;

pub use bond_breakage::{BondBreakage, BreakageAction, BreakageSpec, QueueEntry};
pub use bonded::{BondedInteraction, BondedInteractions};
pub use cells::{CellStructure, LocalCells};
pub use collision::{CollisionEvent, CollisionMode, CollisionParams, CollisionQueue};
pub use comfixed::ComFixed;
pub use constraints::{Constraint, Constraints, Shape};
pub use electrostatics::{CoulombKernel, Electrostatics, IccParams, IccStar};
pub use error::{ConfigError, ForceError};
pub use fluid::{AthermalThermostat, FluidCoupling, Thermostat, UniformFlowCoupling};
pub use interaction::{InteractionParams, InteractionTable};
pub use long_range::LongRangeSolver;
pub use magnetostatics::{DipolarKernel, Magnetostatics};
pub use membrane::VolumeConservation;
pub use neighbor::{NeighborGrid, VerletCriterion, VerletList};
pub use nonbonded::{GayBerne, LennardJones, PairForce};
pub use particle::{Bond, Particle, ParticleArrays, ParticleId, Swimming, VsRelative};
pub use propagation::{Propagation, PropagationMode};
pub use short_range::PairKernels;
pub use virtual_sites::{VirtualSitesOff, VirtualSitesRelative, VirtualSitesScheme};
