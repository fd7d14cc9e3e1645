//! Orchestration Layer
//!
//! This crate runs the per-step force pipeline of a distributed particle
//! system, including:
//! - Collective communication between ranks
//! - Slab domain decomposition with ghost exchange and ghost force reduction
//! - The per-rank force system, its collective configuration setters and the
//!   step pipeline
//! - The ICC* induced-charge iteration
//! - JSON configuration
//! - A thread-based distributed runner

#![warn(missing_docs)]

pub mod comm;
pub mod config;
pub mod distributed;
pub mod domain;
mod icc;
pub mod system;

pub use comm::{CommError, Communicator, SingleRank, ThreadComm};
pub use config::ForceConfig;
pub use distributed::{run_distributed, run_single_instance, DistributedResult, RunError};
pub use domain::{DomainDecomposition, SlabDecomposition};
pub use system::{ForceRecord, ForceSystem};

/// Create a single-rank force system from a configuration file
///
/// This function performs the full setup pipeline:
/// 1. Load and validate the configuration
/// 2. Build the force system, applying every setter in order
///
/// # Example
/// ```no_run
/// use orchestrator::create_force_system;
///
/// let mut system = create_force_system("config/pair.json")?;
/// system.calculate_forces(0.0)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_force_system(config_path: &str) -> Result<ForceSystem<SingleRank>, Box<dyn std::error::Error>> {
    tracing::info!("Creating force system from config: {}", config_path);

    // 1. Load and validate configuration
    let config = ForceConfig::load(config_path)?;

    // 2. Build the system
    let system = ForceSystem::from_config(SingleRank, &config)?;
    tracing::info!("Force system '{}' ready", config.name);
    Ok(system)
}
