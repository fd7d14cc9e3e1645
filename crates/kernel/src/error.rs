//! Error types shared by the kernel and the orchestrator.
//!
//! Configuration problems are reported to the caller that attempted the
//! change and never leave partially-updated state behind. Step failures abort
//! the whole force evaluation.

use thiserror::Error;

use crate::particle::ParticleId;

/// Failure of a configuration-time operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A particle type index that cannot address a parameter slot.
    #[error("invalid particle type {0}: types must be non-negative")]
    InvalidType(i32),
    /// A raw constant outside its admissible range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name as it appears in the configuration surface.
        name: &'static str,
        /// Human-readable reason.
        reason: String,
    },
    /// A bond id that is not registered in the bonded interaction table.
    #[error("unknown bonded interaction id {0}")]
    UnknownBond(usize),
    /// The configuration file could not be read.
    #[error("failed to read configuration {path}: {reason}")]
    Io {
        /// Path that was requested.
        path: String,
        /// Underlying I/O error text.
        reason: String,
    },
    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    /// Structural validation of a configuration failed.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Ranks could not agree on the outcome of a collective setter.
    #[error("configuration broadcast failed: {0}")]
    Broadcast(String),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidParameter`].
    pub fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Unrecoverable failure of a force evaluation step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForceError {
    /// Neighbor lists need a skin and none was configured.
    #[error("cannot automatically determine skin, please set it manually")]
    SkinNotSet,
    /// The induced-charge iteration did not reach its tolerance.
    #[error("ICC failed to converge in {iterations} iterations (last relative change {last_change:e})")]
    IccNotConverged {
        /// Iterations performed.
        iterations: usize,
        /// Maximum relative charge change of the last iteration.
        last_change: f64,
    },
    /// An induced-charge particle carries no charge.
    #[error("ICC found zero electric charge on particle {0}")]
    IccZeroCharge(ParticleId),
    /// A non-penetrable constraint was crossed.
    #[error("Constraint violated by particle {id} dist {dist}")]
    ConstraintViolated {
        /// Offending particle.
        id: ParticleId,
        /// Signed distance to the constraint surface.
        dist: f64,
    },
    /// A bond without a breakage rule exceeded its admissible length.
    #[error("bond broken between particles {id} and {partner} (bond type {bond_id})")]
    BondBroken {
        /// Particle that stores the bond.
        id: ParticleId,
        /// First partner of the bond.
        partner: ParticleId,
        /// Bonded interaction id.
        bond_id: usize,
    },
    /// A virtual site whose reference particle is not visible on this rank.
    #[error("virtual site {id} references particle {reference}, which is not available on this rank")]
    VirtualSiteReferenceMissing {
        /// Virtual site id.
        id: ParticleId,
        /// Missing reference id.
        reference: ParticleId,
    },
    /// A collective operation failed or ranks diverged.
    #[error("collective operation failed: {0}")]
    Collective(String),
}
