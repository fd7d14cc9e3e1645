//! Configuration parsing and validation for the force pipeline

use glam::DVec3;
use kernel::{
    BondedInteraction, BreakageSpec, CollisionParams, ConfigError, Constraint, CoulombKernel, DipolarKernel,
    GayBerne, IccParams, LennardJones, VolumeConservation,
};
use serde::{Deserialize, Serialize};
use std::fs;

/// Main force-pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceConfig {
    /// Human-readable system name
    pub name: String,
    /// Bounds used to lay out the slab decomposition
    pub domain: DomainBounds,
    /// Verlet skin; no default can be derived, so a missing skin fails the
    /// first force evaluation
    #[serde(default)]
    pub skin: Option<f64>,
    /// Step length handed to the fluid coupling and the thermostat
    #[serde(default = "default_time_step")]
    pub time_step: f64,
    /// Force cap, `<= 0` disables capping
    #[serde(default)]
    pub force_cap: f64,
    /// Lower bound on the ghost layer width
    #[serde(default)]
    pub min_global_cut: f64,
    /// Number of ranks used by the distributed runner
    #[serde(default = "default_num_ranks")]
    pub num_ranks: usize,
    /// Thermal energy passed to each force evaluation
    #[serde(default)]
    pub kt: f64,
    /// Non-bonded interactions per type pair
    #[serde(default)]
    pub non_bonded: Vec<NonBondedEntry>,
    /// Bonded interaction types; ids are list indices
    #[serde(default)]
    pub bonded: Vec<BondedInteraction>,
    /// Electrostatics
    #[serde(default)]
    pub electrostatics: Option<ElectrostaticsConfig>,
    /// Real-space dipolar kernel
    #[serde(default)]
    pub magnetostatics: Option<DipolarKernel>,
    /// Collision detection
    #[serde(default)]
    pub collision: CollisionParams,
    /// Breakable bond types
    #[serde(default)]
    pub bond_breakage: Vec<BreakageEntry>,
    /// Types whose centre of mass is kept fixed
    #[serde(default)]
    pub com_fixed_types: Vec<i32>,
    /// Soft objects with volume conservation
    #[serde(default)]
    pub volume_conservation: Vec<VolumeConservation>,
    /// Walls, spheres and external fields
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

/// Domain bounding box
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DomainBounds {
    /// Minimum corner [x, y, z]
    pub min: [f64; 3],
    /// Maximum corner [x, y, z]
    pub max: [f64; 3],
}

impl DomainBounds {
    /// Minimum corner.
    pub fn min(&self) -> DVec3 {
        DVec3::from_array(self.min)
    }

    /// Maximum corner.
    pub fn max(&self) -> DVec3 {
        DVec3::from_array(self.max)
    }
}

/// Non-bonded parameters of one unordered type pair
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NonBondedEntry {
    /// First type
    pub type_a: i32,
    /// Second type
    pub type_b: i32,
    /// Lennard-Jones constants
    #[serde(default)]
    pub lennard_jones: Option<LennardJonesParams>,
    /// Gay-Berne constants
    #[serde(default)]
    pub gay_berne: Option<GayBerneParams>,
}

/// Raw Lennard-Jones constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LennardJonesParams {
    /// Well depth
    pub eps: f64,
    /// Particle size
    pub sig: f64,
    /// Cutoff
    pub cut: f64,
    /// Energy shift; `None` shifts the potential to zero at the cutoff
    #[serde(default)]
    pub shift: Option<f64>,
    /// Radial offset
    #[serde(default)]
    pub offset: f64,
}

impl LennardJonesParams {
    /// Validate and build the kernel record.
    pub fn build(&self) -> Result<LennardJones, ConfigError> {
        let shift = self.shift.unwrap_or_else(|| LennardJones::auto_shift(self.sig, self.cut));
        LennardJones::new(self.eps, self.sig, self.cut, shift, self.offset)
    }
}

/// Raw Gay-Berne constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GayBerneParams {
    /// Well depth
    pub eps: f64,
    /// Particle width
    pub sig: f64,
    /// Cutoff
    pub cut: f64,
    /// Length-to-width ratio
    pub k1: f64,
    /// Side-by-side to end-to-end well depth ratio
    pub k2: f64,
    /// Energy anisotropy exponent
    pub mu: f64,
    /// Orientation-independent energy exponent
    pub nu: f64,
}

impl GayBerneParams {
    /// Validate, derive the anisotropy parameters and build the kernel record.
    pub fn build(&self) -> Result<GayBerne, ConfigError> {
        GayBerne::new(self.eps, self.sig, self.cut, self.k1, self.k2, self.mu, self.nu)
    }
}

/// Electrostatics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectrostaticsConfig {
    /// Real-space Coulomb kernel
    pub kernel: CoulombKernel,
    /// Induced-charge iteration
    #[serde(default)]
    pub icc: Option<IccParams>,
}

/// Breakage rule bound to a bond type
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakageEntry {
    /// Bonded interaction id
    pub bond_type: usize,
    /// Rule
    #[serde(flatten)]
    pub spec: BreakageSpec,
}

fn default_time_step() -> f64 {
    0.01
}

fn default_num_ranks() -> usize {
    1
}

impl ForceConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_json_str(&contents)?;
        tracing::info!("loaded configuration '{}' from {path}", config.name);
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: ForceConfig = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        for i in 0..3 {
            if self.domain.min[i] >= self.domain.max[i] {
                return Err(ConfigError::Invalid(format!(
                    "domain min[{i}] ({}) must be less than max[{i}] ({})",
                    self.domain.min[i], self.domain.max[i]
                )));
            }
        }
        if let Some(skin) = self.skin {
            if !(skin >= 0.0) {
                return Err(ConfigError::parameter("skin", "must be >= 0"));
            }
        }
        if !(self.time_step > 0.0) {
            return Err(ConfigError::parameter("time_step", "must be > 0"));
        }
        if !(self.min_global_cut >= 0.0) {
            return Err(ConfigError::parameter("min_global_cut", "must be >= 0"));
        }
        if self.num_ranks == 0 {
            return Err(ConfigError::parameter("num_ranks", "must be >= 1"));
        }
        for entry in &self.bond_breakage {
            if entry.bond_type >= self.bonded.len() {
                return Err(ConfigError::UnknownBond(entry.bond_type));
            }
        }
        self.collision.validate(self.bonded.len())?;
        for &t in &self.com_fixed_types {
            if t < 0 {
                return Err(ConfigError::InvalidType(t));
            }
        }
        Ok(())
    }
}
