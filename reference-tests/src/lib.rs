//! Reference test framework for force pipeline validation
//!
//! Each scenario builds a small particle system whose forces are known in
//! closed form, runs one force evaluation on one or more thread ranks and
//! compares the per-particle result against the expectation.

pub mod analytical;
pub mod scenarios;


use glam::DVec3;
use kernel::{Particle, ParticleId};
use orchestrator::distributed::{run_distributed, run_single_instance, DistributedResult, RunError};
use orchestrator::ForceConfig;

/// Expected force (and optionally torque) on one particle
#[derive(Debug, Clone)]
pub struct ExpectedForce {
    /// Particle id
    pub id: ParticleId,
    /// Expected total force
    pub force: DVec3,
    /// Expected total torque, unchecked when `None`
    pub torque: Option<DVec3>,
    /// Relative tolerance
    pub tolerance: f64,
}

/// Expected result criteria for a reference scenario
#[derive(Debug, Clone, Default)]
pub struct ExpectedResult {
    /// Per-particle forces
    pub forces: Vec<ExpectedForce>,
    /// Bound on the net force relative to the summed force magnitudes
    pub net_force: Option<f64>,
    /// Upper bound on every force magnitude
    pub max_force: Option<f64>,
    /// Relative tolerance against a single-rank run of the same system
    pub single_instance: Option<f64>,
}

/// Result of running a reference scenario
#[derive(Debug)]
pub struct ScenarioResult {
    /// Scenario name
    pub name: String,
    /// Whether every check passed
    pub passed: bool,
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Number of particles
    pub n_particles: usize,
    /// Owned particles per rank after the step
    pub owned_per_rank: Vec<usize>,
}

/// Result of an individual validation check
#[derive(Debug)]
pub struct CheckResult {
    /// Check name
    pub name: String,
    /// Whether check passed
    pub passed: bool,
    /// Error message if failed
    pub message: Option<String>,
}

impl CheckResult {
    fn pass(name: impl Into<String>) -> Self {
        Self { name: name.into(), passed: true, message: None }
    }

    fn fail(name: impl Into<String>, message: String) -> Self {
        Self { name: name.into(), passed: false, message: Some(message) }
    }
}

/// A reference scenario
pub struct ReferenceScenario {
    /// Scenario name
    pub name: String,
    /// Force configuration
    pub config: ForceConfig,
    /// Initial particles, inserted on every rank
    pub particles: Vec<Particle>,
    /// Number of thread ranks
    pub ranks: usize,
    /// Expected results to validate
    pub expected: ExpectedResult,
}

impl ReferenceScenario {
    /// Run the scenario and validate the result
    pub fn run(&self) -> Result<ScenarioResult, RunError> {
        tracing::info!("Running reference scenario: {} ({} ranks)", self.name, self.ranks);

        let result = if self.ranks > 1 {
            run_distributed(&self.config, &self.particles, self.ranks)?
        } else {
            run_single_instance(&self.config, &self.particles)?
        };

        let mut checks = vec![validate_particle_count(&result, self.particles.len())];
        checks.extend(self.expected.forces.iter().map(|e| validate_force(&result, e)));
        if let Some(tolerance) = self.expected.net_force {
            checks.push(validate_net_force(&result, tolerance));
        }
        if let Some(cap) = self.expected.max_force {
            checks.push(validate_max_force(&result, cap));
        }
        if let Some(tolerance) = self.expected.single_instance {
            let reference = run_single_instance(&self.config, &self.particles)?;
            checks.push(validate_against_reference(&result, &reference, tolerance));
        }

        let passed = checks.iter().all(|c| c.passed);
        tracing::info!("Scenario {} {}", self.name, if passed { "passed" } else { "failed" });
        Ok(ScenarioResult {
            name: self.name.clone(),
            passed,
            checks,
            n_particles: self.particles.len(),
            owned_per_rank: result.owned_per_rank,
        })
    }
}

fn validate_particle_count(result: &DistributedResult, expected: usize) -> CheckResult {
    let name = "Particle Count";
    if result.records.len() == expected {
        CheckResult::pass(name)
    } else {
        CheckResult::fail(name, format!("{} records for {expected} particles", result.records.len()))
    }
}

fn validate_force(result: &DistributedResult, expected: &ExpectedForce) -> CheckResult {
    let name = format!("Force on particle {}", expected.id);
    let Some(record) = result.record(expected.id) else {
        return CheckResult::fail(name, "particle missing from result".to_string());
    };
    let error = analytical::relative_error(record.force, expected.force);
    if error > expected.tolerance {
        return CheckResult::fail(
            name,
            format!("force {} vs expected {} (error {error:.2e})", record.force, expected.force),
        );
    }
    if let Some(torque) = expected.torque {
        let error = analytical::relative_error(record.torque, torque);
        if error > expected.tolerance {
            return CheckResult::fail(
                name,
                format!("torque {} vs expected {torque} (error {error:.2e})", record.torque),
            );
        }
    }
    CheckResult::pass(name)
}

fn validate_net_force(result: &DistributedResult, tolerance: f64) -> CheckResult {
    let name = "Net Force";
    let total: DVec3 = result.records.iter().map(|r| r.force).sum();
    let scale: f64 = result.records.iter().map(|r| r.force.length()).sum();
    let relative = total.length() / scale.max(1.0);
    if relative <= tolerance {
        CheckResult::pass(name)
    } else {
        CheckResult::fail(name, format!("net force {total} (relative {relative:.2e})"))
    }
}

fn validate_max_force(result: &DistributedResult, cap: f64) -> CheckResult {
    let name = "Force Cap";
    // Capping rescales to the cap length, which may land a rounding step above it.
    let limit = cap * (1.0 + 1e-12);
    match result.records.iter().find(|r| r.force.length() > limit) {
        None => CheckResult::pass(name),
        Some(r) => CheckResult::fail(name, format!("particle {} has |F| = {} > {cap}", r.id, r.force.length())),
    }
}

fn validate_against_reference(result: &DistributedResult, reference: &DistributedResult, tolerance: f64) -> CheckResult {
    let name = "Single-Rank Agreement";
    if result.records.len() != reference.records.len() {
        return CheckResult::fail(
            name,
            format!("{} records vs {} on a single rank", result.records.len(), reference.records.len()),
        );
    }
    let mut worst = (0.0_f64, 0);
    for (a, b) in result.records.iter().zip(&reference.records) {
        if a.id != b.id {
            return CheckResult::fail(name, format!("record order differs at particle {}", b.id));
        }
        let error = analytical::relative_error(a.force, b.force).max(analytical::relative_error(a.torque, b.torque));
        if error > worst.0 {
            worst = (error, a.id);
        }
    }
    if worst.0 <= tolerance {
        CheckResult::pass(name)
    } else {
        CheckResult::fail(name, format!("particle {} deviates by {:.2e}", worst.1, worst.0))
    }
}

impl ScenarioResult {
    /// Print a formatted summary of the scenario results
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(80));
        println!("Scenario: {}", self.name);
        println!("{}", "=".repeat(80));
        println!("Status: {}", if self.passed { "PASSED" } else { "FAILED" });
        println!("Particles: {}", self.n_particles);
        println!("Particles per rank: {:?}", self.owned_per_rank);
        println!("\nValidation Checks:");
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            print!("  [{}] {}", status, check.name);
            if let Some(ref msg) = check.message {
                print!(" - {}", msg);
            }
            println!();
        }
        println!("{}", "=".repeat(80));
    }
}
