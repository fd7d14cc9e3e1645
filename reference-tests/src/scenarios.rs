//! Reference scenarios with closed-form expectations.

use glam::{DQuat, DVec3};
use kernel::{Bond, ConfigError, Particle};
use orchestrator::ForceConfig;

use crate::analytical::{capped, debye_hueckel_force, harmonic_force, lennard_jones_force};
use crate::{ExpectedForce, ExpectedResult, ReferenceScenario};

const TOLERANCE: f64 = 1e-10;

fn pair_expectation(id_a: u64, id_b: u64, force_on_a: DVec3, torque: Option<DVec3>) -> Vec<ExpectedForce> {
    vec![
        ExpectedForce { id: id_a, force: force_on_a, torque, tolerance: TOLERANCE },
        ExpectedForce { id: id_b, force: -force_on_a, torque, tolerance: TOLERANCE },
    ]
}

/// Two Lennard-Jones particles inside the cutoff.
pub fn lennard_jones_dimer() -> Result<ReferenceScenario, ConfigError> {
    let config = ForceConfig::from_json_str(
        r#"{
            "name": "lj-dimer",
            "domain": { "min": [0.0, 0.0, 0.0], "max": [5.0, 5.0, 5.0] },
            "skin": 0.3,
            "non_bonded": [
                { "type_a": 0, "type_b": 0,
                  "lennard_jones": { "eps": 1.0, "sig": 1.0, "cut": 2.5 } }
            ]
        }"#,
    )?;
    let a = DVec3::new(2.0, 2.0, 2.0);
    let b = a + DVec3::new(0.9, 0.5, -0.3);
    let f = lennard_jones_force(1.0, 1.0, 2.5, 0.0, a - b);
    Ok(ReferenceScenario {
        name: "Lennard-Jones Dimer".to_string(),
        config,
        particles: vec![Particle::new(0, a), Particle::new(1, b)],
        ranks: 1,
        expected: ExpectedResult { forces: pair_expectation(0, 1, f, None), ..Default::default() },
    })
}

/// Gay-Berne with unit aspect and energy ratios reduces to Lennard-Jones
/// whatever the orientations, and exerts no torque.
pub fn isotropic_gay_berne() -> Result<ReferenceScenario, ConfigError> {
    let config = ForceConfig::from_json_str(
        r#"{
            "name": "isotropic-gb",
            "domain": { "min": [0.0, 0.0, 0.0], "max": [5.0, 5.0, 5.0] },
            "skin": 0.3,
            "non_bonded": [
                { "type_a": 1, "type_b": 1,
                  "gay_berne": { "eps": 1.5, "sig": 1.0, "cut": 2.5,
                                 "k1": 1.0, "k2": 1.0, "mu": 1.0, "nu": 1.0 } }
            ]
        }"#,
    )?;
    let a = DVec3::new(2.0, 2.0, 2.0);
    let b = a + DVec3::new(1.15, 1.15, 0.0) / 2f64.sqrt();
    let particles = vec![
        Particle::new(0, a)
            .with_type(1)
            .with_quat(DQuat::from_axis_angle(DVec3::new(1.0, 2.0, 0.5).normalize(), 0.8)),
        Particle::new(1, b)
            .with_type(1)
            .with_quat(DQuat::from_axis_angle(DVec3::Y, 1.9)),
    ];
    let f = lennard_jones_force(1.5, 1.0, 2.5, 0.0, a - b);
    Ok(ReferenceScenario {
        name: "Isotropic Gay-Berne".to_string(),
        config,
        particles,
        ranks: 1,
        expected: ExpectedResult { forces: pair_expectation(0, 1, f, Some(DVec3::ZERO)), ..Default::default() },
    })
}

/// Two opposite charges under a screened Coulomb kernel.
pub fn screened_charges() -> Result<ReferenceScenario, ConfigError> {
    let config = ForceConfig::from_json_str(
        r#"{
            "name": "screened-charges",
            "domain": { "min": [0.0, 0.0, 0.0], "max": [6.0, 6.0, 6.0] },
            "skin": 0.3,
            "electrostatics": {
                "kernel": { "debye_hueckel": { "prefactor": 2.0, "kappa": 0.5, "r_cut": 4.0 } }
            }
        }"#,
    )?;
    let a = DVec3::new(2.0, 3.0, 3.0);
    let b = DVec3::new(3.5, 3.0, 3.0);
    let f = debye_hueckel_force(2.0, 0.5, 4.0, -1.0, a - b);
    Ok(ReferenceScenario {
        name: "Screened Charges".to_string(),
        config,
        particles: vec![Particle::new(0, a).with_charge(1.0), Particle::new(1, b).with_charge(-1.0)],
        ranks: 1,
        expected: ExpectedResult { forces: pair_expectation(0, 1, f, None), ..Default::default() },
    })
}

fn external_force_particles() -> Vec<Particle> {
    vec![
        Particle::new(0, DVec3::new(1.0, 1.0, 1.0)).with_ext_force(DVec3::new(5.0, 0.0, 0.0)),
        Particle::new(1, DVec3::new(4.0, 1.0, 1.0)).with_ext_force(DVec3::new(0.0, 1.0, 0.0)),
        Particle::new(2, DVec3::new(7.0, 1.0, 1.0)).with_ext_force(DVec3::new(-3.0, 4.0, 0.0)),
    ]
}

fn external_force_config(force_cap: f64) -> Result<ForceConfig, ConfigError> {
    let mut config = ForceConfig::from_json_str(
        r#"{
            "name": "external-force",
            "domain": { "min": [0.0, 0.0, 0.0], "max": [8.0, 2.0, 2.0] },
            "skin": 0.2
        }"#,
    )?;
    config.force_cap = force_cap;
    Ok(config)
}

fn external_force_scenario(name: &str, force_cap: f64, ranks: usize) -> Result<ReferenceScenario, ConfigError> {
    let particles = external_force_particles();
    let forces = particles
        .iter()
        .map(|p| ExpectedForce {
            id: p.id,
            force: capped(p.ext_force, force_cap),
            torque: Some(DVec3::ZERO),
            tolerance: TOLERANCE,
        })
        .collect();
    Ok(ReferenceScenario {
        name: name.to_string(),
        config: external_force_config(force_cap)?,
        particles,
        ranks,
        expected: ExpectedResult {
            forces,
            max_force: (force_cap > 0.0).then_some(force_cap),
            ..Default::default()
        },
    })
}

/// Non-interacting particles feel exactly their external force.
pub fn external_force_only() -> Result<ReferenceScenario, ConfigError> {
    external_force_scenario("External Force Only", 0.0, 2)
}

/// External forces longer than the cap are rescaled to it, shorter ones
/// pass unchanged.
pub fn capped_external_force() -> Result<ReferenceScenario, ConfigError> {
    external_force_scenario("Capped External Force", 2.0, 2)
}

/// A compressed harmonic bond whose partners sit in different slabs.
pub fn bond_across_ranks() -> Result<ReferenceScenario, ConfigError> {
    let config = ForceConfig::from_json_str(
        r#"{
            "name": "bond-across-ranks",
            "domain": { "min": [0.0, 0.0, 0.0], "max": [4.0, 1.0, 1.0] },
            "skin": 0.2,
            "bonded": [ { "harmonic": { "k": 10.0, "r0": 1.0 } } ]
        }"#,
    )?;
    let a = DVec3::new(1.8, 0.5, 0.5);
    let b = DVec3::new(2.3, 0.5, 0.5);
    let f = harmonic_force(10.0, 1.0, a - b);
    Ok(ReferenceScenario {
        name: "Bond Across Ranks".to_string(),
        config,
        particles: vec![Particle::new(0, a).with_bond(Bond::new(0, &[1])), Particle::new(1, b)],
        ranks: 2,
        expected: ExpectedResult {
            forces: pair_expectation(0, 1, f, None),
            net_force: Some(TOLERANCE),
            ..Default::default()
        },
    })
}

/// Charged, bonded lattice on four ranks against a single-rank run.
pub fn lattice_across_ranks() -> Result<ReferenceScenario, ConfigError> {
    const NX: u64 = 8;
    const NY: u64 = 2;
    let config = ForceConfig::from_json_str(
        r#"{
            "name": "lattice",
            "domain": { "min": [0.0, 0.0, 0.0], "max": [8.8, 2.2, 2.2] },
            "skin": 0.3,
            "non_bonded": [
                { "type_a": 0, "type_b": 0,
                  "lennard_jones": { "eps": 1.0, "sig": 1.0, "cut": 2.5 } }
            ],
            "bonded": [ { "harmonic": { "k": 5.0, "r0": 1.0 } } ],
            "electrostatics": {
                "kernel": { "debye_hueckel": { "prefactor": 1.0, "kappa": 1.0, "r_cut": 2.5 } }
            }
        }"#,
    )?;
    let index = |ix: u64, iy: u64, iz: u64| (ix * NY + iy) * NY + iz;
    let mut particles = Vec::new();
    for ix in 0..NX {
        for iy in 0..NY {
            for iz in 0..NY {
                let id = index(ix, iy, iz);
                let jitter = 0.05 * DVec3::new((id as f64).sin(), (id as f64 * 1.7).cos(), (id as f64 * 0.3).sin());
                let pos = DVec3::new(ix as f64 + 0.5, iy as f64 + 0.5, iz as f64 + 0.5) * 1.1 + jitter;
                let mut p = Particle::new(id, pos).with_charge(if id % 2 == 0 { 0.4 } else { -0.4 });
                if ix + 1 < NX {
                    p = p.with_bond(Bond::new(0, &[index(ix + 1, iy, iz)]));
                }
                particles.push(p);
            }
        }
    }
    Ok(ReferenceScenario {
        name: "Lattice Across Ranks".to_string(),
        config,
        particles,
        ranks: 4,
        expected: ExpectedResult {
            net_force: Some(1e-9),
            single_instance: Some(1e-9),
            ..Default::default()
        },
    })
}

/// All reference scenarios.
pub fn all_scenarios() -> Result<Vec<ReferenceScenario>, ConfigError> {
    Ok(vec![
        lennard_jones_dimer()?,
        isotropic_gay_berne()?,
        screened_charges()?,
        external_force_only()?,
        capped_external_force()?,
        bond_across_ranks()?,
        lattice_across_ranks()?,
    ])
}
