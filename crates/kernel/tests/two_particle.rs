//! Two-particle symmetry test.
//!
//! Verifies Newton's 3rd law (forces equal and opposite) and the closed-form
//! Lennard-Jones force for an isolated pair, with and without charges.

use glam::DVec3;
use kernel::bond_breakage::BondBreakage;
use kernel::forces::init_forces;
use kernel::short_range::short_range_loop;
use kernel::{
    BondedInteractions, CellStructure, CollisionQueue, CoulombKernel, InteractionTable, LennardJones, LocalCells,
    PairKernels, Particle, VerletCriterion,
};

/// Two particles separated by `r` along the x axis.
fn setup_two_particles(r: f64, q: f64) -> LocalCells {
    LocalCells::from_particles([
        Particle::new(0, DVec3::ZERO).with_charge(q),
        Particle::new(1, DVec3::new(r, 0.0, 0.0)).with_charge(q),
    ])
}

fn lj_table(eps: f64, sig: f64, cut: f64) -> InteractionTable {
    let mut table = InteractionTable::new();
    table
        .set_lennard_jones(0, 0, LennardJones::new(eps, sig, cut, 0.0, 0.0).unwrap())
        .unwrap();
    table
}

fn evaluate(cells: &mut LocalCells, table: &InteractionTable, coulomb: Option<&CoulombKernel>) {
    let criterion = VerletCriterion {
        skin: 0.2,
        table,
        coulomb_cut: coulomb.map_or(0.0, |c| c.cutoff()),
        dipolar_cut: 0.0,
        collision_cut: 0.0,
    };
    cells.update_verlet_list(&criterion);
    let local = cells.local_range();
    let ghosts = cells.ghost_range();
    init_forces(cells.particles_mut(), local, ghosts);
    let kernels = PairKernels { table: Some(table), coulomb, ..Default::default() };
    short_range_loop(
        cells,
        &BondedInteractions::new(),
        &mut BondBreakage::new(),
        &criterion,
        &kernels,
        &mut CollisionQueue::new(),
    )
    .unwrap();
}

#[test]
fn forces_equal_and_opposite() {
    let table = lj_table(1.0, 1.0, 2.5);
    let mut cells = setup_two_particles(1.05, 0.0);
    evaluate(&mut cells, &table, None);
    let p = cells.particles();

    let tol = 1.0e-12;
    let sum = p.force[0] + p.force[1];
    assert!(sum.x.abs() < tol, "fx not equal and opposite: {:?} {:?}", p.force[0], p.force[1]);
    assert!(sum.y.abs() < tol, "fy not equal and opposite");
    assert!(sum.z.abs() < tol, "fz not equal and opposite");
}

#[test]
fn lennard_jones_closed_form() {
    let (eps, sig) = (1.5, 0.9);
    let table = lj_table(eps, sig, 3.0);
    for &r in &[0.95, 1.1, 1.5, 2.2] {
        let mut cells = setup_two_particles(r, 0.0);
        evaluate(&mut cells, &table, None);
        let sr6 = (sig / r).powi(6);
        let magnitude = 24.0 * eps / r * (2.0 * sr6 * sr6 - sr6);
        let f1 = cells.particles().force[1];
        assert!(
            (f1.x - magnitude).abs() < 1e-10 * magnitude.abs().max(1.0),
            "r={r}: expected {magnitude}, got {}",
            f1.x
        );
        assert!(f1.y.abs() < 1e-14 && f1.z.abs() < 1e-14);
    }
}

#[test]
fn lennard_jones_minimum_has_zero_force() {
    let table = lj_table(1.0, 1.0, 2.5);
    let r_min = 2.0_f64.powf(1.0 / 6.0);
    let mut cells = setup_two_particles(r_min, 0.0);
    evaluate(&mut cells, &table, None);
    assert!(cells.particles().force[0].length() < 1e-12);
}

#[test]
fn coulomb_adds_to_lennard_jones() {
    let table = lj_table(1.0, 1.0, 2.5);
    let coulomb = CoulombKernel::Cutoff { prefactor: 2.0, r_cut: 3.0 };
    let r = 1.3;

    let mut plain = setup_two_particles(r, 1.0);
    evaluate(&mut plain, &table, None);
    let mut charged = setup_two_particles(r, 1.0);
    evaluate(&mut charged, &table, Some(&coulomb));

    let extra = charged.particles().force[1].x - plain.particles().force[1].x;
    let expected = 2.0 / (r * r);
    assert!((extra - expected).abs() < 1e-12, "coulomb contribution {extra}, expected {expected}");
    let sum = charged.particles().force[0] + charged.particles().force[1];
    assert!(sum.length() < 1e-12);
}

#[test]
fn external_force_only() {
    let table = InteractionTable::new();
    let mut cells = LocalCells::from_particles([
        Particle::new(0, DVec3::ZERO).with_ext_force(DVec3::new(0.0, 0.0, -3.0)),
        Particle::new(1, DVec3::new(0.5, 0.0, 0.0)),
    ]);
    evaluate(&mut cells, &table, None);
    let p = cells.particles();
    assert_eq!(p.force[0], DVec3::new(0.0, 0.0, -3.0));
    assert_eq!(p.force[1], DVec3::ZERO);
}
