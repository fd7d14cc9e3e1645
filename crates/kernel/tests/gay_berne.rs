//! Gay-Berne force and torques against finite differences of the energy.

use glam::{DQuat, DVec3};
use kernel::GayBerne;

const H: f64 = 1.0e-6;

fn potential() -> GayBerne {
    GayBerne::new(1.0, 1.0, 4.0, 3.0, 5.0, 2.0, 1.0).unwrap()
}

fn configuration() -> (DVec3, DVec3, DVec3) {
    let u1 = DVec3::new(1.0, 0.3, 0.2).normalize();
    let u2 = DVec3::new(-0.2, 1.0, 0.5).normalize();
    let d = DVec3::new(2.6, 0.5, -0.3);
    (u1, u2, d)
}

fn assert_close(label: &str, analytic: f64, numeric: f64) {
    let tol = 1.0e-5 * numeric.abs().max(1.0);
    assert!(
        (analytic - numeric).abs() < tol,
        "{label}: analytic {analytic}, finite difference {numeric}"
    );
}

#[test]
fn force_is_negative_energy_gradient() {
    let gb = potential();
    let (u1, u2, d) = configuration();
    let pf = gb.pair_force(u1, u2, d, d.length());
    for (label, axis) in [("fx", DVec3::X), ("fy", DVec3::Y), ("fz", DVec3::Z)] {
        let plus = d + H * axis;
        let minus = d - H * axis;
        let numeric = -(gb.pair_energy(u1, u2, plus, plus.length()) - gb.pair_energy(u1, u2, minus, minus.length()))
            / (2.0 * H);
        assert_close(label, pf.force.dot(axis), numeric);
    }
}

#[test]
fn torques_are_negative_rotational_derivatives() {
    let gb = potential();
    let (u1, u2, d) = configuration();
    let dist = d.length();
    let pf = gb.pair_force(u1, u2, d, dist);
    for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
        let rot_plus = DQuat::from_axis_angle(axis, H);
        let rot_minus = DQuat::from_axis_angle(axis, -H);

        let numeric1 =
            -(gb.pair_energy(rot_plus * u1, u2, d, dist) - gb.pair_energy(rot_minus * u1, u2, d, dist)) / (2.0 * H);
        assert_close("torque1", pf.torque1.dot(axis), numeric1);

        let numeric2 =
            -(gb.pair_energy(u1, rot_plus * u2, d, dist) - gb.pair_energy(u1, rot_minus * u2, d, dist)) / (2.0 * H);
        assert_close("torque2", pf.torque2.dot(axis), numeric2);
    }
}

#[test]
fn rigid_rotation_leaves_energy_unchanged() {
    let gb = potential();
    let (u1, u2, d) = configuration();
    let rot = DQuat::from_axis_angle(DVec3::new(0.3, -0.4, 0.8).normalize(), 0.7);
    let e = gb.pair_energy(u1, u2, d, d.length());
    let e_rot = gb.pair_energy(rot * u1, rot * u2, rot * d, d.length());
    assert!((e - e_rot).abs() < 1e-12 * e.abs().max(1.0));
}

#[test]
fn beyond_cutoff_nothing_acts() {
    let gb = potential();
    let (u1, u2, _) = configuration();
    let d = DVec3::new(4.0, 0.0, 0.0);
    let pf = gb.pair_force(u1, u2, d, 4.0);
    assert_eq!(pf.force, DVec3::ZERO);
    assert_eq!(pf.torque1, DVec3::ZERO);
}
