//! Closed-form pair forces for reference validation.
//!
//! Each function returns the force on particle 1 for a separation
//! `d = r1 - r2`, written out from the potential directly rather than
//! through the kernel's pair routines.

use glam::DVec3;

/// Lennard-Jones force magnitude along the separation at distance `r`.
///
/// ```text
/// F(r) = 24 eps / r_off * [2 (sig/r_off)^12 - (sig/r_off)^6],  r_off = r - offset
/// ```
///
/// Positive values are repulsive. Zero at and beyond `cut + offset`.
pub fn lennard_jones_magnitude(eps: f64, sig: f64, cut: f64, offset: f64, r: f64) -> f64 {
    if r >= cut + offset || r <= offset {
        return 0.0;
    }
    let r_off = r - offset;
    let sr6 = (sig / r_off).powi(6);
    24.0 * eps / r_off * (2.0 * sr6 * sr6 - sr6)
}

/// Lennard-Jones force on particle 1.
pub fn lennard_jones_force(eps: f64, sig: f64, cut: f64, offset: f64, d: DVec3) -> DVec3 {
    let r = d.length();
    lennard_jones_magnitude(eps, sig, cut, offset, r) * d / r
}

/// Distance of the Lennard-Jones minimum, where the force vanishes.
pub fn lennard_jones_minimum(sig: f64, offset: f64) -> f64 {
    offset + 2f64.powf(1.0 / 6.0) * sig
}

/// Screened Coulomb force on particle 1.
///
/// ```text
/// F(r) = l_B q1 q2 exp(-kappa r) (1 + kappa r) / r^2
/// ```
pub fn debye_hueckel_force(prefactor: f64, kappa: f64, cut: f64, q1q2: f64, d: DVec3) -> DVec3 {
    let r = d.length();
    if r >= cut {
        return DVec3::ZERO;
    }
    prefactor * q1q2 * (-kappa * r).exp() * (1.0 + kappa * r) / (r * r) * d / r
}

/// Harmonic bond force on particle 1 for rest length `r0`.
pub fn harmonic_force(k: f64, r0: f64, d: DVec3) -> DVec3 {
    let r = d.length();
    -k * (r - r0) * d / r
}

/// Force after capping: longer than `cap` is rescaled to exactly `cap`.
pub fn capped(force: DVec3, cap: f64) -> DVec3 {
    let len = force.length();
    if cap > 0.0 && len > cap {
        force * (cap / len)
    } else {
        force
    }
}

/// Deviation from `expected`, relative to its length floored at one.
pub fn relative_error(actual: DVec3, expected: DVec3) -> f64 {
    (actual - expected).length() / expected.length().max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lennard_jones_vanishes_at_minimum() {
        let r_min = lennard_jones_minimum(1.0, 0.0);
        assert!(lennard_jones_magnitude(1.0, 1.0, 2.5, 0.0, r_min).abs() < 1e-12);
    }

    #[test]
    fn test_lennard_jones_at_sigma() {
        // At r = sig: F = 24 eps / sig
        let f = lennard_jones_magnitude(2.0, 1.5, 3.0, 0.0, 1.5);
        assert!((f - 24.0 * 2.0 / 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_lennard_jones_offset_translates_curve() {
        let plain = lennard_jones_magnitude(1.0, 1.0, 2.5, 0.0, 1.1);
        let shifted = lennard_jones_magnitude(1.0, 1.0, 2.5, 0.4, 1.5);
        assert!((plain - shifted).abs() < 1e-12);
    }

    #[test]
    fn test_lennard_jones_cutoff_is_strict() {
        assert_eq!(lennard_jones_magnitude(1.0, 1.0, 2.5, 0.0, 2.5), 0.0);
        assert!(lennard_jones_magnitude(1.0, 1.0, 2.5, 0.0, 2.4999) != 0.0);
    }

    #[test]
    fn test_debye_hueckel_without_screening_is_coulomb() {
        let f = debye_hueckel_force(1.0, 0.0, 5.0, 1.0, DVec3::new(2.0, 0.0, 0.0));
        assert!((f.x - 0.25).abs() < 1e-15);
    }

    #[test]
    fn test_capping_keeps_direction() {
        let f = capped(DVec3::new(3.0, 4.0, 0.0), 2.5);
        assert!((f.length() - 2.5).abs() < 1e-12);
        assert!((f.normalize() - DVec3::new(0.6, 0.8, 0.0)).length() < 1e-12);
        assert_eq!(capped(DVec3::X, 0.0), DVec3::X);
    }

    #[test]
    fn test_harmonic_restores_rest_length() {
        let f = harmonic_force(10.0, 1.0, DVec3::new(1.2, 0.0, 0.0));
        assert!((f.x + 2.0).abs() < 1e-12);
    }
}
