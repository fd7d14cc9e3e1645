//! Propagation mode flags.
//!
//! Each particle carries the set of propagation schemes that move it. The
//! union over all particles on all ranks decides which coupling stages the
//! force pipeline has to run.

use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Bit set of propagation schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PropagationMode(u32);

impl PropagationMode {
    /// No propagation.
    pub const NONE: Self = Self(0);
    /// Translation by the system integrator.
    pub const TRANS_SYSTEM_DEFAULT: Self = Self(1 << 0);
    /// Rotation by the system integrator.
    pub const ROT_SYSTEM_DEFAULT: Self = Self(1 << 1);
    /// Translation slaved to a relative virtual-site reference.
    pub const TRANS_VS_RELATIVE: Self = Self(1 << 2);
    /// Rotation slaved to a relative virtual-site reference.
    pub const ROT_VS_RELATIVE: Self = Self(1 << 3);
    /// Translation by momentum exchange with a fluid.
    pub const TRANS_LB_MOMENTUM_EXCHANGE: Self = Self(1 << 4);

    /// Default for physical particles.
    pub const SYSTEM_DEFAULT: Self = Self(Self::TRANS_SYSTEM_DEFAULT.0 | Self::ROT_SYSTEM_DEFAULT.0);
    /// Default for relative virtual sites.
    pub const VS_RELATIVE: Self = Self(Self::TRANS_VS_RELATIVE.0 | Self::ROT_VS_RELATIVE.0);

    /// Raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Build from raw bits.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// `true` if any flag of `other` is set in `self`.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for PropagationMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PropagationMode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// System-wide propagation state read by the force pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Propagation {
    /// Union of all particles' modes across all ranks.
    pub used_propagations: PropagationMode,
    /// Set while the current forces are stale.
    pub recalc_forces: bool,
}

impl Propagation {
    /// Whether relative virtual sites need their forces transferred back.
    pub fn needs_vs_back_transfer(&self) -> bool {
        self.used_propagations.intersects(PropagationMode::VS_RELATIVE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_and_intersection() {
        let mut used = PropagationMode::NONE;
        assert!(!used.intersects(PropagationMode::VS_RELATIVE));
        used |= PropagationMode::ROT_VS_RELATIVE;
        assert!(used.intersects(PropagationMode::VS_RELATIVE));
        assert!(!used.intersects(PropagationMode::SYSTEM_DEFAULT));
    }

    #[test]
    fn back_transfer_flag() {
        let propagation = Propagation {
            used_propagations: PropagationMode::SYSTEM_DEFAULT | PropagationMode::TRANS_VS_RELATIVE,
            recalc_forces: true,
        };
        assert!(propagation.needs_vs_back_transfer());
        assert!(!Propagation::default().needs_vs_back_transfer());
    }
}
