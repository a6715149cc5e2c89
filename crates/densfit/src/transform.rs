//! Coordinate transforms between simulation space and the map lattice.

use glam::Vec3;

/// The anisotropic scale-only part of a [`TranslateAndScale`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleOnly {
    factors: Vec3,
}

impl ScaleOnly {
    pub fn new(factors: Vec3) -> Self {
        Self { factors }
    }

    /// Per-axis scale factors.
    pub fn factors(&self) -> Vec3 {
        self.factors
    }

    /// Scale a point or vector into lattice units.
    #[inline]
    pub fn apply(&self, v: Vec3) -> Vec3 {
        v * self.factors
    }

    /// Map a lattice-space vector back into simulation units by dividing
    /// each component by its scale factor. Components on axes whose scale
    /// factor is exactly zero pass through unmodified; the restraint cannot
    /// recover a simulation-space component there and must not produce
    /// non-finite values.
    #[inline]
    pub fn inverse_ignoring_zero_scale(&self, v: Vec3) -> Vec3 {
        let f = self.factors;
        Vec3::new(
            if f.x == 0.0 { v.x } else { v.x / f.x },
            if f.y == 0.0 { v.y } else { v.y / f.y },
            if f.z == 0.0 { v.z } else { v.z / f.z },
        )
    }
}

/// Affine simulation→lattice transform: translate, then scale per axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TranslateAndScale {
    /// Translation applied in simulation space, before scaling
    pub shift: Vec3,
    /// Per-axis scale from simulation units to lattice cells
    pub scale: Vec3,
}

impl TranslateAndScale {
    pub const IDENTITY: Self = Self {
        shift: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn new(scale: Vec3, shift: Vec3) -> Self {
        Self { shift, scale }
    }

    /// Transform one simulation-space point into lattice coordinates.
    #[inline]
    pub fn apply(&self, p: Vec3) -> Vec3 {
        (p + self.shift) * self.scale
    }

    /// Transform a batch of points in place.
    pub fn apply_all(&self, points: &mut [Vec3]) {
        for p in points {
            *p = self.apply(*p);
        }
    }

    /// The scale-only part, used for kernel derivation and for mapping
    /// lattice-space forces back to simulation space.
    pub fn scale_only(&self) -> ScaleOnly {
        ScaleOnly::new(self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_translates_then_scales() {
        let t = TranslateAndScale::new(Vec3::new(2.0, 4.0, 0.5), Vec3::new(1.0, -1.0, 0.0));
        let p = t.apply(Vec3::new(0.0, 3.0, 8.0));
        assert_eq!(p, Vec3::new(2.0, 8.0, 4.0));
    }

    #[test]
    fn test_scale_round_trip_recovers_vector() {
        let scale = ScaleOnly::new(Vec3::new(2.0, 0.25, 5.0));
        let v = Vec3::new(1.0, -2.0, 3.0);
        let back = scale.inverse_ignoring_zero_scale(scale.apply(v));
        assert!((back - v).length() < 1e-6, "round trip drifted: {back}");
    }

    #[test]
    fn test_zero_scale_axis_passes_through_unmodified() {
        let scale = ScaleOnly::new(Vec3::new(2.0, 0.0, 5.0));
        let v = Vec3::new(4.0, 7.0, 10.0);
        let inv = scale.inverse_ignoring_zero_scale(v);
        assert_eq!(inv, Vec3::new(2.0, 7.0, 2.0));
        assert!(inv.is_finite());
    }
}
