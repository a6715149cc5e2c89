//! Truncated separable Gaussian spreading kernel.
//!
//! The kernel lives in lattice units: an anisotropic map transform turns the
//! single physical spreading width into one sigma per lattice axis. Weights
//! are un-normalized (`exp(-d^2 / 2 sigma^2)`, no `1/(sigma sqrt(2 pi))`
//! prefactor); the particle amplitude carries the physical scale.

use glam::Vec3;

use crate::error::ConfigError;
use crate::transform::ScaleOnly;

/// Kernel shape shared by the rasterizer and the force back-projection.
#[derive(Clone, Copy, Debug)]
pub struct SpreadKernel {
    /// Per-axis standard deviation, in lattice cells
    sigma: Vec3,
    /// Truncation radius in multiples of sigma
    n_sigma: f32,
    /// Support half-width per axis, in whole cells
    half_width: [i64; 3],
    /// Precomputed `1 / sigma^2` per axis
    inv_sigma_sq: [f32; 3],
}

impl SpreadKernel {
    /// Derive the kernel from a physical spreading width and the scale-only
    /// part of the simulation→lattice transform. Runs once at restraint
    /// construction.
    pub fn from_physical(
        sigma: f32,
        n_sigma: f32,
        scale: &ScaleOnly,
    ) -> Result<Self, ConfigError> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(ConfigError::NonPositiveSpreadingWidth(sigma));
        }
        if !n_sigma.is_finite() || n_sigma <= 0.0 {
            return Err(ConfigError::NonPositiveTruncation(n_sigma));
        }
        let factors = scale.factors();
        if !factors.is_finite() || factors.x == 0.0 || factors.y == 0.0 || factors.z == 0.0 {
            return Err(ConfigError::DegenerateScale(factors));
        }

        // A mirrored axis still spreads with a positive width.
        let sigma_lattice = scale.apply(Vec3::splat(sigma)).abs();
        Ok(Self::from_lattice(sigma_lattice, n_sigma))
    }

    /// Build directly from per-axis lattice sigmas. Callers guarantee the
    /// sigmas are positive and finite.
    pub(crate) fn from_lattice(sigma: Vec3, n_sigma: f32) -> Self {
        let half_width = [
            (n_sigma * sigma.x).ceil() as i64,
            (n_sigma * sigma.y).ceil() as i64,
            (n_sigma * sigma.z).ceil() as i64,
        ];
        let inv_sigma_sq = [
            1.0 / (sigma.x * sigma.x),
            1.0 / (sigma.y * sigma.y),
            1.0 / (sigma.z * sigma.z),
        ];
        Self {
            sigma,
            n_sigma,
            half_width,
            inv_sigma_sq,
        }
    }

    /// Per-axis standard deviation in lattice cells.
    pub fn sigma(&self) -> Vec3 {
        self.sigma
    }

    /// Truncation radius in multiples of sigma.
    pub fn n_sigma(&self) -> f32 {
        self.n_sigma
    }

    /// Support half-width per axis: cells farther than this from the closest
    /// lattice point receive no contribution.
    pub fn half_width(&self) -> [i64; 3] {
        self.half_width
    }

    /// Un-normalized 1-D Gaussian weight at signed distance `delta` (cells)
    /// along `axis`.
    #[inline]
    pub fn weight_1d(&self, axis: usize, delta: f32) -> f32 {
        (-0.5 * delta * delta * self.inv_sigma_sq[axis]).exp()
    }

    /// Derivative of the 1-D weight with respect to the *particle* position:
    /// `d/dr exp(-(c - r)^2 / 2 sigma^2) = (delta / sigma^2) * weight` with
    /// `delta = c - r`.
    #[inline]
    pub fn dweight_1d(&self, axis: usize, delta: f32) -> f32 {
        delta * self.inv_sigma_sq[axis] * self.weight_1d(axis, delta)
    }
}
