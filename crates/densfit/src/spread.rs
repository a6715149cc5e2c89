//! Rasterization of weighted point samples onto the density lattice.
//!
//! Each sample scatters `amplitude * wx * wy * wz` over the truncated
//! kernel support around its closest lattice point, with the per-axis 1-D
//! weights computed once per sample and reused across the stencil.

use glam::Vec3;

use crate::grid::DensityGrid;
use crate::kernel::SpreadKernel;

/// Closest lattice point to a lattice-space position.
#[inline]
pub(crate) fn closest_cell(point: Vec3) -> [i64; 3] {
    [
        point.x.round() as i64,
        point.y.round() as i64,
        point.z.round() as i64,
    ]
}

/// Accumulates Gaussian point spreads into an owned density buffer.
pub struct GaussTransform {
    grid: DensityGrid,
    kernel: SpreadKernel,
    // Per-axis 1-D weight scratch, sized to the kernel support
    wx: Vec<f32>,
    wy: Vec<f32>,
    wz: Vec<f32>,
}

impl GaussTransform {
    /// Create a transform over a zeroed buffer with the given extents.
    pub fn new(extents: (usize, usize, usize), kernel: SpreadKernel) -> Self {
        let (nx, ny, nz) = extents;
        let [hx, hy, hz] = kernel.half_width();
        Self {
            grid: DensityGrid::new(nx, ny, nz),
            kernel,
            wx: vec![0.0; (2 * hx + 1) as usize],
            wy: vec![0.0; (2 * hy + 1) as usize],
            wz: vec![0.0; (2 * hz + 1) as usize],
        }
    }

    /// The kernel shared with the force back-projection.
    pub fn kernel(&self) -> &SpreadKernel {
        &self.kernel
    }

    /// Reset the buffer; call before each evaluation's accumulation.
    pub fn set_zero(&mut self) {
        self.grid.set_zero();
    }

    /// Read-only view of the accumulated density.
    pub fn view(&self) -> &DensityGrid {
        &self.grid
    }

    /// Raw mutable access to the buffer values, for the cross-worker
    /// reduction step.
    pub fn data_mut(&mut self) -> &mut [f32] {
        self.grid.data_mut()
    }

    /// Whether the full kernel support around `point` lies inside the
    /// lattice. A support box that leaves the lattice is a restraint setup
    /// error, never clamped; callers decide before spreading.
    pub fn support_in_bounds(&self, point: Vec3) -> bool {
        if !point.is_finite() {
            return false;
        }
        let [cx, cy, cz] = closest_cell(point);
        let [hx, hy, hz] = self.kernel.half_width();
        self.grid.cell_in_bounds(cx - hx, cy - hy, cz - hz)
            && self.grid.cell_in_bounds(cx + hx, cy + hy, cz + hz)
    }

    /// Scatter one sample: add `amplitude * exp(-dx^2/2sx^2) * exp(..y..) *
    /// exp(..z..)` to every cell of the truncated support.
    ///
    /// The support must lie inside the lattice; see
    /// [`support_in_bounds`](Self::support_in_bounds).
    pub fn add(&mut self, point: Vec3, amplitude: f32) {
        if amplitude == 0.0 {
            return;
        }
        debug_assert!(
            self.support_in_bounds(point),
            "kernel support around {point} leaves the lattice"
        );

        let [cx, cy, cz] = closest_cell(point);
        let [hx, hy, hz] = self.kernel.half_width();

        fill_weights(&self.kernel, 0, point.x, cx, hx, &mut self.wx);
        fill_weights(&self.kernel, 1, point.y, cy, hy, &mut self.wy);
        fill_weights(&self.kernel, 2, point.z, cz, hz, &mut self.wz);

        for dz in 0..self.wz.len() {
            let z = (cz - hz) as usize + dz;
            let a_wz = amplitude * self.wz[dz];
            for dy in 0..self.wy.len() {
                let y = (cy - hy) as usize + dy;
                let a_wyz = a_wz * self.wy[dy];
                let base = self.grid.index((cx - hx) as usize, y, z);
                let data = self.grid.data_mut();
                for (dx, &w) in self.wx.iter().enumerate() {
                    data[base + dx] += a_wyz * w;
                }
            }
        }
    }
}

/// 1-D weights over the support `[center - h, center + h]`, with the signed
/// distance measured from the particle position to each cell.
fn fill_weights(
    kernel: &SpreadKernel,
    axis: usize,
    position: f32,
    center: i64,
    h: i64,
    out: &mut [f32],
) {
    debug_assert_eq!(out.len(), (2 * h + 1) as usize);
    for (i, w) in out.iter_mut().enumerate() {
        let delta = (center - h + i as i64) as f32 - position;
        *w = kernel.weight_1d(axis, delta);
    }
}
