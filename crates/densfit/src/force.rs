//! Back-projection of the similarity gradient into per-particle forces.
//!
//! The force on a particle is the chain rule of its own spreading
//! contribution: `amplitude * sum_cells gradient[cell] * d kernel / d r`,
//! taken over exactly the truncated support used when rasterizing, so the
//! result is the true derivative of the rasterization step.

use glam::Vec3;
use rayon::prelude::*;

use crate::grid::DensityGrid;
use crate::kernel::SpreadKernel;
use crate::spread::closest_cell;

/// Lattice-space force on one particle.
///
/// The gradient field must have been computed from a density this particle
/// was spread into; its support is therefore already known to lie inside
/// the lattice.
pub fn evaluate_force(
    kernel: &SpreadKernel,
    point: Vec3,
    amplitude: f32,
    gradient: &DensityGrid,
) -> Vec3 {
    let [cx, cy, cz] = closest_cell(point);
    let [hx, hy, hz] = kernel.half_width();
    debug_assert!(
        gradient.cell_in_bounds(cx - hx, cy - hy, cz - hz)
            && gradient.cell_in_bounds(cx + hx, cy + hy, cz + hz),
        "kernel support around {point} leaves the gradient lattice"
    );

    let mut force = [0.0f64; 3];
    for dz in -hz..=hz {
        let z = (cz + dz) as usize;
        let delta_z = (cz + dz) as f32 - point.z;
        let wz = kernel.weight_1d(2, delta_z);
        let dwz = kernel.dweight_1d(2, delta_z);
        for dy in -hy..=hy {
            let y = (cy + dy) as usize;
            let delta_y = (cy + dy) as f32 - point.y;
            let wy = kernel.weight_1d(1, delta_y);
            let dwy = kernel.dweight_1d(1, delta_y);
            let base = gradient.index((cx - hx) as usize, y, z);
            for (i, dx) in (-hx..=hx).enumerate() {
                let delta_x = (cx + dx) as f32 - point.x;
                let wx = kernel.weight_1d(0, delta_x);
                let dwx = kernel.dweight_1d(0, delta_x);
                let g = gradient.data()[base + i];
                force[0] += f64::from(g * dwx * wy * wz);
                force[1] += f64::from(g * wx * dwy * wz);
                force[2] += f64::from(g * wx * wy * dwz);
            }
        }
    }

    Vec3::new(force[0] as f32, force[1] as f32, force[2] as f32) * amplitude
}

/// Forces for a whole local particle set, one output per input, in order.
pub fn evaluate_forces(
    kernel: &SpreadKernel,
    points: &[Vec3],
    amplitudes: &[f32],
    gradient: &DensityGrid,
    out: &mut Vec<Vec3>,
) {
    assert_eq!(
        points.len(),
        amplitudes.len(),
        "coordinate and amplitude counts must match"
    );
    points
        .par_iter()
        .zip(amplitudes.par_iter())
        .map(|(&point, &amplitude)| evaluate_force(kernel, point, amplitude, gradient))
        .collect_into_vec(out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spread::GaussTransform;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// sum_cells gradient[cell] * spread(point, amplitude)[cell], the scalar
    /// the force is the position-derivative of.
    fn projected_density(
        gauss: &mut GaussTransform,
        point: Vec3,
        amplitude: f32,
        gradient: &DensityGrid,
    ) -> f64 {
        gauss.set_zero();
        gauss.add(point, amplitude);
        gauss
            .view()
            .data()
            .iter()
            .zip(gradient.data())
            .map(|(&d, &g)| f64::from(d) * f64::from(g))
            .sum()
    }

    #[test]
    fn test_force_matches_finite_difference_of_projection() {
        let mut rng = StdRng::seed_from_u64(42);
        let kernel = SpreadKernel::from_lattice(Vec3::new(0.9, 1.1, 1.4), 3.0);
        let mut gradient = DensityGrid::new(20, 20, 20);
        for g in gradient.data_mut() {
            *g = rng.gen_range(-1.0..1.0);
        }

        let point = Vec3::new(9.4, 10.2, 8.8);
        let amplitude = 1.7;
        let analytic = evaluate_force(&kernel, point, amplitude, &gradient);

        let mut gauss = GaussTransform::new((20, 20, 20), kernel);
        let h = 5e-3f32;
        for axis in 0..3 {
            let mut step = Vec3::ZERO;
            step[axis] = h;
            let plus = projected_density(&mut gauss, point + step, amplitude, &gradient);
            let minus = projected_density(&mut gauss, point - step, amplitude, &gradient);
            let numeric = ((plus - minus) / f64::from(2.0 * h)) as f32;
            assert!(
                (numeric - analytic[axis]).abs() < 2e-2 * analytic[axis].abs().max(1.0),
                "axis {axis}: numeric {numeric} vs analytic {}",
                analytic[axis]
            );
        }
    }

    #[test]
    fn test_force_vanishes_on_uniform_gradient_at_cell_center() {
        // A uniform gradient field pulls equally in all directions; with the
        // particle on a lattice point the kernel is symmetric and the force
        // cancels exactly.
        let kernel = SpreadKernel::from_lattice(Vec3::splat(1.0), 3.0);
        let mut gradient = DensityGrid::new(16, 16, 16);
        gradient.data_mut().fill(0.25);

        let force = evaluate_force(&kernel, Vec3::new(8.0, 8.0, 8.0), 2.0, &gradient);
        assert!(force.length() < 1e-5, "expected zero force, got {force}");
    }

    #[test]
    fn test_force_scales_linearly_with_amplitude() {
        let mut rng = StdRng::seed_from_u64(3);
        let kernel = SpreadKernel::from_lattice(Vec3::splat(1.2), 3.0);
        let mut gradient = DensityGrid::new(16, 16, 16);
        for g in gradient.data_mut() {
            *g = rng.gen_range(0.0..1.0);
        }

        let point = Vec3::new(7.6, 8.3, 8.1);
        let single = evaluate_force(&kernel, point, 1.0, &gradient);
        let triple = evaluate_force(&kernel, point, 3.0, &gradient);
        assert!((triple - single * 3.0).length() < 1e-5);
    }

    #[test]
    fn test_batch_matches_single_evaluations() {
        let mut rng = StdRng::seed_from_u64(19);
        let kernel = SpreadKernel::from_lattice(Vec3::splat(1.0), 3.0);
        let mut gradient = DensityGrid::new(16, 16, 16);
        for g in gradient.data_mut() {
            *g = rng.gen_range(-1.0..1.0);
        }

        let points: Vec<Vec3> = (0..5)
            .map(|_| {
                Vec3::new(
                    rng.gen_range(5.0..11.0),
                    rng.gen_range(5.0..11.0),
                    rng.gen_range(5.0..11.0),
                )
            })
            .collect();
        let amplitudes: Vec<f32> = (0..5).map(|_| rng.gen_range(0.5..2.0)).collect();

        let mut batch = Vec::new();
        evaluate_forces(&kernel, &points, &amplitudes, &gradient, &mut batch);
        assert_eq!(batch.len(), 5);
        for i in 0..5 {
            let single = evaluate_force(&kernel, points[i], amplitudes[i], &gradient);
            assert_eq!(batch[i], single);
        }
    }
}
