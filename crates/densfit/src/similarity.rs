//! Similarity between the simulated density and the fixed reference map.
//!
//! Each method supplies a scalar score (higher is better) and the analytic
//! per-cell gradient of that score with respect to the simulated density.
//! Cell sums accumulate in f64 so finite-difference checks of the gradient
//! are not drowned out by single-precision rounding.

use serde::{Deserialize, Serialize};

use crate::grid::DensityGrid;

/// Scoring formula selector. Methods differ only in the formula; the
/// surrounding contract (fixed reference, same-shaped gradient) is shared.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimilarityMethod {
    /// Mean product of reference and simulated values: `sum(ref*sim) / N`
    #[default]
    InnerProduct,
    /// Normalized overlap: `sum(ref*sim) / sqrt(sum(ref^2) * sum(sim^2))`,
    /// defined as 0 for an all-zero simulated field
    CrossCorrelation,
}

/// Holds the reference map and scores simulated densities against it.
pub struct SimilarityMeasure {
    method: SimilarityMethod,
    reference: DensityGrid,
    /// Squared norm of the reference, fixed at construction
    reference_norm_sq: f64,
    /// Gradient field scratch, reused across evaluations
    gradient: DensityGrid,
}

// Below this, a simulated field counts as all-zero for cross-correlation.
const NORM_SQ_FLOOR: f64 = 1e-24;

impl SimilarityMeasure {
    pub fn new(method: SimilarityMethod, reference: DensityGrid) -> Self {
        let (nx, ny, nz) = reference.extents();
        let reference_norm_sq = reference
            .data()
            .iter()
            .map(|&r| f64::from(r) * f64::from(r))
            .sum();
        Self {
            method,
            reference,
            reference_norm_sq,
            gradient: DensityGrid::new(nx, ny, nz),
        }
    }

    pub fn method(&self) -> SimilarityMethod {
        self.method
    }

    pub fn reference(&self) -> &DensityGrid {
        &self.reference
    }

    /// Similarity score of `simulated` against the reference.
    pub fn score(&self, simulated: &DensityGrid) -> f32 {
        assert!(
            simulated.same_extents(&self.reference),
            "simulated extents {:?} do not match reference extents {:?}",
            simulated.extents(),
            self.reference.extents()
        );
        match self.method {
            SimilarityMethod::InnerProduct => {
                (self.inner_product(simulated) / self.reference.len() as f64) as f32
            }
            SimilarityMethod::CrossCorrelation => {
                let sim_norm_sq = norm_sq(simulated);
                if sim_norm_sq < NORM_SQ_FLOOR || self.reference_norm_sq < NORM_SQ_FLOOR {
                    return 0.0;
                }
                (self.inner_product(simulated) / (sim_norm_sq * self.reference_norm_sq).sqrt())
                    as f32
            }
        }
    }

    /// Per-cell partial derivative of [`score`](Self::score) with respect to
    /// the simulated field. The returned borrow is scratch owned by the
    /// measure, overwritten on the next call.
    pub fn gradient(&mut self, simulated: &DensityGrid) -> &DensityGrid {
        assert!(
            simulated.same_extents(&self.reference),
            "simulated extents {:?} do not match reference extents {:?}",
            simulated.extents(),
            self.reference.extents()
        );
        match self.method {
            SimilarityMethod::InnerProduct => {
                let inv_n = 1.0 / self.reference.len() as f32;
                for (g, &r) in self
                    .gradient
                    .data_mut()
                    .iter_mut()
                    .zip(self.reference.data())
                {
                    *g = r * inv_n;
                }
            }
            SimilarityMethod::CrossCorrelation => {
                let sim_norm_sq = norm_sq(simulated);
                if sim_norm_sq < NORM_SQ_FLOOR || self.reference_norm_sq < NORM_SQ_FLOOR {
                    self.gradient.set_zero();
                } else {
                    let inner = self.inner_product(simulated);
                    let inv_norm = 1.0 / (sim_norm_sq * self.reference_norm_sq).sqrt();
                    let ratio = inner / sim_norm_sq;
                    for ((g, &r), &s) in self
                        .gradient
                        .data_mut()
                        .iter_mut()
                        .zip(self.reference.data())
                        .zip(simulated.data())
                    {
                        *g = ((f64::from(r) - ratio * f64::from(s)) * inv_norm) as f32;
                    }
                }
            }
        }
        &self.gradient
    }

    fn inner_product(&self, simulated: &DensityGrid) -> f64 {
        self.reference
            .data()
            .iter()
            .zip(simulated.data())
            .map(|(&r, &s)| f64::from(r) * f64::from(s))
            .sum()
    }
}

fn norm_sq(grid: &DensityGrid) -> f64 {
    grid.data()
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum()
}
