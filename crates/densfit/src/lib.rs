//! Density-guided restraint forces.
//!
//! Biases a subset of simulated particles toward agreement with a fixed
//! reference density map: particles are spread onto the map lattice with a
//! truncated Gaussian kernel, the simulated density is reduced across
//! workers and scored against the reference, and the score gradient is
//! back-projected through the same kernel into a per-particle force plus
//! one energy term.
//!
//! Map loading, particle selection, and the host's force/energy buffers are
//! the caller's business; this crate only consumes their interfaces.
//!
//! # Example
//!
//! ```
//! use densfit::{
//!     AmplitudeMethod, DensityFittingParameters, DensityFittingRestraint, DensityGrid,
//!     EnergyAccumulator, ForceInput, ForceOutput, LocalParticleSet, SimilarityMethod,
//!     SingleWorker, TranslateAndScale, Vec3,
//! };
//!
//! // A 16^3 reference map with a blob at its center.
//! let mut reference = DensityGrid::new(16, 16, 16);
//! let center = reference.index(8, 8, 8);
//! reference.data_mut()[center] = 1.0;
//!
//! let parameters = DensityFittingParameters {
//!     spreading_width: 1.0,
//!     spreading_range_in_sigma: 3.0,
//!     similarity_method: SimilarityMethod::InnerProduct,
//!     amplitude_method: AmplitudeMethod::Unity,
//!     force_constant: 10.0,
//! };
//! let mut restraint = DensityFittingRestraint::new(
//!     parameters,
//!     reference,
//!     TranslateAndScale::IDENTITY,
//!     LocalParticleSet::new(vec![0]),
//! )
//! .unwrap();
//!
//! let positions = [Vec3::new(8.0, 8.0, 8.0)];
//! let mut forces = [Vec3::ZERO];
//! let mut energy = EnergyAccumulator::default();
//! restraint
//!     .calculate_forces(
//!         &ForceInput { positions: &positions, masses: &[], charges: &[] },
//!         &SingleWorker,
//!         &mut ForceOutput { forces: &mut forces, energy: &mut energy },
//!     )
//!     .unwrap();
//!
//! // The particle sits on the blob, so the restraint likes it there.
//! assert!(energy.density_fitting < 0.0);
//! ```

pub mod error;
pub mod force;
pub mod grid;
pub mod kernel;
pub mod particles;
pub mod reduce;
pub mod similarity;
pub mod spread;
pub mod transform;

pub use error::ConfigError;
pub use glam::Vec3;
pub use grid::DensityGrid;
pub use kernel::SpreadKernel;
pub use particles::{AmplitudeMethod, LocalParticleSet};
pub use reduce::{ParallelContext, SingleWorker, ThreadGroup};
pub use similarity::{SimilarityMeasure, SimilarityMethod};
pub use spread::GaussTransform;
pub use transform::{ScaleOnly, TranslateAndScale};

use serde::{Deserialize, Serialize};

/// Static restraint configuration. The host's config layer fills this in;
/// how it is parsed from disk is not this crate's concern.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DensityFittingParameters {
    /// Physical width (sigma) of the spreading Gaussian, simulation length units
    pub spreading_width: f32,
    /// Truncation radius in multiples of the spreading width
    pub spreading_range_in_sigma: f32,
    /// Scoring formula for simulated vs. reference density
    pub similarity_method: SimilarityMethod,
    /// How per-particle amplitudes are obtained
    pub amplitude_method: AmplitudeMethod,
    /// Coupling between similarity score and restraint energy
    pub force_constant: f32,
}

impl Default for DensityFittingParameters {
    fn default() -> Self {
        Self {
            spreading_width: 0.2,
            spreading_range_in_sigma: 4.0,
            similarity_method: SimilarityMethod::default(),
            amplitude_method: AmplitudeMethod::default(),
            force_constant: 1.0e3,
        }
    }
}

/// Read-only view of host particle state for one evaluation. Positions span
/// all particles; only the restrained indices are read. The mass/charge
/// fields may be empty when the amplitude method does not use them.
pub struct ForceInput<'a> {
    pub positions: &'a [Vec3],
    pub masses: &'a [f32],
    pub charges: &'a [f32],
}

/// Host-owned output buffers. The restraint adds to its particles' force
/// slots and to its one energy term; everything else is left alone.
pub struct ForceOutput<'a> {
    pub forces: &'a mut [Vec3],
    pub energy: &'a mut EnergyAccumulator,
}

/// Named energy-term slots on the host side. Energy sums run in f64.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EnergyAccumulator {
    /// The density-fitting restraint's term
    pub density_fitting: f64,
}

/// The restraint's per-step force provider.
///
/// Owns the kernel, the rasterization buffer, the similarity measure, and
/// the per-evaluation scratch; consumes host state through [`ForceInput`]
/// and a [`ParallelContext`], and appends to host buffers through
/// [`ForceOutput`].
pub struct DensityFittingRestraint {
    parameters: DensityFittingParameters,
    local_set: LocalParticleSet,
    to_lattice: TranslateAndScale,
    gauss: GaussTransform,
    measure: SimilarityMeasure,

    // Per-evaluation scratch, re-sized to the local particle count
    transformed: Vec<Vec3>,
    amplitudes: Vec<f32>,
    forces: Vec<Vec3>,
}

impl DensityFittingRestraint {
    /// Build the restraint around a fixed reference map.
    ///
    /// Fails on a non-positive spreading width or truncation range, or a
    /// zero/non-finite scale on any lattice axis.
    pub fn new(
        parameters: DensityFittingParameters,
        reference: DensityGrid,
        to_lattice: TranslateAndScale,
        local_set: LocalParticleSet,
    ) -> Result<Self, ConfigError> {
        let kernel = SpreadKernel::from_physical(
            parameters.spreading_width,
            parameters.spreading_range_in_sigma,
            &to_lattice.scale_only(),
        )?;
        let (nx, ny, nz) = reference.extents();
        log::debug!(
            "density fitting restraint: {nx}x{ny}x{nz} map, lattice sigma {}, support half-widths {:?}",
            kernel.sigma(),
            kernel.half_width()
        );

        Ok(Self {
            parameters,
            local_set,
            to_lattice,
            gauss: GaussTransform::new((nx, ny, nz), kernel),
            measure: SimilarityMeasure::new(parameters.similarity_method, reference),
            transformed: Vec::new(),
            amplitudes: Vec::new(),
            forces: Vec::new(),
        })
    }

    /// The derived kernel shape.
    pub fn kernel(&self) -> &SpreadKernel {
        self.gauss.kernel()
    }

    /// One force-provider evaluation.
    ///
    /// Rasterizes the local restrained particles, reduces the density across
    /// the worker group, scores it against the reference, and adds
    /// `force_constant * force` per particle and `-score * force_constant`
    /// to the energy term. With no local particles this is a no-op.
    pub fn calculate_forces(
        &mut self,
        input: &ForceInput<'_>,
        context: &impl ParallelContext,
        output: &mut ForceOutput<'_>,
    ) -> Result<(), ConfigError> {
        let indices = self.local_set.read();
        if indices.is_empty() {
            return Ok(());
        }

        // Pick out local coordinates and take them into lattice space.
        self.transformed.clear();
        self.transformed
            .extend(indices.iter().map(|&i| input.positions[i]));
        self.to_lattice.apply_all(&mut self.transformed);

        self.parameters.amplitude_method.lookup(
            input.masses,
            input.charges,
            &indices,
            &mut self.amplitudes,
        );
        assert_eq!(
            self.amplitudes.len(),
            self.transformed.len(),
            "amplitude lookup must yield one weight per local particle"
        );

        // Spread the local subset onto the lattice.
        self.gauss.set_zero();
        for (local, (&point, &amplitude)) in
            self.transformed.iter().zip(&self.amplitudes).enumerate()
        {
            if !self.gauss.support_in_bounds(point) {
                let extents = self.measure.reference().extents();
                log::error!(
                    "density fitting: particle {} (local rank index {local}) at lattice \
                     position {point} spreads outside the {extents:?} map",
                    indices[local]
                );
                return Err(ConfigError::OutOfRangeContribution {
                    particle: indices[local],
                    position: point,
                    extents,
                });
            }
            self.gauss.add(point, amplitude);
        }

        // Every worker needs the complete density before scoring.
        if context.num_workers() > 1 {
            context.sum_fields(self.gauss.data_mut());
        }

        let gradient = self.measure.gradient(self.gauss.view());
        force::evaluate_forces(
            self.gauss.kernel(),
            &self.transformed,
            &self.amplitudes,
            gradient,
            &mut self.forces,
        );

        // Back to simulation space; zero-scale axes pass through untouched.
        let scale = self.to_lattice.scale_only();
        for f in &mut self.forces {
            *f = scale.inverse_ignoring_zero_scale(*f);
        }

        let k = self.parameters.force_constant;
        for (&index, &f) in indices.iter().zip(&self.forces) {
            output.forces[index] += f * k;
        }

        let score = self.measure.score(self.gauss.view());
        output.energy.density_fitting += f64::from(-score * k);
        Ok(())
    }
}
