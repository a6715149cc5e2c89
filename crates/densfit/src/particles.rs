//! Restrained-particle bookkeeping: the worker-local index set and the
//! per-particle amplitude lookup.

use std::sync::{Arc, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};

/// How a restrained particle's density amplitude is obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmplitudeMethod {
    /// Every particle contributes with weight 1
    #[default]
    Unity,
    /// Weight by the host-supplied per-particle mass
    Mass,
    /// Weight by the host-supplied per-particle charge
    Charge,
}

impl AmplitudeMethod {
    /// Amplitudes for the restrained indices, in index-list order.
    /// `masses`/`charges` are global per-particle fields and are only read
    /// for the methods that need them.
    pub fn lookup(
        &self,
        masses: &[f32],
        charges: &[f32],
        indices: &[usize],
        out: &mut Vec<f32>,
    ) {
        out.clear();
        match self {
            AmplitudeMethod::Unity => out.extend(indices.iter().map(|_| 1.0)),
            AmplitudeMethod::Mass => out.extend(indices.iter().map(|&i| masses[i])),
            AmplitudeMethod::Charge => out.extend(indices.iter().map(|&i| charges[i])),
        }
    }
}

/// Shared handle to the global indices of restrained particles held by this
/// worker. The host side (e.g. domain redistribution) may replace the list
/// between force evaluations; the restraint re-sizes its scratch to match.
#[derive(Clone, Debug, Default)]
pub struct LocalParticleSet {
    indices: Arc<RwLock<Vec<usize>>>,
}

impl LocalParticleSet {
    pub fn new(indices: Vec<usize>) -> Self {
        Self {
            indices: Arc::new(RwLock::new(indices)),
        }
    }

    /// Replace the local index list. Host-side operation.
    pub fn set_indices(&self, indices: Vec<usize>) {
        *self.indices.write().expect("particle set lock poisoned") = indices;
    }

    /// Number of restrained particles on this worker right now.
    pub fn num_local(&self) -> usize {
        self.indices
            .read()
            .expect("particle set lock poisoned")
            .len()
    }

    /// Read access for the duration of one evaluation.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<usize>> {
        self.indices.read().expect("particle set lock poisoned")
    }
}
