use ndarray::{Array2, Axis};

use super::{FeatureContext, FeatureMap};
use crate::error::Result;
use crate::kernels::{KernelState, MaternKarhunenLoeveKernel, state_mismatch};
use crate::params::KernelParams;
use crate::random::RandomState;

/// `Φ(x) = [√w_j φ_j(x)]_j` over the eigenfunctions of a truncated Karhunen–Loève kernel;
/// reproduces that kernel exactly.
#[derive(Debug, Clone)]
pub struct DeterministicFeatureMapCompact {
    kernel: MaternKarhunenLoeveKernel,
}

impl DeterministicFeatureMapCompact {
    pub fn new(kernel: MaternKarhunenLoeveKernel) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &MaternKarhunenLoeveKernel {
        &self.kernel
    }
}

impl FeatureMap for DeterministicFeatureMapCompact {
    fn name(&self) -> &str {
        "deterministic compact feature map"
    }

    fn feature_map(
        &self,
        x: &Array2<f64>,
        params: &KernelParams,
        state: &KernelState,
        key: Option<RandomState>,
    ) -> Result<(Array2<f64>, FeatureContext)> {
        let KernelState::Spectral { eigenfunctions, .. } = state else {
            return Err(state_mismatch(self.name(), "Spectral", state));
        };
        self.kernel.space().check_points(self.name(), x)?;
        let weights = self.kernel.eigenfunction_weights(params, state)?;
        let scale = weights.mapv(f64::sqrt);
        let features = eigenfunctions.evaluate(x)? * &scale.view().insert_axis(Axis(0));
        Ok((features, FeatureContext { key }))
    }
}
