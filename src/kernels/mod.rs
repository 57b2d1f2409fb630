//! Matérn kernels sharing one parameter and state contract.
//!
//! A kernel builds its [`KernelState`] once in `init_params_and_state`; every evaluation reads
//! that state without modifying it. `y = None` evaluates the kernel of `x` against itself.

pub mod factory;
pub mod feature_map_kernel;
pub mod integrated;
pub mod karhunen_loeve;
pub mod spectral_density;

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2};

use crate::error::{KernelError, Result};
use crate::params::KernelParams;
use crate::random::RandomState;
use crate::spaces::Eigenfunctions;

pub use factory::{FactoryOptions, FactoryOutput, MaternGeometricKernel};
pub use feature_map_kernel::MaternFeatureMapKernel;
pub use integrated::MaternIntegratedKernel;
pub use karhunen_loeve::MaternKarhunenLoeveKernel;
pub use spectral_density::spectral_density;

/// Precomputed data a kernel evaluates against, one variant per engine.
#[derive(Debug, Clone)]
pub enum KernelState {
    Spectral {
        /// One eigenvalue per eigenfunction.
        eigenvalues: Array1<f64>,
        /// Eigenvalue of the first eigenfunction of every level.
        level_eigenvalues: Array1<f64>,
        eigenfunctions: Arc<dyn Eigenfunctions>,
        /// Mean addition-theorem diagonal per level over the reference sample.
        normalization_diag: Array1<f64>,
    },
    Integrated {
        /// Exponents `u` of the quadrature times `t = κ · 10^u`.
        unit_grid: Array1<f64>,
    },
    FeatureMap {
        key: RandomState,
    },
}

impl KernelState {
    pub fn variant_name(&self) -> &'static str {
        match self {
            KernelState::Spectral { .. } => "Spectral",
            KernelState::Integrated { .. } => "Integrated",
            KernelState::FeatureMap { .. } => "FeatureMap",
        }
    }
}

pub trait GeometricKernel: Send + Sync + fmt::Debug {
    fn space_name(&self) -> &str;

    fn init_params_and_state(&self) -> Result<(KernelParams, KernelState)>;

    /// Covariance matrix `[N, M]`.
    fn k(
        &self,
        params: &KernelParams,
        state: &KernelState,
        x: &Array2<f64>,
        y: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>>;

    /// Variances `[N]`, equal to the diagonal of `k(x, x)`.
    fn k_diag(
        &self,
        params: &KernelParams,
        state: &KernelState,
        x: &Array2<f64>,
    ) -> Result<Array1<f64>>;
}

pub(crate) fn state_mismatch(context: &str, expected: &str, state: &KernelState) -> KernelError {
    KernelError::configuration(
        context,
        format!(
            "expected a {expected} state, got {}",
            state.variant_name()
        ),
    )
}
