use std::sync::Arc;

use log::{debug, warn};
use ndarray::{Array1, Array2, Axis};

use super::spectral_density::{eigenvalue_weights, relative_eigenvalue_weights};
use super::{GeometricKernel, KernelState, state_mismatch};
use crate::error::{KernelError, Result};
use crate::params::KernelParams;
use crate::random::RandomState;
use crate::spaces::DiscreteSpectrumSpace;
use crate::spaces::eigenfunctions::level_offsets;

/// Points drawn to estimate the mean variance on spaces without a finite vertex set.
pub const NORMALIZATION_SAMPLE_SIZE: usize = 1024;
const NORMALIZATION_SEED: u64 = 0x4B4C_0001;
const NORMALIZER_FLOOR: f64 = 1e-300;

/// Truncated Karhunen–Loève expansion `K(x, y) = Σ_l w_l Σ_{j in l} φ_j(x) φ_j(y)` with Matérn
/// weights `w_l = S(√λ_l)`.
#[derive(Debug, Clone)]
pub struct MaternKarhunenLoeveKernel {
    space: Arc<dyn DiscreteSpectrumSpace>,
    num: usize,
    normalize: bool,
}

impl MaternKarhunenLoeveKernel {
    /// `num` is the number of eigenfunctions kept in the expansion.
    pub fn new(space: Arc<dyn DiscreteSpectrumSpace>, num: usize, normalize: bool) -> Result<Self> {
        if num == 0 {
            return Err(KernelError::configuration(
                format!("{} Karhunen-Loeve kernel", space.name()),
                "the expansion needs at least one eigenfunction",
            ));
        }
        Ok(Self {
            space,
            num,
            normalize,
        })
    }

    pub fn space(&self) -> &Arc<dyn DiscreteSpectrumSpace> {
        &self.space
    }

    pub fn num(&self) -> usize {
        self.num
    }

    pub fn normalize(&self) -> bool {
        self.normalize
    }

    fn context(&self) -> String {
        format!("{} Karhunen-Loeve kernel (num = {})", self.space.name(), self.num)
    }

    /// Per-level weights, divided by the mean variance over the reference sample when
    /// normalizing.
    pub fn level_weights(&self, params: &KernelParams, state: &KernelState) -> Result<Array1<f64>> {
        let KernelState::Spectral {
            level_eigenvalues,
            normalization_diag,
            ..
        } = state
        else {
            return Err(state_mismatch(&self.context(), "Spectral", state));
        };
        let dimension = self.space.dimension();
        if !self.normalize {
            return eigenvalue_weights(params, dimension, level_eigenvalues);
        }
        let weights = relative_eigenvalue_weights(params, dimension, level_eigenvalues)?;
        let normalizer = weights.dot(normalization_diag);
        if normalizer < NORMALIZER_FLOOR {
            warn!(
                "{}: variance normalizer {:e} hit the floor {:e}",
                self.context(),
                normalizer,
                NORMALIZER_FLOOR
            );
        }
        Ok(weights / normalizer.max(NORMALIZER_FLOOR))
    }

    /// Level weights repeated once per eigenfunction of the level.
    pub fn eigenfunction_weights(
        &self,
        params: &KernelParams,
        state: &KernelState,
    ) -> Result<Array1<f64>> {
        let KernelState::Spectral { eigenfunctions, .. } = state else {
            return Err(state_mismatch(&self.context(), "Spectral", state));
        };
        let levels = self.level_weights(params, state)?;
        Ok(Array1::from_iter(
            eigenfunctions
                .num_eigenfunctions_per_level()
                .into_iter()
                .zip(levels.iter())
                .flat_map(|(count, weight)| std::iter::repeat_n(*weight, count)),
        ))
    }

    fn reference_sample(&self) -> Result<Array2<f64>> {
        match self.space.reference_points() {
            Some(points) => Ok(points),
            None => {
                let key = RandomState::new(NORMALIZATION_SEED);
                let (_, points) = self.space.random(key, NORMALIZATION_SAMPLE_SIZE)?;
                Ok(points)
            }
        }
    }
}

impl GeometricKernel for MaternKarhunenLoeveKernel {
    fn space_name(&self) -> &str {
        self.space.name()
    }

    fn init_params_and_state(&self) -> Result<(KernelParams, KernelState)> {
        let context = self.context();
        let eigenvalues = self.space.get_eigenvalues(self.num)?;
        let eigenfunctions = self.space.get_eigenfunctions(self.num)?;
        if eigenvalues.len() != self.num || eigenfunctions.num_eigenfunctions() != self.num {
            return Err(KernelError::shape(
                context,
                format!("{} eigenvalues and eigenfunctions", self.num),
                format!(
                    "{} eigenvalues, {} eigenfunctions",
                    eigenvalues.len(),
                    eigenfunctions.num_eigenfunctions()
                ),
            ));
        }

        let level_eigenvalues = Array1::from_iter(
            level_offsets(&eigenfunctions.num_eigenfunctions_per_level())
                .into_iter()
                .map(|offset| eigenvalues[offset]),
        );
        let reference = self.reference_sample()?;
        let normalization_diag = eigenfunctions
            .addition_theorem_diag(&reference)?
            .mean_axis(Axis(0))
            .ok_or_else(|| KernelError::configuration(&context, "empty reference sample"))?;

        debug!(
            "{}: {} eigenfunctions in {} levels, normalization over {} reference points",
            context,
            self.num,
            eigenfunctions.num_levels(),
            reference.nrows()
        );
        Ok((
            KernelParams::default(),
            KernelState::Spectral {
                eigenvalues,
                level_eigenvalues,
                eigenfunctions,
                normalization_diag,
            },
        ))
    }

    fn k(
        &self,
        params: &KernelParams,
        state: &KernelState,
        x: &Array2<f64>,
        y: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        let KernelState::Spectral { eigenfunctions, .. } = state else {
            return Err(state_mismatch(&self.context(), "Spectral", state));
        };
        self.space.check_points(&self.context(), x)?;
        if let Some(y) = y {
            self.space.check_points(&self.context(), y)?;
        }
        let weights = self.level_weights(params, state)?;
        eigenfunctions.weighted_outerproduct(&weights, x, y)
    }

    fn k_diag(
        &self,
        params: &KernelParams,
        state: &KernelState,
        x: &Array2<f64>,
    ) -> Result<Array1<f64>> {
        let KernelState::Spectral { eigenfunctions, .. } = state else {
            return Err(state_mismatch(&self.context(), "Spectral", state));
        };
        self.space.check_points(&self.context(), x)?;
        let weights = self.level_weights(params, state)?;
        eigenfunctions.weighted_outerproduct_diag(&weights, x)
    }
}
