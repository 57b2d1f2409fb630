use std::sync::Arc;

use log::debug;
use ndarray::{Array1, Array2, s};

use super::{FeatureContext, FeatureMap, normalize_rows, require_key};
use crate::error::{KernelError, Result};
use crate::kernels::{KernelState, MaternKarhunenLoeveKernel, state_mismatch};
use crate::params::KernelParams;
use crate::random::RandomState;
use crate::sampling::{base_density_sample, rejection_sample};
use crate::spaces::NoncompactSymmetricSpace;

/// Monte-Carlo features on a compact space: `Φ(x)_{o,l} = √(w_l / O) A_l(x, u_o)` with `u_o`
/// drawn uniformly from the space and `A_l` the level-`l` addition theorem.
#[derive(Debug, Clone)]
pub struct RandomPhaseFeatureMapCompact {
    kernel: MaternKarhunenLoeveKernel,
    num_random_phases: usize,
}

impl RandomPhaseFeatureMapCompact {
    pub fn new(kernel: MaternKarhunenLoeveKernel, num_random_phases: usize) -> Result<Self> {
        check_phase_count("random phase compact feature map", num_random_phases)?;
        Ok(Self {
            kernel,
            num_random_phases,
        })
    }
}

impl FeatureMap for RandomPhaseFeatureMapCompact {
    fn name(&self) -> &str {
        "random phase compact feature map"
    }

    fn requires_key(&self) -> bool {
        true
    }

    fn feature_map(
        &self,
        x: &Array2<f64>,
        params: &KernelParams,
        state: &KernelState,
        key: Option<RandomState>,
    ) -> Result<(Array2<f64>, FeatureContext)> {
        let key = require_key(self.name(), key)?;
        let KernelState::Spectral { eigenfunctions, .. } = state else {
            return Err(state_mismatch(self.name(), "Spectral", state));
        };
        let space = self.kernel.space();
        space.check_points(self.name(), x)?;
        let weights = self.kernel.level_weights(params, state)?;

        let (key, phases) = space.random(key, self.num_random_phases)?;
        let products = eigenfunctions.phi_product(x, &phases)?;
        let (n, phases_drawn, levels) = products.dim();
        let phase_scale = (phases_drawn as f64).sqrt();
        let scale = weights.mapv(|w| w.sqrt() / phase_scale);
        let features = Array2::from_shape_fn((n, phases_drawn * levels), |(i, column)| {
            let (o, l) = (column / levels, column % levels);
            products[(i, o, l)] * scale[l]
        });
        Ok((features, FeatureContext { key: Some(key) }))
    }
}

/// Random Fourier features on a noncompact symmetric space with frequencies from the Matérn base
/// density.
#[derive(Debug, Clone)]
pub struct RandomPhaseFeatureMapNoncompact {
    space: Arc<dyn NoncompactSymmetricSpace>,
    num_random_phases: usize,
    normalize: bool,
}

impl RandomPhaseFeatureMapNoncompact {
    pub fn new(
        space: Arc<dyn NoncompactSymmetricSpace>,
        num_random_phases: usize,
        normalize: bool,
    ) -> Result<Self> {
        check_phase_count("random phase noncompact feature map", num_random_phases)?;
        Ok(Self {
            space,
            num_random_phases,
            normalize,
        })
    }
}

impl FeatureMap for RandomPhaseFeatureMapNoncompact {
    fn name(&self) -> &str {
        "random phase noncompact feature map"
    }

    fn requires_key(&self) -> bool {
        true
    }

    fn feature_map(
        &self,
        x: &Array2<f64>,
        params: &KernelParams,
        _state: &KernelState,
        key: Option<RandomState>,
    ) -> Result<(Array2<f64>, FeatureContext)> {
        let key = require_key(self.name(), key)?;
        self.space.check_points(self.name(), x)?;
        let (key, phases) = self.space.random_phases(key, self.num_random_phases)?;
        let (key, lambda) = base_density_sample(
            key,
            self.num_random_phases,
            params,
            self.space.dimension(),
            self.space.rank(),
        )?;
        let amplitude = self.space.inv_harish_chandra(&lambda)?;
        let features = spherical_features(
            self.name(),
            self.space.as_ref(),
            x,
            &lambda,
            &phases,
            &amplitude,
            self.normalize,
        )?;
        Ok((features, FeatureContext { key: Some(key) }))
    }
}

/// Random Fourier features whose frequencies are rejection-sampled against the space's
/// Plancherel acceptance factor `a(λ)`; each feature carries amplitude `c(λ)^{-1} / √a(λ)`.
#[derive(Debug, Clone)]
pub struct RejectionSamplingFeatureMapNoncompact {
    space: Arc<dyn NoncompactSymmetricSpace>,
    num_random_phases: usize,
    normalize: bool,
}

impl RejectionSamplingFeatureMapNoncompact {
    pub fn new(
        space: Arc<dyn NoncompactSymmetricSpace>,
        num_random_phases: usize,
        normalize: bool,
    ) -> Result<Self> {
        check_phase_count("rejection sampling feature map", num_random_phases)?;
        Ok(Self {
            space,
            num_random_phases,
            normalize,
        })
    }
}

impl FeatureMap for RejectionSamplingFeatureMapNoncompact {
    fn name(&self) -> &str {
        "rejection sampling feature map"
    }

    fn requires_key(&self) -> bool {
        true
    }

    fn feature_map(
        &self,
        x: &Array2<f64>,
        params: &KernelParams,
        _state: &KernelState,
        key: Option<RandomState>,
    ) -> Result<(Array2<f64>, FeatureContext)> {
        let key = require_key(self.name(), key)?;
        self.space.check_points(self.name(), x)?;
        let (key, phases) = self.space.random_phases(key, self.num_random_phases)?;
        let (dimension, rank) = (self.space.dimension(), self.space.rank());
        let (key, accepted) = rejection_sample(
            key,
            self.num_random_phases,
            |key, count| base_density_sample(key, count, params, dimension, rank),
            |lambda| self.space.plancherel_acceptance(lambda),
        )?;
        let c = self.space.inv_harish_chandra(&accepted.samples)?;
        let amplitude: Array1<f64> = &c / &accepted.acceptance.mapv(f64::sqrt);
        let features = spherical_features(
            self.name(),
            self.space.as_ref(),
            x,
            &accepted.samples,
            &phases,
            &amplitude,
            self.normalize,
        )?;
        Ok((features, FeatureContext { key: Some(key) }))
    }
}

fn check_phase_count(context: &str, num_random_phases: usize) -> Result<()> {
    if num_random_phases == 0 {
        return Err(KernelError::configuration(
            context,
            "at least one random phase is required",
        ));
    }
    Ok(())
}

/// `[Re(p) · amplitude, Im(p) · amplitude]` for the power function `p`, then either unit rows
/// or a `1/√O` scale.
fn spherical_features(
    context: &str,
    space: &dyn NoncompactSymmetricSpace,
    x: &Array2<f64>,
    lambda: &Array2<f64>,
    phases: &Array2<f64>,
    amplitude: &Array1<f64>,
    normalize: bool,
) -> Result<Array2<f64>> {
    let power = space.power_function(lambda, x, phases)?;
    let (n, o) = power.dim();
    let mut features = Array2::zeros((n, 2 * o));
    features
        .slice_mut(s![.., ..o])
        .assign(&Array2::from_shape_fn((n, o), |(i, j)| power[(i, j)].re * amplitude[j]));
    features
        .slice_mut(s![.., o..])
        .assign(&Array2::from_shape_fn((n, o), |(i, j)| power[(i, j)].im * amplitude[j]));

    if normalize {
        normalize_rows(context, &mut features);
    } else {
        features /= (o as f64).sqrt();
    }
    debug!(
        "{}: {} features for {} points on {}",
        context,
        2 * o,
        n,
        space.name()
    );
    Ok(features)
}
