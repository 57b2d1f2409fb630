use std::sync::Arc;

use log::debug;
use ndarray::{Array1, Array2, Axis};

use super::{GeometricKernel, KernelState, state_mismatch};
use crate::error::Result;
use crate::features::FeatureMap;
use crate::params::KernelParams;
use crate::random::RandomState;

/// `K(x, y) = Φ(x)Φ(y)ᵀ` for a feature map evaluated with one fixed key, so every call sees the
/// same Monte-Carlo realization.
#[derive(Debug, Clone)]
pub struct MaternFeatureMapKernel {
    space_name: String,
    feature_map: Arc<dyn FeatureMap>,
    key: RandomState,
}

impl MaternFeatureMapKernel {
    pub fn new(
        space_name: impl Into<String>,
        feature_map: Arc<dyn FeatureMap>,
        key: RandomState,
    ) -> Self {
        Self {
            space_name: space_name.into(),
            feature_map,
            key,
        }
    }

    pub fn feature_map(&self) -> &Arc<dyn FeatureMap> {
        &self.feature_map
    }

    fn context(&self) -> String {
        format!("{} feature map kernel", self.space_name)
    }

    fn features(
        &self,
        params: &KernelParams,
        state: &KernelState,
        x: &Array2<f64>,
    ) -> Result<Array2<f64>> {
        let KernelState::FeatureMap { key } = state else {
            return Err(state_mismatch(&self.context(), "FeatureMap", state));
        };
        let (features, _) = self.feature_map.feature_map(x, params, state, Some(*key))?;
        Ok(features)
    }
}

impl GeometricKernel for MaternFeatureMapKernel {
    fn space_name(&self) -> &str {
        &self.space_name
    }

    fn init_params_and_state(&self) -> Result<(KernelParams, KernelState)> {
        debug!(
            "{}: pinned {} to key {:?}",
            self.context(),
            self.feature_map.name(),
            self.key
        );
        Ok((
            KernelParams::default(),
            KernelState::FeatureMap { key: self.key },
        ))
    }

    fn k(
        &self,
        params: &KernelParams,
        state: &KernelState,
        x: &Array2<f64>,
        y: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        let features_x = self.features(params, state, x)?;
        let features_y = match y {
            Some(y) => self.features(params, state, y)?,
            None => features_x.clone(),
        };
        Ok(features_x.dot(&features_y.t()))
    }

    fn k_diag(
        &self,
        params: &KernelParams,
        state: &KernelState,
        x: &Array2<f64>,
    ) -> Result<Array1<f64>> {
        let features = self.features(params, state, x)?;
        Ok(features.mapv(|v| v * v).sum_axis(Axis(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::RandomPhaseFeatureMapNoncompact;
    use crate::spaces::Hyperbolic;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn pinned_key_gives_consistent_blocks() {
        let space = Arc::new(Hyperbolic::new(2).expect("space"));
        let x = space.lift(&array![[0.0, 0.0], [0.5, 0.5], [-1.0, 0.2]]).expect("lift");
        let map = RandomPhaseFeatureMapNoncompact::new(space, 200, true).expect("map");
        let kernel = MaternFeatureMapKernel::new("Hyperbolic", Arc::new(map), RandomState::new(1));
        let (_, state) = kernel.init_params_and_state().expect("state");
        let params = KernelParams::matern(1.5, 1.0);

        let full = kernel.k(&params, &state, &x, None).expect("k");
        let block = kernel
            .k(&params, &state, &x, Some(&x.slice(ndarray::s![1..2, ..]).to_owned()))
            .expect("block");
        let diag = kernel.k_diag(&params, &state, &x).expect("diag");
        for i in 0..3 {
            assert_abs_diff_eq!(full[(i, 1)], block[(i, 0)], epsilon = 1e-12);
            assert_abs_diff_eq!(diag[i], full[(i, i)], epsilon = 1e-12);
            assert_abs_diff_eq!(diag[i], 1.0, epsilon = 1e-10);
        }
    }
}
