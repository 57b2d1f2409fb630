//! Finite feature maps `Φ` with `Φ(x)Φ(y)ᵀ ≈ K(x, y)`.
//!
//! Stochastic maps consume the caller's [`RandomState`] and return its successor in the
//! [`FeatureContext`]; calling a map twice with the same key reproduces the same features.

pub mod deterministic;
pub mod random_phase;

use std::fmt;

use log::warn;
use ndarray::{Array2, Axis};

use crate::error::{KernelError, Result};
use crate::kernels::KernelState;
use crate::params::KernelParams;
use crate::random::RandomState;

pub use deterministic::DeterministicFeatureMapCompact;
pub use random_phase::{
    RandomPhaseFeatureMapCompact, RandomPhaseFeatureMapNoncompact,
    RejectionSamplingFeatureMapNoncompact,
};

/// Floor applied to feature-row norms before normalization.
pub const NORM_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureContext {
    /// Key to hand to the next stochastic call; `None` when no key was consumed.
    pub key: Option<RandomState>,
}

pub trait FeatureMap: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Whether the map draws random phases and therefore needs a key.
    fn requires_key(&self) -> bool {
        false
    }

    /// Features `[N, O]` for the points `x`.
    fn feature_map(
        &self,
        x: &Array2<f64>,
        params: &KernelParams,
        state: &KernelState,
        key: Option<RandomState>,
    ) -> Result<(Array2<f64>, FeatureContext)>;
}

pub(crate) fn require_key(context: &str, key: Option<RandomState>) -> Result<RandomState> {
    key.ok_or_else(|| {
        KernelError::configuration(
            context,
            "a random key is required to draw random phases",
        )
    })
}

/// Scales every row to unit L2 norm; rows whose norm falls below [`NORM_FLOOR`] are divided by
/// the floor instead.
pub(crate) fn normalize_rows(context: &str, features: &mut Array2<f64>) {
    let mut floored = 0usize;
    for mut row in features.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm < NORM_FLOOR {
            floored += 1;
        }
        let scale = norm.max(NORM_FLOOR);
        row.mapv_inplace(|value| value / scale);
    }
    if floored > 0 {
        warn!(
            "{}: {} feature rows had norm below {:e} and were floored",
            context, floored, NORM_FLOOR
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn rows_are_normalized_with_floor() {
        let mut features = array![[3.0, 4.0], [0.0, 0.0], [1e-14, 0.0]];
        normalize_rows("test", &mut features);
        assert_abs_diff_eq!(features[(0, 0)], 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(features[(0, 1)], 0.8, epsilon = 1e-12);
        assert_eq!(features.row(1).to_vec(), vec![0.0, 0.0]);
        assert!(features.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(features[(2, 0)], 1e-2, epsilon = 1e-12);
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        assert!(require_key("test", None).unwrap_err().is_configuration());
        assert_eq!(require_key("test", Some(RandomState::new(1))).unwrap(), RandomState::new(1));
    }
}
