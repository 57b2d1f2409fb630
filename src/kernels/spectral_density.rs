use ndarray::Array1;

use crate::error::Result;
use crate::params::{KernelParams, Smoothness};

/// Matérn spectral density evaluated at frequencies `s = √λ` on a space of intrinsic dimension
/// `dimension`: `(2ν/κ² + s²)^{-ν-d/2}`, or `exp(-κ²s²/2)` in the squared-exponential limit.
pub fn spectral_density(
    params: &KernelParams,
    dimension: usize,
    s: &Array1<f64>,
) -> Result<Array1<f64>> {
    Ok(log_spectral_density(params, dimension, s)?.mapv(f64::exp))
}

/// Natural logarithm of [`spectral_density`]; stays finite where the density underflows.
pub fn log_spectral_density(
    params: &KernelParams,
    dimension: usize,
    s: &Array1<f64>,
) -> Result<Array1<f64>> {
    let kappa = params.isotropic_lengthscale("spectral_density")?;
    let d = dimension as f64;
    Ok(match params.nu {
        Smoothness::Infinite => s.mapv(|s| -kappa * kappa * s * s / 2.0),
        Smoothness::Finite(nu) => {
            let shift = 2.0 * nu / (kappa * kappa);
            let power = -nu - d / 2.0;
            s.mapv(|s| power * (shift + s * s).ln())
        }
    })
}

fn frequencies(eigenvalues: &Array1<f64>) -> Array1<f64> {
    eigenvalues.mapv(|l| l.max(0.0).sqrt())
}

/// Density weights for Laplacian eigenvalues; small negative round-off is clamped to zero.
pub fn eigenvalue_weights(
    params: &KernelParams,
    dimension: usize,
    eigenvalues: &Array1<f64>,
) -> Result<Array1<f64>> {
    spectral_density(params, dimension, &frequencies(eigenvalues))
}

/// Eigenvalue weights divided by their maximum, computed in log space so that parameters whose
/// raw weights all underflow still give a usable profile.
pub fn relative_eigenvalue_weights(
    params: &KernelParams,
    dimension: usize,
    eigenvalues: &Array1<f64>,
) -> Result<Array1<f64>> {
    let log_weights = log_spectral_density(params, dimension, &frequencies(eigenvalues))?;
    let peak = log_weights.fold(f64::NEG_INFINITY, |acc, value| acc.max(*value));
    if !peak.is_finite() {
        return Ok(log_weights.mapv(f64::exp));
    }
    Ok(log_weights.mapv(|value| (value - peak).exp()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn matern_density_decays() {
        let params = KernelParams::matern(1.5, 0.7);
        let values = spectral_density(&params, 2, &array![0.0, 1.0, 3.0]).expect("density");
        assert!(values[0] > values[1] && values[1] > values[2]);
        let expected = (2.0 * 1.5 / 0.49f64).powf(-2.5);
        assert_abs_diff_eq!(values[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn squared_exponential_limit() {
        let params = KernelParams::squared_exponential(2.0);
        let values = eigenvalue_weights(&params, 1, &array![0.0, 1.0, -1e-14]).expect("weights");
        assert_abs_diff_eq!(values[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[1], (-2.0f64).exp(), epsilon = 1e-12);
        assert_abs_diff_eq!(values[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn relative_weights_survive_underflow() {
        let params = KernelParams::matern(100.0, 0.1);
        let eigenvalues = array![0.0, 1.0, 4.0, 100.0];
        let raw = eigenvalue_weights(&params, 1, &eigenvalues).expect("weights");
        assert!(raw.iter().all(|w| *w == 0.0));
        let relative = relative_eigenvalue_weights(&params, 1, &eigenvalues).expect("weights");
        assert_abs_diff_eq!(relative[0], 1.0, epsilon = 1e-12);
        assert!(relative.iter().all(|w| *w > 0.0 && *w <= 1.0));
        let expected = (1.0f64 + 100.0 / 20_000.0).powf(-100.5);
        assert_abs_diff_eq!(relative[3], expected, epsilon = 1e-12);

        let moderate = KernelParams::matern(1.5, 0.7);
        let raw = eigenvalue_weights(&moderate, 2, &eigenvalues).expect("weights");
        let relative = relative_eigenvalue_weights(&moderate, 2, &eigenvalues).expect("weights");
        for (r, w) in relative.iter().zip(raw.iter()) {
            assert_abs_diff_eq!(*r, w / raw[0], epsilon = 1e-12);
        }
    }

    #[test]
    fn invalid_params_are_configuration_errors() {
        let params = KernelParams::matern(-1.0, 1.0);
        let err = spectral_density(&params, 1, &array![1.0]).unwrap_err();
        assert!(err.is_configuration());
    }
}
