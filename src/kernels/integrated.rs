use std::sync::Arc;

use log::debug;
use ndarray::{Array1, Array2, Array3, Axis};

use super::{GeometricKernel, KernelState, state_mismatch};
use crate::backend::numeric::trapz;
use crate::error::{KernelError, Result};
use crate::params::{KernelParams, Smoothness};
use crate::spaces::HeatKernelSpace;

const GRID_START: f64 = -4.5;
const GRID_STOP: f64 = 1.5;

/// Matérn kernel as a heat-kernel mixture
/// `K(ρ) ∝ ∫ t^{ν-1} e^{-2νt/κ²} p_t(ρ) dt`, normalized to one at `ρ = 0`.
///
/// Quadrature times are `t = κ² · 10^u`, which keeps the bulk of the mixing density inside the
/// grid for every `ν`. Mass below the first time is taken as `p_{t_0} · t_0^ν / ν`.
#[derive(Debug, Clone)]
pub struct MaternIntegratedKernel {
    space: Arc<dyn HeatKernelSpace>,
    num_points: usize,
}

impl MaternIntegratedKernel {
    /// `num_points` quadrature times on a log-spaced grid.
    pub fn new(space: Arc<dyn HeatKernelSpace>, num_points: usize) -> Result<Self> {
        if num_points < 2 {
            return Err(KernelError::configuration(
                format!("{} integrated kernel", space.name()),
                format!("quadrature needs at least two points, got {num_points}"),
            ));
        }
        Ok(Self { space, num_points })
    }

    fn context(&self) -> String {
        format!(
            "{} integrated kernel (num_points = {})",
            self.space.name(),
            self.num_points
        )
    }

    fn finite_smoothness(&self, params: &KernelParams) -> Result<(f64, f64)> {
        let kappa = params.isotropic_lengthscale(&self.context())?;
        match params.nu {
            Smoothness::Finite(nu) => Ok((nu, kappa)),
            Smoothness::Infinite => Err(KernelError::configuration(
                self.context(),
                "the heat-kernel mixture has no squared-exponential limit; use a finite nu",
            )),
        }
    }

    fn unit_grid<'a>(&self, state: &'a KernelState) -> Result<&'a Array1<f64>> {
        match state {
            KernelState::Integrated { unit_grid } => Ok(unit_grid),
            other => Err(state_mismatch(&self.context(), "Integrated", other)),
        }
    }

    /// Integrates the heat kernel over `t` against the Matérn mixing density.
    fn integrate(
        &self,
        heat: &Array3<f64>,
        times: &Array1<f64>,
        nu: f64,
        kappa: f64,
    ) -> Result<Array2<f64>> {
        let link = times.mapv(|t| t.powf(nu - 1.0) * (-2.0 * nu * t / (kappa * kappa)).exp());
        let integrand = heat * &link.view().insert_axis(Axis(0)).insert_axis(Axis(0));
        let body = trapz(integrand.view(), Some(times.view()), 1.0, Axis(2))?;
        let first = *times.first().ok_or_else(|| {
            KernelError::configuration(self.context(), "empty quadrature grid")
        })?;
        let head = heat.index_axis(Axis(2), 0).mapv(|p| p * first.powf(nu) / nu);
        Ok(body + head)
    }
}

impl GeometricKernel for MaternIntegratedKernel {
    fn space_name(&self) -> &str {
        self.space.name()
    }

    fn init_params_and_state(&self) -> Result<(KernelParams, KernelState)> {
        let unit_grid = Array1::linspace(GRID_START, GRID_STOP, self.num_points);
        debug!("{}: quadrature exponents in [{GRID_START}, {GRID_STOP}]", self.context());
        Ok((
            KernelParams::matern(2.5, 1.0),
            KernelState::Integrated { unit_grid },
        ))
    }

    fn k(
        &self,
        params: &KernelParams,
        state: &KernelState,
        x: &Array2<f64>,
        y: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        let unit_grid = self.unit_grid(state)?;
        let (nu, kappa) = self.finite_smoothness(params)?;
        let times = unit_grid.mapv(|u| kappa * kappa * 10f64.powf(u));

        let distance = self.space.distance(x, y.unwrap_or(x))?;
        let heat = self.space.heat_kernel(&distance, &times)?;
        let values = self.integrate(&heat, &times, nu, kappa)?;

        let origin = self.space.heat_kernel(&Array2::zeros((1, 1)), &times)?;
        let normalizer = self.integrate(&origin, &times, nu, kappa)?[(0, 0)];
        if !(normalizer.is_finite() && normalizer > 0.0) {
            return Err(KernelError::decomposition(
                self.context(),
                format!("heat-kernel mixture at distance zero evaluated to {normalizer}"),
            ));
        }
        Ok(values / normalizer)
    }

    fn k_diag(
        &self,
        params: &KernelParams,
        state: &KernelState,
        x: &Array2<f64>,
    ) -> Result<Array1<f64>> {
        self.unit_grid(state)?;
        self.finite_smoothness(params)?;
        self.space.check_points(&self.context(), x)?;
        Ok(Array1::ones(x.nrows()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spaces::Hyperbolic;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn kernel_decays_from_one() {
        let space = Arc::new(Hyperbolic::new(3).expect("space"));
        let kernel = MaternIntegratedKernel::new(space.clone(), 50).expect("kernel");
        let (_, state) = kernel.init_params_and_state().expect("state");
        let params = KernelParams::matern(2.5, 0.5);
        let x = space.lift(&array![[0.0, 0.0, 0.0], [0.3, 0.0, 0.0], [1.5, 0.0, 0.0]]).unwrap();
        let k = kernel.k(&params, &state, &x, None).expect("k");
        assert_abs_diff_eq!(k[(0, 0)], 1.0, epsilon = 1e-6);
        assert!(k[(0, 1)] < 1.0 && k[(0, 1)] > k[(0, 2)]);
        assert_abs_diff_eq!(k[(1, 2)], k[(2, 1)], epsilon = 1e-12);
    }

    #[test]
    fn squared_exponential_is_rejected() {
        let space = Arc::new(Hyperbolic::new(1).expect("space"));
        let kernel = MaternIntegratedKernel::new(space.clone(), 20).expect("kernel");
        let (_, state) = kernel.init_params_and_state().expect("state");
        let x = space.lift(&array![[0.0]]).unwrap();
        let params = KernelParams::squared_exponential(1.0);
        assert!(kernel.k(&params, &state, &x, None).unwrap_err().is_configuration());
        assert!(kernel.k_diag(&params, &state, &x).unwrap_err().is_configuration());
        assert!(MaternIntegratedKernel::new(space, 1).is_err());
    }
}
