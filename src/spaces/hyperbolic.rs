use std::f64::consts::PI;

use ndarray::{Array1, Array2, Array3, Axis, Zip, s};
use num_complex::Complex64;
use once_cell::sync::Lazy;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use super::{HeatKernelSpace, NoncompactSymmetricSpace, Space, SpaceKind, minkowski_inner};
use crate::backend::numeric::{logspace, trapz};
use crate::error::{KernelError, Result};
use crate::random::RandomState;

const MAX_COSH_DISTANCE: f64 = 1e24;
const HEAT_QUADRATURE_POINTS: usize = 100;

/// Offsets `s - ρ` of the planar heat-kernel quadrature, log-spaced over `[1e-2, 1e2]`.
static PLANAR_OFFSETS: Lazy<Array1<f64>> = Lazy::new(|| {
    logspace(1e-2f64.ln(), 100f64.ln(), HEAT_QUADRATURE_POINTS, std::f64::consts::E)
});

/// Hyperbolic space `H^d` in the hyperboloid model
/// `{x : x0^2 - Σ xi^2 = 1, x0 > 0}`; points carry `d + 1` coordinates.
#[derive(Debug, Clone)]
pub struct Hyperbolic {
    dim: usize,
}

impl Hyperbolic {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(KernelError::configuration(
                "Hyperbolic",
                "dimension must be at least 1",
            ));
        }
        Ok(Self { dim })
    }

    /// Lifts coordinates `[N, d]` onto the upper sheet by solving for `x0`.
    pub fn lift(&self, coordinates: &Array2<f64>) -> Result<Array2<f64>> {
        super::check_width("Hyperbolic lift", coordinates, self.dim)?;
        let mut points = Array2::zeros((coordinates.nrows(), self.dim + 1));
        for (mut point, spatial) in points.rows_mut().into_iter().zip(coordinates.rows()) {
            point[0] = (1.0 + spatial.dot(&spatial)).sqrt();
            point.slice_mut(s![1..]).assign(&spatial);
        }
        Ok(points)
    }

    fn rho(&self) -> f64 {
        (self.dim as f64 - 1.0) / 2.0
    }

    fn check_frequencies(&self, context: &str, lambda: &Array2<f64>) -> Result<()> {
        if lambda.ncols() != 1 {
            return Err(KernelError::shape(
                context,
                "[O, 1] frequencies",
                format!("[{}, {}]", lambda.nrows(), lambda.ncols()),
            ));
        }
        Ok(())
    }

    /// Heat kernel at distance `rho` and time `t`, up to factors depending on `t` alone.
    fn heat_kernel_value(&self, rho: f64, t: f64) -> Result<f64> {
        let gaussian = (-rho * rho / (4.0 * t)).exp();
        match self.dim {
            1 => Ok(gaussian),
            3 => {
                let ratio = if rho < 1e-8 { 1.0 } else { rho / rho.sinh() };
                Ok(ratio * gaussian)
            }
            _ => millson_planar(rho, t),
        }
    }
}

/// `∫_ρ^∞ s e^{-s²/4t} / √(cosh s - cosh ρ) ds` on a log-spaced grid of offsets.
fn millson_planar(rho: f64, t: f64) -> Result<f64> {
    let s_grid = PLANAR_OFFSETS.mapv(|offset| offset + rho);
    let cosh_rho = rho.cosh();
    let integrand = s_grid.mapv(|s| s * (-s * s / (4.0 * t)).exp() / (s.cosh() - cosh_rho).sqrt());
    let integral = trapz(integrand.view(), Some(s_grid.view()), 1.0, Axis(0))?;
    Ok(integral.into_scalar())
}

impl Space for Hyperbolic {
    fn name(&self) -> &str {
        "Hyperbolic"
    }

    fn kind(&self) -> SpaceKind {
        SpaceKind::Hyperbolic
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn point_width(&self) -> usize {
        self.dim + 1
    }
}

impl NoncompactSymmetricSpace for Hyperbolic {
    fn rank(&self) -> usize {
        1
    }

    /// Uniform directions on the sphere `S^{d-1}`.
    fn random_phases(
        &self,
        key: RandomState,
        count: usize,
    ) -> Result<(RandomState, Array2<f64>)> {
        let (next, mut rng) = key.split();
        let mut phases: Array2<f64> = Array2::zeros((count, self.dim));
        for mut row in phases.rows_mut() {
            loop {
                row.iter_mut()
                    .for_each(|v: &mut f64| *v = StandardNormal.sample(&mut rng));
                let norm = row.dot(&row).sqrt();
                if norm > 1e-12 {
                    row.mapv_inplace(|v| v / norm);
                    break;
                }
            }
        }
        Ok((next, phases))
    }

    /// `exp(-(iλ + ρ) log(x0 - <x_{1:}, b>))`.
    fn power_function(
        &self,
        lambda: &Array2<f64>,
        x: &Array2<f64>,
        phases: &Array2<f64>,
    ) -> Result<Array2<Complex64>> {
        self.check_points("Hyperbolic power function", x)?;
        self.check_frequencies("Hyperbolic power function", lambda)?;
        if phases.nrows() != lambda.nrows() || phases.ncols() != self.dim {
            return Err(KernelError::shape(
                "Hyperbolic power function",
                format!("[{}, {}] phases", lambda.nrows(), self.dim),
                format!("[{}, {}]", phases.nrows(), phases.ncols()),
            ));
        }
        let rho = self.rho();
        let projection = x.slice(s![.., 1..]).dot(&phases.t());
        let mut out = Array2::zeros(projection.raw_dim());
        Zip::indexed(&mut out)
            .and(&projection)
            .par_for_each(|(i, o), value, proj| {
                let log_inner = (x[(i, 0)] - proj).max(f64::MIN_POSITIVE).ln();
                *value = (-Complex64::new(rho, lambda[(o, 0)]) * log_inner).exp();
            });
        Ok(out)
    }

    fn inv_harish_chandra(&self, lambda: &Array2<f64>) -> Result<Array1<f64>> {
        self.check_frequencies("Hyperbolic inverse Harish-Chandra", lambda)?;
        let dim = self.dim;
        Ok(lambda.column(0).mapv(|l| {
            let squared = l * l;
            let inverse_sq = if dim % 2 == 1 {
                (0..(dim - 1) / 2)
                    .map(|j| squared + (j * j) as f64)
                    .product::<f64>()
            } else {
                let half_terms: f64 = (0..(dim - 2) / 2)
                    .map(|j| squared + (j as f64 + 0.5).powi(2))
                    .product();
                l * (PI * l).tanh() * half_terms
            };
            inverse_sq.abs().sqrt()
        }))
    }

    fn plancherel_acceptance(&self, lambda: &Array2<f64>) -> Array1<f64> {
        if self.dim % 2 == 1 {
            return Array1::ones(lambda.nrows());
        }
        lambda.column(0).mapv(|l| (PI * l.abs()).tanh())
    }
}

impl HeatKernelSpace for Hyperbolic {
    fn distance(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_points("Hyperbolic distance", x)?;
        self.check_points("Hyperbolic distance", y)?;
        Ok(minkowski_inner(x, y).mapv(|inner| (-inner).clamp(1.0, MAX_COSH_DISTANCE).acosh()))
    }

    fn heat_kernel(&self, distance: &Array2<f64>, t: &Array1<f64>) -> Result<Array3<f64>> {
        if self.dim > 3 {
            return Err(KernelError::configuration(
                "Hyperbolic heat kernel",
                format!("closed forms exist for dimensions 1, 2 and 3, got {}", self.dim),
            ));
        }
        if let Some(bad) = t.iter().find(|value| !(value.is_finite() && **value > 0.0)) {
            return Err(KernelError::configuration(
                "Hyperbolic heat kernel",
                format!("diffusion times must be positive, got {bad}"),
            ));
        }
        let (n, m) = distance.dim();
        let times = t.len();
        let distances: Vec<f64> = distance.iter().copied().collect();
        let values = distances
            .par_iter()
            .flat_map_iter(|&rho| t.iter().map(move |&time| self.heat_kernel_value(rho, time)))
            .collect::<Result<Vec<f64>>>()?;
        Array3::from_shape_vec((n, m, times), values).map_err(|err| {
            KernelError::shape("Hyperbolic heat kernel", format!("[{n}, {m}, {times}]"), err)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn lifted_points_lie_on_hyperboloid() {
        let space = Hyperbolic::new(2).expect("space");
        let points = space.lift(&array![[0.0, 0.0], [1.0, -2.0]]).expect("lift");
        let inner = minkowski_inner(&points, &points);
        assert_abs_diff_eq!(inner[(0, 0)], -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(inner[(1, 1)], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn distance_is_symmetric_and_zero_on_diagonal() {
        let space = Hyperbolic::new(2).expect("space");
        let points = space
            .lift(&array![[0.0, 0.0], [0.5, 0.1], [-1.0, 2.0]])
            .expect("lift");
        let dist = space.distance(&points, &points).expect("distance");
        for i in 0..3 {
            assert_abs_diff_eq!(dist[(i, i)], 0.0, epsilon = 1e-6);
            for j in 0..3 {
                assert_abs_diff_eq!(dist[(i, j)], dist[(j, i)], epsilon = 1e-12);
            }
        }
        let origin_to_unit = space.lift(&array![[1f64.sinh(), 0.0]]).expect("lift");
        let d = space.distance(&points.slice(s![0..1, ..]).to_owned(), &origin_to_unit);
        assert_abs_diff_eq!(d.expect("distance")[(0, 0)], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn heat_kernels_decay_with_distance() {
        let t = array![0.5, 2.0];
        let distance = array![[0.0, 0.5, 2.0]];
        for dim in 1..=3 {
            let space = Hyperbolic::new(dim).expect("space");
            let heat = space.heat_kernel(&distance, &t).expect("heat kernel");
            assert_eq!(heat.dim(), (1, 3, 2));
            for time in 0..2 {
                assert!(heat[(0, 0, time)] > heat[(0, 1, time)]);
                assert!(heat[(0, 1, time)] > heat[(0, 2, time)]);
                assert!(heat[(0, 2, time)] > 0.0);
            }
        }
        let space = Hyperbolic::new(4).expect("space");
        assert!(space.heat_kernel(&distance, &t).unwrap_err().is_configuration());
    }

    #[test]
    fn heat_kernels_carry_no_time_prefactor() {
        let t = array![0.01, 1.0, 50.0];
        let one = Hyperbolic::new(1).expect("space");
        let heat = one.heat_kernel(&array![[0.0, 0.7]], &t).expect("heat kernel");
        for (k, time) in t.iter().enumerate() {
            assert_abs_diff_eq!(heat[(0, 0, k)], 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(heat[(0, 1, k)], (-0.49 / (4.0 * time)).exp(), epsilon = 1e-12);
        }
        let three = Hyperbolic::new(3).expect("space");
        let heat = three.heat_kernel(&array![[0.0, 1.0]], &t).expect("heat kernel");
        for (k, time) in t.iter().enumerate() {
            assert_abs_diff_eq!(heat[(0, 0, k)], 1.0, epsilon = 1e-12);
            let expected = (-1.0 / (4.0 * time)).exp() / 1f64.sinh();
            assert_abs_diff_eq!(heat[(0, 1, k)], expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn harish_chandra_closed_forms() {
        let lambda = array![[0.5], [2.0]];
        let three = Hyperbolic::new(3).expect("space");
        let c = three.inv_harish_chandra(&lambda).expect("c");
        assert_abs_diff_eq!(c[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(c[1], 2.0, epsilon = 1e-12);
        let two = Hyperbolic::new(2).expect("space");
        let c = two.inv_harish_chandra(&lambda).expect("c");
        assert_abs_diff_eq!(c[1], (2.0 * (2.0 * PI).tanh()).sqrt(), epsilon = 1e-12);
        let acceptance = two.plancherel_acceptance(&lambda);
        assert!(acceptance.iter().all(|a| *a > 0.0 && *a <= 1.0));
        assert_eq!(three.plancherel_acceptance(&lambda), array![1.0, 1.0]);
    }

    #[test]
    fn power_function_at_origin_has_unit_modulus_for_rank_one() {
        let space = Hyperbolic::new(2).expect("space");
        let (next, phases) = space.random_phases(RandomState::new(5), 4).expect("phases");
        assert_eq!(next.counter(), 1);
        for row in phases.rows() {
            assert_abs_diff_eq!(row.dot(&row), 1.0, epsilon = 1e-12);
        }
        let origin = space.lift(&array![[0.0, 0.0]]).expect("lift");
        let lambda = array![[0.3], [1.0], [2.0], [0.1]];
        let values = space.power_function(&lambda, &origin, &phases).expect("power");
        assert_eq!(values.dim(), (1, 4));
        for value in values.iter() {
            assert_abs_diff_eq!(value.norm(), 1.0, epsilon = 1e-12);
        }
    }
}
