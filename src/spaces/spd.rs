use std::f64::consts::PI;

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, ArrayView1};
use num_complex::Complex64;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;

use super::{NoncompactSymmetricSpace, Space, SpaceKind};
use crate::backend::{self, Tensor};
use crate::error::{KernelError, Result};
use crate::random::RandomState;

/// Symmetric positive definite `n x n` matrices, flattened row-major into `n * n` coordinates.
#[derive(Debug, Clone)]
pub struct SymmetricPositiveDefiniteMatrices {
    n: usize,
}

impl SymmetricPositiveDefiniteMatrices {
    pub fn new(n: usize) -> Result<Self> {
        if n < 2 {
            return Err(KernelError::configuration(
                "SymmetricPositiveDefiniteMatrices",
                format!("matrix size must be at least 2, got {n}"),
            ));
        }
        Ok(Self { n })
    }

    pub fn matrix_size(&self) -> usize {
        self.n
    }

    /// `ρ_i = i - (n + 1) / 2` for `i = 1..=n`.
    pub fn rho(&self) -> Array1<f64> {
        let shift = (self.n as f64 + 1.0) / 2.0;
        Array1::from_iter((1..=self.n).map(|i| i as f64 - shift))
    }

    /// Points `exp(S)` for random symmetric `S` with standard normal entries.
    pub fn random_points(
        &self,
        key: RandomState,
        count: usize,
    ) -> Result<(RandomState, Array2<f64>)> {
        let (next, mut rng) = key.split();
        let n = self.n;
        let mut points = Array2::zeros((count, n * n));
        for mut row in points.rows_mut() {
            let mut generator = DMatrix::<f64>::zeros(n, n);
            for i in 0..n {
                for j in i..n {
                    let value: f64 = StandardNormal.sample(&mut rng);
                    generator[(i, j)] = value;
                    generator[(j, i)] = value;
                }
            }
            let eigen = SymmetricEigen::new(generator);
            let exp_values = DMatrix::from_diagonal(&eigen.eigenvalues.map(f64::exp));
            let point = &eigen.eigenvectors * exp_values * eigen.eigenvectors.transpose();
            for i in 0..n {
                for j in 0..n {
                    row[i * n + j] = point[(i, j)];
                }
            }
        }
        Ok((next, points))
    }

    fn unflatten(&self, row: ArrayView1<'_, f64>) -> DMatrix<f64> {
        let n = self.n;
        DMatrix::from_fn(n, n, |i, j| row[i * n + j])
    }

    fn check_frequencies(&self, context: &str, lambda: &Array2<f64>) -> Result<()> {
        if lambda.ncols() != self.n {
            return Err(KernelError::shape(
                context,
                format!("[O, {}] frequencies", self.n),
                format!("[{}, {}]", lambda.nrows(), lambda.ncols()),
            ));
        }
        Ok(())
    }

    /// `Σ_{i<j} f(|λ_i - λ_j|)` for one frequency row.
    fn pairwise_sum(lambda: ArrayView1<'_, f64>, f: impl Fn(f64) -> f64) -> f64 {
        let mut total = 0.0;
        for i in 0..lambda.len() {
            for j in i + 1..lambda.len() {
                total += f((lambda[i] - lambda[j]).abs());
            }
        }
        total
    }
}

impl Space for SymmetricPositiveDefiniteMatrices {
    fn name(&self) -> &str {
        "SymmetricPositiveDefiniteMatrices"
    }

    fn kind(&self) -> SpaceKind {
        SpaceKind::Spd
    }

    fn dimension(&self) -> usize {
        self.n * (self.n + 1) / 2
    }

    fn point_width(&self) -> usize {
        self.n * self.n
    }
}

impl NoncompactSymmetricSpace for SymmetricPositiveDefiniteMatrices {
    fn rank(&self) -> usize {
        self.n
    }

    /// Haar-distributed orthogonal matrices: QR of a Gaussian matrix with the signs of `R`'s
    /// diagonal folded into `Q`.
    fn random_phases(
        &self,
        key: RandomState,
        count: usize,
    ) -> Result<(RandomState, Array2<f64>)> {
        let (next, mut rng) = key.split();
        let n = self.n;
        let mut phases = Array2::zeros((count, n * n));
        for mut row in phases.rows_mut() {
            let gaussian: Array2<f64> =
                Array2::from_shape_fn((n, n), |_| StandardNormal.sample(&mut rng));
            let (q, r) = backend::qr(&Tensor::Dense(gaussian))?;
            let q = q.to_dense();
            let r = r.to_dense();
            for i in 0..n {
                for j in 0..n {
                    let sign = if r[(j, j)] < 0.0 { -1.0 } else { 1.0 };
                    row[i * n + j] = q[(i, j)] * sign;
                }
            }
        }
        Ok((next, phases))
    }

    /// `exp(Σ_i (ρ_i + iλ_i) log |R_ii|)` with `R` from the QR factorization of
    /// `chol(x) · h`.
    fn power_function(
        &self,
        lambda: &Array2<f64>,
        x: &Array2<f64>,
        phases: &Array2<f64>,
    ) -> Result<Array2<Complex64>> {
        let context = "SymmetricPositiveDefiniteMatrices power function";
        self.check_points(context, x)?;
        self.check_frequencies(context, lambda)?;
        if phases.nrows() != lambda.nrows() || phases.ncols() != self.n * self.n {
            return Err(KernelError::shape(
                context,
                format!("[{}, {}] phases", lambda.nrows(), self.n * self.n),
                format!("[{}, {}]", phases.nrows(), phases.ncols()),
            ));
        }
        let rho = self.rho();
        let rotations: Vec<DMatrix<f64>> = phases
            .rows()
            .into_iter()
            .map(|h| self.unflatten(h))
            .collect();

        let rows: Vec<Vec<Complex64>> = x
            .rows()
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|point| -> Result<Vec<Complex64>> {
                let cholesky = self.unflatten(point).cholesky().ok_or_else(|| {
                    KernelError::decomposition(context, "point is not positive definite")
                })?;
                let factor = cholesky.l();
                Ok(rotations
                    .iter()
                    .enumerate()
                    .map(|(o, h)| {
                        let r = (&factor * h).qr().r();
                        let exponent: Complex64 = (0..self.n)
                            .map(|i| {
                                let log_u = r[(i, i)].abs().max(f64::MIN_POSITIVE).ln();
                                Complex64::new(rho[i], lambda[(o, i)]) * log_u
                            })
                            .sum();
                        exponent.exp()
                    })
                    .collect::<Vec<Complex64>>())
            })
            .collect::<Result<_>>()?;

        let (n_points, n_phases) = (x.nrows(), phases.nrows());
        Ok(Array2::from_shape_fn((n_points, n_phases), |(i, o)| rows[i][o]))
    }

    /// `Π_{i<j} (π|λ_i - λ_j| tanh(π|λ_i - λ_j|))^{1/2}`.
    fn inv_harish_chandra(&self, lambda: &Array2<f64>) -> Result<Array1<f64>> {
        self.check_frequencies(
            "SymmetricPositiveDefiniteMatrices inverse Harish-Chandra",
            lambda,
        )?;
        Ok(Array1::from_iter(lambda.rows().into_iter().map(|row| {
            let log_c = Self::pairwise_sum(row, |d| (PI * d).ln() + (PI * d).tanh().ln());
            (0.5 * log_c).exp()
        })))
    }

    fn plancherel_acceptance(&self, lambda: &Array2<f64>) -> Array1<f64> {
        Array1::from_iter(
            lambda
                .rows()
                .into_iter()
                .map(|row| Self::pairwise_sum(row, |d| (PI * d).tanh().ln()).exp()),
        )
    }
}
