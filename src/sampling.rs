//! Spectral base densities and rejection sampling.
//!
//! Every sampler consumes a [`RandomState`] and hands back its successor alongside the draw.

use log::debug;
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand_distr::{ChiSquared, Distribution, StandardNormal};

use crate::backend::numeric::array_to_dmatrix;
use crate::error::{KernelError, Result};
use crate::params::{KernelParams, Smoothness};
use crate::random::RandomState;

/// Proposals allowed per requested sample before rejection sampling gives up.
pub const REJECTION_BUDGET_FACTOR: usize = 256;

/// `count` draws of a multivariate Student-t with location `loc`, shape matrix `shape` and `df`
/// degrees of freedom, as rows of `[count, dim]`.
pub fn student_t_sample(
    key: RandomState,
    loc: &Array1<f64>,
    shape: &Array2<f64>,
    df: f64,
    count: usize,
) -> Result<(RandomState, Array2<f64>)> {
    let dim = loc.len();
    if shape.dim() != (dim, dim) {
        return Err(KernelError::shape(
            "student_t_sample",
            format!("[{dim}, {dim}] shape matrix"),
            format!("{:?}", shape.dim()),
        ));
    }
    let chi_squared = ChiSquared::new(df).map_err(|err| {
        KernelError::configuration(
            "student_t_sample",
            format!("degrees of freedom must be positive, got {df}: {err}"),
        )
    })?;
    let factor = array_to_dmatrix(shape).cholesky().ok_or_else(|| {
        KernelError::decomposition("student_t_sample", "shape matrix is not positive definite")
    })?;
    let lower = factor.l();

    let (next, mut rng) = key.split();
    let mut samples = Array2::zeros((count, dim));
    for mut row in samples.rows_mut() {
        let z: DMatrix<f64> = DMatrix::from_fn(dim, 1, |_, _| StandardNormal.sample(&mut rng));
        let u: f64 = chi_squared.sample(&mut rng);
        let correlated = &lower * z;
        let scale = (df / u).sqrt();
        for (i, value) in row.iter_mut().enumerate() {
            *value = loc[i] + correlated[(i, 0)] * scale;
        }
    }
    Ok((next, samples))
}

/// `count` draws of independent centred normals with per-coordinate standard deviations.
pub fn gaussian_sample(
    key: RandomState,
    scales: &Array1<f64>,
    count: usize,
) -> Result<(RandomState, Array2<f64>)> {
    let (next, mut rng) = key.split();
    let samples = Array2::from_shape_fn((count, scales.len()), |(_, j)| {
        let z: f64 = StandardNormal.sample(&mut rng);
        z * scales[j]
    });
    Ok((next, samples))
}

/// Frequencies from the Matérn base density on a noncompact space of dimension `dimension` and
/// rank `rank`: Gaussian with scale `1/κ` for `ν = ∞`, otherwise Student-t with
/// `df = 2ν + d - r` and scale `√(2ν/df)/κ`.
pub fn base_density_sample(
    key: RandomState,
    count: usize,
    params: &KernelParams,
    dimension: usize,
    rank: usize,
) -> Result<(RandomState, Array2<f64>)> {
    let context = "base_density_sample";
    params.validate(context)?;
    let lengthscales = (0..rank)
        .map(|i| params.lengthscale.component(i, rank, context))
        .collect::<Result<Vec<f64>>>()?;

    match params.nu {
        Smoothness::Infinite => {
            let scales = Array1::from_iter(lengthscales.iter().map(|l| 1.0 / l));
            gaussian_sample(key, &scales, count)
        }
        Smoothness::Finite(nu) => {
            let df = 2.0 * nu + dimension as f64 - rank as f64;
            let base = (2.0 * nu / df).sqrt();
            let shape = Array2::from_diag(&Array1::from_iter(
                lengthscales.iter().map(|l| (base / l).powi(2)),
            ));
            student_t_sample(key, &Array1::zeros(rank), &shape, df, count)
        }
    }
}

/// Accepted proposals together with the acceptance probability each one was accepted with.
#[derive(Debug, Clone)]
pub struct RejectionSample {
    pub samples: Array2<f64>,
    pub acceptance: Array1<f64>,
}

/// Draws `count` rows from the proposal and keeps each with probability `acceptance(row)`,
/// which must lie in `[0, 1]`. At most `count * REJECTION_BUDGET_FACTOR` proposals are tried.
pub fn rejection_sample<P, A>(
    key: RandomState,
    count: usize,
    mut proposal: P,
    acceptance: A,
) -> Result<(RandomState, RejectionSample)>
where
    P: FnMut(RandomState, usize) -> Result<(RandomState, Array2<f64>)>,
    A: Fn(&Array2<f64>) -> Array1<f64>,
{
    let budget = count.saturating_mul(REJECTION_BUDGET_FACTOR).max(count);
    let mut key = key;
    let mut accepted_rows: Vec<Array1<f64>> = Vec::with_capacity(count);
    let mut accepted_probability = Vec::with_capacity(count);
    let mut width = None;
    let mut attempts = 0usize;

    while accepted_rows.len() < count {
        if attempts >= budget {
            return Err(KernelError::decomposition(
                "rejection_sample",
                format!(
                    "accepted {} of {count} samples within {budget} proposals",
                    accepted_rows.len()
                ),
            ));
        }
        let batch = (2 * (count - accepted_rows.len())).min(budget - attempts).max(1);
        let (after_proposal, candidates) = proposal(key, batch)?;
        let probabilities = acceptance(&candidates);
        if probabilities.len() != candidates.nrows() {
            return Err(KernelError::shape(
                "rejection_sample",
                format!("{} acceptance probabilities", candidates.nrows()),
                probabilities.len(),
            ));
        }
        let (after_uniform, mut rng) = after_proposal.split();
        key = after_uniform;
        attempts += batch;
        width.get_or_insert(candidates.ncols());

        for (row, probability) in candidates.axis_iter(Axis(0)).zip(probabilities.iter()) {
            if accepted_rows.len() == count {
                break;
            }
            let u: f64 = rng.r#gen();
            if u < *probability {
                accepted_rows.push(row.to_owned());
                accepted_probability.push(*probability);
            }
        }
    }

    debug!(
        "Rejection sampling accepted {} samples after {} proposals",
        count, attempts
    );
    let width = width.unwrap_or(0);
    let mut samples = Array2::zeros((count, width));
    for (mut target, row) in samples.rows_mut().into_iter().zip(accepted_rows.iter()) {
        target.assign(row);
    }
    Ok((
        key,
        RejectionSample {
            samples,
            acceptance: Array1::from(accepted_probability),
        },
    ))
}
