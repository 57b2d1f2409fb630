use std::fmt;

use ndarray::{Array1, Array2, Array3, Axis};

use crate::error::{KernelError, Result};

/// Laplace–Beltrami eigenfunctions grouped into levels. Eigenfunctions on one level share an
/// eigenvalue, so kernels only ever need the per-level sums given by the addition theorem.
pub trait Eigenfunctions: Send + Sync + fmt::Debug {
    fn num_eigenfunctions(&self) -> usize;

    fn num_levels(&self) -> usize;

    /// Eigenfunction count of every level; sums to [`Eigenfunctions::num_eigenfunctions`].
    fn num_eigenfunctions_per_level(&self) -> Vec<usize>;

    /// Eigenfunction values `[N, num_eigenfunctions]`.
    fn evaluate(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// `Σ_{j in level l} φ_j(x) φ_j(x2)` as `[N, N2, L]`.
    fn addition_theorem(&self, x: &Array2<f64>, x2: &Array2<f64>) -> Result<Array3<f64>>;

    /// Diagonal of the addition theorem, `[N, L]`.
    fn addition_theorem_diag(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Addition theorem between data points and random phases drawn from the space.
    fn phi_product(&self, x: &Array2<f64>, phases: &Array2<f64>) -> Result<Array3<f64>> {
        self.addition_theorem(x, phases)
    }

    /// `Σ_l weights_l · addition_theorem(x, x2)_l`; `x2 = None` reuses `x`.
    fn weighted_outerproduct(
        &self,
        weights: &Array1<f64>,
        x: &Array2<f64>,
        x2: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        check_level_weights(self.num_levels(), weights)?;
        let per_level = self.addition_theorem(x, x2.unwrap_or(x))?;
        Ok(contract_levels(&per_level, weights))
    }

    fn weighted_outerproduct_diag(
        &self,
        weights: &Array1<f64>,
        x: &Array2<f64>,
    ) -> Result<Array1<f64>> {
        check_level_weights(self.num_levels(), weights)?;
        Ok(self.addition_theorem_diag(x)?.dot(weights))
    }
}

pub(crate) fn check_level_weights(levels: usize, weights: &Array1<f64>) -> Result<()> {
    if weights.len() != levels {
        return Err(KernelError::shape(
            "level weights",
            format!("{levels} weights"),
            weights.len(),
        ));
    }
    Ok(())
}

pub(crate) fn contract_levels(per_level: &Array3<f64>, weights: &Array1<f64>) -> Array2<f64> {
    let (n, m, _) = per_level.dim();
    let mut out = Array2::zeros((n, m));
    for (level, weight) in weights.iter().enumerate() {
        out.scaled_add(*weight, &per_level.index_axis(Axis(2), level));
    }
    out
}

/// Start offset of every level inside the flat eigenfunction ordering.
pub(crate) fn level_offsets(per_level: &[usize]) -> Vec<usize> {
    per_level
        .iter()
        .scan(0usize, |offset, count| {
            let start = *offset;
            *offset += count;
            Some(start)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_accumulate_counts() {
        assert_eq!(level_offsets(&[1, 2, 2, 2]), vec![0, 1, 3, 5]);
        assert!(level_offsets(&[]).is_empty());
    }

    #[test]
    fn contraction_weights_levels() {
        let per_level = Array3::from_shape_fn((2, 2, 3), |(i, j, l)| (i + j + l) as f64);
        let weights = Array1::from(vec![1.0, 0.0, 2.0]);
        let out = contract_levels(&per_level, &weights);
        assert_eq!(out[(1, 1)], 2.0 + 2.0 * 4.0);
        assert!(check_level_weights(2, &weights).unwrap_err().is_shape());
    }
}
