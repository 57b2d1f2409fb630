use std::cmp::Ordering;

use log::debug;
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use sprs::{CsMat, TriMat};

use super::dense::{dense_qr, dense_smallest_eigenpairs};
use super::{
    BackendOps, DType, Eigenpairs, Tensor, TensorKind, check_eigen_request, check_same_shape,
    check_take_index,
};
use crate::error::{KernelError, Result};

const LANCZOS_SEED: u64 = 0x5EED_1A2C;
const BREAKDOWN_TOLERANCE: f64 = 1e-10;
const RESIDUAL_TOLERANCE: f64 = 1e-8;
const MIN_KRYLOV_DIM: usize = 24;

#[derive(Debug, Default, Clone, Copy)]
pub struct SparseOps;

impl SparseOps {
    fn expect_sparse<'a>(&self, context: &str, a: &'a Tensor) -> Result<&'a CsMat<f64>> {
        match a {
            Tensor::Sparse(sparse) => Ok(sparse),
            Tensor::Dense(_) => Err(KernelError::configuration(
                context,
                "sparse primitive dispatched on a dense tensor",
            )),
        }
    }
}

impl BackendOps for SparseOps {
    fn kind(&self) -> TensorKind {
        TensorKind::Sparse
    }

    fn take_along_axis(&self, a: &Tensor, index: &Array2<usize>, axis: Axis) -> Result<Tensor> {
        let sparse = self.expect_sparse("take_along_axis", a)?;
        check_take_index("take_along_axis", sparse.shape(), index, axis)?;
        let mut tri = TriMat::new(index.dim());
        for ((i, j), &k) in index.indexed_iter() {
            let (row, col) = match axis.index() {
                0 => (k, j),
                _ => (i, k),
            };
            if let Some(&value) = sparse.get(row, col) {
                tri.add_triplet(i, j, value);
            }
        }
        Ok(Tensor::Sparse(tri.to_csr()))
    }

    fn from_values(&self, values: Array2<f64>) -> Tensor {
        let mut tri = TriMat::new(values.dim());
        for ((row, col), &value) in values.indexed_iter() {
            if value != 0.0 {
                tri.add_triplet(row, col, value);
            }
        }
        Tensor::Sparse(tri.to_csr())
    }

    fn degree(&self, adjacency: &Tensor) -> Result<Tensor> {
        let sparse = self.expect_sparse("degree", adjacency)?;
        let (rows, cols) = sparse.shape();
        if rows != cols {
            return Err(KernelError::shape(
                "degree",
                "square adjacency",
                format!("{rows}x{cols}"),
            ));
        }
        let mut degrees = vec![0.0f64; cols];
        for (value, (_, col)) in sparse.iter() {
            degrees[col] += *value;
        }
        let mut tri = TriMat::new((rows, cols));
        for (i, d) in degrees.into_iter().enumerate() {
            if d != 0.0 {
                tri.add_triplet(i, i, d);
            }
        }
        Ok(Tensor::Sparse(tri.to_csr()))
    }

    fn sub(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        check_same_shape("sub", a, b)?;
        let left = self.expect_sparse("sub", a)?;
        let mut tri = TriMat::new(left.shape());
        for (value, (row, col)) in left.iter() {
            tri.add_triplet(row, col, *value);
        }
        match b {
            Tensor::Sparse(right) => {
                for (value, (row, col)) in right.iter() {
                    tri.add_triplet(row, col, -*value);
                }
            }
            Tensor::Dense(right) => {
                for ((row, col), value) in right.indexed_iter() {
                    if *value != 0.0 {
                        tri.add_triplet(row, col, -*value);
                    }
                }
            }
        }
        Ok(Tensor::Sparse(tri.to_csr()))
    }

    fn matvec(&self, a: &Tensor, vector: &[f64]) -> Result<Vec<f64>> {
        let sparse = self.expect_sparse("matvec", a)?;
        let rows = SparseRows::from_matrix(sparse);
        if rows.size != vector.len() || sparse.cols() != vector.len() {
            return Err(KernelError::shape(
                "matvec",
                format!("vector of length {}", sparse.cols()),
                vector.len(),
            ));
        }
        Ok(rows.multiply(vector))
    }

    fn eigenpairs(&self, matrix: &Tensor, k: usize) -> Result<Eigenpairs> {
        let n = check_eigen_request("sparse eigenpairs", matrix, k)?;
        let sparse = self.expect_sparse("sparse eigenpairs", matrix)?;
        if k == n {
            let dense = matrix.to_dense();
            let symmetric = (&dense + &dense.t()) * 0.5;
            return dense_smallest_eigenpairs(&symmetric, k);
        }
        if k + 1 >= n {
            return Err(KernelError::decomposition(
                "sparse eigenpairs",
                format!(
                    "iterative solver cannot resolve {k} eigenpairs of a {n}x{n} operator; request all {n} or at most {}",
                    n.saturating_sub(2)
                ),
            ));
        }
        lanczos_smallest_eigenpairs(&SparseRows::from_matrix(sparse), k)
    }

    fn set_value(&self, a: &Tensor, index: (usize, usize), value: f64) -> Result<Tensor> {
        let sparse = self.expect_sparse("set_value", a)?;
        let (rows, cols) = sparse.shape();
        if index.0 >= rows || index.1 >= cols {
            return Err(KernelError::shape(
                "set_value",
                format!("index below ({rows}, {cols})"),
                format!("{index:?}"),
            ));
        }
        let mut tri = TriMat::new((rows, cols));
        for (entry, (row, col)) in sparse.iter() {
            if (row, col) != index {
                tri.add_triplet(row, col, *entry);
            }
        }
        if value != 0.0 {
            tri.add_triplet(index.0, index.1, value);
        }
        Ok(Tensor::Sparse(tri.to_csr()))
    }

    fn qr(&self, matrix: &Tensor) -> Result<(Tensor, Tensor)> {
        self.expect_sparse("qr", matrix)?;
        let (q, r) = dense_qr(&matrix.to_dense());
        Ok((self.from_values(q), self.from_values(r)))
    }

    fn norm(&self, a: &Tensor) -> f64 {
        match a {
            Tensor::Sparse(sparse) => sparse.iter().map(|(v, _)| v * v).sum::<f64>().sqrt(),
            Tensor::Dense(dense) => dense.iter().map(|v| v * v).sum::<f64>().sqrt(),
        }
    }

    fn dtype_double(&self) -> DType {
        DType::Float64
    }

    fn dtype_integer(&self) -> DType {
        DType::Index
    }
}

/// Row-major adjacency lists used for parallel mat-vec products.
#[derive(Debug, Clone)]
struct SparseRows {
    size: usize,
    rows: Vec<Vec<(usize, f64)>>,
}

impl SparseRows {
    fn from_matrix(matrix: &CsMat<f64>) -> Self {
        let mut rows = vec![Vec::new(); matrix.rows()];
        for (value, (row, col)) in matrix.iter() {
            rows[row].push((col, *value));
        }
        Self {
            size: matrix.cols(),
            rows,
        }
    }

    fn multiply(&self, vector: &[f64]) -> Vec<f64> {
        self.rows
            .par_iter()
            .map(|row| row.iter().map(|(j, weight)| weight * vector[*j]).sum())
            .collect()
    }
}

/// Smallest eigenpairs through Lanczos with full reorthogonalization. The Krylov dimension grows
/// until every requested Ritz pair meets the residual tolerance or the whole space is spanned.
fn lanczos_smallest_eigenpairs(operator: &SparseRows, k: usize) -> Result<Eigenpairs> {
    let n = operator.size;
    let mut krylov_dim = (3 * k).max(k + MIN_KRYLOV_DIM).min(n);

    loop {
        let (values, vectors) = lanczos_ritz_pairs(operator, krylov_dim)?;
        if values.len() < k {
            return Err(KernelError::decomposition(
                "sparse eigenpairs",
                format!("Krylov space collapsed to {} vectors, need {k}", values.len()),
            ));
        }

        let scale = values.iter().fold(1.0f64, |acc, v| acc.max(v.abs()));
        let worst_residual = (0..k)
            .map(|col| {
                let vector: Vec<f64> = vectors.column(col).to_vec();
                let image = operator.multiply(&vector);
                image
                    .iter()
                    .zip(vector.iter())
                    .map(|(a, v)| (a - values[col] * v).powi(2))
                    .sum::<f64>()
                    .sqrt()
            })
            .fold(0.0f64, f64::max);

        debug!(
            "Lanczos with Krylov dimension {} for {} eigenpairs: worst residual {:.3e}",
            krylov_dim, k, worst_residual
        );

        if worst_residual <= RESIDUAL_TOLERANCE * scale {
            let eigenvalues = Array1::from_iter(values.iter().take(k).copied());
            let eigenvectors = Array2::from_shape_fn((n, k), |(i, j)| vectors[(i, j)]);
            return Ok(Eigenpairs {
                eigenvalues,
                eigenvectors,
            });
        }
        if krylov_dim == n {
            return Err(KernelError::decomposition(
                "sparse eigenpairs",
                format!(
                    "Lanczos iteration failed to converge: residual {worst_residual:.3e} for {k} eigenpairs of a {n}x{n} operator"
                ),
            ));
        }
        krylov_dim = (krylov_dim * 2).min(n);
    }
}

fn lanczos_ritz_pairs(operator: &SparseRows, steps: usize) -> Result<(Vec<f64>, Array2<f64>)> {
    let n = operator.size;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(LANCZOS_SEED);
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(steps);
    let mut alpha = Vec::with_capacity(steps);
    let mut beta: Vec<f64> = Vec::with_capacity(steps);

    let mut current = random_orthonormal(&mut rng, n, &basis).ok_or_else(|| {
        KernelError::decomposition("sparse eigenpairs", "random start vector sampled as zero")
    })?;

    for step in 0..steps {
        let mut w = operator.multiply(&current);
        let a = dot(&current, &w);
        alpha.push(a);
        axpy(&mut w, -a, &current);
        if let (Some(previous), Some(&last_beta)) = (basis.last(), beta.last()) {
            axpy(&mut w, -last_beta, previous);
        }
        basis.push(current);
        for _ in 0..2 {
            for q in &basis {
                let projection = dot(&w, q);
                axpy(&mut w, -projection, q);
            }
        }
        if step + 1 == steps {
            break;
        }

        let b = dot(&w, &w).sqrt();
        if b > BREAKDOWN_TOLERANCE {
            beta.push(b);
            w.iter_mut().for_each(|v| *v /= b);
            current = w;
        } else {
            match random_orthonormal(&mut rng, n, &basis) {
                Some(restart) => {
                    beta.push(0.0);
                    current = restart;
                }
                None => break,
            }
        }
    }

    let m = alpha.len();
    let mut tridiagonal = DMatrix::zeros(m, m);
    for i in 0..m {
        tridiagonal[(i, i)] = alpha[i];
        if i + 1 < m {
            let b = beta.get(i).copied().unwrap_or(0.0);
            tridiagonal[(i, i + 1)] = b;
            tridiagonal[(i + 1, i)] = b;
        }
    }
    let eigen = SymmetricEigen::new(tridiagonal);
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[a]
            .partial_cmp(&eigen.eigenvalues[b])
            .unwrap_or(Ordering::Equal)
    });

    let values: Vec<f64> = order.iter().map(|&i| eigen.eigenvalues[i]).collect();
    let mut vectors = Array2::zeros((n, m));
    for (col, &ritz) in order.iter().enumerate() {
        for (j, q) in basis.iter().enumerate() {
            let coefficient = eigen.eigenvectors[(j, ritz)];
            for (row, value) in q.iter().enumerate() {
                vectors[(row, col)] += coefficient * value;
            }
        }
        let norm = vectors.column(col).iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            vectors.column_mut(col).mapv_inplace(|v| v / norm);
        }
    }
    Ok((values, vectors))
}

fn random_orthonormal(
    rng: &mut Xoshiro256PlusPlus,
    n: usize,
    basis: &[Vec<f64>],
) -> Option<Vec<f64>> {
    if basis.len() >= n {
        return None;
    }
    for _ in 0..8 {
        let mut vector: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0f64..1.0f64)).collect();
        for _ in 0..2 {
            for q in basis {
                let projection = dot(&vector, q);
                axpy(&mut vector, -projection, q);
            }
        }
        let norm = dot(&vector, &vector).sqrt();
        if norm > 1e-8 {
            vector.iter_mut().for_each(|v| *v /= norm);
            return Some(vector);
        }
    }
    None
}

fn dot(left: &[f64], right: &[f64]) -> f64 {
    left.iter().zip(right.iter()).map(|(l, r)| l * r).sum()
}

fn axpy(target: &mut [f64], scale: f64, source: &[f64]) {
    target
        .iter_mut()
        .zip(source.iter())
        .for_each(|(t, s)| *t += scale * s);
}
