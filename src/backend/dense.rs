use std::cmp::Ordering;

use nalgebra::SymmetricEigen;
use ndarray::{Array1, Array2, Axis};

use super::numeric::{array_to_dmatrix, dmatrix_to_array};
use super::{
    BackendOps, DType, Eigenpairs, Tensor, TensorKind, check_eigen_request, check_same_shape,
    check_take_index,
};
use crate::error::{KernelError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct DenseOps;

impl DenseOps {
    fn expect_dense<'a>(&self, context: &str, a: &'a Tensor) -> Result<&'a Array2<f64>> {
        match a {
            Tensor::Dense(dense) => Ok(dense),
            Tensor::Sparse(_) => Err(KernelError::configuration(
                context,
                "dense primitive dispatched on a sparse tensor",
            )),
        }
    }
}

impl BackendOps for DenseOps {
    fn kind(&self) -> TensorKind {
        TensorKind::Dense
    }

    fn take_along_axis(&self, a: &Tensor, index: &Array2<usize>, axis: Axis) -> Result<Tensor> {
        let dense = self.expect_dense("take_along_axis", a)?;
        check_take_index("take_along_axis", dense.dim(), index, axis)?;
        let gathered = Array2::from_shape_fn(index.dim(), |(i, j)| match axis.index() {
            0 => dense[(index[(i, j)], j)],
            _ => dense[(i, index[(i, j)])],
        });
        Ok(Tensor::Dense(gathered))
    }

    fn from_values(&self, values: Array2<f64>) -> Tensor {
        Tensor::Dense(values)
    }

    fn degree(&self, adjacency: &Tensor) -> Result<Tensor> {
        let dense = self.expect_dense("degree", adjacency)?;
        if !adjacency.is_square() {
            return Err(KernelError::shape(
                "degree",
                "square adjacency",
                format!("{:?}", dense.dim()),
            ));
        }
        let degrees = dense.sum_axis(Axis(0));
        Ok(Tensor::Dense(Array2::from_diag(&degrees)))
    }

    fn sub(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        check_same_shape("sub", a, b)?;
        let left = self.expect_dense("sub", a)?;
        Ok(Tensor::Dense(left - &b.to_dense()))
    }

    fn matvec(&self, a: &Tensor, vector: &[f64]) -> Result<Vec<f64>> {
        let dense = self.expect_dense("matvec", a)?;
        if dense.ncols() != vector.len() {
            return Err(KernelError::shape(
                "matvec",
                format!("vector of length {}", dense.ncols()),
                vector.len(),
            ));
        }
        let v = Array1::from(vector.to_vec());
        Ok(dense.dot(&v).to_vec())
    }

    fn eigenpairs(&self, matrix: &Tensor, k: usize) -> Result<Eigenpairs> {
        check_eigen_request("dense eigenpairs", matrix, k)?;
        let dense = self.expect_dense("dense eigenpairs", matrix)?;
        let symmetric = (dense + &dense.t()) * 0.5;
        dense_smallest_eigenpairs(&symmetric, k)
    }

    fn set_value(&self, a: &Tensor, index: (usize, usize), value: f64) -> Result<Tensor> {
        let dense = self.expect_dense("set_value", a)?;
        let (rows, cols) = dense.dim();
        if index.0 >= rows || index.1 >= cols {
            return Err(KernelError::shape(
                "set_value",
                format!("index below ({rows}, {cols})"),
                format!("{index:?}"),
            ));
        }
        let mut updated = dense.clone();
        updated[index] = value;
        Ok(Tensor::Dense(updated))
    }

    fn qr(&self, matrix: &Tensor) -> Result<(Tensor, Tensor)> {
        let dense = self.expect_dense("qr", matrix)?;
        let (q, r) = dense_qr(dense);
        Ok((Tensor::Dense(q), Tensor::Dense(r)))
    }

    fn norm(&self, a: &Tensor) -> f64 {
        match a {
            Tensor::Dense(dense) => dense.iter().map(|v| v * v).sum::<f64>().sqrt(),
            Tensor::Sparse(_) => a.to_dense().iter().map(|v| v * v).sum::<f64>().sqrt(),
        }
    }

    fn dtype_double(&self) -> DType {
        DType::Float64
    }

    fn dtype_integer(&self) -> DType {
        DType::Int64
    }
}

pub(crate) fn dense_qr(values: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
    let qr = array_to_dmatrix(values).qr();
    (dmatrix_to_array(&qr.q()), dmatrix_to_array(&qr.r()))
}

pub(crate) fn dense_smallest_eigenpairs(symmetric: &Array2<f64>, k: usize) -> Result<Eigenpairs> {
    let n = symmetric.nrows();
    if symmetric.iter().any(|v| !v.is_finite()) {
        return Err(KernelError::decomposition(
            "dense eigenpairs",
            "matrix contains non-finite entries",
        ));
    }
    let eigen = SymmetricEigen::new(array_to_dmatrix(symmetric));
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[a]
            .partial_cmp(&eigen.eigenvalues[b])
            .unwrap_or(Ordering::Equal)
    });
    order.truncate(k);

    let eigenvalues = Array1::from_iter(order.iter().map(|&i| eigen.eigenvalues[i]));
    let eigenvectors =
        Array2::from_shape_fn((n, k), |(row, col)| eigen.eigenvectors[(row, order[col])]);
    Ok(Eigenpairs {
        eigenvalues,
        eigenvectors,
    })
}
