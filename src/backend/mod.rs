//! Numeric primitives shared by every tensor representation.
//!
//! Each representation registers exactly one implementation of [`BackendOps`]; callers resolve
//! it once through [`ops_for`] using the tensor's [`TensorKind`] tag. Every primitive returns a
//! new tensor and leaves its inputs untouched.

pub mod dense;
pub mod numeric;
pub mod sparse;

use ndarray::{Array1, Array2, Axis};
use sprs::{CsMat, TriMat};

use crate::error::{KernelError, Result};

pub use dense::DenseOps;
pub use numeric::{array_to_dmatrix, dmatrix_to_array, logspace, set_value, trapz};
pub use sparse::SparseOps;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorKind {
    Dense,
    Sparse,
}

/// Element types a representation stores for floating point data and for indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Float64,
    Int64,
    Index,
}

#[derive(Debug, Clone)]
pub enum Tensor {
    Dense(Array2<f64>),
    Sparse(CsMat<f64>),
}

impl Tensor {
    pub fn kind(&self) -> TensorKind {
        match self {
            Tensor::Dense(_) => TensorKind::Dense,
            Tensor::Sparse(_) => TensorKind::Sparse,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        match self {
            Tensor::Dense(dense) => dense.dim(),
            Tensor::Sparse(sparse) => sparse.shape(),
        }
    }

    pub fn ops(&self) -> &'static dyn BackendOps {
        ops_for(self.kind())
    }

    pub fn to_dense(&self) -> Array2<f64> {
        match self {
            Tensor::Dense(dense) => dense.clone(),
            Tensor::Sparse(sparse) => {
                let mut dense = Array2::zeros(sparse.shape());
                for (value, (row, col)) in sparse.iter() {
                    dense[(row, col)] += *value;
                }
                dense
            }
        }
    }

    /// Builds a tensor of the requested kind from `(row, col, value)` entries; duplicates add up.
    pub fn from_triplets(
        kind: TensorKind,
        shape: (usize, usize),
        triplets: &[(usize, usize, f64)],
    ) -> Result<Tensor> {
        if let Some(&(row, col, _)) = triplets
            .iter()
            .find(|(row, col, _)| *row >= shape.0 || *col >= shape.1)
        {
            return Err(KernelError::shape(
                "tensor triplets",
                format!("indices below {shape:?}"),
                format!("({row}, {col})"),
            ));
        }
        match kind {
            TensorKind::Dense => {
                let mut dense = Array2::zeros(shape);
                for &(row, col, value) in triplets {
                    dense[(row, col)] += value;
                }
                Ok(Tensor::Dense(dense))
            }
            TensorKind::Sparse => {
                let mut tri = TriMat::new(shape);
                for &(row, col, value) in triplets {
                    tri.add_triplet(row, col, value);
                }
                Ok(Tensor::Sparse(tri.to_csr()))
            }
        }
    }

    /// Stored `(row, col, value)` entries; every entry for dense tensors, non-zeros for sparse.
    pub fn triplets(&self) -> Vec<(usize, usize, f64)> {
        match self {
            Tensor::Dense(dense) => dense
                .indexed_iter()
                .map(|((row, col), value)| (row, col, *value))
                .collect(),
            Tensor::Sparse(sparse) => sparse
                .iter()
                .map(|(value, (row, col))| (row, col, *value))
                .collect(),
        }
    }

    pub fn is_square(&self) -> bool {
        let (rows, cols) = self.shape();
        rows == cols
    }
}

/// Eigenvalues in ascending order and the matching unit eigenvectors as columns.
#[derive(Debug, Clone)]
pub struct Eigenpairs {
    pub eigenvalues: Array1<f64>,
    pub eigenvectors: Array2<f64>,
}

pub trait BackendOps: Send + Sync {
    fn kind(&self) -> TensorKind;

    /// Gathers `a` along `axis` at `index`; the result has the shape of `index`.
    fn take_along_axis(&self, a: &Tensor, index: &Array2<usize>, axis: Axis) -> Result<Tensor>;

    fn from_values(&self, values: Array2<f64>) -> Tensor;

    /// Diagonal matrix holding the column sums of `adjacency`.
    fn degree(&self, adjacency: &Tensor) -> Result<Tensor>;

    fn sub(&self, a: &Tensor, b: &Tensor) -> Result<Tensor>;

    fn matvec(&self, a: &Tensor, vector: &[f64]) -> Result<Vec<f64>>;

    /// The `k` smallest eigenpairs of a symmetric positive semi-definite matrix.
    fn eigenpairs(&self, matrix: &Tensor, k: usize) -> Result<Eigenpairs>;

    fn set_value(&self, a: &Tensor, index: (usize, usize), value: f64) -> Result<Tensor>;

    fn qr(&self, matrix: &Tensor) -> Result<(Tensor, Tensor)>;

    /// Frobenius norm.
    fn norm(&self, a: &Tensor) -> f64;

    fn dtype_double(&self) -> DType;

    fn dtype_integer(&self) -> DType;
}

static DENSE_OPS: DenseOps = DenseOps;
static SPARSE_OPS: SparseOps = SparseOps;

pub fn ops_for(kind: TensorKind) -> &'static dyn BackendOps {
    match kind {
        TensorKind::Dense => &DENSE_OPS,
        TensorKind::Sparse => &SPARSE_OPS,
    }
}

pub fn take_along_axis(a: &Tensor, index: &Array2<usize>, axis: Axis) -> Result<Tensor> {
    a.ops().take_along_axis(a, index, axis)
}

/// Converts dense `values` into the representation of `reference`.
pub fn from_values(reference: &Tensor, values: Array2<f64>) -> Tensor {
    reference.ops().from_values(values)
}

pub fn degree(adjacency: &Tensor) -> Result<Tensor> {
    adjacency.ops().degree(adjacency)
}

pub fn eigenpairs(matrix: &Tensor, k: usize) -> Result<Eigenpairs> {
    matrix.ops().eigenpairs(matrix, k)
}

pub fn qr(matrix: &Tensor) -> Result<(Tensor, Tensor)> {
    matrix.ops().qr(matrix)
}

pub fn norm(a: &Tensor) -> f64 {
    a.ops().norm(a)
}

pub(crate) fn check_same_shape(context: &str, a: &Tensor, b: &Tensor) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(KernelError::shape(
            context,
            format!("{:?}", a.shape()),
            format!("{:?}", b.shape()),
        ));
    }
    Ok(())
}

pub(crate) fn check_eigen_request(context: &str, matrix: &Tensor, k: usize) -> Result<usize> {
    let (rows, cols) = matrix.shape();
    if rows != cols {
        return Err(KernelError::shape(
            context,
            "square matrix",
            format!("{rows}x{cols}"),
        ));
    }
    if k == 0 || k > rows {
        return Err(KernelError::configuration(
            context,
            format!("requested {k} eigenpairs of a {rows}x{rows} matrix"),
        ));
    }
    Ok(rows)
}

pub(crate) fn check_take_index(
    context: &str,
    shape: (usize, usize),
    index: &Array2<usize>,
    axis: Axis,
) -> Result<()> {
    let (rows, cols) = shape;
    let (index_rows, index_cols) = index.dim();
    let (limit, aligned, expected) = match axis.index() {
        0 => (rows, index_cols == cols, cols),
        1 => (cols, index_rows == rows, rows),
        other => {
            return Err(KernelError::configuration(
                context,
                format!("axis {other} out of range for a matrix"),
            ));
        }
    };
    if !aligned {
        return Err(KernelError::shape(
            context,
            format!("index extent {expected} along the untouched axis"),
            format!("{index_rows}x{index_cols}"),
        ));
    }
    if let Some(bad) = index.iter().find(|&&i| i >= limit) {
        return Err(KernelError::shape(
            context,
            format!("indices below {limit}"),
            bad,
        ));
    }
    Ok(())
}
