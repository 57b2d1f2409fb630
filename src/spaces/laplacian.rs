use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use log::debug;
use ndarray::{Array1, Array2, Array3, Axis};

use super::eigenfunctions::Eigenfunctions;
use super::vertex_indices;
use crate::backend::{self, Eigenpairs, Tensor, numeric};
use crate::error::{KernelError, Result};

/// Builds graph Laplacians in the representation of the adjacency they come from.
pub struct LaplacianBuilder;

impl LaplacianBuilder {
    /// Combinatorial Laplacian `L = D - A`.
    pub fn combinatorial(adjacency: &Tensor) -> Result<Tensor> {
        let ops = adjacency.ops();
        let degree = ops.degree(adjacency)?;
        ops.sub(&degree, adjacency)
    }

    /// Symmetric normalized Laplacian `D^{-1/2} L D^{-1/2}`; isolated vertices keep a zero row.
    pub fn normalized(adjacency: &Tensor) -> Result<Tensor> {
        let laplacian = Self::combinatorial(adjacency)?;
        let (n, _) = laplacian.shape();
        let mut degrees = vec![0.0f64; n];
        for (_, col, weight) in adjacency.triplets() {
            degrees[col] += weight;
        }
        let scaled: Vec<(usize, usize, f64)> = laplacian
            .triplets()
            .into_iter()
            .filter(|&(row, col, _)| degrees[row] > 0.0 && degrees[col] > 0.0)
            .map(|(row, col, value)| (row, col, value / (degrees[row] * degrees[col]).sqrt()))
            .collect();
        Tensor::from_triplets(laplacian.kind(), (n, n), &scaled)
    }
}

/// Memoized eigendecomposition of a fixed symmetric Laplacian.
#[derive(Debug)]
pub(crate) struct LaplacianEigensystem {
    name: String,
    laplacian: Tensor,
    cache: Mutex<IndexMap<usize, Arc<Eigenpairs>>>,
}

impl LaplacianEigensystem {
    pub(crate) fn new(name: impl Into<String>, laplacian: Tensor) -> Self {
        Self {
            name: name.into(),
            laplacian,
            cache: Mutex::new(IndexMap::new()),
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.laplacian.shape().0
    }

    pub(crate) fn laplacian(&self) -> &Tensor {
        &self.laplacian
    }

    /// The `num` smallest eigenpairs; eigenvalues are clamped at zero and the first one is
    /// pinned to exactly zero.
    pub(crate) fn eigenpairs(&self, num: usize) -> Result<Arc<Eigenpairs>> {
        let context = format!("{} eigenpairs (num = {num})", self.name);
        let mut cache = self
            .cache
            .lock()
            .map_err(|_| KernelError::decomposition(&context, "eigen cache lock poisoned"))?;
        if let Some(pairs) = cache.get(&num) {
            return Ok(Arc::clone(pairs));
        }

        let n = self.size();
        if num == 0 || num > n {
            return Err(KernelError::configuration(
                context,
                format!("requested {num} eigenpairs of a {n}-vertex operator"),
            ));
        }
        debug!(
            "{}: solving for {} eigenpairs with the {:?} backend",
            self.name,
            num,
            self.laplacian.kind()
        );
        let raw = backend::eigenpairs(&self.laplacian, num)?;
        let clamped = raw.eigenvalues.mapv(|value| value.max(0.0));
        let eigenvalues = numeric::set_value(&clamped, 0, 0.0)?;
        let pairs = Arc::new(Eigenpairs {
            eigenvalues,
            eigenvectors: raw.eigenvectors,
        });
        cache.insert(num, Arc::clone(&pairs));
        Ok(pairs)
    }

    pub(crate) fn eigenvalues(&self, num: usize) -> Result<Array1<f64>> {
        Ok(self.eigenpairs(num)?.eigenvalues.clone())
    }

    pub(crate) fn eigenfunctions(&self, num: usize) -> Result<LaplacianEigenfunctions> {
        let pairs = self.eigenpairs(num)?;
        let eigenvectors =
            backend::from_values(&self.laplacian, pairs.eigenvectors.clone());
        Ok(LaplacianEigenfunctions {
            name: self.name.clone(),
            num_vertices: self.size(),
            eigenvectors,
        })
    }
}

/// Laplacian eigenvectors read off at vertices; every eigenvector forms its own level.
#[derive(Debug, Clone)]
pub struct LaplacianEigenfunctions {
    name: String,
    num_vertices: usize,
    eigenvectors: Tensor,
}

impl LaplacianEigenfunctions {
    fn gather(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let context = format!("{} eigenfunctions", self.name);
        let vertices = vertex_indices(&context, x, self.num_vertices)?;
        let width = self.num_eigenfunctions();
        let index = Array2::from_shape_fn((vertices.len(), width), |(i, _)| vertices[i]);
        Ok(backend::take_along_axis(&self.eigenvectors, &index, Axis(0))?.to_dense())
    }
}

impl Eigenfunctions for LaplacianEigenfunctions {
    fn num_eigenfunctions(&self) -> usize {
        self.eigenvectors.shape().1
    }

    fn num_levels(&self) -> usize {
        self.num_eigenfunctions()
    }

    fn num_eigenfunctions_per_level(&self) -> Vec<usize> {
        vec![1; self.num_eigenfunctions()]
    }

    fn evaluate(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.gather(x)
    }

    fn addition_theorem(&self, x: &Array2<f64>, x2: &Array2<f64>) -> Result<Array3<f64>> {
        let left = self.gather(x)?;
        let right = self.gather(x2)?;
        Ok(Array3::from_shape_fn(
            (left.nrows(), right.nrows(), left.ncols()),
            |(i, j, level)| left[(i, level)] * right[(j, level)],
        ))
    }

    fn addition_theorem_diag(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(self.gather(x)?.mapv(|value| value * value))
    }

    fn weighted_outerproduct(
        &self,
        weights: &Array1<f64>,
        x: &Array2<f64>,
        x2: Option<&Array2<f64>>,
    ) -> Result<Array2<f64>> {
        super::eigenfunctions::check_level_weights(self.num_levels(), weights)?;
        let left = self.gather(x)?;
        let right = match x2 {
            Some(x2) => self.gather(x2)?,
            None => left.clone(),
        };
        let scaled = &left * &weights.view().insert_axis(Axis(0));
        Ok(scaled.dot(&right.t()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TensorKind;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn triangle(kind: TensorKind) -> Tensor {
        let triplets = [
            (0, 1, 1.0),
            (1, 0, 1.0),
            (1, 2, 1.0),
            (2, 1, 1.0),
            (0, 2, 1.0),
            (2, 0, 1.0),
        ];
        Tensor::from_triplets(kind, (3, 3), &triplets).expect("adjacency")
    }

    #[test]
    fn combinatorial_laplacian_has_zero_row_sums() {
        for kind in [TensorKind::Dense, TensorKind::Sparse] {
            let laplacian = LaplacianBuilder::combinatorial(&triangle(kind)).expect("laplacian");
            assert_eq!(laplacian.kind(), kind);
            let dense = laplacian.to_dense();
            assert_eq!(dense[(0, 0)], 2.0);
            assert_eq!(dense[(0, 1)], -1.0);
            for row in dense.rows() {
                assert_abs_diff_eq!(row.sum(), 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn normalized_laplacian_has_unit_diagonal() {
        let laplacian = LaplacianBuilder::normalized(&triangle(TensorKind::Sparse)).expect("l");
        let dense = laplacian.to_dense();
        for i in 0..3 {
            assert_abs_diff_eq!(dense[(i, i)], 1.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(dense[(0, 1)], -0.5, epsilon = 1e-12);
    }

    #[test]
    fn eigensystem_pins_first_eigenvalue_and_caches() {
        let laplacian = LaplacianBuilder::combinatorial(&triangle(TensorKind::Dense)).unwrap();
        let system = LaplacianEigensystem::new("Graph", laplacian);
        let first = system.eigenpairs(3).expect("eigenpairs");
        assert_eq!(first.eigenvalues[0], 0.0);
        assert_abs_diff_eq!(first.eigenvalues[2], 3.0, epsilon = 1e-10);
        let second = system.eigenpairs(3).expect("cached");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(system.eigenpairs(4).unwrap_err().is_configuration());
    }

    #[test]
    fn eigenfunction_products_match_weighted_sum() {
        let laplacian = LaplacianBuilder::combinatorial(&triangle(TensorKind::Dense)).unwrap();
        let system = LaplacianEigensystem::new("Graph", laplacian);
        let functions = system.eigenfunctions(3).expect("eigenfunctions");
        let x = array![[0.0], [2.0]];
        let weights = array![1.0, 0.5, 0.25];
        let fast = functions.weighted_outerproduct(&weights, &x, None).unwrap();
        let per_level = functions.addition_theorem(&x, &x).unwrap();
        let slow = super::super::eigenfunctions::contract_levels(&per_level, &weights);
        for (a, b) in fast.iter().zip(slow.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
        assert!(functions.evaluate(&array![[3.0]]).unwrap_err().is_shape());
    }
}
