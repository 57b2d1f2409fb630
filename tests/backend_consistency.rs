use anyhow::Result;
use approx::assert_abs_diff_eq;
use ndarray::{Array1, Array2};

use geokernels::backend::{self, set_value};
use geokernels::{
    FactoryOptions, GeometricKernel, Graph, KernelParams, MaternGeometricKernel, SpaceHandle,
    Tensor, TensorKind,
};

fn path_triplets(n: usize) -> Vec<(usize, usize, f64)> {
    (0..n - 1)
        .flat_map(|i| {
            let weight = 1.0 + 0.1 * i as f64;
            [(i, i + 1, weight), (i + 1, i, weight)]
        })
        .collect()
}

fn graph_kernel_matrix(kind: TensorKind, n: usize, num: usize) -> Result<Array2<f64>> {
    let adjacency = Tensor::from_triplets(kind, (n, n), &path_triplets(n))?;
    let space = SpaceHandle::discrete(Graph::new(adjacency)?);
    let output = MaternGeometricKernel::build(&space, FactoryOptions {
        num: Some(num),
        ..FactoryOptions::default()
    })?;
    let kernel = output.kernel();
    let (_, state) = kernel.init_params_and_state()?;
    let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
    Ok(kernel.k(&KernelParams::matern(1.5, 2.0), &state, &x, None)?)
}

#[test]
fn dense_and_sparse_graphs_agree() -> Result<()> {
    for (n, num) in [(12, 12), (30, 10)] {
        let dense = graph_kernel_matrix(TensorKind::Dense, n, num)?;
        let sparse = graph_kernel_matrix(TensorKind::Sparse, n, num)?;
        for (a, b) in dense.iter().zip(sparse.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-5);
        }
    }
    Ok(())
}

#[test]
fn eigen_count_limits_per_backend() -> Result<()> {
    let n = 8;
    let laplacian = |kind| -> Result<Tensor> {
        let adjacency = Tensor::from_triplets(kind, (n, n), &path_triplets(n))?;
        Ok(Graph::new(adjacency)?.laplacian().clone())
    };
    let dense = laplacian(TensorKind::Dense)?;
    let sparse = laplacian(TensorKind::Sparse)?;

    assert_eq!(backend::eigenpairs(&dense, n - 1)?.eigenvalues.len(), n - 1);
    assert!(backend::eigenpairs(&sparse, n - 1).unwrap_err().is_decomposition_failure());
    assert!(backend::eigenpairs(&sparse, n + 1).unwrap_err().is_configuration());

    let full_dense = backend::eigenpairs(&dense, n)?;
    let full_sparse = backend::eigenpairs(&sparse, n)?;
    for (a, b) in full_dense.eigenvalues.iter().zip(full_sparse.eigenvalues.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-9);
    }
    Ok(())
}

#[test]
fn set_value_copies() -> Result<()> {
    let original = Array1::from(vec![1.0, 2.0, 3.0]);
    let updated = set_value(&original, 1, 9.0)?;
    assert_eq!(original.to_vec(), vec![1.0, 2.0, 3.0]);
    assert_eq!(updated.to_vec(), vec![1.0, 9.0, 3.0]);
    assert!(set_value(&original, 3, 0.0).unwrap_err().is_shape());
    Ok(())
}
