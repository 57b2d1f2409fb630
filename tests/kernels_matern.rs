use std::sync::Arc;

use anyhow::Result;
use approx::assert_abs_diff_eq;
use nalgebra::SymmetricEigen;
use ndarray::{Array2, array};

use geokernels::backend::array_to_dmatrix;
use geokernels::spaces::Eigenfunctions;
use geokernels::spaces::circle::SinCosEigenfunctions;
use geokernels::{
    Circle, DiscreteSpectrumSpace, FactoryOptions, GeometricKernel, Graph, Hyperbolic,
    KernelParams, MaternGeometricKernel, Mesh, RandomState, SpaceHandle,
    SymmetricPositiveDefiniteMatrices, Tensor, TensorKind,
};

fn path_graph(n: usize, kind: TensorKind) -> Result<Graph> {
    let triplets: Vec<_> = (0..n - 1)
        .flat_map(|i| [(i, i + 1, 1.0), (i + 1, i, 1.0)])
        .collect();
    Ok(Graph::new(Tensor::from_triplets(kind, (n, n), &triplets)?)?)
}

fn grid_mesh() -> Result<Mesh> {
    let mut vertices = Array2::zeros((9, 3));
    for i in 0..3 {
        for j in 0..3 {
            vertices[(3 * i + j, 0)] = j as f64;
            vertices[(3 * i + j, 1)] = i as f64;
        }
    }
    let mut faces = Vec::new();
    for i in 0..2 {
        for j in 0..2 {
            let v = 3 * i + j;
            faces.push([v, v + 1, v + 4]);
            faces.push([v, v + 4, v + 3]);
        }
    }
    Ok(Mesh::new(vertices, faces)?)
}

fn vertex_points(n: usize, repeats: usize) -> Array2<f64> {
    Array2::from_shape_fn((n * repeats, 1), |(i, _)| (i % n) as f64)
}

fn min_eigenvalue(k: &Array2<f64>) -> f64 {
    SymmetricEigen::new(array_to_dmatrix(k))
        .eigenvalues
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min)
}

fn check_covariance(
    kernel: &Arc<dyn GeometricKernel>,
    params: &KernelParams,
    x: &Array2<f64>,
) -> Result<()> {
    let (_, state) = kernel.init_params_and_state()?;
    let k = kernel.k(params, &state, x, None)?;
    let k_diag = kernel.k_diag(params, &state, x)?;
    assert_eq!(k.dim(), (x.nrows(), x.nrows()));
    for i in 0..x.nrows() {
        for j in 0..x.nrows() {
            assert_abs_diff_eq!(k[(i, j)], k[(j, i)], epsilon = 1e-9);
        }
        let scale = k_diag[i].abs().max(1e-12);
        assert!(
            (k[(i, i)] - k_diag[i]).abs() / scale < 1e-5,
            "{}: diag {} vs k_diag {}",
            kernel.space_name(),
            k[(i, i)],
            k_diag[i]
        );
    }
    let smallest = min_eigenvalue(&k);
    assert!(smallest >= -1e-6, "{}: eigenvalue {smallest}", kernel.space_name());
    Ok(())
}

fn factory_kernel(space: &SpaceHandle, options: FactoryOptions) -> Result<Arc<dyn GeometricKernel>> {
    Ok(MaternGeometricKernel::build(space, options)?.kernel().clone())
}

#[test]
fn covariances_are_symmetric_psd_with_matching_diagonal() -> Result<()> {
    let parameter_grid = [
        KernelParams::matern(0.5, 0.7),
        KernelParams::matern(2.5, 1.3),
        KernelParams::squared_exponential(0.9),
    ];

    let circle = SpaceHandle::discrete(Circle);
    let circle_kernel = factory_kernel(&circle, FactoryOptions {
        num: Some(21),
        ..FactoryOptions::default()
    })?;
    let (_, circle_points) = Circle.random(RandomState::new(11), 12)?;

    let graph = SpaceHandle::discrete(path_graph(9, TensorKind::Sparse)?);
    let graph_kernel = factory_kernel(&graph, FactoryOptions::default())?;

    let mesh = SpaceHandle::discrete(grid_mesh()?);
    let mesh_kernel = factory_kernel(&mesh, FactoryOptions::default())?;

    let key = Some(RandomState::new(5));
    let hyperbolic_space = Hyperbolic::new(2)?;
    let hyperbolic_points =
        hyperbolic_space.lift(&array![[0.0, 0.0], [0.3, -0.4], [1.2, 0.5], [-0.8, 0.1]])?;
    let hyperbolic = SpaceHandle::noncompact(hyperbolic_space);
    let hyperbolic_kernel = factory_kernel(&hyperbolic, FactoryOptions {
        num: Some(256),
        key,
        ..FactoryOptions::default()
    })?;

    let spd_space = SymmetricPositiveDefiniteMatrices::new(2)?;
    let (_, spd_points) = spd_space.random_points(RandomState::new(8), 4)?;
    let spd = SpaceHandle::noncompact(spd_space);
    let spd_kernel = factory_kernel(&spd, FactoryOptions {
        num: Some(128),
        key,
        ..FactoryOptions::default()
    })?;

    for params in &parameter_grid {
        check_covariance(&circle_kernel, params, &circle_points)?;
        check_covariance(&graph_kernel, params, &vertex_points(9, 1))?;
        check_covariance(&mesh_kernel, params, &vertex_points(9, 1))?;
        check_covariance(&hyperbolic_kernel, params, &hyperbolic_points)?;
        check_covariance(&spd_kernel, params, &spd_points)?;
    }
    Ok(())
}

#[test]
fn normalized_kernels_have_unit_mean_variance() -> Result<()> {
    let params = KernelParams::matern(1.5, 0.6);

    let circle = SpaceHandle::discrete(Circle);
    let kernel = factory_kernel(&circle, FactoryOptions::default())?;
    let (_, state) = kernel.init_params_and_state()?;
    let (_, x) = Circle.random(RandomState::new(3), 1000)?;
    let mean = kernel.k_diag(&params, &state, &x)?.mean().unwrap_or(0.0);
    assert_abs_diff_eq!(mean, 1.0, epsilon = 1e-2);

    let spaces = [
        (SpaceHandle::discrete(path_graph(10, TensorKind::Dense)?), 10),
        (SpaceHandle::discrete(grid_mesh()?), 9),
    ];
    for (space, n) in &spaces {
        let kernel = factory_kernel(space, FactoryOptions::default())?;
        let (_, state) = kernel.init_params_and_state()?;
        let x = vertex_points(*n, 1000usize.div_ceil(*n));
        let mean = kernel.k_diag(&params, &state, &x)?.mean().unwrap_or(0.0);
        assert_abs_diff_eq!(mean, 1.0, epsilon = 1e-2);
    }
    Ok(())
}

#[test]
fn unnormalized_graph_kernel_keeps_raw_weights() -> Result<()> {
    let space = SpaceHandle::discrete(path_graph(6, TensorKind::Dense)?);
    let kernel = factory_kernel(&space, FactoryOptions {
        normalize: false,
        ..FactoryOptions::default()
    })?;
    let (_, state) = kernel.init_params_and_state()?;
    let params = KernelParams::matern(0.5, 1.0);
    let mean = kernel
        .k_diag(&params, &state, &vertex_points(6, 1))?
        .mean()
        .unwrap_or(0.0);
    assert!((mean - 1.0).abs() > 1e-3);
    Ok(())
}

#[test]
fn circle_basis_evaluation() -> Result<()> {
    let basis = SinCosEigenfunctions::new(5)?;
    let x = array![[1.0, 0.0], [0.0, 1.0]];
    let values = basis.evaluate(&x)?;
    assert_eq!(values.dim(), (2, 5));
    for i in 0..2 {
        assert_abs_diff_eq!(values[(i, 0)], 1.0, epsilon = 1e-12);
    }
    assert_eq!(basis.num_eigenfunctions_per_level(), vec![1, 2, 2]);

    let (_, points) = Circle.random(RandomState::new(9), 6)?;
    let full = basis.addition_theorem(&points, &points)?;
    let diag = basis.addition_theorem_diag(&points)?;
    for i in 0..6 {
        for level in 0..basis.num_levels() {
            assert_abs_diff_eq!(full[(i, i, level)], diag[(i, level)], epsilon = 1e-6);
        }
    }
    Ok(())
}

#[test]
fn graph_eigenfunctions_satisfy_addition_theorem_diag() -> Result<()> {
    let graph = path_graph(7, TensorKind::Sparse)?;
    let eigenfunctions = graph.get_eigenfunctions(4)?;
    let x = vertex_points(7, 1);
    let full = eigenfunctions.addition_theorem(&x, &x)?;
    let diag = eigenfunctions.addition_theorem_diag(&x)?;
    for i in 0..7 {
        for level in 0..eigenfunctions.num_levels() {
            assert_abs_diff_eq!(full[(i, i, level)], diag[(i, level)], epsilon = 1e-6);
        }
    }
    Ok(())
}

#[test]
fn normalization_holds_for_very_smooth_short_kernels() -> Result<()> {
    let params = KernelParams::matern(100.0, 0.1);

    let circle = SpaceHandle::discrete(Circle);
    let kernel = factory_kernel(&circle, FactoryOptions::default())?;
    let (_, state) = kernel.init_params_and_state()?;
    let (_, x) = Circle.random(RandomState::new(17), 4)?;
    let k_diag = kernel.k_diag(&params, &state, &x)?;
    let k = kernel.k(&params, &state, &x, None)?;
    for i in 0..4 {
        assert_abs_diff_eq!(k_diag[i], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(k[(i, i)], 1.0, epsilon = 1e-9);
    }
    assert!(k.iter().all(|v| v.is_finite()));

    let graph = SpaceHandle::discrete(path_graph(10, TensorKind::Dense)?);
    let kernel = factory_kernel(&graph, FactoryOptions::default())?;
    let (_, state) = kernel.init_params_and_state()?;
    let mean = kernel
        .k_diag(&params, &state, &vertex_points(10, 1))?
        .mean()
        .unwrap_or(0.0);
    assert_abs_diff_eq!(mean, 1.0, epsilon = 1e-9);
    Ok(())
}
