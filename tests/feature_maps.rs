use std::sync::Arc;

use anyhow::{Context, Result};
use approx::assert_abs_diff_eq;
use ndarray::{Array2, array};

use geokernels::features::RandomPhaseFeatureMapCompact;
use geokernels::{
    Circle, DiscreteSpectrumSpace, FactoryOptions, FeatureMap, GeometricKernel, Graph, Hyperbolic,
    KernelParams, MaternGeometricKernel, MaternKarhunenLoeveKernel, RandomState, SpaceHandle,
    Tensor, TensorKind,
};

fn relative_error(approx: &Array2<f64>, exact: &Array2<f64>) -> f64 {
    let error = (approx - exact).mapv(|v| v * v).sum().sqrt();
    error / exact.mapv(|v| v * v).sum().sqrt()
}

#[test]
fn deterministic_map_reproduces_graph_kernel() -> Result<()> {
    let triplets = [
        (0, 1, 1.0),
        (1, 0, 1.0),
        (1, 2, 0.5),
        (2, 1, 0.5),
        (2, 3, 2.0),
        (3, 2, 2.0),
        (3, 0, 1.0),
        (0, 3, 1.0),
        (1, 4, 1.0),
        (4, 1, 1.0),
    ];
    let adjacency = Tensor::from_triplets(TensorKind::Dense, (5, 5), &triplets)?;
    let space = SpaceHandle::discrete(Graph::new(adjacency)?);
    let output = MaternGeometricKernel::build(&space, FactoryOptions {
        return_feature_map: true,
        ..FactoryOptions::default()
    })?;
    let map = output.feature_map().context("feature map requested")?;
    assert!(!map.requires_key());

    let kernel = output.kernel();
    let (_, state) = kernel.init_params_and_state()?;
    let params = KernelParams::matern(1.5, 0.8);
    let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [2.0]];
    let (features, context) = map.feature_map(&x, &params, &state, None)?;
    assert!(context.key.is_none());
    let approx = features.dot(&features.t());
    let exact = kernel.k(&params, &state, &x, None)?;
    for (a, b) in approx.iter().zip(exact.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn random_phase_map_approximates_circle_kernel() -> Result<()> {
    let kernel = MaternKarhunenLoeveKernel::new(Arc::new(Circle), 9, true)?;
    let (_, state) = kernel.init_params_and_state()?;
    let params = KernelParams::matern(1.5, 0.9);
    let (_, x) = Circle.random(RandomState::new(21), 6)?;
    let map = RandomPhaseFeatureMapCompact::new(kernel.clone(), 3000)?;
    let (features, _) = map.feature_map(&x, &params, &state, Some(RandomState::new(22)))?;
    let exact = kernel.k(&params, &state, &x, None)?;
    let error = relative_error(&features.dot(&features.t()), &exact);
    assert!(error < 0.1, "relative error {error}");
    Ok(())
}

#[test]
fn keys_control_noncompact_features() -> Result<()> {
    let space = Hyperbolic::new(3)?;
    let x = space.lift(&array![[0.0, 0.0, 0.0], [0.2, 0.5, -0.3], [1.0, 0.0, 1.0]])?;
    let handle = SpaceHandle::noncompact(space);
    let output = MaternGeometricKernel::build(&handle, FactoryOptions {
        num: Some(64),
        return_feature_map: true,
        key: Some(RandomState::new(100)),
        ..FactoryOptions::default()
    })?;
    let map = output.feature_map().context("feature map requested")?;
    let (params, state) = output.kernel().init_params_and_state()?;

    let key = RandomState::new(7);
    let (first, context) = map.feature_map(&x, &params, &state, Some(key))?;
    let (again, _) = map.feature_map(&x, &params, &state, Some(key))?;
    let (other, _) = map.feature_map(&x, &params, &state, Some(RandomState::new(8)))?;
    assert_eq!(first, again);
    assert_ne!(first, other);
    let next = context.key.context("successor key")?;
    assert_ne!(next, key);

    let missing = map.feature_map(&x, &params, &state, None).unwrap_err();
    assert!(missing.is_configuration());
    Ok(())
}

#[test]
fn factory_kernel_pins_its_key() -> Result<()> {
    let space = Hyperbolic::new(2)?;
    let x = space.lift(&array![[0.0, 0.0], [0.7, 0.1]])?;
    let handle = SpaceHandle::noncompact(space);
    let options = FactoryOptions {
        num: Some(32),
        key: Some(RandomState::new(1)),
        ..FactoryOptions::default()
    };
    let kernel = MaternGeometricKernel::build(&handle, options.clone())?.kernel().clone();
    let twin = MaternGeometricKernel::build(&handle, options)?.kernel().clone();
    let (params, state) = kernel.init_params_and_state()?;
    let (_, twin_state) = twin.init_params_and_state()?;
    assert_eq!(
        kernel.k(&params, &state, &x, None)?,
        twin.k(&params, &twin_state, &x, None)?
    );
    Ok(())
}
