//! Matérn Gaussian-process kernels on non-Euclidean spaces: compact manifolds, graphs, meshes
//! and noncompact symmetric spaces.

pub mod backend;
pub mod config;
pub mod error;
pub mod features;
pub mod kernels;
pub mod params;
pub mod random;
pub mod sampling;
pub mod spaces;

pub use backend::{Tensor, TensorKind};
pub use config::{KernelChoice, RunConfig, SpaceConfig};
pub use error::{KernelError, Result};
pub use features::{FeatureContext, FeatureMap};
pub use kernels::{
    FactoryOptions, FactoryOutput, GeometricKernel, KernelState, MaternFeatureMapKernel,
    MaternGeometricKernel, MaternIntegratedKernel, MaternKarhunenLoeveKernel,
};
pub use params::{KernelParams, Lengthscale, Smoothness};
pub use random::RandomState;
pub use spaces::{
    Circle, DiscreteSpectrumSpace, Graph, HeatKernelSpace, Hyperbolic, Mesh,
    NoncompactSymmetricSpace, Space, SpaceHandle, SpaceKind, SymmetricPositiveDefiniteMatrices,
};
