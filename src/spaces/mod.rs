//! Capability contracts every input domain implements.
//!
//! A space exposes exactly the spectral data its kernel needs: discrete-spectrum spaces publish
//! Laplace–Beltrami eigenpairs grouped into levels, noncompact symmetric spaces publish
//! spherical-function ingredients. [`SpaceHandle`] tags a concrete space with its class so the
//! factory can branch exhaustively.

pub mod circle;
pub mod eigenfunctions;
pub mod graph;
pub mod hyperbolic;
pub mod laplacian;
pub mod mesh;
pub mod spd;

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2, Array3, Axis};
use num_complex::Complex64;

use crate::error::{KernelError, Result};
use crate::random::RandomState;

pub use circle::Circle;
pub use eigenfunctions::Eigenfunctions;
pub use graph::Graph;
pub use hyperbolic::Hyperbolic;
pub use laplacian::{LaplacianBuilder, LaplacianEigenfunctions};
pub use mesh::Mesh;
pub use spd::SymmetricPositiveDefiniteMatrices;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpaceKind {
    Generic,
    Circle,
    Graph,
    Mesh,
    Hyperbolic,
    Spd,
}

pub trait Space: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn kind(&self) -> SpaceKind {
        SpaceKind::Generic
    }

    /// Intrinsic dimension, the `d` of the Matérn spectral density.
    fn dimension(&self) -> usize;

    /// Number of coordinates per point.
    fn point_width(&self) -> usize;

    fn check_points(&self, context: &str, x: &Array2<f64>) -> Result<()> {
        check_width(context, x, self.point_width())
    }
}

pub trait DiscreteSpectrumSpace: Space {
    /// The first `num` Laplace–Beltrami eigenvalues, one per eigenfunction, ascending.
    fn get_eigenvalues(&self, num: usize) -> Result<Array1<f64>>;

    fn get_eigenfunctions(&self, num: usize) -> Result<Arc<dyn Eigenfunctions>>;

    /// `count` points drawn uniformly from the space.
    fn random(&self, key: RandomState, count: usize) -> Result<(RandomState, Array2<f64>)>;

    /// Every point of a finite space, `None` for continuous ones.
    fn reference_points(&self) -> Option<Array2<f64>> {
        None
    }

    fn num_vertices(&self) -> Option<usize> {
        None
    }
}

pub trait NoncompactSymmetricSpace: Space {
    fn rank(&self) -> usize;

    /// `count` phases, one per row.
    fn random_phases(&self, key: RandomState, count: usize)
    -> Result<(RandomState, Array2<f64>)>;

    /// Spherical power function for frequencies `lambda [O, rank]`, points `x [N, width]` and
    /// phases `[O, Dp]`; complex `[N, O]`.
    fn power_function(
        &self,
        lambda: &Array2<f64>,
        x: &Array2<f64>,
        phases: &Array2<f64>,
    ) -> Result<Array2<Complex64>>;

    /// `|c(λ)|^{-1}` per frequency row.
    fn inv_harish_chandra(&self, lambda: &Array2<f64>) -> Result<Array1<f64>>;

    /// Part of `|c(λ)|^{-2}` bounded by one, used as the acceptance probability when
    /// rejection-sampling frequencies.
    fn plancherel_acceptance(&self, lambda: &Array2<f64>) -> Array1<f64> {
        Array1::ones(lambda.nrows())
    }
}

pub trait HeatKernelSpace: Space {
    /// Geodesic distances `[N, M]`.
    fn distance(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<Array2<f64>>;

    /// Heat kernel `p_t(ρ)` for every distance and time, `[N, M, T]`.
    fn heat_kernel(&self, distance: &Array2<f64>, t: &Array1<f64>) -> Result<Array3<f64>>;
}

/// A space tagged with the class that decides how kernels are built on it.
#[derive(Debug, Clone)]
pub enum SpaceHandle {
    DiscreteSpectrum(Arc<dyn DiscreteSpectrumSpace>),
    NoncompactSymmetric(Arc<dyn NoncompactSymmetricSpace>),
    Unsupported(Arc<dyn Space>),
}

impl SpaceHandle {
    pub fn discrete<S: DiscreteSpectrumSpace + 'static>(space: S) -> Self {
        SpaceHandle::DiscreteSpectrum(Arc::new(space))
    }

    pub fn noncompact<S: NoncompactSymmetricSpace + 'static>(space: S) -> Self {
        SpaceHandle::NoncompactSymmetric(Arc::new(space))
    }

    pub fn name(&self) -> &str {
        match self {
            SpaceHandle::DiscreteSpectrum(space) => space.name(),
            SpaceHandle::NoncompactSymmetric(space) => space.name(),
            SpaceHandle::Unsupported(space) => space.name(),
        }
    }

    pub fn kind(&self) -> SpaceKind {
        match self {
            SpaceHandle::DiscreteSpectrum(space) => space.kind(),
            SpaceHandle::NoncompactSymmetric(space) => space.kind(),
            SpaceHandle::Unsupported(space) => space.kind(),
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            SpaceHandle::DiscreteSpectrum(space) => space.dimension(),
            SpaceHandle::NoncompactSymmetric(space) => space.dimension(),
            SpaceHandle::Unsupported(space) => space.dimension(),
        }
    }
}

pub(crate) fn check_width(context: &str, x: &Array2<f64>, width: usize) -> Result<()> {
    if x.ncols() != width {
        return Err(KernelError::shape(
            context,
            format!("[N, {width}] points"),
            format!("[{}, {}]", x.nrows(), x.ncols()),
        ));
    }
    Ok(())
}

/// Reads column 0 of `x` as vertex indices below `count`.
pub(crate) fn vertex_indices(context: &str, x: &Array2<f64>, count: usize) -> Result<Vec<usize>> {
    check_width(context, x, 1)?;
    x.column(0)
        .iter()
        .map(|&value| {
            if value.fract() != 0.0 || value < 0.0 || value >= count as f64 {
                Err(KernelError::shape(
                    context,
                    format!("integer vertex index in [0, {count})"),
                    value,
                ))
            } else {
                Ok(value as usize)
            }
        })
        .collect()
}

/// Row-wise (Minkowski) inner product `-x0 y0 + Σ xi yi` of hyperboloid points.
pub(crate) fn minkowski_inner(x: &Array2<f64>, y: &Array2<f64>) -> Array2<f64> {
    let mut inner = x.dot(&y.t());
    let time = x
        .column(0)
        .insert_axis(Axis(1))
        .dot(&y.column(0).insert_axis(Axis(0)));
    inner -= &(&time * 2.0);
    inner
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn vertex_indices_reject_fractional_and_out_of_range() {
        let good = array![[0.0], [3.0]];
        assert_eq!(vertex_indices("test", &good, 4).unwrap(), vec![0, 3]);
        assert!(vertex_indices("test", &array![[1.5]], 4).unwrap_err().is_shape());
        assert!(vertex_indices("test", &array![[4.0]], 4).unwrap_err().is_shape());
        assert!(vertex_indices("test", &array![[0.0, 1.0]], 4).unwrap_err().is_shape());
    }

    #[test]
    fn minkowski_inner_of_origin() {
        let origin = array![[1.0, 0.0, 0.0]];
        let inner = minkowski_inner(&origin, &origin);
        assert_eq!(inner[(0, 0)], -1.0);
    }
}
