use std::f64::consts::{PI, SQRT_2};
use std::sync::Arc;

use ndarray::{Array1, Array2, Array3};
use rand::Rng;

use super::eigenfunctions::Eigenfunctions;
use super::{DiscreteSpectrumSpace, Space, SpaceKind};
use crate::error::{KernelError, Result};
use crate::random::RandomState;

/// The unit circle embedded in the plane; points are `[cos θ, sin θ]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Circle;

impl Circle {
    pub fn new() -> Self {
        Circle
    }
}

impl Space for Circle {
    fn name(&self) -> &str {
        "Circle"
    }

    fn kind(&self) -> SpaceKind {
        SpaceKind::Circle
    }

    fn dimension(&self) -> usize {
        1
    }

    fn point_width(&self) -> usize {
        2
    }
}

impl DiscreteSpectrumSpace for Circle {
    fn get_eigenvalues(&self, num: usize) -> Result<Array1<f64>> {
        Ok(Array1::from_iter((0..num).map(|j| {
            let level = ((j + 1) / 2) as f64;
            level * level
        })))
    }

    fn get_eigenfunctions(&self, num: usize) -> Result<Arc<dyn Eigenfunctions>> {
        Ok(Arc::new(SinCosEigenfunctions::new(num)?))
    }

    fn random(&self, key: RandomState, count: usize) -> Result<(RandomState, Array2<f64>)> {
        let (next, mut rng) = key.split();
        let mut points = Array2::zeros((count, 2));
        for mut row in points.rows_mut() {
            let theta = rng.gen_range(0.0..2.0 * PI);
            row[0] = theta.cos();
            row[1] = theta.sin();
        }
        Ok((next, points))
    }
}

/// Fourier basis `1, √2 cos(lθ), √2 sin(lθ), ...`; level `l > 0` holds the cosine/sine pair.
#[derive(Debug, Clone)]
pub struct SinCosEigenfunctions {
    num_eigenfunctions: usize,
    num_levels: usize,
}

impl SinCosEigenfunctions {
    pub fn new(num_eigenfunctions: usize) -> Result<Self> {
        if num_eigenfunctions % 2 == 0 {
            return Err(KernelError::configuration(
                "Circle eigenfunctions",
                format!(
                    "the sine/cosine basis needs an odd number of eigenfunctions, got {num_eigenfunctions}"
                ),
            ));
        }
        Ok(Self {
            num_eigenfunctions,
            num_levels: num_eigenfunctions.div_ceil(2),
        })
    }

    fn angles(&self, context: &str, x: &Array2<f64>) -> Result<Array1<f64>> {
        Circle.check_points(context, x)?;
        Ok(x.rows().into_iter().map(|row| row[1].atan2(row[0])).collect())
    }

    fn multiplicity(level: usize) -> f64 {
        if level == 0 { 1.0 } else { 2.0 }
    }
}

impl Eigenfunctions for SinCosEigenfunctions {
    fn num_eigenfunctions(&self) -> usize {
        self.num_eigenfunctions
    }

    fn num_levels(&self) -> usize {
        self.num_levels
    }

    fn num_eigenfunctions_per_level(&self) -> Vec<usize> {
        (0..self.num_levels)
            .map(|level| if level == 0 { 1 } else { 2 })
            .collect()
    }

    fn evaluate(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let theta = self.angles("Circle eigenfunctions", x)?;
        Ok(Array2::from_shape_fn(
            (x.nrows(), self.num_eigenfunctions),
            |(i, j)| {
                let level = ((j + 1) / 2) as f64;
                match j {
                    0 => 1.0,
                    _ if j % 2 == 1 => SQRT_2 * (level * theta[i]).cos(),
                    _ => SQRT_2 * (level * theta[i]).sin(),
                }
            },
        ))
    }

    fn addition_theorem(&self, x: &Array2<f64>, x2: &Array2<f64>) -> Result<Array3<f64>> {
        let theta = self.angles("Circle addition theorem", x)?;
        let theta2 = self.angles("Circle addition theorem", x2)?;
        Ok(Array3::from_shape_fn(
            (theta.len(), theta2.len(), self.num_levels),
            |(i, j, level)| {
                Self::multiplicity(level) * (level as f64 * (theta[i] - theta2[j])).cos()
            },
        ))
    }

    fn addition_theorem_diag(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Circle.check_points("Circle addition theorem", x)?;
        Ok(Array2::from_shape_fn((x.nrows(), self.num_levels), |(_, level)| {
            Self::multiplicity(level)
        }))
    }
}
