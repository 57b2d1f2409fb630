use std::sync::Arc;

use log::debug;
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;

use super::eigenfunctions::Eigenfunctions;
use super::laplacian::{LaplacianBuilder, LaplacianEigensystem};
use super::{DiscreteSpectrumSpace, Space, SpaceKind, check_width};
use crate::backend::{Tensor, TensorKind};
use crate::error::{KernelError, Result};
use crate::random::RandomState;

/// Triangle mesh in three dimensions with the cotangent-weight Laplacian. Points are vertex
/// indices stored in a single column.
#[derive(Debug)]
pub struct Mesh {
    vertices: Array2<f64>,
    faces: Vec<[usize; 3]>,
    system: LaplacianEigensystem,
}

impl Mesh {
    pub fn new(vertices: Array2<f64>, faces: Vec<[usize; 3]>) -> Result<Self> {
        Self::with_kind(vertices, faces, TensorKind::Sparse)
    }

    pub fn with_kind(
        vertices: Array2<f64>,
        faces: Vec<[usize; 3]>,
        kind: TensorKind,
    ) -> Result<Self> {
        check_width("Mesh vertices", &vertices, 3)?;
        let n = vertices.nrows();
        if n == 0 || faces.is_empty() {
            return Err(KernelError::configuration(
                "Mesh",
                "a mesh needs at least one vertex and one face",
            ));
        }
        if let Some(face) = faces.iter().find(|face| face.iter().any(|&v| v >= n)) {
            return Err(KernelError::shape(
                "Mesh faces",
                format!("vertex indices below {n}"),
                format!("{face:?}"),
            ));
        }

        let weights = cotangent_weights(&vertices, &faces)?;
        let laplacian = LaplacianBuilder::combinatorial(&Tensor::from_triplets(
            kind,
            (n, n),
            &weights,
        )?)?;
        debug!("Mesh: {} vertices, {} faces", n, faces.len());
        Ok(Self {
            vertices,
            faces,
            system: LaplacianEigensystem::new("Mesh", laplacian),
        })
    }

    pub fn vertices(&self) -> &Array2<f64> {
        &self.vertices
    }

    pub fn faces(&self) -> &[[usize; 3]] {
        &self.faces
    }

    pub fn laplacian(&self) -> &Tensor {
        self.system.laplacian()
    }
}

/// Symmetric cotangent weights: each triangle adds `cot(angle) / 2` to the edge facing the angle.
fn cotangent_weights(
    vertices: &Array2<f64>,
    faces: &[[usize; 3]],
) -> Result<Vec<(usize, usize, f64)>> {
    let mut weights = Vec::with_capacity(6 * faces.len());
    for face in faces {
        for corner in 0..3 {
            let apex = face[corner];
            let a = face[(corner + 1) % 3];
            let b = face[(corner + 2) % 3];
            let u = difference(vertices.row(a), vertices.row(apex));
            let v = difference(vertices.row(b), vertices.row(apex));
            let cross = [
                u[1] * v[2] - u[2] * v[1],
                u[2] * v[0] - u[0] * v[2],
                u[0] * v[1] - u[1] * v[0],
            ];
            let area = cross.iter().map(|c| c * c).sum::<f64>().sqrt();
            if area <= f64::EPSILON {
                return Err(KernelError::configuration(
                    "Mesh faces",
                    format!("degenerate triangle {face:?}"),
                ));
            }
            let cot = (u[0] * v[0] + u[1] * v[1] + u[2] * v[2]) / area;
            weights.push((a, b, 0.5 * cot));
            weights.push((b, a, 0.5 * cot));
        }
    }
    Ok(weights)
}

fn difference(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

impl Space for Mesh {
    fn name(&self) -> &str {
        "Mesh"
    }

    fn kind(&self) -> SpaceKind {
        SpaceKind::Mesh
    }

    fn dimension(&self) -> usize {
        2
    }

    fn point_width(&self) -> usize {
        1
    }
}

impl DiscreteSpectrumSpace for Mesh {
    fn get_eigenvalues(&self, num: usize) -> Result<Array1<f64>> {
        self.system.eigenvalues(num)
    }

    fn get_eigenfunctions(&self, num: usize) -> Result<Arc<dyn Eigenfunctions>> {
        Ok(Arc::new(self.system.eigenfunctions(num)?))
    }

    fn random(&self, key: RandomState, count: usize) -> Result<(RandomState, Array2<f64>)> {
        let (next, mut rng) = key.split();
        let n = self.system.size();
        let points = Array2::from_shape_fn((count, 1), |_| rng.gen_range(0..n) as f64);
        Ok((next, points))
    }

    fn reference_points(&self) -> Option<Array2<f64>> {
        let n = self.system.size();
        Some(Array2::from_shape_fn((n, 1), |(i, _)| i as f64))
    }

    fn num_vertices(&self) -> Option<usize> {
        Some(self.system.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn unit_square() -> (Array2<f64>, Vec<[usize; 3]>) {
        let vertices = array![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0]
        ];
        (vertices, vec![[0, 1, 2], [0, 2, 3]])
    }

    #[test]
    fn square_cotangent_spectrum() {
        let (vertices, faces) = unit_square();
        for kind in [TensorKind::Dense, TensorKind::Sparse] {
            let mesh = Mesh::with_kind(vertices.clone(), faces.clone(), kind).expect("mesh");
            assert_abs_diff_eq!(mesh.laplacian().to_dense()[(0, 2)], 0.0, epsilon = 1e-12);
            let eigenvalues = mesh.get_eigenvalues(4).expect("eigenvalues");
            let expected = [0.0, 1.0, 1.0, 2.0];
            for (value, target) in eigenvalues.iter().zip(expected) {
                assert_abs_diff_eq!(*value, target, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn rejects_bad_faces() {
        let (vertices, _) = unit_square();
        let err = Mesh::new(vertices.clone(), vec![[0, 1, 7]]).unwrap_err();
        assert!(err.is_shape());
        let err = Mesh::new(vertices, vec![[0, 0, 1]]).unwrap_err();
        assert!(err.is_configuration());
    }
}
