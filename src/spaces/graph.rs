use std::sync::Arc;

use log::debug;
use ndarray::{Array1, Array2};
use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;
use rand::Rng;

use super::eigenfunctions::Eigenfunctions;
use super::laplacian::{LaplacianBuilder, LaplacianEigensystem};
use super::{DiscreteSpectrumSpace, Space, SpaceKind};
use crate::backend::{Tensor, TensorKind};
use crate::error::{KernelError, Result};
use crate::random::RandomState;

/// Undirected weighted graph; points are vertex indices stored in a single column.
#[derive(Debug)]
pub struct Graph {
    adjacency: Tensor,
    system: LaplacianEigensystem,
    normalized: bool,
}

impl Graph {
    /// Graph with the combinatorial Laplacian `D - A`.
    pub fn new(adjacency: Tensor) -> Result<Self> {
        Self::build(adjacency, false)
    }

    /// Graph with the symmetric normalized Laplacian.
    pub fn with_normalized_laplacian(adjacency: Tensor) -> Result<Self> {
        Self::build(adjacency, true)
    }

    /// Adjacency from a petgraph graph, stored in the requested representation. Parallel edges
    /// add up.
    pub fn from_petgraph<N, E>(
        graph: &UnGraph<N, E>,
        kind: TensorKind,
        weight: impl Fn(&E) -> f64,
    ) -> Result<Self> {
        let n = graph.node_count();
        let mut triplets = Vec::with_capacity(2 * graph.edge_count());
        for edge in graph.edge_references() {
            let source = edge.source().index();
            let target = edge.target().index();
            let value = weight(edge.weight());
            triplets.push((source, target, value));
            if source != target {
                triplets.push((target, source, value));
            }
        }
        Self::new(Tensor::from_triplets(kind, (n, n), &triplets)?)
    }

    fn build(adjacency: Tensor, normalized: bool) -> Result<Self> {
        let (rows, cols) = adjacency.shape();
        if rows != cols || rows == 0 {
            return Err(KernelError::shape(
                "Graph adjacency",
                "non-empty square matrix",
                format!("{rows}x{cols}"),
            ));
        }
        let adjacency = Self::checked_adjacency(adjacency)?;
        let laplacian = if normalized {
            LaplacianBuilder::normalized(&adjacency)?
        } else {
            LaplacianBuilder::combinatorial(&adjacency)?
        };
        debug!(
            "Graph: {} vertices, {:?} adjacency, normalized Laplacian: {}",
            rows,
            adjacency.kind(),
            normalized
        );
        Ok(Self {
            system: LaplacianEigensystem::new("Graph", laplacian),
            adjacency,
            normalized,
        })
    }

    /// Rejects negative or asymmetric weights and drops self-loops.
    fn checked_adjacency(adjacency: Tensor) -> Result<Tensor> {
        let dense = adjacency.to_dense();
        let mut adjacency = adjacency;
        for (row, col, value) in adjacency.triplets() {
            if !value.is_finite() || value < 0.0 {
                return Err(KernelError::configuration(
                    "Graph adjacency",
                    format!("edge weights must be finite and non-negative, got {value} at ({row}, {col})"),
                ));
            }
            if (value - dense[(col, row)]).abs() > 1e-12 * value.abs().max(1.0) {
                return Err(KernelError::configuration(
                    "Graph adjacency",
                    format!("adjacency must be symmetric, ({row}, {col}) differs from ({col}, {row})"),
                ));
            }
        }
        for i in 0..dense.nrows() {
            if dense[(i, i)] != 0.0 {
                adjacency = adjacency.ops().set_value(&adjacency, (i, i), 0.0)?;
            }
        }
        Ok(adjacency)
    }

    pub fn adjacency(&self) -> &Tensor {
        &self.adjacency
    }

    pub fn laplacian(&self) -> &Tensor {
        self.system.laplacian()
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }
}

impl Space for Graph {
    fn name(&self) -> &str {
        "Graph"
    }

    fn kind(&self) -> SpaceKind {
        SpaceKind::Graph
    }

    fn dimension(&self) -> usize {
        0
    }

    fn point_width(&self) -> usize {
        1
    }
}

impl DiscreteSpectrumSpace for Graph {
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
