use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use petgraph::graph::UnGraph;
use serde::{Deserialize, Serialize};

use crate::backend::TensorKind;
use crate::error::KernelError;
use crate::kernels::{
    FactoryOptions, FactoryOutput, GeometricKernel, MaternGeometricKernel, MaternIntegratedKernel,
};
use crate::params::KernelParams;
use crate::random::RandomState;
use crate::sampling::gaussian_sample;
use crate::spaces::{
    Circle, Graph, Hyperbolic, Mesh, SpaceHandle, SymmetricPositiveDefiniteMatrices,
};

/// Description of the input domain of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpaceConfig {
    Circle,
    Graph {
        num_vertices: usize,
        /// `[source, target, weight]` per undirected edge.
        edges: Vec<(usize, usize, f64)>,
        #[serde(default)]
        sparse: bool,
        #[serde(default)]
        normalized: bool,
    },
    Mesh {
        vertices: Vec<[f64; 3]>,
        faces: Vec<[usize; 3]>,
    },
    Hyperbolic {
        dim: usize,
    },
    Spd {
        n: usize,
    },
}

impl SpaceConfig {
    pub fn build(&self) -> crate::error::Result<SpaceHandle> {
        Ok(match self {
            SpaceConfig::Circle => SpaceHandle::discrete(Circle),
            SpaceConfig::Graph {
                num_vertices,
                edges,
                sparse,
                normalized,
            } => {
                let mut graph = UnGraph::<(), f64>::with_capacity(*num_vertices, edges.len());
                let nodes: Vec<_> = (0..*num_vertices).map(|_| graph.add_node(())).collect();
                for &(source, target, weight) in edges {
                    let (Some(&a), Some(&b)) = (nodes.get(source), nodes.get(target)) else {
                        return Err(KernelError::shape(
                            "graph config edges",
                            format!("vertex indices below {num_vertices}"),
                            format!("({source}, {target})"),
                        ));
                    };
                    graph.add_edge(a, b, weight);
                }
                let kind = if *sparse {
                    TensorKind::Sparse
                } else {
                    TensorKind::Dense
                };
                let space = Graph::from_petgraph(&graph, kind, |weight| *weight)?;
                if *normalized {
                    SpaceHandle::discrete(Graph::with_normalized_laplacian(
                        space.adjacency().clone(),
                    )?)
                } else {
                    SpaceHandle::discrete(space)
                }
            }
            SpaceConfig::Mesh { vertices, faces } => {
                let flat: Vec<f64> = vertices.iter().flatten().copied().collect();
                let vertices = Array2::from_shape_vec((vertices.len(), 3), flat).map_err(|err| {
                    KernelError::shape("mesh config vertices", "[N, 3]", err.to_string())
                })?;
                SpaceHandle::discrete(Mesh::new(vertices, faces.clone())?)
            }
            SpaceConfig::Hyperbolic { dim } => SpaceHandle::noncompact(Hyperbolic::new(*dim)?),
            SpaceConfig::Spd { n } => {
                SpaceHandle::noncompact(SymmetricPositiveDefiniteMatrices::new(*n)?)
            }
        })
    }

    /// `count` points on the space: uniform draws on discrete-spectrum spaces, lifted Gaussian
    /// coordinates on hyperbolic space and matrix exponentials on SPD matrices.
    pub fn sample_points(
        &self,
        space: &SpaceHandle,
        key: RandomState,
        count: usize,
    ) -> crate::error::Result<(RandomState, Array2<f64>)> {
        match (self, space) {
            (SpaceConfig::Hyperbolic { dim }, _) => {
                let (next, coordinates) = gaussian_sample(key, &Array1::ones(*dim), count)?;
                Ok((next, Hyperbolic::new(*dim)?.lift(&coordinates)?))
            }
            (SpaceConfig::Spd { n }, _) => {
                SymmetricPositiveDefiniteMatrices::new(*n)?.random_points(key, count)
            }
            (_, SpaceHandle::DiscreteSpectrum(discrete)) => discrete.random(key, count),
            (_, other) => Err(KernelError::configuration(
                "sample_points",
                format!("no point sampler for {}", other.name()),
            )),
        }
    }
}

/// Kernel construction requested by a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelChoice {
    /// Whatever the factory picks for the space.
    #[default]
    Factory,
    /// Heat-kernel mixture; hyperbolic spaces only.
    Integrated { num_points: usize },
}

/// A JSON run description for the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub space: SpaceConfig,
    #[serde(default)]
    pub kernel: KernelChoice,
    /// Overrides the kernel's initial parameters when present.
    #[serde(default)]
    pub params: Option<KernelParams>,
    #[serde(default)]
    pub options: FactoryOptions,
    #[serde(default = "default_num_points")]
    pub num_points: usize,
    #[serde(default)]
    pub seed: u64,
}

fn default_num_points() -> usize {
    64
}

impl RunConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("parse run config")
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        serde_json::from_reader(reader).context("parse run config")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open run config {:?}", path))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("load run config from {:?}", path))
    }

    pub fn space_handle(&self) -> Result<SpaceHandle> {
        self.space
            .build()
            .with_context(|| format!("build {:?} space", self.space_label()))
    }

    /// Builds the requested kernel on `space`.
    pub fn kernel(&self, space: &SpaceHandle) -> Result<Arc<dyn GeometricKernel>> {
        match (&self.kernel, &self.space) {
            (KernelChoice::Factory, _) => {
                let output = MaternGeometricKernel::build(space, self.options.clone())
                    .with_context(|| format!("factory kernel on {}", space.name()))?;
                Ok(match output {
                    FactoryOutput::Kernel(kernel) => kernel,
                    FactoryOutput::WithFeatureMap { kernel, .. } => kernel,
                })
            }
            (KernelChoice::Integrated { num_points }, SpaceConfig::Hyperbolic { dim }) => {
                let space = Arc::new(Hyperbolic::new(*dim)?);
                Ok(Arc::new(MaternIntegratedKernel::new(space, *num_points)?))
            }
            (KernelChoice::Integrated { .. }, _) => anyhow::bail!(
                "the integrated kernel needs a hyperbolic space, got {}",
                self.space_label()
            ),
        }
    }

    fn space_label(&self) -> &'static str {
        match self.space {
            SpaceConfig::Circle => "circle",
            SpaceConfig::Graph { .. } => "graph",
            SpaceConfig::Mesh { .. } => "mesh",
            SpaceConfig::Hyperbolic { .. } => "hyperbolic",
            SpaceConfig::Spd { .. } => "spd",
        }
    }
}
