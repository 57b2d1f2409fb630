use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use super::{GeometricKernel, MaternFeatureMapKernel, MaternKarhunenLoeveKernel};
use crate::error::{KernelError, Result};
use crate::features::{
    DeterministicFeatureMapCompact, FeatureMap, RandomPhaseFeatureMapNoncompact,
    RejectionSamplingFeatureMapNoncompact,
};
use crate::random::RandomState;
use crate::spaces::{NoncompactSymmetricSpace, SpaceHandle, SpaceKind};

pub const DEFAULT_NUM_EIGENFUNCTIONS: usize = 1000;
pub const DEFAULT_NUM_LEVELS: usize = 35;
pub const DEFAULT_NUM_RANDOM_PHASES: usize = 3000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryOptions {
    /// Eigenfunctions kept on discrete-spectrum spaces, random phases on noncompact ones.
    pub num: Option<usize>,
    pub normalize: bool,
    pub return_feature_map: bool,
    /// Required on noncompact spaces.
    pub key: Option<RandomState>,
}

impl Default for FactoryOptions {
    fn default() -> Self {
        Self {
            num: None,
            normalize: true,
            return_feature_map: false,
            key: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FactoryOutput {
    Kernel(Arc<dyn GeometricKernel>),
    WithFeatureMap {
        kernel: Arc<dyn GeometricKernel>,
        feature_map: Arc<dyn FeatureMap>,
    },
}

impl FactoryOutput {
    pub fn kernel(&self) -> &Arc<dyn GeometricKernel> {
        match self {
            FactoryOutput::Kernel(kernel) => kernel,
            FactoryOutput::WithFeatureMap { kernel, .. } => kernel,
        }
    }

    pub fn feature_map(&self) -> Option<&Arc<dyn FeatureMap>> {
        match self {
            FactoryOutput::Kernel(_) => None,
            FactoryOutput::WithFeatureMap { feature_map, .. } => Some(feature_map),
        }
    }
}

/// Picks the Matérn kernel, feature map and approximation order that fit a space's class.
pub struct MaternGeometricKernel;

impl MaternGeometricKernel {
    pub fn build(space: &SpaceHandle, options: FactoryOptions) -> Result<FactoryOutput> {
        let context = format!("MaternGeometricKernel on {}", space.name());
        let (kernel, feature_map): (Arc<dyn GeometricKernel>, Arc<dyn FeatureMap>) = match space {
            SpaceHandle::Unsupported(_) => {
                return Err(KernelError::configuration(
                    context,
                    "space is neither a discrete-spectrum nor a noncompact symmetric space",
                ));
            }
            SpaceHandle::DiscreteSpectrum(discrete) => {
                let num = match options.num {
                    Some(num) => num,
                    None => Self::default_num(space)?,
                };
                debug!("{context}: truncated series with {num} eigenfunctions");
                let kernel =
                    MaternKarhunenLoeveKernel::new(Arc::clone(discrete), num, options.normalize)?;
                let feature_map = DeterministicFeatureMapCompact::new(kernel.clone());
                (Arc::new(kernel), Arc::new(feature_map))
            }
            SpaceHandle::NoncompactSymmetric(noncompact) => {
                let key = options.key.ok_or_else(|| {
                    KernelError::configuration(
                        &context,
                        "noncompact symmetric spaces need a random key in the factory options",
                    )
                })?;
                let num = options.num.unwrap_or(DEFAULT_NUM_RANDOM_PHASES);
                let feature_map =
                    Self::default_feature_map(Arc::clone(noncompact), num, options.normalize)?;
                debug!(
                    "{context}: {} with {num} random phases",
                    feature_map.name()
                );
                let kernel =
                    MaternFeatureMapKernel::new(space.name(), Arc::clone(&feature_map), key);
                (Arc::new(kernel), feature_map)
            }
        };

        Ok(if options.return_feature_map {
            FactoryOutput::WithFeatureMap {
                kernel,
                feature_map,
            }
        } else {
            FactoryOutput::Kernel(kernel)
        })
    }

    /// Default approximation order for a space.
    pub fn default_num(space: &SpaceHandle) -> Result<usize> {
        match space {
            SpaceHandle::DiscreteSpectrum(discrete) => Ok(match discrete.kind() {
                SpaceKind::Graph | SpaceKind::Mesh => discrete
                    .num_vertices()
                    .map_or(DEFAULT_NUM_EIGENFUNCTIONS, |n| n.min(DEFAULT_NUM_EIGENFUNCTIONS)),
                _ => DEFAULT_NUM_LEVELS,
            }),
            SpaceHandle::NoncompactSymmetric(_) => Ok(DEFAULT_NUM_RANDOM_PHASES),
            SpaceHandle::Unsupported(unsupported) => Err(KernelError::configuration(
                format!("MaternGeometricKernel on {}", unsupported.name()),
                "no default order for an unsupported space",
            )),
        }
    }

    /// Rejection sampling where the space knows its Plancherel acceptance factor, plain base
    /// density sampling otherwise.
    fn default_feature_map(
        space: Arc<dyn NoncompactSymmetricSpace>,
        num: usize,
        normalize: bool,
    ) -> Result<Arc<dyn FeatureMap>> {
        Ok(match space.kind() {
            SpaceKind::Hyperbolic | SpaceKind::Spd => Arc::new(
                RejectionSamplingFeatureMapNoncompact::new(space, num, normalize)?,
            ),
            _ => Arc::new(RandomPhaseFeatureMapNoncompact::new(space, num, normalize)?),
        })
    }
}
