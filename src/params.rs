use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Matérn smoothness. `Infinite` is the squared-exponential limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSmoothness", into = "RawSmoothness")]
pub enum Smoothness {
    Finite(f64),
    Infinite,
}

impl Smoothness {
    pub fn is_infinite(&self) -> bool {
        matches!(self, Smoothness::Infinite)
    }

    pub fn finite(&self) -> Option<f64> {
        match self {
            Smoothness::Finite(nu) => Some(*nu),
            Smoothness::Infinite => None,
        }
    }
}

impl fmt::Display for Smoothness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Smoothness::Finite(nu) => write!(f, "{nu}"),
            Smoothness::Infinite => write!(f, "inf"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawSmoothness {
    Number(f64),
    Symbol(String),
}

impl TryFrom<RawSmoothness> for Smoothness {
    type Error = String;

    fn try_from(raw: RawSmoothness) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawSmoothness::Number(nu) if nu.is_infinite() && nu > 0.0 => Ok(Smoothness::Infinite),
            RawSmoothness::Number(nu) => Ok(Smoothness::Finite(nu)),
            RawSmoothness::Symbol(symbol) => match symbol.to_ascii_lowercase().as_str() {
                "inf" | "infinity" | "infinite" => Ok(Smoothness::Infinite),
                other => other
                    .parse::<f64>()
                    .map(Smoothness::Finite)
                    .map_err(|_| format!("unrecognised smoothness '{symbol}'")),
            },
        }
    }
}

impl From<Smoothness> for RawSmoothness {
    fn from(value: Smoothness) -> Self {
        match value {
            Smoothness::Finite(nu) => RawSmoothness::Number(nu),
            Smoothness::Infinite => RawSmoothness::Symbol("inf".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Lengthscale {
    Isotropic(f64),
    PerDimension(Vec<f64>),
}

impl Lengthscale {
    pub fn values(&self) -> Vec<f64> {
        match self {
            Lengthscale::Isotropic(value) => vec![*value],
            Lengthscale::PerDimension(values) => values.clone(),
        }
    }

    /// Lengthscale for coordinate `index` of a `count`-dimensional frequency.
    pub fn component(&self, index: usize, count: usize, context: &str) -> Result<f64> {
        match self {
            Lengthscale::Isotropic(value) => Ok(*value),
            Lengthscale::PerDimension(values) if values.len() == 1 => Ok(values[0]),
            Lengthscale::PerDimension(values) if values.len() == count => Ok(values[index]),
            Lengthscale::PerDimension(values) => Err(KernelError::shape(
                context,
                format!("lengthscale of length 1 or {count}"),
                format!("length {}", values.len()),
            )),
        }
    }
}

/// Hyperparameters of a Matérn kernel. Immutable for the duration of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelParams {
    pub nu: Smoothness,
    pub lengthscale: Lengthscale,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            nu: Smoothness::Finite(0.5),
            lengthscale: Lengthscale::Isotropic(1.0),
        }
    }
}

impl KernelParams {
    pub fn new(nu: Smoothness, lengthscale: f64) -> Self {
        Self {
            nu,
            lengthscale: Lengthscale::Isotropic(lengthscale),
        }
    }

    pub fn matern(nu: f64, lengthscale: f64) -> Self {
        Self::new(Smoothness::Finite(nu), lengthscale)
    }

    pub fn squared_exponential(lengthscale: f64) -> Self {
        Self::new(Smoothness::Infinite, lengthscale)
    }

    pub fn validate(&self, context: &str) -> Result<()> {
        if let Smoothness::Finite(nu) = self.nu {
            if !(nu.is_finite() && nu > 0.0) {
                return Err(KernelError::configuration(
                    context,
                    format!("smoothness nu must be positive, got {nu}"),
                ));
            }
        }
        let values = self.lengthscale.values();
        if values.is_empty() {
            return Err(KernelError::configuration(
                context,
                "lengthscale must contain at least one value",
            ));
        }
        if let Some(bad) = values.iter().find(|l| !(l.is_finite() && **l > 0.0)) {
            return Err(KernelError::configuration(
                context,
                format!("lengthscale must be positive and finite, got {bad}"),
            ));
        }
        Ok(())
    }

    /// Validated scalar lengthscale for engines whose spectral density is isotropic.
    pub fn isotropic_lengthscale(&self, context: &str) -> Result<f64> {
        self.validate(context)?;
        match &self.lengthscale {
            Lengthscale::Isotropic(value) => Ok(*value),
            Lengthscale::PerDimension(values) if values.len() == 1 => Ok(values[0]),
            Lengthscale::PerDimension(values) => Err(KernelError::configuration(
                context,
                format!(
                    "isotropic spectral density needs a single lengthscale, got {} values",
                    values.len()
                ),
            )),
        }
    }
}
