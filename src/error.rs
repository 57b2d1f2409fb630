use thiserror::Error;

/// Errors surfaced by kernel construction and evaluation. None of them is retried internally.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error("configuration error in {context}: {message}")]
    Configuration { context: String, message: String },

    #[error("shape error in {context}: expected {expected}, found {found}")]
    Shape {
        context: String,
        expected: String,
        found: String,
    },

    #[error("decomposition failure in {context}: {message}")]
    DecompositionFailure { context: String, message: String },
}

impl KernelError {
    pub fn configuration(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn shape(
        context: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
    ) -> Self {
        Self::Shape {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub fn decomposition(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DecompositionFailure {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape { .. })
    }

    pub fn is_decomposition_failure(&self) -> bool {
        matches!(self, Self::DecompositionFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, KernelError>;
