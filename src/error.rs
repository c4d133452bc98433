//! Error types for tensor contraction and compilation.

/// Errors that can occur during kernel execution and expression compilation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TensorOpsError {
    /// A tuple-permutation precondition failed, or an index occurs more
    /// than twice across a contraction.
    #[error("invalid indices: {message}")]
    InvalidIndices { message: String },

    /// Shapes do not align on a contraction, trace, or assignment boundary.
    #[error("dimension mismatch: {message}")]
    DimensionMismatch { message: String },

    /// A conjugation flag outside {plain, conjugate, adjoint}.
    #[error("unknown conjugation flag '{flag}'")]
    UnknownFlag { flag: String },

    /// The compiler saw a syntactic shape it cannot classify.
    #[error("invalid expression: {message}")]
    InvalidExpression { message: String },
}

impl TensorOpsError {
    pub fn indices(message: impl Into<String>) -> Self {
        Self::InvalidIndices {
            message: message.into(),
        }
    }

    pub fn dimensions(message: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            message: message.into(),
        }
    }

    pub fn flag(flag: impl Into<String>) -> Self {
        Self::UnknownFlag { flag: flag.into() }
    }

    pub fn expression(message: impl Into<String>) -> Self {
        Self::InvalidExpression {
            message: message.into(),
        }
    }
}

/// Result type for tensor operations.
pub type TensorOpsResult<T> = core::result::Result<T, TensorOpsError>;
