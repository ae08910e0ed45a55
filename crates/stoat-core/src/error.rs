use crate::shape::Shape;

/// All errors that can occur within Stoat.
///
/// This enum captures every failure mode the library can produce itself:
/// dtype mismatches, element-count mismatches, incompatible matmul shapes,
/// and backend-specific errors wrapped as messages. Using a single error
/// type across the workspace simplifies error propagation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// DType mismatch between the operands of an operation.
    #[error("dtype mismatch: expected {expected:?}, got {got:?}")]
    DTypeMismatch {
        expected: crate::DType,
        got: crate::DType,
    },

    /// Element count mismatch (e.g., creating a tensor from a slice, or a
    /// scalar operand that is not a single element).
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Matrix multiplication contraction-dimension mismatch.
    #[error("matmul shape mismatch: [{m}x{k1}] @ [{k2}x{n}] — inner dims must match")]
    MatmulShapeMismatch {
        m: usize,
        k1: usize,
        k2: usize,
        n: usize,
    },

    /// Generic message for cases not covered above (driver/BLAS failures).
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout Stoat.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
