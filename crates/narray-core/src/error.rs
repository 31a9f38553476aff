use crate::shape::Shape;

/// All errors raised by the array engine.
///
/// Every failure is detected synchronously at the call that notices it
/// (construction time for views, call time for kernels) and surfaced to the
/// caller; nothing is deferred to iteration or retried internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operand shapes incompatible for a non-broadcast operation
    /// (reshape to a different size, mismatched cat dims off-axis, ...).
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Shapes cannot be jointly broadcast under the right-aligned rule.
    #[error("shapes cannot be broadcast together: {shapes:?}")]
    BroadcastInvalid { shapes: Vec<Shape> },

    /// Axis index exceeds the rank of a shape.
    #[error("axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: usize, rank: usize },

    /// Narrow range exceeds a dimension's extent.
    #[error("narrow out of bounds: axis {axis}, start {start}, len {len}, dim {dim}")]
    NarrowOutOfBounds {
        axis: usize,
        start: usize,
        len: usize,
        dim: usize,
    },

    /// A multi-dimensional index exceeds a dimension's extent.
    #[error("index {index} out of bounds for axis {axis} with dim {dim}")]
    IndexOutOfBounds {
        axis: usize,
        index: usize,
        dim: usize,
    },

    /// Stride array length does not match a shape's rank.
    #[error("stride count {got} does not match rank {expected_rank}")]
    StrideLengthMismatch { expected_rank: usize, got: usize },

    /// Element count of supplied data does not match the shape.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// DType mismatch between operands of a binary operation.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch {
        expected: crate::DType,
        got: crate::DType,
    },

    /// Numeric-domain violation (e.g. variance with count <= ddof).
    #[error("numeric domain: {0}")]
    NumericDomain(String),

    /// A scalar was requested from a non-scalar array.
    #[error("not a scalar: shape {shape}")]
    NotAScalar { shape: Shape },

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Early return with a formatted error message.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
