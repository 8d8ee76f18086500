//! Module containing the [`SparseNetError`] type shared by every stage of the pipeline.

/// Errors raised while building, partitioning, compiling or solving a [`crate::SparseNet`].
///
/// None of these are retried internally: every variant aborts the current build or solve call.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SparseNetError {
    /// An index, subset position or index range points outside of its valid domain.
    #[error("{what} index {index} is out of range (valid range is 0..{len})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    /// An API was called while a stateful operation was running, or out of protocol order.
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// The compiler met an input it cannot resolve; the partitioning upstream is broken.
    #[error("Inconsistent graph state: {0}")]
    InconsistentGraphState(String),
    /// A memory budget cannot hold even a single neuron.
    #[error("Memory budget of {budget} bytes cannot hold a single neuron requiring {required} bytes")]
    ResourceExhausted { required: usize, budget: usize },
    /// The input vector given to a solver does not match the input size of the solution.
    #[error("Expected {expected} input values, received {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    /// Required configuration fields were not provided to a builder.
    #[error("Missing required configuration: {}", .0.join(", "))]
    MissingConfiguration(Vec<&'static str>),
}

pub type Result<T> = std::result::Result<T, SparseNetError>;

impl SparseNetError {
    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        SparseNetError::IndexOutOfRange { what, index, len }
    }
}

/// Returns `Ok(())` if `index < len`, an [`SparseNetError::IndexOutOfRange`] otherwise.
pub(crate) fn check_index(what: &'static str, index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(SparseNetError::out_of_range(what, index, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_configuration_lists_every_field() {
        let err = SparseNetError::MissingConfiguration(vec!["input_size", "weight_table"]);
        assert_eq!(
            err.to_string(),
            "Missing required configuration: input_size, weight_table"
        );
    }

    #[test]
    fn test_check_index() {
        assert!(check_index("neuron", 2, 3).is_ok());
        assert_eq!(
            check_index("neuron", 3, 3),
            Err(SparseNetError::IndexOutOfRange {
                what: "neuron",
                index: 3,
                len: 3
            })
        );
    }
}
