//! Error types for query execution.
//!
//! [`QueryError`] is the single error type crossing cursor boundaries. Value-level
//! failures are described by [`CastError`] (conversion between type classes) and
//! [`ValueError`] (arithmetic and aggregation failures), both of which surface through
//! [`QueryError`].

use thiserror::Error;

use crate::cursor::CursorState;
use crate::types::TypeClass;

/// Result alias used throughout the crate.
pub type Result<T, E = QueryError> = std::result::Result<T, E>;

/// Errors that can occur while building or running an operator tree.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Cursor protocol misuse (e.g. `next()` on a closed cursor). Always a caller bug.
    #[error("cannot {operation} a cursor in state {state}")]
    Lifecycle {
        operation: &'static str,
        state: CursorState,
    },

    /// Structurally invalid operator, registry or configuration.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    /// A conversion failed while the context treats cast errors as fatal.
    #[error(transparent)]
    Cast(#[from] CastError),

    /// Bad data while evaluating a value, optionally scoped to an output column.
    #[error("{}", describe_value_error(.column, .source))]
    Value {
        column: Option<usize>,
        source: ValueError,
    },

    /// The owning query context was cancelled.
    #[error("query cancelled")]
    Cancelled,

    /// Failure reported by the store adapter.
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl QueryError {
    pub fn configuration(message: impl Into<String>) -> Self {
        QueryError::Configuration {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        QueryError::Storage {
            message: message.into(),
        }
    }

    pub fn lifecycle(operation: &'static str, state: CursorState) -> Self {
        QueryError::Lifecycle { operation, state }
    }

    /// Scopes a value-level failure to the given output column.
    ///
    /// Cast failures become [`ValueError::Cast`]; errors that are not about a
    /// particular value (cancellation, lifecycle, storage) are returned unchanged.
    pub fn at_column(self, index: usize) -> Self {
        match self {
            QueryError::Value { source, .. } => QueryError::Value {
                column: Some(index),
                source,
            },
            QueryError::Cast(e) => QueryError::Value {
                column: Some(index),
                source: ValueError::Cast(e),
            },
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryError::Cancelled)
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, QueryError::Lifecycle { .. })
    }
}

impl From<ValueError> for QueryError {
    fn from(source: ValueError) -> Self {
        QueryError::Value {
            column: None,
            source,
        }
    }
}

fn describe_value_error(column: &Option<usize>, source: &ValueError) -> String {
    match column {
        Some(index) => format!("column {}: {}", index, source),
        None => source.to_string(),
    }
}

/// A value could not be converted from one type class to another.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CastError {
    /// The value does not fit the target type.
    #[error("value {value} out of range for type {target}")]
    OutOfRange { value: String, target: TypeClass },

    /// Text that does not parse as the target type.
    #[error("invalid input syntax for type {target}: \"{text}\"")]
    Malformed { text: String, target: TypeClass },

    /// No cast is registered between the two classes.
    #[error("cannot cast {from} to {to}")]
    Unsupported { from: TypeClass, to: TypeClass },
}

/// Bad data or a type mismatch found while computing a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("{type_name} out of range")]
    Overflow { type_name: &'static str },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Placeholder referenced by an expression has no value in the active bindings.
    #[error("no value bound for parameter ${index}")]
    UnboundParameter { index: usize },

    #[error(transparent)]
    Cast(#[from] CastError),
}

impl ValueError {
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        ValueError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_display() {
        let err = QueryError::lifecycle("open", CursorState::Running);
        assert_eq!(err.to_string(), "cannot open a cursor in state RUNNING");
        assert!(err.is_lifecycle());
    }

    #[test]
    fn test_value_error_scoped_to_column() {
        let err = QueryError::from(ValueError::DivisionByZero).at_column(2);
        assert_eq!(err.to_string(), "column 2: division by zero");
    }

    #[test]
    fn test_cast_error_scoped_to_column() {
        let cast = CastError::Malformed {
            text: "abc".to_string(),
            target: TypeClass::Integer,
        };
        let err = QueryError::Cast(cast.clone()).at_column(0);
        match err {
            QueryError::Value {
                column: Some(0),
                source: ValueError::Cast(inner),
            } => assert_eq!(inner, cast),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_cancelled_not_rescoped() {
        let err = QueryError::Cancelled.at_column(3);
        assert!(err.is_cancelled());
    }
}
