//! Rows and shared row ownership.
//!
//! A [`Row`] is a read-only view of column values tagged with its [`RowType`].
//! Rows cross cursor boundaries as [`SharedRow`] handles: every holder owns one
//! handle, and the row's storage (plus any row it wraps) is freed when the last
//! handle is released.
//!
//! - [`ValuesRow`]: materialized row holding its values directly
//! - [`ProjectedRow`]: lazily computes columns from expressions over another row
//! - [`RowHolder`]: single-slot owner used by cursors for lookahead

mod projected;
mod row_type;
mod shared;
mod values_row;

use std::fmt;

use crate::error::Result;
use crate::types::Value;

pub use projected::{ProjectedRow, TAP_PROJECT_EVALUATE};
pub use row_type::RowType;
pub use shared::{RowHolder, SharedRow};
pub use values_row::ValuesRow;

/// Read view over one row's columns.
pub trait Row: fmt::Debug + Send + Sync {
    fn row_type(&self) -> &RowType;

    /// Returns column `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.column_count()`.
    ///
    /// # Errors
    ///
    /// Rows computing their values on demand report evaluation failures as
    /// [`QueryError::Value`](crate::QueryError::Value) scoped to the column.
    fn value(&self, index: usize) -> Result<&Value>;

    fn column_count(&self) -> usize {
        self.row_type().column_count()
    }

    /// Copies every column out of the row.
    fn to_values(&self) -> Result<Vec<Value>> {
        (0..self.column_count())
            .map(|i| self.value(i).cloned())
            .collect()
    }
}

/// Formats a row as `(v0, v1, ...)`, showing `?` for columns that fail to evaluate.
pub(crate) fn fmt_row(row: &dyn Row, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "(")?;
    for i in 0..row.column_count() {
        if i > 0 {
            write!(f, ", ")?;
        }
        match row.value(i) {
            Ok(value) => write!(f, "{}", value)?,
            Err(_) => write!(f, "?")?,
        }
    }
    write!(f, ")")
}
