//! Materialized rows.

use std::fmt;

use crate::error::Result;
use crate::types::Value;

use super::{fmt_row, Row, RowType};

/// Row that stores its column values directly.
pub struct ValuesRow {
    row_type: RowType,
    values: Vec<Value>,
}

impl ValuesRow {
    pub fn new(row_type: RowType, values: Vec<Value>) -> Self {
        debug_assert_eq!(
            row_type.column_count(),
            values.len(),
            "value count must match row type {}",
            row_type
        );
        Self { row_type, values }
    }

    /// Materializes every column of `row` into a new row of the same type.
    pub fn copy_of(row: &dyn Row) -> Result<Self> {
        Ok(Self::new(row.row_type().clone(), row.to_values()?))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl Row for ValuesRow {
    fn row_type(&self) -> &RowType {
        &self.row_type
    }

    fn value(&self, index: usize) -> Result<&Value> {
        Ok(&self.values[index])
    }
}

impl fmt::Debug for ValuesRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_row(self, f)
    }
}
