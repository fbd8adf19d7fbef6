//! Shared row handles.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use super::Row;

/// One holder's claim on a row.
///
/// [`acquire`](SharedRow::acquire) creates another claim and
/// [`release`](SharedRow::release) gives one up; the row is dropped exactly once,
/// when the last claim goes away. Releasing consumes the handle, so a released
/// handle cannot be read and releases can never outnumber acquires.
#[derive(Clone)]
pub struct SharedRow(Arc<dyn Row>);

impl SharedRow {
    pub fn new(row: impl Row + 'static) -> Self {
        SharedRow(Arc::new(row))
    }

    pub fn acquire(&self) -> SharedRow {
        SharedRow(Arc::clone(&self.0))
    }

    pub fn release(self) {
        drop(self);
    }

    /// Number of live handles to this row.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    pub fn is_shared(&self) -> bool {
        self.holders() > 1
    }

    /// Whether both handles refer to the same row.
    pub fn same_row(a: &SharedRow, b: &SharedRow) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&a.0), Arc::as_ptr(&b.0))
    }

    pub fn as_row(&self) -> &dyn Row {
        self.0.as_ref()
    }
}

impl Deref for SharedRow {
    type Target = dyn Row;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl fmt::Debug for SharedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0.as_ref(), f)
    }
}

/// Owns at most one row on behalf of a cursor.
#[derive(Debug, Default)]
pub struct RowHolder {
    row: Option<SharedRow>,
}

impl RowHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds `row`, releasing whatever was held before.
    pub fn hold(&mut self, row: SharedRow) {
        self.row = Some(row);
    }

    pub fn take(&mut self) -> Option<SharedRow> {
        self.row.take()
    }

    pub fn get(&self) -> Option<&SharedRow> {
        self.row.as_ref()
    }

    pub fn is_holding(&self) -> bool {
        self.row.is_some()
    }

    pub fn release(&mut self) {
        self.row = None;
    }
}
