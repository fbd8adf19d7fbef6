//! Store adapter boundary and the in-memory store.
//!
//! The execution core never touches physical storage. Leaf scans of named
//! tables and every write go through a [`StoreAdapter`]; [`MemoryStore`] is the
//! adapter used when rows live in process memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::bindings::{QueryBindings, QueryBindingsCursor};
use crate::context::QueryContext;
use crate::cursor::Cursor;
use crate::error::{QueryError, Result};
use crate::operator::{check_scan_type, RowSource, ScanCursor};
use crate::row::{RowType, SharedRow, ValuesRow};

/// Storage operations the execution core depends on.
pub trait StoreAdapter: Send + Sync {
    /// Leaf cursor over `table`, producing rows of `row_type`.
    fn scan(
        &self,
        context: &Arc<QueryContext>,
        table: &str,
        row_type: &RowType,
        bindings: Box<dyn QueryBindingsCursor>,
    ) -> Result<Box<dyn Cursor>>;

    fn insert_row(&self, table: &str, row: &SharedRow) -> Result<()>;

    /// Replaces `old` (a row previously produced by a scan of `table`) with `new`.
    fn update_row(&self, table: &str, old: &SharedRow, new: &SharedRow) -> Result<()>;

    fn delete_row(&self, table: &str, row: &SharedRow) -> Result<()>;

    /// Locking hook run before a write modifies `row`.
    fn lock_row(&self, _table: &str, _row: &SharedRow) -> Result<()> {
        Ok(())
    }
}

struct Table {
    row_type: RowType,
    rows: Vec<SharedRow>,
}

type Tables = Arc<RwLock<HashMap<String, Table>>>;

/// Tables of shared rows kept in memory.
///
/// Scans see a snapshot of the table taken when the scan cursor opens. Written
/// rows are materialized with the table's row type, so a lazily computed row
/// handed to a write is evaluated once and stored by value.
#[derive(Default)]
pub struct MemoryStore {
    tables: Tables,
    locks: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(&self, name: &str, row_type: RowType) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(QueryError::storage(format!("table {} already exists", name)));
        }
        debug!(table = name, %row_type, "created table");
        tables.insert(
            name.to_string(),
            Table {
                row_type,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn row_type(&self, table: &str) -> Result<RowType> {
        let tables = self.tables.read();
        Ok(lookup(&tables, table)?.row_type.clone())
    }

    /// Handles to the current rows of `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Result<Vec<SharedRow>> {
        let tables = self.tables.read();
        Ok(lookup(&tables, table)?
            .rows
            .iter()
            .map(SharedRow::acquire)
            .collect())
    }

    /// Number of rows passed through the locking hook so far.
    pub fn locked_rows(&self) -> usize {
        self.locks.load(Ordering::Relaxed)
    }
}

fn lookup<'a>(tables: &'a HashMap<String, Table>, name: &str) -> Result<&'a Table> {
    tables
        .get(name)
        .ok_or_else(|| QueryError::storage(format!("no such table: {}", name)))
}

fn lookup_mut<'a>(tables: &'a mut HashMap<String, Table>, name: &str) -> Result<&'a mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| QueryError::storage(format!("no such table: {}", name)))
}

/// Copies `row` into a row of the table's type.
fn materialize(table: &Table, row: &SharedRow) -> Result<SharedRow> {
    if !row.row_type().same_shape(&table.row_type) {
        return Err(QueryError::storage(format!(
            "row type {} does not match table row type {}",
            row.row_type(),
            table.row_type
        )));
    }
    Ok(SharedRow::new(ValuesRow::new(
        table.row_type.clone(),
        row.to_values()?,
    )))
}

fn position(table: &Table, name: &str, row: &SharedRow) -> Result<usize> {
    table
        .rows
        .iter()
        .position(|stored| SharedRow::same_row(stored, row))
        .ok_or_else(|| QueryError::storage(format!("row {:?} is not stored in {}", row, name)))
}

impl StoreAdapter for MemoryStore {
    fn scan(
        &self,
        context: &Arc<QueryContext>,
        table: &str,
        row_type: &RowType,
        bindings: Box<dyn QueryBindingsCursor>,
    ) -> Result<Box<dyn Cursor>> {
        {
            let tables = self.tables.read();
            check_scan_type(table, &lookup(&tables, table)?.row_type, row_type)?;
        }
        let source = TableSource {
            tables: Arc::clone(&self.tables),
            table: table.to_string(),
        };
        Ok(Box::new(ScanCursor::new(
            Arc::clone(context),
            source,
            bindings,
        )))
    }

    fn insert_row(&self, table: &str, row: &SharedRow) -> Result<()> {
        let mut tables = self.tables.write();
        let target = lookup_mut(&mut tables, table)?;
        let stored = materialize(target, row)?;
        target.rows.push(stored);
        Ok(())
    }

    fn update_row(&self, table: &str, old: &SharedRow, new: &SharedRow) -> Result<()> {
        let mut tables = self.tables.write();
        let target = lookup_mut(&mut tables, table)?;
        let index = position(target, table, old)?;
        target.rows[index] = materialize(target, new)?;
        Ok(())
    }

    fn delete_row(&self, table: &str, row: &SharedRow) -> Result<()> {
        let mut tables = self.tables.write();
        let target = lookup_mut(&mut tables, table)?;
        let index = position(target, table, row)?;
        target.rows.remove(index);
        Ok(())
    }

    fn lock_row(&self, _table: &str, _row: &SharedRow) -> Result<()> {
        self.locks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct TableSource {
    tables: Tables,
    table: String,
}

impl RowSource for TableSource {
    fn load(&mut self, _bindings: &QueryBindings) -> Result<Vec<SharedRow>> {
        let tables = self.tables.read();
        Ok(lookup(&tables, &self.table)?
            .rows
            .iter()
            .map(SharedRow::acquire)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::SingletonBindingsCursor;
    use crate::types::{TypeClass, Value};

    fn store_with_rows(values: &[i32]) -> (MemoryStore, RowType) {
        let store = MemoryStore::new();
        let row_type = RowType::of(&[TypeClass::Integer]);
        store.create_table("t", row_type.clone()).unwrap();
        for v in values {
            let row = SharedRow::new(ValuesRow::new(row_type.clone(), vec![Value::Integer(*v)]));
            store.insert_row("t", &row).unwrap();
        }
        (store, row_type)
    }

    #[test]
    fn test_create_table_twice() {
        let (store, row_type) = store_with_rows(&[]);
        assert!(matches!(
            store.create_table("t", row_type),
            Err(QueryError::Storage { .. })
        ));
    }

    #[test]
    fn test_update_and_delete_by_identity() {
        let (store, row_type) = store_with_rows(&[1, 2]);
        let rows = store.rows("t").unwrap();
        let replacement = SharedRow::new(ValuesRow::new(row_type.clone(), vec![Value::Integer(20)]));
        store.update_row("t", &rows[1], &replacement).unwrap();
        store.delete_row("t", &rows[0]).unwrap();

        let remaining = store.rows("t").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].value(0).unwrap(), &Value::Integer(20));
        assert!(store.delete_row("t", &rows[0]).is_err());
    }

    #[test]
    fn test_insert_rejects_wrong_shape() {
        let (store, _) = store_with_rows(&[]);
        let other = RowType::of(&[TypeClass::Text]);
        let row = SharedRow::new(ValuesRow::new(other, vec![Value::Text("x".into())]));
        assert!(store.insert_row("t", &row).is_err());
        assert!(store.insert_row("missing", &row).is_err());
    }

    #[test]
    fn test_scan_snapshot_at_open() {
        let (store, row_type) = store_with_rows(&[1]);
        let store = Arc::new(store);
        let ctx = Arc::new(QueryContext::new(store.clone()));
        let mut cursor = store
            .scan(&ctx, "t", &row_type, SingletonBindingsCursor::empty())
            .unwrap();
        let late = SharedRow::new(ValuesRow::new(row_type.clone(), vec![Value::Integer(2)]));
        store.insert_row("t", &late).unwrap();

        cursor.open().unwrap();
        let row = SharedRow::new(ValuesRow::new(row_type.clone(), vec![Value::Integer(3)]));
        store.insert_row("t", &row).unwrap();

        let mut seen = Vec::new();
        while let Some(row) = cursor.next().unwrap() {
            seen.push(row.value(0).unwrap().clone());
        }
        assert_eq!(seen, vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_scan_checks_row_type() {
        let (store, _) = store_with_rows(&[]);
        let store = Arc::new(store);
        let ctx = Arc::new(QueryContext::new(store.clone()));
        let lookalike = RowType::of(&[TypeClass::Integer]);
        assert!(store
            .scan(&ctx, "t", &lookalike, SingletonBindingsCursor::empty())
            .is_err());
    }
}
