//! Test utilities for execution integration tests.
//!
//! Builds contexts, row types and value-scan inputs, and provides a row that
//! counts how often it is dropped.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use qpcore::config::ExecutionConfig;
use qpcore::row::{Row, RowType, SharedRow, ValuesRow};
use qpcore::store::MemoryStore;
use qpcore::types::{TypeClass, Value};
use qpcore::{Operator, QueryContext, Result};

/// Context over an empty in-memory store with taps enabled.
pub fn context() -> Arc<QueryContext> {
    context_with(ExecutionConfig::default().with_taps(true))
}

pub fn context_with(config: ExecutionConfig) -> Arc<QueryContext> {
    Arc::new(QueryContext::new(Arc::new(MemoryStore::new())).with_config(config))
}

/// Row type of `n` nullable bigint columns.
pub fn bigint_type(n: usize) -> RowType {
    RowType::of(&vec![TypeClass::Bigint; n])
}

pub fn bigints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|v| Value::Bigint(*v)).collect()
}

/// One shared row of `row_type` per entry of `rows`.
pub fn bigint_rows(row_type: &RowType, rows: &[Vec<i64>]) -> Vec<SharedRow> {
    rows.iter()
        .map(|r| SharedRow::new(ValuesRow::new(row_type.clone(), bigints(r))))
        .collect()
}

pub fn values_rows(row_type: &RowType, rows: Vec<Vec<Value>>) -> Vec<SharedRow> {
    rows.into_iter()
        .map(|values| SharedRow::new(ValuesRow::new(row_type.clone(), values)))
        .collect()
}

pub fn bigint_scan(columns: usize, rows: &[Vec<i64>]) -> Arc<Operator> {
    let row_type = bigint_type(columns);
    let rows = bigint_rows(&row_type, rows);
    Operator::values_scan(row_type, rows)
}

/// Opens a cursor over `operator` and drains it under empty bindings.
pub fn run(operator: &Operator, context: &Arc<QueryContext>) -> Result<Vec<Vec<Value>>> {
    qpcore::runner::execute(operator, context)
}

/// Row that records its drop in a shared counter.
#[derive(Debug)]
pub struct DropCountedRow {
    inner: ValuesRow,
    drops: Arc<AtomicUsize>,
}

impl DropCountedRow {
    pub fn new(row_type: RowType, values: Vec<Value>, drops: &Arc<AtomicUsize>) -> Self {
        Self {
            inner: ValuesRow::new(row_type, values),
            drops: Arc::clone(drops),
        }
    }
}

impl Row for DropCountedRow {
    fn row_type(&self) -> &RowType {
        self.inner.row_type()
    }

    fn value(&self, index: usize) -> Result<&Value> {
        self.inner.value(index)
    }
}

impl Drop for DropCountedRow {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn drops(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
