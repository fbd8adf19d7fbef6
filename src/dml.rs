//! Write operators.
//!
//! [`Update`] replaces rows of a store table: it runs its input (a scan of the
//! table, optionally filtered or limited), keeps the rows its selector accepts,
//! builds each replacement row from per-column assignments and hands the pair
//! to the store adapter after the context's locking hook has run.
//!
//! The input must emit the store's own row handles, which the store uses to
//! identify the row being replaced; projected rows cannot be updated.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::bindings::{QueryBindings, SingletonBindingsCursor};
use crate::context::QueryContext;
use crate::cursor::Cursor;
use crate::error::{QueryError, Result};
use crate::explain::{describe_list, Explain, Label};
use crate::expr::{EvalScope, Expr};
use crate::operator::Operator;
use crate::row::{RowType, SharedRow, ValuesRow};
use crate::types::TypeClass;

/// Outcome of one [`Update::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateResult {
    /// Rows produced by the input.
    pub rows_seen: u64,
    /// Rows accepted by the selector and replaced.
    pub rows_modified: u64,
    pub elapsed: Duration,
}

/// Which rows to update and how to compute their new values.
#[derive(Debug, Clone, Default)]
pub struct UpdateFunction {
    /// Rows for which this is not TRUE are left alone. `None` selects every row.
    pub selector: Option<Expr>,
    /// One entry per column; `None` keeps the old value.
    pub assignments: Vec<Option<Expr>>,
}

impl UpdateFunction {
    /// Function keeping every column of a `columns`-wide row.
    pub fn new(columns: usize) -> Self {
        Self {
            selector: None,
            assignments: vec![None; columns],
        }
    }

    pub fn with_selector(mut self, selector: Expr) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Assigns `expr` to column `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a column of the row.
    pub fn set(mut self, index: usize, expr: Expr) -> Self {
        self.assignments[index] = Some(expr);
        self
    }
}

/// UPDATE of a store table.
#[derive(Debug)]
pub struct Update {
    input: Arc<Operator>,
    table: String,
    function: UpdateFunction,
}

impl Update {
    pub fn new(input: Arc<Operator>, table: impl Into<String>, function: UpdateFunction) -> Result<Self> {
        let columns = input.row_type().column_count();
        if function.assignments.len() != columns {
            return Err(QueryError::configuration(format!(
                "update assigns {} columns, input has {}",
                function.assignments.len(),
                columns
            )));
        }
        if let Some(ty) = function.selector.as_ref().and_then(Expr::ty) {
            if ty.class != TypeClass::Bool {
                return Err(QueryError::configuration(format!(
                    "update selector has type {}, expected boolean",
                    ty
                )));
            }
        }
        Ok(Self {
            input,
            table: table.into(),
            function,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Runs the update once under `bindings`.
    ///
    /// The input cursor is destroyed on every exit path. Rows replaced before
    /// a failure stay replaced.
    pub fn run(&self, context: &Arc<QueryContext>, bindings: Arc<QueryBindings>) -> Result<UpdateResult> {
        let start = Instant::now();
        let mut cursor = self.input.cursor(
            context,
            Box::new(SingletonBindingsCursor::new(bindings)),
        )?;
        let counts = self.apply(context, cursor.as_mut());
        let destroyed = cursor.destroy();
        let (rows_seen, rows_modified) = counts?;
        destroyed?;

        let result = UpdateResult {
            rows_seen,
            rows_modified,
            elapsed: start.elapsed(),
        };
        debug!(table = %self.table, ?result, "update finished");
        Ok(result)
    }

    fn apply(&self, context: &Arc<QueryContext>, cursor: &mut dyn Cursor) -> Result<(u64, u64)> {
        let row_type = self.input.row_type();
        let (mut seen, mut modified) = (0, 0);

        cursor.open_bindings()?;
        while let Some(bindings) = cursor.next_bindings()? {
            cursor.open()?;
            while let Some(row) = cursor.next()? {
                seen += 1;
                let scope = EvalScope::new(context, &bindings).with_row(row.as_row());
                if let Some(selector) = &self.function.selector {
                    if !selector.evaluate(&scope)?.is_true() {
                        continue;
                    }
                }
                let new_row = self.new_row(context, row_type, &scope)?;
                context.lock_row(&self.table, &row)?;
                context.store().update_row(&self.table, &row, &new_row)?;
                trace!(old = ?row, new = ?new_row, "updated row");
                modified += 1;
            }
        }
        cursor.close_bindings()?;
        Ok((seen, modified))
    }

    fn new_row(&self, context: &QueryContext, row_type: &RowType, scope: &EvalScope<'_>) -> Result<SharedRow> {
        let Some(old) = scope.row else {
            return Err(QueryError::configuration("update evaluated without a row"));
        };
        let mut values = Vec::with_capacity(self.function.assignments.len());
        for (i, assignment) in self.function.assignments.iter().enumerate() {
            let value = match assignment {
                None => old.value(i)?.clone(),
                Some(expr) => {
                    let value = expr.evaluate(scope).map_err(|e| e.at_column(i))?;
                    let class = row_type.column(i).class;
                    match value.type_class() {
                        Some(actual) if actual != class => {
                            context.cast(&value, class).map_err(|e| e.at_column(i))?
                        }
                        _ => value,
                    }
                }
            };
            values.push(value);
        }
        Ok(SharedRow::new(ValuesRow::new(row_type.clone(), values)))
    }

    pub fn explain(&self) -> Explain {
        let assignments: Vec<String> = self
            .function
            .assignments
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.as_ref().map(|expr| format!("#{} = {}", i, expr)))
            .collect();
        let mut explain = Explain::new("Update")
            .attribute(Label::Table, &self.table)
            .attribute(Label::Assignments, describe_list(&assignments));
        if let Some(selector) = &self.function.selector {
            explain = explain.attribute(Label::Predicate, selector);
        }
        explain.input(self.input.explain())
    }
}
