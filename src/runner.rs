//! Query execution entry points.
//!
//! These drive a cursor tree through the full protocol: open the bindings,
//! run one pass per binding (open, drain), close the bindings and destroy the
//! cursor on every exit path. Results are materialized as value vectors.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::bindings::{MultipleBindingsCursor, QueryBindings, QueryBindingsCursor, SingletonBindingsCursor};
use crate::context::QueryContext;
use crate::cursor::Cursor;
use crate::error::Result;
use crate::operator::Operator;
use crate::types::Value;

/// Runs `operator` once under empty bindings.
pub fn execute(operator: &Operator, context: &Arc<QueryContext>) -> Result<Vec<Vec<Value>>> {
    execute_with_bindings(operator, context, Arc::new(QueryBindings::new()))
}

/// Runs `operator` once under `bindings`.
pub fn execute_with_bindings(
    operator: &Operator,
    context: &Arc<QueryContext>,
    bindings: Arc<QueryBindings>,
) -> Result<Vec<Vec<Value>>> {
    let passes = run(
        operator,
        context,
        Box::new(SingletonBindingsCursor::new(bindings)),
    )?;
    Ok(passes.into_iter().next().unwrap_or_default())
}

/// Re-executes `operator` once per binding, as the inner side of a nested loop
/// would. Returns one result set per binding, in order.
pub fn execute_per_binding(
    operator: &Operator,
    context: &Arc<QueryContext>,
    bindings: Vec<Arc<QueryBindings>>,
) -> Result<Vec<Vec<Vec<Value>>>> {
    run(
        operator,
        context,
        Box::new(MultipleBindingsCursor::new(bindings)),
    )
}

fn run(
    operator: &Operator,
    context: &Arc<QueryContext>,
    bindings: Box<dyn QueryBindingsCursor>,
) -> Result<Vec<Vec<Vec<Value>>>> {
    let start = Instant::now();
    let mut cursor = operator.cursor(context, bindings)?;
    let result = run_passes(cursor.as_mut());
    let destroyed = cursor.destroy();
    let passes = result?;
    destroyed?;
    debug!(
        operator = %operator,
        passes = passes.len(),
        rows = passes.iter().map(Vec::len).sum::<usize>(),
        elapsed = ?start.elapsed(),
        "execution finished"
    );
    Ok(passes)
}

fn run_passes(cursor: &mut dyn Cursor) -> Result<Vec<Vec<Vec<Value>>>> {
    cursor.open_bindings()?;
    let mut passes = Vec::new();
    while cursor.next_bindings()?.is_some() {
        cursor.open()?;
        passes.push(drain(cursor)?);
    }
    cursor.close_bindings()?;
    Ok(passes)
}

/// Pulls every remaining row from an open cursor, materializing each one.
///
/// On error the cursor may still be active; the caller closes or destroys it.
pub fn drain(cursor: &mut dyn Cursor) -> Result<Vec<Vec<Value>>> {
    let mut rows = Vec::new();
    while let Some(row) = cursor.next()? {
        rows.push(row.to_values()?);
    }
    Ok(rows)
}
