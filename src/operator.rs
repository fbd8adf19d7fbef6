//! Physical operators.
//!
//! An [`Operator`] is an immutable plan node built once by the planner and
//! shared by `Arc` across executions. Its only runtime capability is creating a
//! [`Cursor`] bound to one [`QueryContext`] and one bindings cursor.
//!
//! ```text
//! Operator tree (shared)          Cursor tree (per execution)
//!
//!   AggregatePartial  ──cursor()──>  AggregatePartialCursor
//!     └── Project                      └── ProjectCursor
//!           └── StoreScan                    └── StoreAdapter leaf
//! ```
//!
//! Structural invariants are checked by the constructors, so a tree that was
//! built successfully fails at run time only for data or cancellation reasons.
//!
//! # Operators
//!
//! - [`ValuesScan`] / [`StoreScan`]: leaves
//! - [`Filter`]: keeps rows whose predicate is TRUE
//! - [`Project`]: lazily computed [`ProjectedRow`](crate::row::ProjectedRow)s
//! - [`AggregatePartial`]: streaming aggregation over contiguous key runs
//! - [`Limit`]: offset and row limit

mod aggregate_partial;
mod filter;
mod limit;
mod project;
mod scan;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::aggregate::AggregatorSpec;
use crate::bindings::{QueryBindings, QueryBindingsCursor};
use crate::context::QueryContext;
use crate::cursor::{check, close_child, close_child_quietly, destroy_child, Cursor, CursorState};
use crate::error::Result;
use crate::explain::Explain;
use crate::expr::Expr;
use crate::row::{RowType, SharedRow};

pub use aggregate_partial::AggregatePartial;
pub use filter::Filter;
pub use limit::Limit;
pub use project::Project;
pub(crate) use scan::check_scan_type;
pub use scan::{RowSource, ScanCursor, StoreScan, ValuesScan};

/// A node of a physical plan.
#[derive(Debug)]
pub enum Operator {
    ValuesScan(ValuesScan),
    StoreScan(StoreScan),
    Filter(Filter),
    Project(Project),
    AggregatePartial(AggregatePartial),
    Limit(Limit),
}

impl Operator {
    /// Leaf emitting `rows` in order. Rows need not be of `row_type`.
    pub fn values_scan(row_type: RowType, rows: Vec<SharedRow>) -> Arc<Operator> {
        Arc::new(Operator::ValuesScan(ValuesScan {
            row_type,
            rows: rows.into(),
        }))
    }

    /// Leaf scanning `table` through the context's store adapter.
    pub fn store_scan(table: impl Into<String>, row_type: RowType) -> Arc<Operator> {
        Arc::new(Operator::StoreScan(StoreScan {
            table: table.into(),
            row_type,
        }))
    }

    pub fn filter(input: Arc<Operator>, predicate: Expr) -> Result<Arc<Operator>> {
        Ok(Arc::new(Operator::Filter(Filter::new(input, predicate)?)))
    }

    pub fn project(input: Arc<Operator>, expressions: Vec<Expr>) -> Result<Arc<Operator>> {
        Ok(Arc::new(Operator::Project(Project::new(input, expressions)?)))
    }

    /// Aggregation over the input's leading `inputs_index` columns.
    ///
    /// Every remaining input column feeds one aggregator, in order.
    pub fn aggregate_partial(
        input: Arc<Operator>,
        inputs_index: usize,
        aggregators: Vec<AggregatorSpec>,
    ) -> Result<Arc<Operator>> {
        Ok(Arc::new(Operator::AggregatePartial(AggregatePartial::new(
            input,
            inputs_index,
            aggregators,
        )?)))
    }

    pub fn limit(input: Arc<Operator>, offset: usize, limit: Option<usize>) -> Arc<Operator> {
        Arc::new(Operator::Limit(Limit::new(input, offset, limit)))
    }

    /// Creates the cursor for one execution of this operator.
    ///
    /// `bindings` is handed down to the leaf of the tree.
    pub fn cursor(
        &self,
        context: &Arc<QueryContext>,
        bindings: Box<dyn QueryBindingsCursor>,
    ) -> Result<Box<dyn Cursor>> {
        match self {
            Operator::ValuesScan(op) => Ok(op.cursor(context, bindings)),
            Operator::StoreScan(op) => op.cursor(context, bindings),
            Operator::Filter(op) => op.cursor(context, bindings),
            Operator::Project(op) => op.cursor(context, bindings),
            Operator::AggregatePartial(op) => op.cursor(context, bindings),
            Operator::Limit(op) => op.cursor(context, bindings),
        }
    }

    pub fn row_type(&self) -> &RowType {
        match self {
            Operator::ValuesScan(op) => &op.row_type,
            Operator::StoreScan(op) => &op.row_type,
            Operator::Filter(op) => op.input.row_type(),
            Operator::Project(op) => op.row_type(),
            Operator::AggregatePartial(op) => op.row_type(),
            Operator::Limit(op) => op.input.row_type(),
        }
    }

    pub fn inputs(&self) -> Vec<&Arc<Operator>> {
        match self {
            Operator::ValuesScan(_) | Operator::StoreScan(_) => Vec::new(),
            Operator::Filter(op) => vec![&op.input],
            Operator::Project(op) => vec![&op.input],
            Operator::AggregatePartial(op) => vec![&op.input],
            Operator::Limit(op) => vec![&op.input],
        }
    }

    pub fn explain(&self) -> Explain {
        match self {
            Operator::ValuesScan(op) => op.explain(),
            Operator::StoreScan(op) => op.explain(),
            Operator::Filter(op) => op.explain(),
            Operator::Project(op) => op.explain(),
            Operator::AggregatePartial(op) => op.explain(),
            Operator::Limit(op) => op.explain(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::ValuesScan(op) => write!(f, "ValuesScan({} rows)", op.rows.len()),
            Operator::StoreScan(op) => write!(f, "StoreScan({})", op.table),
            Operator::Filter(op) => write!(f, "Filter({})", op.predicate),
            Operator::Project(op) => write!(f, "Project{}", op.row_type()),
            Operator::AggregatePartial(op) => write!(f, "{}", op),
            Operator::Limit(op) => write!(f, "{}", op),
        }
    }
}

/// Lifecycle bookkeeping shared by cursors with a single input.
///
/// Owns the input cursor, the cursor state and the binding set of the current
/// pass. Operator cursors call these helpers from their own [`Cursor`] methods
/// and keep only their operator-specific state.
struct InputCursor {
    context: Arc<QueryContext>,
    input: Box<dyn Cursor>,
    bindings: Arc<QueryBindings>,
    state: CursorState,
    operator: &'static str,
}

impl InputCursor {
    fn new(context: &Arc<QueryContext>, input: Box<dyn Cursor>, operator: &'static str) -> Self {
        Self {
            context: Arc::clone(context),
            input,
            bindings: Arc::new(QueryBindings::new()),
            state: CursorState::Closed,
            operator,
        }
    }

    fn open(&mut self) -> Result<()> {
        check::can_open(self.state)?;
        self.input.open()?;
        self.state = CursorState::Opening;
        debug!(operator = self.operator, "cursor opened");
        Ok(())
    }

    /// Protocol check made at the top of every `next()`. Cancellation is
    /// checked by the operator's own row loop so its abort path runs.
    fn begin_next(&self) -> Result<()> {
        check::can_next(self.state)
    }

    /// Next input row; `None` once the input is no longer active.
    fn pull(&mut self) -> Result<Option<SharedRow>> {
        if !self.input.is_active() {
            return Ok(None);
        }
        self.input.next()
    }

    /// End of data: closes the input if it is still running.
    fn finish(&mut self) -> Result<()> {
        self.state = CursorState::Closed;
        debug!(operator = self.operator, "cursor finished");
        close_child(self.input.as_mut())
    }

    /// Error path: closes the input, keeping the error already propagating.
    fn abort(&mut self) {
        close_child_quietly(self.input.as_mut(), self.operator);
        self.state = CursorState::Closed;
    }

    fn close(&mut self) -> Result<()> {
        check::can_close(self.state)?;
        self.state = CursorState::Closed;
        debug!(operator = self.operator, "cursor closed");
        close_child(self.input.as_mut())
    }

    fn destroy(&mut self) -> Result<()> {
        check::can_destroy(self.state)?;
        let closed = if self.state.is_active() {
            self.state = CursorState::Closed;
            close_child(self.input.as_mut())
        } else {
            Ok(())
        };
        let destroyed = destroy_child(self.input.as_mut());
        self.state = CursorState::Destroyed;
        closed.and(destroyed)
    }

    fn open_bindings(&mut self) -> Result<()> {
        check::not_destroyed("open the bindings of", self.state)?;
        self.input.open_bindings()
    }

    fn next_bindings(&mut self) -> Result<Option<Arc<QueryBindings>>> {
        check::can_advance_bindings(self.state)?;
        let next = self.input.next_bindings()?;
        if let Some(bindings) = &next {
            self.bindings = Arc::clone(bindings);
        }
        Ok(next)
    }

    fn close_bindings(&mut self) -> Result<()> {
        check::not_destroyed("close the bindings of", self.state)?;
        self.input.close_bindings()
    }

    fn cancel_bindings(&mut self, bindings: &QueryBindings) {
        self.input.cancel_bindings(bindings);
        if self.state != CursorState::Destroyed {
            self.state = CursorState::Closed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggregateFunction;
    use crate::expr::BinaryOp;
    use crate::row::ValuesRow;
    use crate::types::{TypeClass, Value};

    fn scan() -> Arc<Operator> {
        let row_type = RowType::of(&[TypeClass::Integer, TypeClass::Integer]);
        let rows = vec![SharedRow::new(ValuesRow::new(
            row_type.clone(),
            vec![Value::Integer(1), Value::Integer(2)],
        ))];
        Operator::values_scan(row_type, rows)
    }

    #[test]
    fn test_row_type_of_pass_through_operators() {
        let input = scan();
        let predicate = Expr::binary(
            BinaryOp::Gt,
            Expr::column(0, TypeClass::Integer),
            Expr::literal(0),
        );
        let filter = Operator::filter(input.clone(), predicate).unwrap();
        let limit = Operator::limit(filter.clone(), 0, Some(1));
        assert_eq!(filter.row_type(), input.row_type());
        assert_eq!(limit.row_type(), input.row_type());
        assert_eq!(limit.inputs().len(), 1);
        assert!(input.inputs().is_empty());
    }

    #[test]
    fn test_explain_tree() {
        let agg = Operator::aggregate_partial(
            scan(),
            1,
            vec![AggregateFunction::Sum.spec()],
        )
        .unwrap();
        let explain = agg.explain();
        assert_eq!(explain.name, "Aggregation(GROUP BY 1 field, then: [SUM])");
        assert_eq!(explain.inputs.len(), 1);
        assert_eq!(explain.inputs[0].name, "ValuesScan");
        let text = agg.explain().to_string();
        assert!(text.contains("\n  ValuesScan\n"));
    }

    #[test]
    fn test_display() {
        assert_eq!(scan().to_string(), "ValuesScan(1 rows)");
        assert_eq!(
            Operator::store_scan("t", RowType::of(&[TypeClass::Text])).to_string(),
            "StoreScan(t)"
        );
    }
}
