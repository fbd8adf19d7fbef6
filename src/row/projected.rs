//! Lazily evaluated projected rows.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::error::Result;
use crate::expr::{EvalScope, Expr};
use crate::types::Value;

use super::{fmt_row, Row, RowType, SharedRow};

/// Tap counting projected column evaluations.
pub const TAP_PROJECT_EVALUATE: &str = "project.evaluate";

/// Row whose columns are expressions over another row, computed on first read.
///
/// The projected row keeps its own claim on the underlying row for as long as
/// it lives, plus the binding set that was current when it was produced, so a
/// column evaluated late sees the same parameter values as one evaluated
/// immediately. Each column is evaluated at most once on success; a failed
/// evaluation is not cached and leaves the other columns untouched.
pub struct ProjectedRow {
    row_type: RowType,
    base: SharedRow,
    context: Arc<QueryContext>,
    bindings: Arc<QueryBindings>,
    expressions: Arc<[Expr]>,
    evaluated: Vec<OnceLock<Value>>,
}

impl ProjectedRow {
    pub fn new(
        row_type: RowType,
        base: &SharedRow,
        context: Arc<QueryContext>,
        bindings: Arc<QueryBindings>,
        expressions: Arc<[Expr]>,
    ) -> Self {
        debug_assert_eq!(row_type.column_count(), expressions.len());
        let evaluated = (0..expressions.len()).map(|_| OnceLock::new()).collect();
        Self {
            row_type,
            base: base.acquire(),
            context,
            bindings,
            expressions,
            evaluated,
        }
    }

    pub fn base(&self) -> &SharedRow {
        &self.base
    }

    pub fn is_evaluated(&self, index: usize) -> bool {
        self.evaluated[index].get().is_some()
    }
}

impl Row for ProjectedRow {
    fn row_type(&self) -> &RowType {
        &self.row_type
    }

    fn value(&self, index: usize) -> Result<&Value> {
        let cell = &self.evaluated[index];
        if let Some(value) = cell.get() {
            return Ok(value);
        }
        let _tap = self.context.tap(TAP_PROJECT_EVALUATE);
        let scope = EvalScope::new(&self.context, &self.bindings).with_row(self.base.as_row());
        let value = self.expressions[index]
            .evaluate(&scope)
            .map_err(|e| e.at_column(index))?;
        Ok(cell.get_or_init(|| value))
    }
}

impl fmt::Debug for ProjectedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_row(self, f)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::ExecutionConfig;
    use crate::error::{QueryError, ValueError};
    use crate::expr::BinaryOp;
    use crate::row::ValuesRow;
    use crate::store::MemoryStore;
    use crate::types::TypeClass;

    #[derive(Debug)]
    struct DropCounted {
        inner: ValuesRow,
        drops: Arc<AtomicUsize>,
    }

    impl Row for DropCounted {
        fn row_type(&self) -> &RowType {
            self.inner.row_type()
        }

        fn value(&self, index: usize) -> Result<&Value> {
            self.inner.value(index)
        }
    }

    impl Drop for DropCounted {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn context() -> Arc<QueryContext> {
        Arc::new(
            QueryContext::new(Arc::new(MemoryStore::new()))
                .with_config(ExecutionConfig::default().with_taps(true)),
        )
    }

    fn base_row(drops: &Arc<AtomicUsize>) -> SharedRow {
        let t = RowType::of(&[TypeClass::Integer, TypeClass::Integer]);
        SharedRow::new(DropCounted {
            inner: ValuesRow::new(t, vec![Value::Integer(10), Value::Integer(0)]),
            drops: Arc::clone(drops),
        })
    }

    fn projected(ctx: &Arc<QueryContext>, base: &SharedRow) -> ProjectedRow {
        let exprs: Arc<[Expr]> = vec![
            Expr::binary(
                BinaryOp::Add,
                Expr::column(0, TypeClass::Integer),
                Expr::literal(1),
            ),
            Expr::binary(
                BinaryOp::Div,
                Expr::column(0, TypeClass::Integer),
                Expr::column(1, TypeClass::Integer),
            ),
        ]
        .into();
        ProjectedRow::new(
            RowType::of(&[TypeClass::Integer, TypeClass::Integer]),
            base,
            Arc::clone(ctx),
            Arc::new(QueryBindings::new()),
            exprs,
        )
    }

    #[test]
    fn test_column_evaluated_once() {
        let ctx = context();
        let drops = Arc::new(AtomicUsize::new(0));
        let row = projected(&ctx, &base_row(&drops));

        assert!(!row.is_evaluated(0));
        let first = row.value(0).unwrap() as *const Value;
        let second = row.value(0).unwrap() as *const Value;
        assert_eq!(first, second);
        assert_eq!(row.value(0).unwrap(), &Value::Integer(11));
        assert_eq!(ctx.tap_stats(TAP_PROJECT_EVALUATE).count, 1);
    }

    #[test]
    fn test_failed_column_scoped_and_not_cached() {
        let ctx = context();
        let drops = Arc::new(AtomicUsize::new(0));
        let row = projected(&ctx, &base_row(&drops));

        assert_eq!(row.value(0).unwrap(), &Value::Integer(11));
        let err = row.value(1).unwrap_err();
        assert!(matches!(
            err,
            QueryError::Value {
                column: Some(1),
                source: ValueError::DivisionByZero
            }
        ));
        assert!(!row.is_evaluated(1));
        assert!(row.value(1).is_err());
        assert_eq!(ctx.tap_stats(TAP_PROJECT_EVALUATE).count, 3);
        assert_eq!(row.value(0).unwrap(), &Value::Integer(11));
    }

    #[test]
    fn test_base_released_once_when_unevaluated() {
        let ctx = context();
        let drops = Arc::new(AtomicUsize::new(0));
        let base = base_row(&drops);
        let row = SharedRow::new(projected(&ctx, &base));
        assert_eq!(base.holders(), 2);

        base.release();
        assert_eq!(drops.load(Ordering::SeqCst), 0);
        row.release();
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bindings_snapshot() {
        let ctx = context();
        let drops = Arc::new(AtomicUsize::new(0));
        let base = base_row(&drops);
        let bindings = Arc::new(QueryBindings::new().with_value(0, Value::Integer(5)));
        let row = ProjectedRow::new(
            RowType::of(&[TypeClass::Integer]),
            &base,
            Arc::clone(&ctx),
            Arc::clone(&bindings),
            vec![Expr::param(0, TypeClass::Integer)].into(),
        );
        drop(bindings);
        assert_eq!(row.value(0).unwrap(), &Value::Integer(5));
    }
}
