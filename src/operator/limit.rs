use std::fmt;
use std::sync::Arc;

use crate::bindings::{QueryBindings, QueryBindingsCursor};
use crate::context::QueryContext;
use crate::cursor::{Cursor, CursorState};
use crate::error::Result;
use crate::explain::{Explain, Label};
use crate::row::SharedRow;

use super::{InputCursor, Operator};

const TAP_NEXT: &str = "limit.next";

/// Skips `offset` rows, then emits at most `limit` rows.
///
/// Once the limit is reached the input is closed without being drained.
#[derive(Debug)]
pub struct Limit {
    pub(super) input: Arc<Operator>,
    offset: usize,
    limit: Option<usize>,
}

impl Limit {
    pub(super) fn new(input: Arc<Operator>, offset: usize, limit: Option<usize>) -> Self {
        Self {
            input,
            offset,
            limit,
        }
    }

    pub(super) fn cursor(
        &self,
        context: &Arc<QueryContext>,
        bindings: Box<dyn QueryBindingsCursor>,
    ) -> Result<Box<dyn Cursor>> {
        let input = self.input.cursor(context, bindings)?;
        Ok(Box::new(LimitCursor {
            base: InputCursor::new(context, input, "Limit"),
            offset: self.offset,
            limit: self.limit,
            skipped: 0,
            emitted: 0,
        }))
    }

    pub(super) fn explain(&self) -> Explain {
        let mut explain = Explain::new("Limit").attribute(Label::Offset, self.offset);
        if let Some(limit) = self.limit {
            explain = explain.attribute(Label::Limit, limit);
        }
        explain.input(self.input.explain())
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.limit {
            Some(limit) => write!(f, "Limit({} offset {})", limit, self.offset),
            None => write!(f, "Limit(offset {})", self.offset),
        }
    }
}

struct LimitCursor {
    base: InputCursor,
    offset: usize,
    limit: Option<usize>,
    skipped: usize,
    emitted: usize,
}

impl LimitCursor {
    fn advance(&mut self) -> Result<Option<SharedRow>> {
        self.base.context.check_cancelled()?;
        if self.limit.is_some_and(|limit| self.emitted >= limit) {
            self.base.finish()?;
            return Ok(None);
        }
        loop {
            let Some(row) = self.base.pull()? else {
                self.base.finish()?;
                return Ok(None);
            };
            if self.skipped < self.offset {
                self.skipped += 1;
                continue;
            }
            self.emitted += 1;
            return Ok(Some(row));
        }
    }
}

impl Cursor for LimitCursor {
    fn open(&mut self) -> Result<()> {
        self.base.open()?;
        self.skipped = 0;
        self.emitted = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<SharedRow>> {
        self.base.begin_next()?;
        let _tap = self.base.context.tap(TAP_NEXT);
        match self.advance() {
            Ok(Some(row)) => {
                self.base.state = CursorState::Running;
                Ok(Some(row))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                self.base.abort();
                Err(e)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.base.close()
    }

    fn destroy(&mut self) -> Result<()> {
        self.base.destroy()
    }

    fn state(&self) -> CursorState {
        self.base.state
    }

    fn open_bindings(&mut self) -> Result<()> {
        self.base.open_bindings()
    }

    fn next_bindings(&mut self) -> Result<Option<Arc<QueryBindings>>> {
        self.base.next_bindings()
    }

    fn close_bindings(&mut self) -> Result<()> {
        self.base.close_bindings()
    }

    fn cancel_bindings(&mut self, bindings: &QueryBindings) {
        self.base.cancel_bindings(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::SingletonBindingsCursor;
    use crate::row::{RowType, ValuesRow};
    use crate::store::MemoryStore;
    use crate::types::{TypeClass, Value};

    fn numbers(n: i32) -> Arc<Operator> {
        let row_type = RowType::of(&[TypeClass::Integer]);
        let rows = (0..n)
            .map(|i| SharedRow::new(ValuesRow::new(row_type.clone(), vec![Value::Integer(i)])))
            .collect();
        Operator::values_scan(row_type, rows)
    }

    fn run(op: &Operator) -> Vec<Value> {
        let ctx = Arc::new(QueryContext::new(Arc::new(MemoryStore::new())));
        let mut cursor = op.cursor(&ctx, SingletonBindingsCursor::empty()).unwrap();
        cursor.open().unwrap();
        let mut out = Vec::new();
        while let Some(row) = cursor.next().unwrap() {
            out.push(row.value(0).unwrap().clone());
        }
        assert!(cursor.is_idle());
        out
    }

    #[test]
    fn test_limit_and_offset() {
        let op = Operator::limit(numbers(5), 1, Some(2));
        assert_eq!(run(&op), vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(op.to_string(), "Limit(2 offset 1)");
    }

    #[test]
    fn test_offset_only() {
        let op = Operator::limit(numbers(3), 2, None);
        assert_eq!(run(&op), vec![Value::Integer(2)]);
    }

    #[test]
    fn test_zero_limit_closes_input_early() {
        let op = Operator::limit(numbers(3), 0, Some(0));
        assert!(run(&op).is_empty());
    }

    #[test]
    fn test_reopen_resets_counts() {
        let op = Operator::limit(numbers(3), 0, Some(1));
        let ctx = Arc::new(QueryContext::new(Arc::new(MemoryStore::new())));
        let mut cursor = op.cursor(&ctx, SingletonBindingsCursor::empty()).unwrap();
        for _ in 0..2 {
            cursor.open().unwrap();
            assert!(cursor.next().unwrap().is_some());
            assert!(cursor.next().unwrap().is_none());
        }
    }
}
