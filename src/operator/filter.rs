use std::sync::Arc;

use tracing::trace;

use crate::bindings::{QueryBindings, QueryBindingsCursor};
use crate::context::QueryContext;
use crate::cursor::{Cursor, CursorState};
use crate::error::{QueryError, Result};
use crate::explain::{Explain, Label};
use crate::expr::{EvalScope, Expr};
use crate::row::{RowType, SharedRow};
use crate::types::TypeClass;

use super::{InputCursor, Operator};

const TAP_NEXT: &str = "filter.next";

/// Keeps the input rows whose predicate evaluates to TRUE.
///
/// NULL and FALSE both drop the row. Rows of a type other than the input's
/// declared type pass through unfiltered.
#[derive(Debug)]
pub struct Filter {
    pub(super) input: Arc<Operator>,
    pub(super) predicate: Arc<Expr>,
}

impl Filter {
    pub(super) fn new(input: Arc<Operator>, predicate: Expr) -> Result<Self> {
        if let Some(ty) = predicate.ty() {
            if ty.class != TypeClass::Bool {
                return Err(QueryError::configuration(format!(
                    "filter predicate {} has type {}, expected boolean",
                    predicate, ty
                )));
            }
        }
        Ok(Self {
            input,
            predicate: Arc::new(predicate),
        })
    }

    pub fn predicate(&self) -> &Expr {
        &self.predicate
    }

    pub(super) fn cursor(
        &self,
        context: &Arc<QueryContext>,
        bindings: Box<dyn QueryBindingsCursor>,
    ) -> Result<Box<dyn Cursor>> {
        let input = self.input.cursor(context, bindings)?;
        Ok(Box::new(FilterCursor {
            base: InputCursor::new(context, input, "Filter"),
            input_type: self.input.row_type().clone(),
            predicate: Arc::clone(&self.predicate),
        }))
    }

    pub(super) fn explain(&self) -> Explain {
        Explain::new("Filter")
            .attribute(Label::Predicate, &self.predicate)
            .input(self.input.explain())
    }
}

struct FilterCursor {
    base: InputCursor,
    input_type: RowType,
    predicate: Arc<Expr>,
}

impl FilterCursor {
    fn advance(&mut self) -> Result<Option<SharedRow>> {
        self.base.context.check_cancelled()?;
        loop {
            let Some(row) = self.base.pull()? else {
                self.base.finish()?;
                return Ok(None);
            };
            if row.row_type() != &self.input_type {
                return Ok(Some(row));
            }
            let scope = EvalScope::new(&self.base.context, &self.base.bindings).with_row(row.as_row());
            if self.predicate.evaluate(&scope)?.is_true() {
                return Ok(Some(row));
            }
            trace!(?row, "filter dropped row");
        }
    }
}

impl Cursor for FilterCursor {
    fn open(&mut self) -> Result<()> {
        self.base.open()
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
