use std::sync::Arc;

use tracing::trace;

use crate::bindings::{QueryBindings, QueryBindingsCursor};
use crate::context::QueryContext;
use crate::cursor::{Cursor, CursorState};
use crate::error::{QueryError, Result};
use crate::explain::{describe_list, Explain, Label};
use crate::expr::Expr;
use crate::row::{ProjectedRow, RowType, SharedRow};

use super::{InputCursor, Operator};

const TAP_NEXT: &str = "project.next";

/// Computes one output column per expression over each input row.
///
/// Output rows are [`ProjectedRow`]s: nothing is evaluated until a consumer
/// reads a column. Rows of a type other than the input's declared type pass
/// through unchanged.
#[derive(Debug)]
pub struct Project {
    pub(super) input: Arc<Operator>,
    input_type: RowType,
    row_type: RowType,
    expressions: Arc<[Expr]>,
}

impl Project {
    pub(super) fn new(input: Arc<Operator>, expressions: Vec<Expr>) -> Result<Self> {
        let columns = expressions
            .iter()
            .enumerate()
            .map(|(i, expr)| {
                expr.ty().ok_or_else(|| {
                    QueryError::configuration(format!(
                        "projection {} ({}) has no type; cast it to a column type",
                        i, expr
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            input_type: input.row_type().clone(),
            input,
            row_type: RowType::new(columns),
            expressions: expressions.into(),
        })
    }

    pub fn row_type(&self) -> &RowType {
        &self.row_type
    }

    pub fn expressions(&self) -> &[Expr] {
        &self.expressions
    }

    pub(super) fn cursor(
        &self,
        context: &Arc<QueryContext>,
        bindings: Box<dyn QueryBindingsCursor>,
    ) -> Result<Box<dyn Cursor>> {
        let input = self.input.cursor(context, bindings)?;
        Ok(Box::new(ProjectCursor {
            base: InputCursor::new(context, input, "Project"),
            input_type: self.input_type.clone(),
            row_type: self.row_type.clone(),
            expressions: Arc::clone(&self.expressions),
        }))
    }

    pub(super) fn explain(&self) -> Explain {
        Explain::new("Project")
            .attribute(Label::Projections, describe_list(&self.expressions))
            .attribute(Label::OutputType, &self.row_type)
            .input(self.input.explain())
    }
}

struct ProjectCursor {
    base: InputCursor,
    input_type: RowType,
    row_type: RowType,
    expressions: Arc<[Expr]>,
}

impl ProjectCursor {
    fn advance(&mut self) -> Result<Option<SharedRow>> {
        self.base.context.check_cancelled()?;
        let Some(row) = self.base.pull()? else {
            self.base.finish()?;
            return Ok(None);
        };
        if row.row_type() != &self.input_type {
            trace!(?row, "project passed row through");
            return Ok(Some(row));
        }
        let projected = ProjectedRow::new(
            self.row_type.clone(),
            &row,
            Arc::clone(&self.base.context),
            Arc::clone(&self.base.bindings),
            Arc::clone(&self.expressions),
        );
        row.release();
        Ok(Some(SharedRow::new(projected)))
    }
}

impl Cursor for ProjectCursor {
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
