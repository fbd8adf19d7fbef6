//! Leaf scans: a fixed list of rows, or a table supplied by the store adapter.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::bindings::{QueryBindings, QueryBindingsCursor};
use crate::context::QueryContext;
use crate::cursor::{check, Cursor, CursorState};
use crate::error::{QueryError, Result};
use crate::explain::{Explain, Label};
use crate::row::{RowType, SharedRow};

const TAP_OPEN: &str = "scan.open";
const TAP_NEXT: &str = "scan.next";

/// Leaf over a fixed list of shared rows. Rows may be of mixed types.
#[derive(Debug)]
pub struct ValuesScan {
    pub(super) row_type: RowType,
    pub(super) rows: Arc<[SharedRow]>,
}

impl ValuesScan {
    pub fn rows(&self) -> &[SharedRow] {
        &self.rows
    }

    pub(super) fn cursor(
        &self,
        context: &Arc<QueryContext>,
        bindings: Box<dyn QueryBindingsCursor>,
    ) -> Box<dyn Cursor> {
        let source = ValuesSource {
            rows: Arc::clone(&self.rows),
        };
        Box::new(ScanCursor::new(Arc::clone(context), source, bindings))
    }

    pub(super) fn explain(&self) -> Explain {
        Explain::new("ValuesScan")
            .attribute(Label::OutputType, &self.row_type)
            .attribute(Label::RowCount, self.rows.len())
    }
}

/// Leaf delegating to [`StoreAdapter::scan`](crate::store::StoreAdapter::scan).
#[derive(Debug)]
pub struct StoreScan {
    pub(super) table: String,
    pub(super) row_type: RowType,
}

impl StoreScan {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub(super) fn cursor(
        &self,
        context: &Arc<QueryContext>,
        bindings: Box<dyn QueryBindingsCursor>,
    ) -> Result<Box<dyn Cursor>> {
        context
            .store()
            .scan(context, &self.table, &self.row_type, bindings)
    }

    pub(super) fn explain(&self) -> Explain {
        Explain::new("StoreScan")
            .attribute(Label::Table, &self.table)
            .attribute(Label::OutputType, &self.row_type)
    }
}

/// Supplies the rows of one pass to a [`ScanCursor`].
pub trait RowSource: Send {
    /// Loads the rows for a pass under `bindings`; called on every `open`.
    fn load(&mut self, bindings: &QueryBindings) -> Result<Vec<SharedRow>>;
}

struct ValuesSource {
    rows: Arc<[SharedRow]>,
}

impl RowSource for ValuesSource {
    fn load(&mut self, _bindings: &QueryBindings) -> Result<Vec<SharedRow>> {
        Ok(self.rows.iter().map(SharedRow::acquire).collect())
    }
}

/// Leaf cursor emitting the rows its [`RowSource`] loads at open.
///
/// The leaf owns the bindings cursor of its tree; composite cursors forward
/// their bindings calls down to it.
pub struct ScanCursor<S> {
    context: Arc<QueryContext>,
    source: S,
    bindings: Box<dyn QueryBindingsCursor>,
    current: Arc<QueryBindings>,
    pending: VecDeque<SharedRow>,
    state: CursorState,
}

impl<S: RowSource> ScanCursor<S> {
    pub fn new(
        context: Arc<QueryContext>,
        source: S,
        bindings: Box<dyn QueryBindingsCursor>,
    ) -> Self {
        Self {
            context,
            source,
            bindings,
            current: Arc::new(QueryBindings::new()),
            pending: VecDeque::new(),
            state: CursorState::Closed,
        }
    }

    fn abort(&mut self) {
        self.pending.clear();
        self.state = CursorState::Closed;
    }
}

impl<S: RowSource> Cursor for ScanCursor<S> {
    fn open(&mut self) -> Result<()> {
        check::can_open(self.state)?;
        let _tap = self.context.tap(TAP_OPEN);
        let rows = self.source.load(&self.current)?;
        debug!(rows = rows.len(), "scan opened");
        self.pending = rows.into();
        self.state = CursorState::Opening;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<SharedRow>> {
        check::can_next(self.state)?;
        if let Err(e) = self.context.check_cancelled() {
            self.abort();
            return Err(e);
        }
        let _tap = self.context.tap(TAP_NEXT);
        match self.pending.pop_front() {
            Some(row) => {
                trace!(?row, "scan emitted row");
                self.state = CursorState::Running;
                Ok(Some(row))
            }
            None => {
                debug!("scan exhausted");
                self.state = CursorState::Closed;
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        check::can_close(self.state)?;
        self.abort();
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        check::can_destroy(self.state)?;
        self.pending.clear();
        self.state = CursorState::Destroyed;
        Ok(())
    }

    fn state(&self) -> CursorState {
        self.state
    }

    fn open_bindings(&mut self) -> Result<()> {
        check::not_destroyed("open the bindings of", self.state)?;
        self.bindings.open_bindings();
        Ok(())
    }

    fn next_bindings(&mut self) -> Result<Option<Arc<QueryBindings>>> {
        check::can_advance_bindings(self.state)?;
        let next = self.bindings.next_bindings();
        if let Some(bindings) = &next {
            self.current = Arc::clone(bindings);
        }
        Ok(next)
    }

    fn close_bindings(&mut self) -> Result<()> {
        check::not_destroyed("close the bindings of", self.state)?;
        self.bindings.close_bindings();
        Ok(())
    }

    fn cancel_bindings(&mut self, bindings: &QueryBindings) {
        self.bindings.cancel_bindings(bindings);
        self.pending.clear();
        if self.state != CursorState::Destroyed {
            self.state = CursorState::Closed;
        }
    }
}

/// Fails a scan whose declared row type is not the table's.
pub(crate) fn check_scan_type(table: &str, actual: &RowType, declared: &RowType) -> Result<()> {
    if actual == declared {
        Ok(())
    } else {
        Err(QueryError::storage(format!(
            "table {} has row type {}, scan declares {}",
            table, actual, declared
        )))
    }
}
