//! Cursor protocol.
//!
//! A [`Cursor`] is the runtime iterator for one operator in one execution.
//!
//! ```text
//!            open()           next() -> row
//!  CLOSED ──────────> OPENING ───────────> RUNNING ──┐
//!    ^                   │                   │  ^    │ end of input
//!    │   next() -> None  │                   └──┘    v
//!    └───────────────────┴──────────────────────── CLOSING
//!
//!  destroy(): any state except DESTROYED ──> DESTROYED
//! ```
//!
//! `close()` is legal from any active state; `next()` returning `None` closes the
//! cursor implicitly, so callers only `close()` cursors they abandon early. Every
//! error returned by `next()` leaves the cursor closed with its children closed
//! and held rows released.

use std::fmt;
use std::sync::Arc;

use crate::bindings::QueryBindings;
use crate::error::{QueryError, Result};
use crate::row::SharedRow;

/// Lifecycle state of a cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CursorState {
    #[default]
    Closed,
    Opening,
    Running,
    Closing,
    Destroyed,
}

impl CursorState {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            CursorState::Opening | CursorState::Running | CursorState::Closing
        )
    }
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CursorState::Closed => "CLOSED",
            CursorState::Opening => "OPENING",
            CursorState::Running => "RUNNING",
            CursorState::Closing => "CLOSING",
            CursorState::Destroyed => "DESTROYED",
        };
        write!(f, "{}", name)
    }
}

/// Pull iterator over the rows produced by one operator.
pub trait Cursor: Send {
    /// CLOSED → OPENING; opens children.
    fn open(&mut self) -> Result<()>;

    /// Next row, or `None` at end of data (the cursor is then CLOSED).
    fn next(&mut self) -> Result<Option<SharedRow>>;

    /// Releases held rows and closes active children.
    fn close(&mut self) -> Result<()>;

    /// Closes if needed and permanently disables the cursor and its children.
    fn destroy(&mut self) -> Result<()>;

    fn state(&self) -> CursorState;

    fn is_idle(&self) -> bool {
        self.state() == CursorState::Closed
    }

    fn is_active(&self) -> bool {
        self.state().is_active()
    }

    fn is_destroyed(&self) -> bool {
        self.state() == CursorState::Destroyed
    }

    fn open_bindings(&mut self) -> Result<()>;

    /// Advances to the next binding. Only legal while the cursor is CLOSED.
    fn next_bindings(&mut self) -> Result<Option<Arc<QueryBindings>>>;

    fn close_bindings(&mut self) -> Result<()>;

    /// Abandons the current pass: forces CLOSED, drops lookahead, and discards
    /// pending bindings derived from `bindings`.
    fn cancel_bindings(&mut self, bindings: &QueryBindings);
}

/// Protocol checks shared by cursor implementations.
pub(crate) mod check {
    use super::*;

    pub fn can_open(state: CursorState) -> Result<()> {
        match state {
            CursorState::Closed => Ok(()),
            other => Err(QueryError::lifecycle("open", other)),
        }
    }

    pub fn can_next(state: CursorState) -> Result<()> {
        if state.is_active() {
            Ok(())
        } else {
            Err(QueryError::lifecycle("fetch the next row from", state))
        }
    }

    pub fn can_close(state: CursorState) -> Result<()> {
        if state.is_active() {
            Ok(())
        } else {
            Err(QueryError::lifecycle("close", state))
        }
    }

    pub fn can_destroy(state: CursorState) -> Result<()> {
        match state {
            CursorState::Destroyed => Err(QueryError::lifecycle("destroy", state)),
            _ => Ok(()),
        }
    }

    pub fn can_advance_bindings(state: CursorState) -> Result<()> {
        match state {
            CursorState::Closed => Ok(()),
            other => Err(QueryError::lifecycle("advance the bindings of", other)),
        }
    }

    pub fn not_destroyed(operation: &'static str, state: CursorState) -> Result<()> {
        match state {
            CursorState::Destroyed => Err(QueryError::lifecycle(operation, state)),
            _ => Ok(()),
        }
    }
}

/// Closes `child` if it is still active.
pub(crate) fn close_child(child: &mut dyn Cursor) -> Result<()> {
    if child.is_active() {
        child.close()
    } else {
        Ok(())
    }
}

/// Closes `child` while another error is already propagating.
///
/// A second failure is logged and dropped so the original error reaches the
/// caller.
pub(crate) fn close_child_quietly(child: &mut dyn Cursor, operator: &'static str) {
    if let Err(e) = close_child(child) {
        tracing::warn!(operator, error = %e, "failed to close input during error cleanup");
    }
}

/// Destroys `child` unless it already is.
pub(crate) fn destroy_child(child: &mut dyn Cursor) -> Result<()> {
    if child.is_destroyed() {
        Ok(())
    } else {
        child.destroy()
    }
}
