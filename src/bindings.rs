//! Query bindings and the bindings cursor protocol.
//!
//! A [`QueryBindings`] is one immutable assignment of parameter values and
//! correlated outer rows. Bindings nest: a binding created for an inner subtree
//! points at the outer binding it was derived from, and lookups fall back to it.
//!
//! A [`QueryBindingsCursor`] yields the sequence of bindings a cursor tree is
//! executed under. The leaf cursor of a tree owns it; composite cursors forward
//! the `*_bindings` calls down to their input.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::row::SharedRow;
use crate::types::Value;

/// Parameter values and outer rows for one logical pass over a subtree.
#[derive(Default)]
pub struct QueryBindings {
    parent: Option<Arc<QueryBindings>>,
    depth: usize,
    values: HashMap<usize, Value>,
    rows: HashMap<usize, SharedRow>,
}

impl QueryBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty binding nested under `parent`, one level deeper.
    pub fn child_of(parent: &Arc<QueryBindings>) -> Self {
        Self {
            parent: Some(Arc::clone(parent)),
            depth: parent.depth + 1,
            values: HashMap::new(),
            rows: HashMap::new(),
        }
    }

    pub fn with_value(mut self, index: usize, value: Value) -> Self {
        self.values.insert(index, value);
        self
    }

    /// Binds an outer row; the binding holds its own claim on it.
    pub fn with_row(mut self, index: usize, row: &SharedRow) -> Self {
        self.rows.insert(index, row.acquire());
        self
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn parent(&self) -> Option<&Arc<QueryBindings>> {
        self.parent.as_ref()
    }

    /// Value of parameter `index`, searching enclosing bindings.
    pub fn value(&self, index: usize) -> Option<&Value> {
        match self.values.get(&index) {
            Some(value) => Some(value),
            None => self.parent.as_ref().and_then(|p| p.value(index)),
        }
    }

    /// Outer row bound at `index`, searching enclosing bindings.
    pub fn row(&self, index: usize) -> Option<&SharedRow> {
        match self.rows.get(&index) {
            Some(row) => Some(row),
            None => self.parent.as_ref().and_then(|p| p.row(index)),
        }
    }

    /// True if `self` is `other` or one of the bindings `other` is nested under.
    pub fn is_ancestor_of(&self, other: &QueryBindings) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        match &other.parent {
            Some(parent) => self.is_ancestor_of(parent),
            None => false,
        }
    }
}

impl fmt::Debug for QueryBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut values: Vec<_> = self.values.iter().collect();
        values.sort_by_key(|(index, _)| **index);
        f.debug_struct("QueryBindings")
            .field("depth", &self.depth)
            .field("values", &values)
            .field("rows", &self.rows.len())
            .finish()
    }
}

/// Source of the bindings a cursor tree is run under.
///
/// `next_bindings` returns `None` once the sequence is exhausted (or was never
/// opened). `cancel_bindings(b)` discards every pending binding derived from `b`.
pub trait QueryBindingsCursor: Send {
    fn open_bindings(&mut self);

    fn next_bindings(&mut self) -> Option<Arc<QueryBindings>>;

    fn close_bindings(&mut self);

    fn cancel_bindings(&mut self, bindings: &QueryBindings);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SingletonState {
    Closed,
    Pending,
    Exhausted,
}

/// Yields one binding per open; used for top-level executions.
#[derive(Debug)]
pub struct SingletonBindingsCursor {
    bindings: Arc<QueryBindings>,
    state: SingletonState,
}

impl SingletonBindingsCursor {
    pub fn new(bindings: Arc<QueryBindings>) -> Self {
        Self {
            bindings,
            state: SingletonState::Closed,
        }
    }

    /// Boxed cursor over an empty binding.
    pub fn empty() -> Box<dyn QueryBindingsCursor> {
        Box::new(Self::new(Arc::new(QueryBindings::new())))
    }
}

impl QueryBindingsCursor for SingletonBindingsCursor {
    fn open_bindings(&mut self) {
        self.state = SingletonState::Pending;
    }

    fn next_bindings(&mut self) -> Option<Arc<QueryBindings>> {
        match self.state {
            SingletonState::Pending => {
                self.state = SingletonState::Exhausted;
                Some(Arc::clone(&self.bindings))
            }
            SingletonState::Closed | SingletonState::Exhausted => None,
        }
    }

    fn close_bindings(&mut self) {
        self.state = SingletonState::Closed;
    }

    fn cancel_bindings(&mut self, bindings: &QueryBindings) {
        if bindings.is_ancestor_of(&self.bindings) {
            self.state = SingletonState::Exhausted;
        }
    }
}

/// Yields a fixed list of bindings, e.g. one per outer row of a nested loop.
#[derive(Debug)]
pub struct MultipleBindingsCursor {
    all: Vec<Arc<QueryBindings>>,
    pending: VecDeque<Arc<QueryBindings>>,
}

impl MultipleBindingsCursor {
    pub fn new(bindings: Vec<Arc<QueryBindings>>) -> Self {
        Self {
            all: bindings,
            pending: VecDeque::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl QueryBindingsCursor for MultipleBindingsCursor {
    fn open_bindings(&mut self) {
        self.pending = self.all.iter().cloned().collect();
    }

    fn next_bindings(&mut self) -> Option<Arc<QueryBindings>> {
        self.pending.pop_front()
    }

    fn close_bindings(&mut self) {
        self.pending.clear();
    }

    fn cancel_bindings(&mut self, bindings: &QueryBindings) {
        self.pending.retain(|pending| !bindings.is_ancestor_of(pending));
    }
}
