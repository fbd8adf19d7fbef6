//! Row types.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::types::{TypeClass, TypeInstance};

static NEXT_ROW_TYPE_ID: AtomicU32 = AtomicU32::new(1);

/// Ordered, fixed-length list of column types.
///
/// Each call to [`RowType::new`] creates a distinct type with a fresh id, so two
/// row types with identical columns are still different types; clones of one
/// `RowType` compare equal. Use [`same_shape`](RowType::same_shape) for a
/// structural comparison.
#[derive(Clone)]
pub struct RowType(Arc<RowTypeInner>);

struct RowTypeInner {
    id: u32,
    columns: Vec<TypeInstance>,
}

impl RowType {
    pub fn new(columns: Vec<TypeInstance>) -> Self {
        let id = NEXT_ROW_TYPE_ID.fetch_add(1, Ordering::Relaxed);
        RowType(Arc::new(RowTypeInner { id, columns }))
    }

    /// Row type of nullable columns of the given classes.
    pub fn of(classes: &[TypeClass]) -> Self {
        RowType::new(classes.iter().copied().map(TypeInstance::new).collect())
    }

    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn column_count(&self) -> usize {
        self.0.columns.len()
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range.
    pub fn column(&self, index: usize) -> TypeInstance {
        self.0.columns[index]
    }

    pub fn columns(&self) -> &[TypeInstance] {
        &self.0.columns
    }

    pub fn same_shape(&self, other: &RowType) -> bool {
        self.0.columns == other.0.columns
    }
}

impl PartialEq for RowType {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for RowType {}

impl Hash for RowType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowType#{}{}", self.0.id, self)
    }
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, column) in self.0.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", column)?;
        }
        write!(f, ")")
    }
}
