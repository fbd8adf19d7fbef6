pub mod aggregate;
pub mod bindings;
pub mod config;
pub mod context;
pub mod cursor;
pub mod dml;
pub mod error;
pub mod explain;
pub mod expr;
pub mod operator;
pub mod row;
pub mod runner;
pub mod store;
pub mod tap;
pub mod types;

pub use context::{CancelHandle, QueryContext};
pub use cursor::{Cursor, CursorState};
pub use error::{CastError, QueryError, Result, ValueError};
pub use operator::Operator;
