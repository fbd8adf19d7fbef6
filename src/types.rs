//! Typed values and the cast registry.
//!
//! Every value flowing through an operator tree is a [`Value`] whose class is one
//! of the [`TypeClass`] variants. Column declarations pair a class with a
//! nullability flag as a [`TypeInstance`].
//!
//! Conversions between classes go through the [`CastRegistry`], which holds at
//! most one [`Cast`] per (source, target) pair. The standard registry is built
//! once per process and shared read-only by every execution:
//!
//! ```text
//! Expr::Cast ──> QueryContext::cast ──> CastRegistry::convert ──> Cast::evaluate
//!                     │
//!                     └── error-fatal?  Err(CastError) : warning + NULL
//! ```

mod cast;
mod class;
mod registry;
mod value;

pub use cast::{Cast, Constness, PreptimeValue, StandardCast};
pub(crate) use cast::integer_from_i128;
pub use class::{TypeClass, TypeInstance};
pub use registry::{CastRegistry, CastRegistryBuilder};
pub use value::Value;
