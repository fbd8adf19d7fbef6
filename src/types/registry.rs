//! Process-wide lookup table of casts.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{CastError, QueryError};

use super::cast::{Cast, PreptimeValue, StandardCast};
use super::class::{TypeClass, TypeInstance};
use super::value::Value;

const ALL_CLASSES: [TypeClass; 9] = [
    TypeClass::Bool,
    TypeClass::Smallint,
    TypeClass::Integer,
    TypeClass::Bigint,
    TypeClass::UBigint,
    TypeClass::Real,
    TypeClass::Double,
    TypeClass::Text,
    TypeClass::Bytea,
];

/// Immutable table holding at most one [`Cast`] per (source, target) class pair.
///
/// Build one with [`CastRegistry::builder`], or use the shared standard registry
/// from [`CastRegistry::shared`]. Lookups take `&self` and never lock.
pub struct CastRegistry {
    casts: HashMap<(TypeClass, TypeClass), Arc<dyn Cast>>,
}

impl CastRegistry {
    pub fn builder() -> CastRegistryBuilder {
        CastRegistryBuilder::default()
    }

    /// Registry with every built-in conversion.
    pub fn standard() -> Self {
        let mut casts: HashMap<(TypeClass, TypeClass), Arc<dyn Cast>> = HashMap::new();
        for from in ALL_CLASSES {
            for to in ALL_CLASSES {
                if let Some(cast) = StandardCast::new(from, to) {
                    casts.insert((from, to), Arc::new(cast));
                }
            }
        }
        Self { casts }
    }

    /// The standard registry, built on first use and shared by every execution.
    pub fn shared() -> Arc<CastRegistry> {
        static SHARED: OnceLock<Arc<CastRegistry>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| {
            let registry = CastRegistry::standard();
            tracing::debug!(casts = registry.len(), "built standard cast registry");
            Arc::new(registry)
        }))
    }

    pub fn len(&self) -> usize {
        self.casts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.casts.is_empty()
    }

    pub fn cast(&self, from: TypeClass, to: TypeClass) -> Option<&dyn Cast> {
        self.casts.get(&(from, to)).map(|cast| cast.as_ref())
    }

    /// Converts `value` to `target`.
    ///
    /// NULL converts to NULL and a value already of the target class is returned
    /// as is; anything else needs a registered cast.
    pub fn convert(&self, value: &Value, target: TypeClass) -> Result<Value, CastError> {
        let from = match value.type_class() {
            None => return Ok(Value::Null),
            Some(class) if class == target => return Ok(value.clone()),
            Some(class) => class,
        };
        match self.cast(from, target) {
            Some(cast) => cast.evaluate(value),
            None => Err(CastError::Unsupported { from, to: target }),
        }
    }

    /// Type produced by casting `source` to `target`, if such a cast exists.
    pub fn preferred_target(
        &self,
        source: &PreptimeValue,
        target: TypeClass,
    ) -> Option<TypeInstance> {
        if source.instance.class == target {
            return Some(TypeInstance {
                class: target,
                nullable: source.is_nullable(),
            });
        }
        self.cast(source.instance.class, target)
            .map(|cast| cast.preferred_target(source))
    }

    /// Chooses the type two operands of a binary expression are coerced to.
    ///
    /// When casts exist in both directions the stronger class wins. The result is
    /// nullable if either operand is.
    pub fn common_type(&self, a: &PreptimeValue, b: &PreptimeValue) -> Option<TypeInstance> {
        let (ac, bc) = (a.instance.class, b.instance.class);
        let nullable = a.is_nullable() || b.is_nullable();
        if ac == bc {
            return Some(TypeInstance {
                class: ac,
                nullable,
            });
        }
        let a_to_b = self.preferred_target(a, bc);
        let b_to_a = self.preferred_target(b, ac);
        let chosen = match (a_to_b, b_to_a) {
            (Some(to_b), Some(to_a)) => {
                if bc.strength() >= ac.strength() {
                    to_b
                } else {
                    to_a
                }
            }
            (Some(to_b), None) => to_b,
            (None, Some(to_a)) => to_a,
            (None, None) => return None,
        };
        Some(chosen.with_nullable(nullable))
    }

    /// Equality used to compare grouping keys of a column of class `class`.
    ///
    /// Values of other classes are converted first; a value that cannot be
    /// converted is never equal.
    pub fn values_equal(&self, a: &Value, b: &Value, class: TypeClass) -> bool {
        if a.type_class() == b.type_class() {
            return a.group_eq(b);
        }
        match (self.convert(a, class), self.convert(b, class)) {
            (Ok(x), Ok(y)) => x.group_eq(&y),
            _ => false,
        }
    }
}

impl fmt::Debug for CastRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CastRegistry")
            .field("casts", &self.casts.len())
            .finish()
    }
}

/// Collects casts and validates uniqueness on [`build`](CastRegistryBuilder::build).
#[derive(Default)]
pub struct CastRegistryBuilder {
    casts: Vec<Arc<dyn Cast>>,
}

impl CastRegistryBuilder {
    pub fn register(mut self, cast: impl Cast + 'static) -> Self {
        self.casts.push(Arc::new(cast));
        self
    }

    /// Adds every built-in conversion.
    pub fn with_standard_casts(mut self) -> Self {
        for from in ALL_CLASSES {
            for to in ALL_CLASSES {
                if let Some(cast) = StandardCast::new(from, to) {
                    self.casts.push(Arc::new(cast));
                }
            }
        }
        self
    }

    /// Fails if two casts share a class pair or a cast maps a class to itself.
    pub fn build(self) -> Result<CastRegistry, QueryError> {
        let mut casts = HashMap::with_capacity(self.casts.len());
        for cast in self.casts {
            let key = (cast.source_class(), cast.target_class());
            if key.0 == key.1 {
                return Err(QueryError::configuration(format!(
                    "identity cast registered for {}",
                    key.0
                )));
            }
            if casts.insert(key, cast).is_some() {
                return Err(QueryError::configuration(format!(
                    "duplicate cast from {} to {}",
                    key.0, key.1
                )));
            }
        }
        Ok(CastRegistry { casts })
    }
}
