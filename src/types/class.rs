//! Type classes and column type instances.

use std::fmt;

/// Class of a value: the unit casts are registered between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeClass {
    /// Boolean type.
    Bool,
    /// 2-byte signed integer.
    Smallint,
    /// 4-byte signed integer.
    Integer,
    /// 8-byte signed integer.
    Bigint,
    /// 8-byte unsigned integer (result of bit operators).
    UBigint,
    /// Single-precision floating-point.
    Real,
    /// Double-precision floating-point.
    Double,
    /// Variable-length string.
    Text,
    /// Variable-length binary string.
    Bytea,
}

impl TypeClass {
    /// Returns the SQL display name for this class (e.g., `"INTEGER"`).
    pub const fn display_name(self) -> &'static str {
        match self {
            TypeClass::Bool => "BOOLEAN",
            TypeClass::Smallint => "SMALLINT",
            TypeClass::Integer => "INTEGER",
            TypeClass::Bigint => "BIGINT",
            TypeClass::UBigint => "BIGINT UNSIGNED",
            TypeClass::Real => "REAL",
            TypeClass::Double => "DOUBLE PRECISION",
            TypeClass::Text => "TEXT",
            TypeClass::Bytea => "BYTEA",
        }
    }

    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            TypeClass::Smallint | TypeClass::Integer | TypeClass::Bigint | TypeClass::UBigint
        )
    }

    pub const fn is_float(self) -> bool {
        matches!(self, TypeClass::Real | TypeClass::Double)
    }

    pub const fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Rank used to pick the wider class when both directions of a cast exist.
    ///
    /// Text ranks below every numeric class so that `integer = '42'` compares as
    /// integers rather than as strings.
    pub const fn strength(self) -> u8 {
        match self {
            TypeClass::Bytea => 0,
            TypeClass::Text => 1,
            TypeClass::Bool => 2,
            TypeClass::Smallint => 3,
            TypeClass::Integer => 4,
            TypeClass::Bigint => 5,
            TypeClass::UBigint => 6,
            TypeClass::Real => 7,
            TypeClass::Double => 8,
        }
    }
}

impl fmt::Display for TypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeClass::Bool => "boolean",
            TypeClass::Smallint => "smallint",
            TypeClass::Integer => "integer",
            TypeClass::Bigint => "bigint",
            TypeClass::UBigint => "bigint unsigned",
            TypeClass::Real => "real",
            TypeClass::Double => "double precision",
            TypeClass::Text => "text",
            TypeClass::Bytea => "bytea",
        };
        write!(f, "{}", name)
    }
}

/// A column's declared type: class plus nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInstance {
    pub class: TypeClass,
    pub nullable: bool,
}

impl TypeInstance {
    /// Nullable instance of `class`.
    pub const fn new(class: TypeClass) -> Self {
        Self {
            class,
            nullable: true,
        }
    }

    pub const fn not_null(class: TypeClass) -> Self {
        Self {
            class,
            nullable: false,
        }
    }

    pub const fn with_nullable(self, nullable: bool) -> Self {
        Self {
            class: self.class,
            nullable,
        }
    }
}

impl From<TypeClass> for TypeInstance {
    fn from(class: TypeClass) -> Self {
        TypeInstance::new(class)
    }
}

impl fmt::Display for TypeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}", self.class)
        } else {
            write!(f, "{} NOT NULL", self.class)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_predicates() {
        assert!(TypeClass::UBigint.is_integer());
        assert!(TypeClass::Real.is_numeric());
        assert!(!TypeClass::Real.is_integer());
        assert!(!TypeClass::Text.is_numeric());
    }

    #[test]
    fn test_instance_display() {
        assert_eq!(TypeInstance::new(TypeClass::Integer).to_string(), "integer");
        assert_eq!(
            TypeInstance::not_null(TypeClass::Text).to_string(),
            "text NOT NULL"
        );
    }

    #[test]
    fn test_strength_orders_numeric_widening() {
        assert!(TypeClass::Smallint.strength() < TypeClass::Integer.strength());
        assert!(TypeClass::Bigint.strength() < TypeClass::Double.strength());
        assert!(TypeClass::Text.strength() < TypeClass::Bool.strength());
    }
}
