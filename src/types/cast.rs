//! Casts between type classes.

use std::fmt;

use crate::error::CastError;

use super::class::{TypeClass, TypeInstance};
use super::value::Value;

/// Whether a cast's result depends only on its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constness {
    /// Same input, same output; constant operands may be folded.
    Const,
    /// Must be evaluated per row.
    NotConst,
}

/// What is known about an operand before execution: its declared type and,
/// for literals, its value.
#[derive(Debug, Clone, PartialEq)]
pub struct PreptimeValue {
    pub instance: TypeInstance,
    pub constant: Option<Value>,
}

impl PreptimeValue {
    pub fn new(instance: TypeInstance) -> Self {
        Self {
            instance,
            constant: None,
        }
    }

    pub fn constant(value: Value, instance: TypeInstance) -> Self {
        Self {
            instance,
            constant: Some(value),
        }
    }

    /// A known non-null constant can never produce NULL.
    pub fn is_nullable(&self) -> bool {
        match &self.constant {
            Some(value) => value.is_null(),
            None => self.instance.nullable,
        }
    }
}

/// A registered conversion from one type class to another.
pub trait Cast: Send + Sync + fmt::Debug {
    fn source_class(&self) -> TypeClass;

    fn target_class(&self) -> TypeClass;

    fn constness(&self) -> Constness {
        Constness::Const
    }

    /// Type instance this cast produces for the given source.
    fn preferred_target(&self, source: &PreptimeValue) -> TypeInstance {
        TypeInstance {
            class: self.target_class(),
            nullable: source.is_nullable(),
        }
    }

    /// Converts a non-null value of the source class.
    fn evaluate(&self, source: &Value) -> Result<Value, CastError>;
}

/// Cast between two built-in classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardCast {
    from: TypeClass,
    to: TypeClass,
}

impl StandardCast {
    /// Returns `None` when the built-in conversions do not cover the pair.
    pub fn new(from: TypeClass, to: TypeClass) -> Option<Self> {
        if from != to && is_supported(from, to) {
            Some(Self { from, to })
        } else {
            None
        }
    }
}

impl Cast for StandardCast {
    fn source_class(&self) -> TypeClass {
        self.from
    }

    fn target_class(&self) -> TypeClass {
        self.to
    }

    fn evaluate(&self, source: &Value) -> Result<Value, CastError> {
        convert(source, self.to)
    }
}

fn is_supported(from: TypeClass, to: TypeClass) -> bool {
    use TypeClass::*;
    match (from, to) {
        (_, Text) => true,
        (Text, _) => true,
        (Bool, t) | (t, Bool) => t.is_integer(),
        (a, b) => a.is_numeric() && b.is_numeric(),
    }
}

fn unsupported(value: &Value, to: TypeClass) -> CastError {
    CastError::Unsupported {
        from: value.type_class().unwrap_or(to),
        to,
    }
}

fn out_of_range(value: &Value, target: TypeClass) -> CastError {
    CastError::OutOfRange {
        value: value.to_text(),
        target,
    }
}

fn malformed(text: &str, target: TypeClass) -> CastError {
    CastError::Malformed {
        text: text.to_string(),
        target,
    }
}

/// Narrows an exact integer into an integer class, failing when it does not fit.
pub(crate) fn integer_from_i128(n: i128, target: TypeClass) -> Option<Value> {
    match target {
        TypeClass::Smallint => i16::try_from(n).ok().map(Value::Smallint),
        TypeClass::Integer => i32::try_from(n).ok().map(Value::Integer),
        TypeClass::Bigint => i64::try_from(n).ok().map(Value::Bigint),
        TypeClass::UBigint => u64::try_from(n).ok().map(Value::UBigint),
        _ => None,
    }
}

fn convert(value: &Value, target: TypeClass) -> Result<Value, CastError> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    if value.type_class() == Some(target) {
        return Ok(value.clone());
    }
    match target {
        TypeClass::Text => Ok(Value::Text(value.to_text())),
        TypeClass::Bool => match value {
            Value::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" | "on" => Ok(Value::Boolean(true)),
                "false" | "f" | "no" | "n" | "0" | "off" => Ok(Value::Boolean(false)),
                _ => Err(malformed(s, target)),
            },
            other => match other.as_i128() {
                Some(n) => Ok(Value::Boolean(n != 0)),
                None => Err(unsupported(other, target)),
            },
        },
        t if t.is_integer() => match value {
            Value::Boolean(b) => Ok(integer_from_i128(i128::from(*b), t)
                .unwrap_or(Value::Null)),
            Value::Text(s) => {
                let n = s
                    .trim()
                    .parse::<i128>()
                    .map_err(|_| malformed(s, target))?;
                integer_from_i128(n, t).ok_or_else(|| out_of_range(value, target))
            }
            Value::Real(_) | Value::Double(_) => {
                let f = value.as_f64().unwrap_or(f64::NAN);
                if !f.is_finite() {
                    return Err(out_of_range(value, target));
                }
                // Truncation toward zero; `as` saturates beyond the i128 range.
                integer_from_i128(f.trunc() as i128, t).ok_or_else(|| out_of_range(value, target))
            }
            other => match other.as_i128() {
                Some(n) => integer_from_i128(n, t).ok_or_else(|| out_of_range(value, target)),
                None => Err(unsupported(other, target)),
            },
        },
        TypeClass::Real | TypeClass::Double => {
            let f = match value {
                Value::Text(s) => s.trim().parse::<f64>().map_err(|_| malformed(s, target))?,
                other => other.as_f64().ok_or_else(|| unsupported(other, target))?,
            };
            if target == TypeClass::Double {
                return Ok(Value::Double(f));
            }
            let narrowed = f as f32;
            if f.is_finite() && narrowed.is_infinite() {
                Err(out_of_range(value, target))
            } else {
                Ok(Value::Real(narrowed))
            }
        }
        TypeClass::Bytea => match value {
            Value::Text(s) => Ok(Value::Bytea(s.as_bytes().to_vec())),
            other => Err(unsupported(other, target)),
        },
        _ => Err(unsupported(value, target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cast(from: TypeClass, to: TypeClass) -> StandardCast {
        StandardCast::new(from, to).unwrap()
    }

    #[test]
    fn test_identity_and_unknown_pairs_rejected() {
        assert!(StandardCast::new(TypeClass::Integer, TypeClass::Integer).is_none());
        assert!(StandardCast::new(TypeClass::Bytea, TypeClass::Integer).is_none());
        assert!(StandardCast::new(TypeClass::Real, TypeClass::Bool).is_none());
    }

    #[test]
    fn test_integer_narrowing_range_checked() {
        let c = cast(TypeClass::Bigint, TypeClass::Smallint);
        assert_eq!(c.evaluate(&Value::Bigint(12)).unwrap(), Value::Smallint(12));
        assert!(matches!(
            c.evaluate(&Value::Bigint(70_000)),
            Err(CastError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_float_to_integer_truncates() {
        let c = cast(TypeClass::Double, TypeClass::Integer);
        assert_eq!(c.evaluate(&Value::Double(3.9)).unwrap(), Value::Integer(3));
        assert_eq!(c.evaluate(&Value::Double(-3.9)).unwrap(), Value::Integer(-3));
        assert!(c.evaluate(&Value::Double(f64::NAN)).is_err());
    }

    #[test]
    fn test_text_parsing() {
        let c = cast(TypeClass::Text, TypeClass::Integer);
        assert_eq!(c.evaluate(&Value::Text(" 42 ".into())).unwrap(), Value::Integer(42));
        assert!(matches!(
            c.evaluate(&Value::Text("4x2".into())),
            Err(CastError::Malformed { .. })
        ));
        let b = cast(TypeClass::Text, TypeClass::Bool);
        assert_eq!(b.evaluate(&Value::Text("On".into())).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn test_negative_to_unsigned_out_of_range() {
        let c = cast(TypeClass::Bigint, TypeClass::UBigint);
        assert!(matches!(
            c.evaluate(&Value::Bigint(-1)),
            Err(CastError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_double_to_real_overflow() {
        let c = cast(TypeClass::Double, TypeClass::Real);
        assert!(c.evaluate(&Value::Double(1e300)).is_err());
        assert_eq!(c.evaluate(&Value::Double(1.5)).unwrap(), Value::Real(1.5));
    }

    #[test]
    fn test_preferred_target_follows_constant_nullability() {
        let c = cast(TypeClass::Integer, TypeClass::Bigint);
        let literal = PreptimeValue::constant(
            Value::Integer(5),
            TypeInstance::new(TypeClass::Integer),
        );
        assert_eq!(
            c.preferred_target(&literal),
            TypeInstance::not_null(TypeClass::Bigint)
        );
        let column = PreptimeValue::new(TypeInstance::new(TypeClass::Integer));
        assert!(c.preferred_target(&column).nullable);
    }
}
