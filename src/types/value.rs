//! Column values.

use std::cmp::Ordering;
use std::fmt;

use super::class::TypeClass;

/// A typed column value.
///
/// Variable-length types (Text, Bytea) are heap-allocated.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL (type is unknown/any).
    Null,
    Boolean(bool),
    Smallint(i16),
    Integer(i32),
    Bigint(i64),
    UBigint(u64),
    Real(f32),
    Double(f64),
    Text(String),
    Bytea(Vec<u8>),
}

impl Value {
    /// Returns the class of this value, or `None` for Null.
    pub fn type_class(&self) -> Option<TypeClass> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(TypeClass::Bool),
            Value::Smallint(_) => Some(TypeClass::Smallint),
            Value::Integer(_) => Some(TypeClass::Integer),
            Value::Bigint(_) => Some(TypeClass::Bigint),
            Value::UBigint(_) => Some(TypeClass::UBigint),
            Value::Real(_) => Some(TypeClass::Real),
            Value::Double(_) => Some(TypeClass::Double),
            Value::Text(_) => Some(TypeClass::Text),
            Value::Bytea(_) => Some(TypeClass::Bytea),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True only for `Boolean(true)`; NULL and FALSE are both "not true".
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Boolean(true))
    }

    /// Integer payload widened to `i128`, for any integer class.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Smallint(n) => Some(*n as i128),
            Value::Integer(n) => Some(*n as i128),
            Value::Bigint(n) => Some(*n as i128),
            Value::UBigint(n) => Some(*n as i128),
            _ => None,
        }
    }

    /// Numeric payload as `f64`, for any numeric class.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            other => other.as_i128().map(|n| n as f64),
        }
    }

    /// Compares two non-null values.
    ///
    /// Integers compare exactly across integer classes; mixed integer/float
    /// comparisons go through `f64`. Returns `None` when either side is NULL or
    /// the classes are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Bytea(a), Value::Bytea(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_i128(), b.as_i128()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                _ => match (a.as_f64(), b.as_f64()) {
                    // -0.0 equals 0.0; NaN falls back to the total order
                    (Some(x), Some(y)) => {
                        Some(x.partial_cmp(&y).unwrap_or_else(|| x.total_cmp(&y)))
                    }
                    _ => None,
                },
            },
        }
    }

    /// Equality with GROUP BY semantics: NULL equals NULL and NaN equals NaN.
    pub fn group_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (a, b) => {
                if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                    if x.is_nan() && y.is_nan() {
                        return true;
                    }
                }
                a.compare(b) == Some(Ordering::Equal)
            }
        }
    }

    /// Converts this value to its text representation.
    ///
    /// Booleans render as `"t"`/`"f"`, bytea as hex with a `"\\x"` prefix and
    /// floats via [`format_float()`].
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => (if *b { "t" } else { "f" }).to_string(),
            Value::Smallint(n) => n.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Bigint(n) => n.to_string(),
            Value::UBigint(n) => n.to_string(),
            Value::Real(n) => format_float(*n as f64),
            Value::Double(n) => format_float(*n),
            Value::Text(s) => s.clone(),
            Value::Bytea(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02x}", byte)).collect();
                format!("\\x{}", hex)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Text(s) => write!(f, "'{}'", s),
            other => write!(f, "{}", other.to_text()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Bigint(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// Formats a float value with `Infinity`/`-Infinity`/`NaN` spelled out.
fn format_float(n: f64) -> String {
    if n.is_infinite() {
        if n.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n.is_nan() {
        "NaN".to_string()
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_across_integer_classes() {
        assert_eq!(
            Value::Smallint(3).compare(&Value::Bigint(3)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::UBigint(u64::MAX).compare(&Value::Bigint(-1)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_compare_mixed_numeric() {
        assert_eq!(
            Value::Integer(2).compare(&Value::Double(2.5)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_compare_null_is_unknown() {
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert_eq!(Value::Text("a".into()).compare(&Value::Integer(1)), None);
    }

    #[test]
    fn test_group_eq_null_and_nan() {
        assert!(Value::Null.group_eq(&Value::Null));
        assert!(!Value::Null.group_eq(&Value::Integer(0)));
        assert!(Value::Double(f64::NAN).group_eq(&Value::Double(f64::NAN)));
        assert!(Value::Integer(7).group_eq(&Value::Bigint(7)));
    }

    #[test]
    fn test_signed_zero_is_equal() {
        assert_eq!(
            Value::Double(0.0).compare(&Value::Double(-0.0)),
            Some(Ordering::Equal)
        );
        assert!(Value::Double(-0.0).group_eq(&Value::Double(0.0)));
        assert!(Value::Real(-0.0).group_eq(&Value::Double(0.0)));
        assert_eq!(
            Value::Double(f64::NAN).compare(&Value::Double(1.0)),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::Boolean(true).to_text(), "t");
        assert_eq!(Value::Double(f64::NEG_INFINITY).to_text(), "-Infinity");
        assert_eq!(Value::Bytea(vec![0xde, 0xad]).to_text(), "\\xdead");
        assert_eq!(Value::UBigint(u64::MAX).to_text(), "18446744073709551615");
    }
}
