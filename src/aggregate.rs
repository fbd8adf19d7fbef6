//! Aggregate functions and aggregators.
//!
//! - [`AggregatorFactory`]: creates [`Aggregator`]s for one aggregate function
//! - [`AggregateFunction`]: built-in COUNT, SUM, MIN, MAX and GROUP_CONCAT
//! - [`AggregatorSpec`]: a factory plus its configuration option, as stored in
//!   an aggregation operator
//!
//! Aggregators skip NULL inputs. `output` finishes the current group and
//! resets the aggregator for the next one.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::error::{QueryError, Result, ValueError};
use crate::types::{TypeClass, TypeInstance, Value};

/// Accumulates one aggregate over the rows of a group.
pub trait Aggregator: Send + fmt::Debug {
    fn input(&mut self, value: &Value) -> Result<(), ValueError>;

    /// Result for the group so far; resets the aggregator.
    fn output(&mut self) -> Result<Value, ValueError>;

    /// Result over an empty input (COUNT = 0, most others NULL).
    fn empty_value(&self) -> Value;

    fn reset(&mut self);
}

/// Creates aggregators for one aggregate function.
pub trait AggregatorFactory: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Output type for an input column of type `input`.
    fn output_type(&self, input: TypeInstance) -> Result<TypeInstance>;

    /// New aggregator configured with `option` (e.g. a separator string).
    fn get(&self, option: Option<&Value>) -> Result<Box<dyn Aggregator>>;
}

/// Built-in aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    /// COUNT: number of non-NULL values.
    Count,
    /// SUM: integer inputs sum to bigint, floating-point inputs to double.
    Sum,
    Min,
    Max,
    /// GROUP_CONCAT: text of all values joined by a separator (default ",").
    GroupConcat,
}

impl AggregateFunction {
    /// Resolves a function name (case-insensitive).
    ///
    /// Returns `None` for non-aggregate function names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateFunction::Count),
            "sum" => Some(AggregateFunction::Sum),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            "group_concat" => Some(AggregateFunction::GroupConcat),
            _ => None,
        }
    }

    pub fn spec(self) -> AggregatorSpec {
        AggregatorSpec::new(Arc::new(self))
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
            AggregateFunction::GroupConcat => write!(f, "GROUP_CONCAT"),
        }
    }
}

impl AggregatorFactory for AggregateFunction {
    fn name(&self) -> &str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::GroupConcat => "GROUP_CONCAT",
        }
    }

    fn output_type(&self, input: TypeInstance) -> Result<TypeInstance> {
        match self {
            AggregateFunction::Count => Ok(TypeInstance::not_null(TypeClass::Bigint)),
            AggregateFunction::Sum => {
                if input.class.is_integer() {
                    Ok(TypeInstance::new(TypeClass::Bigint))
                } else if input.class.is_float() {
                    Ok(TypeInstance::new(TypeClass::Double))
                } else {
                    Err(QueryError::configuration(format!(
                        "SUM cannot aggregate {}",
                        input.class
                    )))
                }
            }
            AggregateFunction::Min | AggregateFunction::Max => Ok(input.with_nullable(true)),
            AggregateFunction::GroupConcat => Ok(TypeInstance::new(TypeClass::Text)),
        }
    }

    fn get(&self, option: Option<&Value>) -> Result<Box<dyn Aggregator>> {
        match (self, option) {
            (AggregateFunction::GroupConcat, option) => {
                let separator = match option {
                    None => ",".to_string(),
                    Some(Value::Text(s)) => s.clone(),
                    Some(other) => {
                        return Err(QueryError::configuration(format!(
                            "GROUP_CONCAT separator must be text, got {}",
                            other
                        )))
                    }
                };
                Ok(Box::new(GroupConcatAggregator {
                    separator,
                    parts: Vec::new(),
                }))
            }
            (func, Some(option)) => Err(QueryError::configuration(format!(
                "{} takes no option, got {}",
                func, option
            ))),
            (AggregateFunction::Count, None) => Ok(Box::new(CountAggregator { count: 0 })),
            (AggregateFunction::Sum, None) => Ok(Box::new(SumAggregator { sum: Value::Null })),
            (AggregateFunction::Min, None) => Ok(Box::new(ExtremumAggregator {
                keep: Ordering::Less,
                current: Value::Null,
            })),
            (AggregateFunction::Max, None) => Ok(Box::new(ExtremumAggregator {
                keep: Ordering::Greater,
                current: Value::Null,
            })),
        }
    }
}

/// An aggregate function together with its configuration option.
#[derive(Debug, Clone)]
pub struct AggregatorSpec {
    factory: Arc<dyn AggregatorFactory>,
    option: Option<Value>,
}

impl AggregatorSpec {
    pub fn new(factory: Arc<dyn AggregatorFactory>) -> Self {
        Self {
            factory,
            option: None,
        }
    }

    pub fn with_option(mut self, option: Value) -> Self {
        self.option = Some(option);
        self
    }

    pub fn factory(&self) -> &dyn AggregatorFactory {
        self.factory.as_ref()
    }

    pub fn option(&self) -> Option<&Value> {
        self.option.as_ref()
    }

    pub fn name(&self) -> &str {
        self.factory.name()
    }

    pub fn instantiate(&self) -> Result<Box<dyn Aggregator>> {
        self.factory.get(self.option.as_ref())
    }
}

impl fmt::Display for AggregatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.option {
            Some(option) => write!(f, "{}({})", self.factory.name(), option),
            None => write!(f, "{}", self.factory.name()),
        }
    }
}

#[derive(Debug)]
struct CountAggregator {
    count: i64,
}

impl Aggregator for CountAggregator {
    fn input(&mut self, value: &Value) -> Result<(), ValueError> {
        if !value.is_null() {
            self.count += 1;
        }
        Ok(())
    }

    fn output(&mut self) -> Result<Value, ValueError> {
        let count = self.count;
        self.reset();
        Ok(Value::Bigint(count))
    }

    fn empty_value(&self) -> Value {
        Value::Bigint(0)
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Running sum as Bigint (integer inputs, checked) or Double.
#[derive(Debug)]
struct SumAggregator {
    sum: Value,
}

impl Aggregator for SumAggregator {
    fn input(&mut self, value: &Value) -> Result<(), ValueError> {
        if value.is_null() {
            return Ok(());
        }
        let overflow = ValueError::Overflow {
            type_name: TypeClass::Bigint.display_name(),
        };
        let wide = match value {
            Value::Real(_) | Value::Double(_) => Value::Double(value.as_f64().unwrap_or(0.0)),
            other => match other.as_i128() {
                Some(n) => Value::Bigint(i64::try_from(n).map_err(|_| overflow.clone())?),
                None => {
                    return Err(ValueError::type_mismatch(
                        "numeric",
                        other
                            .type_class()
                            .map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                    ))
                }
            },
        };
        self.sum = match (&self.sum, &wide) {
            (Value::Null, _) => wide,
            (Value::Bigint(a), Value::Bigint(b)) => Value::Bigint(a.checked_add(*b).ok_or(overflow)?),
            (Value::Double(a), Value::Double(b)) => Value::Double(a + b),
            (Value::Bigint(a), Value::Double(b)) => Value::Double(*a as f64 + b),
            (Value::Double(a), Value::Bigint(b)) => Value::Double(a + *b as f64),
            _ => unreachable!("running sum is always Bigint or Double"),
        };
        Ok(())
    }

    fn output(&mut self) -> Result<Value, ValueError> {
        Ok(std::mem::replace(&mut self.sum, Value::Null))
    }

    fn empty_value(&self) -> Value {
        Value::Null
    }

    fn reset(&mut self) {
        self.sum = Value::Null;
    }
}

/// MIN or MAX: keeps a new value when it compares as `keep` against the current one.
#[derive(Debug)]
struct ExtremumAggregator {
    keep: Ordering,
    current: Value,
}

impl Aggregator for ExtremumAggregator {
    fn input(&mut self, value: &Value) -> Result<(), ValueError> {
        if value.is_null() {
            return Ok(());
        }
        if self.current.is_null() {
            self.current = value.clone();
            return Ok(());
        }
        match value.compare(&self.current) {
            Some(ordering) if ordering == self.keep => self.current = value.clone(),
            Some(_) => {}
            None => {
                return Err(ValueError::type_mismatch(
                    self.current
                        .type_class()
                        .map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                    value
                        .type_class()
                        .map_or_else(|| "unknown".to_string(), |c| c.to_string()),
                ))
            }
        }
        Ok(())
    }

    fn output(&mut self) -> Result<Value, ValueError> {
        Ok(std::mem::replace(&mut self.current, Value::Null))
    }

    fn empty_value(&self) -> Value {
        Value::Null
    }

    fn reset(&mut self) {
        self.current = Value::Null;
    }
}

#[derive(Debug)]
struct GroupConcatAggregator {
    separator: String,
    parts: Vec<String>,
}

impl Aggregator for GroupConcatAggregator {
    fn input(&mut self, value: &Value) -> Result<(), ValueError> {
        if !value.is_null() {
            self.parts.push(value.to_text());
        }
        Ok(())
    }

    fn output(&mut self) -> Result<Value, ValueError> {
        if self.parts.is_empty() {
            return Ok(Value::Null);
        }
        let joined = self.parts.join(&self.separator);
        self.parts.clear();
        Ok(Value::Text(joined))
    }

    fn empty_value(&self) -> Value {
        Value::Null
    }

    fn reset(&mut self) {
        self.parts.clear();
    }
}
