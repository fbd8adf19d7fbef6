//! Scalar expressions evaluated against a row, the active bindings and the
//! query context.
//!
//! Expressions are built by the planner (or by [`Expr::compose`], which inserts
//! casts for mixed-type operands) and are immutable; operators share them by
//! `Arc`. Evaluation is pure except for casts, which honor the context's cast
//! error mode.

use std::fmt;

use crate::bindings::QueryBindings;
use crate::context::QueryContext;
use crate::error::{QueryError, Result, ValueError};
use crate::row::Row;
use crate::types::{
    integer_from_i128, CastRegistry, Constness, PreptimeValue, TypeClass, TypeInstance, Value,
};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    /// Bitwise complement of the 64-bit value, as an unsigned bigint.
    BitNot,
    /// Number of set bits in the 64-bit two's-complement value.
    BitCount,
}

/// Scalar expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Column of the row being evaluated.
    Column { index: usize, ty: TypeInstance },
    /// Parameter value from the active bindings.
    Param { index: usize, ty: TypeInstance },
    /// Column of an outer row bound in the active bindings.
    OuterField {
        binding: usize,
        field: usize,
        ty: TypeInstance,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Cast { expr: Box<Expr>, target: TypeInstance },
    IsNull { expr: Box<Expr>, negated: bool },
}

/// Everything an expression may read while being evaluated.
#[derive(Clone, Copy)]
pub struct EvalScope<'a> {
    pub context: &'a QueryContext,
    pub bindings: &'a QueryBindings,
    pub row: Option<&'a dyn Row>,
}

impl<'a> EvalScope<'a> {
    pub fn new(context: &'a QueryContext, bindings: &'a QueryBindings) -> Self {
        Self {
            context,
            bindings,
            row: None,
        }
    }

    pub fn with_row(self, row: &'a dyn Row) -> Self {
        Self {
            row: Some(row),
            ..self
        }
    }
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn column(index: usize, ty: impl Into<TypeInstance>) -> Self {
        Expr::Column {
            index,
            ty: ty.into(),
        }
    }

    pub fn param(index: usize, ty: impl Into<TypeInstance>) -> Self {
        Expr::Param {
            index,
            ty: ty.into(),
        }
    }

    pub fn outer_field(binding: usize, field: usize, ty: impl Into<TypeInstance>) -> Self {
        Expr::OuterField {
            binding,
            field,
            ty: ty.into(),
        }
    }

    /// Binary expression without operand coercion. See [`Expr::compose`].
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn cast(expr: Expr, target: impl Into<TypeInstance>) -> Self {
        Expr::Cast {
            expr: Box::new(expr),
            target: target.into(),
        }
    }

    pub fn is_null(expr: Expr, negated: bool) -> Self {
        Expr::IsNull {
            expr: Box::new(expr),
            negated,
        }
    }

    /// Builds a binary expression, coercing mixed-type operands to their common
    /// type and folding the result if both operands are literals.
    ///
    /// Literal operands are converted in place rather than wrapped in a cast.
    /// Folding that fails (e.g. `1 / 0`) leaves the expression unfolded so the
    /// error is raised per row at execution time.
    pub fn compose(op: BinaryOp, left: Expr, right: Expr, registry: &CastRegistry) -> Result<Expr> {
        let (left, right) = match (left.ty(), right.ty()) {
            (Some(l), Some(r)) if !op.is_logical() && l.class != r.class => {
                let common = registry
                    .common_type(&left.preptime(l), &right.preptime(r))
                    .ok_or_else(|| {
                        QueryError::configuration(format!(
                            "no common type for {} {} {}",
                            l,
                            op.symbol(),
                            r
                        ))
                    })?;
                (
                    left.coerce_to(common, registry),
                    right.coerce_to(common, registry),
                )
            }
            _ => (left, right),
        };
        if let (Expr::Literal(l), Expr::Literal(r)) = (&left, &right) {
            if let Ok(value) = eval_binary(op, l, r) {
                return Ok(Expr::Literal(value));
            }
        }
        Ok(Expr::binary(op, left, right))
    }

    /// Converts this expression to `target`, folding constant casts of literals.
    pub fn coerce_to(self, target: TypeInstance, registry: &CastRegistry) -> Expr {
        let Some(ty) = self.ty() else {
            return self;
        };
        if ty.class == target.class {
            return self;
        }
        if let Expr::Literal(value) = &self {
            let foldable = registry
                .cast(ty.class, target.class)
                .is_some_and(|cast| cast.constness() == Constness::Const);
            if foldable {
                if let Ok(converted) = registry.convert(value, target.class) {
                    return Expr::Literal(converted);
                }
            }
        }
        Expr::cast(self, target)
    }

    fn preptime(&self, ty: TypeInstance) -> PreptimeValue {
        match self {
            Expr::Literal(value) => PreptimeValue::constant(value.clone(), ty),
            _ => PreptimeValue::new(ty),
        }
    }

    /// Static result type; `None` for an untyped NULL literal.
    pub fn ty(&self) -> Option<TypeInstance> {
        match self {
            Expr::Literal(value) => value.type_class().map(TypeInstance::not_null),
            Expr::Column { ty, .. } | Expr::Param { ty, .. } | Expr::OuterField { ty, .. } => {
                Some(*ty)
            }
            Expr::Binary { op, left, right } => {
                let (l, r) = (left.ty(), right.ty());
                let nullable = l.map_or(true, |t| t.nullable) || r.map_or(true, |t| t.nullable);
                if op.is_arithmetic() {
                    let class = match (l, r) {
                        (Some(l), Some(r)) => arithmetic_class(l.class, r.class)?,
                        (Some(t), None) | (None, Some(t)) => t.class,
                        (None, None) => return None,
                    };
                    Some(TypeInstance { class, nullable })
                } else {
                    Some(TypeInstance {
                        class: TypeClass::Bool,
                        nullable,
                    })
                }
            }
            Expr::Unary { op, operand } => {
                let nullable = operand.ty().map_or(true, |t| t.nullable);
                let class = match op {
                    UnaryOp::Neg => return operand.ty(),
                    UnaryOp::Not => TypeClass::Bool,
                    UnaryOp::BitNot => TypeClass::UBigint,
                    UnaryOp::BitCount => TypeClass::Bigint,
                };
                Some(TypeInstance { class, nullable })
            }
            Expr::Cast { target, .. } => Some(*target),
            Expr::IsNull { .. } => Some(TypeInstance::not_null(TypeClass::Bool)),
        }
    }

    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Literal(_) => true,
            Expr::Column { .. } | Expr::Param { .. } | Expr::OuterField { .. } => false,
            Expr::Binary { left, right, .. } => left.is_constant() && right.is_constant(),
            Expr::Unary { operand, .. } => operand.is_constant(),
            Expr::Cast { expr, .. } | Expr::IsNull { expr, .. } => expr.is_constant(),
        }
    }

    pub fn evaluate(&self, scope: &EvalScope<'_>) -> Result<Value> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),

            Expr::Column { index, .. } => match scope.row {
                Some(row) => Ok(row.value(*index)?.clone()),
                None => Err(QueryError::configuration(format!(
                    "column #{} referenced outside of a row",
                    index
                ))),
            },

            Expr::Param { index, .. } => scope
                .bindings
                .value(*index)
                .cloned()
                .ok_or_else(|| ValueError::UnboundParameter { index: *index }.into()),

            Expr::OuterField { binding, field, .. } => match scope.bindings.row(*binding) {
                Some(row) => Ok(row.value(*field)?.clone()),
                None => Err(ValueError::UnboundParameter { index: *binding }.into()),
            },

            Expr::Binary { op, left, right } => {
                let l = left.evaluate(scope)?;
                let r = right.evaluate(scope)?;
                Ok(eval_binary(*op, &l, &r)?)
            }

            Expr::Unary { op, operand } => {
                let v = operand.evaluate(scope)?;
                eval_unary(*op, &v, scope.context)
            }

            Expr::Cast { expr, target } => {
                let v = expr.evaluate(scope)?;
                scope.context.cast(&v, target.class)
            }

            Expr::IsNull { expr, negated } => {
                let is_null = expr.evaluate(scope)?.is_null();
                Ok(Value::Boolean(is_null != *negated))
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Column { index, .. } => write!(f, "#{}", index),
            Expr::Param { index, .. } => write!(f, "${}", index),
            Expr::OuterField { binding, field, .. } => write!(f, "outer[{}].#{}", binding, field),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Unary { op, operand } => match op {
                UnaryOp::Neg => write!(f, "-{}", operand),
                UnaryOp::Not => write!(f, "NOT {}", operand),
                UnaryOp::BitNot => write!(f, "~{}", operand),
                UnaryOp::BitCount => write!(f, "BIT_COUNT({})", operand),
            },
            Expr::Cast { expr, target } => write!(f, "CAST({} AS {})", expr, target.class),
            Expr::IsNull { expr, negated } => {
                if *negated {
                    write!(f, "{} IS NOT NULL", expr)
                } else {
                    write!(f, "{} IS NULL", expr)
                }
            }
        }
    }
}

/// Result class of an arithmetic operation on two numeric classes.
fn arithmetic_class(a: TypeClass, b: TypeClass) -> Option<TypeClass> {
    if !a.is_numeric() || !b.is_numeric() {
        return None;
    }
    if a == b {
        Some(a)
    } else if a.is_integer() && b.is_integer() {
        Some(if a.strength() >= b.strength() { a } else { b })
    } else {
        Some(TypeClass::Double)
    }
}

fn type_name(value: &Value) -> String {
    value
        .type_class()
        .map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

fn as_bool(value: &Value) -> Result<Option<bool>, ValueError> {
    match value {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        other => Err(ValueError::type_mismatch("boolean", type_name(other))),
    }
}

/// Evaluates a binary operator on two values. Pure; used for folding too.
pub(crate) fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ValueError> {
    match op {
        BinaryOp::And => {
            return Ok(match (as_bool(left)?, as_bool(right)?) {
                (Some(false), _) | (_, Some(false)) => Value::Boolean(false),
                (Some(true), Some(true)) => Value::Boolean(true),
                _ => Value::Null,
            });
        }
        BinaryOp::Or => {
            return Ok(match (as_bool(left)?, as_bool(right)?) {
                (Some(true), _) | (_, Some(true)) => Value::Boolean(true),
                (Some(false), Some(false)) => Value::Boolean(false),
                _ => Value::Null,
            });
        }
        _ => {}
    }

    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    if op.is_arithmetic() {
        return eval_arithmetic(op, left, right);
    }

    let ordering = left
        .compare(right)
        .ok_or_else(|| ValueError::type_mismatch(type_name(left), type_name(right)))?;
    let result = match op {
        BinaryOp::Eq => ordering.is_eq(),
        BinaryOp::NotEq => ordering.is_ne(),
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::LtEq => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::GtEq => ordering.is_ge(),
        _ => unreachable!("arithmetic and logical operators handled above"),
    };
    Ok(Value::Boolean(result))
}

fn eval_arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ValueError> {
    let (lc, rc) = match (left.type_class(), right.type_class()) {
        (Some(l), Some(r)) => (l, r),
        _ => return Ok(Value::Null),
    };
    let class = arithmetic_class(lc, rc)
        .ok_or_else(|| ValueError::type_mismatch(lc.to_string(), rc.to_string()))?;
    let overflow = ValueError::Overflow {
        type_name: class.display_name(),
    };

    if class.is_integer() {
        let (a, b) = match (left.as_i128(), right.as_i128()) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(ValueError::type_mismatch(lc.to_string(), rc.to_string())),
        };
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div | BinaryOp::Mod if b == 0 => return Err(ValueError::DivisionByZero),
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Mod => a.checked_rem(b),
            _ => unreachable!("non-arithmetic operator"),
        };
        return result
            .and_then(|n| integer_from_i128(n, class))
            .ok_or(overflow);
    }

    let (a, b) = match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Err(ValueError::type_mismatch(lc.to_string(), rc.to_string())),
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Mod if b == 0.0 => return Err(ValueError::DivisionByZero),
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => unreachable!("non-arithmetic operator"),
    };
    if a.is_finite() && b.is_finite() && !result.is_finite() {
        return Err(overflow);
    }
    Ok(match class {
        TypeClass::Real => Value::Real(result as f32),
        _ => Value::Double(result),
    })
}

fn eval_unary(op: UnaryOp, value: &Value, context: &QueryContext) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match op {
        UnaryOp::Neg => {
            let negated = match value {
                Value::Real(n) => Some(Value::Real(-n)),
                Value::Double(n) => Some(Value::Double(-n)),
                other => match (other.type_class(), other.as_i128()) {
                    (Some(class), Some(n)) => integer_from_i128(-n, class),
                    _ => {
                        return Err(ValueError::type_mismatch("numeric", type_name(other)).into())
                    }
                },
            };
            negated.ok_or_else(|| {
                ValueError::Overflow {
                    type_name: value.type_class().map_or("numeric", |c| c.display_name()),
                }
                .into()
            })
        }
        UnaryOp::Not => match as_bool(value)? {
            Some(b) => Ok(Value::Boolean(!b)),
            None => Ok(Value::Null),
        },
        UnaryOp::BitNot | UnaryOp::BitCount => {
            let bits = bits_of(value, context)?;
            Ok(match op {
                UnaryOp::BitNot => Value::UBigint(!bits),
                _ => Value::Bigint(i64::from(bits.count_ones())),
            })
        }
    }
}

/// 64-bit pattern of a value for the bit operators.
///
/// Floats round half away from zero. Unconvertible operands count as 0 unless
/// cast errors are fatal.
fn bits_of(value: &Value, context: &QueryContext) -> Result<u64> {
    let rounded;
    let value = match value {
        Value::UBigint(n) => return Ok(*n),
        Value::Real(_) | Value::Double(_) => {
            rounded = Value::Double(value.as_f64().unwrap_or(f64::NAN).round());
            &rounded
        }
        other => other,
    };
    match context.registry().convert(value, TypeClass::Bigint) {
        Ok(Value::Bigint(n)) => Ok(n as u64),
        Ok(_) => Ok(0),
        Err(e) => {
            context.recover_cast(e)?;
            Ok(0)
        }
    }
}
