//! Predicate expression AST, builder, and in-memory evaluator.
//!
//! Expressions are authored against a symbolic placeholder — "the record
//! being filtered" — through [`field`] (named field access) and [`index`]
//! (the record's ordinal position in its source). This is the only query
//! surface; there is no string DSL. Backends either compile the tree to
//! query text (the SQL compiler) or evaluate it in memory via [`eval`]
//! (collection, file, and block pipes).

use crate::error::PipeError;
use crate::record::Record;
use crate::value::Value;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// Logical conjunction.
    And,
    /// Logical disjunction.
    Or,
}

impl BinaryOp {
    /// Whether this is one of the six comparison operators.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical negation.
    Not,
}

/// Closed predicate expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value.
    Const(Value),
    /// Named field of the placeholder record.
    Field(String),
    /// Ordinal position of the placeholder record within its source.
    Index,
    /// Binary node.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Unary node.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Named call; `args[0]` is the receiver by builder convention.
    Call {
        /// Call name, e.g. `"contains"`.
        name: String,
        /// Arguments, receiver first.
        args: Vec<Expr>,
    },
}

/// Field access on the placeholder record.
#[must_use]
pub fn field(name: impl Into<String>) -> Expr {
    Expr::Field(name.into())
}

/// The placeholder record's ordinal index.
#[must_use]
pub fn index() -> Expr {
    Expr::Index
}

/// A literal value.
#[must_use]
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Const(value.into())
}

macro_rules! binary_builder {
    ($($(#[$doc:meta])* $fn_name:ident => $op:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $fn_name(self, rhs: Expr) -> Expr {
                Expr::Binary {
                    op: BinaryOp::$op,
                    lhs: Box::new(self),
                    rhs: Box::new(rhs),
                }
            }
        )*
    };
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    binary_builder! {
        /// `self + rhs`
        add => Add,
        /// `self - rhs`
        sub => Sub,
        /// `self * rhs`
        mul => Mul,
        /// `self / rhs`
        div => Div,
        /// `self % rhs`
        rem => Mod,
        /// `self = rhs`
        eq => Eq,
        /// `self <> rhs`
        ne => Ne,
        /// `self > rhs`
        gt => Gt,
        /// `self >= rhs`
        ge => Ge,
        /// `self < rhs`
        lt => Lt,
        /// `self <= rhs`
        le => Le,
        /// `self AND rhs`
        and => And,
        /// `self OR rhs`
        or => Or,
    }

    /// Arithmetic negation.
    #[must_use]
    pub fn neg(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(self),
        }
    }

    /// Logical negation.
    #[must_use]
    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(self),
        }
    }

    /// A named call with `self` as the receiver.
    #[must_use]
    pub fn call(self, name: impl Into<String>, extra: Vec<Expr>) -> Expr {
        let mut args = Vec::with_capacity(extra.len() + 1);
        args.push(self);
        args.extend(extra);
        Expr::Call {
            name: name.into(),
            args,
        }
    }

    /// `self.contains(needle)` — substring test, compiled to `LIKE` by the
    /// SQL backend.
    #[must_use]
    pub fn contains(self, needle: Expr) -> Expr {
        self.call("contains", vec![needle])
    }

    /// `self.starts_with(prefix)`.
    #[must_use]
    pub fn starts_with(self, prefix: Expr) -> Expr {
        self.call("starts_with", vec![prefix])
    }

    /// `self.ends_with(suffix)`.
    #[must_use]
    pub fn ends_with(self, suffix: Expr) -> Expr {
        self.call("ends_with", vec![suffix])
    }

    /// Human-readable node kind, used in "unsupported expression" errors.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Const(_) => "constant",
            Expr::Field(_) => "field access",
            Expr::Index => "ordinal index",
            Expr::Binary { .. } => "binary",
            Expr::Unary { .. } => "unary",
            Expr::Call { .. } => "call",
        }
    }
}

/// Whether the subtree touches the placeholder ([`Expr::Field`] or
/// [`Expr::Index`]).
///
/// Subtrees that do not can be evaluated ("folded") without a record; the
/// SQL compiler performs this check per side of every binary node.
#[must_use]
pub fn mentions_placeholder(expr: &Expr) -> bool {
    match expr {
        Expr::Const(_) => false,
        Expr::Field(_) | Expr::Index => true,
        Expr::Binary { lhs, rhs, .. } => mentions_placeholder(lhs) || mentions_placeholder(rhs),
        Expr::Unary { operand, .. } => mentions_placeholder(operand),
        Expr::Call { args, .. } => args.iter().any(mentions_placeholder),
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        #[allow(clippy::cast_precision_loss)]
        Value::Int(i) => Some(*i as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, PipeError> {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        let result = match op {
            BinaryOp::Add => a.checked_add(*b),
            BinaryOp::Sub => a.checked_sub(*b),
            BinaryOp::Mul => a.checked_mul(*b),
            BinaryOp::Div => a.checked_div(*b),
            BinaryOp::Mod => a.checked_rem(*b),
            _ => unreachable!("arithmetic called with non-arithmetic op"),
        };
        return result
            .map(Value::Int)
            .ok_or_else(|| PipeError::Internal(anyhow::anyhow!("integer arithmetic overflow")));
    }
    let (Some(a), Some(b)) = (as_f64(lhs), as_f64(rhs)) else {
        return Err(PipeError::unsupported(format!(
            "arithmetic on {} and {}",
            lhs.kind(),
            rhs.kind()
        )));
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => unreachable!("arithmetic called with non-arithmetic op"),
    };
    Ok(Value::Float(result))
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Text(a), Value::Text(b)) => a == b,
        _ => match (as_f64(lhs), as_f64(rhs)) {
            #[allow(clippy::float_cmp)]
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, PipeError> {
    if matches!(op, BinaryOp::Eq) {
        return Ok(Value::Bool(values_equal(lhs, rhs)));
    }
    if matches!(op, BinaryOp::Ne) {
        return Ok(Value::Bool(!values_equal(lhs, rhs)));
    }
    let ordering = match (lhs, rhs) {
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        _ => {
            let (Some(a), Some(b)) = (as_f64(lhs), as_f64(rhs)) else {
                return Err(PipeError::unsupported(format!(
                    "ordering comparison on {} and {}",
                    lhs.kind(),
                    rhs.kind()
                )));
            };
            a.partial_cmp(&b).ok_or_else(|| {
                PipeError::unsupported("ordering comparison involving NaN".to_string())
            })?
        }
    };
    let result = match op {
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::Ge => ordering.is_ge(),
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        _ => unreachable!("compare called with non-comparison op"),
    };
    Ok(Value::Bool(result))
}

fn expect_bool(value: Value, context: &str) -> Result<bool, PipeError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(PipeError::unsupported(format!(
            "{context} requires a boolean, found {}",
            other.kind()
        ))),
    }
}

fn expect_text(value: Value, context: &str) -> Result<String, PipeError> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(PipeError::unsupported(format!(
            "{context} requires text, found {}",
            other.kind()
        ))),
    }
}

fn eval_call(
    name: &str,
    args: &[Expr],
    record: Option<&Record>,
    index: Option<usize>,
) -> Result<Value, PipeError> {
    match name {
        "contains" | "starts_with" | "ends_with" => {
            if args.len() != 2 {
                return Err(PipeError::unsupported(format!(
                    "call '{name}' expects a receiver and one argument"
                )));
            }
            let target = eval(&args[0], record, index)?;
            if target.is_null() {
                return Ok(Value::Bool(false));
            }
            let target = expect_text(target, name)?;
            let needle = expect_text(eval(&args[1], record, index)?, name)?;
            let result = match name {
                "contains" => target.contains(&needle),
                "starts_with" => target.starts_with(&needle),
                _ => target.ends_with(&needle),
            };
            Ok(Value::Bool(result))
        }
        other => Err(PipeError::unsupported(format!("call '{other}'"))),
    }
}

/// Evaluates an expression in memory.
///
/// `record` materializes [`Expr::Field`] access and `index` materializes
/// [`Expr::Index`]; both may be `None` when the expression has been checked
/// with [`mentions_placeholder`] first (the compiler's fold path).
///
/// # Errors
///
/// [`PipeError::KeyNotFound`] for a field the record lacks;
/// [`PipeError::Unsupported`] for kind mismatches, unknown calls, or
/// placeholder access without a record/index.
pub fn eval(expr: &Expr, record: Option<&Record>, index: Option<usize>) -> Result<Value, PipeError> {
    match expr {
        Expr::Const(value) => Ok(value.clone()),
        Expr::Field(name) => record
            .ok_or_else(|| PipeError::unsupported("field access outside a record context"))?
            .get(name),
        Expr::Index => index
            .map(|i| Value::Int(i64::try_from(i).unwrap_or(i64::MAX)))
            .ok_or_else(|| PipeError::unsupported("ordinal index outside a record context")),
        Expr::Binary { op, lhs, rhs } => match op {
            BinaryOp::And => {
                if !expect_bool(eval(lhs, record, index)?, "AND")? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(expect_bool(eval(rhs, record, index)?, "AND")?))
            }
            BinaryOp::Or => {
                if expect_bool(eval(lhs, record, index)?, "OR")? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(expect_bool(eval(rhs, record, index)?, "OR")?))
            }
            op if op.is_comparison() => {
                compare(*op, &eval(lhs, record, index)?, &eval(rhs, record, index)?)
            }
            op => arithmetic(*op, &eval(lhs, record, index)?, &eval(rhs, record, index)?),
        },
        Expr::Unary { op, operand } => {
            let value = eval(operand, record, index)?;
            match op {
                UnaryOp::Neg => match value {
                    Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(|| {
                        PipeError::Internal(anyhow::anyhow!("integer arithmetic overflow"))
                    }),
                    Value::Float(x) => Ok(Value::Float(-x)),
                    other => Err(PipeError::unsupported(format!(
                        "negation of {}",
                        other.kind()
                    ))),
                },
                UnaryOp::Not => Ok(Value::Bool(!expect_bool(value, "NOT")?)),
            }
        }
        Expr::Call { name, args } => eval_call(name, args, record, index),
    }
}
