//! Predicate compiler: lowers an expression tree into SQL text.
//!
//! The compiler folds every placeholder-free subtree to a literal
//! immediately (checked per side of every binary node), and decides bracket
//! insertion with a three-class operator-precedence table. Method calls
//! consult a backend-supplied special-call registry before falling back to
//! fold-or-fail; anything without a rule raises a typed "unsupported
//! expression" error naming the node kind — never a silent approximation.

use std::collections::HashMap;
use std::sync::Arc;

use datapipe_core::expr::{eval, mentions_placeholder, BinaryOp, Expr, UnaryOp};
use datapipe_core::{PipeError, Value};

/// Renderer for one registered call name.
///
/// Receives the call's arguments (receiver first) and the compiler, so the
/// renderer can recursively compile sub-expressions.
pub type SpecialCall =
    Arc<dyn Fn(&[Expr], &SqlCompiler) -> Result<String, PipeError> + Send + Sync>;

/// Precedence class used by the bracket-insertion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Priority {
    /// `* / % AND` — binds tightly; children from the `Other` class need
    /// brackets underneath it.
    High,
    /// The six comparisons. SQL comparison binds most loosely here and
    /// never needs parens around its operands, so these suppress
    /// bracketing anywhere in the chain.
    Unchanged,
    /// `+ - OR`.
    Other,
}

fn priority(op: BinaryOp) -> Priority {
    match op {
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::And => Priority::High,
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Lt | BinaryOp::Le => {
            Priority::Unchanged
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Or => Priority::Other,
    }
}

fn op_text(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Eq => "=",
        BinaryOp::Ne => "<>",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::And => "AND",
        BinaryOp::Or => "OR",
    }
}

/// Renders a value as a SQL literal. Strings quote with `''` doubling;
/// non-finite floats have no bare SQL literal and render as the quoted
/// Postgres spellings.
#[must_use]
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(x) if x.is_finite() => x.to_string(),
        Value::Float(x) if x.is_nan() => "'NaN'::float8".to_string(),
        Value::Float(x) if *x > 0.0 => "'Infinity'::float8".to_string(),
        Value::Float(_) => "'-Infinity'::float8".to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

/// Escapes a `LIKE` pattern fragment; the emitted pattern uses `ESCAPE '\'`.
fn escape_like(fragment: &str) -> String {
    fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
        .replace('\'', "''")
}

fn like_special(wrap: fn(&str) -> String) -> SpecialCall {
    Arc::new(move |args: &[Expr], compiler: &SqlCompiler| {
        if args.len() != 2 {
            return Err(PipeError::unsupported(
                "LIKE-mapped call expects a receiver and one argument",
            ));
        }
        let target = compiler.compile(&args[0])?;
        let needle = match fold(&args[1])? {
            Some(Value::Text(s)) => s,
            Some(other) => {
                return Err(PipeError::unsupported(format!(
                    "LIKE-mapped call needs a text argument, found {}",
                    other.kind()
                )));
            }
            None => {
                return Err(PipeError::unsupported(
                    "LIKE-mapped call argument must not reference the record",
                ));
            }
        };
        Ok(format!(
            "{target} LIKE '{}' ESCAPE '\\'",
            wrap(&escape_like(&needle))
        ))
    })
}

/// Evaluates a subtree to a [`Value`] iff it never touches the placeholder.
fn fold(expr: &Expr) -> Result<Option<Value>, PipeError> {
    if mentions_placeholder(expr) {
        Ok(None)
    } else {
        eval(expr, None, None).map(Some)
    }
}

/// Translates predicate expressions into SQL text.
///
/// The special-call registry is the designed extension point for
/// vendor-specific functions; [`SqlCompiler::new`] pre-registers the
/// `contains` / `starts_with` / `ends_with` family onto `LIKE`.
pub struct SqlCompiler {
    specials: HashMap<String, SpecialCall>,
}

impl SqlCompiler {
    /// A compiler with the default `LIKE` call family registered.
    #[must_use]
    pub fn new() -> Self {
        let mut compiler = Self {
            specials: HashMap::new(),
        };
        compiler.register("contains", like_special(|s| format!("%{s}%")));
        compiler.register("starts_with", like_special(|s| format!("{s}%")));
        compiler.register("ends_with", like_special(|s| format!("%{s}")));
        compiler
    }

    /// Registers (or replaces) a special-call renderer.
    pub fn register(&mut self, name: impl Into<String>, renderer: SpecialCall) {
        self.specials.insert(name.into(), renderer);
    }

    /// Compiles an expression to SQL text.
    ///
    /// # Errors
    ///
    /// [`PipeError::Unsupported`] for node kinds with no rule, unknown
    /// calls, and [`Expr::Index`] (the ordinal has no relational meaning).
    pub fn compile(&self, expr: &Expr) -> Result<String, PipeError> {
        if let Some(value) = fold(expr)? {
            return Ok(sql_literal(&value));
        }
        match expr {
            Expr::Const(value) => Ok(sql_literal(value)),
            Expr::Field(name) => Ok(name.clone()),
            Expr::Index => Err(PipeError::unsupported(
                "ordinal index in a relational predicate",
            )),
            Expr::Binary { op, lhs, rhs } => {
                let lhs_text = self.compile_side(*op, lhs)?;
                let rhs_text = self.compile_side(*op, rhs)?;
                Ok(format!("{lhs_text} {} {rhs_text}", op_text(*op)))
            }
            Expr::Unary { op, operand } => {
                let mut inner = self.compile(operand)?;
                // SQL `-`/`NOT` bind tighter than arithmetic and logical
                // connectives but looser than comparisons; only the former
                // operands need brackets.
                if matches!(operand.as_ref(), Expr::Binary { op, .. } if !op.is_comparison()) {
                    inner = format!("({inner})");
                }
                match op {
                    UnaryOp::Neg => Ok(format!("-{inner}")),
                    UnaryOp::Not => Ok(format!("NOT {inner}")),
                }
            }
            Expr::Call { name, args } => match self.specials.get(name) {
                Some(renderer) => renderer(args, self),
                None => Err(PipeError::unsupported(format!(
                    "call '{name}' has no SQL rule"
                ))),
            },
        }
    }

    /// Compiles one side of a binary node, folding it when it never touches
    /// the placeholder and bracketing it per the precedence rule.
    ///
    /// A child needs brackets iff the parent is high-priority and the child
    /// is an other-priority binary node. Comparison children are never
    /// bracketed.
    fn compile_side(&self, parent: BinaryOp, child: &Expr) -> Result<String, PipeError> {
        if let Some(value) = fold(child)? {
            return Ok(sql_literal(&value));
        }
        let text = self.compile(child)?;
        let needs_brackets = matches!(priority(parent), Priority::High)
            && matches!(child, Expr::Binary { op, .. } if priority(*op) == Priority::Other);
        if needs_brackets {
            Ok(format!("({text})"))
        } else {
            Ok(text)
        }
    }
}

impl Default for SqlCompiler {
    fn default() -> Self {
        Self::new()
    }
}
