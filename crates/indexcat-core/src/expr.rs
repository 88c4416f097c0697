//! Expression trees attached to indexes and the host hooks that compile them.
//!
//! Index predicates and expression keys are opaque to the catalog: it stores
//! them through their text form ([`ExprNode::to_text`]) and hands them to an
//! [`ExpressionHost`] for compilation when a descriptor is realized.
//! [`BasicExprHost`] is a small evaluator over rows of [`Datum`]s.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ExprError;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Ordering between two non-null datums of comparable types.
    pub fn partial_cmp_value(&self, other: &Datum) -> Option<Ordering> {
        match (self, other) {
            (Datum::Bool(a), Datum::Bool(b)) => Some(a.cmp(b)),
            (Datum::Int(a), Datum::Int(b)) => Some(a.cmp(b)),
            (Datum::Float(a), Datum::Float(b)) => a.partial_cmp(b),
            (Datum::Int(a), Datum::Float(b)) => (*a as f64).partial_cmp(b),
            (Datum::Float(a), Datum::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Datum::Text(a), Datum::Text(b)) => Some(a.cmp(b)),
            (Datum::Bytes(a), Datum::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

/// Expression tree in the host's node representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprNode {
    /// Column by 0-based position in the evaluated row.
    Column(u16),
    Const(Datum),
    Func { name: String, args: Vec<ExprNode> },
    Compare {
        op: CompareOp,
        left: Box<ExprNode>,
        right: Box<ExprNode>,
    },
    And(Vec<ExprNode>),
    Or(Vec<ExprNode>),
    Not(Box<ExprNode>),
    IsNull(Box<ExprNode>),
}

impl ExprNode {
    /// Serialize into the host's node text format.
    pub fn to_text(&self) -> String {
        // Serializing an in-memory tree of plain enums cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a node from its text form.
    pub fn from_text(text: &str) -> Result<Self, ExprError> {
        serde_json::from_str(text).map_err(|e| ExprError::Parse(e.to_string()))
    }

    pub fn column(position: u16) -> Self {
        ExprNode::Column(position)
    }

    pub fn func(name: &str, args: Vec<ExprNode>) -> Self {
        ExprNode::Func {
            name: name.to_string(),
            args,
        }
    }

    pub fn compare(op: CompareOp, left: ExprNode, right: ExprNode) -> Self {
        ExprNode::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// Compiled boolean evaluator for an index predicate.
pub type CompiledPredicate = Arc<dyn Fn(&[Datum]) -> Result<bool, ExprError> + Send + Sync>;

/// Compiled evaluator for an index expression.
pub type CompiledExpr = Arc<dyn Fn(&[Datum]) -> Result<Datum, ExprError> + Send + Sync>;

/// Host facility compiling expression trees into evaluators.
pub trait ExpressionHost {
    fn compile_predicate(&self, node: &ExprNode) -> Result<CompiledPredicate, ExprError>;

    fn compile_expr(&self, node: &ExprNode) -> Result<CompiledExpr, ExprError>;

    /// Install catalog lookup hooks needed while compiling.
    fn set_hooks(&self) {}

    fn unset_hooks(&self) {}
}

/// RAII guard bracketing a compilation with `set_hooks` / `unset_hooks`.
pub struct HooksGuard<'a> {
    host: &'a dyn ExpressionHost,
}

impl<'a> HooksGuard<'a> {
    pub fn install(host: &'a dyn ExpressionHost) -> Self {
        host.set_hooks();
        Self { host }
    }
}

impl Drop for HooksGuard<'_> {
    fn drop(&mut self) {
        self.host.unset_hooks();
    }
}

/// Tree-walking [`ExpressionHost`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicExprHost;

impl ExpressionHost for BasicExprHost {
    fn compile_predicate(&self, node: &ExprNode) -> Result<CompiledPredicate, ExprError> {
        validate(node)?;
        let node = node.clone();
        Ok(Arc::new(move |row: &[Datum]| {
            // A null predicate result excludes the row.
            Ok(matches!(eval(&node, row)?, Datum::Bool(true)))
        }))
    }

    fn compile_expr(&self, node: &ExprNode) -> Result<CompiledExpr, ExprError> {
        validate(node)?;
        let node = node.clone();
        Ok(Arc::new(move |row: &[Datum]| eval(&node, row)))
    }
}

const FUNCTIONS: &[(&str, usize)] = &[
    ("lower", 1),
    ("upper", 1),
    ("length", 1),
    ("abs", 1),
    ("coalesce", usize::MAX),
];

fn validate(node: &ExprNode) -> Result<(), ExprError> {
    match node {
        ExprNode::Column(_) | ExprNode::Const(_) => Ok(()),
        ExprNode::Func { name, args } => {
            let Some((_, arity)) = FUNCTIONS.iter().find(|(f, _)| f == name) else {
                return Err(ExprError::Compile(format!("unknown function {name}")));
            };
            if *arity != usize::MAX && args.len() != *arity {
                return Err(ExprError::Compile(format!(
                    "{name} takes {arity} argument(s), got {}",
                    args.len()
                )));
            }
            args.iter().try_for_each(validate)
        }
        ExprNode::Compare { left, right, .. } => {
            validate(left)?;
            validate(right)
        }
        ExprNode::And(args) | ExprNode::Or(args) => args.iter().try_for_each(validate),
        ExprNode::Not(arg) | ExprNode::IsNull(arg) => validate(arg),
    }
}

fn eval(node: &ExprNode, row: &[Datum]) -> Result<Datum, ExprError> {
    match node {
        ExprNode::Column(pos) => row
            .get(*pos as usize)
            .cloned()
            .ok_or_else(|| ExprError::Eval(format!("column {pos} out of range"))),
        ExprNode::Const(d) => Ok(d.clone()),
        ExprNode::Func { name, args } => {
            let values = args
                .iter()
                .map(|a| eval(a, row))
                .collect::<Result<Vec<_>, _>>()?;
            call(name, values)
        }
        ExprNode::Compare { op, left, right } => {
            let l = eval(left, row)?;
            let r = eval(right, row)?;
            if l.is_null() || r.is_null() {
                return Ok(Datum::Null);
            }
            let ord = l.partial_cmp_value(&r).ok_or_else(|| {
                ExprError::Eval(format!("cannot compare {l:?} with {r:?}"))
            })?;
            Ok(Datum::Bool(op.holds(ord)))
        }
        ExprNode::And(args) => {
            let mut saw_null = false;
            for arg in args {
                match eval(arg, row)? {
                    Datum::Bool(false) => return Ok(Datum::Bool(false)),
                    Datum::Null => saw_null = true,
                    _ => {}
                }
            }
            Ok(if saw_null {
                Datum::Null
            } else {
                Datum::Bool(true)
            })
        }
        ExprNode::Or(args) => {
            let mut saw_null = false;
            for arg in args {
                match eval(arg, row)? {
                    Datum::Bool(true) => return Ok(Datum::Bool(true)),
                    Datum::Null => saw_null = true,
                    _ => {}
                }
            }
            Ok(if saw_null {
                Datum::Null
            } else {
                Datum::Bool(false)
            })
        }
        ExprNode::Not(arg) => match eval(arg, row)? {
            Datum::Bool(b) => Ok(Datum::Bool(!b)),
            Datum::Null => Ok(Datum::Null),
            other => Err(ExprError::Eval(format!("NOT applied to {other:?}"))),
        },
        ExprNode::IsNull(arg) => Ok(Datum::Bool(eval(arg, row)?.is_null())),
    }
}

fn call(name: &str, mut args: Vec<Datum>) -> Result<Datum, ExprError> {
    if name == "coalesce" {
        return Ok(args
            .into_iter()
            .find(|d| !d.is_null())
            .unwrap_or(Datum::Null));
    }
    let arg = args.pop().unwrap_or(Datum::Null);
    match (name, arg) {
        (_, Datum::Null) => Ok(Datum::Null),
        ("lower", Datum::Text(s)) => Ok(Datum::Text(s.to_lowercase())),
        ("upper", Datum::Text(s)) => Ok(Datum::Text(s.to_uppercase())),
        ("length", Datum::Text(s)) => Ok(Datum::Int(s.chars().count() as i64)),
        ("length", Datum::Bytes(b)) => Ok(Datum::Int(b.len() as i64)),
        ("abs", Datum::Int(i)) => Ok(Datum::Int(i.wrapping_abs())),
        ("abs", Datum::Float(f)) => Ok(Datum::Float(f.abs())),
        (name, arg) => Err(ExprError::Eval(format!("{name} not defined for {arg:?}"))),
    }
}
