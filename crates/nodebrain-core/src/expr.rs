//! Expression cell bodies and their evaluation semantics (spec §4.5).
//!
//! The closed, built-in cell taxonomy is a tagged enum per the Design Note
//! in spec §9 ("make it a tagged union to get exhaustive matching and
//! inlineable dispatch"). Each `eval_*` function is pure — it takes already
//! resolved operand [`Value`]s and returns the new value; the engine
//! (`engine::Graph`) is responsible for looking up operands by `CellId` and
//! calling these during a react wave.

use crate::ids::CellId;
use crate::values::Value;
use smallvec::{SmallVec, smallvec};

/// Operand list returned by [`CellBody::operands`]: almost every variant
/// has at most four children, so this avoids a heap allocation for the
/// common case (mirroring `formualizer_parse`'s `SmallVec<[_; 4]>` use for
/// AST child lists).
pub type Operands = SmallVec<[CellId; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelOp {
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    And,
    Or,
    Not,
}

/// A reactive cell's compute body (spec §3 "Expression cells").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellBody {
    /// A simple object: its value pointer aliases itself (spec §3). Used
    /// for `define a cell 1` style literals.
    Literal(Value),
    Math(MathOp, CellId, CellId),
    /// `Boolean(op, left, right)`; `right` is `None` only for `not`.
    Boolean(BoolOp, CellId, Option<CellId>),
    Relational(RelOp, CellId, CellId),
    Conditional {
        cond: CellId,
        if_true: CellId,
        if_false: CellId,
        if_unknown: CellId,
    },
    List(Vec<CellId>),
    Call {
        name: &'static str,
        args: Vec<CellId>,
    },
    /// `(target, value-or-formula)`; used only inside rule bodies and is
    /// never itself a subscriber (spec §3).
    Assertion {
        target: CellId,
        source: CellId,
    },
    /// Compiled calendar/pulse expression; see `crate::time`.
    TimeCondition(crate::time::TimeProcId),
    /// `<node>(args)` — interned like any other expression cell, keyed by
    /// `(node-term, argument-list)` (spec §4.10).
    NodeCall {
        node: CellId,
        args: Vec<CellId>,
    },
    /// A term's current definition pointer (spec §4.6). Not hash-consed —
    /// two terms may legitimately point at the same definition while
    /// remaining distinct named objects, so terms are allocated directly
    /// rather than through the structural use/locate protocol.
    TermRef(CellId),
    /// The guard wrapper a rule subscribes through (spec §4.9). Also not
    /// hash-consed — each rule's guard is its own object even if two rules
    /// happen to share a condition cell.
    RuleGuard(CellId),
}

impl CellBody {
    /// Operand cells this body strong-references (spec §3 "Ownership").
    pub fn operands(&self) -> Operands {
        match self {
            CellBody::Literal(_) => smallvec![],
            CellBody::Math(_, l, r) => smallvec![*l, *r],
            CellBody::Boolean(_, l, r) => {
                let mut v: Operands = smallvec![*l];
                if let Some(r) = r {
                    v.push(*r);
                }
                v
            }
            CellBody::Relational(_, l, r) => smallvec![*l, *r],
            CellBody::Conditional {
                cond,
                if_true,
                if_false,
                if_unknown,
            } => smallvec![*cond, *if_true, *if_false, *if_unknown],
            CellBody::List(items) => Operands::from_slice(items),
            CellBody::Call { args, .. } => Operands::from_slice(args),
            CellBody::Assertion { target, source } => smallvec![*target, *source],
            CellBody::TimeCondition(_) => smallvec![],
            CellBody::NodeCall { node, args } => {
                let mut v: Operands = smallvec![*node];
                v.extend(args.iter().copied());
                v
            }
            CellBody::TermRef(def) => smallvec![*def],
            CellBody::RuleGuard(cond) => smallvec![*cond],
        }
    }
}

/// Arithmetic semantics (spec §4.5): non-real operand ⇒ `Unknown`;
/// division by zero ⇒ `Unknown`; otherwise the computed double (the
/// caller is responsible for interning the result through the real table).
pub fn eval_math(op: MathOp, left: &Value, right: Option<&Value>) -> Value {
    let l = match left {
        Value::Real(n) => *n,
        _ => return Value::Unknown,
    };
    if op == MathOp::Neg {
        return Value::Real(-l);
    }
    let r = match right {
        Some(Value::Real(n)) => *n,
        _ => return Value::Unknown,
    };
    match op {
        MathOp::Add => Value::Real(l + r),
        MathOp::Sub => Value::Real(l - r),
        MathOp::Mul => Value::Real(l * r),
        MathOp::Div => {
            if r == 0.0 {
                Value::Unknown
            } else {
                Value::Real(l / r)
            }
        }
        MathOp::Neg => unreachable!("handled above"),
    }
}

/// Relational semantics: `Unknown` if either operand is `Unknown`.
pub fn eval_relational(op: RelOp, left: &Value, right: &Value) -> Value {
    if matches!(left, Value::Unknown) || matches!(right, Value::Unknown) {
        return Value::Unknown;
    }
    let ordering = match (left, right) {
        (Value::Real(a), Value::Real(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.as_ref().cmp(b.as_ref())),
        _ => {
            return if op == RelOp::Eq {
                bool_to_value(left == right)
            } else if op == RelOp::Ne {
                bool_to_value(left != right)
            } else {
                Value::Unknown
            };
        }
    };
    let Some(ord) = ordering else {
        return Value::Unknown;
    };
    use std::cmp::Ordering::*;
    let truth = match op {
        RelOp::Eq => ord == Equal,
        RelOp::Ne => ord != Equal,
        RelOp::Lt => ord == Less,
        RelOp::Gt => ord == Greater,
        RelOp::Le => ord != Greater,
        RelOp::Ge => ord != Less,
    };
    bool_to_value(truth)
}

fn bool_to_value(b: bool) -> Value {
    if b { Value::True } else { Value::False }
}

/// Closed-world boolean semantics (spec §4.5):
/// `and` is `False` if either operand is `False`, else `Unknown` if either
/// is `Unknown`, else `True`; `or` is the dual; `not Unknown = Unknown`.
pub fn eval_boolean(op: BoolOp, left: &Value, right: Option<&Value>) -> Value {
    match op {
        BoolOp::Not => match left {
            Value::Unknown => Value::Unknown,
            v => bool_to_value(!v.is_true_set()),
        },
        BoolOp::And => {
            let r = right.expect("and requires two operands");
            if matches!(left, Value::False) || matches!(r, Value::False) {
                Value::False
            } else if matches!(left, Value::Unknown) || matches!(r, Value::Unknown) {
                Value::Unknown
            } else {
                Value::True
            }
        }
        BoolOp::Or => {
            let r = right.expect("or requires two operands");
            if left.is_true_set() && !matches!(left, Value::Unknown) {
                Value::True
            } else if r.is_true_set() && !matches!(r, Value::Unknown) {
                Value::True
            } else if matches!(left, Value::Unknown) || matches!(r, Value::Unknown) {
                Value::Unknown
            } else {
                Value::False
            }
        }
    }
}

/// Conditional semantics (spec §4.5): three/four-way selector.
pub fn eval_conditional(cond: &Value, if_true: &Value, if_false: &Value, if_unknown: &Value) -> Value {
    match cond {
        Value::Unknown => if_unknown.clone(),
        v if v.is_true_set() => if_true.clone(),
        _ => if_false.clone(),
    }
}

/// The printer renders the shortest syntactic form consistent with which
/// branches differ from the guard (spec §4.5). `if_true`/`if_false`/
/// `if_unknown` are the *source text* of each branch (or `None` if that
/// branch is just the guard's own cell, the common case).
pub fn show_conditional(
    guard: &str,
    if_true: &str,
    if_false: Option<&str>,
    if_unknown: Option<&str>,
) -> String {
    match (if_false, if_unknown) {
        (None, None) => format!("(c true {guard} {if_true})"),
        (None, Some(u)) => format!("(c unknown {guard} {u})"),
        (Some(f), None) => format!("(c true {guard} {if_true} else false {f})"),
        (Some(f), Some(u)) => {
            format!("(c true {guard} {if_true} else false {f} else unknown {u})")
        }
    }
}

/// List semantics (spec §4.5): `Unknown` if any member is `Unknown`,
/// otherwise the list's value *toggles* between `True` and `False` on
/// every change so subscribers notice an internal-member change even
/// though the externally visible "kind" of value never differs.
pub fn eval_list(members: &[Value], previous_toggle: bool) -> Value {
    if members.iter().any(|m| matches!(m, Value::Unknown)) {
        return Value::Unknown;
    }
    bool_to_value(!previous_toggle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_unknown_propagates() {
        assert_eq!(
            eval_math(MathOp::Add, &Value::Unknown, Some(&Value::Real(1.0))),
            Value::Unknown
        );
    }

    #[test]
    fn division_by_zero_is_unknown_not_panic() {
        assert_eq!(
            eval_math(MathOp::Div, &Value::Real(1.0), Some(&Value::Real(0.0))),
            Value::Unknown
        );
    }

    #[test]
    fn comparison_with_unknown_is_unknown() {
        assert_eq!(
            eval_relational(RelOp::Lt, &Value::Unknown, &Value::Real(1.0)),
            Value::Unknown
        );
    }

    #[test]
    fn boolean_truth_table_matches_closed_world() {
        assert_eq!(
            eval_boolean(BoolOp::And, &Value::False, Some(&Value::Unknown)),
            Value::False
        );
        assert_eq!(
            eval_boolean(BoolOp::Or, &Value::True, Some(&Value::Unknown)),
            Value::True
        );
        assert_eq!(eval_boolean(BoolOp::Not, &Value::Unknown, None), Value::Unknown);
    }

    #[test]
    fn list_toggles_on_change_but_not_on_unknown() {
        let v1 = eval_list(&[Value::Real(1.0)], false);
        assert_eq!(v1, Value::True);
        let v2 = eval_list(&[Value::Real(1.0)], true);
        assert_eq!(v2, Value::False);
        let v3 = eval_list(&[Value::Unknown], true);
        assert_eq!(v3, Value::Unknown);
    }
}
