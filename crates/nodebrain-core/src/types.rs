//! Type descriptors and the method-vector dispatch surface (spec §4.2).
//!
//! The built-in cell taxonomy is closed and known ahead of time, so per the
//! Design Note in spec §9 it is realized as a tagged enum (`CellKind`) with
//! exhaustive matching in the engine rather than a vector of function
//! pointers — only the genuinely open-world skill facets (§4.10) use a
//! `dyn` trait object. `TypeAttrs` still exists as a bitflags set so rule
//! firing (§4.9, "not-true" bit) and printing can query attributes the way
//! the original method-vector attributes bitmask did.

use bitflags::bitflags;

bitflags! {
    /// Attribute bitmask carried by every type descriptor (spec §4.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeAttrs: u32 {
        const IS_RULE        = 1 << 0;
        const IS_RELATIONAL  = 1 << 1;
        const IS_COMPARISON  = 1 << 2;
        const IS_BOOLEAN     = 1 << 3;
        const IS_TIME        = 1 << 4;
        const IS_DELAY       = 1 << 5;
        const IS_SPECIAL     = 1 << 6;
        const IS_REGEXP      = 1 << 7;
        const WELDED         = 1 << 8;
        const IS_FACT        = 1 << 9;
        /// Set on `False`, `Unknown`, `Disabled` and numeric zero — the
        /// complement of the "true set" rules fire on (spec §4.9).
        const NOT_TRUE       = 1 << 10;
        const IS_ASSERTION   = 1 << 11;
        const IS_MATH        = 1 << 12;
    }
}

/// The closed taxonomy of cell kinds (spec §3, §4.4, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    // interned value cells (§4.4)
    Str,
    Real,
    Unknown,
    False,
    True,
    Placeholder,
    Disabled,
    // expression cells (§4.5)
    Math,
    Relational,
    Boolean,
    Conditional,
    List,
    Call,
    Assertion,
    TimeCondition,
    // terms, nodes, rules, and the axon optimization (§4.6, §4.7, §4.9, §4.10)
    Term,
    Node,
    NodeCall,
    Rule,
    Axon,
}

impl CellKind {
    /// Static attribute set for this kind. Instance-level overrides (e.g. a
    /// relational cell's comparator) are layered on top by the cell itself.
    pub fn base_attrs(self) -> TypeAttrs {
        use CellKind::*;
        match self {
            Str | Real | True | Placeholder => TypeAttrs::empty(),
            Unknown | False | Disabled => TypeAttrs::IS_SPECIAL | TypeAttrs::NOT_TRUE,
            Math => TypeAttrs::IS_MATH,
            Relational => TypeAttrs::IS_RELATIONAL | TypeAttrs::IS_COMPARISON,
            Boolean => TypeAttrs::IS_BOOLEAN,
            Conditional => TypeAttrs::empty(),
            List => TypeAttrs::empty(),
            Call => TypeAttrs::empty(),
            Assertion => TypeAttrs::IS_ASSERTION,
            TimeCondition => TypeAttrs::IS_TIME,
            Term => TypeAttrs::empty(),
            Node => TypeAttrs::empty(),
            NodeCall => TypeAttrs::empty(),
            Rule => TypeAttrs::IS_RULE,
            Axon => TypeAttrs::empty(),
        }
    }

    pub fn name(self) -> &'static str {
        use CellKind::*;
        match self {
            Str => "string",
            Real => "real",
            Unknown => "Unknown",
            False => "False",
            True => "True",
            Placeholder => "Placeholder",
            Disabled => "Disabled",
            Math => "math",
            Relational => "relational",
            Boolean => "boolean",
            Conditional => "conditional",
            List => "list",
            Call => "call",
            Assertion => "assertion",
            TimeCondition => "time-condition",
            Term => "term",
            Node => "node",
            NodeCall => "node-call",
            Rule => "rule",
            Axon => "axon",
        }
    }
}

/// Per-method timing counters, installed as a shim over cell dispatch when
/// the `tracing` feature is enabled (spec §4.2 "installable shim layer").
#[derive(Debug, Default, Clone)]
pub struct ShimStats {
    pub eval_calls: u64,
    pub eval_nanos: u64,
    pub solve_calls: u64,
    pub enable_calls: u64,
    pub disable_calls: u64,
}

impl ShimStats {
    pub fn record_eval(&mut self, elapsed: std::time::Duration) {
        self.eval_calls += 1;
        self.eval_nanos += elapsed.as_nanos() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_is_not_true() {
        assert!(CellKind::Unknown.base_attrs().contains(TypeAttrs::NOT_TRUE));
        assert!(CellKind::False.base_attrs().contains(TypeAttrs::NOT_TRUE));
        assert!(!CellKind::True.base_attrs().contains(TypeAttrs::NOT_TRUE));
    }
}
