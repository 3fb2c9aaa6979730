//! Node / skill dispatch (spec §4.10): a node is a context object wrapping
//! a skill's facet vector, a local glossary of terms, and a list of
//! attached IF-rules. `Skill` is the one genuinely open-world trait in the
//! engine (spec §9 Design Note: "a closed sum for built-in cell kinds,
//! a trait object only for the facets a dynamically-loaded module
//! supplies") — everything else dispatches through the closed `CellKind`
//! match in `engine::mod`.

use crate::ids::CellId;
use crate::term::Glossary;
use crate::values::Value;
use nodebrain_common::{NbError, NbErrorKind};
use rustc_hash::FxHashMap;

/// The thirteen facet methods a skill may implement (spec §4.10), plus the
/// facet's own identifier. Every method has a null-stub default so a
/// partially-implemented skill behaves like the spec's "Unknown facet"
/// for the methods it doesn't override.
pub trait Skill {
    fn identifier(&self) -> &'static str;

    fn construct(&mut self, _args: &[Value]) -> Result<(), NbError> {
        Ok(())
    }
    fn destroy(&mut self) {}
    fn show(&self) -> String {
        format!("<{}>", self.identifier())
    }
    fn enable(&mut self) {}
    fn disable(&mut self) {}
    fn alarm(&mut self, _now: u64) {}
    fn assert(&mut self, _target: &str, _value: &Value) -> Result<(), NbError> {
        Err(NbError::skill(format!(
            "skill '{}' does not support assert",
            self.identifier()
        )))
    }
    fn eval(&mut self, _args: &[Value]) -> Value {
        Value::Unknown
    }
    fn compute(&mut self) -> Value {
        Value::Unknown
    }
    fn solve(&mut self) {}
    fn command(&mut self, _text: &str) -> Result<String, NbError> {
        Err(NbError::skill(format!(
            "skill '{}' does not support commands",
            self.identifier()
        )))
    }
    fn alert(&mut self, _target: &str, _value: &Value) -> Result<(), NbError> {
        self.assert(_target, _value)
    }
}

/// The null skill every unresolved reference falls back to (spec §4.10
/// "an unbound skill resolves to an Unknown facet that returns Unknown for
/// evaluation and errors for assertion").
pub struct UnknownSkill;

impl Skill for UnknownSkill {
    fn identifier(&self) -> &'static str {
        "Unknown"
    }
}

/// Stand-in for the external module loader (spec §4.10 "Skills are
/// resolved on first reference via the external module loader"). Modules
/// register a constructor under a name; the registry owns nothing beyond
/// that mapping.
#[derive(Default)]
pub struct SkillRegistry {
    constructors: FxHashMap<String, Box<dyn Fn() -> Box<dyn Skill>>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `skill_declare` (spec §4.11): register a named constructor.
    pub fn declare<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn Skill> + 'static,
    {
        self.constructors.insert(name.to_string(), Box::new(ctor));
    }

    /// Resolve `name` to a fresh skill instance, falling back to
    /// [`UnknownSkill`] if nothing is declared under that name.
    pub fn resolve(&self, name: &str) -> Box<dyn Skill> {
        match self.constructors.get(name) {
            Some(ctor) => ctor(),
            None => Box::new(UnknownSkill),
        }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }
}

/// A node context (spec §3 "Node"): carries a skill, a local glossary, an
/// owning identity, an optional source cell (used to request missing
/// facts), and the list of IF-rules attached to it. Nodes act as cells in
/// expressions (their own `cell` is the node-call cell table key) and as
/// namespaces for child terms.
pub struct Node {
    pub cell: CellId,
    pub skill: Box<dyn Skill>,
    pub glossary: Glossary,
    pub source: Option<CellId>,
    pub rules: Vec<CellId>,
}

impl Node {
    pub fn new(cell: CellId, skill: Box<dyn Skill>) -> Self {
        Self {
            cell,
            skill,
            glossary: Glossary::new(),
            source: None,
            rules: Vec::new(),
        }
    }

    pub fn attach_rule(&mut self, rule_guard: CellId) {
        self.rules.push(rule_guard);
    }
}

/// Owns every constructed node, keyed by its node cell — node-call cells
/// (spec §4.10 "`<node>(args)` interned like any other expression cell
/// keyed by (node-term, argument-list)") dispatch through here by looking
/// up the node half of that key.
#[derive(Default)]
pub struct NodeTable {
    nodes: FxHashMap<CellId, Node>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.cell, node);
    }

    pub fn get(&self, cell: CellId) -> Option<&Node> {
        self.nodes.get(&cell)
    }

    pub fn get_mut(&mut self, cell: CellId) -> Option<&mut Node> {
        self.nodes.get_mut(&cell)
    }

    /// Dispatch a node-call cell's arguments to its skill's `eval` facet
    /// (spec §4.10 "node-call cells ... invoking a skill's eval method").
    pub fn eval_call(&mut self, node: CellId, args: &[Value]) -> Value {
        match self.nodes.get_mut(&node) {
            Some(n) => n.skill.eval(args),
            None => Value::Unknown,
        }
    }

    /// Route a node-call cell's `solve` (spec §4.10 `solveNode`) to the
    /// node's skill facet. A no-op for nodes with no skill installed or
    /// whose skill doesn't override `Skill::solve`.
    pub fn solve_call(&mut self, node: CellId) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.skill.solve();
        }
    }

    /// `node_alert` (spec §4.11): route an alert assignment through the
    /// node's skill.
    pub fn alert(&mut self, node: CellId, target: &str, value: &Value) -> Result<(), NbError> {
        match self.nodes.get_mut(&node) {
            Some(n) => n.skill.alert(target, value),
            None => Err(NbError::new(NbErrorKind::Logic).with_message(format!(
                "node {node} not found"
            ))),
        }
    }

    /// `skill_set_method` (spec §4.11): patch a single facet on a live
    /// node's skill. The first patch wraps the existing skill in an
    /// [`OverridableSkill`]; later patches layer on top of that wrapper.
    pub fn patch_skill_method(
        &mut self,
        node: CellId,
        code: FacetCode,
        f: FacetFn,
    ) -> Result<(), NbError> {
        let n = self.nodes.get_mut(&node).ok_or_else(|| {
            NbError::new(NbErrorKind::Logic).with_message(format!("node {node} not found"))
        })?;
        let current = std::mem::replace(&mut n.skill, Box::new(UnknownSkill));
        let mut overridable = OverridableSkill::new(current);
        overridable.set_method(code, f);
        n.skill = Box::new(overridable);
        Ok(())
    }
}

/// Which facet slot `skill_set_method` (spec §4.11) patches. The spec's
/// method vector is per-type in C; here a single `Skill` trait object plays
/// that role, so patching "one slot" is realized as [`OverridableSkill`]
/// intercepting that one method and falling through to the wrapped skill
/// for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetCode {
    Eval,
    Compute,
    Assert,
    Command,
    Alarm,
}

/// Wraps a base skill and lets individual facets be replaced after
/// construction (spec §4.11 `skill_set_method(skill, code, fn)`), without
/// requiring the open-world `Skill` trait itself to become a literal
/// function-pointer vector the way the spec's C method table is.
pub struct OverridableSkill {
    base: Box<dyn Skill>,
    eval_override: Option<Box<dyn FnMut(&[Value]) -> Value>>,
    compute_override: Option<Box<dyn FnMut() -> Value>>,
    assert_override: Option<Box<dyn FnMut(&str, &Value) -> Result<(), NbError>>>,
    command_override: Option<Box<dyn FnMut(&str) -> Result<String, NbError>>>,
    alarm_override: Option<Box<dyn FnMut(u64)>>,
}

impl OverridableSkill {
    pub fn new(base: Box<dyn Skill>) -> Self {
        Self {
            base,
            eval_override: None,
            compute_override: None,
            assert_override: None,
            command_override: None,
            alarm_override: None,
        }
    }

    pub fn set_method(&mut self, code: FacetCode, f: impl Into<FacetFn>) {
        match f.into() {
            FacetFn::Eval(f) => self.eval_override = Some(f),
            FacetFn::Compute(f) => self.compute_override = Some(f),
            FacetFn::Assert(f) => self.assert_override = Some(f),
            FacetFn::Command(f) => self.command_override = Some(f),
            FacetFn::Alarm(f) => self.alarm_override = Some(f),
        }
        let _ = code; // the variant of `f` already identifies the slot
    }
}

/// A boxed override closure tagged by which facet it replaces — `set_method`
/// takes this instead of five separate methods so callers (the top-level
/// API) have one entry point per spec §4.11.
pub enum FacetFn {
    Eval(Box<dyn FnMut(&[Value]) -> Value>),
    Compute(Box<dyn FnMut() -> Value>),
    Assert(Box<dyn FnMut(&str, &Value) -> Result<(), NbError>>),
    Command(Box<dyn FnMut(&str) -> Result<String, NbError>>),
    Alarm(Box<dyn FnMut(u64)>),
}

impl Skill for OverridableSkill {
    fn identifier(&self) -> &'static str {
        self.base.identifier()
    }
    fn construct(&mut self, args: &[Value]) -> Result<(), NbError> {
        self.base.construct(args)
    }
    fn destroy(&mut self) {
        self.base.destroy()
    }
    fn show(&self) -> String {
        self.base.show()
    }
    fn enable(&mut self) {
        self.base.enable()
    }
    fn disable(&mut self) {
        self.base.disable()
    }
    fn alarm(&mut self, now: u64) {
        match &mut self.alarm_override {
            Some(f) => f(now),
            None => self.base.alarm(now),
        }
    }
    fn assert(&mut self, target: &str, value: &Value) -> Result<(), NbError> {
        match &mut self.assert_override {
            Some(f) => f(target, value),
            None => self.base.assert(target, value),
        }
    }
    fn eval(&mut self, args: &[Value]) -> Value {
        match &mut self.eval_override {
            Some(f) => f(args),
            None => self.base.eval(args),
        }
    }
    fn compute(&mut self) -> Value {
        match &mut self.compute_override {
            Some(f) => f(),
            None => self.base.compute(),
        }
    }
    fn solve(&mut self) {
        self.base.solve()
    }
    fn command(&mut self, text: &str) -> Result<String, NbError> {
        match &mut self.command_override {
            Some(f) => f(text),
            None => self.base.command(text),
        }
    }
    fn alert(&mut self, target: &str, value: &Value) -> Result<(), NbError> {
        self.base.alert(target, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoSkill;
    impl Skill for EchoSkill {
        fn identifier(&self) -> &'static str {
            "echo"
        }
        fn eval(&mut self, args: &[Value]) -> Value {
            args.first().cloned().unwrap_or(Value::Unknown)
        }
    }

    #[test]
    fn unresolved_skill_name_falls_back_to_unknown_facet() {
        let registry = SkillRegistry::new();
        let skill = registry.resolve("not-declared");
        assert_eq!(skill.identifier(), "Unknown");
    }

    #[test]
    fn declared_skill_resolves_to_constructor() {
        let mut registry = SkillRegistry::new();
        registry.declare("echo", || Box::new(EchoSkill));
        let skill = registry.resolve("echo");
        assert_eq!(skill.identifier(), "echo");
    }

    #[test]
    fn node_call_dispatches_to_skill_eval() {
        let mut table = NodeTable::new();
        let cell = CellId::new(0);
        table.insert(Node::new(cell, Box::new(EchoSkill)));
        let result = table.eval_call(cell, &[Value::Real(7.0)]);
        assert_eq!(result, Value::Real(7.0));
    }

    #[test]
    fn unknown_skill_assert_is_an_error() {
        let mut skill: Box<dyn Skill> = Box::new(UnknownSkill);
        assert!(skill.assert("x", &Value::True).is_err());
    }

    #[test]
    fn patched_eval_method_overrides_base_skill() {
        let mut table = NodeTable::new();
        let cell = CellId::new(0);
        table.insert(Node::new(cell, Box::new(EchoSkill)));

        table
            .patch_skill_method(
                cell,
                FacetCode::Eval,
                FacetFn::Eval(Box::new(|_args: &[Value]| Value::Real(99.0))),
            )
            .unwrap();

        let result = table.eval_call(cell, &[Value::Real(1.0)]);
        assert_eq!(result, Value::Real(99.0));
    }

    #[test]
    fn unpatched_facets_still_fall_through_after_a_patch() {
        let mut table = NodeTable::new();
        let cell = CellId::new(0);
        table.insert(Node::new(cell, Box::new(EchoSkill)));

        table
            .patch_skill_method(
                cell,
                FacetCode::Compute,
                FacetFn::Compute(Box::new(|| Value::Unknown)),
            )
            .unwrap();

        // eval was never patched — still the original echo behavior.
        let result = table.eval_call(cell, &[Value::Real(3.0)]);
        assert_eq!(result, Value::Real(3.0));
    }
}
