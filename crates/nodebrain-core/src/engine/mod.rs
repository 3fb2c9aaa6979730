//! The cell engine — the heart of NodeBrain (spec §4.7): subscription
//! edges, level assignment, enable/disable, the publish/react cycle, and
//! axon optimizations, all built over a hash-consed, slab-owned store of
//! [`CellRecord`]s.

pub mod axon;
pub mod queue;

use crate::builtins::BuiltinTable;
use crate::expr::{self, BoolOp, CellBody, MathOp, RelOp};
use crate::hashcons::HashCons;
use crate::ids::CellId;
use crate::types::{CellKind, TypeAttrs};
use crate::values::Value;
use axon::{ConstKey, PendingCandidate, PublisherAxons, AXON_THRESHOLD};
use queue::ReadyQueue;
use rustc_hash::FxHashMap;
use slab::Slab;

/// Reference count with a sentinel meaning "permanent, never freed"
/// (spec §3 "Object").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefCount {
    Finite(u32),
    Permanent,
}

/// A cell — every entity in the engine's graph (spec §3 "Cell"): terms,
/// expressions, nodes, rules.
pub struct CellRecord {
    pub kind: CellKind,
    pub attrs: TypeAttrs,
    pub level: u32,
    pub value: Value,
    /// Ordered set of subscribers; weak (non-owning) edges (spec §3).
    pub subscribers: Vec<CellId>,
    pub body: CellBody,
    pub refcount: RefCount,
}

impl CellRecord {
    /// A simple object's value pointer aliases itself: it never publishes
    /// and has no `eval` (spec §4.7 step 1).
    pub fn is_simple(&self) -> bool {
        matches!(self.body, CellBody::Literal(_))
    }
}

/// Thin seam the rule scheduler plugs into: whenever react reaches a
/// cell that is a rule's trigger, the engine hands the guard's value to
/// whatever is registered here instead of trying to compute a generic
/// expression value for it (spec §4.9 "a rule is reached via the react
/// loop").
pub trait RuleSink {
    fn on_guard_reached(&mut self, guard_cell: CellId, value: &Value);
}

/// Thin seam the node table plugs into: a `NodeCall` cell (spec §4.10
/// "`<node>(args)` ... invoking a skill's eval method") has no pure
/// `CellBody` semantics of its own — `eval_cell` routes it here instead,
/// the same way rule guards route through [`RuleSink`].
pub trait NodeDispatch {
    fn eval_node_call(&mut self, node: CellId, args: &[Value]) -> Value;

    /// Route a node-call cell's `solve` (spec §4.10/§4.5) to the node's
    /// skill facet — the one point where the cell-engine's generic
    /// operand-recursion `solve` (below) meets the open-world `Skill`
    /// trait's own `solve` facet (spec §4.10's `solveNode` forwarding
    /// straight into the skill's handler).
    fn solve_node_call(&mut self, node: CellId);
}

/// The subscription graph, hash-cons tables, ready queue and axon index:
/// the cell engine proper (spec §4.7).
pub struct Graph {
    cells: Slab<CellRecord>,
    expr_table: HashCons<CellBody>,
    queue: ReadyQueue,
    axons: FxHashMap<CellId, PublisherAxons>,
    /// Candidates buffered below [`AXON_THRESHOLD`] for a publisher that
    /// has no materialized axon yet.
    pending_axon_candidates: FxHashMap<CellId, Vec<PendingCandidate>>,
    pub(crate) builtins: BuiltinTable,
    rule_sink: Option<Box<dyn RuleSink>>,
    node_dispatch: Option<Box<dyn NodeDispatch>>,
    pub unknown: CellId,
    pub false_: CellId,
    pub true_: CellId,
    pub placeholder: CellId,
    pub disabled: CellId,
    #[cfg(feature = "tracing")]
    pub shim: crate::types::ShimStats,
}

impl Graph {
    pub fn new() -> Self {
        let mut cells = Slab::new();
        let mut mk_special = |kind: CellKind, value: Value| {
            cells.insert(CellRecord {
                kind,
                attrs: kind.base_attrs(),
                level: 0,
                value: value.clone(),
                subscribers: Vec::new(),
                body: CellBody::Literal(value),
                refcount: RefCount::Permanent,
            }) as u32
        };
        let unknown = CellId::new(mk_special(CellKind::Unknown, Value::Unknown));
        let false_ = CellId::new(mk_special(CellKind::False, Value::False));
        let true_ = CellId::new(mk_special(CellKind::True, Value::True));
        let placeholder = CellId::new(mk_special(CellKind::Placeholder, Value::Placeholder));
        let disabled = CellId::new(mk_special(CellKind::Disabled, Value::Disabled));

        Self {
            cells,
            expr_table: HashCons::new(),
            queue: ReadyQueue::new(),
            axons: FxHashMap::default(),
            pending_axon_candidates: FxHashMap::default(),
            builtins: BuiltinTable::with_defaults(),
            rule_sink: None,
            node_dispatch: None,
            unknown,
            false_,
            true_,
            placeholder,
            disabled,
            #[cfg(feature = "tracing")]
            shim: crate::types::ShimStats::default(),
        }
    }

    pub fn set_rule_sink(&mut self, sink: Box<dyn RuleSink>) {
        self.rule_sink = Some(sink);
    }

    pub fn set_node_dispatch(&mut self, dispatch: Box<dyn NodeDispatch>) {
        self.node_dispatch = Some(dispatch);
    }

    fn record(&self, id: CellId) -> &CellRecord {
        &self.cells[id.as_index()]
    }
    fn record_mut(&mut self, id: CellId) -> &mut CellRecord {
        &mut self.cells[id.as_index()]
    }

    pub fn value(&self, id: CellId) -> &Value {
        &self.record(id).value
    }

    pub fn level(&self, id: CellId) -> u32 {
        self.record(id).level
    }

    pub fn kind(&self, id: CellId) -> CellKind {
        self.record(id).kind
    }

    pub fn attrs(&self, id: CellId) -> TypeAttrs {
        self.record(id).attrs
    }

    pub fn body(&self, id: CellId) -> &CellBody {
        &self.record(id).body
    }

    /// Add attribute bits to a cell's descriptor — used to mark a
    /// definition `welded` (spec §4.2, §4.6) at declaration time.
    pub fn add_attrs(&mut self, id: CellId, attrs: TypeAttrs) {
        self.record_mut(id).attrs |= attrs;
    }

    pub fn subscriber_count(&self, id: CellId) -> usize {
        self.record(id).subscribers.len()
    }

    /// Allocate a fresh literal cell (a real number, string, or — via
    /// `intern_literal` below — a value reused through hash-consing). Used
    /// directly only for non-interned simple objects such as rule/node
    /// bookkeeping cells.
    fn alloc(&mut self, kind: CellKind, body: CellBody, level: u32) -> CellId {
        CellId::new(self.cells.insert(CellRecord {
            attrs: kind.base_attrs(),
            kind,
            level,
            value: Value::Disabled,
            subscribers: Vec::new(),
            body,
            refcount: RefCount::Finite(0),
        }) as u32)
    }

    /// Intern a real/string literal (spec §4.4): structural uniqueness via
    /// the shared hash-cons table, one canonical `CellId` per distinct
    /// value.
    pub fn intern_literal(&mut self, value: Value) -> CellId {
        let key = CellBody::Literal(value.clone());
        if let Some(id) = self.expr_table.find(&key) {
            return id;
        }
        let kind = match value {
            Value::Real(_) => CellKind::Real,
            Value::Str(_) => CellKind::Str,
            Value::Unknown => return self.unknown,
            Value::False => return self.false_,
            Value::True => return self.true_,
            Value::Placeholder => return self.placeholder,
            Value::Disabled => return self.disabled,
        };
        let id = CellId::new(self.cells.insert(CellRecord {
            attrs: kind.base_attrs(),
            kind,
            level: 0,
            value: value.clone(),
            subscribers: Vec::new(),
            body: key.clone(),
            refcount: RefCount::Finite(0),
        }) as u32);
        self.expr_table.insert(key, id);
        id
    }

    /// The use/locate protocol, the sole constructor for expression cells
    /// (spec §4.3): hash the structural key, return the existing cell on a
    /// match, otherwise allocate, compute `level = 1 + max(level(operands))`,
    /// set value to `Disabled` (lazy), and register axon candidacy.
    pub fn intern_expr(&mut self, kind: CellKind, body: CellBody) -> CellId {
        if let Some(id) = self.expr_table.find(&body) {
            return id;
        }
        let operands = body.operands();
        let level = 1 + operands.iter().map(|o| self.level(*o)).max().unwrap_or(0);
        let id = CellId::new(self.cells.insert(CellRecord {
            attrs: kind.base_attrs(),
            kind,
            level,
            value: Value::Disabled,
            subscribers: Vec::new(),
            body: body.clone(),
            refcount: RefCount::Finite(0),
        }) as u32);
        self.expr_table.insert(body.clone(), id);
        self.register_axon_candidate(&body, id);
        id
    }

    /// Record a newly-interned relational cell as an axon candidate on its
    /// non-literal operand, if it qualifies (spec §4.7 axon optimization).
    /// Below [`AXON_THRESHOLD`] candidates the publisher gets no axon at
    /// all — candidates just sit in `pending_axon_candidates` and
    /// `publish` falls back to the normal linear subscriber scan; at the
    /// threshold they are all materialized into a real [`PublisherAxons`]
    /// at once.
    fn register_axon_candidate(&mut self, body: &CellBody, id: CellId) {
        if let CellBody::Relational(op, left, right) = body {
            let (publisher, constant) = match (
                self.value_is_literal(*left),
                self.value_is_literal(*right),
            ) {
                (false, true) => (*left, *right),
                (true, false) => (*right, *left),
                _ => return,
            };
            let Some(key) = ConstKey::from_value(self.value(constant)) else {
                return;
            };
            let candidate = match (op, key) {
                (RelOp::Eq, key) => PendingCandidate::Eq(key, id),
                (RelOp::Lt, ConstKey::Real(n)) => PendingCandidate::Lt(n, id),
                (RelOp::Gt, ConstKey::Real(n)) => PendingCandidate::Gt(n, id),
                _ => return,
            };
            if let Some(axons) = self.axons.get_mut(&publisher) {
                Self::apply_candidate(axons, &candidate);
                return;
            }
            let bucket = self.pending_axon_candidates.entry(publisher).or_default();
            bucket.push(candidate);
            if bucket.len() >= AXON_THRESHOLD {
                let pending = self.pending_axon_candidates.remove(&publisher).unwrap();
                let mut axons = PublisherAxons::default();
                for c in &pending {
                    Self::apply_candidate(&mut axons, c);
                }
                self.axons.insert(publisher, axons);
            }
        }
    }

    fn apply_candidate(axons: &mut PublisherAxons, candidate: &PendingCandidate) {
        let member = match candidate {
            PendingCandidate::Eq(key, cell) => {
                axons.eq.insert(key.clone(), *cell);
                *cell
            }
            PendingCandidate::Lt(n, cell) => {
                axons.lt.insert(*n, *cell);
                *cell
            }
            PendingCandidate::Gt(n, cell) => {
                axons.gt.insert(*n, *cell);
                *cell
            }
        };
        axons.members.insert(member);
    }

    fn value_is_literal(&self, id: CellId) -> bool {
        self.record(id).is_simple()
    }

    // ---- subscription / enable / disable (spec §4.7) -------------------

    /// Enable `subscriber` on `publisher`, transitively.
    pub fn enable(&mut self, subscriber: CellId, publisher: CellId) {
        if self.record(publisher).is_simple() {
            return; // simple objects never publish
        }
        let pub_level = self.level(publisher);
        if self.level(subscriber) <= pub_level {
            self.raise_level(subscriber, pub_level + 1);
        }
        let was_first = {
            let rec = self.record_mut(publisher);
            if rec.subscribers.contains(&subscriber) {
                return; // idempotent
            }
            let was_empty = rec.subscribers.is_empty();
            rec.subscribers.push(subscriber);
            was_empty
        };
        if was_first {
            let operands = self.record(publisher).body.operands();
            for operand in operands {
                self.enable(publisher, operand);
            }
            if matches!(self.value(publisher), Value::Disabled) && !self.record(publisher).is_simple() {
                let v = self.eval_cell(publisher);
                self.record_mut(publisher).value = v;
            }
        }
    }

    /// Disable `subscriber` from `publisher`; if that was the last
    /// subscriber, resets `publisher`'s value to `Disabled` and recurses
    /// into `publisher`'s own operands (spec §4.7).
    pub fn disable(&mut self, subscriber: CellId, publisher: CellId) {
        if self.record(publisher).is_simple() {
            return;
        }
        let now_empty = {
            let rec = self.record_mut(publisher);
            if let Some(pos) = rec.subscribers.iter().position(|s| *s == subscriber) {
                rec.subscribers.remove(pos);
            } else {
                return;
            }
            rec.subscribers.is_empty()
        };
        if now_empty {
            self.record_mut(publisher).value = Value::Disabled;
            let operands = self.record(publisher).body.operands();
            for operand in operands {
                self.disable(publisher, operand);
            }
        }
    }

    /// Raise `id`'s level and propagate the increase transitively to every
    /// subscriber of `id` (spec §4.7 step 2 — levels are a DAG property).
    fn raise_level(&mut self, id: CellId, new_level: u32) {
        if self.level(id) >= new_level {
            return;
        }
        self.record_mut(id).level = new_level;
        let subs = self.record(id).subscribers.clone();
        for s in subs {
            if self.level(s) <= new_level {
                self.raise_level(s, new_level + 1);
            }
        }
    }

    // ---- publish / react (spec §4.7) -----------------------------------

    /// Enqueue every subscriber of `id` for re-evaluation, using axon
    /// indices to avoid evaluating every equality/comparison subscriber
    /// when the publisher has high relational fan-out.
    pub fn publish(&mut self, id: CellId, old_value: Option<&Value>) {
        let new_value = self.value(id).clone();
        let mut axon_handled: rustc_hash::FxHashSet<CellId> = Default::default();
        if let Some(axons) = self.axons.get(&id) {
            let mut affected = axons.eq.affected(old_value, &new_value);
            if let (Some(old), Value::Real(new_n)) = (old_value, &new_value) {
                if let Value::Real(old_n) = old {
                    affected.extend(axons.lt.affected(*old_n, *new_n));
                    affected.extend(axons.gt.affected(*old_n, *new_n));
                }
            }
            for cell in affected {
                axon_handled.insert(cell);
                let level = self.level(cell);
                self.queue.push(cell, level);
            }
        }
        let axon_covers = self.axons.get(&id);
        let subs = self.record(id).subscribers.clone();
        for s in subs {
            if axon_handled.contains(&s) {
                continue;
            }
            // A relational cell indexed by this publisher's axon is
            // provably unaffected unless it showed up in `affected` above
            // — the axon's membership set is exhaustive, so skipping the
            // rest of it here is what makes the fast path O(1)/O(log n)
            // instead of O(subscribers).
            if axon_covers.is_some_and(|a| a.is_member(s)) {
                continue;
            }
            let level = self.level(s);
            self.queue.push(s, level);
        }
    }

    /// Drain the ready queue, calling `eval` on the lowest-level cell each
    /// time and re-publishing on change, until empty (spec §4.7 "React").
    /// Returns the number of cells actually (re)computed.
    pub fn react(&mut self) -> usize {
        let mut computed = 0;
        while let Some(id) = self.queue.pop() {
            computed += 1;
            if self.record(id).kind == CellKind::Rule {
                let guard_value = self.resolve_rule_guard_value(id);
                if let Some(sink) = self.rule_sink.as_mut() {
                    sink.on_guard_reached(id, &guard_value);
                }
                continue;
            }
            let new_value = self.eval_cell(id);
            let old_value = self.record(id).value.clone();
            if new_value != old_value {
                self.record_mut(id).value = new_value;
                self.publish(id, Some(&old_value));
            }
        }
        computed
    }

    fn resolve_rule_guard_value(&self, rule_guard_cell: CellId) -> Value {
        let operands = self.record(rule_guard_cell).body.operands();
        match operands.first() {
            Some(cond) => self.value(*cond).clone(),
            None => Value::Unknown,
        }
    }

    /// Compute a cell's new value without publishing (spec §4.5 `eval`).
    /// Dispatch is an exhaustive match over the closed `CellBody` sum
    /// (spec §9 Design Note), not a method-vector call.
    pub fn eval_cell(&mut self, id: CellId) -> Value {
        #[cfg(feature = "tracing")]
        let start = std::time::Instant::now();
        let body = self.record(id).body.clone();
        let result = match &body {
            CellBody::Literal(v) => v.clone(),
            CellBody::Math(op, l, r) => {
                if *op == MathOp::Neg {
                    expr::eval_math(*op, self.value(*l), None)
                } else {
                    expr::eval_math(*op, self.value(*l), Some(self.value(*r)))
                }
            }
            CellBody::Boolean(op, l, r) => {
                expr::eval_boolean(*op, self.value(*l), r.map(|r| self.value(r)))
            }
            CellBody::Relational(op, l, r) => {
                expr::eval_relational(*op, self.value(*l), self.value(*r))
            }
            CellBody::Conditional {
                cond,
                if_true,
                if_false,
                if_unknown,
            } => expr::eval_conditional(
                self.value(*cond),
                self.value(*if_true),
                self.value(*if_false),
                self.value(*if_unknown),
            ),
            CellBody::List(items) => {
                let values: Vec<Value> = items.iter().map(|i| self.value(*i).clone()).collect();
                let prev_toggle = matches!(self.record(id).value, Value::True);
                expr::eval_list(&values, prev_toggle)
            }
            CellBody::Call { name, args } => {
                let values: Vec<Value> = args.iter().map(|a| self.value(*a).clone()).collect();
                self.builtins.call(name, &values)
            }
            CellBody::Assertion { .. } => Value::Unknown, // assertions are fired, not evaluated
            CellBody::TimeCondition(_) => self.record(id).value.clone(),
            CellBody::NodeCall { node, args } => {
                let values: Vec<Value> = args.iter().map(|a| self.value(*a).clone()).collect();
                match self.node_dispatch.as_mut() {
                    Some(dispatch) => dispatch.eval_node_call(*node, &values),
                    None => self.record(id).value.clone(),
                }
            }
            CellBody::TermRef(def) => self.value(*def).clone(),
            CellBody::RuleGuard(cond) => self.value(*cond).clone(),
        };
        #[cfg(feature = "tracing")]
        if let Some(stats) = Some(&mut self.shim) {
            stats.record_eval(start.elapsed());
        }
        result
    }

    /// Given `id` is `Unknown`, ask its operands to resolve themselves,
    /// then re-evaluate and publish `id` (spec §4.5 "solve ... given this
    /// cell is Unknown, ask each operand to solve itself; used when the
    /// engine wishes to lazily resolve missing facts"). A no-op if `id` is
    /// already known. Mirrors `solveMath`/`solveConditional`/`solveList`'s
    /// per-operand recursion from `original_source` rather than
    /// `eval_cell`'s flat match — a `Math` cell gives up on its right
    /// operand if the left is still `Unknown` after solving it, and a
    /// `Conditional` always solves `if_true` eagerly alongside whichever
    /// branch the condition's current value picks out.
    pub fn solve(&mut self, id: CellId) -> Value {
        if !matches!(self.value(id), Value::Unknown) {
            return self.value(id).clone();
        }
        let body = self.record(id).body.clone();
        match &body {
            CellBody::Literal(_) | CellBody::Assertion { .. } | CellBody::TimeCondition(_) => {}
            CellBody::Math(op, l, r) => {
                self.solve(*l);
                if matches!(self.value(*l), Value::Unknown) {
                    return self.value(id).clone();
                }
                if *op != MathOp::Neg {
                    self.solve(*r);
                }
            }
            CellBody::Boolean(_, l, r) => {
                self.solve(*l);
                if let Some(r) = r {
                    self.solve(*r);
                }
            }
            CellBody::Relational(_, l, r) => {
                self.solve(*l);
                self.solve(*r);
            }
            CellBody::Conditional {
                cond,
                if_true,
                if_unknown,
                ..
            } => {
                self.solve(*cond);
                if matches!(self.value(*cond), Value::Unknown | Value::False) {
                    self.solve(*if_unknown);
                }
                self.solve(*if_true);
            }
            CellBody::List(items) => {
                for item in items.clone() {
                    self.solve(item);
                }
            }
            CellBody::Call { args, .. } => {
                for arg in args.clone() {
                    self.solve(arg);
                }
            }
            CellBody::NodeCall { node, args } => {
                for arg in args.clone() {
                    self.solve(arg);
                }
                if let Some(dispatch) = self.node_dispatch.as_mut() {
                    dispatch.solve_node_call(*node);
                }
            }
            CellBody::TermRef(def) => {
                self.solve(*def);
            }
            CellBody::RuleGuard(cond) => {
                self.solve(*cond);
            }
        }
        let old_value = self.record(id).value.clone();
        let new_value = self.eval_cell(id);
        if new_value != old_value {
            self.record_mut(id).value = new_value.clone();
            self.publish(id, Some(&old_value));
        }
        new_value
    }

    /// For call cells whose value is produced externally (node dispatch,
    /// time alarms) rather than by `eval_cell`'s pure match.
    pub fn set_value_and_publish(&mut self, id: CellId, new_value: Value) {
        let old_value = self.record(id).value.clone();
        if new_value != old_value {
            self.record_mut(id).value = new_value;
            self.publish(id, Some(&old_value));
        }
    }

    pub fn react_is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    // ---- terms (spec §4.6) ----------------------------------------------

    /// Allocate a new term cell pointing at `definition`. Not hash-consed —
    /// see [`CellBody::TermRef`].
    pub fn alloc_term_cell(&mut self, definition: CellId) -> CellId {
        let level = self.level(definition) + 1;
        self.alloc(CellKind::Term, CellBody::TermRef(definition), level)
    }

    pub fn term_definition(&self, term: CellId) -> CellId {
        match self.record(term).body {
            CellBody::TermRef(def) => def,
            _ => panic!("NB002L: term_definition called on a non-term cell"),
        }
    }

    /// Reassign a term's definition (spec §4.6 "Assigning a term ...
    /// atomically: drops the old definition, grabs the new one, publishes
    /// the term to its subscribers"). If the term currently has no active
    /// subscribers it stays lazily `Disabled` — no work is enqueued (spec
    /// §4.7 lazy evaluation).
    pub fn reassign_term(&mut self, term: CellId, new_definition: CellId) {
        let old_definition = self.term_definition(term);
        let was_enabled = !self.record(term).subscribers.is_empty()
            || !matches!(self.record(term).value, Value::Disabled);
        if was_enabled {
            self.disable(term, old_definition);
        }
        self.record_mut(term).body = CellBody::TermRef(new_definition);
        let new_level = self.level(new_definition) + 1;
        self.raise_level(term, new_level);
        if was_enabled {
            self.enable(term, new_definition);
            let old_value = self.record(term).value.clone();
            let new_value = self.eval_cell(term);
            if new_value != old_value {
                self.record_mut(term).value = new_value;
                self.publish(term, Some(&old_value));
            }
        }
    }

    /// Allocate a fresh rule-guard cell wrapping `cond` (spec §4.9). Not
    /// hash-consed — see [`CellBody::RuleGuard`]: two rules sharing a
    /// condition cell still get distinct guard objects.
    pub fn alloc_rule_guard(&mut self, cond: CellId) -> CellId {
        let level = self.level(cond) + 1;
        self.alloc(CellKind::Rule, CellBody::RuleGuard(cond), level)
    }

    /// Register `subscriber` directly as an observer of `term` without
    /// that subscriber being part of the dependency graph — used by the
    /// top-level API to force a term to stay "live" for external reads
    /// (spec §4.11 `cell_enable`).
    pub fn force_enable_root(&mut self, root: CellId) {
        if matches!(self.record(root).value, Value::Disabled) && !self.record(root).is_simple() {
            let operands = self.record(root).body.operands();
            for operand in operands {
                self.enable(root, operand);
            }
            let v = self.eval_cell(root);
            self.record_mut(root).value = v;
        }
    }

    /// The other half of [`force_enable_root`](Self::force_enable_root):
    /// release the external root's interest in `root` (spec §4.11
    /// `cell_disable`), resetting it to `Disabled` and disabling its
    /// operands in turn, provided nothing else still has it live.
    pub fn force_disable_root(&mut self, root: CellId) {
        if self.record(root).is_simple() || matches!(self.record(root).value, Value::Disabled) {
            return;
        }
        if !self.record(root).subscribers.is_empty() {
            return; // still live for another subscriber
        }
        self.record_mut(root).value = Value::Disabled;
        let operands = self.record(root).body.operands();
        for operand in operands {
            self.disable(root, operand);
        }
    }

    // ---- lifecycle -------------------------------------------------------

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_real(g: &mut Graph, n: f64) -> CellId {
        g.intern_literal(Value::Real(n))
    }

    #[test]
    fn structural_uniqueness_holds_for_expr_cells() {
        let mut g = Graph::new();
        let a = mk_real(&mut g, 1.0);
        let b = mk_real(&mut g, 2.0);
        let s1 = g.intern_expr(CellKind::Math, CellBody::Math(MathOp::Add, a, b));
        let s2 = g.intern_expr(CellKind::Math, CellBody::Math(MathOp::Add, a, b));
        assert_eq!(s1, s2);
    }

    #[test]
    fn level_strictly_exceeds_operand_levels() {
        let mut g = Graph::new();
        let a = mk_real(&mut g, 1.0);
        let b = mk_real(&mut g, 2.0);
        let s = g.intern_expr(CellKind::Math, CellBody::Math(MathOp::Add, a, b));
        assert!(g.level(s) > g.level(a));
        assert!(g.level(s) > g.level(b));
    }

    #[test]
    fn s1_arithmetic_propagation_end_to_end() {
        let mut g = Graph::new();
        let one = mk_real(&mut g, 1.0);
        let a = g.alloc_term_cell(one);
        let b = mk_real(&mut g, 2.0);
        let s = g.intern_expr(CellKind::Math, CellBody::Math(MathOp::Add, a, b));
        let root = g.intern_expr(
            CellKind::Relational,
            CellBody::Relational(RelOp::Gt, s, mk_real(&mut g, 2.0)),
        );
        g.enable(root, s);
        assert_eq!(g.value(s), &Value::Real(3.0));

        // assert a = 5
        let five = g.intern_literal(Value::Real(5.0));
        g.reassign_term(a, five);
        g.react();
        assert_eq!(g.value(s), &Value::Real(7.0));
        assert_eq!(g.value(root), &Value::True);
    }

    #[test]
    fn enable_disable_enable_returns_to_same_state() {
        let mut g = Graph::new();
        let a = mk_real(&mut g, 1.0);
        let b = mk_real(&mut g, 2.0);
        let s = g.intern_expr(CellKind::Math, CellBody::Math(MathOp::Add, a, b));
        let sink = g.intern_expr(CellKind::Boolean, CellBody::Boolean(BoolOp::Not, s, None));
        g.enable(sink, s);
        let level1 = g.level(s);
        let subs1 = g.subscriber_count(s);
        g.disable(sink, s);
        assert_eq!(g.value(s), &Value::Disabled);
        g.enable(sink, s);
        assert_eq!(g.level(s), level1);
        assert_eq!(g.subscriber_count(s), subs1);
    }

    /// A node dispatch double that only starts returning a real value
    /// after `solve_node_call` has been asked to resolve it.
    struct ResolvingDispatch {
        solved: bool,
    }
    impl NodeDispatch for ResolvingDispatch {
        fn eval_node_call(&mut self, _node: CellId, _args: &[Value]) -> Value {
            if self.solved { Value::Real(42.0) } else { Value::Unknown }
        }
        fn solve_node_call(&mut self, _node: CellId) {
            self.solved = true;
        }
    }

    #[test]
    fn solve_asks_a_node_call_to_resolve_then_republishes() {
        let mut g = Graph::new();
        g.set_node_dispatch(Box::new(ResolvingDispatch { solved: false }));
        let node = g.alloc_term_cell(g.placeholder);
        let call = g.intern_expr(CellKind::NodeCall, CellBody::NodeCall { node, args: vec![] });
        let sink = g.intern_expr(CellKind::Boolean, CellBody::Boolean(BoolOp::Not, call, None));
        g.enable(sink, call);
        assert_eq!(g.value(call), &Value::Unknown);

        let resolved = g.solve(call);
        assert_eq!(resolved, Value::Real(42.0));
        assert_eq!(g.value(call), &Value::Real(42.0));
    }

    #[test]
    fn solve_on_an_already_known_cell_is_a_no_op() {
        let mut g = Graph::new();
        let five = mk_real(&mut g, 5.0);
        assert_eq!(g.solve(five), Value::Real(5.0));
    }

    #[test]
    fn math_solve_gives_up_on_the_right_operand_when_left_stays_unknown() {
        let mut g = Graph::new();
        let unresolved = g.alloc_term_cell(g.unknown);
        let five = mk_real(&mut g, 5.0);
        let sum = g.intern_expr(CellKind::Math, CellBody::Math(MathOp::Add, unresolved, five));
        let sink = g.intern_expr(CellKind::Boolean, CellBody::Boolean(BoolOp::Not, sum, None));
        g.enable(sink, sum);
        assert_eq!(g.value(sum), &Value::Unknown);

        assert_eq!(g.solve(sum), Value::Unknown);
    }

    #[test]
    fn axon_fan_out_is_not_evaluated_linearly() {
        let mut g = Graph::new();
        let zero = mk_real(&mut g, 0.0);
        let x = g.alloc_term_cell(zero);
        let mut rels = Vec::new();
        for k in 0..(AXON_THRESHOLD as i64 + 50) {
            let k_cell = mk_real(&mut g, k as f64);
            let r = g.intern_expr(CellKind::Relational, CellBody::Relational(RelOp::Eq, x, k_cell));
            g.enable(r, x);
            rels.push(r);
        }
        let forty_two = mk_real(&mut g, 42.0);
        g.reassign_term(x, forty_two);
        let computed = g.react();
        // Only the previously-true (k=0) and newly-true (k=42) relational
        // cells should have been recomputed, not all ~58.
        assert!(computed <= 3, "expected O(1) recompute, got {computed}");
    }
}
