//! Top-level lifecycle API (spec §4.11): the narrow surface the external
//! collaborators (textual parser, CLI front end, transport, skill-module
//! loader) consume — create cell, enable/disable, assert value, drive
//! timer, fire rules — wrapped behind one explicit [`Engine`] handle
//! constructed at `start` and torn down at `stop` (spec §9 Design Note:
//! "wrap in an explicit engine handle threaded through every API entry
//! point; construct at start, destroy at stop; no hidden globals").
//!
//! **[EXPANDED]** `EngineConfig` carries the trace flags and `--bail`
//! behavior spec §6 lists under "Environment/options recognized by the
//! core", mirroring `formualizer_eval::engine::EvalConfig`'s role as the
//! one place construction-time knobs live.

use std::cell::RefCell;
use std::rc::Rc;

use nodebrain_common::{NbError, NbErrorKind};
use rustc_hash::FxHashMap;

use crate::engine::Graph;
use crate::ids::CellId;
use crate::node::{FacetCode, FacetFn, Node, NodeTable, Skill, SkillRegistry};
use crate::rule::{CommandRunner, NullCommandRunner, Rule, RuleAssertion, RuleScheduler};
use crate::term::Glossary;
use crate::time::{TimeProc, TimeProcId, TimerQueue};
use crate::types::CellKind;
use crate::values::Value;
use crate::expr::CellBody;

/// Trace flags for cells, axons, timers and hashes (spec §6), plus the
/// `--bail` exit-code behavior (spec §6 "Exit codes"). Constructed once and
/// handed to [`Engine::new`]; nothing in the engine reads ambient globals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub trace_cells: bool,
    pub trace_axons: bool,
    pub trace_timers: bool,
    pub trace_hashes: bool,
    /// Exit 255 on the first error-class (`E`/`L`/`C`) message rather than
    /// continuing (spec §6 "Exit codes").
    pub bail_on_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trace_cells: false,
            trace_axons: false,
            trace_timers: false,
            trace_hashes: false,
            bail_on_error: false,
        }
    }
}

/// A minimal stand-in for the platform event loop's readiness primitive
/// (spec §5 "The outer event loop suspends in the platform readiness
/// primitive, waking on socket readiness or the earliest timer"). A real
/// epoll/kqueue reactor is an external collaborator per spec §1; this trait
/// is the contract such a reactor implements, and [`MockReactor`] drives
/// tests deterministically without one.
pub trait Reactor {
    /// Block until a registered fd is ready or `next_timer` (epoch seconds)
    /// elapses, returning the fds that became ready (empty on a timer-only
    /// wakeup).
    fn wait_ready(&mut self, next_timer: Option<u64>) -> Vec<i32>;
}

/// Deterministic test double for [`Reactor`]: readiness is injected by the
/// test rather than actually waiting on anything.
#[derive(Default)]
pub struct MockReactor {
    pending: std::collections::VecDeque<Vec<i32>>,
}

impl MockReactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue up the fds that should appear ready on the next `wait_ready`.
    pub fn push_ready(&mut self, fds: Vec<i32>) {
        self.pending.push_back(fds);
    }
}

impl Reactor for MockReactor {
    fn wait_ready(&mut self, _next_timer: Option<u64>) -> Vec<i32> {
        self.pending.pop_front().unwrap_or_default()
    }
}

/// A context handle (spec §4.11 `start(args) -> context`): the node an
/// external collaborator is operating within — the root context for
/// top-level asserts/commands, or a specific node addressed by `<node>.`
/// command syntax (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Context(pub CellId);

/// Adapter so a shared, interior-mutable [`RuleScheduler`] can sit behind
/// [`crate::engine::Graph`]'s `rule_sink` hook while [`Engine`] still holds
/// its own handle to call `fire_actions` after each react wave — the
/// `Rc<RefCell<_>>` is the one piece of shared mutable state the engine
/// handle owns, in place of the spec's process-wide globals (spec §9
/// Design Note).
impl crate::engine::RuleSink for Rc<RefCell<RuleScheduler>> {
    fn on_guard_reached(&mut self, guard_cell: CellId, value: &Value) {
        self.borrow_mut().on_guard_reached(guard_cell, value);
    }
}

/// Same sharing trick as [`RuleScheduler`] above, so a `NodeCall` cell's
/// `eval` can route through the same [`NodeTable`] [`Engine`] otherwise
/// owns outright (spec §4.10).
impl crate::engine::NodeDispatch for Rc<RefCell<NodeTable>> {
    fn eval_node_call(&mut self, node: CellId, args: &[Value]) -> Value {
        self.borrow_mut().eval_call(node, args)
    }

    fn solve_node_call(&mut self, node: CellId) {
        self.borrow_mut().solve_call(node);
    }
}

/// The engine handle every top-level API entry point is a method on (spec
/// §4.11). Constructed at [`Engine::start`], torn down at
/// [`Engine::stop`].
pub struct Engine {
    pub graph: Graph,
    pub rules: Rc<RefCell<RuleScheduler>>,
    pub nodes: Rc<RefCell<NodeTable>>,
    pub skills: SkillRegistry,
    pub root: Glossary,
    pub timers: TimerQueue,
    pub config: EngineConfig,
    command_runner: Box<dyn CommandRunner>,
    time_procs: Vec<TimeProc>,
    cell_names: FxHashMap<CellId, String>,
    clock: u64,
    alerting: bool,
    bailed: bool,
    root_context: Context,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let mut graph = Graph::new();
        let rules = Rc::new(RefCell::new(RuleScheduler::new()));
        graph.set_rule_sink(Box::new(rules.clone()));
        let nodes = Rc::new(RefCell::new(NodeTable::new()));
        graph.set_node_dispatch(Box::new(nodes.clone()));

        let root_cell = graph.alloc_term_cell(graph.placeholder);
        nodes
            .borrow_mut()
            .insert(Node::new(root_cell, Box::new(crate::node::UnknownSkill)));

        Self {
            graph,
            rules,
            nodes,
            skills: SkillRegistry::new(),
            root: Glossary::new(),
            timers: TimerQueue::new(),
            config,
            command_runner: Box::new(NullCommandRunner),
            time_procs: Vec::new(),
            cell_names: FxHashMap::default(),
            clock: 0,
            alerting: false,
            bailed: false,
            root_context: Context(root_cell),
        }
    }

    /// `start(args) -> context` (spec §4.11): construct the engine and
    /// return the root context external collaborators issue commands
    /// against. `args` stand in for the command-line options an external
    /// front end would have already parsed into an `EngineConfig`.
    pub fn start(config: EngineConfig) -> (Self, Context) {
        let engine = Self::new(config);
        let ctx = engine.root_context;
        (engine, ctx)
    }

    /// `stop(context) -> exitcode` (spec §4.11, §6 "Exit codes").
    pub fn stop(&mut self, _context: Context) -> i32 {
        if self.bailed {
            return 255;
        }
        0
    }

    pub fn set_command_runner(&mut self, runner: Box<dyn CommandRunner>) {
        self.command_runner = runner;
    }

    /// Record a bail-triggering error-class message (spec §6 "255 bail on
    /// error triggered by first error-class message when --bail is set").
    fn note_error(&mut self) {
        if self.config.bail_on_error {
            self.bailed = true;
        }
    }

    // ---- command surface (spec §6; parser itself is external) ----------

    /// `cmd(context, text, options)` (spec §4.11): hand a pre-parsed
    /// command string to the external command interpreter. The textual
    /// grammar (spec §6) is the parser's concern; this is the narrow hook
    /// it drives.
    pub fn cmd(&mut self, context: Context, text: &str, options: u32) -> Result<(), NbError> {
        let result = self.command_runner.run(context.0, text, options);
        if result.is_err() {
            self.note_error();
        }
        result
    }

    /// `source(context, file)` (spec §4.11). Textual inclusion (`%include`/
    /// `%use`) and `${...}`/`%{...}` substitution are the external parser's
    /// grammar (spec §1 scope cut, §6); this entry point is the narrow hook
    /// it would drive once it has tokenized a file into calls against this
    /// API, so the core itself does not open or read files.
    pub fn source(&mut self, _context: Context, file: &str) -> Result<(), NbError> {
        Err(NbError::new(NbErrorKind::Logic)
            .with_message(format!("source: no parser attached to load '{file}'")))
    }

    // ---- terms & glossary (spec §4.6, §4.11) ----------------------------

    /// `term_locate(context, ident)` (spec §4.11).
    pub fn term_locate(&self, context: Context, ident: &str) -> Option<CellId> {
        if context == self.root_context {
            self.root.resolve(ident)
        } else {
            self.nodes.borrow().get(context.0)?.glossary.resolve(ident)
        }
    }

    /// `term_new` (spec §4.11): bind `name` to `definition` in `context`'s
    /// glossary.
    pub fn term_new(&mut self, context: Context, name: &str, definition: CellId) -> CellId {
        let mut graph = std::mem::replace(&mut self.graph, Graph::new());
        let cell = if context == self.root_context {
            self.root.define(&mut graph, name, definition)
        } else {
            let nodes = self.nodes.clone();
            let mut nodes = nodes.borrow_mut();
            let node = nodes.get_mut(context.0).expect("unknown context");
            node.glossary.define(&mut graph, name, definition)
        };
        self.graph = graph;
        self.cell_names.insert(cell, name.to_string());
        cell
    }

    /// `term_assign` (spec §4.11, §4.6 "Assigning a term"): reassign an
    /// existing term's definition.
    pub fn term_assign(
        &mut self,
        context: Context,
        path: &str,
        new_definition: CellId,
    ) -> Result<CellId, NbError> {
        let mut graph = std::mem::replace(&mut self.graph, Graph::new());
        let result = if context == self.root_context {
            self.root.reassign(&mut graph, path, new_definition)
        } else {
            let nodes = self.nodes.clone();
            let mut nodes = nodes.borrow_mut();
            let node = nodes.get_mut(context.0).expect("unknown context");
            node.glossary.reassign(&mut graph, path, new_definition)
        };
        self.graph = graph;
        if result.is_err() {
            self.note_error();
        }
        result
    }

    // ---- cells (spec §4.4, §4.7, §4.11) ---------------------------------

    pub fn cell_create_string(&mut self, s: &str) -> CellId {
        self.graph.intern_literal(Value::Str(std::rc::Rc::from(s)))
    }

    pub fn cell_create_real(&mut self, n: f64) -> CellId {
        self.graph.intern_literal(Value::Real(n))
    }

    pub fn cell_get_type(&self, cell: CellId) -> CellKind {
        self.graph.kind(cell)
    }

    pub fn cell_get_string(&self, cell: CellId) -> Option<std::rc::Rc<str>> {
        match self.graph.value(cell) {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn cell_get_real(&self, cell: CellId) -> Option<f64> {
        match self.graph.value(cell) {
            Value::Real(n) => Some(*n),
            _ => None,
        }
    }

    /// The term name this cell was last bound under, if any (spec §4.11
    /// `cell_get_name`) — a small reverse index kept alongside the
    /// glossaries, since a glossary only maps name → cell, not back.
    pub fn cell_get_name(&self, cell: CellId) -> Option<&str> {
        self.cell_names.get(&cell).map(|s| s.as_str())
    }

    /// `cell_enable` (spec §4.11): make an external root caller an implicit
    /// subscriber of `cell`, priming its value if it was lazily `Disabled`.
    pub fn cell_enable(&mut self, cell: CellId) {
        self.graph.force_enable_root(cell);
    }

    /// `cell_disable` (spec §4.11): release the external root's interest.
    pub fn cell_disable(&mut self, cell: CellId) {
        self.graph.force_disable_root(cell);
    }

    /// `cell_compute` (spec §4.11): compute what `cell`'s value *would be*
    /// right now without storing or publishing it — distinct from the
    /// `eval` the react loop drives (spec §4.5 "compute").
    pub fn cell_compute(&mut self, cell: CellId) -> Value {
        self.graph.eval_cell(cell)
    }

    /// `cell_publish` (spec §4.11): manually re-announce a cell's current
    /// value to its subscribers — used when a skill facet mutated a node's
    /// value out of band (spec §4.10 node dispatch) rather than through
    /// `eval_cell`.
    pub fn cell_publish(&mut self, cell: CellId) {
        let old = self.graph.value(cell).clone();
        self.graph.publish(cell, Some(&old));
    }

    /// `cell_drop` (spec §4.11): release the external API's reference to
    /// `cell`. Full reference-counted slab reclamation (spec §4.1, §3
    /// "Lifetimes") is out of scope for this port — the data model forbids
    /// cycles by construction (spec Non-goals), so an unreferenced cell is
    /// simply left disabled and unreachable from outside rather than
    /// physically recycled; see `DESIGN.md`.
    pub fn cell_drop(&mut self, cell: CellId) {
        self.graph.force_disable_root(cell);
    }

    // ---- lists (spec §3 "list", §4.11 `list_open/get/insert`) ----------

    /// `list_open` (spec §4.11): begin building a list cell incrementally.
    pub fn list_open(&self) -> ListBuilder {
        ListBuilder { members: Vec::new() }
    }

    /// `list_get` (spec §4.11): read back a member of an already-interned
    /// list cell by index.
    pub fn list_get(&self, list: CellId, index: usize) -> Option<CellId> {
        match self.graph.body(list) {
            CellBody::List(members) => members.get(index).copied(),
            _ => None,
        }
    }

    // ---- rule assertions (spec §3 "Assertion", §4.9) --------------------

    /// `assertion_add_term_value` (spec §4.11): append a `(target, value)`
    /// pair to a rule's pending assertion list.
    pub fn assertion_add_term_value(
        &self,
        assertions: &mut Vec<RuleAssertion>,
        target: CellId,
        value: CellId,
    ) {
        assertions.push(RuleAssertion { target, source: value });
    }

    // ---- rules (spec §4.9) ----------------------------------------------

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.borrow_mut().add_rule(rule);
    }

    /// Drain react and the action queue until both are empty (spec §2,
    /// §4.9 "the outer loop repeats until both queues are empty").
    pub fn react_and_fire(&mut self) -> Result<(), NbError> {
        loop {
            self.graph.react();
            let fired = self
                .rules
                .borrow_mut()
                .fire_actions(&mut self.graph, self.command_runner.as_mut())?;
            if fired == 0 && self.graph.react_is_idle() {
                return Ok(());
            }
        }
    }

    /// Top-level `assert <term>=<value>` (spec §6): reassign a term then
    /// drain the resulting wave.
    pub fn assert(&mut self, context: Context, path: &str, value: CellId) -> Result<(), NbError> {
        self.term_assign(context, path, value)?;
        self.react_and_fire()
    }

    /// Top-level `alert <term>=<value>` (spec §6, §4.9 "Alert mode"): first
    /// revert whatever transient terms *this context's* previous alert
    /// cycle recorded back to `Unknown` (spec "... so they revert to
    /// Unknown on next alert cycle" — the reversion is due at the start of
    /// the next cycle, not the end of the one that set them, matching
    /// scenario S5; scoped to `context` so one context's alert never reverts
    /// another's pending transient assignments), then assign and drain the
    /// resulting wave.
    pub fn alert_assign(&mut self, context: Context, path: &str, value: CellId) -> Result<(), NbError> {
        self.rules.borrow_mut().revert_transient(&mut self.graph, context.0);
        self.term_assign(context, path, value)?;
        self.react_and_fire()
    }

    // ---- node / skill dispatch (spec §4.10, §4.11) ----------------------

    pub fn skill_declare<F>(&mut self, name: &str, ctor: F)
    where
        F: Fn() -> Box<dyn Skill> + 'static,
    {
        self.skills.declare(name, ctor);
    }

    /// `skill_set_method` (spec §4.11): patch one facet of a live node's
    /// skill (see [`crate::node::OverridableSkill`]).
    pub fn skill_set_method(
        &mut self,
        node: CellId,
        code: FacetCode,
        f: FacetFn,
    ) -> Result<(), NbError> {
        self.nodes.borrow_mut().patch_skill_method(node, code, f)
    }

    /// `node_alert` (spec §4.11).
    pub fn node_alert(&mut self, node: CellId, target: &str, value: &Value) -> Result<(), NbError> {
        let result = self.nodes.borrow_mut().alert(node, target, value);
        if result.is_err() {
            self.note_error();
        }
        result
    }

    /// Construct a node bound to a declared (or Unknown-fallback) skill
    /// and register it as a term in `context`'s glossary (spec §6 "define
    /// <term> node <skill>[(args)]").
    pub fn define_node(&mut self, context: Context, name: &str, skill_name: &str) -> CellId {
        let skill = self.skills.resolve(skill_name);
        let placeholder = self.graph.placeholder;
        let cell = self.term_new(context, name, placeholder);
        self.nodes.borrow_mut().insert(Node::new(cell, skill));
        cell
    }

    /// `<node>(args)` (spec §4.10): intern a node-call expression cell keyed
    /// by `(node, args)` like any other expression — `eval_cell` routes it
    /// through [`crate::engine::NodeDispatch`] to the node's `eval` facet,
    /// and it stays reactive to both the node and its arguments the same
    /// way a `Math`/`Relational` cell does to its operands.
    pub fn node_call(&mut self, node: CellId, args: Vec<CellId>) -> CellId {
        self.graph.intern_expr(CellKind::NodeCall, CellBody::NodeCall { node, args })
    }

    // ---- time conditions & timer queue (spec §4.8) ----------------------

    /// Register a compiled time procedure as a reactive cell (spec §4.8):
    /// not structurally hash-consed against other identical time
    /// conditions the way math/relational cells are (see `DESIGN.md`) —
    /// each `define ... cell ~30m` occurrence compiles its own procedure,
    /// matching how the original engine attaches a distinct timer entry
    /// per definition site rather than sharing compiled calendar trees.
    pub fn define_time_condition(&mut self, proc: TimeProc) -> CellId {
        let index = self.time_procs.len() as u32;
        self.time_procs.push(proc.clone());
        let cell = self
            .graph
            .intern_expr(CellKind::TimeCondition, CellBody::TimeCondition(TimeProcId(index)));
        let transition = proc.next_transition(self.clock);
        if let Some(t) = transition.next_true_start {
            self.timers.set(cell, t);
        }
        cell
    }

    /// Register a timer directly against a node cell so its skill's
    /// `alarm` facet is driven by [`Engine::alert`] (spec §4.10 `alarm`).
    pub fn set_node_timer(&mut self, node: CellId, expiration: u64) {
        self.timers.set(node, expiration);
    }

    /// `alert` (spec §4.8 "Timer queue"): drain all timers due at `now`,
    /// dispatch each to a time-condition toggle or a node's `alarm` facet,
    /// then react once over the whole batch (spec §5 "an alert batch is
    /// fully propagated (one react) before the next second is processed").
    /// Unlike [`alert_assign`](Self::alert_assign), the clock tick has no
    /// context of its own and never reverts transient terms — `nbclock.c`'s
    /// tick handler carries no transient-term logic at all, that belongs
    /// solely to the explicit `alert <term>=<value>` command path.
    /// Re-entrant calls are a fatal logic error (spec §5 `clockAlerting`).
    pub fn alert(&mut self, now: u64) -> Result<(), NbError> {
        if self.alerting {
            return Err(NbError::logic("NB003L: re-entrant clock alert"));
        }
        self.alerting = true;
        self.clock = now;
        let fired = self.timers.drain_batch(now);
        for cell in fired {
            if let Some(node) = self.nodes.borrow_mut().get_mut(cell) {
                node.skill.alarm(now);
                continue;
            }
            if let CellBody::TimeCondition(proc_id) = self.graph.body(cell).clone() {
                let proc = self.time_procs[proc_id.0 as usize].clone();
                let toggled_true = !matches!(self.graph.value(cell), Value::True);
                self.graph
                    .set_value_and_publish(cell, if toggled_true { Value::True } else { Value::False });
                let transition = proc.next_transition(now);
                if let Some(t) = transition.next_true_start {
                    self.timers.set(cell, t);
                }
            }
        }
        self.alerting = false;
        self.react_and_fire()
    }

    // ---- listeners / outer event loop (spec §4.11, §5) ------------------

    /// `listener_start` (spec §4.11): the engine's main loop, wrapping the
    /// platform event loop (`reactor`) and the timer queue. Runs until
    /// `should_stop` returns true; each iteration waits for readiness (or
    /// the next timer), calls every handler registered for a ready fd via
    /// `listener_add`, and drives one `alert` pass when the wait returns
    /// because the timer — not an fd — fired.
    pub fn listener_start<R: Reactor>(
        &mut self,
        reactor: &mut R,
        listeners: &mut FxHashMap<i32, Box<dyn FnMut(&mut Engine)>>,
        now: impl Fn() -> u64,
        mut should_stop: impl FnMut(&Engine) -> bool,
    ) -> Result<(), NbError> {
        while !should_stop(self) {
            let next_timer = if self.timers.is_empty() { None } else { Some(now()) };
            let ready = reactor.wait_ready(next_timer);
            if ready.is_empty() {
                self.alert(now())?;
                continue;
            }
            for fd in ready {
                if let Some(handler) = listeners.get_mut(&fd) {
                    handler(self);
                }
            }
            self.react_and_fire()?;
        }
        Ok(())
    }
}

/// Incremental list-cell builder (spec §4.11 `list_open`/`insert`): collect
/// members, then intern the finished sequence the same way any other
/// expression cell is interned (spec §4.3's use/locate protocol applies
/// uniformly — a list is just a `CellBody::List` structural key).
pub struct ListBuilder {
    members: Vec<CellId>,
}

impl ListBuilder {
    /// `list_insert` (spec §4.11): append a member.
    pub fn insert(&mut self, member: CellId) {
        self.members.push(member);
    }

    /// Finish building and intern the list cell.
    pub fn finish(self, graph: &mut Graph) -> CellId {
        graph.intern_expr(CellKind::List, CellBody::List(self.members))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{MathOp, RelOp};

    fn mk_engine() -> (Engine, Context) {
        Engine::start(EngineConfig::default())
    }

    #[test]
    fn s1_arithmetic_propagation_via_top_level_api() {
        let (mut e, ctx) = mk_engine();
        let one = e.cell_create_real(1.0);
        let two = e.cell_create_real(2.0);
        let a = e.term_new(ctx, "a", one);
        let b = e.term_new(ctx, "b", two);
        let s_expr = e.graph.intern_expr(CellKind::Math, CellBody::Math(MathOp::Add, a, b));
        let s = e.term_new(ctx, "s", s_expr);
        e.cell_enable(s);

        // s = 3 initially, which must stay below the guard's threshold so
        // the guard only crosses into the true set *after* the assert
        // below — a guard that is already true at enable time never
        // transitions through `publish`/`react` and so never reaches the
        // rule scheduler at all.
        let threshold = e.cell_create_real(5.0);
        let guard_expr = e
            .graph
            .intern_expr(CellKind::Relational, CellBody::Relational(RelOp::Gt, s_expr, threshold));
        let guard = e.graph.alloc_rule_guard(guard_expr);
        e.cell_enable(guard);
        e.add_rule(Rule::new(guard, ctx.0, 0));

        let five = e.cell_create_real(5.0);
        e.assert(ctx, "a", five).unwrap();

        assert_eq!(e.cell_get_real(s), Some(7.0));
        assert_eq!(e.rules.borrow().rule(guard).unwrap().status, crate::rule::RuleStatus::Ash);
    }

    #[test]
    fn s5_transient_alert_reverts_to_unknown_on_next_alert_without_it() {
        let (mut e, ctx) = mk_engine();
        let unknown = e.graph.unknown;
        let t = e.term_new(ctx, "t", unknown);
        e.cell_enable(t);

        // Guard is driven by `t` itself so it starts `Unknown` (not yet in
        // the true set) and only crosses into it once `t` is actually
        // assigned — a guard already true at enable time never transitions
        // through `publish`/`react`, so it would never reach the scheduler.
        let first = e.cell_create_string("first");
        let guard_expr = e
            .graph
            .intern_expr(CellKind::Relational, CellBody::Relational(RelOp::Eq, t, first));
        let guard = e.graph.alloc_rule_guard(guard_expr);
        let mut rule = Rule::new(guard, ctx.0, 0);
        rule.mode = crate::rule::AssertMode::Alert;
        rule.assertions.push(RuleAssertion { target: t, source: first });
        e.add_rule(rule);
        e.cell_enable(guard);

        // `alert N.t="first"` — fires the rule, which itself marks `t`
        // transient via Alert mode.
        e.alert_assign(ctx, "t", first).unwrap();
        assert_eq!(e.cell_get_string(t).map(|s| s.to_string()), Some("first".to_string()));

        // A second, unrelated alert cycle reverts `t` at its start.
        let other_def = e.cell_create_string("x");
        e.term_new(ctx, "other", e.graph.placeholder);
        e.alert_assign(ctx, "other", other_def).unwrap();
        assert_eq!(e.graph.value(t), &Value::Unknown);
    }

    #[test]
    fn list_builder_interns_like_any_expression_cell() {
        let (mut e, _ctx) = mk_engine();
        let a = e.cell_create_real(1.0);
        let b = e.cell_create_real(2.0);
        let mut builder = e.list_open();
        builder.insert(a);
        builder.insert(b);
        let list = builder.finish(&mut e.graph);
        assert_eq!(e.list_get(list, 0), Some(a));
        assert_eq!(e.list_get(list, 1), Some(b));
        assert_eq!(e.list_get(list, 2), None);
    }

    #[test]
    fn s6_node_call_reacts_to_argument_changes() {
        struct Sum;
        impl Skill for Sum {
            fn identifier(&self) -> &'static str {
                "sum"
            }
            fn eval(&mut self, args: &[Value]) -> Value {
                let mut total = 0.0;
                for a in args {
                    match a {
                        Value::Real(n) => total += n,
                        _ => return Value::Unknown,
                    }
                }
                Value::Real(total)
            }
        }
        let (mut e, ctx) = mk_engine();
        e.skill_declare("sum", || Box::new(Sum));
        let node_cell = e.define_node(ctx, "F", "sum");

        let three = e.cell_create_real(3.0);
        let four = e.cell_create_real(4.0);
        let arg_a = e.term_new(ctx, "arg_a", three);
        let arg_b = e.term_new(ctx, "arg_b", four);
        let call = e.node_call(node_cell, vec![arg_a, arg_b]);
        let y = e.term_new(ctx, "y", call);
        e.cell_enable(y);

        assert_eq!(e.cell_get_real(y), Some(7.0));

        let ten = e.cell_create_real(10.0);
        e.assert(ctx, "arg_a", ten).unwrap();
        assert_eq!(e.cell_get_real(y), Some(14.0));
    }

    #[test]
    fn reentrant_alert_is_a_logic_error() {
        let (mut e, _ctx) = mk_engine();
        e.alerting = true;
        assert!(e.alert(0).is_err());
    }

    #[test]
    fn skill_set_method_patches_eval_on_a_defined_node() {
        struct Echo;
        impl Skill for Echo {
            fn identifier(&self) -> &'static str {
                "echo"
            }
            fn eval(&mut self, args: &[Value]) -> Value {
                args.first().cloned().unwrap_or(Value::Unknown)
            }
        }
        let (mut e, ctx) = mk_engine();
        e.skill_declare("echo", || Box::new(Echo));
        let node_cell = e.define_node(ctx, "n", "echo");
        e.skill_set_method(
            node_cell,
            FacetCode::Eval,
            FacetFn::Eval(Box::new(|_: &[Value]| Value::Real(42.0))),
        )
        .unwrap();
        let result = e.nodes.borrow_mut().eval_call(node_cell, &[Value::Real(1.0)]);
        assert_eq!(result, Value::Real(42.0));
    }
}
