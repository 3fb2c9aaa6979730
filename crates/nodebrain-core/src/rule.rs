//! Rule & action scheduler (spec §4.9): IF-rules attached to a node
//! context, a priority-ordered action queue drained only after `react`
//! empties its own queue, and the plan/thread instruction-stream
//! interpreter for rule procedures that are more than a single guarded
//! assertion.
//!
//! The scheduler is the [`crate::engine::RuleSink`] the engine's react
//! loop calls into whenever it reaches a rule's guard cell — see
//! `engine::Graph::react`.

use crate::engine::{Graph, RuleSink};
use crate::ids::CellId;
use crate::values::Value;
use nodebrain_common::NbError;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A rule's lifecycle status (spec §3 "Rule / Action").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStatus {
    Ready,
    Scheduled,
    Ash,
    Processing,
    Error,
    Delete,
}

/// How a rule's assertions are applied on fire (spec §4.9 "Action fire").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertMode {
    /// Always set the target, regardless of its current value.
    Assert,
    /// Set the target and record it as transient so it reverts to
    /// `Unknown` on the next alert cycle.
    Alert,
    /// Set the target only if it is currently `Unknown`.
    Default,
}

/// One `(target, value-or-formula)` pair a rule fires on action (spec §3).
#[derive(Debug, Clone)]
pub struct RuleAssertion {
    pub target: CellId,
    pub source: CellId,
}

/// A rule attached to an enabling node (spec §3, §4.9).
pub struct Rule {
    pub guard: CellId,
    pub context: CellId,
    pub assertions: Vec<RuleAssertion>,
    pub mode: AssertMode,
    pub command: Option<String>,
    pub command_opts: u32,
    pub priority: i32,
    pub status: RuleStatus,
    pub plan: Option<Plan>,
}

impl Rule {
    pub fn new(guard: CellId, context: CellId, priority: i32) -> Self {
        Self {
            guard,
            context,
            assertions: Vec::new(),
            mode: AssertMode::Assert,
            command: None,
            command_opts: 0,
            priority,
            status: RuleStatus::Ready,
            plan: None,
        }
    }
}

/// One entry in the action queue: ordered by declared priority (higher
/// fires first), ties broken by insertion order (spec §4.9 "Action list
/// ordering").
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct ActionEntry {
    priority: i32,
    seq: u64,
    rule: CellId,
}

impl Ord for ActionEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.priority, Reverse(self.seq)).cmp(&(other.priority, Reverse(other.seq)))
    }
}
impl PartialOrd for ActionEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Executes a rule's command string (spec §4.9 step 2, §6 "command
/// surface"). The external command interpreter lives outside this crate;
/// rule firing only needs somewhere to hand the text and option bits.
pub trait CommandRunner {
    fn run(&mut self, context: CellId, command: &str, options: u32) -> Result<(), NbError>;
}

/// A no-op runner for contexts with no attached command interpreter.
pub struct NullCommandRunner;
impl CommandRunner for NullCommandRunner {
    fn run(&mut self, _context: CellId, _command: &str, _options: u32) -> Result<(), NbError> {
        Ok(())
    }
}

/// The priority-ordered action scheduler (spec §4.9) and [`RuleSink`]
/// implementation the engine's react loop reports guard reaches to.
pub struct RuleScheduler {
    rules: rustc_hash::FxHashMap<CellId, Rule>,
    queue: BinaryHeap<ActionEntry>,
    next_seq: u64,
    /// Terms asserted under [`AssertMode::Alert`], bucketed by the
    /// firing rule's context — `nbassertion.c`'s `contextNode->transientLink`
    /// is per-context, so reverting one context's transient terms must not
    /// touch another context's (a rule in context A firing `alert` must
    /// not revert context B's still-pending transient assignments).
    transient: rustc_hash::FxHashMap<CellId, Vec<CellId>>,
}

impl RuleScheduler {
    pub fn new() -> Self {
        Self {
            rules: Default::default(),
            queue: BinaryHeap::new(),
            next_seq: 0,
            transient: Default::default(),
        }
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.insert(rule.guard, rule);
    }

    pub fn rule(&self, guard: CellId) -> Option<&Rule> {
        self.rules.get(&guard)
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drain the action queue in priority order, applying each rule's
    /// assertions and command (spec §4.9 "Action fire"). Assertions may
    /// themselves enqueue new react work — the caller is expected to call
    /// `graph.react()` again after this returns if `graph.react_is_idle()`
    /// is false, per spec §4.9's "the outer loop repeats until both queues
    /// are empty".
    pub fn fire_actions(
        &mut self,
        graph: &mut Graph,
        runner: &mut dyn CommandRunner,
    ) -> Result<usize, NbError> {
        let mut fired = 0;
        while let Some(ActionEntry { rule: guard, .. }) = self.queue.pop() {
            let Some(rule) = self.rules.get_mut(&guard) else {
                continue;
            };
            rule.status = RuleStatus::Processing;
            let mode = rule.mode;
            let context = rule.context;
            let command = rule.command.clone();
            let command_opts = rule.command_opts;
            let assertions = rule.assertions.clone();
            for assertion in &assertions {
                self.apply_assertion(graph, assertion, mode, context);
            }
            if let Some(cmd) = command {
                runner.run(context, &cmd, command_opts)?;
            }
            if let Some(rule) = self.rules.get_mut(&guard) {
                rule.status = RuleStatus::Ash;
            }
            fired += 1;
        }
        Ok(fired)
    }

    fn apply_assertion(
        &mut self,
        graph: &mut Graph,
        assertion: &RuleAssertion,
        mode: AssertMode,
        context: CellId,
    ) {
        let new_value = graph.value(assertion.source).clone();
        match mode {
            AssertMode::Assert => {
                graph.set_value_and_publish(assertion.target, new_value);
            }
            AssertMode::Alert => {
                graph.set_value_and_publish(assertion.target, new_value);
                self.transient.entry(context).or_default().push(assertion.target);
            }
            AssertMode::Default => {
                if matches!(graph.value(assertion.target), Value::Unknown) {
                    graph.set_value_and_publish(assertion.target, new_value);
                }
            }
        }
    }

    /// Start-of-alert-cycle reversion, scoped to one context: every term
    /// `context` asserted under [`AssertMode::Alert`] since the last call
    /// reverts to `Unknown` (spec §4.9 "alert ... record transient terms so
    /// they revert to Unknown on next alert cycle"). Other contexts'
    /// transient terms are untouched.
    pub fn revert_transient(&mut self, graph: &mut Graph, context: CellId) {
        if let Some(cells) = self.transient.remove(&context) {
            for cell in cells {
                graph.set_value_and_publish(cell, Value::Unknown);
            }
        }
    }

    /// Ash rules become Ready again on the next publish of their
    /// condition (spec §4.9) — called from the engine's publish hook for
    /// cells that are rule guards.
    pub fn reset_ash(&mut self, guard: CellId) {
        if let Some(rule) = self.rules.get_mut(&guard) {
            if rule.status == RuleStatus::Ash {
                rule.status = RuleStatus::Ready;
            }
        }
    }
}

impl Default for RuleScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSink for RuleScheduler {
    /// Trigger detection (spec §4.9): a rule is reached via the react
    /// loop because it subscribes to its guard cell. If the guard's value
    /// is in the true set and the rule is `Ready`, schedule it.
    fn on_guard_reached(&mut self, guard_cell: CellId, value: &Value) {
        let Some(rule) = self.rules.get_mut(&guard_cell) else {
            return;
        };
        if value.is_true_set() && rule.status == RuleStatus::Ready {
            rule.status = RuleStatus::Scheduled;
            let seq = self.next_seq;
            self.next_seq += 1;
            self.queue.push(ActionEntry {
                priority: rule.priority,
                seq,
                rule: guard_cell,
            });
        } else if !value.is_true_set() {
            self.reset_ash(guard_cell);
        }
    }
}

// ---- plans / rule threads (spec §3 "Plan / Thread", §4.9) --------------

/// One instruction in a compiled rule procedure (spec §4.9 "loop-begin,
/// loop-end, branch, conditional-branch-on-cell-value, step-time,
/// align-time, wait-for-timer, assert, command, value-return, exit").
#[derive(Debug, Clone)]
pub enum PlanInstr {
    LoopBegin { counter: usize, count: i32 },
    /// `body_start` is the instruction index right after the matching
    /// `LoopBegin` — where execution resumes for another pass when
    /// `loop_counters[counter]` is still positive after decrementing.
    LoopEnd { counter: usize, body_start: usize },
    Branch { target: usize },
    BranchOnValue { cond: CellId, target: usize },
    StepTime { seconds: u64 },
    AlignTime { seconds: u64 },
    WaitForTimer { cell: CellId },
    Assert { target: CellId, source: CellId, mode: AssertMode },
    Command { text: String, options: u32 },
    Return { value: Value },
    Exit,
}

/// A compiled plan program: its instruction buffer is owned by the plan,
/// not borrowed per execution (spec §5 "Plan programs own their
/// instruction buffers").
#[derive(Debug, Clone)]
pub struct Plan {
    pub instructions: Vec<PlanInstr>,
}

/// A rule thread's run state (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Timer,
    Ready,
    Stopped,
}

/// One executing instance of a [`Plan`] (spec §3): an instruction pointer,
/// ten integer loop counters, and the state driving `nb_rule_step`
/// resumption.
pub struct RuleThread {
    pub plan: Plan,
    pub ip: usize,
    pub loop_counters: [i32; 10],
    pub state: ThreadState,
    pub context: CellId,
}

impl RuleThread {
    pub fn new(plan: Plan, context: CellId) -> Self {
        Self {
            plan,
            ip: 0,
            loop_counters: [0; 10],
            state: ThreadState::Ready,
            context,
        }
    }

    /// Run until the thread hits a `wait` instruction, `Exit`, or runs off
    /// the end of the plan (spec §4.9 "executes instructions until it
    /// hits a wait"). Returns the value returned by a `Return`
    /// instruction, if one fired during this batch.
    pub fn step(&mut self, graph: &mut Graph, runner: &mut dyn CommandRunner) -> Result<Option<Value>, NbError> {
        self.state = ThreadState::Running;
        loop {
            let Some(instr) = self.plan.instructions.get(self.ip).cloned() else {
                self.state = ThreadState::Stopped;
                return Ok(None);
            };
            match instr {
                PlanInstr::LoopBegin { counter, count } => {
                    self.loop_counters[counter] = count;
                    self.ip += 1;
                }
                PlanInstr::LoopEnd { counter, body_start } => {
                    self.loop_counters[counter] -= 1;
                    if self.loop_counters[counter] > 0 {
                        self.ip = body_start;
                    } else {
                        self.ip += 1;
                    }
                }
                PlanInstr::Branch { target } => {
                    self.ip = target;
                }
                PlanInstr::BranchOnValue { cond, target } => {
                    if graph.value(cond).is_true_set() {
                        self.ip = target;
                    } else {
                        self.ip += 1;
                    }
                }
                PlanInstr::StepTime { .. } | PlanInstr::AlignTime { .. } => {
                    self.ip += 1;
                }
                PlanInstr::WaitForTimer { cell: _ } => {
                    self.state = ThreadState::Timer;
                    self.ip += 1;
                    return Ok(None);
                }
                PlanInstr::Assert { target, source, mode } => {
                    let new_value = graph.value(source).clone();
                    match mode {
                        AssertMode::Assert | AssertMode::Alert => {
                            graph.set_value_and_publish(target, new_value);
                        }
                        AssertMode::Default => {
                            if matches!(graph.value(target), Value::Unknown) {
                                graph.set_value_and_publish(target, new_value);
                            }
                        }
                    }
                    self.ip += 1;
                }
                PlanInstr::Command { text, options } => {
                    runner.run(self.context, &text, options)?;
                    self.ip += 1;
                }
                PlanInstr::Return { value } => {
                    self.ip += 1;
                    return Ok(Some(value));
                }
                PlanInstr::Exit => {
                    self.state = ThreadState::Stopped;
                    return Ok(None);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_fires_only_when_guard_enters_true_set() {
        let mut g = Graph::new();
        let mut scheduler = RuleScheduler::new();
        let cond = g.intern_literal(Value::False);
        let guard = g.alloc_rule_guard(cond);
        scheduler.add_rule(Rule::new(guard, guard, 0));

        scheduler.on_guard_reached(guard, &Value::False);
        assert_eq!(scheduler.rule(guard).unwrap().status, RuleStatus::Ready);

        scheduler.on_guard_reached(guard, &Value::True);
        assert_eq!(scheduler.rule(guard).unwrap().status, RuleStatus::Scheduled);
        assert!(!scheduler.is_idle());
    }

    #[test]
    fn actions_fire_in_priority_order() {
        let mut g = Graph::new();
        let mut scheduler = RuleScheduler::new();
        let mut runner = NullCommandRunner;

        let low = g.alloc_rule_guard(g.true_);
        let high = g.alloc_rule_guard(g.false_);
        scheduler.add_rule(Rule::new(low, low, 1));
        scheduler.add_rule(Rule::new(high, high, 10));

        scheduler.on_guard_reached(low, &Value::True);
        scheduler.on_guard_reached(high, &Value::True);

        let fired = scheduler.fire_actions(&mut g, &mut runner).unwrap();
        assert_eq!(fired, 2);
        assert_eq!(scheduler.rule(low).unwrap().status, RuleStatus::Ash);
        assert_eq!(scheduler.rule(high).unwrap().status, RuleStatus::Ash);
    }

    #[test]
    fn alert_mode_records_transient_term_for_reversion() {
        let mut g = Graph::new();
        let mut scheduler = RuleScheduler::new();
        let mut runner = NullCommandRunner;
        let guard = g.alloc_rule_guard(g.true_);
        let mut rule = Rule::new(guard, guard, 0);
        rule.mode = AssertMode::Alert;
        let target = g.alloc_term_cell(g.placeholder);
        let source = g.intern_literal(Value::Real(1.0));
        rule.assertions.push(RuleAssertion { target, source });
        scheduler.add_rule(rule);

        scheduler.on_guard_reached(guard, &Value::True);
        scheduler.fire_actions(&mut g, &mut runner).unwrap();
        assert_eq!(g.value(target), &Value::Real(1.0));

        scheduler.revert_transient(&mut g, guard);
        assert_eq!(g.value(target), &Value::Unknown);
    }

    #[test]
    fn revert_transient_is_scoped_to_its_context() {
        let mut g = Graph::new();
        let mut scheduler = RuleScheduler::new();
        let mut runner = NullCommandRunner;

        let ctx_a = g.alloc_term_cell(g.placeholder);
        let ctx_b = g.alloc_term_cell(g.placeholder);
        let guard_a = g.alloc_rule_guard(g.true_);
        let guard_b = g.alloc_rule_guard(g.false_);
        let mut rule_a = Rule::new(guard_a, ctx_a, 0);
        rule_a.mode = AssertMode::Alert;
        let target_a = g.alloc_term_cell(g.placeholder);
        let source_a = g.intern_literal(Value::Real(1.0));
        rule_a.assertions.push(RuleAssertion { target: target_a, source: source_a });
        scheduler.add_rule(rule_a);

        let mut rule_b = Rule::new(guard_b, ctx_b, 0);
        rule_b.mode = AssertMode::Alert;
        let target_b = g.alloc_term_cell(g.placeholder);
        let source_b = g.intern_literal(Value::Real(2.0));
        rule_b.assertions.push(RuleAssertion { target: target_b, source: source_b });
        scheduler.add_rule(rule_b);

        scheduler.on_guard_reached(guard_a, &Value::True);
        scheduler.on_guard_reached(guard_b, &Value::True);
        scheduler.fire_actions(&mut g, &mut runner).unwrap();
        assert_eq!(g.value(target_a), &Value::Real(1.0));
        assert_eq!(g.value(target_b), &Value::Real(2.0));

        // Reverting context A's transient terms must not touch B's.
        scheduler.revert_transient(&mut g, ctx_a);
        assert_eq!(g.value(target_a), &Value::Unknown);
        assert_eq!(g.value(target_b), &Value::Real(2.0));
    }

    /// Counts how many times its body instruction runs, so a loop's
    /// iteration count can be observed independently of graph state.
    struct CountingRunner {
        count: usize,
    }
    impl CommandRunner for CountingRunner {
        fn run(&mut self, _context: CellId, _command: &str, _options: u32) -> Result<(), NbError> {
            self.count += 1;
            Ok(())
        }
    }

    #[test]
    fn loop_end_repeats_the_body_the_declared_count() {
        let mut g = Graph::new();
        let context = g.alloc_term_cell(g.placeholder);

        // [0] LoopBegin(count=3), [1] body (Command), [2] LoopEnd -> [1], [3] Exit.
        let plan = Plan {
            instructions: vec![
                PlanInstr::LoopBegin { counter: 0, count: 3 },
                PlanInstr::Command { text: "tick".to_string(), options: 0 },
                PlanInstr::LoopEnd { counter: 0, body_start: 1 },
                PlanInstr::Exit,
            ],
        };
        let mut thread = RuleThread::new(plan, context);
        let mut counting = CountingRunner { count: 0 };

        thread.step(&mut g, &mut counting).unwrap();

        assert_eq!(counting.count, 3);
        assert_eq!(thread.state, ThreadState::Stopped);
    }
}
