//! End-to-end coverage for the six testable properties NodeBrain's
//! semantics are judged against. Exercised directly against [`Engine`]
//! rather than through a textual front end, since no parser ships in this
//! crate (see `nodebrain_core::api` for why).

use nodebrain::core::expr::{CellBody, RelOp};
use nodebrain::core::node::{FacetCode, FacetFn, Skill};
use nodebrain::core::rule::{AssertMode, Rule, RuleAssertion};
use nodebrain::core::time::TimeProc;
use nodebrain::core::types::CellKind;
use nodebrain::{Context, Engine, EngineConfig, Value};

fn start() -> (Engine, Context) {
    Engine::start(EngineConfig::default())
}

/// S1: `a+b` crossing a guard threshold fires its rule and shows the new sum.
#[test]
fn s1_arithmetic_propagation_fires_on_threshold_crossing() {
    let (mut e, ctx) = start();
    let one = e.cell_create_real(1.0);
    let two = e.cell_create_real(2.0);
    let a = e.term_new(ctx, "a", one);
    let b = e.term_new(ctx, "b", two);
    let s_expr = e.graph.intern_expr(
        CellKind::Math,
        CellBody::Math(nodebrain::core::expr::MathOp::Add, a, b),
    );
    let s = e.term_new(ctx, "s", s_expr);
    e.cell_enable(s);
    assert_eq!(e.cell_get_real(s), Some(3.0));

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
    assert_eq!(
        e.rules.borrow().rule(guard).unwrap().status,
        nodebrain::core::rule::RuleStatus::Ash
    );
}

/// S2: an `Unknown` operand makes the whole sum `Unknown`, not an error.
#[test]
fn s2_unknown_propagates_through_arithmetic() {
    let (mut e, ctx) = start();
    let unknown = e.graph.unknown;
    let three = e.cell_create_real(3.0);
    let a = e.term_new(ctx, "a", unknown);
    let b = e.term_new(ctx, "b", three);
    let x_expr = e.graph.intern_expr(
        CellKind::Math,
        CellBody::Math(nodebrain::core::expr::MathOp::Add, a, b),
    );
    let x = e.term_new(ctx, "x", x_expr);
    e.cell_enable(x);

    assert_eq!(e.graph.value(x), &Value::Unknown);
}

/// S3: registering 1000 equality guards on one cell and asserting one value
/// fires exactly the one rule whose constant matches — the axon fast path
/// must not walk every subscriber linearly to find it.
#[test]
fn s3_axon_fan_out_fires_exactly_one_of_a_thousand_rules() {
    let (mut e, ctx) = start();
    let zero = e.cell_create_real(0.0);
    let x = e.term_new(ctx, "x", zero);
    e.cell_enable(x);

    let mut guards = Vec::with_capacity(1000);
    for k in 1..=1000i64 {
        let k_cell = e.cell_create_real(k as f64);
        let guard_expr = e
            .graph
            .intern_expr(CellKind::Relational, CellBody::Relational(RelOp::Eq, x, k_cell));
        let guard = e.graph.alloc_rule_guard(guard_expr);
        e.cell_enable(guard);
        e.add_rule(Rule::new(guard, ctx.0, 0));
        guards.push(guard);
    }

    let target = e.cell_create_real(742.0);
    e.assert(ctx, "x", target).unwrap();

    let fired = guards
        .iter()
        .filter(|g| e.rules.borrow().rule(**g).unwrap().status == nodebrain::core::rule::RuleStatus::Ash)
        .count();
    assert_eq!(fired, 1);
    assert_eq!(
        e.rules.borrow().rule(guards[741]).unwrap().status,
        nodebrain::core::rule::RuleStatus::Ash
    );
}

/// S4: a pulse time condition toggles on schedule and its rule fires, driven
/// purely by `alert(now)` ticks rather than wall-clock sleeping.
#[test]
fn s4_timer_alarm_fires_on_schedule_without_drift() {
    let (mut e, ctx) = start();
    let pulse = e.define_time_condition(TimeProc::Pulse { width_secs: 10 });
    e.cell_enable(pulse);

    let guard = e.graph.alloc_rule_guard(pulse);
    e.cell_enable(guard);
    e.add_rule(Rule::new(guard, ctx.0, 0));

    let mut fires = 0;
    for tick in 1..=35u64 {
        e.alert(tick).unwrap();
        if e.rules.borrow().rule(guard).unwrap().status == nodebrain::core::rule::RuleStatus::Ash {
            fires += 1;
            e.rules.borrow_mut().reset_ash(guard);
        }
    }
    // A 10s pulse crossing true within a 35s window fires at least twice
    // and never more often than every 10s (no cumulative drift).
    assert!(fires >= 2);
    assert!(fires <= 4);
}

/// S5: an `Alert`-mode assertion marks its target transient; the *next*
/// alert cycle (even one unrelated to the original term) reverts it to
/// `Unknown` rather than leaving it sticky.
#[test]
fn s5_alert_mode_assertion_reverts_on_next_cycle() {
    let (mut e, ctx) = start();
    let unknown = e.graph.unknown;
    let t = e.term_new(ctx, "t", unknown);
    e.cell_enable(t);

    let first = e.cell_create_string("first");
    let guard_expr = e
        .graph
        .intern_expr(CellKind::Relational, CellBody::Relational(RelOp::Eq, t, first));
    let guard = e.graph.alloc_rule_guard(guard_expr);
    let mut rule = Rule::new(guard, ctx.0, 0);
    rule.mode = AssertMode::Alert;
    rule.assertions.push(RuleAssertion { target: t, source: first });
    e.add_rule(rule);
    e.cell_enable(guard);

    e.alert_assign(ctx, "t", first).unwrap();
    assert_eq!(e.cell_get_string(t).map(|s| s.to_string()), Some("first".to_string()));

    let x = e.cell_create_string("x");
    e.term_new(ctx, "other", e.graph.placeholder);
    e.alert_assign(ctx, "other", x).unwrap();
    assert_eq!(e.graph.value(t), &Value::Unknown);
}

/// S6: a node-call cell dispatches to its skill's `eval` and stays reactive
/// to argument changes, recomputing without re-registering anything.
#[test]
fn s6_node_call_dispatches_and_stays_reactive() {
    struct Fire;
    impl Skill for Fire {
        fn identifier(&self) -> &'static str {
            "fire"
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
    let (mut e, ctx) = start();
    e.skill_declare("fire", || Box::new(Fire));
    let f = e.define_node(ctx, "F", "fire");

    let three = e.cell_create_real(3.0);
    let four = e.cell_create_real(4.0);
    let arg0 = e.term_new(ctx, "arg0", three);
    let arg1 = e.term_new(ctx, "arg1", four);
    let call = e.node_call(f, vec![arg0, arg1]);
    let y = e.term_new(ctx, "y", call);
    e.cell_enable(y);

    assert_eq!(e.cell_get_real(y), Some(7.0));

    let nine = e.cell_create_real(9.0);
    e.assert(ctx, "arg1", nine).unwrap();
    assert_eq!(e.cell_get_real(y), Some(12.0));
}

/// Sanity check that a patched facet (spec §4.11 `skill_set_method`) takes
/// over a node's eval behavior immediately for subsequent calls.
#[test]
fn patched_node_facet_takes_effect_immediately() {
    struct Noop;
    impl Skill for Noop {
        fn identifier(&self) -> &'static str {
            "noop"
        }
    }
    let (mut e, ctx) = start();
    e.skill_declare("noop", || Box::new(Noop));
    let node = e.define_node(ctx, "n", "noop");
    e.skill_set_method(
        node,
        FacetCode::Eval,
        FacetFn::Eval(Box::new(|args: &[Value]| args.first().cloned().unwrap_or(Value::Unknown))),
    )
    .unwrap();

    let arg = e.cell_create_real(5.0);
    let call = e.node_call(node, vec![arg]);
    assert_eq!(e.cell_compute(call), Value::Real(5.0));
    assert!(matches!(e.graph.kind(e.graph.unknown), CellKind::Unknown));
}
