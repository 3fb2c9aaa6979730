//! Call-cell function bindings (spec §4.5 "call — registered pure function
//! applied to a list"): the IEEE math family plus `trace`, registered
//! through `#[nb_builtin]` (`nodebrain-macros`) and looked up by name at
//! `call` cell construction time.
//!
//! **[EXPANDED]** Legacy dotted aliases (`math.ceil`) resolve to the same
//! canonical builtin as the bare name (`ceil`) — the Open Question in the
//! original spec is resolved by keeping exactly one name table and one
//! implementation per builtin, with the alias path logging a deprecation
//! warning (`tracing::warn!`) the first time it is used.

use crate::values::Value;
use nodebrain_macros::nb_builtin;
use rustc_hash::{FxHashMap, FxHashSet};

/// A registered call-cell function (spec §4.5). `call` receives already
/// resolved argument values — `Unknown` propagation, if any, is each
/// builtin's own responsibility, matching the closed per-builtin contract
/// rather than a blanket short-circuit, since some builtins (e.g. `trace`)
/// legitimately want to see `Unknown` arguments.
pub trait Builtin: Sync {
    fn name(&self) -> &'static str;
    fn signature(&self) -> &'static str;
    fn variadic(&self) -> bool;
    fn aliases(&self) -> &'static [&'static str];
    fn call(&self, args: &[Value]) -> Value;
}

fn unary_real<F: Fn(f64) -> f64>(args: &[Value], f: F) -> Value {
    match args.first() {
        Some(Value::Real(n)) => Value::Real(f(*n)),
        _ => Value::Unknown,
    }
}

#[nb_builtin(name = "abs", signature = "d(d)", alias = "math.abs")]
fn abs(args: &[Value]) -> Value {
    unary_real(args, f64::abs)
}

#[nb_builtin(name = "sqrt", signature = "d(d)", alias = "math.sqrt")]
fn sqrt(args: &[Value]) -> Value {
    unary_real(args, f64::sqrt)
}

#[nb_builtin(name = "ceil", signature = "d(d)", alias = "math.ceil")]
fn ceil(args: &[Value]) -> Value {
    unary_real(args, f64::ceil)
}

#[nb_builtin(name = "floor", signature = "d(d)", alias = "math.floor")]
fn floor(args: &[Value]) -> Value {
    unary_real(args, f64::floor)
}

#[nb_builtin(name = "round", signature = "d(d)", alias = "math.round")]
fn round(args: &[Value]) -> Value {
    unary_real(args, f64::round)
}

#[nb_builtin(name = "trunc", signature = "d(d)", alias = "math.trunc")]
fn trunc(args: &[Value]) -> Value {
    unary_real(args, f64::trunc)
}

/// Round to the nearest integer, ties to even — the IEEE `rint` semantics
/// under the default rounding mode, distinct from `round`'s ties-away-from-
/// zero behavior.
#[nb_builtin(name = "rint", signature = "d(d)", alias = "math.rint")]
fn rint(args: &[Value]) -> Value {
    unary_real(args, f64::round_ties_even)
}

#[nb_builtin(name = "exp", signature = "d(d)", alias = "math.exp")]
fn exp(args: &[Value]) -> Value {
    unary_real(args, f64::exp)
}

#[nb_builtin(name = "log", signature = "d(d)", alias = "math.log")]
fn log(args: &[Value]) -> Value {
    unary_real(args, f64::ln)
}

#[nb_builtin(name = "log10", signature = "d(d)", alias = "math.log10")]
fn log10(args: &[Value]) -> Value {
    unary_real(args, f64::log10)
}

#[nb_builtin(name = "sin", signature = "d(d)", alias = "math.sin")]
fn sin(args: &[Value]) -> Value {
    unary_real(args, f64::sin)
}

#[nb_builtin(name = "cos", signature = "d(d)", alias = "math.cos")]
fn cos(args: &[Value]) -> Value {
    unary_real(args, f64::cos)
}

#[nb_builtin(name = "tan", signature = "d(d)", alias = "math.tan")]
fn tan(args: &[Value]) -> Value {
    unary_real(args, f64::tan)
}

#[nb_builtin(name = "pow", signature = "d(d,d)", alias = "math.pow")]
fn pow(args: &[Value]) -> Value {
    match (args.first(), args.get(1)) {
        (Some(Value::Real(b)), Some(Value::Real(e))) => Value::Real(b.powf(*e)),
        _ => Value::Unknown,
    }
}

#[nb_builtin(name = "hypot", signature = "d(d,d)", alias = "math.hypot")]
fn hypot(args: &[Value]) -> Value {
    match (args.first(), args.get(1)) {
        (Some(Value::Real(a)), Some(Value::Real(b))) => Value::Real(a.hypot(*b)),
        _ => Value::Unknown,
    }
}

#[nb_builtin(name = "mod", signature = "d(d,d)", alias = "math.mod")]
fn modulo(args: &[Value]) -> Value {
    match (args.first(), args.get(1)) {
        (Some(Value::Real(a)), Some(Value::Real(b))) if *b != 0.0 => Value::Real(a % b),
        (Some(Value::Real(_)), Some(Value::Real(_))) => Value::Unknown,
        _ => Value::Unknown,
    }
}

#[nb_builtin(name = "min", signature = "d(d,d)", alias = "math.min", variadic)]
fn min(args: &[Value]) -> Value {
    fold_real(args, f64::min)
}

#[nb_builtin(name = "max", signature = "d(d,d)", alias = "math.max", variadic)]
fn max(args: &[Value]) -> Value {
    fold_real(args, f64::max)
}

fn fold_real<F: Fn(f64, f64) -> f64>(args: &[Value], f: F) -> Value {
    let mut reals = args.iter().filter_map(|v| match v {
        Value::Real(n) => Some(*n),
        _ => None,
    });
    if reals.clone().count() != args.len() || args.is_empty() {
        return Value::Unknown;
    }
    let first = reals.next().unwrap();
    Value::Real(reals.fold(first, f))
}

/// Logs its argument at `tracing::info!` and returns it unchanged — the
/// diagnostic escape hatch named in spec §4.5's call-cell family.
#[nb_builtin(name = "trace", signature = "v(v)", variadic)]
fn trace(args: &[Value]) -> Value {
    let v = args.first().cloned().unwrap_or(Value::Unknown);
    #[cfg(feature = "tracing")]
    tracing::info!(value = %v.show(), "trace");
    v
}

/// The function-binding table a `Call` cell resolves its name against at
/// construction time (spec §4.5). Built once per [`crate::engine::Graph`]
/// via [`BuiltinTable::with_defaults`].
pub struct BuiltinTable {
    by_name: FxHashMap<&'static str, &'static dyn Builtin>,
    legacy_aliases: FxHashMap<&'static str, &'static str>,
    warned: FxHashSet<String>,
}

macro_rules! builtin_instances {
    ($($wrapper:ident),* $(,)?) => {
        &[$(&$wrapper as &'static dyn Builtin),*]
    };
}

impl BuiltinTable {
    pub fn with_defaults() -> Self {
        static ABS: __NbBuiltinABS = __NbBuiltinABS;
        static SQRT: __NbBuiltinSQRT = __NbBuiltinSQRT;
        static CEIL: __NbBuiltinCEIL = __NbBuiltinCEIL;
        static FLOOR: __NbBuiltinFLOOR = __NbBuiltinFLOOR;
        static ROUND: __NbBuiltinROUND = __NbBuiltinROUND;
        static TRUNC: __NbBuiltinTRUNC = __NbBuiltinTRUNC;
        static RINT: __NbBuiltinRINT = __NbBuiltinRINT;
        static EXP: __NbBuiltinEXP = __NbBuiltinEXP;
        static LOG: __NbBuiltinLOG = __NbBuiltinLOG;
        static LOG10: __NbBuiltinLOG10 = __NbBuiltinLOG10;
        static SIN: __NbBuiltinSIN = __NbBuiltinSIN;
        static COS: __NbBuiltinCOS = __NbBuiltinCOS;
        static TAN: __NbBuiltinTAN = __NbBuiltinTAN;
        static POW: __NbBuiltinPOW = __NbBuiltinPOW;
        static HYPOT: __NbBuiltinHYPOT = __NbBuiltinHYPOT;
        static MODULO: __NbBuiltinMODULO = __NbBuiltinMODULO;
        static MIN: __NbBuiltinMIN = __NbBuiltinMIN;
        static MAX: __NbBuiltinMAX = __NbBuiltinMAX;
        static TRACE: __NbBuiltinTRACE = __NbBuiltinTRACE;

        let instances: &[&'static dyn Builtin] = builtin_instances!(
            ABS, SQRT, CEIL, FLOOR, ROUND, TRUNC, RINT, EXP, LOG, LOG10, SIN, COS, TAN, POW,
            HYPOT, MODULO, MIN, MAX, TRACE,
        );

        let mut by_name = FxHashMap::default();
        let mut legacy_aliases = FxHashMap::default();
        for builtin in instances {
            by_name.insert(builtin.name(), *builtin);
            for alias in builtin.aliases() {
                legacy_aliases.insert(*alias, builtin.name());
            }
        }
        Self {
            by_name,
            legacy_aliases,
            warned: FxHashSet::default(),
        }
    }

    /// Resolve `name` (canonical or legacy alias) and invoke it. Unknown
    /// names are a logic error in well-formed programs — the external
    /// parser is responsible for rejecting them before a `Call` cell is
    /// ever constructed, so here it is simply `Unknown` rather than a
    /// panic (an engine invariant violation would be a parser bug, not a
    /// cell-evaluation concern).
    pub fn call(&mut self, name: &str, args: &[Value]) -> Value {
        let canonical = if self.by_name.contains_key(name) {
            name
        } else if let Some(canonical) = self.legacy_aliases.get(name).copied() {
            if self.warned.insert(name.to_string()) {
                #[cfg(feature = "tracing")]
                tracing::warn!(legacy = name, canonical, "NB001W: deprecated builtin alias");
            }
            canonical
        } else {
            return Value::Unknown;
        };
        match self.by_name.get(canonical) {
            Some(builtin) => builtin.call(args),
            None => Value::Unknown,
        }
    }

    pub fn resolve_name(&self, name: &str) -> Option<&'static str> {
        self.by_name
            .get(name)
            .map(|b| b.name())
            .or_else(|| self.legacy_aliases.get(name).copied())
    }
}

impl Default for BuiltinTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_canonical_and_legacy_alias_to_same_builtin() {
        let mut table = BuiltinTable::with_defaults();
        let a = table.call("ceil", &[Value::Real(1.2)]);
        let b = table.call("math.ceil", &[Value::Real(1.2)]);
        assert_eq!(a, Value::Real(2.0));
        assert_eq!(a, b);
    }

    #[test]
    fn division_family_handles_non_real_as_unknown() {
        let mut table = BuiltinTable::with_defaults();
        assert_eq!(table.call("sqrt", &[Value::Unknown]), Value::Unknown);
    }

    #[test]
    fn unknown_name_is_unknown_value() {
        let mut table = BuiltinTable::with_defaults();
        assert_eq!(table.call("not_a_real_builtin", &[]), Value::Unknown);
    }

    #[test]
    fn rint_rounds_ties_to_even_unlike_round() {
        let mut table = BuiltinTable::with_defaults();
        assert_eq!(table.call("rint", &[Value::Real(2.5)]), Value::Real(2.0));
        assert_eq!(table.call("rint", &[Value::Real(3.5)]), Value::Real(4.0));
    }

    #[test]
    fn hypot_computes_the_euclidean_norm() {
        let mut table = BuiltinTable::with_defaults();
        assert_eq!(table.call("hypot", &[Value::Real(3.0), Value::Real(4.0)]), Value::Real(5.0));
    }

    #[test]
    fn variadic_min_max_fold_over_all_arguments() {
        let mut table = BuiltinTable::with_defaults();
        let args = vec![Value::Real(3.0), Value::Real(1.0), Value::Real(2.0)];
        assert_eq!(table.call("min", &args), Value::Real(1.0));
        assert_eq!(table.call("max", &args), Value::Real(3.0));
    }
}
