//! Axon optimizations (spec §4.7): short-circuit N-way equality/comparison
//! fan-out so that asserting a high-fanout publisher does not force the
//! engine to re-evaluate every `pub = c_i` / `pub < c_i` subscriber.
//!
//! Axons are transparent — they exist only as bookkeeping the engine
//! consults inside `publish`; they are never user-visible cells and never
//! appear in `CellBody`.

use crate::ids::CellId;
use crate::values::Value;
use rustc_hash::{FxHashMap, FxHashSet};

/// A hashable/orderable stand-in for the constant a relational cell
/// compares its publisher against, used to index axon members.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstKey {
    Real(f64),
    Str(String),
}

impl ConstKey {
    pub fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Real(n) => Some(ConstKey::Real(*n)),
            Value::Str(s) => Some(ConstKey::Str(s.to_string())),
            _ => None,
        }
    }

    fn real(&self) -> Option<f64> {
        match self {
            ConstKey::Real(n) => Some(*n),
            _ => None,
        }
    }
}
impl Eq for ConstKey {}
impl std::hash::Hash for ConstKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            ConstKey::Real(n) => n.to_bits().hash(state),
            ConstKey::Str(s) => s.hash(state),
        }
    }
}

/// Below this many equality-style subscribers on one publisher, the
/// engine just re-evaluates every subscriber normally — building an axon
/// only pays for itself at higher fan-out (spec: "for publishers with
/// many relational subscribers").
pub const AXON_THRESHOLD: usize = 8;

/// A not-yet-materialized axon membership, buffered per publisher until
/// its candidate count reaches [`AXON_THRESHOLD`]. Below the threshold
/// the publisher simply has no entry in `Graph`'s axon table, so
/// `publish` falls back to its ordinary linear subscriber scan for it.
#[derive(Debug, Clone)]
pub enum PendingCandidate {
    Eq(ConstKey, CellId),
    Lt(f64, CellId),
    Gt(f64, CellId),
}

/// Index of `pub = const` subscribers, bucketed by their constant. On a
/// value change the engine finds at most two affected cells (the
/// previously-true one and the newly-true one) instead of evaluating all
/// of them.
#[derive(Debug, Default)]
pub struct EqAxon {
    by_const: FxHashMap<ConstKey, Vec<CellId>>,
}

impl EqAxon {
    pub fn insert(&mut self, key: ConstKey, cell: CellId) {
        self.by_const.entry(key).or_default().push(cell);
    }

    /// Returns the (at most two) relational cells whose truth value flips
    /// when the publisher's value moves from `old` to `new`.
    pub fn affected(&self, old: Option<&Value>, new: &Value) -> Vec<CellId> {
        let mut out = Vec::with_capacity(2);
        if let Some(old) = old
            && let Some(k) = ConstKey::from_value(old)
            && let Some(members) = self.by_const.get(&k)
        {
            out.extend(members.iter().copied());
        }
        if let Some(k) = ConstKey::from_value(new)
            && let Some(members) = self.by_const.get(&k)
        {
            out.extend(members.iter().copied());
        }
        out.dedup();
        out
    }

    pub fn len(&self) -> usize {
        self.by_const.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOp {
    Lt,
    Gt,
}

/// Index of `pub < const` / `pub > const` subscribers, kept sorted by
/// constant so the engine only re-examines the slice whose comparison
/// actually flips between the old and new publisher value, rather than
/// the full subscriber list (spec: "Analogous axons exist for `<` and
/// `>` ... ordered by the right-hand constant").
#[derive(Debug, Default)]
pub struct OrderAxon {
    // kept sorted by constant ascending
    entries: Vec<(f64, CellId)>,
}

impl OrderAxon {
    pub fn insert(&mut self, constant: f64, cell: CellId) {
        let pos = self
            .entries
            .partition_point(|(c, _)| *c < constant);
        self.entries.insert(pos, (constant, cell));
    }

    /// Cells whose `pub OP const` truth value differs between `old` and
    /// `new` numeric publisher values — exactly the entries whose
    /// constant lies between `old` and `new` (inclusive of the boundary
    /// that actually flips).
    pub fn affected(&self, old: f64, new: f64) -> Vec<CellId> {
        let (lo, hi) = if old <= new { (old, new) } else { (new, old) };
        let start = self.entries.partition_point(|(c, _)| *c < lo);
        let end = self.entries.partition_point(|(c, _)| *c <= hi);
        self.entries[start..end].iter().map(|(_, id)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// All axons built for one publisher. `members` is every relational cell
/// indexed by any of `eq`/`lt`/`gt` for this publisher — `publish` uses it
/// to skip the general subscriber scan entirely for axon-covered cells, so
/// the axon is a genuine O(1)/O(log n) replacement for the linear fan-out
/// rather than extra bookkeeping alongside it.
#[derive(Debug, Default)]
pub struct PublisherAxons {
    pub eq: EqAxon,
    pub lt: OrderAxon,
    pub gt: OrderAxon,
    pub members: FxHashSet<CellId>,
}

impl PublisherAxons {
    pub fn is_member(&self, cell: CellId) -> bool {
        self.members.contains(&cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_axon_finds_at_most_two_affected() {
        let mut axon = EqAxon::default();
        for k in 0..1000 {
            axon.insert(ConstKey::Real(k as f64), CellId::new(k));
        }
        let affected = axon.affected(Some(&Value::Real(5.0)), &Value::Real(742.0));
        assert_eq!(affected.len(), 2);
    }

    #[test]
    fn order_axon_range_query_is_bounded() {
        let mut axon = OrderAxon::default();
        for k in 0..100 {
            axon.insert(k as f64, CellId::new(k));
        }
        let affected = axon.affected(10.0, 12.0);
        assert!(affected.len() <= 3);
    }
}
