//! Time-condition engine (spec §4.8): calendar expressions compiled into a
//! lazy boolean time series, pulse schedules, delay prefixes, and the
//! timer queue that feeds alarms back into the same react mechanism used
//! for asserted facts.

use crate::ids::CellId;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Identity of a compiled time procedure (mirrors `CellId` — a small
/// opaque handle rather than an owned tree per use site).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeProcId(pub(crate) u32);

/// A compiled calendar/pulse expression (spec §4.8). The textual grammar
/// itself (`~(...)`) is parsed by the external front end; this is the
/// *procedure representation* the engine evaluates.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeProc {
    /// `~30m`, `~1h30m20s` — fixed-width interval schedule. `next(floor)`
    /// advances by `width_secs` past `floor`.
    Pulse { width_secs: u64 },
    /// `T(30s)` / `F(...)` / `U(...)` delay: `floor + duration`, used by
    /// rules whose trigger condition requires staying in a state for a
    /// duration.
    Delay {
        kind: DelayKind,
        duration_secs: u64,
    },
    /// A compiled calendar expression over field constraints (years,
    /// months, days, hour, minute, ...). Represented here as a list of
    /// `(field, allowed values)` conjunctions — the parser's concern is
    /// producing this list from `~(...)` syntax.
    Calendar { fields: Vec<CalendarField> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayKind {
    /// Stay `True` for the duration.
    True,
    /// Stay `False` for the duration.
    False,
    /// Stay `Unknown` for the duration.
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarField {
    pub unit: CalendarUnit,
    pub allowed: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarUnit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Weekday,
}

/// The `(nextTrueStart, nextFalseStart)` pair a time procedure's queue
/// yields within a domain interval, enlarged as needed (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next_true_start: Option<u64>,
    pub next_false_start: Option<u64>,
}

impl TimeProc {
    /// Compute the next true/false transition pair strictly after `floor`
    /// (epoch seconds), enlarging the domain `[floor, floor + step)` by
    /// doubling until a transition is found or a hard cap is hit.
    pub fn next_transition(&self, floor: u64) -> Transition {
        match self {
            TimeProc::Pulse { width_secs } => {
                let width = (*width_secs).max(1);
                let elapsed = floor % width;
                let next_edge = floor - elapsed + width;
                Transition {
                    next_true_start: Some(next_edge),
                    next_false_start: Some(next_edge + width),
                }
            }
            TimeProc::Delay { duration_secs, .. } => Transition {
                next_true_start: Some(floor + duration_secs),
                next_false_start: None,
            },
            TimeProc::Calendar { fields } => calendar_transition(fields, floor),
        }
    }
}

/// How far past `floor` a calendar search is willing to look before giving
/// up — a field combination that never matches (e.g. `day` restricted to a
/// value no month has) would otherwise search forever.
const CALENDAR_SEARCH_CAP_SECS: u64 = 366 * 24 * 3600 * 2;

/// Upper bound on boundary hops per search, independent of the time cap —
/// guards against a pathological field set that has a boundary every
/// second without actually ever reaching `want`.
const CALENDAR_EDGE_SEARCH_LIMIT: u32 = 100_000;

fn calendar_transition(fields: &[CalendarField], floor: u64) -> Transition {
    let cap = floor.saturating_add(CALENDAR_SEARCH_CAP_SECS);
    Transition {
        next_true_start: find_next_edge(fields, floor, cap, true),
        next_false_start: find_next_edge(fields, floor, cap, false),
    }
}

/// Find the first instant strictly after `floor` (up to `cap`) at which the
/// calendar's match state equals `want`, hopping between the coarsest
/// boundaries that could possibly change the verdict rather than scanning
/// second by second (spec §4.8 "enlarging the domain ... until a transition
/// is found").
fn find_next_edge(fields: &[CalendarField], floor: u64, cap: u64, want: bool) -> Option<u64> {
    if fields.is_empty() {
        // No constraints at all: the calendar matches every instant, so it
        // never becomes false and is already true from the start.
        return if want { Some(floor + 1) } else { None };
    }
    let mut t = floor;
    let mut steps = 0u32;
    loop {
        steps += 1;
        if steps > CALENDAR_EDGE_SEARCH_LIMIT {
            return None;
        }
        let candidate = next_boundary_after(fields, t);
        if candidate > cap {
            return None;
        }
        if calendar_matches(fields, epoch_to_naive(candidate)) == want {
            return Some(candidate);
        }
        t = candidate;
    }
}

/// The next instant after `epoch` at which any *constrained* field's value
/// could change — the finest granularity among the fields actually present,
/// so an hour-only constraint hops an hour at a time instead of a second.
fn next_boundary_after(fields: &[CalendarField], epoch: u64) -> u64 {
    let dt = epoch_to_naive(epoch);
    let mut candidates = Vec::with_capacity(6);
    if field_allowed(fields, CalendarUnit::Second).is_some() {
        candidates.push(epoch + 1);
    }
    if field_allowed(fields, CalendarUnit::Minute).is_some() {
        candidates.push(naive_to_epoch(next_minute_boundary(dt)));
    }
    if field_allowed(fields, CalendarUnit::Hour).is_some() {
        candidates.push(naive_to_epoch(next_hour_boundary(dt)));
    }
    if field_allowed(fields, CalendarUnit::Day).is_some() || field_allowed(fields, CalendarUnit::Weekday).is_some() {
        candidates.push(naive_to_epoch(next_day_boundary(dt)));
    }
    if field_allowed(fields, CalendarUnit::Month).is_some() {
        candidates.push(naive_to_epoch(next_month_boundary(dt)));
    }
    if field_allowed(fields, CalendarUnit::Year).is_some() {
        candidates.push(naive_to_epoch(next_year_boundary(dt)));
    }
    candidates.into_iter().filter(|&c| c > epoch).min().unwrap_or(epoch + 1)
}

fn field_allowed(fields: &[CalendarField], unit: CalendarUnit) -> Option<&[u32]> {
    fields.iter().find(|f| f.unit == unit).map(|f| f.allowed.as_slice())
}

fn value_allowed(allowed: Option<&[u32]>, value: u32) -> bool {
    allowed.map(|set| set.contains(&value)).unwrap_or(true)
}

/// Whether every constrained field in `fields` accepts `dt` — an unlisted
/// unit is unconstrained and accepts any value (spec §4.8: fields are a
/// conjunction, a missing field imposes no restriction).
fn calendar_matches(fields: &[CalendarField], dt: NaiveDateTime) -> bool {
    value_allowed(field_allowed(fields, CalendarUnit::Year), dt.year() as u32)
        && value_allowed(field_allowed(fields, CalendarUnit::Month), dt.month())
        && value_allowed(field_allowed(fields, CalendarUnit::Day), dt.day())
        && value_allowed(field_allowed(fields, CalendarUnit::Hour), dt.hour())
        && value_allowed(field_allowed(fields, CalendarUnit::Minute), dt.minute())
        && value_allowed(field_allowed(fields, CalendarUnit::Second), dt.second())
        && value_allowed(
            field_allowed(fields, CalendarUnit::Weekday),
            dt.weekday().num_days_from_sunday(),
        )
}

fn epoch_to_naive(epoch: u64) -> NaiveDateTime {
    DateTime::<Utc>::from_timestamp(epoch as i64, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap())
}

fn naive_to_epoch(dt: NaiveDateTime) -> u64 {
    dt.and_utc().timestamp().max(0) as u64
}

fn next_minute_boundary(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date().and_hms_opt(dt.hour(), dt.minute(), 0).unwrap() + ChronoDuration::minutes(1)
}

fn next_hour_boundary(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date().and_hms_opt(dt.hour(), 0, 0).unwrap() + ChronoDuration::hours(1)
}

fn next_day_boundary(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date().and_hms_opt(0, 0, 0).unwrap() + ChronoDuration::days(1)
}

fn next_month_boundary(dt: NaiveDateTime) -> NaiveDateTime {
    let (year, month) = (dt.year(), dt.month());
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn next_year_boundary(dt: NaiveDateTime) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(dt.year() + 1, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// One entry in the timer queue: at most one timer per cell — resetting a
/// timer cancels the prior one (spec §4.8).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct TimerEntry {
    expiration: u64,
    seq: u64,
    cell: CellId,
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.expiration, self.seq).cmp(&(other.expiration, other.seq))
    }
}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Singly-sorted timer queue (spec §4.8). A guard flag rejects re-entrant
/// `alert` calls — violating that is a fatal logic error (spec §5, §7).
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    by_cell: rustc_hash::FxHashMap<CellId, u64>,
    next_seq: u64,
    alerting: bool,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            by_cell: rustc_hash::FxHashMap::default(),
            next_seq: 0,
            alerting: false,
        }
    }

    /// Schedule (or reschedule, cancelling the prior) a timer for `cell`.
    pub fn set(&mut self, cell: CellId, expiration: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_cell.insert(cell, expiration);
        self.heap.push(Reverse(TimerEntry {
            expiration,
            seq,
            cell,
        }));
    }

    /// Cancel a timer by resetting its expiration to zero (spec §5).
    pub fn cancel(&mut self, cell: CellId) {
        self.by_cell.remove(&cell);
    }

    /// Drain all timers with `expiration <= now`, sharing a common second,
    /// in the order they were queued (spec §5). Returns the set of cells
    /// whose alarm fired this batch; stale/cancelled/superseded entries
    /// are skipped.
    ///
    /// Panics (a fatal logic error per spec §7) if called re-entrantly
    /// before the previous batch finished draining.
    pub fn drain_batch(&mut self, now: u64) -> Vec<CellId> {
        assert!(!self.alerting, "NB001L: re-entrant timer alert");
        self.alerting = true;
        let mut fired = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.expiration > now {
                break;
            }
            let Reverse(entry) = self.heap.pop().unwrap();
            // Only fire if this is still the live timer for the cell
            // (a reschedule bumps `by_cell` past this stale entry).
            if self.by_cell.get(&entry.cell) == Some(&entry.expiration) {
                self.by_cell.remove(&entry.cell);
                fired.push(entry.cell);
            }
        }
        self.alerting = false;
        fired
    }

    /// Testable property (spec §8 #6): the queue is always sorted by
    /// expiration — trivially true for a binary heap, exposed so tests can
    /// assert it explicitly by draining and checking monotonicity.
    pub fn expirations_ascending(&mut self, now_cap: u64) -> bool {
        let mut last = 0u64;
        let mut ok = true;
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.expiration > now_cap {
                break;
            }
            if entry.expiration < last {
                ok = false;
            }
            last = entry.expiration;
            self.heap.pop();
        }
        ok
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl Default for TimerQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulse_advances_by_interval_width_without_drift() {
        let proc = TimeProc::Pulse { width_secs: 10 };
        let t1 = proc.next_transition(0);
        assert_eq!(t1.next_true_start, Some(10));
        let t2 = proc.next_transition(10);
        assert_eq!(t2.next_true_start, Some(20));
    }

    #[test]
    fn timer_queue_drains_in_order() {
        let mut q = TimerQueue::new();
        q.set(CellId::new(1), 5);
        q.set(CellId::new(2), 3);
        q.set(CellId::new(3), 10);
        let fired = q.drain_batch(5);
        assert_eq!(fired, vec![CellId::new(2), CellId::new(1)]);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn resetting_a_timer_cancels_the_prior() {
        let mut q = TimerQueue::new();
        q.set(CellId::new(1), 5);
        q.set(CellId::new(1), 50);
        let fired = q.drain_batch(5);
        assert!(fired.is_empty());
        let fired2 = q.drain_batch(50);
        assert_eq!(fired2, vec![CellId::new(1)]);
    }

    #[test]
    #[should_panic(expected = "re-entrant")]
    fn reentrant_alert_is_fatal() {
        let mut q = TimerQueue::new();
        q.alerting = true;
        q.drain_batch(0);
    }

    #[test]
    fn calendar_hour_window_transitions_on_its_boundaries() {
        // 1970-01-01 is a Thursday starting at epoch 0; restrict to hour 9.
        let proc = TimeProc::Calendar {
            fields: vec![CalendarField {
                unit: CalendarUnit::Hour,
                allowed: vec![9],
            }],
        };
        let before = proc.next_transition(0);
        assert_eq!(before.next_true_start, Some(9 * 3600));

        let during = proc.next_transition(9 * 3600);
        assert_eq!(during.next_false_start, Some(10 * 3600));
    }

    #[test]
    fn calendar_weekday_field_restricts_to_matching_days() {
        // epoch 0 is a Thursday (weekday 4, Sunday = 0); restrict to Monday.
        let proc = TimeProc::Calendar {
            fields: vec![CalendarField {
                unit: CalendarUnit::Weekday,
                allowed: vec![1],
            }],
        };
        let transition = proc.next_transition(0);
        // The following Monday is 1970-01-05, 4 days after the Thursday epoch.
        assert_eq!(transition.next_true_start, Some(4 * 24 * 3600));
    }

    #[test]
    fn empty_calendar_fields_always_match() {
        let proc = TimeProc::Calendar { fields: vec![] };
        let transition = proc.next_transition(0);
        assert_eq!(transition.next_true_start, Some(1));
        assert_eq!(transition.next_false_start, None);
    }
}
