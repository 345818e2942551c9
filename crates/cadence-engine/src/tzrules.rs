//! Timezone rule synthesis for self-describing calendar exports.
//!
//! Derives an explicit annual DST transition description (standard/daylight
//! offset pairs plus their yearly recurrence) from an IANA timezone
//! identifier, by probing the zone's offsets through a recent rule year.
//!
//! NOTE: only the zone's *current* rule is considered. This is exact for
//! zones whose DST rule hasn't changed since adoption (most of Europe), but
//! can be wrong for zones with historical rule churn (parts of the Americas).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Utc, Weekday,
};
use chrono_tz::{OffsetComponents, OffsetName, Tz};

/// The year whose transition behavior is treated as "the" rule for a zone.
const RULE_YEAR: i32 = 2025;

/// Consecutive years sampled when deciding whether a transition pins a fixed
/// week of the month or the last one.
const SAMPLE_YEARS: i32 = 4;

/// Yearly recurrence of a transition: the `week`-th `weekday` of `month`.
///
/// `week == -1` means "last occurrence in the month". A consistently-5th
/// occurrence normalizes to `-1`, since no month reliably has a 5th occurrence
/// of a weekday in every year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnualRule {
    pub month: u32,
    pub week: i8,
    pub weekday: Weekday,
}

/// One transition of a zone's clock, plus its yearly recurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRule {
    /// Zone abbreviation in effect after the transition (e.g. "CEST").
    pub name: String,
    /// UTC offset in effect before the transition.
    pub offset_from: FixedOffset,
    /// UTC offset in effect after the transition.
    pub offset_to: FixedOffset,
    /// The rule's 1970 occurrence as local wall time — the DTSTART a
    /// VTIMEZONE component expects.
    pub first_transition: NaiveDateTime,
    /// `None` for the single fixed rule of a zone without DST.
    pub recurrence: Option<AnnualRule>,
}

/// The synthesized rule description for one timezone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneRuleSet {
    pub tz_id: String,
    /// Transition into daylight-saving time; `None` when the zone has no DST.
    pub daylight: Option<TransitionRule>,
    /// Transition back to standard time, or the zone's single fixed rule.
    pub standard: TransitionRule,
}

impl TimezoneRuleSet {
    pub fn has_dst(&self) -> bool {
        self.daylight.is_some()
    }
}

/// Memoized synthesizer: one rule set per timezone identifier, computed at
/// most once per key for the cache's lifetime.
///
/// The map is the engine's only shared mutable state. Writes are
/// insert-if-absent under a lock; a racing computation produces a redundant
/// but identical value, never inconsistent data. Construct one per process
/// (or per test, for isolation) and share it.
#[derive(Debug, Default)]
pub struct TimezoneRuleCache {
    zones: Mutex<HashMap<String, Arc<TimezoneRuleSet>>>,
}

impl TimezoneRuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The annual transition rules for `tz_id`, or `None` when no rule is
    /// needed or available: UTC and equivalents need no description, and an
    /// unknown identifier is surfaced as "no rule" rather than an error —
    /// callers can still export without one.
    pub fn rules_for(&self, tz_id: &str) -> Option<Arc<TimezoneRuleSet>> {
        if tz_id.is_empty() || tz_id.to_ascii_lowercase().contains("utc") {
            return None;
        }

        {
            let zones = self.zones.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(rules) = zones.get(tz_id) {
                return Some(Arc::clone(rules));
            }
        }

        let tz: Tz = tz_id.parse().ok()?;
        let rules = Arc::new(synthesize(tz_id, tz)?);
        let mut zones = self.zones.lock().unwrap_or_else(PoisonError::into_inner);
        Some(Arc::clone(zones.entry(tz_id.to_string()).or_insert(rules)))
    }
}

/// Format a UTC offset the way iCalendar wants it: `+0100`, `-0930`.
pub(crate) fn format_offset(offset: FixedOffset) -> String {
    let secs = offset.local_minus_utc();
    let sign = if secs < 0 { '-' } else { '+' };
    let abs = secs.abs();
    format!("{}{:02}{:02}", sign, abs / 3600, (abs % 3600) / 60)
}

fn synthesize(tz_id: &str, tz: Tz) -> Option<TimezoneRuleSet> {
    if transition_points(tz, RULE_YEAR)?.is_empty() {
        return Some(TimezoneRuleSet {
            tz_id: tz_id.to_string(),
            daylight: None,
            standard: fixed_rule(tz)?,
        });
    }

    Some(TimezoneRuleSet {
        tz_id: tz_id.to_string(),
        daylight: Some(rule_for_direction(tz, true)?),
        standard: rule_for_direction(tz, false)?,
    })
}

fn utc_datetime(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(DateTime::from_naive_utc_and_offset(
        date.and_time(NaiveTime::MIN),
        Utc,
    ))
}

fn total_offset(tz: Tz, instant: DateTime<Utc>) -> FixedOffset {
    tz.offset_from_utc_datetime(&instant.naive_utc()).fix()
}

fn is_daylight(tz: Tz, instant: DateTime<Utc>) -> bool {
    !tz.offset_from_utc_datetime(&instant.naive_utc())
        .dst_offset()
        .is_zero()
}

fn zone_name(tz: Tz, instant: DateTime<Utc>) -> String {
    let offset = tz.offset_from_utc_datetime(&instant.naive_utc());
    let abbr = offset.abbreviation();
    if abbr.starts_with(['+', '-']) {
        format_offset(offset.fix())
    } else {
        abbr.to_string()
    }
}

/// The instants during `year` at which the zone's total UTC offset changes,
/// refined to one-second precision.
fn transition_points(tz: Tz, year: i32) -> Option<Vec<DateTime<Utc>>> {
    let end = utc_datetime(year + 1, 1, 1)?;
    let mut points = Vec::new();
    let mut cursor = utc_datetime(year, 1, 1)?;
    while cursor < end {
        let next = cursor + Duration::days(1);
        if total_offset(tz, cursor) != total_offset(tz, next) {
            points.push(refine_transition(tz, cursor, next));
        }
        cursor = next;
    }
    Some(points)
}

/// Binary-search the first instant in `(lo, hi]` carrying the new offset.
fn refine_transition(tz: Tz, mut lo: DateTime<Utc>, mut hi: DateTime<Utc>) -> DateTime<Utc> {
    let before = total_offset(tz, lo);
    while hi - lo > Duration::seconds(1) {
        let mid = lo + (hi - lo) / 2;
        if total_offset(tz, mid) == before {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    hi
}

fn fixed_rule(tz: Tz) -> Option<TransitionRule> {
    let probe = utc_datetime(RULE_YEAR, 1, 1)?;
    let offset = total_offset(tz, probe);
    Some(TransitionRule {
        name: zone_name(tz, probe),
        offset_from: offset,
        offset_to: offset,
        // Sentinel start: fixed offsets have no meaningful transition.
        first_transition: NaiveDate::from_ymd_opt(1970, 1, 1)?.and_time(NaiveTime::MIN),
        recurrence: None,
    })
}

/// Synthesize the rule for the transition *into* daylight time (`to_dst`) or
/// back into standard time (`!to_dst`).
fn rule_for_direction(tz: Tz, to_dst: bool) -> Option<TransitionRule> {
    // Local wall dates of this transition across the sampled years, read with
    // the pre-transition offset (the clock reading at which the jump occurs).
    let mut local_datetimes: Vec<NaiveDateTime> = Vec::new();
    let mut offsets_and_name: Option<(FixedOffset, FixedOffset, String)> = None;

    for year in RULE_YEAR..RULE_YEAR + SAMPLE_YEARS {
        let instant = transition_points(tz, year)?
            .into_iter()
            .find(|t| is_daylight(tz, *t) == to_dst)?;
        let offset_from = total_offset(tz, instant - Duration::seconds(1));
        local_datetimes.push(instant.naive_utc() + Duration::seconds(i64::from(offset_from.local_minus_utc())));
        if offsets_and_name.is_none() {
            offsets_and_name = Some((
                offset_from,
                total_offset(tz, instant),
                zone_name(tz, instant),
            ));
        }
    }

    let (offset_from, offset_to, name) = offsets_and_name?;
    let recurrence = derive_annual_rule(&local_datetimes)?;
    let first_date = nth_weekday_in_month(1970, recurrence.month, recurrence.weekday, recurrence.week)?;
    Some(TransitionRule {
        name,
        offset_from,
        offset_to,
        first_transition: first_date.and_time(local_datetimes.first()?.time()),
        recurrence: Some(recurrence),
    })
}

/// Decide the `{month, week, weekday}` pattern from sampled transition dates.
///
/// A weekday ordinal that is identical in every sampled year pins that week
/// (a consistent 5 normalizes to "last"); an ordinal that varies but is the
/// month's last such weekday every year means "last".
fn derive_annual_rule(local_datetimes: &[NaiveDateTime]) -> Option<AnnualRule> {
    let first = local_datetimes.first()?.date();
    let month = first.month();
    let weekday = first.weekday();

    let mut ordinals = Vec::new();
    let mut all_last = true;
    for dt in local_datetimes {
        let date = dt.date();
        if date.month() != month || date.weekday() != weekday {
            return None;
        }
        ordinals.push((date.day() - 1) / 7 + 1);
        if date.day() + 7 <= days_in_month(date.year(), month)? {
            all_last = false;
        }
    }

    let week = if ordinals.iter().all(|&o| o == ordinals[0]) && !all_last {
        ordinals[0] as i8
    } else {
        -1
    };
    let week = if week == 5 { -1 } else { week };
    Some(AnnualRule {
        month,
        week,
        weekday,
    })
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(next.pred_opt()?.signed_duration_since(first).num_days() as u32 + 1)
}

fn nth_weekday_in_month(year: i32, month: u32, weekday: Weekday, week: i8) -> Option<NaiveDate> {
    if week == -1 {
        let mut date = NaiveDate::from_ymd_opt(year, month, days_in_month(year, month)?)?;
        while date.weekday() != weekday {
            date = date.pred_opt()?;
        }
        Some(date)
    } else {
        let mut date = NaiveDate::from_ymd_opt(year, month, 1)?;
        while date.weekday() != weekday {
            date = date.succ_opt()?;
        }
        Some(date + Duration::days(7 * (i64::from(week) - 1)))
    }
}
