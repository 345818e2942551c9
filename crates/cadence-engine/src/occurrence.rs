//! Naive occurrence enumeration — expands a template's recurrence pattern
//! into concrete instants, before any per-occurrence override is applied.
//!
//! Builds an iCalendar text block for the `rrule` crate (`DTSTART;TZID=...`)
//! so that expansion happens in the template's zone and the wall-clock
//! time-of-day survives DST transitions. Inclusion/exclusion dates are
//! normalized through [`CivilTimeConverter`] first, then unioned/subtracted
//! here rather than handed to the rrule parser.

use chrono::{DateTime, Duration, Utc};
use rrule::RRuleSet;

use crate::civil::CivilTimeConverter;
use crate::error::{EngineError, Result};
use crate::moment::Moment;
use crate::template::EventTemplate;

/// Hard cap on raw rule expansion. Query windows are bounded by the caller
/// (the surrounding system enforces a maximum span), so this is never the
/// limiting factor in practice.
const EXPANSION_CAP: u16 = 1000;

/// Parse the template's repeat rule into an [`RRuleSet`] anchored at the
/// template's local start.
pub(crate) fn parse_rule_set(template: &EventTemplate) -> Result<RRuleSet> {
    let local_start = template.start.with_timezone(&template.timezone);
    let rule = template
        .recurrence
        .rrules
        .first()
        .ok_or_else(|| EngineError::InvalidRule("no repeat rule set".to_string()))?;
    let text = format!(
        "DTSTART;TZID={}:{}\nRRULE:{}",
        template.timezone.name(),
        local_start.format("%Y%m%dT%H%M%S"),
        rule,
    );
    text.parse()
        .map_err(|e| EngineError::InvalidRule(format!("{e}")))
}

/// Enumerate the naive occurrence starts of `template` whose instant falls in
/// `[after, before]`, inclusive on both ends.
///
/// The raw set is the template's start, plus the repeat rule's expansion, plus
/// the normalized inclusion dates; normalized exclusion dates are subtracted.
/// Every member keeps the start's wall-clock time-of-day in the template's
/// zone regardless of DST. Returned sorted ascending and de-duplicated.
///
/// # Errors
/// Returns [`EngineError::InvalidRule`] if the stored repeat rule does not
/// parse (a template-write-time bug surfacing late).
pub fn occurrences_between(
    template: &EventTemplate,
    after: DateTime<Utc>,
    before: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>> {
    // The template's own start is always part of the recurrence set, whether
    // or not it matches the repeat rule.
    let mut raw: Vec<DateTime<Utc>> = vec![template.start];

    if !template.recurrence.rrules.is_empty() {
        let set = parse_rule_set(template)?;
        let rtz = rrule::Tz::Tz(template.timezone);
        // Widen the bounds by a second and re-filter below, so inclusivity
        // never depends on the rrule crate's boundary convention.
        let set = set
            .after((after - Duration::seconds(1)).with_timezone(&rtz))
            .before((before + Duration::seconds(1)).with_timezone(&rtz));
        let expansion = set.all(EXPANSION_CAP);
        raw.extend(expansion.dates.into_iter().map(|dt| dt.with_timezone(&Utc)));
    }

    let (rdates, exdates) = normalized_dates(template);
    raw.extend(rdates);
    raw.retain(|occ| *occ >= after && *occ <= before && !exdates.contains(occ));
    raw.sort_unstable();
    raw.dedup();
    Ok(raw)
}

/// The first naive occurrence starting at (`inclusive`) or after `dtstart`,
/// or `None` when the pattern is exhausted.
///
/// Same raw set as [`occurrences_between`] with an open upper bound, so an
/// unbounded rule always yields the next instance (up to the expansion cap).
///
/// # Errors
/// Returns [`EngineError::InvalidRule`] if the stored repeat rule does not
/// parse.
pub fn next_occurrence(
    template: &EventTemplate,
    dtstart: DateTime<Utc>,
    inclusive: bool,
) -> Result<Option<DateTime<Utc>>> {
    let mut raw: Vec<DateTime<Utc>> = vec![template.start];

    if !template.recurrence.rrules.is_empty() {
        let set = parse_rule_set(template)?;
        let rtz = rrule::Tz::Tz(template.timezone);
        let set = set.after((dtstart - Duration::seconds(1)).with_timezone(&rtz));
        let expansion = set.all(EXPANSION_CAP);
        raw.extend(expansion.dates.into_iter().map(|dt| dt.with_timezone(&Utc)));
    }

    let (rdates, exdates) = normalized_dates(template);
    raw.extend(rdates);
    raw.retain(|occ| {
        let reached = if inclusive { *occ >= dtstart } else { *occ > dtstart };
        reached && !exdates.contains(occ)
    });
    Ok(raw.into_iter().min())
}

/// Normalize the template's civil inclusion/exclusion dates: each gets the
/// start's time-of-day with DST-ignoring semantics.
fn normalized_dates(template: &EventTemplate) -> (Vec<DateTime<Utc>>, Vec<DateTime<Utc>>) {
    let converter = CivilTimeConverter::new(template.timezone);
    let normalize = |date| {
        converter.to_offset_aware(converter.civil_from_date(date, template.start), template.start)
    };
    let rdates = template.recurrence.rdates.iter().copied().map(normalize).collect();
    let exdates = template.recurrence.exdates.iter().copied().map(normalize).collect();
    (rdates, exdates)
}

/// Whether `template` has an occurrence starting exactly at `instant`.
///
/// Used for canonical-key validation; implemented as a one-instant window
/// check, which is cheap because windows are always small.
pub fn occurrence_at(template: &EventTemplate, instant: DateTime<Utc>) -> Result<bool> {
    Ok(!occurrences_between(template, instant, instant)?.is_empty())
}

/// Whether `moment` overrides a true occurrence of a recurring pattern.
///
/// A non-recurring template's moment is never part of a recurrence. This
/// drives the feed identifier contract: pattern members share the template's
/// uid, standalone moments get their own.
pub fn is_part_of_pattern(template: &EventTemplate, moment: &Moment) -> Result<bool> {
    if !template.is_recurring() {
        return Ok(false);
    }
    occurrence_at(template, moment.canonical_key)
}
