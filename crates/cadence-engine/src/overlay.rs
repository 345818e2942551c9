//! Overlay resolution — merges naive occurrences with persisted override
//! records into the final set of materialized moments for a query window.
//!
//! A moment's effective start/end may differ from its canonical key, so the
//! naive "enumerate, then fetch matching rows" approach misses moments whose
//! override pulled them into the window from outside (*extra*) and wrongly
//! includes moments whose override pushed them out (*surplus*). The boundary
//! predicates here correct both directions.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::moment::{Moment, MomentStatus};
use crate::occurrence::{next_occurrence, occurrences_between};
use crate::template::EventTemplate;

/// Materialize the moments of `template` that take place (fully or partially)
/// during `[after, before]`, hiding `Removed` moments.
///
/// See [`materialize_with_removed`].
pub fn materialize(
    template: &EventTemplate,
    existing: &[Moment],
    after: DateTime<Utc>,
    before: DateTime<Utc>,
) -> Result<Vec<Moment>> {
    materialize_with_removed(template, existing, after, before, false)
}

/// Materialize the moments of `template` in the inclusive window
/// `[after, before]`.
///
/// `existing` is a read-only snapshot of the persisted moments for this
/// template (rows for other templates are ignored). Occurrences without a
/// persisted override come back as synthesized in-memory moments; persisting
/// those is the caller's concern. The result is sorted by effective start and
/// the inputs are never mutated, so identical inputs yield identical output.
///
/// `Cancelled` moments are returned like `Normal` ones. `Removed` moments are
/// excluded unless `include_removed` is set (conflict checks need to see
/// them), but they always suppress their naive occurrence.
///
/// # Panics
/// Panics when `before < after` — an inverted window is a contract violation,
/// not a recoverable error.
///
/// # Errors
/// Returns [`crate::EngineError::InvalidRule`] if the template's stored
/// repeat rule does not parse.
pub fn materialize_with_removed(
    template: &EventTemplate,
    existing: &[Moment],
    after: DateTime<Utc>,
    before: DateTime<Utc>,
    include_removed: bool,
) -> Result<Vec<Moment>> {
    assert!(
        after <= before,
        "inverted materialize window: [{after}, {before}]"
    );

    // An occurrence starting before `after` can still be in progress during
    // the window, so enumerate with a lookback of one full duration. Anything
    // earlier can never overlap the window.
    let duration = template.duration();
    let lookback = after - duration;
    let naive = occurrences_between(template, lookback, before)?;

    let in_lookback_range = |key: DateTime<Utc>| key >= lookback && key <= before;

    // Naturally in range, but the override moved the effective interval
    // entirely outside the window.
    let is_surplus = |m: &Moment| {
        in_lookback_range(m.canonical_key)
            && (m.local_end.is_some_and(|end| end < after)
                || m.local_start.is_some_and(|start| start > before)
                || (m.local_end.is_none()
                    && m.local_start.is_some_and(|start| start < lookback)))
    };

    // Naturally out of range, but the override moved the effective interval
    // (fully or partially) inside the window. The four disjuncts: moved fully
    // inside; start moved just before the window with the default-duration
    // tail overlapping; start untouched but an explicit end overlapping; an
    // explicit interval spanning the window boundary.
    let is_extra = |m: &Moment| {
        !in_lookback_range(m.canonical_key)
            && (m
                .local_start
                .is_some_and(|start| start >= after && start <= before)
                || (m.local_end.is_none()
                    && m
                        .local_start
                        .is_some_and(|start| start >= lookback && start < after))
                || (m.local_start.is_none()
                    && m.canonical_key < after
                    && m.local_end.is_some_and(|end| end >= after))
                || (m.local_start.is_some_and(|start| start <= after)
                    && m.local_end.is_some_and(|end| end >= after)))
    };

    let persisted: Vec<&Moment> = existing
        .iter()
        .filter(|m| m.template_id == template.id)
        .collect();

    // Persisted moments that belong in the result. A key inside the lookback
    // range qualifies even when it is not a live occurrence — exclusion dates
    // only apply to the naive enumeration, never to stored overrides.
    let included: Vec<&Moment> = persisted
        .iter()
        .copied()
        .filter(|m| !is_surplus(m))
        .filter(|m| in_lookback_range(m.canonical_key) || is_extra(m))
        .filter(|m| include_removed || m.status != MomentStatus::Removed)
        .collect();

    // Keys that must not produce a synthesized moment: overridden-out
    // occurrences, and removed ones (which suppress their occurrence even
    // when the removed row itself is requested).
    let suppressed: HashSet<DateTime<Utc>> = persisted
        .iter()
        .filter(|m| is_surplus(m) || m.status == MomentStatus::Removed)
        .map(|m| m.canonical_key)
        .collect();
    let covered: HashSet<DateTime<Utc>> = included.iter().map(|m| m.canonical_key).collect();

    let mut result: Vec<Moment> = naive
        .into_iter()
        .filter(|occ| !suppressed.contains(occ) && !covered.contains(occ))
        .map(|occ| Moment::synthesized(template, occ))
        .collect();
    result.extend(included.into_iter().cloned());
    result.sort_by_key(|m| (m.effective_start(), m.canonical_key));
    Ok(result)
}

/// The next moment of `template` starting at (`inclusive`) or after `dtstart`,
/// hiding `Removed` moments and keeping `Cancelled` ones.
///
/// See [`next_moment_filtered`].
pub fn next_moment(
    template: &EventTemplate,
    existing: &[Moment],
    dtstart: DateTime<Utc>,
    inclusive: bool,
) -> Result<Option<Moment>> {
    next_moment_filtered(template, existing, dtstart, inclusive, true, false)
}

/// The next moment of `template` starting at (`inclusive`) or after `dtstart`,
/// with explicit status filtering.
///
/// Three candidates compete on effective start: the earliest upcoming
/// persisted moment still at its canonical key, the earliest persisted moment
/// *moved* to an upcoming start, and the next naive occurrence. Occurrences
/// whose override was moved elsewhere are never synthesized (the move itself
/// competes as the second candidate), and neither are occurrences whose
/// override carries a status the caller excludes.
///
/// `exclude_removed`/`exclude_cancelled` drop persisted moments in those
/// statuses from the candidate set.
///
/// # Errors
/// Returns [`crate::EngineError::InvalidRule`] if the template's stored
/// repeat rule does not parse.
pub fn next_moment_filtered(
    template: &EventTemplate,
    existing: &[Moment],
    dtstart: DateTime<Utc>,
    inclusive: bool,
    exclude_removed: bool,
    exclude_cancelled: bool,
) -> Result<Option<Moment>> {
    let reaches = |instant: DateTime<Utc>| {
        if inclusive {
            instant >= dtstart
        } else {
            instant > dtstart
        }
    };
    let admitted = |m: &Moment| {
        (!exclude_removed || m.status != MomentStatus::Removed)
            && (!exclude_cancelled || m.status != MomentStatus::Cancelled)
    };

    let persisted: Vec<&Moment> = existing
        .iter()
        .filter(|m| m.template_id == template.id)
        .collect();

    // Earliest upcoming persisted moment that was not moved.
    let mut best: Option<&Moment> = persisted
        .iter()
        .copied()
        .filter(|m| admitted(m))
        .filter(|m| m.local_start.is_none() && reaches(m.canonical_key))
        .min_by_key(|m| m.canonical_key);

    // Earliest persisted moment moved to an upcoming start; wins on effective
    // start.
    let moved = persisted
        .iter()
        .copied()
        .filter(|m| admitted(m))
        .filter(|m| m.local_start.is_some_and(reaches))
        .min_by_key(|m| m.local_start);
    if let Some(moved) = moved {
        if best.is_none_or(|b| moved.effective_start() < b.effective_start()) {
            best = Some(moved);
        }
    }

    // Keys that must not be synthesized: the override was moved elsewhere, or
    // it carries a status the caller excludes.
    let moved_keys: HashSet<DateTime<Utc>> = persisted
        .iter()
        .filter(|m| m.local_start.is_some() && reaches(m.canonical_key))
        .map(|m| m.canonical_key)
        .collect();
    let hidden_keys: HashSet<DateTime<Utc>> = persisted
        .iter()
        .filter(|m| !admitted(m))
        .map(|m| m.canonical_key)
        .collect();

    let mut next = next_occurrence(template, dtstart, inclusive)?;
    while let Some(occ) = next {
        if !moved_keys.contains(&occ) && !hidden_keys.contains(&occ) {
            break;
        }
        next = next_occurrence(template, occ, false)?;
    }

    if let Some(occ) = next {
        // A matching canonical key means this very occurrence was postponed,
        // not that it is missing.
        let synthesize =
            best.is_none_or(|b| b.effective_start() > occ && b.canonical_key != occ);
        if synthesize {
            return Ok(Some(Moment::synthesized(template, occ)));
        }
    }
    Ok(best.cloned())
}
