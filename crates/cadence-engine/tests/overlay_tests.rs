//! Tests for overlay resolution: merging naive occurrences with persisted
//! override records, including the extra/surplus boundary predicates.

use cadence_engine::{
    materialize, materialize_with_removed, next_moment, next_moment_filtered, EventTemplate,
    Moment, MomentStatus, Recurrence,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

/// Weekly Wednesdays, 16:00 CEST until 04:00 the next morning (12h duration),
/// with 21 October excluded.
fn wednesday_template() -> EventTemplate {
    EventTemplate {
        id: 2,
        start: utc(2020, 9, 2, 14, 0),
        end: utc(2020, 9, 3, 2, 0),
        timezone: Tz::Europe__Amsterdam,
        recurrence: Recurrence {
            rrules: vec!["FREQ=WEEKLY;BYDAY=WE".to_string()],
            exdates: vec![NaiveDate::from_ymd_opt(2020, 10, 21).unwrap()],
            ..Recurrence::default()
        },
    }
}

fn persisted(key: DateTime<Utc>) -> Moment {
    Moment {
        id: Some(7),
        template_id: 2,
        canonical_key: key,
        local_start: None,
        local_end: None,
        status: MomentStatus::Normal,
    }
}

fn keys(moments: &[Moment]) -> Vec<DateTime<Utc>> {
    moments.iter().map(|m| m.canonical_key).collect()
}

// ---------------------------------------------------------------------------
// Baseline synthesis
// ---------------------------------------------------------------------------

#[test]
fn synthesizes_uncovered_occurrences() {
    let template = wednesday_template();
    let moments = materialize(&template, &[], utc(2020, 10, 2, 0, 0), utc(2020, 10, 16, 0, 0))
        .expect("should materialize");

    assert_eq!(keys(&moments), vec![utc(2020, 10, 7, 14, 0), utc(2020, 10, 14, 14, 0)]);
    for m in &moments {
        assert!(!m.is_persisted());
        assert_eq!(m.template_id, 2);
        assert_eq!(m.status, MomentStatus::Normal);
        assert_eq!(m.effective_start(), m.canonical_key);
    }
}

#[test]
fn persisted_override_replaces_synthesized() {
    let template = wednesday_template();
    let existing = vec![persisted(utc(2020, 10, 14, 14, 0))];
    let moments = materialize(&template, &existing, utc(2020, 10, 2, 0, 0), utc(2020, 10, 16, 0, 0))
        .expect("should materialize");

    assert_eq!(keys(&moments), vec![utc(2020, 10, 7, 14, 0), utc(2020, 10, 14, 14, 0)]);
    assert!(!moments[0].is_persisted());
    assert_eq!(moments[1].id, Some(7));
}

#[test]
fn in_progress_occurrence_is_included() {
    // The 7 October occurrence runs 14:00Z to 02:00Z the next day; a window
    // that only covers its tail end still gets the moment.
    let template = wednesday_template();
    let moments = materialize(&template, &[], utc(2020, 10, 7, 20, 0), utc(2020, 10, 8, 0, 0))
        .expect("should materialize");
    assert_eq!(keys(&moments), vec![utc(2020, 10, 7, 14, 0)]);
}

#[test]
fn rows_of_other_templates_are_ignored() {
    let template = wednesday_template();
    let mut foreign = persisted(utc(2020, 10, 14, 14, 0));
    foreign.template_id = 99;

    let moments = materialize(&template, &[foreign], utc(2020, 10, 9, 0, 0), utc(2020, 10, 16, 0, 0))
        .expect("should materialize");
    assert_eq!(keys(&moments), vec![utc(2020, 10, 14, 14, 0)]);
    assert!(!moments[0].is_persisted());
}

// ---------------------------------------------------------------------------
// Extra moments (override pulled the interval into the window)
// ---------------------------------------------------------------------------
// Window [09 Oct, 16 Oct]; the 7 October key sits before the lookback range.

#[test]
fn extra_start_moved_inside_window() {
    let template = wednesday_template();
    let mut moved = persisted(utc(2020, 10, 7, 14, 0));
    moved.local_start = Some(utc(2020, 10, 13, 14, 0));

    let moments = materialize(&template, &[moved], utc(2020, 10, 9, 0, 0), utc(2020, 10, 16, 0, 0))
        .expect("should materialize");
    assert_eq!(keys(&moments), vec![utc(2020, 10, 7, 14, 0), utc(2020, 10, 14, 14, 0)]);
    assert_eq!(moments[0].effective_start(), utc(2020, 10, 13, 14, 0));
}

#[test]
fn extra_start_moved_outside_window() {
    let template = wednesday_template();
    let mut moved = persisted(utc(2020, 10, 7, 14, 0));
    moved.local_start = Some(utc(2020, 11, 1, 14, 0));

    let moments = materialize(&template, &[moved], utc(2020, 10, 9, 0, 0), utc(2020, 10, 16, 0, 0))
        .expect("should materialize");
    assert_eq!(keys(&moments), vec![utc(2020, 10, 14, 14, 0)]);
}

#[test]
fn extra_explicit_end_reaches_into_window() {
    let template = wednesday_template();
    let mut moved = persisted(utc(2020, 10, 7, 14, 0));
    moved.local_start = Some(utc(2020, 10, 1, 10, 0));
    moved.local_end = Some(utc(2020, 10, 13, 10, 0));

    let moments = materialize(&template, &[moved], utc(2020, 10, 9, 0, 0), utc(2020, 10, 16, 0, 0))
        .expect("should materialize");
    assert_eq!(keys(&moments), vec![utc(2020, 10, 7, 14, 0), utc(2020, 10, 14, 14, 0)]);
}

#[test]
fn extra_default_duration_tail_overlaps() {
    // Start moved to just before the window; no explicit end, so the default
    // 12-hour duration carries the moment across the window edge.
    let template = wednesday_template();
    let mut moved = persisted(utc(2020, 10, 7, 14, 0));
    moved.local_start = Some(utc(2020, 10, 9, 23, 30));

    let moments = materialize(&template, &[moved], utc(2020, 10, 10, 0, 0), utc(2020, 10, 16, 0, 0))
        .expect("should materialize");
    assert_eq!(keys(&moments), vec![utc(2020, 10, 7, 14, 0), utc(2020, 10, 14, 14, 0)]);
}

#[test]
fn extra_unmoved_start_with_late_end() {
    let template = wednesday_template();
    let mut moved = persisted(utc(2020, 10, 7, 14, 0));
    moved.local_end = Some(utc(2020, 10, 30, 14, 0));

    let moments = materialize(&template, &[moved], utc(2020, 10, 9, 0, 0), utc(2020, 10, 16, 0, 0))
        .expect("should materialize");
    assert_eq!(keys(&moments), vec![utc(2020, 10, 7, 14, 0), utc(2020, 10, 14, 14, 0)]);
}

// ---------------------------------------------------------------------------
// Surplus moments (override pushed the interval out of the window)
// ---------------------------------------------------------------------------

#[test]
fn surplus_start_moved_past_window() {
    let template = wednesday_template();
    let mut moved = persisted(utc(2020, 10, 14, 14, 0));
    moved.local_start = Some(utc(2020, 10, 18, 14, 0));

    let moments = materialize(&template, &[moved], utc(2020, 10, 9, 0, 0), utc(2020, 10, 16, 0, 0))
        .expect("should materialize");
    // The override leaves the window and also suppresses its naive occurrence.
    assert!(moments.is_empty());
}

#[test]
fn surplus_end_moved_before_window() {
    let template = wednesday_template();
    let mut moved = persisted(utc(2020, 10, 14, 14, 0));
    moved.local_end = Some(utc(2020, 10, 14, 15, 30));

    let moments =
        materialize(&template, &[moved], utc(2020, 10, 14, 17, 0), utc(2020, 10, 14, 23, 30))
            .expect("should materialize");
    assert!(moments.is_empty());
}

#[test]
fn surplus_default_end_start_moved_before_lookback() {
    let template = wednesday_template();
    let mut moved = persisted(utc(2020, 10, 14, 14, 0));
    moved.local_start = Some(utc(2020, 10, 5, 14, 0));

    let moments = materialize(&template, &[moved], utc(2020, 10, 9, 0, 0), utc(2020, 10, 16, 0, 0))
        .expect("should materialize");
    assert!(moments.is_empty());
}

// ---------------------------------------------------------------------------
// Moment status
// ---------------------------------------------------------------------------

#[test]
fn cancelled_moments_are_returned() {
    let template = wednesday_template();
    let mut cancelled = persisted(utc(2020, 10, 14, 14, 0));
    cancelled.status = MomentStatus::Cancelled;

    let moments =
        materialize(&template, &[cancelled], utc(2020, 10, 9, 0, 0), utc(2020, 10, 16, 0, 0))
            .expect("should materialize");
    assert_eq!(keys(&moments), vec![utc(2020, 10, 14, 14, 0)]);
    assert!(moments[0].is_cancelled());
}

#[test]
fn removed_moments_are_hidden() {
    let template = wednesday_template();
    let mut removed = persisted(utc(2020, 10, 14, 14, 0));
    removed.status = MomentStatus::Removed;

    // Hidden, and the occurrence is not re-synthesized in its place.
    let moments =
        materialize(&template, &[removed], utc(2020, 10, 9, 0, 0), utc(2020, 10, 16, 0, 0))
            .expect("should materialize");
    assert!(moments.is_empty());
}

#[test]
fn removed_moments_visible_on_request() {
    let template = wednesday_template();
    let mut removed = persisted(utc(2020, 10, 14, 14, 0));
    removed.status = MomentStatus::Removed;

    let moments = materialize_with_removed(
        &template,
        &[removed],
        utc(2020, 10, 9, 0, 0),
        utc(2020, 10, 16, 0, 0),
        true,
    )
    .expect("should materialize");
    assert_eq!(keys(&moments), vec![utc(2020, 10, 14, 14, 0)]);
    assert_eq!(moments[0].status, MomentStatus::Removed);
    assert!(moments[0].is_cancelled());
}

// ---------------------------------------------------------------------------
// Edge behavior
// ---------------------------------------------------------------------------

#[test]
fn persisted_moment_on_excluded_date_still_returned() {
    // 21 October is an EXDATE, so nothing is synthesized for it, but a stored
    // override with that key remains addressable.
    let template = wednesday_template();
    let existing = vec![persisted(utc(2020, 10, 21, 14, 0))];

    let moments =
        materialize(&template, &existing, utc(2020, 10, 16, 0, 0), utc(2020, 10, 23, 0, 0))
            .expect("should materialize");
    assert_eq!(keys(&moments), vec![utc(2020, 10, 21, 14, 0)]);
    assert!(moments[0].is_persisted());
}

#[test]
fn materialize_is_idempotent_and_sorted() {
    let template = wednesday_template();
    let mut moved = persisted(utc(2020, 10, 7, 14, 0));
    moved.local_start = Some(utc(2020, 10, 15, 9, 0));
    let existing = vec![moved];

    let first = materialize(&template, &existing, utc(2020, 10, 9, 0, 0), utc(2020, 10, 16, 0, 0))
        .expect("should materialize");
    let second = materialize(&template, &existing, utc(2020, 10, 9, 0, 0), utc(2020, 10, 16, 0, 0))
        .expect("should materialize");
    assert_eq!(first, second);

    let starts: Vec<DateTime<Utc>> = first.iter().map(|m| m.effective_start()).collect();
    let mut sorted = starts.clone();
    sorted.sort();
    assert_eq!(starts, sorted);
}

// ---------------------------------------------------------------------------
// Next moment search
// ---------------------------------------------------------------------------
// Naive Wednesdays after 9 October: 14 Oct, (21 Oct excluded), 28 Oct, ...

#[test]
fn next_synthesizes_from_the_pattern() {
    let template = wednesday_template();
    let next = next_moment(&template, &[], utc(2020, 10, 10, 0, 0), false)
        .expect("should search")
        .expect("pattern is unbounded");
    assert_eq!(next.canonical_key, utc(2020, 10, 14, 14, 0));
    assert!(!next.is_persisted());
}

#[test]
fn next_skips_excluded_dates() {
    let template = wednesday_template();
    let next = next_moment(&template, &[], utc(2020, 10, 15, 0, 0), false)
        .expect("should search")
        .expect("pattern is unbounded");
    // 21 October is an EXDATE; the search lands on the 28th (19:00 CET).
    assert_eq!(next.canonical_key, utc(2020, 10, 28, 15, 0));
}

#[test]
fn next_respects_the_inclusive_flag() {
    let template = wednesday_template();
    let occ = utc(2020, 10, 14, 14, 0);

    let next = next_moment(&template, &[], occ, true).expect("should search").expect("found");
    assert_eq!(next.canonical_key, occ);

    let next = next_moment(&template, &[], occ, false).expect("should search").expect("found");
    assert_eq!(next.canonical_key, utc(2020, 10, 28, 15, 0));
}

#[test]
fn next_prefers_the_persisted_moment() {
    let template = wednesday_template();
    let existing = vec![persisted(utc(2020, 10, 14, 14, 0))];

    let next = next_moment(&template, &existing, utc(2020, 10, 10, 0, 0), false)
        .expect("should search")
        .expect("found");
    assert_eq!(next.id, Some(7));
    assert_eq!(next.canonical_key, utc(2020, 10, 14, 14, 0));
}

#[test]
fn next_postponed_occurrence_is_not_resynthesized() {
    // The 14 October occurrence was pushed to the 20th: the search must
    // return the moved moment, not re-create the vacated slot.
    let template = wednesday_template();
    let mut moved = persisted(utc(2020, 10, 14, 14, 0));
    moved.local_start = Some(utc(2020, 10, 20, 14, 0));

    let next = next_moment(&template, &[moved], utc(2020, 10, 9, 0, 0), false)
        .expect("should search")
        .expect("found");
    assert_eq!(next.id, Some(7));
    assert_eq!(next.effective_start(), utc(2020, 10, 20, 14, 0));
}

#[test]
fn next_moved_up_occurrence_beats_the_pattern() {
    // A later occurrence pulled forward to the 10th comes before the naive
    // next occurrence on the 14th.
    let template = wednesday_template();
    let mut moved = persisted(utc(2020, 10, 28, 15, 0));
    moved.local_start = Some(utc(2020, 10, 10, 14, 0));

    let next = next_moment(&template, &[moved], utc(2020, 10, 9, 0, 0), false)
        .expect("should search")
        .expect("found");
    assert_eq!(next.id, Some(7));
    assert_eq!(next.effective_start(), utc(2020, 10, 10, 14, 0));
}

#[test]
fn next_moved_far_ahead_falls_back_to_the_pattern() {
    // The 14 October occurrence was pushed all the way to December; the next
    // unmoved naive occurrence (28 October) wins.
    let template = wednesday_template();
    let mut moved = persisted(utc(2020, 10, 14, 14, 0));
    moved.local_start = Some(utc(2020, 12, 1, 15, 0));

    let next = next_moment(&template, &[moved], utc(2020, 10, 9, 0, 0), false)
        .expect("should search")
        .expect("found");
    assert!(!next.is_persisted());
    assert_eq!(next.canonical_key, utc(2020, 10, 28, 15, 0));
}

#[test]
fn next_skips_removed_moments_by_default() {
    let template = wednesday_template();
    let mut removed = persisted(utc(2020, 10, 14, 14, 0));
    removed.status = MomentStatus::Removed;

    let next = next_moment(&template, &[removed], utc(2020, 10, 9, 0, 0), false)
        .expect("should search")
        .expect("found");
    assert_eq!(next.canonical_key, utc(2020, 10, 28, 15, 0));
    assert!(!next.is_persisted());
}

#[test]
fn next_keeps_cancelled_moments_by_default() {
    let template = wednesday_template();
    let mut cancelled = persisted(utc(2020, 10, 14, 14, 0));
    cancelled.status = MomentStatus::Cancelled;

    let next = next_moment(&template, &[cancelled], utc(2020, 10, 9, 0, 0), false)
        .expect("should search")
        .expect("found");
    assert_eq!(next.id, Some(7));
    assert!(next.is_cancelled());
}

#[test]
fn next_can_exclude_cancelled_moments() {
    let template = wednesday_template();
    let mut cancelled = persisted(utc(2020, 10, 14, 14, 0));
    cancelled.status = MomentStatus::Cancelled;

    let next =
        next_moment_filtered(&template, &[cancelled], utc(2020, 10, 9, 0, 0), false, true, true)
            .expect("should search")
            .expect("found");
    assert_eq!(next.canonical_key, utc(2020, 10, 28, 15, 0));
    assert!(!next.is_persisted());
}

#[test]
fn next_is_none_once_a_single_event_has_passed() {
    let template = EventTemplate {
        id: 2,
        start: utc(2020, 10, 15, 10, 0),
        end: utc(2020, 10, 15, 23, 30),
        timezone: Tz::Europe__Amsterdam,
        recurrence: Recurrence::default(),
    };

    let upcoming = next_moment(&template, &[], utc(2020, 10, 1, 0, 0), false)
        .expect("should search")
        .expect("still upcoming");
    assert_eq!(upcoming.canonical_key, utc(2020, 10, 15, 10, 0));

    let next = next_moment(&template, &[], utc(2020, 11, 1, 0, 0), false).expect("should search");
    assert!(next.is_none());
}

#[test]
#[should_panic(expected = "inverted materialize window")]
fn inverted_window_panics() {
    let template = wednesday_template();
    let _ = materialize(&template, &[], utc(2020, 10, 16, 0, 0), utc(2020, 10, 9, 0, 0));
}
