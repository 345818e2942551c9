//! Wall-clock ("civil") time reinterpretation across DST transitions.
//!
//! Recurring events mean "16:00 on the clock" rather than "16:00 at this UTC
//! offset". The converter cancels DST drift by reinterpreting an instant's
//! wall-clock reading at the UTC offset a *reference* instant has in the same
//! zone, and back. Stored inclusion/exclusion dates inherit the template
//! start's time-of-day this way instead of whatever offset applies on their
//! own calendar date.

use chrono::{DateTime, Duration, FixedOffset, LocalResult, NaiveDate, Offset, TimeZone, Utc};
use chrono_tz::Tz;

/// Converts between real instants and "civil" instants pinned to a reference
/// offset.
///
/// Applying [`to_civil`] then [`to_offset_aware`] with the same reference is
/// the identity for instants on the same side of a DST transition as the
/// reference. Crossing a transition shifts the instant by exactly the offset
/// delta, which keeps the *local clock* time-of-day stable — the intended
/// behavior for recurring events.
///
/// [`to_civil`]: CivilTimeConverter::to_civil
/// [`to_offset_aware`]: CivilTimeConverter::to_offset_aware
#[derive(Debug, Clone, Copy)]
pub struct CivilTimeConverter {
    tz: Tz,
}

impl CivilTimeConverter {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// The UTC offset `reference` carries in this converter's zone.
    fn reference_offset(&self, reference: DateTime<Utc>) -> FixedOffset {
        self.tz.offset_from_utc_datetime(&reference.naive_utc()).fix()
    }

    /// Reinterpret `instant`'s wall-clock date and time-of-day as if it
    /// carried the offset that `reference` has in the zone.
    pub fn to_civil(&self, instant: DateTime<Utc>, reference: DateTime<Utc>) -> DateTime<Utc> {
        let offset = self.reference_offset(reference);
        let wall = instant.with_timezone(&self.tz).naive_local();
        let utc = wall - Duration::seconds(i64::from(offset.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(utc, Utc)
    }

    /// Inverse of [`to_civil`]: resolve the wall clock carried by `civil` (at
    /// the reference offset) back into a real instant in the zone.
    ///
    /// Ambiguous local times (fall-back hour) resolve to the earlier instant.
    /// Nonexistent local times (spring-forward gap) resolve using the
    /// reference offset.
    ///
    /// [`to_civil`]: CivilTimeConverter::to_civil
    pub fn to_offset_aware(&self, civil: DateTime<Utc>, reference: DateTime<Utc>) -> DateTime<Utc> {
        let offset = self.reference_offset(reference);
        let shift = Duration::seconds(i64::from(offset.local_minus_utc()));
        let wall = civil.naive_utc() + shift;
        match self.tz.from_local_datetime(&wall) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
            LocalResult::None => DateTime::from_naive_utc_and_offset(wall - shift, Utc),
        }
    }

    /// Combine a civil date (no time-of-day) with `reference`'s wall-clock
    /// time at the reference offset.
    ///
    /// This is the RDATE/EXDATE normalization primitive: stored dates default
    /// to midnight, but they should match the event's start time regardless of
    /// which side of a DST transition they fall on.
    pub fn civil_from_date(&self, date: NaiveDate, reference: DateTime<Utc>) -> DateTime<Utc> {
        let offset = self.reference_offset(reference);
        let wall = date.and_time(reference.with_timezone(&self.tz).time());
        let utc = wall - Duration::seconds(i64::from(offset.local_minus_utc()));
        DateTime::from_naive_utc_and_offset(utc, Utc)
    }
}
