//! The reusable recurring-event definition and its write-time validation.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::occurrence;

/// Recurrence information attached to a template.
///
/// `rrules` holds RFC 5545 RRULE content lines (e.g. `FREQ=WEEKLY;BYDAY=TU`);
/// at most one is valid. `rdates`/`exdates` carry civil dates only — the
/// enumerator gives them the template's wall-clock start time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub rrules: Vec<String>,
    /// Exclusion rules are unsupported (RFC 2445 EXRULE, deprecated by RFC
    /// 5545); kept only so validation can report them.
    pub exrules: Vec<String>,
    pub rdates: Vec<NaiveDate>,
    pub exdates: Vec<NaiveDate>,
}

impl Recurrence {
    pub fn is_empty(&self) -> bool {
        self.rrules.is_empty()
            && self.exrules.is_empty()
            && self.rdates.is_empty()
            && self.exdates.is_empty()
    }
}

/// A recurring-event template: a base time window plus repeat/include/exclude
/// rules, anchored to a civil timezone.
///
/// Templates are plain records — the persistence collaborator hands them in
/// already stored; the engine never writes them back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTemplate {
    /// Stable identity scoping all derived moments.
    pub id: i64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// The zone in which the wall-clock pattern is anchored.
    pub timezone: Tz,
    pub recurrence: Recurrence,
}

impl EventTemplate {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whether the template recurs: it has a repeat rule or extra dates.
    pub fn is_recurring(&self) -> bool {
        !self.recurrence.rrules.is_empty() || !self.recurrence.rdates.is_empty()
    }

    /// Validate the template as a whole, collecting every failure.
    ///
    /// Reported at template-write time so enumeration can assume a
    /// well-formed template. An unparseable repeat rule is still surfaced as
    /// an [`crate::EngineError::InvalidRule`] if it slips through to
    /// enumeration.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.start >= self.end {
            errors.push(ValidationError::StartNotBeforeEnd);
        }

        let r = &self.recurrence;
        if r.rrules.len() > 1 {
            errors.push(ValidationError::TooManyRepeatRules(r.rrules.len()));
        }
        if !r.exrules.is_empty() {
            errors.push(ValidationError::ExcludeRulesUnsupported);
        }
        // Nothing to exclude from without a repeat rule.
        if r.rrules.is_empty() && !r.exdates.is_empty() {
            errors.push(ValidationError::ExcludeDatesWithoutRule);
        }
        if r.rrules.len() == 1 {
            if let Err(e) = occurrence::parse_rule_set(self) {
                errors.push(ValidationError::InvalidRepeatRule(e.to_string()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
