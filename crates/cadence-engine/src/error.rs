//! Error types for cadence-engine operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Runtime errors from enumeration and timezone handling.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid repeat rule: {0}")]
    InvalidRule(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// A field-scoped validation failure, reported at write time.
///
/// Validation collects every failure rather than stopping at the first, so a
/// form layer can attach each message to its offending field via [`field`].
///
/// [`field`]: ValidationError::field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("can add at most one repeat rule, got {0} (recurring dates are unaffected)")]
    TooManyRepeatRules(usize),

    #[error("exclusion rules are unsupported (exclusion dates can still be used)")]
    ExcludeRulesUnsupported,

    #[error("cannot exclude dates if the event is non-recurring")]
    ExcludeDatesWithoutRule,

    #[error("start must be before the end")]
    StartNotBeforeEnd,

    #[error("repeat rule does not parse: {0}")]
    InvalidRepeatRule(String),

    #[error("{0} is not an occurrence of this template")]
    NotAnOccurrence(DateTime<Utc>),

    #[error("end must be later than this occurrence's start ({0})")]
    EndNotAfterStart(DateTime<Utc>),
}

impl ValidationError {
    /// The template/moment field this failure is scoped to.
    pub fn field(&self) -> &'static str {
        match self {
            Self::TooManyRepeatRules(_)
            | Self::ExcludeRulesUnsupported
            | Self::ExcludeDatesWithoutRule
            | Self::InvalidRepeatRule(_) => "recurrence",
            Self::StartNotBeforeEnd => "start",
            Self::NotAnOccurrence(_) => "canonical_key",
            Self::EndNotAfterStart(_) => "local_end",
        }
    }
}
