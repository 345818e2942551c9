//! # cadence-engine
//!
//! Recurring-event occurrence resolution for a club-management application,
//! with DST-correct wall-clock semantics.
//!
//! Given a recurrence template (a base time window plus repeat/include/exclude
//! rules) and a snapshot of persisted per-occurrence overrides ("moments"),
//! the engine computes exactly which concrete event instances exist inside an
//! arbitrary query window — including instances whose *effective* time was
//! overridden to fall outside/inside the naive recurrence pattern. A recurring
//! event keeps its local clock time across DST transitions, not its absolute
//! UTC offset.
//!
//! The engine is a pure function surface over plain records: persistence,
//! request handling and permission checks live in the surrounding system.
//!
//! ## Modules
//!
//! - [`template`] — the recurring-event definition and its validation
//! - [`occurrence`] — naive occurrence enumeration (wraps the `rrule` crate)
//! - [`civil`] — wall-clock (DST-ignoring) time reinterpretation
//! - [`moment`] — per-occurrence override records
//! - [`overlay`] — merging naive occurrences with overrides into final moments
//! - [`tzrules`] — annual DST transition rule synthesis, memoized per zone
//! - [`feed`] — calendar export identifiers and VTIMEZONE rendering
//! - [`error`] — error types

pub mod civil;
pub mod error;
pub mod feed;
pub mod moment;
pub mod occurrence;
pub mod overlay;
pub mod template;
pub mod tzrules;

pub use civil::CivilTimeConverter;
pub use error::{EngineError, Result, ValidationError};
pub use feed::{feed_uid, render_vtimezone, template_uid};
pub use moment::{Moment, MomentStatus};
pub use occurrence::{is_part_of_pattern, next_occurrence, occurrence_at, occurrences_between};
pub use overlay::{materialize, materialize_with_removed, next_moment, next_moment_filtered};
pub use template::{EventTemplate, Recurrence};
pub use tzrules::{AnnualRule, TimezoneRuleCache, TimezoneRuleSet, TransitionRule};
