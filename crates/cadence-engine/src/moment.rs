//! Per-occurrence override records ("moments").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::occurrence;
use crate::template::EventTemplate;

/// Lifecycle status of a moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MomentStatus {
    /// Proceeds normally.
    #[default]
    Normal,
    /// Cancelled but still visible — callers decide how to display it.
    Cancelled,
    /// Hidden from materialized results unless explicitly requested.
    Removed,
}

/// A persisted (or synthesized-in-memory) override of one occurrence.
///
/// Keyed logically by `(template_id, canonical_key)`: the canonical key is
/// the naive occurrence instant this moment overrides. At most one moment
/// exists per key for a given template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moment {
    /// Database surrogate key; `None` for moments synthesized on demand and
    /// never written. Saving those is the caller's responsibility.
    pub id: Option<i64>,
    pub template_id: i64,
    pub canonical_key: DateTime<Utc>,
    /// Alternative start of this occurrence. When absent, the occurrence
    /// starts at its canonical key.
    pub local_start: Option<DateTime<Utc>>,
    /// Alternative end. When absent, the occurrence runs for the template's
    /// duration from its effective start.
    pub local_end: Option<DateTime<Utc>>,
    pub status: MomentStatus,
}

impl Moment {
    /// An in-memory moment for an occurrence that has no persisted override.
    pub fn synthesized(template: &EventTemplate, canonical_key: DateTime<Utc>) -> Self {
        Self {
            id: None,
            template_id: template.id,
            canonical_key,
            local_start: None,
            local_end: None,
            status: MomentStatus::Normal,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status != MomentStatus::Normal
    }

    /// The instant this occurrence actually starts.
    pub fn effective_start(&self) -> DateTime<Utc> {
        self.local_start.unwrap_or(self.canonical_key)
    }

    /// The instant this occurrence actually ends.
    pub fn effective_end(&self, template: &EventTemplate) -> DateTime<Utc> {
        self.local_end
            .unwrap_or_else(|| self.effective_start() + template.duration())
    }

    /// Validate the override against its template, collecting every failure.
    pub fn validate(&self, template: &EventTemplate) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        match occurrence::occurrence_at(template, self.canonical_key) {
            Ok(true) => {}
            Ok(false) => errors.push(ValidationError::NotAnOccurrence(self.canonical_key)),
            Err(e) => errors.push(ValidationError::InvalidRepeatRule(e.to_string())),
        }

        if let Some(local_end) = self.local_end {
            if local_end <= self.effective_start() {
                errors.push(ValidationError::EndNotAfterStart(self.effective_start()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
