//! Calendar feed export surface: stable entry identifiers and VTIMEZONE text.
//!
//! The identifier rule is a hard external contract. Calendar readers dedupe
//! by uid, so a moment that overrides one occurrence of a recurring pattern
//! must carry the *same* uid as the pattern's canonical entry (the override
//! then replaces it instead of duplicating it), while a non-recurring
//! template's own moment must carry a *distinct* uid.

use chrono::Weekday;

use crate::error::Result;
use crate::moment::Moment;
use crate::occurrence;
use crate::template::EventTemplate;
use crate::tzrules::{format_offset, TimezoneRuleSet, TransitionRule};

const UID_PREFIX: &str = "club-event";

/// iCalendar weekday codes, `Weekday::Sun` first.
const WEEKDAY_CODES: [&str; 7] = ["SU", "MO", "TU", "WE", "TH", "FR", "SA"];

/// The uid of a template's canonical feed entry.
pub fn template_uid(template: &EventTemplate, domain: &str) -> String {
    format!("{UID_PREFIX}-{}@{domain}", template.id)
}

/// The uid of a materialized moment's feed entry.
///
/// Moments that are part of a recurring pattern share [`template_uid`];
/// standalone moments get `-special-<surrogate id>`. A synthesized moment of
/// a non-recurring template has no surrogate yet, so its canonical key keeps
/// the uid distinct until the caller persists it.
///
/// # Errors
/// Returns [`crate::EngineError::InvalidRule`] if the template's stored
/// repeat rule does not parse.
pub fn feed_uid(template: &EventTemplate, moment: &Moment, domain: &str) -> Result<String> {
    if occurrence::is_part_of_pattern(template, moment)? {
        return Ok(template_uid(template, domain));
    }
    let discriminant = match moment.id {
        Some(id) => id,
        None => moment.canonical_key.timestamp(),
    };
    Ok(format!(
        "{UID_PREFIX}-{}-special-{}@{domain}",
        template.id, discriminant
    ))
}

/// Render a synthesized rule set as a VTIMEZONE component.
///
/// Emits a DAYLIGHT and STANDARD block for zones with DST, or a single
/// STANDARD block otherwise, with CRLF line endings and no line folding
/// (no emitted line approaches the 75-octet limit).
pub fn render_vtimezone(rules: &TimezoneRuleSet) -> String {
    let mut lines = vec!["BEGIN:VTIMEZONE".to_string(), format!("TZID:{}", rules.tz_id)];
    if let Some(daylight) = &rules.daylight {
        push_component(&mut lines, "DAYLIGHT", daylight);
    }
    push_component(&mut lines, "STANDARD", &rules.standard);
    lines.push(format!("X-LIC-LOCATION:{}", rules.tz_id));
    lines.push("END:VTIMEZONE".to_string());
    lines.push(String::new());
    lines.join("\r\n")
}

fn push_component(lines: &mut Vec<String>, kind: &str, rule: &TransitionRule) {
    lines.push(format!("BEGIN:{kind}"));
    lines.push(format!("TZOFFSETFROM:{}", format_offset(rule.offset_from)));
    lines.push(format!("TZOFFSETTO:{}", format_offset(rule.offset_to)));
    lines.push(format!("TZNAME:{}", rule.name));
    lines.push(format!(
        "DTSTART:{}",
        rule.first_transition.format("%Y%m%dT%H%M%S")
    ));
    if let Some(rec) = &rule.recurrence {
        lines.push(format!(
            "RRULE:FREQ=YEARLY;BYMONTH={};BYDAY={}{}",
            rec.month,
            rec.week,
            weekday_code(rec.weekday)
        ));
    }
    lines.push(format!("END:{kind}"));
}

fn weekday_code(weekday: Weekday) -> &'static str {
    WEEKDAY_CODES[weekday.num_days_from_sunday() as usize]
}
