//! Symptom recurrence: has the same symptom come back on the same equipment
//! often enough, recently enough, to be treated as a pattern?
//!
//! The authoritative computation runs server-side behind
//! `check_symptom_recurrence`; this module holds the wire types and a pure
//! evaluation with identical semantics, used by tests and offline replay.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A stored fault/symptom report as the detector sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SymptomReport {
    pub yacht_id: String,
    pub equipment_label: String,
    pub symptom_code: String,
    pub reported_at: DateTime<Utc>,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecurrenceQuery {
    pub yacht_id: String,
    /// Partial label; matched case-insensitively on word boundaries
    pub equipment_label: String,
    pub symptom_code: String,
    pub threshold_count: u32,
    pub threshold_days: u32,
}

/// One row of `check_symptom_recurrence`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecurrenceResult {
    /// All matching reports in the window, resolved or not
    pub occurrence_count: u32,
    /// Unresolved subset of `occurrence_count`
    pub open_count: u32,
    pub is_recurrent: bool,
    /// Whole days between the earliest and latest matching report
    pub span_days: u32,
}

impl RecurrenceQuery {
    pub fn matches(&self, report: &SymptomReport) -> bool {
        report.yacht_id == self.yacht_id
            && report.symptom_code.eq_ignore_ascii_case(self.symptom_code.trim())
            && label_matches(&self.equipment_label, &report.equipment_label)
    }

    /// Evaluate against a set of reports as of `now`.
    ///
    /// Only reports inside the `threshold_days` window ending at `now` count.
    pub fn evaluate(&self, reports: &[SymptomReport], now: DateTime<Utc>) -> RecurrenceResult {
        let window_start = now - Duration::days(i64::from(self.threshold_days));
        let matching: Vec<&SymptomReport> = reports
            .iter()
            .filter(|report| self.matches(report))
            .filter(|report| report.reported_at >= window_start && report.reported_at <= now)
            .collect();

        let occurrence_count = matching.len() as u32;
        let open_count = matching.iter().filter(|report| !report.resolved).count() as u32;
        let span_days = match (
            matching.iter().map(|report| report.reported_at).min(),
            matching.iter().map(|report| report.reported_at).max(),
        ) {
            (Some(first), Some(last)) => (last - first).num_days().max(0) as u32,
            _ => 0,
        };

        RecurrenceResult {
            occurrence_count,
            open_count,
            is_recurrent: self.threshold_count > 0
                && occurrence_count >= self.threshold_count
                && span_days <= self.threshold_days,
            span_days,
        }
    }
}

/// Case-insensitive substring match that must start and end on a word
/// boundary of the stored label, so "Generator 1" never matches
/// "Generator 10".
pub fn label_matches(query: &str, stored: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    let haystack = stored.to_lowercase();

    // Candidates may overlap, so a rejected hit resumes one char later.
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(&needle) {
        let start = from + offset;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        let step = haystack[start..].chars().next().map_or(1, char::len_utf8);
        from = start + step;
    }
    false
}
