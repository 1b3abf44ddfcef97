use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::roles::Role;

/// Identifier of the entity an action was aimed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EntityRef {
    /// Identifier field name as sent to the backend, e.g. `fault_id`
    pub key: String,
    pub id: String,
}

/// One dispatch attempt. Records are never changed once written.
///
/// A record is produced for every attempt, including ones rejected locally
/// before reaching the network (unauthenticated, permission, validation).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActionExecutionRecord {
    /// UUIDv7, time-sortable
    pub id: Uuid,
    /// Action name, or `<entity>.prepare` / `<entity>.commit` for two-phase calls
    pub action: String,
    /// User who attempted the action. `None` when no session was present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yacht_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityRef>,
    /// Parameters as sent (or as they would have been sent)
    pub input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Machine code of the failure (e.g. `permission_denied`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Human-readable failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only list of execution records.
///
/// Entries cannot be edited or removed once pushed.
#[derive(Debug, Default, Clone)]
pub struct AuditTrail {
    records: Vec<ActionExecutionRecord>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: ActionExecutionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ActionExecutionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ActionExecutionRecord> {
        self.records.iter().filter(|record| !record.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(action: &str, success: bool) -> ActionExecutionRecord {
        ActionExecutionRecord {
            id: Uuid::now_v7(),
            action: action.to_string(),
            actor: Some("user-1".to_string()),
            role: Some(Role::Engineer),
            yacht_id: Some("Y1".to_string()),
            entity: Some(EntityRef {
                key: "fault_id".to_string(),
                id: "F-1".to_string(),
            }),
            input: json!({"fault_id": "F-1"}),
            result: None,
            error_code: (!success).then(|| "remote_rejected".to_string()),
            error: (!success).then(|| "Request failed (500)".to_string()),
            success,
            duration_ms: 12,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn trail_keeps_insertion_order_and_filters_failures() {
        let mut trail = AuditTrail::new();
        trail.append(record("acknowledge_fault", true));
        trail.append(record("close_fault", false));

        assert_eq!(trail.len(), 2);
        assert_eq!(trail.records()[0].action, "acknowledge_fault");
        let failures: Vec<_> = trail.failures().map(|r| r.action.as_str()).collect();
        assert_eq!(failures, vec!["close_fault"]);
    }

    #[test]
    fn record_omits_empty_optionals() {
        let value = serde_json::to_value(record("view_fault_history", true)).unwrap();
        assert!(value.get("error").is_none());
        assert_eq!(value["entity"]["key"], "fault_id");
    }
}
