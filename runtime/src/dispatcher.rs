//! Action dispatcher.
//!
//! Two protocols against the operations backend:
//!
//! - single-shot: `POST /v1/actions/execute` with `{ action, context, payload }`
//! - two-phase: `POST /v1/<entity>/prepare` for a prefilled preview, then
//!   `POST /v1/<entity>/commit` with the final field values. Commit never
//!   needs a preview; equivalent field values are enough.
//!
//! Each attempt is re-validated locally against the registry before any
//! request is sent, and produces exactly one [`ActionExecutionRecord`],
//! whether it succeeded, was rejected locally, or failed on the wire.
//! Commit is not idempotent here; duplicate submission is the caller's
//! concern.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bridgewatch_core::audit::{ActionExecutionRecord, AuditTrail, EntityRef};
use bridgewatch_core::error::codes;
use bridgewatch_core::recurrence::{RecurrenceQuery, RecurrenceResult};
use bridgewatch_core::registry::{ActionDescriptor, ActionName};
use bridgewatch_core::roles::Role;
use bridgewatch_core::situation::{DeviceType, SituationIdentity, SituationRecord};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::error::{ConfigError, DispatchError};
use crate::util;

const EXECUTE_PATH: &str = "/v1/actions/execute";
const RECURRENCE_PATH: &str = "/v1/rpc/check_symptom_recurrence";
const SITUATION_LOG_PATH: &str = "/v1/situations/log";

/// Authenticated caller. Passed explicitly into every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub yacht_id: String,
    pub user_id: String,
    pub role: Role,
    pub access_token: String,
    pub session_id: String,
    pub device_type: DeviceType,
}

impl SessionIdentity {
    pub fn situation_identity(&self) -> SituationIdentity {
        SituationIdentity {
            yacht_id: self.yacht_id.clone(),
            user_id: self.user_id.clone(),
            role: self.role,
            device_type: self.device_type,
            session_id: self.session_id.clone(),
        }
    }

    fn is_authenticated(&self) -> bool {
        !self.access_token.trim().is_empty()
    }
}

/// Caller-supplied parameters for a single-shot action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionRequest {
    pub payload: Map<String, Value>,
    /// Operator confirmed the action in a dialog
    pub confirmed: bool,
    pub reason: Option<String>,
    pub signature: Option<Value>,
}

impl ActionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(name.to_string(), value.into());
        self
    }

    pub fn confirmed(mut self) -> Self {
        self.confirmed = true;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_signature(mut self, signature: Value) -> Self {
        self.signature = Some(signature);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSuccess {
    pub action: ActionName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: Value,
    /// Id of the audit record for this attempt
    pub execution_id: Uuid,
}

/// Entities created through prepare/commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationEntity {
    WorkOrder,
    Fault,
}

impl MutationEntity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WorkOrder => "work_order",
            Self::Fault => "fault",
        }
    }

    pub const fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::WorkOrder | Self::Fault => &["title"],
        }
    }

    fn id_key(self) -> String {
        format!("{}_id", self.as_str())
    }

    fn number_key(self) -> String {
        format!("{}_number", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrepareRequest {
    pub query_text: Option<String>,
    pub extracted_entities: Map<String, Value>,
}

/// Provenance of a prefilled value, used for badging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    NlpEntity,
    Derived,
    Database,
    UserInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub source: FieldSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub value: Value,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MutationPreview {
    pub fields: Map<String, Value>,
    pub field_metadata: BTreeMap<String, FieldMetadata>,
    /// Keyed by field name, from `<field>_options` on the wire
    pub options: BTreeMap<String, Vec<FieldOption>>,
}

impl MutationPreview {
    fn from_wire(raw: &Value) -> Self {
        let mut preview = Self::default();
        let Some(object) = raw.as_object() else {
            return preview;
        };
        for (key, value) in object {
            if key == "field_metadata" {
                for (field, meta) in value.as_object().into_iter().flatten() {
                    match serde_json::from_value::<FieldMetadata>(meta.clone()) {
                        Ok(meta) => {
                            preview.field_metadata.insert(field.clone(), meta);
                        }
                        Err(e) => tracing::debug!(field = %field, error = %e, "ignoring field metadata"),
                    }
                }
            } else if let Some(field) = key.strip_suffix("_options") {
                let options = serde_json::from_value::<Vec<FieldOption>>(value.clone())
                    .unwrap_or_default();
                preview.options.insert(field.to_string(), options);
            } else {
                preview.fields.insert(key.clone(), value.clone());
            }
        }
        preview
    }

    pub fn field_source(&self, field: &str) -> Option<FieldSource> {
        self.field_metadata.get(field).map(|meta| meta.source)
    }

    /// Operator edit; the field is re-badged as user input.
    pub fn set_field(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
        self.field_metadata.insert(
            field.to_string(),
            FieldMetadata {
                source: FieldSource::UserInput,
            },
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReceipt {
    pub entity: MutationEntity,
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_number: Option<String>,
}

/// One HTTP answer. `body` is `None` when it was not valid JSON.
struct Reply {
    status: u16,
    body: Option<Value>,
}

struct Attempt<'a> {
    action: String,
    session: Option<&'a SessionIdentity>,
    entity: Option<EntityRef>,
    input: Value,
    started: Instant,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: DispatcherConfig,
    http: reqwest::Client,
    audit: Arc<Mutex<AuditTrail>>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Result<Self, ConfigError> {
        let http = util::client(&config)?;
        Ok(Self {
            config,
            http,
            audit: Arc::new(Mutex::new(AuditTrail::new())),
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Snapshot of every attempt so far, oldest first.
    pub fn audit_records(&self) -> Vec<ActionExecutionRecord> {
        self.audit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .records()
            .to_vec()
    }

    pub async fn health(&self) -> Result<Value, DispatchError> {
        let resp = self
            .http
            .get(self.config.endpoint("/health"))
            .send()
            .await
            .map_err(network_failure)?;
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.ok();
        interpret(Reply { status, body }, "health", None)
    }

    /// Run one registry action.
    ///
    /// Local checks, in order: session present, role allowed, reason,
    /// confirmation, signature, entity id. The first failure is returned
    /// without touching the network.
    pub async fn execute(
        &self,
        session: Option<&SessionIdentity>,
        action: ActionName,
        entity_id: Option<&str>,
        request: ActionRequest,
    ) -> Result<ActionSuccess, DispatchError> {
        let descriptor = action.descriptor();
        let entity = entity_ref(&descriptor, entity_id, &request.payload);
        let attempt = Attempt {
            action: action.as_str().to_string(),
            session,
            entity: entity.clone(),
            input: request_input(&request),
            started: Instant::now(),
        };

        let outcome = match session {
            Some(session) if session.is_authenticated() => {
                self.execute_checked(session, &descriptor, entity, request).await
            }
            _ => Err(DispatchError::Unauthenticated),
        };

        let execution_id = self.finish(attempt, &outcome);
        outcome.map(|mut success| {
            success.execution_id = execution_id;
            success
        })
    }

    async fn execute_checked(
        &self,
        session: &SessionIdentity,
        descriptor: &ActionDescriptor,
        entity: Option<EntityRef>,
        request: ActionRequest,
    ) -> Result<ActionSuccess, DispatchError> {
        let action = descriptor.name;
        authorize(session, descriptor)?;

        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|reason| !reason.is_empty());
        if descriptor.requires_reason && reason.is_none() {
            return Err(DispatchError::validation(
                "reason",
                format!("A reason is required to {}.", descriptor.label.to_lowercase()),
            ));
        }
        if descriptor.requires_confirmation && !request.confirmed {
            return Err(DispatchError::validation(
                "confirmed",
                format!("'{}' must be confirmed before it runs.", descriptor.label),
            ));
        }
        if descriptor.requires_signature && request.signature.is_none() {
            return Err(DispatchError::SignatureRequired {
                action: action.as_str().to_string(),
            });
        }
        if entity.is_none() && requires_entity(action) {
            return Err(DispatchError::validation(
                descriptor.domain.entity_key(),
                format!("{} is required.", descriptor.domain.entity_key()),
            ));
        }

        let mut context = Map::new();
        context.insert("yacht_id".into(), json!(session.yacht_id));
        context.insert("user_id".into(), json!(session.user_id));
        context.insert("role".into(), json!(session.role));

        // The backend validates the payload copy, so identity goes in both.
        let mut payload = request.payload;
        payload.insert("yacht_id".into(), json!(session.yacht_id));
        payload.insert("user_id".into(), json!(session.user_id));
        if let Some(entity) = &entity {
            context.insert(entity.key.clone(), json!(entity.id));
            payload.insert(entity.key.clone(), json!(entity.id));
        }
        if let Some(reason) = reason {
            payload.insert("reason".into(), json!(reason));
        }
        if let Some(signature) = request.signature {
            payload.insert("signature".into(), signature);
        }
        if descriptor.requires_confirmation {
            payload.insert("confirmed".into(), json!(true));
        }

        let body = json!({
            "action": action.as_str(),
            "context": context,
            "payload": payload,
        });
        let reply = self.post(session, EXECUTE_PATH, &body).await?;
        let body = interpret(reply, action.as_str(), Some(session.role))?;

        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        let data = match body.get("data") {
            Some(data) => data.clone(),
            None => merged_data(body),
        };
        Ok(ActionSuccess {
            action,
            message,
            data,
            execution_id: Uuid::nil(),
        })
    }

    /// Phase 1: ask the backend for a prefilled preview.
    pub async fn prepare(
        &self,
        session: Option<&SessionIdentity>,
        entity: MutationEntity,
        request: PrepareRequest,
    ) -> Result<MutationPreview, DispatchError> {
        let mut body = Map::new();
        if let Some(query_text) = &request.query_text {
            body.insert("query_text".into(), json!(query_text));
        }
        if !request.extracted_entities.is_empty() {
            body.insert(
                "extracted_entities".into(),
                Value::Object(request.extracted_entities.clone()),
            );
        }
        let attempt = Attempt {
            action: format!("{}.prepare", entity.as_str()),
            session,
            entity: None,
            input: Value::Object(body.clone()),
            started: Instant::now(),
        };

        let outcome = match session {
            Some(session) if session.is_authenticated() => {
                body.insert("yacht_id".into(), json!(session.yacht_id));
                let path = format!("/v1/{}/prepare", entity.as_str());
                match self.post(session, &path, &Value::Object(body)).await {
                    Ok(reply) => {
                        let status = reply.status;
                        interpret(reply, &attempt.action, Some(session.role)).and_then(|body| {
                            body.get("mutation_preview")
                                .filter(|preview| preview.is_object())
                                .map(MutationPreview::from_wire)
                                .ok_or_else(|| DispatchError::RemoteRejected {
                                    status,
                                    message: "Malformed response: missing mutation_preview"
                                        .to_string(),
                                })
                        })
                    }
                    Err(e) => Err(e),
                }
            }
            _ => Err(DispatchError::Unauthenticated),
        };

        self.finish(attempt, &outcome);
        outcome
    }

    /// Phase 2: create the entity from final field values.
    pub async fn commit(
        &self,
        session: Option<&SessionIdentity>,
        entity: MutationEntity,
        fields: Map<String, Value>,
    ) -> Result<CommitReceipt, DispatchError> {
        let attempt = Attempt {
            action: format!("{}.commit", entity.as_str()),
            session,
            entity: None,
            input: Value::Object(fields.clone()),
            started: Instant::now(),
        };

        let outcome = match session {
            Some(session) if session.is_authenticated() => {
                self.commit_checked(session, entity, &attempt.action, fields).await
            }
            _ => Err(DispatchError::Unauthenticated),
        };

        self.finish(attempt, &outcome);
        outcome
    }

    async fn commit_checked(
        &self,
        session: &SessionIdentity,
        entity: MutationEntity,
        label: &str,
        mut fields: Map<String, Value>,
    ) -> Result<CommitReceipt, DispatchError> {
        for required in entity.required_fields() {
            let present = fields
                .get(*required)
                .and_then(Value::as_str)
                .is_some_and(|value| !value.trim().is_empty());
            if !present {
                return Err(DispatchError::validation(
                    required,
                    format!("{required} is required."),
                ));
            }
        }

        fields.insert("yacht_id".into(), json!(session.yacht_id));
        let body = json!({
            "context": { "yacht_id": session.yacht_id, "user_id": session.user_id },
            "payload": fields,
        });
        let path = format!("/v1/{}/commit", entity.as_str());
        let reply = self.post(session, &path, &body).await?;
        let status = reply.status;
        let body = interpret(reply, label, Some(session.role))?;

        let id_key = entity.id_key();
        let entity_id = body
            .get(&id_key)
            .and_then(scalar_string)
            .ok_or_else(|| DispatchError::RemoteRejected {
                status,
                message: format!("Malformed response: missing {id_key}"),
            })?;
        Ok(CommitReceipt {
            entity,
            entity_id,
            entity_number: body.get(&entity.number_key()).and_then(scalar_string),
        })
    }

    /// `check_symptom_recurrence`; an empty result set reads as no recurrence.
    pub async fn check_recurrence(
        &self,
        session: &SessionIdentity,
        query: &RecurrenceQuery,
    ) -> Result<RecurrenceResult, DispatchError> {
        if !session.is_authenticated() {
            return Err(DispatchError::Unauthenticated);
        }
        let body = serde_json::to_value(query).map_err(|e| DispatchError::validation("query", e.to_string()))?;
        let reply = self.post(session, RECURRENCE_PATH, &body).await?;
        let status = reply.status;
        let body = interpret(reply, "check_symptom_recurrence", Some(session.role))?;
        let row = match body {
            Value::Array(rows) => rows.into_iter().next(),
            Value::Object(_) => Some(body),
            _ => None,
        };
        match row {
            Some(row) => serde_json::from_value(row).map_err(|e| DispatchError::RemoteRejected {
                status,
                message: format!("Malformed recurrence result: {e}"),
            }),
            None => Ok(RecurrenceResult::default()),
        }
    }

    /// Post a closed situation to the backend log.
    pub async fn archive_situation(
        &self,
        session: &SessionIdentity,
        record: &SituationRecord,
    ) -> Result<(), DispatchError> {
        if !session.is_authenticated() {
            return Err(DispatchError::Unauthenticated);
        }
        let body = serde_json::to_value(record).map_err(|e| DispatchError::validation("record", e.to_string()))?;
        let reply = self.post(session, SITUATION_LOG_PATH, &body).await?;
        interpret(reply, "situation_log", Some(session.role)).map(|_| ())
    }

    async fn post(
        &self,
        session: &SessionIdentity,
        path: &str,
        body: &Value,
    ) -> Result<Reply, DispatchError> {
        let resp = self
            .http
            .post(self.config.endpoint(path))
            .bearer_auth(&session.access_token)
            .json(body)
            .send()
            .await
            .map_err(network_failure)?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(network_failure)?;
        let body = serde_json::from_str::<Value>(&text).ok();
        Ok(Reply { status, body })
    }

    fn finish<T: Serialize>(
        &self,
        attempt: Attempt<'_>,
        outcome: &Result<T, DispatchError>,
    ) -> Uuid {
        let (result, error_code, error) = match outcome {
            Ok(value) => (serde_json::to_value(value).ok(), None, None),
            Err(e) => (None, Some(e.code().to_string()), Some(e.to_string())),
        };
        let record = ActionExecutionRecord {
            id: Uuid::now_v7(),
            action: attempt.action,
            actor: attempt.session.map(|s| s.user_id.clone()),
            role: attempt.session.map(|s| s.role),
            yacht_id: attempt.session.map(|s| s.yacht_id.clone()),
            entity: attempt.entity,
            input: attempt.input,
            result,
            error_code,
            error,
            success: outcome.is_ok(),
            duration_ms: attempt.started.elapsed().as_millis() as u64,
            recorded_at: Utc::now(),
        };

        if record.success {
            tracing::info!(
                action = %record.action,
                user_id = ?record.actor,
                yacht_id = ?record.yacht_id,
                duration_ms = record.duration_ms,
                success = true,
                "action execution recorded"
            );
        } else {
            tracing::warn!(
                action = %record.action,
                user_id = ?record.actor,
                yacht_id = ?record.yacht_id,
                duration_ms = record.duration_ms,
                error_code = ?record.error_code,
                success = false,
                "action execution recorded"
            );
        }

        let id = record.id;
        self.audit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .append(record);
        id
    }
}

fn authorize(session: &SessionIdentity, descriptor: &ActionDescriptor) -> Result<(), DispatchError> {
    if descriptor.allows(session.role) {
        tracing::debug!(
            user_id = %session.user_id,
            action = descriptor.name.as_str(),
            role = session.role.as_str(),
            decision = "allow",
            "action authorization decision"
        );
        return Ok(());
    }
    tracing::warn!(
        user_id = %session.user_id,
        action = descriptor.name.as_str(),
        role = session.role.as_str(),
        allowed_roles = ?descriptor.allowed_roles,
        decision = "deny",
        "action authorization decision"
    );
    Err(DispatchError::PermissionDenied {
        action: descriptor.name.as_str().to_string(),
        role: session.role.as_str().to_string(),
    })
}

/// Adding to the handover log is the one action with no pre-existing target.
fn requires_entity(action: ActionName) -> bool {
    action != ActionName::AddToHandover
}

fn entity_ref(
    descriptor: &ActionDescriptor,
    entity_id: Option<&str>,
    payload: &Map<String, Value>,
) -> Option<EntityRef> {
    let key = descriptor.domain.entity_key();
    let id = entity_id
        .map(str::to_string)
        .or_else(|| payload.get(key).and_then(scalar_string))?;
    let id = id.trim().to_string();
    if id.is_empty() {
        return None;
    }
    Some(EntityRef {
        key: key.to_string(),
        id,
    })
}

fn request_input(request: &ActionRequest) -> Value {
    let mut input = request.payload.clone();
    if let Some(reason) = &request.reason {
        input.insert("reason".into(), json!(reason));
    }
    if request.signature.is_some() {
        // Signatures are not copied into the audit trail.
        input.insert("signature".into(), json!("<provided>"));
    }
    if request.confirmed {
        input.insert("confirmed".into(), json!(true));
    }
    Value::Object(input)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Success bodies without a `data` object carry their fields at top level.
fn merged_data(body: Value) -> Value {
    match body {
        Value::Object(mut object) => {
            object.remove("success");
            object.remove("message");
            Value::Object(object)
        }
        other => other,
    }
}

fn network_failure(e: reqwest::Error) -> DispatchError {
    let message = if e.is_timeout() {
        "the request timed out".to_string()
    } else {
        e.to_string()
    };
    DispatchError::NetworkFailure(message)
}

fn interpret(reply: Reply, action: &str, role: Option<Role>) -> Result<Value, DispatchError> {
    let success = (200..300).contains(&reply.status);
    let Some(body) = reply.body else {
        if success {
            return Err(DispatchError::RemoteRejected {
                status: reply.status,
                message: "Malformed response from server".to_string(),
            });
        }
        return Err(classify_failure(reply.status, &Value::Null, action, role));
    };
    if !success || body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(classify_failure(reply.status, &body, action, role));
    }
    Ok(body)
}

/// Operator-facing message from an error body.
///
/// Looks at `detail`, then `error.message`, then `message`, then a bare
/// `error` string, and finally falls back to `Request failed (<status>)`.
pub fn extract_error_message(status: u16, body: &Value) -> String {
    let error = body.get("error");
    [
        body.get("detail"),
        error.and_then(|e| e.get("message")),
        body.get("message"),
        error,
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .map(str::trim)
    .find(|message| !message.is_empty())
    .map(str::to_string)
    .unwrap_or_else(|| format!("Request failed ({status})"))
}

fn error_codes(body: &Value) -> Vec<String> {
    let error = body.get("error");
    [
        error.and_then(|e| e.get("code")),
        body.get("error_code"),
        body.get("code"),
        error,
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .map(|code| code.trim().to_ascii_lowercase())
    .collect()
}

fn error_field(body: &Value) -> Option<String> {
    body.get("field")
        .or_else(|| body.get("error").and_then(|e| e.get("field")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Map a rejected response onto the caller-facing taxonomy.
pub fn classify_failure(status: u16, body: &Value, action: &str, role: Option<Role>) -> DispatchError {
    let message = extract_error_message(status, body);
    let found = error_codes(body);
    let has = |wanted: &[&str]| found.iter().any(|code| wanted.contains(&code.as_str()));

    if status == 401 || has(&[codes::UNAUTHORIZED, codes::UNAUTHENTICATED]) {
        DispatchError::Unauthenticated
    } else if status == 403 || has(&[codes::FORBIDDEN, codes::PERMISSION_DENIED]) {
        DispatchError::PermissionDenied {
            action: action.to_string(),
            role: role.map_or("current", Role::as_str).to_string(),
        }
    } else if has(&[codes::ALREADY_IN_TERMINAL_STATE])
        || (status == 409 && message.to_lowercase().contains("already"))
    {
        DispatchError::AlreadyInTerminalState(message)
    } else if has(&[codes::SIGNATURE_REQUIRED]) {
        DispatchError::SignatureRequired {
            action: action.to_string(),
        }
    } else if status == 400 || status == 422 || has(&[codes::VALIDATION_FAILED]) {
        DispatchError::ValidationFailed {
            field: error_field(body),
            message,
        }
    } else {
        DispatchError::RemoteRejected { status, message }
    }
}
