mod common;

use std::time::Duration;

use bridgewatch_core::permissions::offered_actions;
use bridgewatch_core::recurrence::RecurrenceQuery;
use bridgewatch_core::registry::ActionName;
use bridgewatch_core::roles::Role;
use bridgewatch_runtime::{
    ActionRequest, DispatchError, Dispatcher, DispatcherConfig, FieldSource, MutationEntity,
    PrepareRequest,
};
use serde_json::{Map, json};

use common::{YACHT, dispatcher, generator_reports, session, spawn_backend};

fn title(value: &str) -> Map<String, serde_json::Value> {
    let mut fields = Map::new();
    fields.insert("title".into(), json!(value));
    fields
}

#[tokio::test]
async fn crew_is_denied_acknowledge_without_a_request() {
    let (url, backend) = spawn_backend(Vec::new()).await;
    let dispatcher = dispatcher(&url);

    assert!(
        offered_actions(Role::Crew, None)
            .iter()
            .all(|d| d.name != ActionName::AcknowledgeFault)
    );

    let err = dispatcher
        .execute(
            Some(&session(Role::Crew)),
            ActionName::AcknowledgeFault,
            Some("f-1"),
            ActionRequest::new(),
        )
        .await
        .expect_err("crew must not acknowledge faults");
    assert_eq!(
        err,
        DispatchError::PermissionDenied {
            action: "acknowledge_fault".to_string(),
            role: "crew".to_string(),
        }
    );
    assert_eq!(backend.request_count(), 0);

    let records = dispatcher.audit_records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].error_code.as_deref(), Some("permission_denied"));
}

#[tokio::test]
async fn backend_denial_surfaces_as_permission_denied() {
    let (url, backend) = spawn_backend(Vec::new()).await;
    let err = dispatcher(&url)
        .execute(
            Some(&session(Role::Engineer)),
            ActionName::DiagnoseFault,
            Some("f-other-yacht"),
            ActionRequest::new(),
        )
        .await
        .expect_err("backend should refuse");
    assert!(matches!(err, DispatchError::PermissionDenied { .. }));
    assert_eq!(backend.request_count(), 1);
}

#[tokio::test]
async fn missing_or_rejected_credentials_are_unauthenticated() {
    let (url, backend) = spawn_backend(Vec::new()).await;
    let dispatcher = dispatcher(&url);

    let err = dispatcher
        .execute(None, ActionName::ViewPartStock, Some("p-1"), ActionRequest::new())
        .await
        .expect_err("no session");
    assert_eq!(err, DispatchError::Unauthenticated);
    assert_eq!(backend.request_count(), 0);

    let mut stale = session(Role::Engineer);
    stale.access_token = "expired".to_string();
    let err = dispatcher
        .execute(Some(&stale), ActionName::ViewPartStock, Some("p-1"), ActionRequest::new())
        .await
        .expect_err("backend should answer 401");
    assert_eq!(err, DispatchError::Unauthenticated);
    assert_eq!(backend.request_count(), 1);
}

#[tokio::test]
async fn identity_is_merged_into_context_and_payload() {
    let (url, backend) = spawn_backend(Vec::new()).await;
    let success = dispatcher(&url)
        .execute(
            Some(&session(Role::Steward)),
            ActionName::AddFaultNote,
            Some("f-1"),
            ActionRequest::new().with_field("note", "Smell of burning near switchboard"),
        )
        .await
        .expect("note should be added");

    assert_eq!(success.message.as_deref(), Some("done"));
    assert_eq!(success.data["echo"]["note"], "Smell of burning near switchboard");

    let sent = backend.last_executed().expect("request should be recorded");
    assert_eq!(sent["action"], "add_fault_note");
    assert_eq!(sent["context"]["yacht_id"], YACHT);
    assert_eq!(sent["context"]["fault_id"], "f-1");
    assert_eq!(sent["payload"]["yacht_id"], YACHT);
    assert_eq!(sent["payload"]["fault_id"], "f-1");
    assert_eq!(sent["payload"]["user_id"], "u-42");
}

#[tokio::test]
async fn accepting_a_receiving_twice_reports_terminal_state() {
    let (url, _backend) = spawn_backend(Vec::new()).await;
    let dispatcher = dispatcher(&url);
    let chief = session(Role::ChiefEngineer);
    let request = || {
        ActionRequest::new()
            .confirmed()
            .with_signature(json!({"name": "R. Hale", "pin": "4411"}))
    };

    let first = dispatcher
        .execute(Some(&chief), ActionName::AcceptReceiving, Some("rcv-9"), request())
        .await
        .expect("first accept should succeed");
    assert_eq!(first.data["status"], "accepted");

    let err = dispatcher
        .execute(Some(&chief), ActionName::AcceptReceiving, Some("rcv-9"), request())
        .await
        .expect_err("second accept should be refused");
    match err {
        DispatchError::AlreadyInTerminalState(message) => assert!(message.contains("already")),
        other => panic!("expected AlreadyInTerminalState, got {other:?}"),
    }

    let records = dispatcher.audit_records();
    assert_eq!(records.len(), 2);
    assert!(records[0].success);
    assert_eq!(records[1].error_code.as_deref(), Some("already_in_terminal_state"));
    assert_eq!(records[1].input["signature"], "<provided>");
}

#[tokio::test]
async fn missing_signature_is_caught_before_sending() {
    let (url, backend) = spawn_backend(Vec::new()).await;
    let err = dispatcher(&url)
        .execute(
            Some(&session(Role::Engineer)),
            ActionName::CompleteWorkOrder,
            Some("wo-1"),
            ActionRequest::new().confirmed(),
        )
        .await
        .expect_err("signature is required");
    assert_eq!(
        err,
        DispatchError::SignatureRequired {
            action: "complete_work_order".to_string()
        }
    );
    assert!(err.is_recoverable());
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn incomplete_signature_is_refused_by_backend() {
    let (url, backend) = spawn_backend(Vec::new()).await;
    let err = dispatcher(&url)
        .execute(
            Some(&session(Role::ChiefOfficer)),
            ActionName::SignOutgoing,
            Some("ho-3"),
            ActionRequest::new().with_signature(json!({"name": "J. Moss"})),
        )
        .await
        .expect_err("backend wants a PIN");
    assert!(matches!(err, DispatchError::SignatureRequired { .. }));
    assert_eq!(backend.request_count(), 1);
}

#[tokio::test]
async fn reason_and_confirmation_are_enforced_locally() {
    let (url, backend) = spawn_backend(Vec::new()).await;
    let dispatcher = dispatcher(&url);
    let captain = session(Role::Captain);

    let err = dispatcher
        .execute(
            Some(&captain),
            ActionName::ReopenFault,
            Some("f-2"),
            ActionRequest::new().with_reason("   "),
        )
        .await
        .expect_err("blank reason");
    assert!(matches!(
        err,
        DispatchError::ValidationFailed { field: Some(ref field), .. } if field == "reason"
    ));

    let err = dispatcher
        .execute(Some(&captain), ActionName::CloseFault, Some("f-2"), ActionRequest::new())
        .await
        .expect_err("not confirmed");
    assert!(matches!(
        err,
        DispatchError::ValidationFailed { field: Some(ref field), .. } if field == "confirmed"
    ));

    let err = dispatcher
        .execute(Some(&captain), ActionName::CloseFault, None, ActionRequest::new().confirmed())
        .await
        .expect_err("no fault id");
    assert!(matches!(
        err,
        DispatchError::ValidationFailed { field: Some(ref field), .. } if field == "fault_id"
    ));

    assert_eq!(backend.request_count(), 0);
    assert_eq!(dispatcher.audit_records().len(), 3);
}

#[tokio::test]
async fn commit_without_prepare_succeeds() {
    let (url, backend) = spawn_backend(Vec::new()).await;
    let receipt = dispatcher(&url)
        .commit(
            Some(&session(Role::Engineer)),
            MutationEntity::WorkOrder,
            title("Replace pump seal"),
        )
        .await
        .expect("commit should succeed without a preview");
    assert_eq!(receipt.entity_id, "work_order-1");
    assert_eq!(receipt.entity_number.as_deref(), Some("WO-0001"));
    assert_eq!(backend.request_count(), 1);
}

#[tokio::test]
async fn commit_requires_a_title() {
    let (url, backend) = spawn_backend(Vec::new()).await;
    let err = dispatcher(&url)
        .commit(Some(&session(Role::Engineer)), MutationEntity::Fault, title("  "))
        .await
        .expect_err("empty title");
    assert_eq!(err, DispatchError::validation("title", "title is required."));
    assert_eq!(backend.request_count(), 0);
}

#[tokio::test]
async fn prepare_then_edit_then_commit() {
    let (url, _backend) = spawn_backend(Vec::new()).await;
    let dispatcher = dispatcher(&url);
    let engineer = session(Role::Engineer);

    let mut preview = dispatcher
        .prepare(
            Some(&engineer),
            MutationEntity::WorkOrder,
            PrepareRequest {
                query_text: Some("pump seal leaking".to_string()),
                ..PrepareRequest::default()
            },
        )
        .await
        .expect("prepare should succeed");
    assert_eq!(preview.fields["title"], "pump seal leaking");
    assert_eq!(preview.field_source("title"), Some(FieldSource::NlpEntity));
    assert_eq!(preview.field_source("equipment_id"), Some(FieldSource::Database));
    assert_eq!(preview.options["priority"].len(), 2);

    preview.set_field("title", "Replace aft pump seal");
    let receipt = dispatcher
        .commit(Some(&engineer), MutationEntity::WorkOrder, preview.fields.clone())
        .await
        .expect("commit should succeed");
    assert_eq!(receipt.entity_number.as_deref(), Some("WO-0001"));

    let actions: Vec<_> = dispatcher
        .audit_records()
        .into_iter()
        .map(|record| record.action)
        .collect();
    assert_eq!(actions, vec!["work_order.prepare", "work_order.commit"]);
}

#[tokio::test]
async fn prepare_without_a_preview_is_rejected() {
    let (url, _backend) = spawn_backend(Vec::new()).await;
    let dispatcher = dispatcher(&url);
    let err = dispatcher
        .prepare(
            Some(&session(Role::Engineer)),
            MutationEntity::WorkOrder,
            PrepareRequest {
                query_text: Some("garbled".to_string()),
                ..PrepareRequest::default()
            },
        )
        .await
        .expect_err("a reply without mutation_preview is malformed");
    assert_eq!(
        err,
        DispatchError::RemoteRejected {
            status: 200,
            message: "Malformed response: missing mutation_preview".to_string(),
        }
    );
    let audit = dispatcher.audit_records();
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].success);
}

#[tokio::test]
async fn slow_backend_times_out_as_network_failure() {
    let (url, _backend) = spawn_backend(Vec::new()).await;
    let config = DispatcherConfig::new(&url)
        .expect("url should parse")
        .with_timeout(Duration::from_millis(200));
    let dispatcher = Dispatcher::new(config).expect("client should build");

    let err = dispatcher
        .execute(
            Some(&session(Role::Engineer)),
            ActionName::ViewPartStock,
            Some("slow"),
            ActionRequest::new(),
        )
        .await
        .expect_err("request should time out");
    assert!(matches!(err, DispatchError::NetworkFailure(_)), "{err:?}");
}

#[tokio::test]
async fn unreachable_backend_is_network_failure() {
    let dispatcher = dispatcher("http://127.0.0.1:1");
    let err = dispatcher
        .execute(
            Some(&session(Role::Engineer)),
            ActionName::ViewPartStock,
            Some("p-1"),
            ActionRequest::new(),
        )
        .await
        .expect_err("nothing listens on port 1");
    assert!(matches!(err, DispatchError::NetworkFailure(_)));
    assert_eq!(dispatcher.audit_records().len(), 1);
}

#[tokio::test]
async fn recurrence_rpc_flags_generator_overheat() {
    let (url, _backend) = spawn_backend(generator_reports()).await;
    let dispatcher = dispatcher(&url);
    let query = |threshold_count| RecurrenceQuery {
        yacht_id: YACHT.to_string(),
        equipment_label: "Generator 1".to_string(),
        symptom_code: "OVERHEAT".to_string(),
        threshold_count,
        threshold_days: 60,
    };

    let result = dispatcher
        .check_recurrence(&session(Role::Engineer), &query(3))
        .await
        .expect("rpc should succeed");
    assert_eq!(result.occurrence_count, 3);
    assert_eq!(result.open_count, 2);
    assert_eq!(result.span_days, 20);
    assert!(result.is_recurrent);

    let result = dispatcher
        .check_recurrence(&session(Role::Engineer), &query(4))
        .await
        .expect("rpc should succeed");
    assert!(!result.is_recurrent);
}

#[tokio::test]
async fn health_reports_backend_status() {
    let (url, _backend) = spawn_backend(Vec::new()).await;
    let body = dispatcher(&url).health().await.expect("health should succeed");
    assert_eq!(body["status"], "ok");
}
