mod common;

use std::time::Duration;

use bridgewatch_core::nudge::NudgeType;
use bridgewatch_core::registry::ActionName;
use bridgewatch_core::roles::Role;
use bridgewatch_core::situation::{
    EntityType, SituationContext, SituationEvent, SituationKey, SituationPolicy, SituationState,
};
use bridgewatch_runtime::orchestrator::{LoopHandle, spawn};
use bridgewatch_runtime::{ActionRequest, DispatchError, MutationEntity};
use serde_json::{Map, json};

use common::{Backend, dispatcher, generator_reports, session, spawn_backend};

const TICK: Duration = Duration::from_secs(60);

fn generator() -> SituationKey {
    SituationKey::new(EntityType::Equipment, "eq-gen-1")
        .with_label("Generator 1")
        .with_symptom("OVERHEAT")
}

/// Poll the loop until `check` holds, for up to two seconds.
async fn wait_until(handle: &LoopHandle, check: impl Fn(&SituationContext) -> bool) -> bool {
    for _ in 0..100 {
        if check(&snapshot(handle).await) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

async fn wait_archived(backend: &Backend, count: usize) -> bool {
    for _ in 0..100 {
        if backend.archived_count() == count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

async fn snapshot(handle: &LoopHandle) -> SituationContext {
    handle.snapshot().await.expect("loop should be running")
}

/// Two repeated queries and an open push the generator situation to active.
async fn activate(handle: &LoopHandle) {
    for _ in 0..2 {
        handle
            .observe(SituationEvent::QueryRepeated(generator()))
            .await
            .expect("loop should accept events");
    }
    assert_eq!(snapshot(handle).await.state, SituationState::Candidate);
    handle
        .observe(SituationEvent::Opened(generator()))
        .await
        .expect("loop should accept events");
    assert_eq!(snapshot(handle).await.state, SituationState::Active);
}

#[tokio::test]
async fn recurrent_fault_surfaces_work_order_nudge_then_archives() {
    let (url, backend) = spawn_backend(generator_reports()).await;
    let handle = spawn(
        dispatcher(&url),
        session(Role::Engineer),
        SituationPolicy::DEFAULT,
        TICK,
    );

    activate(&handle).await;

    let observed = wait_until(&handle, |ctx| ctx.recurrence.is_some()).await;
    assert!(observed, "recurrence result should arrive");
    let ctx = snapshot(&handle).await;
    let recurrence = ctx.recurrence.expect("recurrence should be recorded");
    assert!(recurrence.is_recurrent);
    assert_eq!(recurrence.occurrence_count, 3);

    let nudge = handle
        .suggest()
        .await
        .expect("loop should be running")
        .expect("a nudge should be offered");
    assert_eq!(nudge.nudge_type, NudgeType::RecurrenceWorkOrder);
    assert_eq!(nudge.action, ActionName::CreateWorkOrderFromFault);

    let mut fields = Map::new();
    fields.insert("title".into(), json!("Generator 1 overheating again"));
    let receipt = handle
        .commit(MutationEntity::WorkOrder, fields)
        .await
        .expect("loop should be running")
        .expect("commit should succeed");
    assert_eq!(receipt.entity_number.as_deref(), Some("WO-0001"));

    let cooled = wait_until(&handle, |ctx| ctx.state == SituationState::Cooldown).await;
    assert!(cooled, "commit should move the situation to cooldown");

    handle
        .observe(SituationEvent::Closed)
        .await
        .expect("loop should accept events");
    assert_eq!(snapshot(&handle).await.state, SituationState::Resolved);

    let archived = wait_archived(&backend, 1).await;
    assert!(archived, "resolved situation should be archived");
    let record = backend.archived.lock().expect("lock should not be poisoned")[0].clone();
    assert_eq!(record["situation_id"], json!(ctx.situation_id));
}

#[tokio::test]
async fn failed_action_leaves_situation_active() {
    let (url, backend) = spawn_backend(Vec::new()).await;
    let handle = spawn(
        dispatcher(&url),
        session(Role::Captain),
        SituationPolicy::DEFAULT,
        TICK,
    );
    activate(&handle).await;
    let before = snapshot(&handle).await;

    let err = handle
        .execute(ActionName::CloseFault, Some("f-1".to_string()), ActionRequest::new())
        .await
        .expect("loop should be running")
        .expect_err("close without confirmation should fail");
    assert!(matches!(err, DispatchError::ValidationFailed { .. }));

    let after = snapshot(&handle).await;
    assert_eq!(after.state, SituationState::Active);
    assert_eq!(after.evidence, before.evidence);
    assert_eq!(after.generation, before.generation);
    assert_eq!(backend.archived_count(), 0);
}

#[tokio::test]
async fn viewing_history_is_recorded_as_evidence() {
    let (url, _backend) = spawn_backend(Vec::new()).await;
    let handle = spawn(
        dispatcher(&url),
        session(Role::Deckhand),
        SituationPolicy::DEFAULT,
        TICK,
    );
    activate(&handle).await;

    handle
        .execute(ActionName::ViewFaultHistory, Some("f-1".to_string()), ActionRequest::new())
        .await
        .expect("loop should be running")
        .expect("history should load");

    let recorded = wait_until(&handle, |ctx| ctx.evidence.viewed_history).await;
    assert!(recorded);
}

#[tokio::test]
async fn dropping_the_last_handle_archives_the_active_situation() {
    let (url, backend) = spawn_backend(Vec::new()).await;
    let handle = spawn(
        dispatcher(&url),
        session(Role::Engineer),
        SituationPolicy::DEFAULT,
        TICK,
    );
    activate(&handle).await;
    drop(handle);

    let archived = wait_archived(&backend, 1).await;
    assert!(archived, "session end should archive the open situation");
}

#[tokio::test]
async fn ending_the_session_returns_after_the_archive_is_posted() {
    let (url, backend) = spawn_backend(Vec::new()).await;
    let handle = spawn(
        dispatcher(&url),
        session(Role::Engineer),
        SituationPolicy::DEFAULT,
        TICK,
    );
    activate(&handle).await;
    let observer = handle.clone();
    let situation_id = snapshot(&handle).await.situation_id;

    handle.end_session().await.expect("loop should be running");
    assert_eq!(backend.archived_count(), 1);
    let record = backend.archived.lock().expect("lock should not be poisoned")[0].clone();
    assert_eq!(record["situation_id"], json!(situation_id));
    assert!(observer.snapshot().await.is_err(), "loop should have stopped");
}
