//! Orchestration loop.
//!
//! [`Orchestrator`] owns the current [`SituationContext`] and is the only
//! writer. [`spawn`] runs it on a tokio task fed by a channel; dispatcher
//! calls and recurrence checks run as separate tasks so the loop keeps
//! consuming events while they are in flight. Each of those tasks reports
//! back with the generation it was issued under, and results for a context
//! that has since been replaced are dropped.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use bridgewatch_core::evidence::{EvidenceSignal, signal_for_action};
use bridgewatch_core::nudge::{self, Nudge};
use bridgewatch_core::permissions;
use bridgewatch_core::registry::{ActionDescriptor, ActionDomain, ActionName};
use bridgewatch_core::situation::{
    self, SituationContext, SituationEffect, SituationEvent, SituationIdentity, SituationPolicy,
    SituationRecord,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};

use crate::dispatcher::{
    ActionRequest, ActionSuccess, CommitReceipt, Dispatcher, MutationEntity, MutationPreview,
    PrepareRequest, SessionIdentity,
};
use crate::error::DispatchError;

pub const DEFAULT_TICK: Duration = Duration::from_secs(15);
const COMMAND_BUFFER: usize = 64;

/// Single owner of the current situation.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    context: SituationContext,
    policy: SituationPolicy,
}

impl Orchestrator {
    pub fn new(identity: SituationIdentity, policy: SituationPolicy, now: DateTime<Utc>) -> Self {
        Self {
            context: SituationContext::idle(identity, &policy, now),
            policy,
        }
    }

    pub fn context(&self) -> &SituationContext {
        &self.context
    }

    pub fn policy(&self) -> &SituationPolicy {
        &self.policy
    }

    pub fn generation(&self) -> u64 {
        self.context.generation
    }

    /// Feed one event. A rejected event is logged and the prior context kept.
    pub fn apply(&mut self, event: SituationEvent, now: DateTime<Utc>) -> Vec<SituationEffect> {
        let name = event.name();
        let before = (self.context.generation, self.context.state);
        match situation::reduce(&self.context, event, &self.policy, now) {
            Ok(reduced) => {
                self.context = reduced.context;
                let after = (self.context.generation, self.context.state);
                if before != after {
                    tracing::info!(
                        event = name,
                        situation_id = %self.context.situation_id,
                        generation = self.context.generation,
                        from = before.1.as_str(),
                        to = self.context.state.as_str(),
                        confidence_points = self.context.confidence_points,
                        "situation transition"
                    );
                }
                reduced.effects
            }
            Err(e) => {
                tracing::warn!(
                    event = name,
                    generation = self.context.generation,
                    state = self.context.state.as_str(),
                    error = %e,
                    "situation event rejected"
                );
                Vec::new()
            }
        }
    }

    /// Apply a late result only if the context it was issued for is still
    /// current. Returns `None` when the result was stale and dropped.
    pub fn apply_if_current(
        &mut self,
        generation: u64,
        event: SituationEvent,
        now: DateTime<Utc>,
    ) -> Option<Vec<SituationEffect>> {
        if generation != self.context.generation {
            tracing::debug!(
                event = event.name(),
                issued_generation = generation,
                current_generation = self.context.generation,
                "dropping stale result"
            );
            return None;
        }
        Some(self.apply(event, now))
    }

    /// Next nudge to surface, if any. Spending budget is a separate
    /// `NudgeShown` event once it is actually displayed.
    pub fn suggest(&self, now: DateTime<Utc>) -> Option<Nudge> {
        nudge::suggest(&self.context, self.context.identity.role, &self.policy, now)
    }

    pub fn offered_actions(&self, domain: Option<ActionDomain>) -> Vec<ActionDescriptor> {
        permissions::offered_actions(self.context.identity.role, domain)
    }
}

enum Command {
    Observe(SituationEvent),
    Execute {
        action: ActionName,
        entity_id: Option<String>,
        request: ActionRequest,
        reply: oneshot::Sender<Result<ActionSuccess, DispatchError>>,
    },
    Prepare {
        entity: MutationEntity,
        request: PrepareRequest,
        reply: oneshot::Sender<Result<MutationPreview, DispatchError>>,
    },
    Commit {
        entity: MutationEntity,
        fields: Map<String, Value>,
        reply: oneshot::Sender<Result<CommitReceipt, DispatchError>>,
    },
    Suggest(oneshot::Sender<Option<Nudge>>),
    Snapshot(oneshot::Sender<SituationContext>),
    /// Stop the loop; answered once the session-end archive has been posted
    End(oneshot::Sender<()>),
}

/// Result of a spawned task, tagged with the generation that issued it.
struct Completion {
    generation: u64,
    event: SituationEvent,
}

/// The loop has shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("orchestration loop is not running")]
pub struct LoopClosed;

/// Cheap, cloneable front door to a running loop.
#[derive(Debug, Clone)]
pub struct LoopHandle {
    commands: mpsc::Sender<Command>,
}

impl LoopHandle {
    pub async fn observe(&self, event: SituationEvent) -> Result<(), LoopClosed> {
        self.commands
            .send(Command::Observe(event))
            .await
            .map_err(|_| LoopClosed)
    }

    pub async fn execute(
        &self,
        action: ActionName,
        entity_id: Option<String>,
        request: ActionRequest,
    ) -> Result<Result<ActionSuccess, DispatchError>, LoopClosed> {
        self.request(|reply| Command::Execute {
            action,
            entity_id,
            request,
            reply,
        })
        .await
    }

    pub async fn prepare(
        &self,
        entity: MutationEntity,
        request: PrepareRequest,
    ) -> Result<Result<MutationPreview, DispatchError>, LoopClosed> {
        self.request(|reply| Command::Prepare {
            entity,
            request,
            reply,
        })
        .await
    }

    pub async fn commit(
        &self,
        entity: MutationEntity,
        fields: Map<String, Value>,
    ) -> Result<Result<CommitReceipt, DispatchError>, LoopClosed> {
        self.request(|reply| Command::Commit {
            entity,
            fields,
            reply,
        })
        .await
    }

    pub async fn suggest(&self) -> Result<Option<Nudge>, LoopClosed> {
        self.request(Command::Suggest).await
    }

    pub async fn snapshot(&self) -> Result<SituationContext, LoopClosed> {
        self.request(Command::Snapshot).await
    }

    /// End the session now, even if other handles are still alive. Returns
    /// after the open situation, if any, has been archived.
    pub async fn end_session(self) -> Result<(), LoopClosed> {
        self.request(Command::End).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, LoopClosed> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(build(reply)).await.map_err(|_| LoopClosed)?;
        rx.await.map_err(|_| LoopClosed)
    }
}

struct SituationLoop {
    orchestrator: Orchestrator,
    dispatcher: Dispatcher,
    session: Arc<SessionIdentity>,
    completions: mpsc::UnboundedSender<Completion>,
}

/// Start the loop on the current tokio runtime. It stops once every
/// [`LoopHandle`] has been dropped, ending the session first.
pub fn spawn(
    dispatcher: Dispatcher,
    session: SessionIdentity,
    policy: SituationPolicy,
    tick_every: Duration,
) -> LoopHandle {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (completion_tx, completion_rx) = mpsc::unbounded_channel();
    let orchestrator = Orchestrator::new(session.situation_identity(), policy, Utc::now());
    let state = SituationLoop {
        orchestrator,
        dispatcher,
        session: Arc::new(session),
        completions: completion_tx,
    };
    tokio::spawn(state.run(command_rx, completion_rx, tick_every));
    LoopHandle {
        commands: command_tx,
    }
}

impl SituationLoop {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        tick_every: Duration,
    ) {
        let mut ticker = tokio::time::interval(tick_every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut ending = None;
        loop {
            tokio::select! {
                biased;
                Some(done) = completions.recv() => {
                    let now = Utc::now();
                    if let Some(effects) = self.orchestrator.apply_if_current(done.generation, done.event, now) {
                        self.run_effects(effects);
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        if let ControlFlow::Break(reply) = self.handle(command) {
                            ending = Some(reply);
                            break;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    let effects = self.orchestrator.apply(SituationEvent::Tick, Utc::now());
                    self.run_effects(effects);
                }
            }
        }

        // The session-end archive must land before the loop returns.
        let effects = self.orchestrator.apply(SituationEvent::SessionEnded, Utc::now());
        for effect in effects {
            if let SituationEffect::Archive(record) = effect {
                archive(&self.dispatcher, &self.session, &record).await;
            }
        }
        tracing::debug!(session_id = %self.session.session_id, "orchestration loop stopped");
        if let Some(reply) = ending {
            let _ = reply.send(());
        }
    }

    fn handle(&mut self, command: Command) -> ControlFlow<oneshot::Sender<()>> {
        let generation = self.orchestrator.generation();
        match command {
            Command::End(reply) => return ControlFlow::Break(reply),
            Command::Observe(event) => {
                let effects = self.orchestrator.apply(event, Utc::now());
                self.run_effects(effects);
            }
            Command::Suggest(reply) => {
                let _ = reply.send(self.orchestrator.suggest(Utc::now()));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.orchestrator.context().clone());
            }
            Command::Execute {
                action,
                entity_id,
                request,
                reply,
            } => {
                let dispatcher = self.dispatcher.clone();
                let session = Arc::clone(&self.session);
                let completions = self.completions.clone();
                tokio::spawn(async move {
                    let outcome = dispatcher
                        .execute(Some(&*session), action, entity_id.as_deref(), request)
                        .await;
                    if outcome.is_ok() {
                        report(&completions, generation, signal_for_action(action));
                    }
                    let _ = reply.send(outcome);
                });
            }
            Command::Prepare {
                entity,
                request,
                reply,
            } => {
                let dispatcher = self.dispatcher.clone();
                let session = Arc::clone(&self.session);
                let completions = self.completions.clone();
                tokio::spawn(async move {
                    let outcome = dispatcher.prepare(Some(&*session), entity, request).await;
                    if outcome.is_ok() {
                        report(&completions, generation, Some(EvidenceSignal::MutationPrepared));
                    }
                    let _ = reply.send(outcome);
                });
            }
            Command::Commit {
                entity,
                fields,
                reply,
            } => {
                let dispatcher = self.dispatcher.clone();
                let session = Arc::clone(&self.session);
                let completions = self.completions.clone();
                tokio::spawn(async move {
                    let outcome = dispatcher.commit(Some(&*session), entity, fields).await;
                    if outcome.is_ok() {
                        report(&completions, generation, Some(EvidenceSignal::MutationCommitted));
                    }
                    let _ = reply.send(outcome);
                });
            }
        }
        ControlFlow::Continue(())
    }

    fn run_effects(&self, effects: Vec<SituationEffect>) {
        let generation = self.orchestrator.generation();
        for effect in effects {
            let dispatcher = self.dispatcher.clone();
            let session = Arc::clone(&self.session);
            match effect {
                SituationEffect::CheckRecurrence(query) => {
                    let completions = self.completions.clone();
                    tokio::spawn(async move {
                        match dispatcher.check_recurrence(&session, &query).await {
                            Ok(result) => {
                                let _ = completions.send(Completion {
                                    generation,
                                    event: SituationEvent::RecurrenceObserved(result),
                                });
                            }
                            Err(e) => tracing::warn!(
                                equipment_label = %query.equipment_label,
                                symptom_code = %query.symptom_code,
                                error = %e,
                                "recurrence check failed"
                            ),
                        }
                    });
                }
                SituationEffect::Archive(record) => {
                    tokio::spawn(async move { archive(&dispatcher, &session, &record).await });
                }
            }
        }
    }
}

async fn archive(dispatcher: &Dispatcher, session: &SessionIdentity, record: &SituationRecord) {
    if let Err(e) = dispatcher.archive_situation(session, record).await {
        tracing::warn!(
            situation_id = %record.situation_id,
            error = %e,
            "situation archive failed"
        );
    }
}

/// Sent before the caller's reply so the evidence is queued first.
fn report(
    completions: &mpsc::UnboundedSender<Completion>,
    generation: u64,
    signal: Option<EvidenceSignal>,
) {
    if let Some(signal) = signal {
        let _ = completions.send(Completion {
            generation,
            event: SituationEvent::Evidence(signal),
        });
    }
}
