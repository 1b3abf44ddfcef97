//! Situation lifecycle: `IDLE → CANDIDATE → ACTIVE → COOLDOWN → RESOLVED`.
//!
//! A [`SituationContext`] is a plain value. [`reduce`] takes the current
//! context and one [`SituationEvent`] and returns the next context plus any
//! [`SituationEffect`]s the caller must carry out (recurrence checks, audit
//! archival). Invalid events are returned as [`SituationError`] and leave the
//! caller's context untouched.
//!
//! Invariants upheld here:
//! - states only move forward; the two ways back to IDLE (candidate dropped,
//!   session ended) always produce a new context with a bumped `generation`
//! - `confidence_points` only grows, and only while CANDIDATE or ACTIVE
//! - a different topic never mutates the current context; it supersedes it

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::evidence::{self, Evidence, EvidenceSignal};
use crate::nudge::{self, NudgeState, NudgeType};
use crate::recurrence::{RecurrenceQuery, RecurrenceResult};
use crate::roles::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SituationState {
    Idle,
    Candidate,
    Active,
    Cooldown,
    Resolved,
}

impl SituationState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Candidate => "candidate",
            Self::Active => "active",
            Self::Cooldown => "cooldown",
            Self::Resolved => "resolved",
        }
    }

    /// A situation exists and accepts evidence.
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Candidate | Self::Active | Self::Cooldown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Document,
    Equipment,
    Part,
    WorkOrder,
    Fault,
    Location,
    Person,
    Inventory,
    EmailThread,
}

impl EntityType {
    pub const fn default_domain(self) -> SituationDomain {
        match self {
            Self::Document => SituationDomain::Manuals,
            Self::Equipment | Self::WorkOrder | Self::Fault | Self::Location => {
                SituationDomain::Maintenance
            }
            Self::Part | Self::Inventory => SituationDomain::Inventory,
            Self::Person => SituationDomain::People,
            Self::EmailThread => SituationDomain::Email,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SituationDomain {
    Manuals,
    Maintenance,
    Inventory,
    /// Hours of rest
    Hor,
    Purchasing,
    People,
    Email,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    Desktop,
    Tablet,
    Mobile,
}

/// Derived from evidence; never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Investigating,
    Acting,
    WrappingUp,
}

/// Who the situation belongs to. Supplied by the session layer, read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SituationIdentity {
    pub yacht_id: String,
    pub user_id: String,
    pub role: Role,
    #[serde(default)]
    pub device_type: DeviceType,
    pub session_id: String,
}

/// What the situation is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SituationKey {
    pub entity_type: EntityType,
    pub entity_id: String,
    /// Display label, e.g. "Generator 1". Used for recurrence lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptom_code: Option<String>,
    pub domain: SituationDomain,
}

impl SituationKey {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            entity_label: None,
            symptom_code: None,
            domain: entity_type.default_domain(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.entity_label = Some(label.into());
        self
    }

    pub fn with_symptom(mut self, code: impl Into<String>) -> Self {
        self.symptom_code = Some(code.into());
        self
    }

    pub fn in_domain(mut self, domain: SituationDomain) -> Self {
        self.domain = domain;
        self
    }

    /// Same entity and same symptom. Labels and domain are descriptive only.
    pub fn same_topic(&self, other: &SituationKey) -> bool {
        let symptom_matches = match (&self.symptom_code, &other.symptom_code) {
            (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
            (None, None) => true,
            _ => false,
        };
        self.entity_type == other.entity_type && self.entity_id == other.entity_id && symptom_matches
    }
}

/// Points awarded per evidence signal when computing confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub entity_opened: u32,
    pub opened_manual: u32,
    pub viewed_history: u32,
    /// Awarded once `repeated_queries_count` reaches `repeated_query_min`
    pub repeated_queries: u32,
    pub mutation_prepared: u32,
    pub handover_added: u32,
    pub recurrence_detected: u32,
}

impl ConfidenceWeights {
    pub const DEFAULT: ConfidenceWeights = ConfidenceWeights {
        entity_opened: 2,
        opened_manual: 2,
        viewed_history: 1,
        repeated_queries: 2,
        mutation_prepared: 2,
        handover_added: 1,
        recurrence_detected: 3,
    };
}

/// Tunables for the state machine and the nudge budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SituationPolicy {
    pub weights: ConfidenceWeights,
    pub activation_threshold: u32,
    pub repeated_query_min: u32,
    pub nudge_budget: u32,
    pub nudge_cooldown_secs: u32,
    pub cooldown_quiescence_secs: u32,
    pub candidate_timeout_secs: u32,
    pub recurrence_threshold_count: u32,
    pub recurrence_threshold_days: u32,
}

impl SituationPolicy {
    pub const DEFAULT: SituationPolicy = SituationPolicy {
        weights: ConfidenceWeights::DEFAULT,
        activation_threshold: 3,
        repeated_query_min: 2,
        nudge_budget: 3,
        nudge_cooldown_secs: 120,
        cooldown_quiescence_secs: 300,
        candidate_timeout_secs: 600,
        recurrence_threshold_count: 3,
        recurrence_threshold_days: 60,
    };

    /// Deterministic score of everything observed so far.
    pub fn score(&self, context: &SituationContext) -> u32 {
        let w = &self.weights;
        let e = &context.evidence;
        let recurrent = context.recurrence.is_some_and(|r| r.is_recurrent);
        [
            (context.entity_opened, w.entity_opened),
            (e.opened_manual, w.opened_manual),
            (e.viewed_history, w.viewed_history),
            (e.repeated_queries_count >= self.repeated_query_min, w.repeated_queries),
            (e.mutation_prepared, w.mutation_prepared),
            (e.handover_added, w.handover_added),
            (recurrent, w.recurrence_detected),
        ]
        .into_iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, points)| points)
        .sum()
    }

    pub fn nudge_cooldown(&self) -> Duration {
        Duration::seconds(i64::from(self.nudge_cooldown_secs))
    }

    pub fn cooldown_quiescence(&self) -> Duration {
        Duration::seconds(i64::from(self.cooldown_quiescence_secs))
    }

    pub fn candidate_timeout(&self) -> Duration {
        Duration::seconds(i64::from(self.candidate_timeout_secs))
    }
}

impl Default for SituationPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The unit of orchestration state for one user session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SituationContext {
    pub situation_id: Uuid,
    /// Bumped every time the context is replaced. Async results carry the
    /// generation they were issued under and are dropped if it has moved on.
    pub generation: u64,
    pub identity: SituationIdentity,
    /// `None` while IDLE
    pub key: Option<SituationKey>,
    pub state: SituationState,
    pub confidence_points: u32,
    pub entity_opened: bool,
    pub recurrence: Option<RecurrenceResult>,
    pub recurrence_checked: bool,
    pub evidence: Evidence,
    pub nudges: NudgeState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl SituationContext {
    pub fn idle(identity: SituationIdentity, policy: &SituationPolicy, now: DateTime<Utc>) -> Self {
        Self {
            situation_id: Uuid::now_v7(),
            generation: 0,
            identity,
            key: None,
            state: SituationState::Idle,
            confidence_points: 0,
            entity_opened: false,
            recurrence: None,
            recurrence_checked: false,
            evidence: Evidence::default(),
            nudges: NudgeState::with_budget(policy.nudge_budget),
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.evidence.mutation_committed || self.evidence.handover_added {
            Phase::WrappingUp
        } else if self.evidence.mutation_prepared {
            Phase::Acting
        } else {
            Phase::Investigating
        }
    }

    /// Fresh context for the same identity. Evidence, confidence and nudge
    /// budget start over.
    fn successor(
        &self,
        key: Option<SituationKey>,
        state: SituationState,
        policy: &SituationPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        let mut next = Self::idle(self.identity.clone(), policy, now);
        next.generation = self.generation + 1;
        next.key = key;
        next.state = state;
        next
    }

    fn enter(&mut self, state: SituationState, now: DateTime<Utc>) {
        self.state = state;
        self.last_activity_at = now;
    }

    fn recurrence_query(&self, policy: &SituationPolicy) -> Option<RecurrenceQuery> {
        let key = self.key.as_ref()?;
        let symptom_code = key.symptom_code.clone()?;
        Some(RecurrenceQuery {
            yacht_id: self.identity.yacht_id.clone(),
            equipment_label: key
                .entity_label
                .clone()
                .unwrap_or_else(|| key.entity_id.clone()),
            symptom_code,
            threshold_count: policy.recurrence_threshold_count,
            threshold_days: policy.recurrence_threshold_days,
        })
    }

    fn is_on_topic(&self, key: &SituationKey) -> bool {
        self.state.is_live() && self.key.as_ref().is_some_and(|current| current.same_topic(key))
    }
}

/// Immutable audit copy of a situation, produced when it resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SituationRecord {
    pub situation_id: Uuid,
    pub identity: SituationIdentity,
    pub key: SituationKey,
    pub final_state: SituationState,
    pub phase: Phase,
    pub confidence_points: u32,
    pub evidence: Evidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceResult>,
    pub nudge_budget_remaining: u32,
    pub created_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl SituationRecord {
    fn resolved(context: &SituationContext, now: DateTime<Utc>) -> Option<Self> {
        Some(Self {
            situation_id: context.situation_id,
            identity: context.identity.clone(),
            key: context.key.clone()?,
            final_state: SituationState::Resolved,
            phase: context.phase(),
            confidence_points: context.confidence_points,
            evidence: context.evidence.clone(),
            recurrence: context.recurrence,
            nudge_budget_remaining: context.nudges.budget_remaining,
            created_at: context.created_at,
            closed_at: now,
        })
    }
}

/// Observations fed into the state machine, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SituationEvent {
    /// Entity selected in search results or previewed, not opened
    Previewed(SituationKey),
    Opened(SituationKey),
    /// A search query resolved to this topic
    QueryRepeated(SituationKey),
    /// Any signal but `RepeatedQuery`, which must arrive as `QueryRepeated`
    Evidence(EvidenceSignal),
    RecurrenceObserved(RecurrenceResult),
    NudgeShown(NudgeType),
    NudgeDismissed(NudgeType),
    Closed,
    /// Clock tick; drives CANDIDATE timeout and COOLDOWN quiescence
    Tick,
    SessionEnded,
}

impl SituationEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Previewed(_) => "previewed",
            Self::Opened(_) => "opened",
            Self::QueryRepeated(_) => "query_repeated",
            Self::Evidence(_) => "evidence",
            Self::RecurrenceObserved(_) => "recurrence_observed",
            Self::NudgeShown(_) => "nudge_shown",
            Self::NudgeDismissed(_) => "nudge_dismissed",
            Self::Closed => "closed",
            Self::Tick => "tick",
            Self::SessionEnded => "session_ended",
        }
    }
}

/// Work the caller must perform after a reduction.
#[derive(Debug, Clone, PartialEq)]
pub enum SituationEffect {
    CheckRecurrence(RecurrenceQuery),
    Archive(SituationRecord),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reduced {
    pub context: SituationContext,
    pub effects: Vec<SituationEffect>,
}

impl Reduced {
    fn unchanged(context: SituationContext) -> Self {
        Self {
            context,
            effects: Vec::new(),
        }
    }

    fn with_effects(mut self, mut leading: Vec<SituationEffect>) -> Self {
        leading.append(&mut self.effects);
        self.effects = leading;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SituationError {
    #[error("no situation is open; '{event}' ignored")]
    NoSituation { event: &'static str },
    #[error("situation {situation_id} is already resolved; '{event}' ignored")]
    AlreadyResolved {
        situation_id: Uuid,
        event: &'static str,
    },
    #[error("'{event}' is not allowed while {}", .state.as_str())]
    InvalidTransition {
        state: SituationState,
        event: &'static str,
    },
    #[error("repeated queries must name their topic; send 'query_repeated'")]
    TopicRequired,
}

fn require_live(context: &SituationContext, event: &'static str) -> Result<(), SituationError> {
    match context.state {
        SituationState::Idle => Err(SituationError::NoSituation { event }),
        SituationState::Resolved => Err(SituationError::AlreadyResolved {
            situation_id: context.situation_id,
            event,
        }),
        _ => Ok(()),
    }
}

/// Apply one event. On `Err` the caller keeps its current context.
pub fn reduce(
    context: &SituationContext,
    event: SituationEvent,
    policy: &SituationPolicy,
    now: DateTime<Utc>,
) -> Result<Reduced, SituationError> {
    let name = event.name();
    match event {
        SituationEvent::Previewed(key) => Ok(preview(context, key, policy, now)),
        SituationEvent::Opened(key) => Ok(open(context, key, policy, now)),
        SituationEvent::QueryRepeated(key) => Ok(query(context, key, policy, now)),
        SituationEvent::Evidence(EvidenceSignal::RepeatedQuery) => Err(SituationError::TopicRequired),
        SituationEvent::Evidence(signal) => {
            require_live(context, name)?;
            Ok(evidence::record(context.clone(), signal, policy, now))
        }
        SituationEvent::RecurrenceObserved(result) => {
            require_live(context, name)?;
            let mut next = context.clone();
            next.recurrence = Some(result);
            Ok(recompute(next, policy, now))
        }
        SituationEvent::NudgeShown(nudge_type) => {
            require_live(context, name)?;
            if context.state == SituationState::Cooldown {
                return Err(SituationError::InvalidTransition {
                    state: context.state,
                    event: name,
                });
            }
            Ok(Reduced::unchanged(nudge::record_shown(
                context.clone(),
                nudge_type,
                now,
            )))
        }
        SituationEvent::NudgeDismissed(nudge_type) => {
            require_live(context, name)?;
            Ok(Reduced::unchanged(nudge::record_dismissed(
                context.clone(),
                nudge_type,
            )))
        }
        SituationEvent::Closed => Ok(close(context, policy, now)),
        SituationEvent::Tick => Ok(tick(context, policy, now)),
        SituationEvent::SessionEnded => Ok(end_session(context, policy, now)),
    }
}

/// Re-derive confidence and advance state from the evidence already present.
///
/// Called after every evidence write.
pub fn recompute(mut context: SituationContext, policy: &SituationPolicy, now: DateTime<Utc>) -> Reduced {
    let mut effects = Vec::new();

    if matches!(context.state, SituationState::Candidate | SituationState::Active) {
        let score = policy.score(&context);
        context.confidence_points = context.confidence_points.max(score);
    }

    if context.state == SituationState::Candidate
        && context.entity_opened
        && context.confidence_points >= policy.activation_threshold
    {
        context.enter(SituationState::Active, now);
        if !context.recurrence_checked {
            context.recurrence_checked = true;
            if let Some(query) = context.recurrence_query(policy) {
                effects.push(SituationEffect::CheckRecurrence(query));
            }
        }
    }

    if context.state == SituationState::Active && context.evidence.mutation_committed {
        context.enter(SituationState::Cooldown, now);
    }

    Reduced { context, effects }
}

/// Replace the current context with a new CANDIDATE for `key`, archiving the
/// old one if it had reached ACTIVE.
fn supersede(
    context: &SituationContext,
    key: SituationKey,
    policy: &SituationPolicy,
    now: DateTime<Utc>,
) -> Reduced {
    let mut effects = Vec::new();
    if matches!(context.state, SituationState::Active | SituationState::Cooldown) {
        if let Some(record) = SituationRecord::resolved(context, now) {
            effects.push(SituationEffect::Archive(record));
        }
    }
    let next = context.successor(Some(key), SituationState::Candidate, policy, now);
    recompute(next, policy, now).with_effects(effects)
}

fn touch(context: &SituationContext, key: SituationKey, now: DateTime<Utc>) -> SituationContext {
    let mut next = context.clone();
    next.last_activity_at = now;
    if let Some(current) = next.key.as_mut() {
        if current.entity_label.is_none() {
            current.entity_label = key.entity_label;
        }
    }
    next
}

fn preview(
    context: &SituationContext,
    key: SituationKey,
    policy: &SituationPolicy,
    now: DateTime<Utc>,
) -> Reduced {
    if context.is_on_topic(&key) {
        return Reduced::unchanged(touch(context, key, now));
    }
    supersede(context, key, policy, now)
}

fn open(
    context: &SituationContext,
    key: SituationKey,
    policy: &SituationPolicy,
    now: DateTime<Utc>,
) -> Reduced {
    let base = if context.is_on_topic(&key) {
        Reduced::unchanged(touch(context, key, now))
    } else {
        supersede(context, key, policy, now)
    };
    let mut next = base.context;
    next.entity_opened = true;
    next.last_activity_at = now;
    recompute(next, policy, now).with_effects(base.effects)
}

fn query(
    context: &SituationContext,
    key: SituationKey,
    policy: &SituationPolicy,
    now: DateTime<Utc>,
) -> Reduced {
    let base = if context.is_on_topic(&key) {
        Reduced::unchanged(context.clone())
    } else {
        supersede(context, key, policy, now)
    };
    evidence::record(base.context, EvidenceSignal::RepeatedQuery, policy, now).with_effects(base.effects)
}

fn resolve(context: &SituationContext, now: DateTime<Utc>) -> Reduced {
    let mut next = context.clone();
    next.enter(SituationState::Resolved, now);
    let effects = SituationRecord::resolved(&next, now)
        .map(SituationEffect::Archive)
        .into_iter()
        .collect();
    Reduced {
        context: next,
        effects,
    }
}

fn close(context: &SituationContext, policy: &SituationPolicy, now: DateTime<Utc>) -> Reduced {
    match context.state {
        SituationState::Candidate => {
            Reduced::unchanged(context.successor(None, SituationState::Idle, policy, now))
        }
        SituationState::Active | SituationState::Cooldown => resolve(context, now),
        SituationState::Idle | SituationState::Resolved => Reduced::unchanged(context.clone()),
    }
}

fn tick(context: &SituationContext, policy: &SituationPolicy, now: DateTime<Utc>) -> Reduced {
    let quiet_for = now - context.last_activity_at;
    match context.state {
        SituationState::Candidate if quiet_for >= policy.candidate_timeout() => {
            Reduced::unchanged(context.successor(None, SituationState::Idle, policy, now))
        }
        SituationState::Cooldown if quiet_for >= policy.cooldown_quiescence() => {
            resolve(context, now)
        }
        _ => Reduced::unchanged(context.clone()),
    }
}

fn end_session(context: &SituationContext, policy: &SituationPolicy, now: DateTime<Utc>) -> Reduced {
    let effects = if matches!(context.state, SituationState::Active | SituationState::Cooldown) {
        resolve(context, now).effects
    } else {
        Vec::new()
    };
    Reduced {
        context: context.successor(None, SituationState::Idle, policy, now),
        effects,
    }
}
