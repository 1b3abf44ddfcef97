//! Nudge budget controller.
//!
//! One new decision at a time: each situation gets a fixed budget of
//! unsolicited suggestions, a minimum gap between them, and a memory of which
//! kinds the operator has already dismissed. The budget is never replenished
//! within a situation; a new situation (or session) starts a new budget.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::registry::ActionName;
use crate::roles::Role;
use crate::situation::{EntityType, SituationContext, SituationPolicy, SituationState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NudgeType {
    RecurrenceWorkOrder,
    ViewHistory,
    ShowManual,
    AddToHandover,
}

impl NudgeType {
    /// Priority order used by [`suggest`].
    pub const ALL: [NudgeType; 4] = [
        NudgeType::RecurrenceWorkOrder,
        NudgeType::ViewHistory,
        NudgeType::ShowManual,
        NudgeType::AddToHandover,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RecurrenceWorkOrder => "recurrence_work_order",
            Self::ViewHistory => "view_history",
            Self::ShowManual => "show_manual",
            Self::AddToHandover => "add_to_handover",
        }
    }

    /// Action the nudge offers.
    pub const fn action(self) -> ActionName {
        match self {
            Self::RecurrenceWorkOrder => ActionName::CreateWorkOrderFromFault,
            Self::ViewHistory => ActionName::ViewFaultHistory,
            Self::ShowManual => ActionName::ShowManualSection,
            Self::AddToHandover => ActionName::AddToHandover,
        }
    }

    fn is_relevant(self, context: &SituationContext) -> bool {
        let evidence = &context.evidence;
        let entity_type = context.key.as_ref().map(|key| key.entity_type);
        match self {
            Self::RecurrenceWorkOrder => {
                context.recurrence.is_some_and(|r| r.is_recurrent)
                    && !evidence.mutation_prepared
                    && !evidence.mutation_committed
            }
            Self::ViewHistory => {
                matches!(entity_type, Some(EntityType::Fault | EntityType::Equipment))
                    && !evidence.viewed_history
            }
            Self::ShowManual => {
                matches!(
                    entity_type,
                    Some(EntityType::Fault | EntityType::Equipment | EntityType::Document)
                ) && !evidence.opened_manual
            }
            Self::AddToHandover => {
                context.state == SituationState::Active
                    && evidence.mutation_prepared
                    && !evidence.handover_added
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NudgeState {
    pub last_shown_at: Option<DateTime<Utc>>,
    /// Dismissals last for the lifetime of the situation
    pub dismissed: BTreeMap<NudgeType, bool>,
    pub budget_remaining: u32,
}

impl NudgeState {
    pub fn with_budget(budget: u32) -> Self {
        Self {
            budget_remaining: budget,
            ..Self::default()
        }
    }

    pub fn is_dismissed(&self, nudge_type: NudgeType) -> bool {
        self.dismissed.get(&nudge_type).copied().unwrap_or(false)
    }
}

/// Whether a nudge of this type may be surfaced right now.
///
/// Only CANDIDATE and ACTIVE situations are eligible; COOLDOWN waits.
pub fn may_show_nudge(
    context: &SituationContext,
    nudge_type: NudgeType,
    policy: &SituationPolicy,
    now: DateTime<Utc>,
) -> bool {
    let nudges = &context.nudges;
    if nudges.budget_remaining == 0 {
        return false;
    }
    if !matches!(context.state, SituationState::Candidate | SituationState::Active) {
        return false;
    }
    if nudges.is_dismissed(nudge_type) {
        return false;
    }
    match nudges.last_shown_at {
        Some(last) => now - last >= policy.nudge_cooldown(),
        None => true,
    }
}

/// Spend one unit of budget. With no budget left this silently does nothing.
pub fn record_shown(
    mut context: SituationContext,
    _nudge_type: NudgeType,
    now: DateTime<Utc>,
) -> SituationContext {
    if context.nudges.budget_remaining > 0 {
        context.nudges.budget_remaining -= 1;
        context.nudges.last_shown_at = Some(now);
    }
    context
}

pub fn record_dismissed(mut context: SituationContext, nudge_type: NudgeType) -> SituationContext {
    context.nudges.dismissed.insert(nudge_type, true);
    context
}

/// A suggestion ready to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Nudge {
    pub nudge_type: NudgeType,
    pub action: ActionName,
    pub label: &'static str,
}

/// Pick the highest-priority nudge that is relevant, offered to `role`, and
/// allowed by the budget controller. Does not spend budget; the caller
/// reports [`crate::situation::SituationEvent::NudgeShown`] once it is
/// actually displayed.
pub fn suggest(
    context: &SituationContext,
    role: Role,
    policy: &SituationPolicy,
    now: DateTime<Utc>,
) -> Option<Nudge> {
    NudgeType::ALL
        .into_iter()
        .filter(|nudge_type| nudge_type.is_relevant(context))
        .filter(|nudge_type| nudge_type.action().descriptor().allows(role))
        .find(|nudge_type| may_show_nudge(context, *nudge_type, policy, now))
        .map(|nudge_type| {
            let descriptor = nudge_type.action().descriptor();
            Nudge {
                nudge_type,
                action: descriptor.name,
                label: descriptor.label,
            }
        })
}
