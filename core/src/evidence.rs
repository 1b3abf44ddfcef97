//! Evidence tracker: behavioural signals accumulated per situation.
//!
//! Pure mutator plus trigger. [`record`] sets one flag (or bumps the query
//! counter) and hands the context to [`situation::recompute`]; it holds no
//! state-machine logic of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::registry::{ActionName, SideEffect};
use crate::situation::{self, Reduced, SituationContext, SituationPolicy};

/// Flags only ever go from `false` to `true` within one situation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Evidence {
    pub opened_manual: bool,
    pub viewed_history: bool,
    pub mutation_prepared: bool,
    pub mutation_committed: bool,
    pub handover_added: bool,
    pub repeated_queries_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceSignal {
    OpenedManual,
    ViewedHistory,
    MutationPrepared,
    MutationCommitted,
    HandoverAdded,
    RepeatedQuery,
}

impl Evidence {
    /// Returns whether anything changed. Setting a flag that is already set
    /// is a no-op.
    pub fn apply(&mut self, signal: EvidenceSignal) -> bool {
        let flag = match signal {
            EvidenceSignal::OpenedManual => &mut self.opened_manual,
            EvidenceSignal::ViewedHistory => &mut self.viewed_history,
            EvidenceSignal::MutationPrepared => &mut self.mutation_prepared,
            EvidenceSignal::MutationCommitted => &mut self.mutation_committed,
            EvidenceSignal::HandoverAdded => &mut self.handover_added,
            EvidenceSignal::RepeatedQuery => {
                self.repeated_queries_count = self.repeated_queries_count.saturating_add(1);
                return true;
            }
        };
        let changed = !*flag;
        *flag = true;
        changed
    }

    /// Every flag set in `earlier` is still set here, and the counter has not
    /// gone down.
    pub fn covers(&self, earlier: &Evidence) -> bool {
        (!earlier.opened_manual || self.opened_manual)
            && (!earlier.viewed_history || self.viewed_history)
            && (!earlier.mutation_prepared || self.mutation_prepared)
            && (!earlier.mutation_committed || self.mutation_committed)
            && (!earlier.handover_added || self.handover_added)
            && self.repeated_queries_count >= earlier.repeated_queries_count
    }
}

/// Write one signal into the context, then let the state machine react.
pub fn record(
    mut context: SituationContext,
    signal: EvidenceSignal,
    policy: &SituationPolicy,
    now: DateTime<Utc>,
) -> Reduced {
    context.evidence.apply(signal);
    context.last_activity_at = now;
    situation::recompute(context, policy, now)
}

/// Signal implied by a successful action, if any.
pub fn signal_for_action(action: ActionName) -> Option<EvidenceSignal> {
    match action {
        ActionName::ShowManualSection => Some(EvidenceSignal::OpenedManual),
        ActionName::ViewFaultHistory => Some(EvidenceSignal::ViewedHistory),
        ActionName::AddToHandover => Some(EvidenceSignal::HandoverAdded),
        other if other.descriptor().side_effect == SideEffect::MutationHeavy => {
            Some(EvidenceSignal::MutationCommitted)
        }
        _ => None,
    }
}
