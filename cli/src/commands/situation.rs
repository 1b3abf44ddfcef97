//! Offline situation replay.
//!
//! Feeds a scripted event sequence through the reducer with no backend and
//! prints every step, so a policy can be tuned against a recorded session.

use bridgewatch_core::nudge::{self, Nudge};
use bridgewatch_core::situation::{
    self, DeviceType, SituationContext, SituationEffect, SituationEvent, SituationIdentity,
    SituationPolicy, SituationState,
};
use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::util::{GlobalArgs, parse_role, print_json, read_json_from_file};

#[derive(Subcommand)]
pub enum SituationCommands {
    /// Replay a JSON event script: [{"offset_secs": 0, "event": {"type": "opened", "data": {...}}}, ...]
    Replay {
        /// Script file (use '-' for stdin)
        file: String,
        /// Only print steps that changed state or produced effects
        #[arg(long)]
        changes_only: bool,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptStep {
    /// Seconds after the start of the replay
    #[serde(default)]
    pub offset_secs: i64,
    pub event: SituationEvent,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayStep {
    pub offset_secs: i64,
    pub event: &'static str,
    pub from: SituationState,
    pub to: SituationState,
    pub generation: u64,
    pub confidence_points: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nudge: Option<Nudge>,
}

impl ReplayStep {
    fn is_change(&self) -> bool {
        self.from != self.to || !self.effects.is_empty() || self.rejected.is_some()
    }
}

pub fn run(global: &GlobalArgs, command: SituationCommands) -> Result<(), Box<dyn std::error::Error>> {
    let SituationCommands::Replay { file, changes_only } = command;

    let steps: Vec<ScriptStep> = serde_json::from_value(read_json_from_file(&file)?)
        .map_err(|e| format!("Invalid replay script '{file}': {e}"))?;
    let role = parse_role(global.role.as_deref().unwrap_or("engineer"));
    let identity = SituationIdentity {
        yacht_id: global.yacht_id.clone().unwrap_or_else(|| "replay".to_string()),
        user_id: global.user_id.clone().unwrap_or_else(|| "replay".to_string()),
        role,
        device_type: DeviceType::Desktop,
        session_id: uuid::Uuid::now_v7().to_string(),
    };
    let policy = bridgewatch_runtime::policy_from_env();
    tracing::debug!(
        file = %file,
        steps = steps.len(),
        role = role.as_str(),
        "replaying situation script"
    );

    let (output, last) = replay(identity, &policy, Utc::now(), steps);
    let output: Vec<_> = output
        .into_iter()
        .filter(|step| !changes_only || step.is_change())
        .collect();
    print_json(&json!({
        "steps": output,
        "final": {
            "situation_id": last.situation_id,
            "state": last.state,
            "generation": last.generation,
            "confidence_points": last.confidence_points,
            "evidence": last.evidence,
            "nudge_budget_remaining": last.nudges.budget_remaining,
        }
    }))
}

/// Reduce every step in order. A rejected event keeps the prior context.
pub fn replay(
    identity: SituationIdentity,
    policy: &SituationPolicy,
    start: DateTime<Utc>,
    steps: Vec<ScriptStep>,
) -> (Vec<ReplayStep>, SituationContext) {
    let mut context = SituationContext::idle(identity, policy, start);
    let mut output = Vec::with_capacity(steps.len());

    for step in steps {
        let now = start + Duration::seconds(step.offset_secs);
        let name = step.event.name();
        let from = context.state;
        let (effects, rejected) = match situation::reduce(&context, step.event, policy, now) {
            Ok(reduced) => {
                context = reduced.context;
                (reduced.effects, None)
            }
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
        output.push(ReplayStep {
            offset_secs: step.offset_secs,
            event: name,
            from,
            to: context.state,
            generation: context.generation,
            confidence_points: context.confidence_points,
            rejected,
            effects: effects.iter().map(describe_effect).collect(),
            nudge: nudge::suggest(&context, context.identity.role, policy, now),
        });
    }

    (output, context)
}

fn describe_effect(effect: &SituationEffect) -> Value {
    match effect {
        SituationEffect::CheckRecurrence(query) => json!({
            "effect": "check_recurrence",
            "query": query,
        }),
        SituationEffect::Archive(record) => json!({
            "effect": "archive",
            "situation_id": record.situation_id,
            "final_state": record.final_state,
        }),
    }
}
