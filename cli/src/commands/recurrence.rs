use bridgewatch_core::recurrence::RecurrenceQuery;
use bridgewatch_runtime::policy_from_env;
use clap::Subcommand;
use serde_json::json;

use crate::util::{GlobalArgs, dispatcher, exit_dispatch_error, print_json, session};

#[derive(Subcommand)]
pub enum RecurrenceCommands {
    /// Ask the backend whether a symptom keeps coming back on a piece of equipment
    Check {
        /// Equipment label, matched on word boundaries (e.g. "Generator 1")
        #[arg(long)]
        equipment: String,
        /// Symptom code, e.g. "OVERHEAT"
        #[arg(long)]
        symptom: String,
        /// Occurrences needed to count as recurrent (defaults to policy)
        #[arg(long)]
        threshold_count: Option<u32>,
        /// Window in days (defaults to policy)
        #[arg(long)]
        threshold_days: Option<u32>,
    },
}

pub async fn run(
    global: &GlobalArgs,
    command: RecurrenceCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let RecurrenceCommands::Check {
        equipment,
        symptom,
        threshold_count,
        threshold_days,
    } = command;

    let session = session(global);
    let policy = policy_from_env();
    let query = RecurrenceQuery {
        yacht_id: session.yacht_id.clone(),
        equipment_label: equipment,
        symptom_code: symptom,
        threshold_count: threshold_count.unwrap_or(policy.recurrence_threshold_count),
        threshold_days: threshold_days.unwrap_or(policy.recurrence_threshold_days),
    };
    let result = dispatcher(&global.api_url)
        .check_recurrence(&session, &query)
        .await
        .unwrap_or_else(|e| exit_dispatch_error(&e));
    print_json(&json!({
        "query": query,
        "result": result,
    }))
}
