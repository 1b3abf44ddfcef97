use bridgewatch_core::permissions::{Capabilities, offered_actions};
use bridgewatch_core::registry::{ActionDomain, ActionName};
use bridgewatch_runtime::ActionRequest;
use clap::Subcommand;
use serde_json::json;

use crate::util::{
    GlobalArgs, dispatcher, exit_dispatch_error, exit_error, parse_fields, parse_role, print_json,
    read_json_from_file, session,
};

#[derive(Subcommand)]
pub enum ActionsCommands {
    /// List the actions a role is offered (hidden actions are omitted)
    List {
        /// Restrict to one domain (fault, work_order, equipment, handover, inventory, receiving)
        #[arg(long)]
        domain: Option<String>,
        /// Include the per-domain capability flags
        #[arg(long)]
        capabilities: bool,
    },
    /// Show the registry entry for one action
    Describe {
        /// Action name, e.g. "acknowledge_fault"
        name: String,
    },
}

#[derive(Subcommand)]
pub enum ActionCommands {
    /// Execute a single-shot action
    Run {
        /// Action name, e.g. "close_fault"
        name: String,
        /// Target entity id (fault, work order, handover, part or receiving id)
        #[arg(long)]
        entity_id: Option<String>,
        /// Payload field as key=value (repeatable)
        #[arg(long = "field", short = 'F')]
        fields: Vec<String>,
        /// Read the payload object from a JSON file (use '-' for stdin)
        #[arg(long, short = 'f')]
        data_file: Option<String>,
        /// Confirm an action that requires confirmation
        #[arg(long)]
        confirm: bool,
        /// Reason, for actions that require one
        #[arg(long)]
        reason: Option<String>,
        /// Signature object as JSON, e.g. '{"name":"R. Hale","pin":"4411"}'
        #[arg(long)]
        signature: Option<String>,
    },
}

pub fn list(
    global: &GlobalArgs,
    domain: Option<&str>,
    capabilities: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let role = match &global.role {
        Some(raw) => parse_role(raw),
        None => exit_error(
            "role is required to list offered actions",
            Some("Set --role or BRIDGEWATCH_ROLE env var"),
        ),
    };
    let domain = domain.map(str::parse::<ActionDomain>).transpose()?;

    let offered = offered_actions(role, domain);
    let mut output = json!({
        "role": role,
        "actions": offered,
    });
    if capabilities {
        output["capabilities"] = serde_json::to_value(Capabilities::for_role(role))?;
    }
    print_json(&output)
}

pub fn describe(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let action: ActionName = name.parse()?;
    print_json(&action.descriptor())
}

pub async fn run(
    global: &GlobalArgs,
    command: ActionCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    let ActionCommands::Run {
        name,
        entity_id,
        fields,
        data_file,
        confirm,
        reason,
        signature,
    } = command;

    let action: ActionName = name.parse()?;
    let mut request = ActionRequest::new();
    if let Some(path) = data_file.as_deref() {
        match read_json_from_file(path)? {
            serde_json::Value::Object(payload) => request.payload = payload,
            _ => return Err(format!("'{path}' must contain a JSON object").into()),
        }
    }
    request.payload.extend(parse_fields(&fields)?);
    request.confirmed = confirm;
    request.reason = reason;
    if let Some(raw) = signature.as_deref() {
        let value = serde_json::from_str(raw).map_err(|e| format!("Invalid JSON in --signature: {e}"))?;
        request = request.with_signature(value);
    }

    let session = session(global);
    let success = dispatcher(&global.api_url)
        .execute(Some(&session), action, entity_id.as_deref(), request)
        .await
        .unwrap_or_else(|e| exit_dispatch_error(&e));
    print_json(&success)
}
