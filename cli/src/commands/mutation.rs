use bridgewatch_runtime::{MutationEntity, PrepareRequest};
use clap::Subcommand;
use serde_json::json;

use crate::util::{
    GlobalArgs, dispatcher, exit_dispatch_error, parse_fields, print_json, read_json_from_file,
    session,
};

/// Two-phase create, shared by `work-order` and `fault`.
#[derive(Subcommand)]
pub enum MutationCommands {
    /// Ask the backend for a prefilled draft
    Prepare {
        /// Free-text description, e.g. "gen 1 overheating again"
        #[arg(long)]
        query: Option<String>,
        /// Extracted entity as key=value (repeatable)
        #[arg(long = "entity", short = 'e')]
        entities: Vec<String>,
    },
    /// Create the record from final field values (no prepare needed)
    Commit {
        /// Field as key=value (repeatable)
        #[arg(long = "field", short = 'F')]
        fields: Vec<String>,
        /// Read fields from a JSON file, e.g. a saved prepare output (use '-' for stdin)
        #[arg(long, short = 'f')]
        data_file: Option<String>,
    },
}

pub async fn run(
    global: &GlobalArgs,
    entity: MutationEntity,
    command: MutationCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        MutationCommands::Prepare { query, entities } => {
            let request = PrepareRequest {
                query_text: query,
                extracted_entities: parse_fields(&entities)?,
            };
            let session = session(global);
            let preview = dispatcher(&global.api_url)
                .prepare(Some(&session), entity, request)
                .await
                .unwrap_or_else(|e| exit_dispatch_error(&e));
            print_json(&json!({
                "entity": entity,
                "preview": preview,
            }))
        }
        MutationCommands::Commit { fields, data_file } => {
            let mut values = match data_file.as_deref() {
                Some(path) => draft_fields(read_json_from_file(path)?)
                    .ok_or_else(|| format!("'{path}' must contain a JSON object"))?,
                None => serde_json::Map::new(),
            };
            values.extend(parse_fields(&fields)?);

            let session = session(global);
            let receipt = dispatcher(&global.api_url)
                .commit(Some(&session), entity, values)
                .await
                .unwrap_or_else(|e| exit_dispatch_error(&e));
            print_json(&receipt)
        }
    }
}

/// Accepts either a plain field object or the output of `prepare`.
fn draft_fields(value: serde_json::Value) -> Option<serde_json::Map<String, serde_json::Value>> {
    let serde_json::Value::Object(mut object) = value else {
        return None;
    };
    match object.remove("preview") {
        Some(serde_json::Value::Object(mut preview)) => match preview.remove("fields") {
            Some(serde_json::Value::Object(fields)) => Some(fields),
            _ => None,
        },
        Some(_) => None,
        None => Some(object),
    }
}
