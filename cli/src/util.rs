use bridgewatch_core::roles::Role;
use bridgewatch_core::situation::DeviceType;
use bridgewatch_runtime::config::HTTP_TIMEOUT_MS_ENV;
use bridgewatch_runtime::util::resolve_token;
use bridgewatch_runtime::{DispatchError, Dispatcher, DispatcherConfig, SessionIdentity};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FORMAT_ENV: &str = "BRIDGEWATCH_LOG_FORMAT";

/// Global flags every network command needs.
pub struct GlobalArgs {
    pub api_url: String,
    pub yacht_id: Option<String>,
    pub user_id: Option<String>,
    pub role: Option<String>,
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| err.to_string())
    );
    std::process::exit(1);
}

/// Dispatch failures keep their machine code so scripts can branch on it.
pub fn exit_dispatch_error(e: &DispatchError) -> ! {
    let mut err = json!({
        "error": e.code(),
        "message": e.to_string(),
        "recoverable": e.is_recoverable()
    });
    if let DispatchError::ValidationFailed {
        field: Some(field), ..
    } = e
    {
        err["field"] = json!(field);
    }
    eprintln!(
        "{}",
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| err.to_string())
    );
    std::process::exit(1);
}

pub fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Logs go to stderr so stdout stays parseable.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bridgewatch=info,bridgewatch_runtime=info".into());
    let json_logs = std::env::var(LOG_FORMAT_ENV).is_ok_and(|format| format == "json");
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

pub fn parse_role(raw: &str) -> Role {
    raw.parse().unwrap_or_else(|e| {
        exit_error(
            &format!("{e}"),
            Some("Roles: crew, deckhand, steward, engineer, eto, chief_engineer, chief_officer, chief_steward, purser, captain, manager"),
        )
    })
}

pub fn dispatcher(api_url: &str) -> Dispatcher {
    let timeout_ms = std::env::var(HTTP_TIMEOUT_MS_ENV).ok();
    let config = DispatcherConfig::from_raw(Some(api_url.to_string()), timeout_ms)
        .unwrap_or_else(|e| exit_error(&e.to_string(), Some("Set --api-url or BRIDGEWATCH_API_URL")));
    Dispatcher::new(config).unwrap_or_else(|e| exit_error(&e.to_string(), None))
}

/// Build the caller identity from flags and stored credentials.
pub fn session(global: &GlobalArgs) -> SessionIdentity {
    let yacht_id = global.yacht_id.clone().unwrap_or_else(|| {
        exit_error(
            "yacht_id is required",
            Some("Set --yacht-id or BRIDGEWATCH_YACHT_ID env var"),
        )
    });
    let user_id = global.user_id.clone().unwrap_or_else(|| {
        exit_error(
            "user_id is required",
            Some("Set --user-id or BRIDGEWATCH_USER_ID env var"),
        )
    });
    let role = match &global.role {
        Some(raw) => parse_role(raw),
        None => exit_error(
            "role is required",
            Some("Set --role or BRIDGEWATCH_ROLE env var"),
        ),
    };
    let (_, access_token) = resolve_token().unwrap_or_else(|e| exit_error(&e.to_string(), None));

    SessionIdentity {
        yacht_id,
        user_id,
        role,
        access_token,
        session_id: uuid::Uuid::now_v7().to_string(),
        device_type: DeviceType::Desktop,
    }
}

pub fn read_json_from_file(path: &str) -> Result<serde_json::Value, String> {
    let raw = if path == "-" {
        std::io::read_to_string(std::io::stdin()).map_err(|e| format!("Failed to read stdin: {e}"))?
    } else {
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read file '{path}': {e}"))?
    };
    serde_json::from_str(&raw).map_err(|e| format!("Invalid JSON in '{path}': {e}"))
}

/// `--field key=value` pairs. Values that parse as JSON keep their type.
pub fn parse_fields(
    pairs: &[String],
) -> Result<serde_json::Map<String, serde_json::Value>, String> {
    let mut fields = serde_json::Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| format!("Invalid --field '{pair}', expected key=value"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Invalid --field '{pair}', key is empty"));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| json!(raw));
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}
