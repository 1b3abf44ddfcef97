use bridgewatch_runtime::util::{
    API_KEY_ENV, StoredCredentials, config_path, delete_credentials, load_credentials,
    resolve_token_from, save_credentials, token_preview,
};
use clap::Subcommand;
use serde_json::json;

use crate::util::print_json;

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store an access token for later commands
    Login {
        /// Bearer token issued by the operations API
        #[arg(long)]
        token: String,
    },
    /// Show which credential would be used
    Status,
    /// Remove stored credentials
    Logout,
}

pub fn run(api_url: &str, command: AuthCommands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        AuthCommands::Login { token } => login(api_url, &token),
        AuthCommands::Status => status(),
        AuthCommands::Logout => logout(),
    }
}

fn login(api_url: &str, token: &str) -> Result<(), Box<dyn std::error::Error>> {
    let token = token.trim();
    if token.is_empty() {
        return Err("--token must not be empty".into());
    }
    let creds = StoredCredentials {
        api_url: api_url.to_string(),
        access_token: token.to_string(),
        saved_at: chrono::Utc::now(),
    };
    save_credentials(&creds)?;

    print_json(&json!({
        "status": "authenticated",
        "api_url": creds.api_url,
        "config_path": config_path().to_string_lossy()
    }))
}

fn status() -> Result<(), Box<dyn std::error::Error>> {
    let stored = load_credentials();
    let saved_at = stored.as_ref().map(|creds| creds.saved_at);
    let output = match resolve_token_from(std::env::var(API_KEY_ENV).ok(), stored) {
        Some((source, token)) => json!({
            "status": "authenticated",
            "source": source.as_str(),
            "token": token_preview(&token),
            "saved_at": saved_at,
            "config_path": config_path().to_string_lossy()
        }),
        None => json!({
            "status": "unauthenticated",
            "config_path": config_path().to_string_lossy()
        }),
    };
    print_json(&output)
}

fn logout() -> Result<(), Box<dyn std::error::Error>> {
    let removed = delete_credentials()?;
    print_json(&json!({
        "status": "logged_out",
        "removed": removed,
        "config_path": config_path().to_string_lossy()
    }))
}
