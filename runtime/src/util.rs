use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DispatcherConfig;
use crate::error::ConfigError;

pub const API_KEY_ENV: &str = "BRIDGEWATCH_API_KEY";

/// Stored credentials for the CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub api_url: String,
    pub access_token: String,
    pub saved_at: DateTime<Utc>,
}

/// Where a resolved token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Env,
    Stored,
}

impl TokenSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Env => "api_key (env)",
            Self::Stored => "access_token (stored)",
        }
    }
}

pub fn client(config: &DispatcherConfig) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

pub fn config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bridgewatch");
    config_dir.join("credentials.json")
}

pub fn load_credentials() -> Option<StoredCredentials> {
    load_credentials_from(&config_path())
}

pub fn load_credentials_from(path: &Path) -> Option<StoredCredentials> {
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

pub fn save_credentials(creds: &StoredCredentials) -> Result<(), Box<dyn std::error::Error>> {
    save_credentials_to(&config_path(), creds)
}

pub fn save_credentials_to(
    path: &Path,
    creds: &StoredCredentials,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let data = serde_json::to_string_pretty(creds)?;

    // Owner read/write only
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data.as_bytes())?;

    Ok(())
}

/// Returns whether a file was removed.
pub fn delete_credentials() -> std::io::Result<bool> {
    let path = config_path();
    if path.exists() {
        std::fs::remove_file(&path)?;
        return Ok(true);
    }
    Ok(false)
}

/// Resolve a Bearer token (priority order):
/// 1. BRIDGEWATCH_API_KEY env var
/// 2. stored credentials file
pub fn resolve_token() -> Result<(TokenSource, String), Box<dyn std::error::Error>> {
    resolve_token_from(std::env::var(API_KEY_ENV).ok(), load_credentials())
        .ok_or_else(|| "No credentials found. Run `bridgewatch auth login --token <TOKEN>` or set BRIDGEWATCH_API_KEY.".into())
}

pub fn resolve_token_from(
    env_value: Option<String>,
    stored: Option<StoredCredentials>,
) -> Option<(TokenSource, String)> {
    if let Some(key) = env_value.filter(|key| !key.trim().is_empty()) {
        return Some((TokenSource::Env, key));
    }
    stored
        .filter(|creds| !creds.access_token.is_empty())
        .map(|creds| (TokenSource::Stored, creds.access_token))
}

/// First characters of a token, for status output.
pub fn token_preview(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}...")
}

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

#[cfg(not(unix))]
trait OpenOptionsExt {
    fn mode(&mut self, _mode: u32) -> &mut Self;
}

#[cfg(not(unix))]
impl OpenOptionsExt for std::fs::OpenOptions {
    fn mode(&mut self, _mode: u32) -> &mut Self {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(token: &str) -> StoredCredentials {
        StoredCredentials {
            api_url: "http://localhost:3000".to_string(),
            access_token: token.to_string(),
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn env_key_wins_over_stored_credentials() {
        let resolved = resolve_token_from(Some("env-key".to_string()), Some(stored("file-key")));
        assert_eq!(resolved, Some((TokenSource::Env, "env-key".to_string())));
    }

    #[test]
    fn blank_env_key_falls_through_to_stored() {
        let resolved = resolve_token_from(Some("  ".to_string()), Some(stored("file-key")));
        assert_eq!(resolved, Some((TokenSource::Stored, "file-key".to_string())));
        assert_eq!(resolve_token_from(None, None), None);
    }

    #[test]
    fn credentials_round_trip_through_disk() {
        let path = std::env::temp_dir()
            .join(format!("bridgewatch-test-{}", uuid::Uuid::now_v7()))
            .join("credentials.json");
        let creds = stored("abc123");
        save_credentials_to(&path, &creds).unwrap();
        assert_eq!(load_credentials_from(&path), Some(creds));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn preview_truncates() {
        assert_eq!(token_preview("abcdefghijkl"), "abcdefgh...");
        assert_eq!(token_preview("abc"), "abc...");
    }
}
