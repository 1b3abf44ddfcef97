//! Environment-driven configuration.
//!
//! Every numeric knob is parsed from a raw `Option<String>` and clamped to a
//! fixed range; unparseable values fall back to the default. The `*_from_raw`
//! functions take the raw values directly so tests never touch the process
//! environment.

use std::time::Duration;

use bridgewatch_core::situation::SituationPolicy;
use url::Url;

use crate::error::ConfigError;

pub const API_URL_ENV: &str = "BRIDGEWATCH_API_URL";
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

pub const HTTP_TIMEOUT_MS_ENV: &str = "BRIDGEWATCH_HTTP_TIMEOUT_MS";
pub const HTTP_TIMEOUT_MS_DEFAULT: u64 = 15_000;
pub const HTTP_TIMEOUT_MS_MIN: u64 = 500;
pub const HTTP_TIMEOUT_MS_MAX: u64 = 120_000;

pub const ACTIVATION_THRESHOLD_ENV: &str = "BRIDGEWATCH_ACTIVATION_THRESHOLD";
pub const ACTIVATION_THRESHOLD_MIN: u32 = 1;
pub const ACTIVATION_THRESHOLD_MAX: u32 = 20;

pub const NUDGE_BUDGET_ENV: &str = "BRIDGEWATCH_NUDGE_BUDGET";
pub const NUDGE_BUDGET_MIN: u32 = 0;
pub const NUDGE_BUDGET_MAX: u32 = 10;

pub const NUDGE_COOLDOWN_SECS_ENV: &str = "BRIDGEWATCH_NUDGE_COOLDOWN_SECS";
pub const NUDGE_COOLDOWN_SECS_MIN: u32 = 0;
pub const NUDGE_COOLDOWN_SECS_MAX: u32 = 3_600;

pub const COOLDOWN_QUIESCENCE_SECS_ENV: &str = "BRIDGEWATCH_COOLDOWN_QUIESCENCE_SECS";
pub const COOLDOWN_QUIESCENCE_SECS_MIN: u32 = 10;
pub const COOLDOWN_QUIESCENCE_SECS_MAX: u32 = 7_200;

pub const CANDIDATE_TIMEOUT_SECS_ENV: &str = "BRIDGEWATCH_CANDIDATE_TIMEOUT_SECS";
pub const CANDIDATE_TIMEOUT_SECS_MIN: u32 = 30;
pub const CANDIDATE_TIMEOUT_SECS_MAX: u32 = 86_400;

/// Where and how the dispatcher talks to the backend.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub api_url: Url,
    /// Applied to every request; an expired call surfaces as `NetworkFailure`
    pub timeout: Duration,
}

impl DispatcherConfig {
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_api_url(api_url)?,
            timeout: Duration::from_millis(HTTP_TIMEOUT_MS_DEFAULT),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_raw(
            std::env::var(API_URL_ENV).ok(),
            std::env::var(HTTP_TIMEOUT_MS_ENV).ok(),
        )
    }

    pub fn from_raw(
        api_url_raw: Option<String>,
        timeout_ms_raw: Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_url = api_url_raw.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let timeout_ms = parse_env_u64_with_bounds(
            timeout_ms_raw,
            HTTP_TIMEOUT_MS_MIN,
            HTTP_TIMEOUT_MS_MAX,
            HTTP_TIMEOUT_MS_DEFAULT,
        );
        Ok(Self::new(&api_url)?.with_timeout(Duration::from_millis(timeout_ms)))
    }

    /// Absolute URL for an API path such as `/v1/actions/execute`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_url.as_str().trim_end_matches('/'))
    }
}

fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidApiUrl {
        url: raw.to_string(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::UnsupportedScheme(raw.to_string())),
    }
}

fn parse_env_u64_with_bounds(raw: Option<String>, min: u64, max: u64, default: u64) -> u64 {
    match raw.and_then(|value| value.trim().parse::<u64>().ok()) {
        Some(parsed) => parsed.clamp(min, max),
        None => default,
    }
}

fn parse_env_u32_with_bounds(raw: Option<String>, min: u32, max: u32, default: u32) -> u32 {
    match raw.and_then(|value| value.trim().parse::<u32>().ok()) {
        Some(parsed) => parsed.clamp(min, max),
        None => default,
    }
}

/// Raw values for the situation policy knobs, in env-var order.
#[derive(Debug, Clone, Default)]
pub struct PolicyOverrides {
    pub activation_threshold: Option<String>,
    pub nudge_budget: Option<String>,
    pub nudge_cooldown_secs: Option<String>,
    pub cooldown_quiescence_secs: Option<String>,
    pub candidate_timeout_secs: Option<String>,
}

impl PolicyOverrides {
    pub fn from_env() -> Self {
        Self {
            activation_threshold: std::env::var(ACTIVATION_THRESHOLD_ENV).ok(),
            nudge_budget: std::env::var(NUDGE_BUDGET_ENV).ok(),
            nudge_cooldown_secs: std::env::var(NUDGE_COOLDOWN_SECS_ENV).ok(),
            cooldown_quiescence_secs: std::env::var(COOLDOWN_QUIESCENCE_SECS_ENV).ok(),
            candidate_timeout_secs: std::env::var(CANDIDATE_TIMEOUT_SECS_ENV).ok(),
        }
    }
}

pub fn parse_policy_from_raw(raw: PolicyOverrides) -> SituationPolicy {
    let defaults = SituationPolicy::DEFAULT;
    let activation_threshold = parse_env_u32_with_bounds(
        raw.activation_threshold,
        ACTIVATION_THRESHOLD_MIN,
        ACTIVATION_THRESHOLD_MAX,
        defaults.activation_threshold,
    );
    let nudge_budget = parse_env_u32_with_bounds(
        raw.nudge_budget,
        NUDGE_BUDGET_MIN,
        NUDGE_BUDGET_MAX,
        defaults.nudge_budget,
    );
    let nudge_cooldown_secs = parse_env_u32_with_bounds(
        raw.nudge_cooldown_secs,
        NUDGE_COOLDOWN_SECS_MIN,
        NUDGE_COOLDOWN_SECS_MAX,
        defaults.nudge_cooldown_secs,
    );
    let cooldown_quiescence_secs = parse_env_u32_with_bounds(
        raw.cooldown_quiescence_secs,
        COOLDOWN_QUIESCENCE_SECS_MIN,
        COOLDOWN_QUIESCENCE_SECS_MAX,
        defaults.cooldown_quiescence_secs,
    );
    let candidate_timeout_secs = parse_env_u32_with_bounds(
        raw.candidate_timeout_secs,
        CANDIDATE_TIMEOUT_SECS_MIN,
        CANDIDATE_TIMEOUT_SECS_MAX,
        defaults.candidate_timeout_secs,
    );
    SituationPolicy {
        activation_threshold,
        nudge_budget,
        nudge_cooldown_secs,
        cooldown_quiescence_secs,
        candidate_timeout_secs,
        ..defaults
    }
}

pub fn policy_from_env() -> SituationPolicy {
    parse_policy_from_raw(PolicyOverrides::from_env())
}
