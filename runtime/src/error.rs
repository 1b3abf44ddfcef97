use bridgewatch_core::error::codes;

/// Failure of a dispatcher call.
///
/// Returned, never panicked. Every variant renders as a sentence that can be
/// shown to an operator as-is; [`DispatchError::code`] gives the stable
/// machine code recorded in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("You are not signed in. Sign in and try again.")]
    Unauthenticated,

    #[error("{message}")]
    ValidationFailed {
        field: Option<String>,
        message: String,
    },

    #[error("{message}")]
    RemoteRejected { status: u16, message: String },

    #[error("Could not reach the server: {0}")]
    NetworkFailure(String),

    #[error("{0}")]
    AlreadyInTerminalState(String),

    #[error("'{action}' needs a signature before it can be submitted.")]
    SignatureRequired { action: String },

    #[error("The {role} role is not permitted to perform '{action}'.")]
    PermissionDenied { action: String, role: String },
}

impl DispatchError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => codes::UNAUTHENTICATED,
            Self::ValidationFailed { .. } => codes::VALIDATION_FAILED,
            Self::RemoteRejected { .. } => "remote_rejected",
            Self::NetworkFailure(_) => "network_failure",
            Self::AlreadyInTerminalState(_) => codes::ALREADY_IN_TERMINAL_STATE,
            Self::SignatureRequired { .. } => codes::SIGNATURE_REQUIRED,
            Self::PermissionDenied { .. } => codes::PERMISSION_DENIED,
        }
    }

    /// The operator can fix this and retry the same action (sign, fill a
    /// field, wait for the network). Retries are never automatic.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed { .. } | Self::SignatureRequired { .. } | Self::NetworkFailure(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid API URL '{url}': {source}")]
    InvalidApiUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("API URL '{0}' must use http or https")]
    UnsupportedScheme(String),

    #[error("could not build HTTP client: {0}")]
    HttpClient(String),
}
