//! Error taxonomy for the lightbulb client.
//!
//! DESIGN
//! ======
//! One `thiserror` enum per layer: `ConfigError` (environment),
//! `BackendError` (PostgREST and HTTP transport), `SubscriptionError`
//! (realtime channel), and `SyncError` (what the synchronizer reports to the
//! presentation shell). Every variant carries a grepable code through
//! [`ErrorCode`] so log lines and rendered views can be matched up.
//!
//! ERROR HANDLING
//! ==============
//! Configuration and initial-load failures are fatal to the view.
//! Subscription and write failures are not: the synchronizer demotes to
//! polling or reverts the optimistic flip and keeps running.

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Fallback text for failures that carry nothing human-readable.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

/// Fallback text for backend errors with an empty message.
pub const GENERIC_DATABASE_MESSAGE: &str = "Database error occurred";

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Missing or unusable backend credentials.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// None of the accepted environment variables is set.
    #[error("missing configuration: set {var}")]
    Missing { var: &'static str },

    /// The variable still holds the value shipped in the example env file.
    #[error("{var} is still set to its placeholder value")]
    Placeholder { var: &'static str },

    /// The backend URL is not an http(s) URL.
    #[error("invalid backend URL: {0}")]
    InvalidUrl(String),

    /// The key contains characters that cannot be sent in an HTTP header.
    #[error("{var} contains whitespace or non-ASCII characters")]
    InvalidKey { var: &'static str },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing { .. } => "E_CONFIG_MISSING",
            Self::Placeholder { .. } => "E_CONFIG_PLACEHOLDER",
            Self::InvalidUrl(_) => "E_CONFIG_INVALID_URL",
            Self::InvalidKey { .. } => "E_CONFIG_INVALID_KEY",
        }
    }
}

// =============================================================================
// BACKEND
// =============================================================================

/// Errors produced by row reads and writes against the hosted database.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// PostgREST answered with a structured error body.
    #[error("{message}")]
    Postgrest {
        status: u16,
        code: String,
        message: String,
        details: Option<String>,
        hint: Option<String>,
    },

    /// Non-success response whose body is not a PostgREST error.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(String),

    /// The response body could not be decoded into a row.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl BackendError {
    /// PostgREST error code, when the backend supplied one.
    #[must_use]
    pub fn backend_code(&self) -> Option<&str> {
        match self {
            Self::Postgrest { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }
}

impl ErrorCode for BackendError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Postgrest { .. } => "E_BACKEND",
            Self::Http { .. } => "E_HTTP_STATUS",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Decode(_) => "E_DECODE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Http { status: 429 | 500..=599, .. }
                | Self::Postgrest { status: 429 | 500..=599, .. }
        )
    }
}

/// Map a backend error to the text shown to the user.
///
/// Known PostgREST / Postgres codes get a fixed explanation; unknown codes
/// fall back to the backend's own message; non-backend failures use their
/// display text.
#[must_use]
pub fn describe_backend_error(err: &BackendError) -> String {
    match err {
        BackendError::Postgrest { code, message, .. } => match code.as_str() {
            "42P01" => "Table does not exist. Please check your Supabase setup.".to_owned(),
            "42501" => "Insufficient permissions. Please check your RLS policies.".to_owned(),
            "23505" => "Duplicate entry. This record already exists.".to_owned(),
            "PGRST116" => "Resource not found or insufficient permissions.".to_owned(),
            _ if message.trim().is_empty() => GENERIC_DATABASE_MESSAGE.to_owned(),
            _ => message.clone(),
        },
        BackendError::Http { body, .. } if body.trim().is_empty() => UNKNOWN_ERROR_MESSAGE.to_owned(),
        other => other.to_string(),
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Failures of the realtime push channel. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionError {
    /// The websocket handshake failed.
    #[error("websocket connect failed: {0}")]
    Connect(String),

    /// The server rejected the join or reported a channel error.
    #[error("channel error: {0}")]
    ChannelError(String),

    /// No reply to a join or heartbeat arrived in time.
    #[error("timed out waiting for realtime reply")]
    TimedOut,

    /// The socket or channel was closed.
    #[error("channel closed: {0}")]
    Closed(String),
}

impl ErrorCode for SubscriptionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Connect(_) => "E_REALTIME_CONNECT",
            Self::ChannelError(_) => "E_REALTIME_CHANNEL",
            Self::TimedOut => "E_REALTIME_TIMEOUT",
            Self::Closed(_) => "E_REALTIME_CLOSED",
        }
    }

    fn retryable(&self) -> bool {
        !matches!(self, Self::ChannelError(_))
    }
}

// =============================================================================
// SYNCHRONIZER
// =============================================================================

/// Errors surfaced by the state synchronizer.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Credentials are missing or still placeholders. Fatal, shown at start.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// The initial read failed. Fatal to the view; the user must restart.
    #[error("could not load the lightbulb state: {0}")]
    Connection(#[source] BackendError),

    /// The push channel failed. The synchronizer falls back to polling.
    #[error("realtime subscription failed: {0}")]
    Subscription(#[from] SubscriptionError),

    /// The conditional write failed. Local state was reverted.
    #[error("error toggling lightbulb: {0}")]
    Write(#[source] BackendError),

    /// A toggle was requested while a previous write was still in flight.
    #[error("a toggle is already in progress")]
    Busy,

    /// The synchronizer task has ended.
    #[error("synchronizer stopped")]
    Stopped,
}

impl ErrorCode for SyncError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "E_CONFIGURATION",
            Self::Connection(_) => "E_CONNECTION",
            Self::Subscription(_) => "E_SUBSCRIPTION",
            Self::Write(_) => "E_WRITE",
            Self::Busy => "E_BUSY",
            Self::Stopped => "E_STOPPED",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Write(e) | Self::Connection(e) => e.retryable(),
            Self::Subscription(e) => e.retryable(),
            Self::Busy => true,
            Self::Configuration(_) | Self::Stopped => false,
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
