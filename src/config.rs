//! Backend credentials and synchronizer tuning parsed from environment variables.
//!
//! DESIGN
//! ======
//! Credentials are validated before anything touches the network: a missing
//! or placeholder URL/key yields a [`ConfigError`] and the shell renders the
//! configuration view instead of connecting. Tunables fall back to the
//! `DEFAULT_*` constants when absent, unparsable, or (for periods and
//! timeouts) zero.

use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

/// Accepted URL variables, in lookup order.
pub const URL_VARS: [&str; 2] = ["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"];
/// Accepted anon-key variables, in lookup order.
pub const KEY_VARS: [&str; 2] = ["SUPABASE_ANON_KEY", "NEXT_PUBLIC_SUPABASE_ANON_KEY"];

pub const URL_PLACEHOLDER: &str = "your_supabase_url_here";
pub const KEY_PLACEHOLDER: &str = "your_supabase_anon_key_here";

pub const DEFAULT_TABLE: &str = "lightbulb";
pub const DEFAULT_ROW_ID: i64 = 1;
pub const DEFAULT_CHANNEL: &str = "lightbulb-changes";

pub const DEFAULT_POLL_MS: u64 = 5_000;
pub const DEFAULT_FAST_POLL_MS: u64 = 1_500;
pub const DEFAULT_UPDATE_FLASH_MS: u64 = 2_000;
pub const DEFAULT_BANNER_MS: u64 = 5_000;
pub const DEFAULT_SUBSCRIBE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_HEARTBEAT_SECS: u64 = 25;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// BACKEND CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// Where the singleton row lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Project base URL without trailing slash (e.g. `https://xyz.supabase.co`).
    pub url: String,
    pub anon_key: String,
    pub table: String,
    pub row_id: i64,
    /// Realtime channel name; the joined topic is `realtime:<channel>`.
    pub channel: String,
    pub timeouts: HttpTimeouts,
}

impl BackendConfig {
    /// Validate credentials and fill every other field with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if either credential is missing, a placeholder, or
    /// the URL is not http(s).
    pub fn new(url: Option<&str>, anon_key: Option<&str>) -> Result<Self, ConfigError> {
        let url = validate_url(url)?;
        let anon_key = validate_key(anon_key)?;
        Ok(Self {
            url,
            anon_key,
            table: DEFAULT_TABLE.to_owned(),
            row_id: DEFAULT_ROW_ID,
            channel: DEFAULT_CHANNEL.to_owned(),
            timeouts: HttpTimeouts::default(),
        })
    }

    /// Build config from environment variables.
    ///
    /// Required (first match wins):
    /// - `SUPABASE_URL` or `NEXT_PUBLIC_SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY` or `NEXT_PUBLIC_SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `LIGHTBULB_TABLE`: default `lightbulb`
    /// - `LIGHTBULB_ROW_ID`: default 1
    /// - `LIGHTBULB_CHANNEL`: default `lightbulb-changes`
    /// - `LIGHTBULB_REQUEST_TIMEOUT_SECS`: default 10
    /// - `LIGHTBULB_CONNECT_TIMEOUT_SECS`: default 5
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or placeholders.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(None, None)
    }

    /// Like [`BackendConfig::from_env`], with explicit overrides (CLI flags)
    /// taking precedence over the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or placeholders.
    pub fn from_env_with(url: Option<String>, anon_key: Option<String>) -> Result<Self, ConfigError> {
        let url = url.or_else(|| first_env(&URL_VARS));
        let anon_key = anon_key.or_else(|| first_env(&KEY_VARS));
        let mut config = Self::new(url.as_deref(), anon_key.as_deref())?;

        if let Some(table) = non_empty_env("LIGHTBULB_TABLE") {
            config.table = table;
        }
        if let Some(channel) = non_empty_env("LIGHTBULB_CHANNEL") {
            config.channel = channel;
        }
        config.row_id = env_parse("LIGHTBULB_ROW_ID", DEFAULT_ROW_ID);
        config.timeouts = HttpTimeouts {
            request_secs: env_nonzero("LIGHTBULB_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: env_nonzero("LIGHTBULB_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        Ok(config)
    }

    /// PostgREST endpoint for the configured table.
    #[must_use]
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }

    /// Realtime websocket endpoint, with the key and protocol version as query params.
    #[must_use]
    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.url.clone()
        };
        format!("{ws_base}/realtime/v1/websocket?apikey={}&vsn=1.0.0", self.anon_key)
    }
}

fn validate_url(raw: Option<&str>) -> Result<String, ConfigError> {
    let url = raw.map(str::trim).filter(|v| !v.is_empty()).ok_or(ConfigError::Missing { var: URL_VARS[0] })?;
    if url == URL_PLACEHOLDER {
        return Err(ConfigError::Placeholder { var: URL_VARS[0] });
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::InvalidUrl(url.to_owned()));
    }
    Ok(url.trim_end_matches('/').to_owned())
}

fn validate_key(raw: Option<&str>) -> Result<String, ConfigError> {
    let key = raw.map(str::trim).filter(|v| !v.is_empty()).ok_or(ConfigError::Missing { var: KEY_VARS[0] })?;
    if key == KEY_PLACEHOLDER {
        return Err(ConfigError::Placeholder { var: KEY_VARS[0] });
    }
    // Sent verbatim in `apikey` / `Authorization` headers.
    if !key.chars().all(|c| c.is_ascii_graphic()) {
        return Err(ConfigError::InvalidKey { var: KEY_VARS[0] });
    }
    Ok(key.to_owned())
}

// =============================================================================
// SYNC TUNING
// =============================================================================

/// Timer settings for the synchronizer and its realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTuning {
    /// Poll period while the push channel is healthy.
    pub poll_interval: Duration,
    /// Poll period in polling-only mode.
    pub fast_poll_interval: Duration,
    /// How long the "update received" overlay stays up.
    pub update_flash: Duration,
    /// How long a write-failure banner stays up.
    pub banner_ttl: Duration,
    /// Deadline for the channel join reply.
    pub subscribe_timeout: Duration,
    /// Phoenix heartbeat period; a missed reply fails the channel.
    pub heartbeat_interval: Duration,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_MS),
            fast_poll_interval: Duration::from_millis(DEFAULT_FAST_POLL_MS),
            update_flash: Duration::from_millis(DEFAULT_UPDATE_FLASH_MS),
            banner_ttl: Duration::from_millis(DEFAULT_BANNER_MS),
            subscribe_timeout: Duration::from_millis(DEFAULT_SUBSCRIBE_TIMEOUT_MS),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
        }
    }
}

impl SyncTuning {
    /// Load tuning from `LIGHTBULB_*` variables, defaulting each one independently.
    /// A zero period or timeout is treated as unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_millis(env_nonzero("LIGHTBULB_POLL_MS", DEFAULT_POLL_MS)),
            fast_poll_interval: Duration::from_millis(env_nonzero("LIGHTBULB_FAST_POLL_MS", DEFAULT_FAST_POLL_MS)),
            update_flash: Duration::from_millis(env_parse("LIGHTBULB_UPDATE_FLASH_MS", DEFAULT_UPDATE_FLASH_MS)),
            banner_ttl: Duration::from_millis(env_parse("LIGHTBULB_BANNER_MS", DEFAULT_BANNER_MS)),
            subscribe_timeout: Duration::from_millis(env_nonzero(
                "LIGHTBULB_SUBSCRIBE_TIMEOUT_MS",
                DEFAULT_SUBSCRIBE_TIMEOUT_MS,
            )),
            heartbeat_interval: Duration::from_secs(env_nonzero("LIGHTBULB_HEARTBEAT_SECS", DEFAULT_HEARTBEAT_SECS)),
        }
    }
}

// =============================================================================
// ENV HELPERS
// =============================================================================

/// Load `.env.local` then `.env` into the process environment.
///
/// Existing variables are never overwritten, so the real environment wins
/// over both files and `.env.local` wins over `.env`.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Like [`env_parse`] for periods and timeouts, where zero is unusable
/// (tokio intervals panic on a zero period).
pub(crate) fn env_nonzero(key: &str, default: u64) -> u64 {
    match env_parse(key, default) {
        0 => {
            warn!(key, default, "zero is not a valid period; using default");
            default
        }
        value => value,
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn first_env(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| non_empty_env(key))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
