//! Environment configuration.

use std::env;
use std::time::Duration;

use agent_transport_http::HttpTransportConfig;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:4096";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_ABORT_GRACE: Duration = Duration::from_secs(10);
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_RECONNECT_MAX: Duration = Duration::from_secs(30);
/// The backend heartbeats every 30s, so two missed beats mean a dead stream.
pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(75);
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub base_url: String,
    /// Project directory forwarded to the backend on every request.
    pub directory: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
    /// How long an aborted session may keep reporting generation before the
    /// flag is force-cleared.
    pub abort_grace: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    /// Longest silence tolerated on the event stream before it is dropped
    /// and re-established.
    pub stream_idle_timeout: Duration,
    pub log_filter: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            directory: None,
            username: None,
            password: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            abort_grace: DEFAULT_ABORT_GRACE,
            reconnect_base: DEFAULT_RECONNECT_BASE,
            reconnect_max: DEFAULT_RECONNECT_MAX,
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_string_opt("SESSION_SYNC_BASE_URL").unwrap_or(defaults.base_url),
            directory: env_string_opt("SESSION_SYNC_DIRECTORY"),
            username: env_string_opt("SESSION_SYNC_USERNAME"),
            password: env_string_opt("SESSION_SYNC_PASSWORD"),
            request_timeout: env_millis("SESSION_SYNC_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout),
            abort_grace: env_millis("SESSION_SYNC_ABORT_GRACE_MS").unwrap_or(defaults.abort_grace),
            reconnect_base: env_millis("SESSION_SYNC_RECONNECT_BASE_MS")
                .unwrap_or(defaults.reconnect_base),
            reconnect_max: env_millis("SESSION_SYNC_RECONNECT_MAX_MS")
                .unwrap_or(defaults.reconnect_max),
            stream_idle_timeout: env_millis("SESSION_SYNC_STREAM_IDLE_MS")
                .filter(|timeout| !timeout.is_zero())
                .unwrap_or(defaults.stream_idle_timeout),
            log_filter: env_string_opt("SESSION_SYNC_LOG").unwrap_or(defaults.log_filter),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: Option<String>, password: impl Into<String>) -> Self {
        self.username = username;
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_abort_grace(mut self, grace: Duration) -> Self {
        self.abort_grace = grace;
        self
    }

    #[must_use]
    pub fn with_reconnect_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base = base;
        self.reconnect_max = max.max(base);
        self
    }

    #[must_use]
    pub fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Transport settings for [`agent_transport_http::HttpTransport`].
    #[must_use]
    pub fn http_transport_config(&self) -> HttpTransportConfig {
        let mut config = HttpTransportConfig::new(self.base_url.clone())
            .with_request_timeout(self.request_timeout);
        if let Some(directory) = &self.directory {
            config = config.with_directory(directory.clone());
        }
        if let Some(password) = &self.password {
            config = config.with_credentials(self.username.clone(), password.clone());
        }
        config
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_millis(key: &str) -> Option<Duration> {
    env_string_opt(key)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}
