use std::collections::BTreeMap;

use base64::{engine::general_purpose, Engine as _};

use crate::config::AgentApiConfig;
use crate::error::AgentApiError;

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_AUTHORIZATION: &str = "authorization";
pub const HEADER_DIRECTORY: &str = "x-opencode-directory";
pub const HEADER_USER_AGENT: &str = "user-agent";

/// Basic-auth user name used when a password is configured without one.
pub const DEFAULT_USERNAME: &str = "opencode";

/// Response body the caller expects, selecting the `accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    Json,
    EventStream,
}

impl Accept {
    fn as_str(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::EventStream => "text/event-stream",
        }
    }
}

/// Build a deterministic header map for backend requests.
pub fn build_headers(
    config: &AgentApiConfig,
    accept: Accept,
) -> Result<BTreeMap<String, String>, AgentApiError> {
    let mut headers = BTreeMap::new();

    headers.insert(HEADER_ACCEPT.to_owned(), accept.as_str().to_owned());
    headers.insert(
        HEADER_CONTENT_TYPE.to_owned(),
        "application/json".to_owned(),
    );

    let ua = config
        .user_agent
        .as_deref()
        .and_then(sanitize_nonempty)
        .unwrap_or_else(default_user_agent);
    headers.insert(HEADER_USER_AGENT.to_owned(), ua);

    if let Some(password) = config.password.as_deref().and_then(sanitize_nonempty) {
        let username = config
            .username
            .as_deref()
            .and_then(sanitize_nonempty)
            .unwrap_or_else(|| DEFAULT_USERNAME.to_owned());
        if username.contains(':') {
            return Err(AgentApiError::InvalidHeader(
                "basic-auth user name must not contain ':'".to_owned(),
            ));
        }
        let credentials = general_purpose::STANDARD.encode(format!("{username}:{password}"));
        headers.insert(
            HEADER_AUTHORIZATION.to_owned(),
            format!("Basic {credentials}"),
        );
    }

    if let Some(directory) = config.directory.as_deref().and_then(sanitize_nonempty) {
        headers.insert(HEADER_DIRECTORY.to_owned(), directory);
    }

    for (key, value) in &config.extra_headers {
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_owned());
    }

    Ok(headers)
}

fn sanitize_nonempty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

fn default_user_agent() -> String {
    format!(
        "session-sync/{} ({}/{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
