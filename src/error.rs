use std::fmt;

use agent_transport::{MessageError, TransportError};
use credential_store::CredentialStoreError;
use thiserror::Error;

/// Errors returned by [`crate::SessionClient`] operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("credential store error: {0}")]
    KeyStore(#[from] CredentialStoreError),

    #[error("message is empty")]
    EmptyMessage,

    #[error("command is empty")]
    EmptyCommand,

    #[error("provider key must not be empty")]
    EmptyKey,

    #[error("no key store configured")]
    NoKeyStore,
}

impl SyncError {
    /// Whether the failure should raise the blocking auth prompt.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Transport(error) if error.is_unauthorized())
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Timeout))
    }
}

/// Blocking request for provider credentials. Stays pending until a key is
/// set for the provider it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPrompt {
    /// `None` when the backend did not say which provider failed.
    pub provider_id: Option<String>,
    pub message: String,
}

impl AuthPrompt {
    #[must_use]
    pub fn from_transport(error: &TransportError) -> Option<Self> {
        match error {
            TransportError::Unauthorized {
                provider_id,
                message,
            } => Some(Self {
                provider_id: provider_id.clone(),
                message: message.clone(),
            }),
            _ => None,
        }
    }

    #[must_use]
    pub fn from_message_error(error: &MessageError) -> Option<Self> {
        if !error.is_auth_error() {
            return None;
        }
        Some(Self {
            provider_id: error.provider_id().map(str::to_string),
            message: error.message().to_string(),
        })
    }

    /// A prompt without a provider is resolved by a key for any provider.
    #[must_use]
    pub fn is_resolved_by(&self, provider_id: &str) -> bool {
        self.provider_id
            .as_deref()
            .map_or(true, |pending| pending == provider_id)
    }
}

/// Non-fatal condition surfaced to the embedding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncWarning {
    /// An abort was requested but no terminal event arrived within the
    /// grace period; the generation flag was cleared locally.
    AbortUnconfirmed { session_id: String },
}

impl fmt::Display for SyncWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AbortUnconfirmed { session_id } => write!(
                f,
                "abort for session {session_id} was not confirmed; generation state cleared"
            ),
        }
    }
}
