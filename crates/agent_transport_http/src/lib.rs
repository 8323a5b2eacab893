//! HTTP/SSE implementation of the shared `agent_transport` contract.
//!
//! This adapter translates `agent_api` wire calls and errors into the
//! backend-neutral [`SessionTransport`] operations consumed by `session_sync`.

use std::time::Duration;

use agent_api::url::session_path;
use agent_api::{
    AgentApiClient, AgentApiConfig, AgentApiError, ApiKeyAuthBody, CommandBody,
    CreateSessionBody, PromptBody, PromptPart, ServerEvent,
};
use agent_transport::{
    CommandRequest, EventStream, Message, RawEvent, SendMessageRequest, Session,
    SessionTransport, TransportError,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;

/// Runtime configuration for the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    pub base_url: String,
    pub directory: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Option<Duration>,
}

impl HttpTransportConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            directory: None,
            username: None,
            password: None,
            request_timeout: None,
        }
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
        self.request_timeout = Some(timeout);
        self
    }

    fn into_agent_api_config(self) -> AgentApiConfig {
        let mut config = AgentApiConfig::new(self.base_url);

        if let Some(directory) = self.directory {
            config = config.with_directory(directory);
        }

        if let Some(password) = self.password {
            config = config.with_basic_auth(self.username, password);
        }

        if let Some(timeout) = self.request_timeout {
            config = config.with_request_timeout(timeout);
        }

        config
    }
}

/// [`SessionTransport`] backed by the backend REST API and `/event` stream.
#[derive(Debug)]
pub struct HttpTransport {
    client: AgentApiClient,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = AgentApiClient::new(config.into_agent_api_config()).map_err(map_error)?;
        Ok(Self { client })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.client.config().base_url
    }
}

#[async_trait]
impl SessionTransport for HttpTransport {
    async fn list_sessions(&self) -> Result<Vec<Session>, TransportError> {
        self.client.get_json("/session").await.map_err(map_error)
    }

    async fn create_session(&self, title: Option<String>) -> Result<Session, TransportError> {
        self.client
            .post_json("/session", &CreateSessionBody { title })
            .await
            .map_err(map_error)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), TransportError> {
        self.client
            .delete_json::<Value>(&session_path(session_id, ""))
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn fetch_messages(&self, session_id: &str) -> Result<Vec<Message>, TransportError> {
        self.client
            .get_json(&session_path(session_id, "message"))
            .await
            .map_err(map_error)
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<(), TransportError> {
        let path = session_path(&request.session_id, "prompt_async");
        let body = prompt_body(&request);
        self.client
            .post_accepted(&path, &body)
            .await
            .map_err(map_error)
    }

    async fn execute_command(&self, request: CommandRequest) -> Result<(), TransportError> {
        let path = session_path(&request.session_id, "command");
        self.client
            .post_accepted(&path, &command_body(&request))
            .await
            .map_err(map_error)
    }

    async fn abort_session(&self, session_id: &str) -> Result<bool, TransportError> {
        let aborted: Value = self
            .client
            .post_json(&session_path(session_id, "abort"), &serde_json::json!({}))
            .await
            .map_err(map_error)?;
        Ok(aborted.as_bool().unwrap_or(true))
    }

    async fn set_provider_key(&self, provider_id: &str, key: &str) -> Result<(), TransportError> {
        let path = format!("/auth/{}", agent_api::url::encode_path_segment(provider_id));
        self.client
            .put_json::<_, Value>(&path, &ApiKeyAuthBody::new(key))
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn subscribe_events(&self) -> Result<EventStream, TransportError> {
        let events = self.client.event_stream().await.map_err(map_error)?;
        tracing::debug!(base_url = %self.base_url(), "event stream opened");
        Ok(events
            .map(|item| item.map(raw_event).map_err(map_error))
            .boxed())
    }
}

fn prompt_body(request: &SendMessageRequest) -> PromptBody {
    let mut parts = Vec::with_capacity(1 + request.images.len() + request.files.len());
    if !request.text.trim().is_empty() {
        parts.push(PromptPart::text(request.text.clone()));
    }
    for image in &request.images {
        parts.push(PromptPart::image(
            image.mime.clone(),
            image.filename.clone(),
            &image.data,
        ));
    }
    for file in &request.files {
        parts.push(PromptPart::File {
            mime: file.mime.clone(),
            filename: file.filename.clone(),
            url: file.url.clone(),
        });
    }

    PromptBody::new(parts).with_model(request.provider_id.clone(), request.model_id.clone())
}

fn command_body(request: &CommandRequest) -> CommandBody {
    let model = match (&request.provider_id, &request.model_id) {
        (Some(provider_id), Some(model_id)) => Some(format!("{provider_id}/{model_id}")),
        _ => None,
    };

    CommandBody {
        command: request.command.trim_start_matches('/').to_string(),
        arguments: request.arguments.clone(),
        model,
    }
}

fn raw_event(event: ServerEvent) -> RawEvent {
    RawEvent::new(event.event_type, event.properties)
}

fn map_error(error: AgentApiError) -> TransportError {
    match error {
        AgentApiError::Timeout => TransportError::Timeout,
        AgentApiError::Request(error) if error.is_decode() => {
            TransportError::Malformed(error.to_string())
        }
        AgentApiError::Request(error) => TransportError::Unreachable(error.to_string()),
        AgentApiError::InvalidBaseUrl(_) | AgentApiError::InvalidHeader(_) => {
            TransportError::Unreachable(error.to_string())
        }
        AgentApiError::Status(status, message) => TransportError::Status {
            status: status.as_u16(),
            message,
        },
        AgentApiError::Unauthorized {
            provider_id,
            message,
        } => TransportError::Unauthorized {
            provider_id,
            message,
        },
        AgentApiError::Serde(error) => TransportError::Malformed(error.to_string()),
        AgentApiError::StreamClosed => TransportError::StreamClosed,
    }
}
