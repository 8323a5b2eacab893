use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::AgentApiConfig;
use crate::error::{error_from_response, AgentApiError};
use crate::events::ServerEvent;
use crate::headers::{build_headers, Accept};
use crate::sse::SseStreamParser;
use crate::url::{endpoint_url, normalize_base_url};

/// Path of the backend event stream.
pub const EVENT_PATH: &str = "/event";

/// Ordered backend events. The stream yields exactly one `Err` (a transport
/// failure or [`AgentApiError::StreamClosed`]) and then ends.
pub type ServerEventStream = BoxStream<'static, Result<ServerEvent, AgentApiError>>;

#[derive(Debug)]
pub struct AgentApiClient {
    http: Client,
    config: AgentApiConfig,
}

impl AgentApiClient {
    pub fn new(config: AgentApiConfig) -> Result<Self, AgentApiError> {
        let base = normalize_base_url(&config.base_url);
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(AgentApiError::InvalidBaseUrl(config.base_url.clone()));
        }

        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(AgentApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &AgentApiConfig {
        &self.config
    }

    pub fn build_headers(&self, accept: Accept) -> Result<HeaderMap, AgentApiError> {
        let headers = build_headers(&self.config, accept)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                    AgentApiError::InvalidHeader(format!("invalid header key: {key}"))
                })?,
                HeaderValue::from_str(&value).map_err(|_| {
                    AgentApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    /// Builds a REST request bounded by the configured request timeout.
    pub fn build_request(&self, method: Method, path: &str) -> Result<RequestBuilder, AgentApiError> {
        let headers = self.build_headers(Accept::Json)?;
        Ok(self
            .http
            .request(method, endpoint_url(&self.config.base_url, path))
            .headers(headers)
            .timeout(self.config.request_timeout))
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T, AgentApiError>
    where
        T: DeserializeOwned,
    {
        let response = self.build_request(Method::GET, path)?.send().await?;
        read_json(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, AgentApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .build_request(Method::POST, path)?
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    /// POST whose response body is irrelevant (e.g. `204 No Content`).
    pub async fn post_accepted<B>(&self, path: &str, body: &B) -> Result<(), AgentApiError>
    where
        B: Serialize + ?Sized,
    {
        let response = self
            .build_request(Method::POST, path)?
            .json(body)
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, AgentApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .build_request(Method::PUT, path)?
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    pub async fn delete_json<T>(&self, path: &str) -> Result<T, AgentApiError>
    where
        T: DeserializeOwned,
    {
        let response = self.build_request(Method::DELETE, path)?.send().await?;
        read_json(response).await
    }

    /// Opens the long-lived event stream. Only the connect timeout applies.
    pub async fn event_stream(&self) -> Result<ServerEventStream, AgentApiError> {
        let headers = self.build_headers(Accept::EventStream)?;
        let response = self
            .http
            .get(endpoint_url(&self.config.base_url, EVENT_PATH))
            .headers(headers)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        Ok(sse_events(response.bytes_stream()))
    }
}

async fn ensure_success(response: Response) -> Result<Response, AgentApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(error_from_response(status, &body))
}

async fn read_json<T>(response: Response) -> Result<T, AgentApiError>
where
    T: DeserializeOwned,
{
    let response = ensure_success(response).await?;
    let body = response.text().await?;
    let body = if body.trim().is_empty() { "null" } else { &body };
    serde_json::from_str(body).map_err(AgentApiError::from)
}

struct SseState<S> {
    bytes: Pin<Box<S>>,
    parser: SseStreamParser,
    pending: VecDeque<ServerEvent>,
    finished: bool,
}

/// Adapts a byte-chunk stream into decoded server events.
pub fn sse_events<S, B, E>(bytes: S) -> ServerEventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<AgentApiError> + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        parser: SseStreamParser::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.pending.extend(state.parser.feed(chunk.as_ref())),
                Some(Err(error)) => {
                    state.finished = true;
                    return Some((Err(error.into()), state));
                }
                None => {
                    state.finished = true;
                    return Some((Err(AgentApiError::StreamClosed), state));
                }
            }
        }
    })
    .boxed()
}
