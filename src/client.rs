//! HTTP client for the DeepSeek chat completions API.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::{Stream, stream};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::sse::process_sse;
use crate::types::{ChatCompletionRequest, StreamEvent};

/// The API base used when `API_BASE` is not set.
pub const DEFAULT_API_BASE: &str = "https://api.deepseek.com";

const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// A boxed stream of decoded completion events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Something that can stream a chat completion.
///
/// The session talks to the remote model only through this trait, so tests
/// can substitute scripted streams for the network.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends `request` and returns the stream of response events.
    async fn stream_chat(&self, request: ChatCompletionRequest) -> Result<EventStream>;
}

/// Client for the DeepSeek API.
#[derive(Debug, Clone)]
pub struct DeepSeek {
    api_key: String,
    client: ReqwestClient,
    endpoint: Url,
    connect_timeout: Duration,
}

impl DeepSeek {
    /// Create a new client against the default API base.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_options(api_key, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        api_key: impl Into<String>,
        base_url: Option<&str>,
        connect_timeout: Option<Duration>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::authentication("API key must not be empty"));
        }
        let endpoint = chat_endpoint(base_url.unwrap_or(DEFAULT_API_BASE))?;

        let connect_timeout = connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            endpoint,
            connect_timeout,
        })
    }

    /// The full URL requests are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|_| {
            Error::config(
                "API key contains characters that cannot be sent in a header",
                Some("DEEPSEEK_API_KEY".to_string()),
            )
        })?;
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = detail.as_ref().and_then(|e| e.error_type.clone());
        let error_param = detail.as_ref().and_then(|e| e.param.clone());
        let error_message = detail
            .and_then(|e| e.message)
            .unwrap_or_else(|| error_body.clone());

        match status_code {
            400 | 422 => Error::bad_request(error_message, error_param),
            401 => Error::authentication(error_message),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message),
        }
    }

    /// Send a chat request and get a stream of response events.
    pub async fn stream(&self, mut request: ChatCompletionRequest) -> Result<EventStream> {
        request.stream = true;
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            endpoint = %self.endpoint,
            "sending chat request"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.default_headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {}", e),
                        Some(self.connect_timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            let err = Self::process_error_response(response).await;
            tracing::warn!(error = %err, "chat request rejected");
            return Err(err);
        }
        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "chat response headers received"
        );

        Ok(Box::pin(process_sse(response.bytes_stream())))
    }
}

#[async_trait::async_trait]
impl ChatBackend for DeepSeek {
    async fn stream_chat(&self, request: ChatCompletionRequest) -> Result<EventStream> {
        self.stream(request).await
    }
}

type Reply = Result<Vec<Result<StreamEvent>>>;

/// A backend that replays scripted replies instead of calling the network.
///
/// Each call to [`ChatBackend::stream_chat`] takes the next scripted reply;
/// once they run out, replies are empty streams ending in
/// [`StreamEvent::Done`].  Every request is recorded.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl ScriptedBackend {
    /// Creates a backend with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply made of `events`.
    pub fn with_reply(self, events: Vec<Result<StreamEvent>>) -> Self {
        self.lock_replies().push_back(Ok(events));
        self
    }

    /// Queues a reply that streams `chunks` as text and then ends cleanly.
    pub fn with_text_reply<I, S>(self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut events: Vec<Result<StreamEvent>> = chunks
            .into_iter()
            .map(|c| Ok(StreamEvent::Text(c.into())))
            .collect();
        events.push(Ok(StreamEvent::Done));
        self.with_reply(events)
    }

    /// Queues a request that fails with `error`.
    pub fn with_error(self, error: Error) -> Self {
        self.lock_replies().push_back(Err(error));
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lock_replies(&self) -> MutexGuard<'_, VecDeque<Reply>> {
        self.replies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl ChatBackend for ScriptedBackend {
    async fn stream_chat(&self, request: ChatCompletionRequest) -> Result<EventStream> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);
        let reply = self
            .lock_replies()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![Ok(StreamEvent::Done)]));
        Ok(Box::pin(stream::iter(reply?)))
    }
}

/// Resolves `{base}/chat/completions`, tolerating a trailing slash on `base`.
pub fn chat_endpoint(base: &str) -> Result<Url> {
    let mut base = Url::parse(base.trim())?;
    if base.cannot_be_a_base() {
        return Err(Error::url(format!("not a base URL: {base}"), None));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join(CHAT_COMPLETIONS_PATH)?)
}
