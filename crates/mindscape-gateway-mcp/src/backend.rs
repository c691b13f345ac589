// crates/mindscape-gateway-mcp/src/backend.rs
// ============================================================================
// Module: Backend Client
// Description: Outbound interface to the tool and playbook backend.
// Purpose: List raw descriptors and execute calls over HTTP with hard limits.
// Dependencies: mindscape-gateway-config, mindscape-gateway-core, reqwest, url
// ============================================================================

//! ## Overview
//! [`BackendClient`] is the only place the gateway suspends. The dispatcher
//! depends on the trait; [`HttpBackendClient`] is the production
//! implementation. Responses are untrusted: bodies are size-limited, listing
//! payloads may be a bare array or wrapped in an object, and non-2xx bodies
//! are mined for a human-readable message.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use mindscape_gateway_config::BackendConfig;
use mindscape_gateway_core::ExternalContext;
use mindscape_gateway_core::RawToolDescriptor;
use reqwest::Client;
use reqwest::Response;
use reqwest::header::AUTHORIZATION;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use url::Url;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One execution request forwarded to the backend.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteRequest<'a> {
    /// Backend identifier of the tool or playbook.
    pub id: &'a str,
    /// Workspace the call runs in.
    pub workspace_id: &'a str,
    /// Tool inputs.
    pub inputs: &'a Map<String, Value>,
    /// Caller context, forwarded verbatim.
    pub external_context: Option<&'a ExternalContext>,
}

/// Wire body for execution requests.
#[derive(Serialize)]
struct ExecuteBody<'a> {
    /// Workspace the call runs in.
    workspace_id: &'a str,
    /// Tool inputs.
    inputs: &'a Map<String, Value>,
    /// Caller context.
    #[serde(skip_serializing_if = "Option::is_none")]
    external_context: Option<&'a ExternalContext>,
}

impl<'a> From<&ExecuteRequest<'a>> for ExecuteBody<'a> {
    fn from(request: &ExecuteRequest<'a>) -> Self {
        Self {
            workspace_id: request.workspace_id,
            inputs: request.inputs,
            external_context: request.external_context.filter(|context| !context.is_empty()),
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Backend collaborator consumed by the dispatcher.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Lists raw tool descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the backend cannot be reached or replies
    /// with an unusable payload.
    async fn list_tools(&self) -> Result<Vec<RawToolDescriptor>, BackendError>;

    /// Lists raw playbook descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] as for [`BackendClient::list_tools`].
    async fn list_playbooks(&self) -> Result<Vec<RawToolDescriptor>, BackendError>;

    /// Executes a tool and returns the raw backend response.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] on transport failure or a non-2xx status.
    async fn execute_tool(&self, request: &ExecuteRequest<'_>) -> Result<Value, BackendError>;

    /// Executes a playbook and returns the raw backend response.
    ///
    /// The response may carry only an `execution_id` for asynchronous runs.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] on transport failure or a non-2xx status.
    async fn execute_playbook(&self, request: &ExecuteRequest<'_>)
    -> Result<Value, BackendError>;
}

// ============================================================================
// SECTION: HTTP Client
// ============================================================================

/// Which listing endpoint a request targets.
#[derive(Debug, Clone, Copy)]
enum Catalog {
    /// Tool registry.
    Tools,
    /// Playbook registry.
    Playbooks,
}

impl Catalog {
    /// Key used when the listing is wrapped in an object.
    const fn wrapper_key(self) -> &'static str {
        match self {
            Self::Tools => "tools",
            Self::Playbooks => "playbooks",
        }
    }
}

/// reqwest-backed [`BackendClient`].
pub struct HttpBackendClient {
    /// Parsed backend base URL.
    base_url: Url,
    /// Tool registry path.
    tools_path: String,
    /// Playbook registry path.
    playbooks_path: String,
    /// Hard limit on response bodies.
    max_response_bytes: usize,
    /// HTTP client configured with timeout, user agent and credentials.
    client: Client,
}

impl HttpBackendClient {
    /// Builds a client from backend configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the URL or credentials are unusable or
    /// the HTTP client cannot be built.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let base_url =
            config.parsed_base_url().map_err(|err| BackendError::Transport(err.to_string()))?;
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| BackendError::Transport("invalid backend api key".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        Ok(Self {
            base_url,
            tools_path: config.tools_path.clone(),
            playbooks_path: config.playbooks_path.clone(),
            max_response_bytes: config.max_response_bytes,
            client,
        })
    }

    /// Returns the configured path for a catalog.
    fn catalog_path(&self, catalog: Catalog) -> &str {
        match catalog {
            Catalog::Tools => &self.tools_path,
            Catalog::Playbooks => &self.playbooks_path,
        }
    }

    /// Joins a configured path and extra segments onto the base URL.
    ///
    /// Extra segments are percent-encoded, so backend ids cannot escape the
    /// configured path.
    fn endpoint(&self, path: &str, extra: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                BackendError::Transport("backend base url cannot carry a path".to_string())
            })?;
            segments.pop_if_empty();
            segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
            segments.extend(extra);
        }
        Ok(url)
    }

    /// Fetches and decodes one listing.
    async fn list(&self, catalog: Catalog) -> Result<Vec<RawToolDescriptor>, BackendError> {
        let url = self.endpoint(self.catalog_path(catalog), &[])?;
        let response = self.client.get(url).send().await.map_err(map_transport_error)?;
        let body = self.read_success(response).await?;
        decode_listing(&body, catalog.wrapper_key())
    }

    /// Posts one execution request.
    async fn execute(
        &self,
        catalog: Catalog,
        request: &ExecuteRequest<'_>,
    ) -> Result<Value, BackendError> {
        let url = self.endpoint(self.catalog_path(catalog), &[request.id, "execute"])?;
        let response = self
            .client
            .post(url)
            .json(&ExecuteBody::from(request))
            .send()
            .await
            .map_err(map_transport_error)?;
        self.read_success(response).await
    }

    /// Reads a response, mapping non-2xx statuses to [`BackendError::Status`].
    async fn read_success(&self, response: Response) -> Result<Value, BackendError> {
        let status = response.status();
        let bytes = read_limited(response, self.max_response_bytes).await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: status_message(&bytes, status.canonical_reason()),
            });
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|_| BackendError::Decode("backend returned invalid json".to_string()))
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn list_tools(&self) -> Result<Vec<RawToolDescriptor>, BackendError> {
        self.list(Catalog::Tools).await
    }

    async fn list_playbooks(&self) -> Result<Vec<RawToolDescriptor>, BackendError> {
        self.list(Catalog::Playbooks).await
    }

    async fn execute_tool(&self, request: &ExecuteRequest<'_>) -> Result<Value, BackendError> {
        self.execute(Catalog::Tools, request).await
    }

    async fn execute_playbook(
        &self,
        request: &ExecuteRequest<'_>,
    ) -> Result<Value, BackendError> {
        self.execute(Catalog::Playbooks, request).await
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Backend call failures.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend answered with a non-2xx status.
    #[error("backend returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },
    /// The request did not complete within the configured timeout.
    #[error("backend request timed out")]
    Timeout,
    /// Connection or client failure.
    #[error("backend transport error: {0}")]
    Transport(String),
    /// The body was not usable.
    #[error("backend decode error: {0}")]
    Decode(String),
    /// The body exceeded the configured limit.
    #[error("backend response exceeds {limit} bytes")]
    TooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Classifies a reqwest failure.
fn map_transport_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(err.to_string())
    }
}

/// Reads the response body while enforcing a byte limit.
async fn read_limited(mut response: Response, max_bytes: usize) -> Result<Vec<u8>, BackendError> {
    if let Some(expected) = response.content_length()
        && usize::try_from(expected).map_or(true, |expected| expected > max_bytes)
    {
        return Err(BackendError::TooLarge {
            limit: max_bytes,
        });
    }
    let mut buf = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(map_transport_error)? {
        if buf.len().saturating_add(chunk.len()) > max_bytes {
            return Err(BackendError::TooLarge {
                limit: max_bytes,
            });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// Extracts a readable message from an error body.
fn status_message(bytes: &[u8], reason: Option<&str>) -> String {
    let fallback = || reason.unwrap_or("request failed").to_string();
    let Ok(body) = serde_json::from_slice::<Value>(bytes) else {
        return fallback();
    };
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| match body.get(*key) {
            Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
            Some(Value::Object(inner)) => {
                inner.get("message").and_then(Value::as_str).map(str::to_string)
            }
            _ => None,
        })
        .unwrap_or_else(fallback)
}

/// Decodes a listing that is either an array or wrapped under `key`.
///
/// Bare strings are accepted as descriptors carrying only a name.
pub(crate) fn decode_listing(
    body: &Value,
    key: &str,
) -> Result<Vec<RawToolDescriptor>, BackendError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => match map.get(key) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(BackendError::Decode(format!("listing object lacks `{key}` array")));
            }
        },
        _ => return Err(BackendError::Decode("listing must be an array or object".to_string())),
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(name) => Ok(RawToolDescriptor::with_name(name.clone())),
            Value::Object(_) => serde_json::from_value(item.clone())
                .map_err(|err| BackendError::Decode(format!("invalid descriptor: {err}"))),
            _ => Err(BackendError::Decode("descriptor must be an object".to_string())),
        })
        .collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
