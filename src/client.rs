// Copyright 2026 The Palaver Project
// SPDX-License-Identifier: Apache-2.0

// Backend API client.
//
// Every call the UI makes goes through `ChatClient`: streaming chat
// completions, session verification, conversation persistence, and
// the token config used by the budget gauge. Transport is abstracted
// behind `HttpSender` so tests can run against an in-memory double.

use crate::budget::{ConfigFetcher, FetchError, RemoteTokenConfig};
use crate::message::{ChatMessage, Role};
use crate::stream::{decode_stream, StreamEvent};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The backend rejected the credential (401 or 403). `detail` is
    /// the server's explanation when the body carried one.
    #[error("authentication failed ({status}): {detail}")]
    Auth { status: u16, detail: String },

    /// Any other non-success response.
    #[error("backend returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("could not decode response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether the session credential should be dropped over this.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth { .. })
    }
}

impl From<HttpError> for ApiError {
    fn from(e: HttpError) -> Self {
        ApiError::Transport(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Transport types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout_ms: Option<u64>,
    pub stream: bool,
}

pub enum HttpBody {
    Full(Bytes),
    Stream(Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>>),
}

pub struct HttpResponse {
    pub status: StatusCode,
    pub body: HttpBody,
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("transport failed: {0}")]
    Transport(String),
    #[error("request timed out: {0}")]
    Timeout(String),
}

/// Sends HTTP requests to the backend.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

// ---------------------------------------------------------------------------
// Wire models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    pub role: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    pub model_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

/// Client for the chat backend's REST and streaming API.
///
/// Cheap to clone; clones share the underlying sender.
#[derive(Clone)]
pub struct ChatClient {
    http: Arc<dyn HttpSender>,
    base_url: String,
}

impl ChatClient {
    /// Client backed by a real reqwest connection pool.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_sender(
            base_url,
            Arc::new(ReqwestHttpSender::new(reqwest::Client::new())),
        )
    }

    pub fn with_sender(base_url: impl Into<String>, http: Arc<dyn HttpSender>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -- streaming ----------------------------------------------------------

    /// Start a streamed chat completion.
    ///
    /// The HTTP exchange happens before this returns: a rejected
    /// credential or non-success status is an `Err` here, never an
    /// event on the stream. Dropping the returned stream aborts the
    /// transfer.
    pub async fn stream_chat(
        &self,
        token: &str,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<ReceiverStream<StreamEvent>, ApiError> {
        let request_id = Uuid::new_v4();
        tracing::debug!(
            %request_id,
            model,
            message_count = messages.len(),
            "starting chat stream"
        );

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });
        let request = self.build_request(
            Method::POST,
            "/api/v1/chat/completions",
            Some(token),
            Some(&body),
            true,
        )?;

        let response = self.http.send(request).await?;
        if !response.status.is_success() {
            let status = response.status;
            let body = collect_body(response.body).await?;
            return Err(error_for_status(status, &body));
        }

        Ok(decode_stream(into_byte_stream(response.body)))
    }

    // -- auth ---------------------------------------------------------------

    /// Ask the backend whether the token is still accepted.
    pub async fn verify_token(&self, token: &str) -> Result<(), ApiError> {
        self.send_checked(Method::GET, "/api/v1/auth/verify", Some(token), None)
            .await?;
        Ok(())
    }

    pub async fn user_info(&self, token: &str) -> Result<UserInfo, ApiError> {
        self.request_json(Method::GET, "/api/v1/auth/me", Some(token), None)
            .await
    }

    // -- config -------------------------------------------------------------

    /// The server-advertised token limits. Unauthenticated: the limits
    /// are needed before login to size the gauge.
    pub async fn token_config(&self) -> Result<RemoteTokenConfig, ApiError> {
        self.request_json(Method::GET, "/api/v1/config", None, None).await
    }

    // -- conversation persistence -------------------------------------------

    pub async fn conversations(&self, token: &str) -> Result<Vec<Conversation>, ApiError> {
        self.request_json(Method::GET, "/api/v1/chat/conversations", Some(token), None)
            .await
    }

    pub async fn create_conversation(
        &self,
        token: &str,
        title: &str,
        model_name: &str,
    ) -> Result<Conversation, ApiError> {
        let body = serde_json::json!({ "title": title, "model_name": model_name });
        self.request_json(
            Method::POST,
            "/api/v1/chat/conversations",
            Some(token),
            Some(&body),
        )
        .await
    }

    pub async fn rename_conversation(
        &self,
        token: &str,
        conversation_id: i64,
        title: &str,
    ) -> Result<Conversation, ApiError> {
        let body = serde_json::json!({ "title": title });
        self.request_json(
            Method::PATCH,
            &format!("/api/v1/chat/conversations/{conversation_id}"),
            Some(token),
            Some(&body),
        )
        .await
    }

    pub async fn delete_conversation(
        &self,
        token: &str,
        conversation_id: i64,
    ) -> Result<(), ApiError> {
        self.send_checked(
            Method::DELETE,
            &format!("/api/v1/chat/conversations/{conversation_id}"),
            Some(token),
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn conversation_messages(
        &self,
        token: &str,
        conversation_id: i64,
    ) -> Result<Vec<StoredMessage>, ApiError> {
        self.request_json(
            Method::GET,
            &format!("/api/v1/chat/conversations/{conversation_id}/messages"),
            Some(token),
            None,
        )
        .await
    }

    pub async fn save_message(
        &self,
        token: &str,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<StoredMessage, ApiError> {
        let body = serde_json::json!({
            "conversation_id": conversation_id,
            "role": role,
            "content": content,
        });
        self.request_json(Method::POST, "/api/v1/chat/messages", Some(token), Some(&body))
            .await
    }

    // -- plumbing -----------------------------------------------------------

    fn build_request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&serde_json::Value>,
        stream: bool,
    ) -> Result<HttpRequest, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ApiError::Transport(format!("invalid bearer token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let body = match body {
            Some(value) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Bytes::from(
                    serde_json::to_vec(value)
                        .map_err(|e| ApiError::Transport(format!("could not encode body: {e}")))?,
                )
            }
            None => Bytes::new(),
        };

        Ok(HttpRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            headers,
            body,
            // Streams stay open for the whole completion.
            timeout_ms: if stream { None } else { Some(DEFAULT_TIMEOUT_MS) },
            stream,
        })
    }

    /// Send a request and return the successful response body.
    async fn send_checked(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&serde_json::Value>,
    ) -> Result<Bytes, ApiError> {
        let request = self.build_request(method, path, token, body, false)?;
        let response = self.http.send(request).await?;
        let status = response.status;
        let bytes = collect_body(response.body).await?;
        if !status.is_success() {
            return Err(error_for_status(status, &bytes));
        }
        Ok(bytes)
    }

    async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&serde_json::Value>,
    ) -> Result<T, ApiError> {
        let bytes = self.send_checked(method, path, token, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ConfigFetcher for ChatClient {
    async fn fetch_token_config(&self) -> Result<RemoteTokenConfig, FetchError> {
        self.token_config()
            .await
            .map_err(|e| FetchError(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Response classification
// ---------------------------------------------------------------------------

/// Map a non-success status and its body to an `ApiError`.
fn error_for_status(status: StatusCode, body: &[u8]) -> ApiError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let detail = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("detail")?.as_str().map(String::from))
            .unwrap_or_else(|| "authentication failed".to_string());
        return ApiError::Auth {
            status: status.as_u16(),
            detail,
        };
    }
    ApiError::Upstream {
        status: status.as_u16(),
        body: String::from_utf8_lossy(body).into_owned(),
    }
}

async fn collect_body(body: HttpBody) -> Result<Bytes, ApiError> {
    match body {
        HttpBody::Full(bytes) => Ok(bytes),
        HttpBody::Stream(mut stream) => {
            let mut collected = Vec::new();
            while let Some(chunk) = stream.next().await {
                let bytes = chunk.map_err(ApiError::from)?;
                collected.extend_from_slice(&bytes);
            }
            Ok(Bytes::from(collected))
        }
    }
}

fn into_byte_stream(body: HttpBody) -> Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>> {
    match body {
        HttpBody::Full(bytes) => Box::pin(tokio_stream::once(Ok(bytes))),
        HttpBody::Stream(stream) => stream,
    }
}

// ---------------------------------------------------------------------------
// Reqwest HTTP sender
// ---------------------------------------------------------------------------

pub struct ReqwestHttpSender {
    client: reqwest::Client,
}

impl ReqwestHttpSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSender for ReqwestHttpSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut req = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body);

        if let Some(timeout_ms) = request.timeout_ms {
            req = req.timeout(std::time::Duration::from_millis(timeout_ms));
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout(e.to_string())
            } else {
                HttpError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();

        if request.stream {
            let stream = resp
                .bytes_stream()
                .map_err(|e| HttpError::Transport(e.to_string()));
            Ok(HttpResponse {
                status,
                body: HttpBody::Stream(Box::pin(stream)),
            })
        } else {
            let body = resp
                .bytes()
                .await
                .map_err(|e| HttpError::Transport(e.to_string()))?;
            Ok(HttpResponse {
                status,
                body: HttpBody::Full(body),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
