//! Remote fallback client.
//!
//! When no intent matches, the running conversation is sent to the
//! server-side model proxy. Any failure here degrades to the canned
//! fallback pool: the caller only ever sees `Some(reply)` or `None`, and a
//! turn is never blocked by a proxy outage.

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationHistory, HistoryTurn, Role};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One message in the proxy wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub parts: Vec<WirePart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WirePart {
    pub text: String,
}

impl WireMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![WirePart { text: text.into() }],
        }
    }
}

pub fn wire_from_history(history: &ConversationHistory) -> Vec<WireMessage> {
    history
        .wire_turns()
        .iter()
        .map(|HistoryTurn { role, text }| WireMessage::new(*role, text.clone()))
        .collect()
}

#[derive(Debug, Serialize)]
struct ProxyPayload {
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct ProxyReply {
    reply: Option<String>,
}

/// Why a remote call failed. Only used for diagnostics; every kind ends in
/// the same recovery path (the canned fallback pool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// 401/403 from the proxy or upstream.
    Auth,
    /// 429.
    RateLimit,
    /// 404.
    NotFound,
    /// 408 or transport timeout.
    Timeout,
    /// Connection refused, DNS failure, reset.
    Network,
    /// 500/502/503/504.
    ServerError,
    /// 2xx with a body that did not contain a usable reply.
    Malformed,
    /// Anything else.
    Unknown,
}

#[derive(Debug)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 | 403 => RemoteErrorKind::Auth,
            404 => RemoteErrorKind::NotFound,
            408 => RemoteErrorKind::Timeout,
            429 => RemoteErrorKind::RateLimit,
            500 | 502 | 503 | 504 => RemoteErrorKind::ServerError,
            _ => RemoteErrorKind::Unknown,
        };
        Self {
            kind,
            status: Some(status),
            message: truncate_body(body),
        }
    }

    pub fn network(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            RemoteErrorKind::Timeout
        } else {
            RemoteErrorKind::Network
        };
        Self {
            kind,
            status: None,
            message: err.to_string(),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Malformed,
            status: None,
            message: detail.into(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "remote error ({}, {:?}): {}",
                status, self.kind, self.message
            ),
            None => write!(f, "remote error ({:?}): {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 300;
    if body.len() > LIMIT {
        let mut end = LIMIT;
        while end > 0 && !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

/// Extract and post-process the reply field from a 2xx proxy body.
/// The widget voice is lowercase, so remote text is trimmed and lowered
/// before it reaches the renderer.
pub fn extract_reply(body: &str) -> Result<String, RemoteError> {
    let parsed: ProxyReply = serde_json::from_str(body)
        .map_err(|e| RemoteError::malformed(format!("unparseable proxy body: {}", e)))?;
    let reply = parsed
        .reply
        .ok_or_else(|| RemoteError::malformed("proxy body missing reply field"))?;
    let cleaned = reply.trim().to_lowercase();
    if cleaned.is_empty() {
        return Err(RemoteError::malformed("proxy reply was empty"));
    }
    Ok(cleaned)
}

/// HTTP client for the model proxy. One attempt per turn, no retries.
pub struct RemoteClient {
    client: Client,
    proxy_url: String,
}

impl RemoteClient {
    pub fn new(proxy_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            proxy_url: proxy_url.into(),
        })
    }

    /// Send the conversation (already including the pending user turn) to
    /// the proxy. Every failure mode collapses to `None` after logging;
    /// callers treat that identically to "remote unavailable".
    pub async fn complete(&self, history: &ConversationHistory) -> Option<String> {
        let messages = wire_from_history(history);
        if messages.is_empty() {
            return None;
        }

        match self.try_complete(messages).await {
            Ok(reply) => Some(reply),
            Err(err) => {
                log::warn!("remote fallback unavailable: {}", err);
                None
            }
        }
    }

    async fn try_complete(&self, messages: Vec<WireMessage>) -> Result<String, RemoteError> {
        let response = self
            .client
            .post(&self.proxy_url)
            .json(&ProxyPayload { messages })
            .send()
            .await
            .map_err(|e| RemoteError::network(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::network(&e))?;

        if !status.is_success() {
            return Err(RemoteError::from_status(status.as_u16(), &body));
        }
        extract_reply(&body)
    }
}
