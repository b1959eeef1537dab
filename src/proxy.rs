//! The model proxy endpoint.
//!
//! Holds the hosted-model credential server-side and forwards the
//! conversation upstream, normalizing the provider-native response shape
//! to `{reply}` / `{error}`. The credential comes from the environment
//! only; nothing a client sends can supply or override it.

use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::conversation::Role;
use crate::remote::WireMessage;

/// Fixed persona injected as the system instruction on every upstream call.
const PERSONA: &str = "you are cael, the quiet and minimal ai assistant for \
carlwyne's portfolio. his projects are sonder (a quiet space for unseen \
words) and embers (a sittable fire for strangers). your tone is always \
lowercase, atmospheric, and brief. never use emoji. you speak in short \
sentences and keep the lowercase intentional vibe.";

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Chat-completion endpoint of the hosted model.
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

pub struct ProxyState {
    client: Client,
    config: UpstreamConfig,
}

impl ProxyState {
    pub fn new(config: UpstreamConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(UPSTREAM_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    fn api_key(&self) -> Option<String> {
        std::env::var(&self.config.api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

/// Accepts both client variants: the full conversation or a bare message.
#[derive(Debug, Deserialize)]
pub struct ProxyRequest {
    #[serde(default)]
    pub messages: Option<Vec<WireMessage>>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Normalize the request into upstream contents. `None` when the request
/// carries nothing to say.
pub fn contents_from_request(req: &ProxyRequest) -> Option<Vec<WireMessage>> {
    if let Some(messages) = &req.messages {
        if !messages.is_empty() {
            return Some(messages.clone());
        }
    }
    req.message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| vec![WireMessage::new(Role::User, m)])
}

pub fn build_upstream_body(contents: &[WireMessage]) -> Value {
    json!({
        "contents": contents,
        "systemInstruction": { "parts": [{ "text": PERSONA }] }
    })
}

/// Pull the reply text out of the provider-native response shape.
pub fn extract_candidate_text(body: &Value) -> Option<String> {
    body["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// `POST /api/model`.
pub async fn handle(state: web::Data<ProxyState>, req: web::Json<ProxyRequest>) -> HttpResponse {
    let Some(contents) = contents_from_request(&req) else {
        return HttpResponse::BadRequest().json(json!({ "error": "empty conversation" }));
    };
    let Some(api_key) = state.api_key() else {
        log::error!(
            "model proxy has no credential: {} is unset",
            state.config.api_key_env
        );
        return HttpResponse::InternalServerError()
            .json(json!({ "error": "api key not configured" }));
    };

    let body = build_upstream_body(&contents);
    let response = match state
        .client
        .post(&state.config.endpoint)
        .query(&[("key", api_key.as_str())])
        .json(&body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            log::error!("model proxy upstream call failed: {}", err);
            return HttpResponse::InternalServerError()
                .json(json!({ "error": "failed to reach model service" }));
        }
    };

    let status = response.status();
    let payload: Value = response.json().await.unwrap_or(Value::Null);

    if !status.is_success() {
        log::warn!("upstream responded with {}: {}", status, payload);
        let passthrough =
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return HttpResponse::build(passthrough).json(json!({
            "error": format!("upstream responded with {}", status.as_u16()),
            "details": payload,
        }));
    }

    match extract_candidate_text(&payload) {
        Some(reply) => HttpResponse::Ok().json(json!({ "reply": reply })),
        None => {
            log::error!("unexpected upstream response shape: {}", payload);
            HttpResponse::InternalServerError()
                .json(json!({ "error": "unexpected response from model service" }))
        }
    }
}

/// Anything but POST on the proxy path.
pub async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(json!({ "error": "method not allowed" }))
}
