//! Double-wrapped enterprise-gateway adapter (§6).
//!
//! Several internal LLM gateways front the underlying model API behind a
//! generic RPC envelope: the HTTP response carries a `C-Api-Status` header
//! that must read `"00"`, and the JSON body carries a business `code`
//! (`"20000"` on success) alongside a `data` field holding the *actual*
//! payload JSON-encoded as a string, one more decode step than a plain
//! REST response. This adapter unwraps both layers before exposing the
//! same [`LlmProvider`] contract as [`crate::openai_compat`].
//!
//! The envelope shape itself has no precedent in this workspace's source
//! material; it exists to satisfy spec.md §6's double-wrapped gateway
//! requirement. The reqwest/SSE/backoff scaffolding around it mirrors
//! [`crate::openai_compat`]'s adapter in this same crate.

use std::time::Duration;

use async_trait::async_trait;
use ggcode_core::{LegacyMessage, Role};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{LlmError, LlmResult};
use crate::provider::{ChatOptions, LlmProvider, OnChunk};

const STATUS_HEADER: &str = "C-Api-Status";
const STATUS_OK: &str = "00";
const CODE_OK: &str = "20000";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Adapter for a double-wrapped enterprise gateway endpoint.
pub struct EnterpriseProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_context: usize,
}

impl EnterpriseProvider {
    /// Build a provider against `endpoint`, authenticating with `api_key`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, max_context: usize) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_context,
        }
    }

    fn inner_request(&self, system: &str, messages: &[LegacyMessage], options: &ChatOptions, stream: bool) -> Value {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        if !system.is_empty() {
            wire.push(serde_json::json!({ "role": "system", "content": system }));
        }
        for m in messages {
            wire.push(serde_json::json!({ "role": role_str(m.role), "content": m.content }));
        }
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": wire,
            "stream": stream,
        });
        if let Some(t) = options.temperature {
            body["temperature"] = serde_json::json!(t);
        }
        if let Some(p) = options.top_p {
            body["top_p"] = serde_json::json!(p);
        }
        if let Some(k) = options.top_k {
            body["top_k"] = serde_json::json!(k);
        }
        body
    }

    /// Wrap the inner request in the gateway's outer envelope: the inner
    /// payload travels JSON-encoded-as-a-string, mirroring how the
    /// response comes back.
    fn build_envelope(&self, inner: &Value) -> Value {
        serde_json::json!({
            "apiKey": self.api_key,
            "data": inner.to_string(),
        })
    }

    async fn send_once(&self, system: &str, messages: &[LegacyMessage], options: &ChatOptions, mut on_chunk: Option<OnChunk<'_>>) -> LlmResult<String> {
        if options.abort.as_ref().is_some_and(tokio_util::sync::CancellationToken::is_cancelled) {
            return Err(LlmError::Aborted);
        }
        let inner = self.inner_request(system, messages, options, options.stream);
        let envelope = self.build_envelope(&inner);
        let timeout = options.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let response = tokio::time::timeout(
            timeout,
            self.client.post(&self.endpoint).header("Content-Type", "application/json").json(&envelope).send(),
        )
        .await
        .map_err(|_| LlmError::Timeout(timeout))?
        .map_err(classify_reqwest_error)?;

        let status_header = response
            .headers()
            .get(STATUS_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !response.status().is_success() {
            let http_status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(http_status.as_u16(), &body_text));
        }

        if options.stream {
            self.consume_stream(response, &status_header, options, on_chunk.as_deref_mut()).await
        } else {
            let text = response.text().await.map_err(classify_reqwest_error)?;
            let envelope: OuterEnvelope = serde_json::from_str(&text).map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
            let payload = unwrap_envelope(&envelope, &status_header)?;
            let parsed: InnerPayload = serde_json::from_str(&payload).map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
            let content = parsed.choices.first().and_then(|c| c.message.content.clone()).unwrap_or_default();
            if content.trim().is_empty() {
                return Err(LlmError::BlankContent);
            }
            if let Some(cb) = on_chunk.as_deref_mut() {
                cb(&content);
            }
            Ok(content)
        }
    }

    async fn consume_stream(&self, response: reqwest::Response, status_header: &str, options: &ChatOptions, mut on_chunk: Option<OnChunk<'_>>) -> LlmResult<String> {
        use futures::StreamExt;

        let mut byte_stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut accumulated = String::new();

        while let Some(chunk) = byte_stream.next().await {
            if options.abort.as_ref().is_some_and(tokio_util::sync::CancellationToken::is_cancelled) {
                return Err(LlmError::Aborted);
            }
            let chunk = chunk.map_err(classify_reqwest_error)?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(event_end) = buffer.find("\n\n") {
                let event = buffer[..event_end].to_string();
                buffer.drain(..event_end + 2);
                for line in event.lines() {
                    let Some(data) = line.strip_prefix("data: ") else { continue };
                    if data.trim() == "[DONE]" {
                        return finish(accumulated);
                    }
                    let Ok(envelope) = serde_json::from_str::<OuterEnvelope>(data) else { continue };
                    let Ok(payload) = unwrap_envelope(&envelope, status_header) else { continue };
                    if let Ok(delta) = serde_json::from_str::<InnerDelta>(&payload) {
                        if let Some(choice) = delta.choices.first() {
                            if let Some(text) = &choice.delta.content {
                                if !text.is_empty() {
                                    accumulated.push_str(text);
                                    if let Some(cb) = on_chunk.as_deref_mut() {
                                        cb(text);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        finish(accumulated)
    }
}

fn finish(accumulated: String) -> LlmResult<String> {
    if accumulated.trim().is_empty() {
        return Err(LlmError::BlankContent);
    }
    Ok(accumulated)
}

/// Validate both envelope layers and return the still-encoded inner
/// payload string.
fn unwrap_envelope(envelope: &OuterEnvelope, status_header: &str) -> LlmResult<String> {
    if !status_header.is_empty() && status_header != STATUS_OK {
        return Err(LlmError::MalformedResponse(format!("unexpected {STATUS_HEADER}: {status_header}")));
    }
    if envelope.code != CODE_OK {
        return Err(LlmError::MalformedResponse(format!("business code {} ({})", envelope.code, envelope.message)));
    }
    envelope.data.clone().ok_or(LlmError::EmptyResponse)
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout(DEFAULT_TIMEOUT)
    } else {
        LlmError::NetworkError(err.to_string())
    }
}

fn classify_http_error(status: u16, body: &str) -> LlmError {
    match status {
        401 | 403 => LlmError::AuthFailed(body.to_string()),
        429 => {
            let quota = body.to_lowercase().contains("quota");
            LlmError::RateLimit { quota }
        },
        _ => LlmError::MalformedResponse(format!("HTTP {status}: {body}")),
    }
}

#[async_trait]
impl LlmProvider for EnterpriseProvider {
    fn name(&self) -> &str {
        "enterprise-gateway"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_context_tokens(&self) -> usize {
        self.max_context
    }

    async fn chat(&self, system: &str, messages: &[LegacyMessage], options: &ChatOptions, mut on_chunk: Option<OnChunk<'_>>) -> LlmResult<String> {
        if self.api_key.is_empty() {
            return Err(LlmError::AuthFailed("no API key configured".into()));
        }
        let mut attempt = 0u32;
        loop {
            debug!(model = %self.model, attempt, "dispatching enterprise gateway request");
            match self.send_once(system, messages, options, on_chunk.as_deref_mut()).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
                    let backoff = BACKOFF_BASE.saturating_mul(2u32.saturating_pow(attempt));
                    warn!(attempt, ?backoff, %err, "transient gateway error, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }
}

impl std::fmt::Debug for EnterpriseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnterpriseProvider")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct OuterEnvelope {
    code: String,
    #[serde(default)]
    message: String,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InnerPayload {
    choices: Vec<InnerChoice>,
}

#[derive(Debug, Deserialize)]
struct InnerChoice {
    message: InnerMessage,
}

#[derive(Debug, Deserialize)]
struct InnerMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InnerDelta {
    choices: Vec<InnerDeltaChoice>,
}

#[derive(Debug, Deserialize)]
struct InnerDeltaChoice {
    delta: InnerDeltaContent,
}

#[derive(Debug, Deserialize)]
struct InnerDeltaContent {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwrap_envelope_rejects_bad_status_header() {
        let envelope = OuterEnvelope {
            code: CODE_OK.to_string(),
            message: String::new(),
            data: Some("{}".to_string()),
        };
        let err = unwrap_envelope(&envelope, "99").unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn unwrap_envelope_rejects_bad_business_code() {
        let envelope = OuterEnvelope {
            code: "50000".to_string(),
            message: "internal error".to_string(),
            data: None,
        };
        let err = unwrap_envelope(&envelope, STATUS_OK).unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }

    #[test]
    fn unwrap_envelope_accepts_success() {
        let envelope = OuterEnvelope {
            code: CODE_OK.to_string(),
            message: "ok".to_string(),
            data: Some("{\"choices\":[]}".to_string()),
        };
        let payload = unwrap_envelope(&envelope, STATUS_OK).unwrap();
        assert_eq!(payload, "{\"choices\":[]}");
    }

    #[test]
    fn inner_request_carries_system_and_messages() {
        let provider = EnterpriseProvider::new("https://gateway.example/v1/chat", "key", "enterprise-model", 32_768);
        let messages = vec![LegacyMessage::new(Role::User, "hi")];
        let inner = provider.inner_request("be helpful", &messages, &ChatOptions::default(), false);
        assert_eq!(inner["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_api_key_fails_fast() {
        let provider = EnterpriseProvider::new("https://gateway.example/v1/chat", "", "m", 8192);
        let err = provider.chat("", &[LegacyMessage::new(Role::User, "hi")], &ChatOptions::default(), None).await.unwrap_err();
        assert!(matches!(err, LlmError::AuthFailed(_)));
    }
}
