//! OpenAI-compatible chat-completions adapter (§6).
//!
//! Works against the `OpenAI` API, LM Studio, vLLM, Ollama's
//! `OpenAI`-compatibility layer, or any endpoint that speaks the
//! `/v1/chat/completions` shape. Tool calls are never sent as native
//! `tools`/`tool_calls` — per spec.md §4.C the model emits them as free
//! text inside its reply, which [`crate::parser`]-equivalent logic
//! upstream (in `ggcode-runtime`) extracts.

use std::time::Duration;

use async_trait::async_trait;
use ggcode_core::{LegacyMessage, Role};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{LlmError, LlmResult};
use crate::provider::{ChatOptions, LlmProvider, OnChunk};

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_secs(2);

/// OpenAI-compatible chat-completions provider.
pub struct OpenAiCompatProvider {
    client: Client,
    model: String,
    base_url: String,
    api_key: Option<String>,
    max_context: usize,
}

impl OpenAiCompatProvider {
    /// Build a provider targeting the public `OpenAI` API.
    #[must_use]
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let max_context = match model.as_str() {
            m if m.contains("gpt-4o") || m.contains("gpt-4-turbo") => 128_000,
            m if m.contains("gpt-4-32k") => 32_768,
            m if m.contains("gpt-4") => 8_192,
            m if m.contains("gpt-3.5-turbo") => 16_385,
            _ => 8_192,
        };
        Self {
            client: Client::new(),
            model,
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: Some(api_key.into()),
            max_context,
        }
    }

    /// Build a provider against a local endpoint (LM Studio, Ollama, …)
    /// that typically requires no credential.
    #[must_use]
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            base_url: base_url.into(),
            api_key: None,
            max_context: 32_768,
        }
    }

    /// Fully custom endpoint.
    #[must_use]
    pub fn custom(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>, max_context: usize) -> Self {
        Self {
            client: Client::new(),
            model: model.into(),
            base_url: base_url.into(),
            api_key,
            max_context,
        }
    }

    fn build_request(&self, system: &str, messages: &[LegacyMessage], options: &ChatOptions, stream: bool) -> Value {
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
        if let Some(rp) = options.repetition_penalty {
            body["frequency_penalty"] = serde_json::json!((rp - 1.0).clamp(-2.0, 2.0));
        }
        body
    }

    fn request_builder(&self, body: &Value) -> LlmResult<reqwest::RequestBuilder> {
        let mut req = self
            .client
            .post(&self.base_url)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            let mut value = reqwest::header::HeaderValue::try_from(format!("Bearer {key}"))
                .map_err(|e| LlmError::AuthFailed(e.to_string()))?;
            value.set_sensitive(true);
            req = req.header("Authorization", value);
        } else if !is_local_url(&self.base_url) {
            return Err(LlmError::AuthFailed("no API key configured".into()));
        }
        Ok(req.json(body))
    }

    async fn send_once(&self, system: &str, messages: &[LegacyMessage], options: &ChatOptions, mut on_chunk: Option<OnChunk<'_>>) -> LlmResult<String> {
        if options.abort.as_ref().is_some_and(tokio_util::sync::CancellationToken::is_cancelled) {
            return Err(LlmError::Aborted);
        }
        let body = self.build_request(system, messages, options, options.stream);
        let req = self.request_builder(&body)?;
        let timeout = options.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let response = tokio::time::timeout(timeout, req.send())
            .await
            .map_err(|_| LlmError::Timeout(timeout))?
            .map_err(classify_reqwest_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_http_error(status.as_u16(), &body_text));
        }

        if options.stream {
            self.consume_stream(response, options, on_chunk.as_deref_mut()).await
        } else {
            let parsed: ChatCompletionResponse = response
                .json()
                .await
                .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;
            let text = parsed
                .choices
                .first()
                .and_then(|c| c.message.content.clone())
                .unwrap_or_default();
            if text.trim().is_empty() {
                return Err(LlmError::BlankContent);
            }
            if let Some(cb) = on_chunk.as_deref_mut() {
                cb(&text);
            }
            Ok(text)
        }
    }

    async fn consume_stream(&self, response: reqwest::Response, options: &ChatOptions, mut on_chunk: Option<OnChunk<'_>>) -> LlmResult<String> {
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
                    if let Ok(parsed) = serde_json::from_str::<ChatCompletionChunk>(data) {
                        if let Some(choice) = parsed.choices.first() {
                            if let Some(delta) = &choice.delta.content {
                                if !delta.is_empty() {
                                    accumulated.push_str(delta);
                                    if let Some(cb) = on_chunk.as_deref_mut() {
                                        cb(delta);
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

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn is_local_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("localhost") || lower.contains("127.0.0.1") || lower.contains("[::1]")
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
            let quota = body.to_lowercase().contains("quota") || body.to_lowercase().contains("insufficient");
            LlmError::RateLimit { quota }
        },
        _ => LlmError::MalformedResponse(format!("HTTP {status}: {body}")),
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_context_tokens(&self) -> usize {
        self.max_context
    }

    async fn chat(&self, system: &str, messages: &[LegacyMessage], options: &ChatOptions, mut on_chunk: Option<OnChunk<'_>>) -> LlmResult<String> {
        if messages.is_empty() && system.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        let mut attempt = 0u32;
        loop {
            debug!(model = %self.model, attempt, "dispatching chat completion request");
            match self.send_once(system, messages, options, on_chunk.as_deref_mut()).await {
                Ok(text) => return Ok(text),
                Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
                    let backoff = BACKOFF_BASE.saturating_mul(2u32.saturating_pow(attempt));
                    warn!(attempt, ?backoff, %err, "transient LLM error, retrying");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                },
                Err(err) => return Err(err),
            }
        }
    }
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChatChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChunkChoice {
    delta: ChatDelta,
}

#[derive(Debug, Deserialize)]
struct ChatDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_provider_has_no_api_key() {
        let p = OpenAiCompatProvider::local("http://localhost:1234/v1/chat/completions", "local-model");
        assert!(p.api_key.is_none());
        assert_eq!(p.model(), "local-model");
    }

    #[test]
    fn openai_provider_sizes_context_by_model() {
        let p = OpenAiCompatProvider::openai("sk-test", "gpt-4o");
        assert_eq!(p.max_context_tokens(), 128_000);
    }

    #[test]
    fn build_request_includes_system_and_messages() {
        let p = OpenAiCompatProvider::local("http://localhost:1234/v1/chat/completions", "m");
        let messages = vec![LegacyMessage::new(Role::User, "hi")];
        let body = p.build_request("be helpful", &messages, &ChatOptions::default(), false);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn is_local_url_detects_loopback() {
        assert!(is_local_url("http://localhost:1234/v1"));
        assert!(is_local_url("http://127.0.0.1:8080"));
        assert!(!is_local_url("https://api.openai.com/v1"));
    }

    #[test]
    fn classify_http_error_distinguishes_quota_from_concurrency() {
        assert!(matches!(classify_http_error(429, "quota exceeded"), LlmError::RateLimit { quota: true }));
        assert!(matches!(classify_http_error(429, "too many concurrent requests"), LlmError::RateLimit { quota: false }));
        assert!(matches!(classify_http_error(401, "bad key"), LlmError::AuthFailed(_)));
    }

    #[tokio::test]
    async fn missing_api_key_on_remote_url_fails_fast() {
        let p = OpenAiCompatProvider::custom("https://example.com/v1/chat/completions", None, "m", 8192);
        let err = p.chat("", &[LegacyMessage::new(Role::User, "hi")], &ChatOptions::default(), None).await.unwrap_err();
        assert!(matches!(err, LlmError::AuthFailed(_)));
    }
}
