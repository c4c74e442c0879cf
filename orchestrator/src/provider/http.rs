//! OpenAI-compatible chat-completions adapter.
//!
//! Works against any backend exposing `/v1/chat/completions` (OpenAI, vLLM,
//! llama.cpp server, OpenRouter, ...). The model is asked to answer with a
//! JSON object carrying `result` and `confidence`; when it does, the
//! confidence becomes the self-reported quality signal.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ProviderAdapter, ProviderCall, ProviderError, ProviderReply, ProviderResult};
use crate::config::ProviderEndpoint;

const DEFAULT_SYSTEM_PROMPT: &str = "You are an analysis backend for a catering planning \
system. Answer with a single JSON object of the form \
{\"result\": <your answer>, \"confidence\": <number between 0 and 1>}.";

/// HTTP adapter for an OpenAI-style chat-completions endpoint.
pub struct OpenAiCompatibleProvider {
    name: String,
    url: String,
    model: String,
    api_key: Option<String>,
    key_required: bool,
    capabilities: Vec<String>,
    cost_per_1k_tokens: f64,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Build from config, resolving the API key from the environment.
    ///
    /// `timeout` caps the underlying HTTP client; the dispatcher enforces its
    /// own per-call timeout on top.
    pub fn from_endpoint(endpoint: &ProviderEndpoint, timeout: Duration) -> ProviderResult<Self> {
        let api_key = match &endpoint.api_key_env {
            Some(var) => match std::env::var(var) {
                Ok(key) if !key.is_empty() => Some(key),
                _ => {
                    tracing::warn!(provider = %endpoint.name, env = %var, "API key not set");
                    None
                }
            },
            None => None,
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        Ok(Self {
            name: endpoint.name.clone(),
            url: endpoint.url.clone(),
            model: endpoint.model.clone(),
            api_key,
            key_required: endpoint.api_key_env.is_some(),
            capabilities: endpoint.capabilities.clone(),
            cost_per_1k_tokens: endpoint.cost_per_1k_tokens,
            temperature: endpoint.temperature,
            max_tokens: endpoint.max_tokens,
            system_prompt: endpoint
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            client,
        })
    }

    fn build_request_body(&self, call: &ProviderCall) -> Value {
        let context = serde_json::to_string_pretty(&call.context).unwrap_or_default();
        let capabilities = if call.capability_tags.is_empty() {
            "none".to_string()
        } else {
            call.capability_tags.join(", ")
        };
        let user_prompt = format!(
            "## Task\n\n{}\n\n## Priority\n\n{}\n\n## Required capabilities\n\n{}\n\n## Context\n\n{}",
            call.task, call.task_priority, capabilities, context
        );

        json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature
        })
    }
}

/// Extract payload, quality, and token usage from a chat-completions body.
pub(crate) fn parse_completion(
    body: &Value,
    cost_per_1k_tokens: f64,
) -> ProviderResult<ProviderReply> {
    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| {
            ProviderError::ParseError("missing choices[0].message.content".to_string())
        })?;

    let tokens_used = body["usage"]["total_tokens"].as_u64().unwrap_or(0) as u32;
    let cost = f64::from(tokens_used) / 1000.0 * cost_per_1k_tokens;

    let (payload, quality) = match serde_json::from_str::<Value>(strip_code_fence(content)) {
        Ok(Value::Object(map)) => {
            let quality = map.get("confidence").and_then(Value::as_f64);
            let payload = map
                .get("result")
                .cloned()
                .unwrap_or_else(|| Value::Object(map.clone()));
            (payload, quality)
        }
        _ => (Value::String(content.to_string()), None),
    };

    Ok(ProviderReply {
        payload,
        quality,
        cost,
        tokens_used,
    })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    async fn invoke(&self, call: &ProviderCall) -> ProviderResult<ProviderReply> {
        if self.key_required && self.api_key.is_none() {
            return Err(ProviderError::Unavailable(format!(
                "no API key configured for {}",
                self.name
            )));
        }

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&self.build_request_body(call));
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0);
            return Err(ProviderError::RateLimited(Duration::from_secs(retry_after)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(format!(
                "{} API error ({}): {}",
                self.name, status, body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        parse_completion(&body, self.cost_per_1k_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskRequest;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accept one connection, answer with `response`, and hand back the raw request.
    async fn serve_once(response: String) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/chat/completions", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if request_complete(&buf) {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        });
        (url, handle)
    }

    fn request_complete(buf: &[u8]) -> bool {
        let text = String::from_utf8_lossy(buf);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        buf.len() >= header_end + 4 + content_length
    }

    fn http_response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            extra_headers,
            body.len(),
            body
        )
    }

    fn stub_provider(url: String, api_key_env: Option<&str>) -> OpenAiCompatibleProvider {
        let mut endpoint = endpoint();
        endpoint.url = url;
        endpoint.api_key_env = api_key_env.map(str::to_string);
        let mut provider =
            OpenAiCompatibleProvider::from_endpoint(&endpoint, Duration::from_secs(5)).unwrap();
        // loopback stub must not go through a proxy from the environment
        provider.client = reqwest::Client::builder().no_proxy().build().unwrap();
        provider
    }

    fn any_call() -> ProviderCall {
        ProviderCall::from_request(
            &TaskRequest::new("recipe-analysis", json!({"dish": "paella"})),
            Duration::from_secs(5),
        )
    }

    fn endpoint() -> ProviderEndpoint {
        ProviderEndpoint {
            name: "local".to_string(),
            url: "http://localhost:8080/v1/chat/completions".to_string(),
            model: "qwen2.5-14b".to_string(),
            api_key_env: None,
            capabilities: vec!["recipe-analysis".to_string()],
            cost_per_1k_tokens: 0.5,
            temperature: 0.2,
            max_tokens: 512,
            system_prompt: None,
        }
    }

    #[test]
    fn test_parse_json_content_with_confidence() {
        let body = json!({
            "choices": [{"message": {"content": "{\"result\": {\"allergens\": [\"nuts\"]}, \"confidence\": 0.82}"}}],
            "usage": {"total_tokens": 2000}
        });
        let reply = parse_completion(&body, 0.5).unwrap();
        assert_eq!(reply.quality, Some(0.82));
        assert_eq!(reply.payload, json!({"allergens": ["nuts"]}));
        assert_eq!(reply.tokens_used, 2000);
        assert!((reply.cost - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_fenced_json() {
        let body = json!({
            "choices": [{"message": {"content": "```json\n{\"result\": 3, \"confidence\": 0.4}\n```"}}]
        });
        let reply = parse_completion(&body, 0.0).unwrap();
        assert_eq!(reply.payload, json!(3));
        assert_eq!(reply.quality, Some(0.4));
    }

    #[test]
    fn test_parse_plain_text_has_no_quality() {
        let body = json!({"choices": [{"message": {"content": "Serve the risotto warm."}}]});
        let reply = parse_completion(&body, 0.0).unwrap();
        assert_eq!(reply.payload, json!("Serve the risotto warm."));
        assert_eq!(reply.quality, None);
    }

    #[test]
    fn test_parse_missing_content_is_error() {
        let err = parse_completion(&json!({"error": "boom"}), 0.0).unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)));
    }

    #[test]
    fn test_request_body_carries_model_and_task() {
        let provider =
            OpenAiCompatibleProvider::from_endpoint(&endpoint(), Duration::from_secs(5)).unwrap();
        let call = ProviderCall::from_request(
            &TaskRequest::new("recipe-analysis", json!({"dish": "paella"})),
            Duration::from_secs(5),
        );
        let body = provider.build_request_body(&call);
        assert_eq!(body["model"], "qwen2.5-14b");
        assert_eq!(body["max_tokens"], 512);
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("recipe-analysis"));
        assert!(user.contains("paella"));
    }

    #[tokio::test]
    async fn test_https_without_key_is_unavailable() {
        let mut endpoint = endpoint();
        endpoint.url = "https://api.example.com/v1/chat/completions".to_string();
        endpoint.api_key_env = Some("ORCHESTRATOR_TEST_UNSET_KEY".to_string());
        let provider =
            OpenAiCompatibleProvider::from_endpoint(&endpoint, Duration::from_secs(5)).unwrap();
        let call = ProviderCall::from_request(
            &TaskRequest::new("recipe-analysis", json!({})),
            Duration::from_secs(5),
        );
        let err = provider.invoke(&call).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
    }

    #[test]
    fn test_https_without_key_env_needs_no_key() {
        let mut endpoint = endpoint();
        endpoint.url = "https://llm.internal.example/v1/chat/completions".to_string();
        let provider =
            OpenAiCompatibleProvider::from_endpoint(&endpoint, Duration::from_secs(5)).unwrap();
        assert!(!provider.key_required);
    }

    #[tokio::test]
    async fn test_invoke_sends_bearer_and_parses_reply() {
        std::env::set_var("ORCHESTRATOR_TEST_HTTP_BEARER_KEY", "sk-test-123");
        let body = json!({
            "choices": [{"message": {"content": "{\"result\": \"ok\", \"confidence\": 0.6}"}}],
            "usage": {"total_tokens": 1000}
        })
        .to_string();
        let (url, server) = serve_once(http_response("200 OK", "", &body)).await;
        let provider = stub_provider(url, Some("ORCHESTRATOR_TEST_HTTP_BEARER_KEY"));

        let reply = provider.invoke(&any_call()).await.unwrap();
        assert_eq!(reply.payload, json!("ok"));
        assert_eq!(reply.quality, Some(0.6));
        assert!((reply.cost - 0.5).abs() < 1e-12);

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("post /v1/chat/completions"));
        assert!(request.contains("authorization: bearer sk-test-123"));
        assert!(request.contains("qwen2.5-14b"));
    }

    #[tokio::test]
    async fn test_invoke_maps_429_to_rate_limited() {
        let (url, server) = serve_once(http_response(
            "429 Too Many Requests",
            "Retry-After: 7\r\n",
            "{}",
        ))
        .await;
        let provider = stub_provider(url, None);

        let err = provider.invoke(&any_call()).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited(d) if d == Duration::from_secs(7)));
        let request = server.await.unwrap().to_lowercase();
        assert!(!request.contains("authorization:"));
    }

    #[tokio::test]
    async fn test_invoke_maps_server_error_to_request_failed() {
        let (url, server) = serve_once(http_response(
            "500 Internal Server Error",
            "",
            "{\"error\": \"model crashed\"}",
        ))
        .await;
        let provider = stub_provider(url, None);

        let err = provider.invoke(&any_call()).await.unwrap_err();
        match err {
            ProviderError::RequestFailed(message) => {
                assert!(message.contains("500"));
                assert!(message.contains("model crashed"));
            }
            other => panic!("expected RequestFailed, got {:?}", other),
        }
        server.await.unwrap();
    }
}
