use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelRequest {
    pub model: String,
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelResponse {
    pub content: String,
    pub model: String,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, req: ModelRequest) -> anyhow::Result<ModelResponse>;
}

#[derive(Clone)]
pub struct OpenAICompatible {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl OpenAICompatible {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            api_key,
            http,
        })
    }
}

#[derive(Debug, Serialize)]
struct OaiChatRequest<'a> {
    model: &'a str,
    messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OaiChatResponse {
    choices: Vec<OaiChoice>,
    #[serde(default)]
    model: String,
}

#[derive(Debug, Deserialize)]
struct OaiChoice {
    message: OaiMessage,
}

#[derive(Debug, Deserialize)]
struct OaiMessage {
    content: String,
}

#[async_trait]
impl LanguageModel for OpenAICompatible {
    async fn generate(&self, req: ModelRequest) -> anyhow::Result<ModelResponse> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut messages = Vec::new();
        if let Some(system) = &req.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": req.prompt}));
        let body = OaiChatRequest {
            model: &req.model,
            messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };
        let mut rb = self.http.post(url).json(&body);
        if let Some(key) = &self.api_key {
            rb = rb.bearer_auth(key);
        }
        let resp = rb.send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("model call failed: {}", resp.status());
        }
        let v: OaiChatResponse = resp.json().await?;
        let content = v
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();
        Ok(ModelResponse {
            content,
            model: v.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};

    async fn spawn_stub(body: serde_json::Value, status: u16) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/chat/completions",
            post(move || {
                let body = body.clone();
                async move {
                    (
                        axum::http::StatusCode::from_u16(status).unwrap(),
                        Json(body),
                    )
                }
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn generate_returns_first_choice() {
        let base = spawn_stub(
            serde_json::json!({
                "choices": [{"message": {"content": "pong"}}],
                "model": "stub-model"
            }),
            200,
        )
        .await;
        let client = OpenAICompatible::new(base, None, Duration::from_secs(5)).unwrap();
        let resp = client
            .generate(ModelRequest {
                model: "stub-model".into(),
                prompt: "ping".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(resp.content, "pong");
        assert_eq!(resp.model, "stub-model");
    }

    #[tokio::test]
    async fn generate_surfaces_http_failure() {
        let base = spawn_stub(serde_json::json!({"error": "quota"}), 429).await;
        let client = OpenAICompatible::new(base, Some("key".into()), Duration::from_secs(5)).unwrap();
        let err = client
            .generate(ModelRequest {
                model: "stub-model".into(),
                prompt: "ping".into(),
                ..Default::default()
            })
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("model call failed"));
    }
}
