//! 上游文本生成 API

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::common::truncate_with_ellipsis;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// 上游调用失败
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("上游请求超时")]
    Timeout,
    #[error("上游暂时不可用: {0}")]
    Unavailable(String),
    #[error("上游限流")]
    RateLimited,
    #[error("上游凭据无效: {0}")]
    Auth(String),
    #[error("上游拒绝请求 ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("上游响应格式错误: {0}")]
    Malformed(String),
}

impl UpstreamError {
    /// 只有超时和网络/服务端临时故障值得重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }
}

/// 文本生成后端
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// 以 `instruction` 作为系统指令、`prompt` 作为用户消息生成文本
    async fn generate(&self, instruction: &str, prompt: &str) -> Result<String, UpstreamError>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API 后端
pub struct AnthropicBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

/// 按 HTTP 状态码归类上游错误
fn classify_status(status: StatusCode, body: &str) -> UpstreamError {
    let message = truncate_with_ellipsis(body, 256);
    match status.as_u16() {
        401 | 403 => UpstreamError::Auth(message),
        429 => UpstreamError::RateLimited,
        408 | 500..=599 => UpstreamError::Unavailable(format!("HTTP {}: {}", status.as_u16(), message)),
        code => UpstreamError::Rejected {
            status: code,
            message,
        },
    }
}

fn classify_transport(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout
    } else {
        UpstreamError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl GenerationBackend for AnthropicBackend {
    async fn generate(&self, instruction: &str, prompt: &str) -> Result<String, UpstreamError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: instruction,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        let text = response.text().await.map_err(classify_transport)?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "上游返回错误状态");
            return Err(classify_status(status, &text));
        }

        #[cfg(feature = "sensitive-logs")]
        tracing::debug!(body = %text, "上游响应体");

        let parsed: MessagesResponse =
            serde_json::from_str(&text).map_err(|e| UpstreamError::Malformed(e.to_string()))?;

        let content: String = parsed
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text)
            .collect();

        if content.trim().is_empty() {
            return Err(UpstreamError::Malformed("响应中没有文本内容".to_string()));
        }

        Ok(content)
    }
}
