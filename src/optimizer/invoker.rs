//! 优化调用器：输入校验、带超时与重试的上游调用、回复解析

use std::sync::Arc;
use std::time::Duration;

use crate::common::fingerprint;
use crate::model::config::Config;
use crate::store::OptimizationResult;

use super::backend::{GenerationBackend, UpstreamError};
use super::parse::parse_optimization;
use super::template::OPTIMIZATION_INSTRUCTION;

/// 调用器配置
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// 提示词最大字符数
    pub max_prompt_chars: usize,
    /// 单次尝试超时
    pub timeout: Duration,
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 重试退避基准
    pub backoff_base: Duration,
    /// 重试退避上限
    pub backoff_max: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: 2000,
            timeout: Duration::from_secs(15),
            max_attempts: 3,
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(2),
        }
    }
}

impl InvokerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_prompt_chars: config.prompt_max_length,
            timeout: config.upstream_timeout(),
            max_attempts: config.upstream_max_attempts,
            ..Self::default()
        }
    }

    /// 第 `attempt` 次失败后的等待时间（指数退避 + 抖动）
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .backoff_base
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
        let capped = exp.min(self.backoff_max);
        let half = capped / 2;
        let jitter_ms = fastrand::u64(0..=half.as_millis() as u64);
        half + Duration::from_millis(jitter_ms)
    }
}

/// 调用失败分类
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    #[error("输入无效: {0}")]
    InvalidInput(String),
    #[error("上游限流")]
    RateLimitedByUpstream,
    #[error("上游认证失败")]
    AuthenticationFailed,
    #[error("上游响应无法解析: {0}")]
    MalformedUpstreamResponse(String),
    #[error("上游请求超时")]
    Timeout,
    #[error("上游不可用: {0}")]
    Unavailable(String),
}

impl From<UpstreamError> for InvokeError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::Timeout => Self::Timeout,
            UpstreamError::Unavailable(msg) => Self::Unavailable(msg),
            UpstreamError::RateLimited => Self::RateLimitedByUpstream,
            UpstreamError::Auth(_) => Self::AuthenticationFailed,
            UpstreamError::Rejected { status, message } => {
                Self::MalformedUpstreamResponse(format!("HTTP {}: {}", status, message))
            }
            UpstreamError::Malformed(msg) => Self::MalformedUpstreamResponse(msg),
        }
    }
}

/// 校验提示词，返回去除首尾空白后的文本
pub fn validate_prompt(raw: &str, max_chars: usize) -> Result<&str, InvokeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InvokeError::InvalidInput("提示词不能为空".to_string()));
    }
    let chars = trimmed.chars().count();
    if chars > max_chars {
        return Err(InvokeError::InvalidInput(format!(
            "提示词过长: {} 字符，最多 {} 字符",
            chars, max_chars
        )));
    }
    Ok(trimmed)
}

/// 优化调用器
#[derive(Clone)]
pub struct OptimizationInvoker {
    backend: Arc<dyn GenerationBackend>,
    config: InvokerConfig,
}

impl OptimizationInvoker {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: InvokerConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &InvokerConfig {
        &self.config
    }

    /// 将原始提示词交给上游优化并解析结果
    ///
    /// 输入不合法时直接返回，不产生上游调用
    pub async fn optimize(&self, raw_prompt: &str) -> Result<OptimizationResult, InvokeError> {
        let prompt = validate_prompt(raw_prompt, self.config.max_prompt_chars)?;
        let prompt_id = fingerprint(prompt);
        let max_attempts = self.config.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match tokio::time::timeout(
                self.config.timeout,
                self.backend.generate(OPTIMIZATION_INSTRUCTION, prompt),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(UpstreamError::Timeout),
            };

            match outcome {
                Ok(text) => {
                    return parse_optimization(&text).map_err(|e| {
                        tracing::warn!(prompt = %prompt_id, "上游回复解析失败: {}", e);
                        InvokeError::MalformedUpstreamResponse(e.to_string())
                    });
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.backoff(attempt);
                    tracing::warn!(
                        prompt = %prompt_id,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "上游调用失败，准备重试: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(
                        prompt = %prompt_id,
                        attempt = attempt,
                        "上游调用失败: {}",
                        e
                    );
                    return Err(e.into());
                }
            }
        }
    }
}
