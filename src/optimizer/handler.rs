//! 单次优化请求的编排
//!
//! 流程：Received → Validated → QuotaChecked → Invoking → Persisting → Completed。
//! 进入 Invoking 之前的失败记为 Rejected，之后的失败记为 Failed。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Identity;
use crate::clock::Clock;
use crate::common::{fingerprint, truncate_with_ellipsis};
use crate::gate::RateGate;
use crate::store::{NewSubmission, OptimizationResult, SubmissionRecord, SubmissionStore};

use super::invoker::{InvokeError, OptimizationInvoker, validate_prompt};

/// 请求所处阶段（用于日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Received,
    Validated,
    QuotaChecked,
    Invoking,
    Persisting,
    Completed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Received => "received",
            Phase::Validated => "validated",
            Phase::QuotaChecked => "quota_checked",
            Phase::Invoking => "invoking",
            Phase::Persisting => "persisting",
            Phase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// 调用上游之前的拒绝原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InvalidInput(String),
    Unauthenticated,
    RateLimited { retry_after: Duration },
    /// 限流存储不可达，按拒绝处理
    QuotaUnavailable(String),
}

/// 调用上游之后的失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
    UpstreamRateLimited,
    UpstreamAuthFailure,
    MalformedUpstreamResponse(String),
    UpstreamTimeout,
    UpstreamUnavailable(String),
    /// 结果已生成但未能保存
    Persistence {
        result: OptimizationResult,
        message: String,
    },
}

/// 请求终态
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(SubmissionRecord),
    Rejected(RejectReason),
    Failed(FailReason),
}

impl Outcome {
    /// 机器可读的原因码，成功时为 None
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Outcome::Completed(_) => None,
            Outcome::Rejected(reason) => Some(match reason {
                RejectReason::InvalidInput(_) => "INVALID_INPUT",
                RejectReason::Unauthenticated => "AUTH_ERROR",
                RejectReason::RateLimited { .. } => "RATE_LIMIT",
                RejectReason::QuotaUnavailable(_) => "UNAVAILABLE",
            }),
            Outcome::Failed(reason) => Some(match reason {
                FailReason::UpstreamRateLimited
                | FailReason::UpstreamAuthFailure
                | FailReason::MalformedUpstreamResponse(_) => "API_ERROR",
                FailReason::UpstreamTimeout => "TIMEOUT",
                FailReason::UpstreamUnavailable(_) => "UNAVAILABLE",
                FailReason::Persistence { .. } => "PERSISTENCE_ERROR",
            }),
        }
    }
}

impl From<InvokeError> for Outcome {
    fn from(e: InvokeError) -> Self {
        match e {
            InvokeError::InvalidInput(msg) => Outcome::Rejected(RejectReason::InvalidInput(msg)),
            InvokeError::RateLimitedByUpstream => Outcome::Failed(FailReason::UpstreamRateLimited),
            InvokeError::AuthenticationFailed => Outcome::Failed(FailReason::UpstreamAuthFailure),
            InvokeError::MalformedUpstreamResponse(msg) => {
                Outcome::Failed(FailReason::MalformedUpstreamResponse(msg))
            }
            InvokeError::Timeout => Outcome::Failed(FailReason::UpstreamTimeout),
            InvokeError::Unavailable(msg) => Outcome::Failed(FailReason::UpstreamUnavailable(msg)),
        }
    }
}

/// 优化请求处理器
///
/// 所有依赖（存储、时钟、上游）都由入口注入
#[derive(Clone)]
pub struct RequestHandler {
    gate: RateGate,
    invoker: OptimizationInvoker,
    store: Arc<dyn SubmissionStore>,
    clock: Arc<dyn Clock>,
    retention_cap: usize,
}

impl RequestHandler {
    pub fn new(
        gate: RateGate,
        invoker: OptimizationInvoker,
        store: Arc<dyn SubmissionStore>,
        clock: Arc<dyn Clock>,
        retention_cap: usize,
    ) -> Self {
        Self {
            gate,
            invoker,
            store,
            clock,
            retention_cap,
        }
    }

    /// 处理一次优化请求
    pub async fn handle(&self, identity: Option<&Identity>, raw_prompt: &str) -> Outcome {
        let request_id = uuid::Uuid::new_v4().to_string();
        let outcome = self.run(&request_id, identity, raw_prompt).await;

        match &outcome {
            Outcome::Completed(record) => tracing::info!(
                request_id = %request_id,
                record_id = record.id,
                "优化请求完成"
            ),
            Outcome::Rejected(reason) => tracing::info!(
                request_id = %request_id,
                reason = ?reason,
                "优化请求被拒绝"
            ),
            Outcome::Failed(FailReason::Persistence { message, .. }) => tracing::error!(
                request_id = %request_id,
                "优化结果已生成但保存失败: {}",
                message
            ),
            Outcome::Failed(reason) => tracing::warn!(
                request_id = %request_id,
                reason = ?reason,
                "优化请求失败"
            ),
        }
        outcome
    }

    async fn run(&self, request_id: &str, identity: Option<&Identity>, raw_prompt: &str) -> Outcome {
        trace_phase(request_id, Phase::Received);

        // Received → Validated
        let Some(identity) = identity else {
            return Outcome::Rejected(RejectReason::Unauthenticated);
        };
        let max_chars = self.invoker.config().max_prompt_chars;
        let prompt = match validate_prompt(raw_prompt, max_chars) {
            Ok(prompt) => prompt,
            Err(e) => return e.into(),
        };
        tracing::debug!(
            request_id = %request_id,
            user_id = %identity,
            prompt = %fingerprint(prompt),
            preview = %truncate_with_ellipsis(prompt, 48),
            "提示词校验通过"
        );
        trace_phase(request_id, Phase::Validated);

        // Validated → QuotaChecked
        let admission = match self.gate.admit(identity.as_str(), self.clock.now()).await {
            Ok(admission) => admission,
            Err(e) => return Outcome::Rejected(RejectReason::QuotaUnavailable(e.to_string())),
        };
        if !admission.allowed {
            return Outcome::Rejected(RejectReason::RateLimited {
                retry_after: admission.retry_after.unwrap_or(self.gate.cooldown()),
            });
        }
        trace_phase(request_id, Phase::QuotaChecked);

        // QuotaChecked → Invoking
        trace_phase(request_id, Phase::Invoking);
        let result = match self.invoker.optimize(prompt).await {
            Ok(result) => result,
            Err(e) => return e.into(),
        };

        // Invoking → Persisting
        trace_phase(request_id, Phase::Persisting);
        let submission = NewSubmission {
            user_id: identity.as_str().to_string(),
            prompt: raw_prompt.to_string(),
            result: result.clone(),
            created_at: self.clock.now(),
        };
        let record = match self.store.append(submission).await {
            Ok(record) => record,
            Err(e) => {
                return Outcome::Failed(FailReason::Persistence {
                    result,
                    message: e.to_string(),
                });
            }
        };

        // 裁剪失败不影响本次结果，由后台清理兜底
        match self.store.enforce_retention(identity.as_str(), self.retention_cap).await {
            Ok(removed) if removed > 0 => tracing::debug!(
                request_id = %request_id,
                removed = removed,
                "已裁剪超出保留上限的旧记录"
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!(request_id = %request_id, "裁剪旧记录失败: {}", e),
        }

        trace_phase(request_id, Phase::Completed);
        Outcome::Completed(record)
    }
}

fn trace_phase(request_id: &str, phase: Phase) {
    tracing::debug!(request_id = %request_id, phase = %phase, "请求阶段");
}
