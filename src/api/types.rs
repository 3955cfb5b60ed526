//! API 请求/响应类型

use std::time::Duration;

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::optimizer::{FailReason, Outcome, RejectReason};
use crate::store::OptimizationResult;

/// 历史记录默认每页条数
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// 历史记录每页最大条数
pub const MAX_PAGE_SIZE: u32 = 50;

/// POST /api/optimize 请求体
#[derive(Debug, Deserialize)]
pub struct OptimizeRequest {
    pub prompt: String,
}

/// GET /api/history 查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl HistoryQuery {
    /// 页码从 1 开始
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

/// 操作成功响应
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// 错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// 已生成但未能保存的结果
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<OptimizationResult>,
}

/// 带状态码的 API 错误
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: ErrorDetail {
                    code,
                    message: message.into(),
                    retry_after_secs: None,
                    result: None,
                },
            },
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_INPUT", message)
    }

    pub fn authentication_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "AUTH_ERROR", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", message)
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        let secs = retry_after_secs(retry_after);
        let mut error = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMIT",
            format!("提交过于频繁，请在 {} 秒后重试", secs),
        );
        error.body.error.retry_after_secs = Some(secs);
        error
    }
}

/// 向上取整到秒，至少 1 秒
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = self.body.error.retry_after_secs;
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<RejectReason> for ApiError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::InvalidInput(msg) => Self::invalid_input(msg),
            RejectReason::Unauthenticated => Self::authentication_error("缺少有效的身份凭据"),
            RejectReason::RateLimited { retry_after } => Self::rate_limited(retry_after),
            RejectReason::QuotaUnavailable(msg) => Self::unavailable(msg),
        }
    }
}

impl From<FailReason> for ApiError {
    fn from(reason: FailReason) -> Self {
        match reason {
            FailReason::UpstreamRateLimited => {
                Self::new(StatusCode::BAD_GATEWAY, "API_ERROR", "上游服务限流")
            }
            FailReason::UpstreamAuthFailure => {
                Self::new(StatusCode::BAD_GATEWAY, "API_ERROR", "上游服务认证失败")
            }
            FailReason::MalformedUpstreamResponse(msg) => Self::new(
                StatusCode::BAD_GATEWAY,
                "API_ERROR",
                format!("上游响应无法解析: {}", msg),
            ),
            FailReason::UpstreamTimeout => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", "上游服务响应超时")
            }
            FailReason::UpstreamUnavailable(msg) => Self::unavailable(msg),
            FailReason::Persistence { result, message } => {
                let mut error = Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PERSISTENCE_ERROR",
                    format!("优化结果未能保存: {}", message),
                );
                error.body.error.result = Some(result);
                error
            }
        }
    }
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Outcome::Completed(record) => Json(record).into_response(),
            Outcome::Rejected(reason) => ApiError::from(reason).into_response(),
            Outcome::Failed(reason) => ApiError::from(reason).into_response(),
        }
    }
}
