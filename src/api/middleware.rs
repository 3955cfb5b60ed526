//! API 共享状态与中间件

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::TokenVerifier;
use crate::common::auth;
use crate::optimizer::RequestHandler;
use crate::store::SubmissionStore;

use super::types::ApiError;

/// API 共享状态
#[derive(Clone)]
pub struct AppState {
    /// 优化请求处理器
    pub handler: Arc<RequestHandler>,
    /// 历史记录存储
    pub store: Arc<dyn SubmissionStore>,
    /// Token 校验器
    pub verifier: Arc<TokenVerifier>,
}

impl AppState {
    pub fn new(
        handler: RequestHandler,
        store: Arc<dyn SubmissionStore>,
        verifier: TokenVerifier,
    ) -> Self {
        Self {
            handler: Arc::new(handler),
            store,
            verifier: Arc::new(verifier),
        }
    }
}

/// Bearer Token 认证中间件
///
/// 校验通过后把 [`crate::auth::Identity`] 放入请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = auth::extract_bearer_token(&request) else {
        return ApiError::authentication_error("Missing authorization token").into_response();
    };

    match state.verifier.verify(&token) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!("Token 校验失败: {}", e);
            ApiError::authentication_error("Invalid or expired token").into_response()
        }
    }
}

/// CORS 中间件层
///
/// 允许所有来源、方法和请求头
pub fn cors_layer() -> tower_http::cors::CorsLayer {
    use tower_http::cors::{Any, CorsLayer};

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
