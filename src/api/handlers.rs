//! API HTTP 处理器

use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    response::{IntoResponse, Response},
};

use crate::auth::Identity;
use crate::store::StoreError;

use super::middleware::AppState;
use super::types::{ApiError, HistoryQuery, OptimizeRequest, SuccessResponse};

/// POST /api/optimize
/// 优化提示词并保存结果
pub async fn optimize(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(e) => return ApiError::invalid_input(e.body_text()).into_response(),
    };

    state
        .handler
        .handle(Some(&identity), &payload.prompt)
        .await
        .into_response()
}

/// GET /api/history
/// 分页获取当前用户的历史记录
pub async fn list_history(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(e) => return ApiError::invalid_input(e.body_text()).into_response(),
    };

    match state
        .store
        .list(identity.as_str(), query.page(), query.page_size())
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(e) => storage_error("查询历史记录失败", e).into_response(),
    }
}

/// GET /api/history/{id}
pub async fn get_history(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    let Path(id) = match id {
        Ok(id) => id,
        Err(e) => return ApiError::invalid_input(e.body_text()).into_response(),
    };
    match state.store.get(identity.as_str(), id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => ApiError::not_found(format!("记录 #{} 不存在", id)).into_response(),
        Err(e) => storage_error("读取历史记录失败", e).into_response(),
    }
}

/// DELETE /api/history/{id}
/// 只能删除自己的记录
pub async fn delete_history(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    id: Result<Path<i64>, PathRejection>,
) -> Response {
    let Path(id) = match id {
        Ok(id) => id,
        Err(e) => return ApiError::invalid_input(e.body_text()).into_response(),
    };
    match state.store.delete(identity.as_str(), id).await {
        Ok(true) => Json(SuccessResponse::new(format!("记录 #{} 已删除", id))).into_response(),
        Ok(false) => ApiError::not_found(format!("记录 #{} 不存在", id)).into_response(),
        Err(e) => storage_error("删除历史记录失败", e).into_response(),
    }
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

fn storage_error(action: &str, e: StoreError) -> ApiError {
    tracing::error!("{}: {}", action, e);
    ApiError::unavailable(format!("{}: 存储暂时不可用", action))
}
