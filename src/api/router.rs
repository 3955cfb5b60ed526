//! API 路由配置

use axum::{
    Router, middleware,
    routing::{get, post},
};

use super::handlers::{delete_history, get_history, health, list_history, optimize};
use super::middleware::{AppState, auth_middleware, cors_layer};

/// 创建应用路由
///
/// `/api/*` 需要 `Authorization: Bearer <token>`，`/health` 不需要
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/optimize", post(optimize))
        .route("/history", get(list_history))
        .route("/history/{id}", get(get_history).delete(delete_history))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(cors_layer())
}
