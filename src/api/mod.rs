//! HTTP API 模块
//!
//! # 端点
//! - `POST /api/optimize` - 优化提示词
//! - `GET /api/history` - 分页列出自己的历史记录
//! - `GET /api/history/{id}` - 读取单条记录
//! - `DELETE /api/history/{id}` - 删除单条记录
//! - `GET /health` - 存活检查（无需认证）

mod handlers;
mod middleware;
mod router;
pub mod types;

pub use middleware::{AppState, cors_layer};
pub use router::create_router;
