//! 提交记录存储
//!
//! 同一张表同时承担历史记录和限流窗口（最近一次提交时间）两种用途

pub mod model;
pub mod retention;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use model::{HistoryPage, Improvement, NewSubmission, OptimizationResult, PromptStructure, SubmissionRecord};
pub use sqlite::SqliteSubmissionStore;

/// 存储层错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("数据库错误: {0}")]
    Sqlite(rusqlite::Error),
    #[error("后台任务失败: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("记录已损坏: {0}")]
    Corrupt(String),
    #[error("存储不可用: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        // 数据库被占用或无法打开属于暂时性故障
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::CannotOpen) => {
                Self::Unavailable(e.to_string())
            }
            _ => Self::Sqlite(e),
        }
    }
}

/// 提交记录存储接口
///
/// 所有查询都按用户隔离，一个用户无法读取或删除其他用户的记录
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// 追加一条记录
    async fn append(&self, submission: NewSubmission) -> Result<SubmissionRecord, StoreError>;

    /// 用户最近一次提交的时间
    async fn latest_created_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// 分页列出用户记录（新的在前）
    async fn list(&self, user_id: &str, page: u32, page_size: u32) -> Result<HistoryPage, StoreError>;

    async fn get(&self, user_id: &str, id: i64) -> Result<Option<SubmissionRecord>, StoreError>;

    /// 删除记录，返回是否存在
    async fn delete(&self, user_id: &str, id: i64) -> Result<bool, StoreError>;

    /// 只保留该用户最新的 `cap` 条记录，返回删除数量
    async fn enforce_retention(&self, user_id: &str, cap: usize) -> Result<u64, StoreError>;

    /// 对所有用户执行保留策略，返回删除数量
    async fn sweep_retention(&self, cap: usize) -> Result<u64, StoreError>;
}


/// 测试辅助
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    pub(crate) fn sample_result(tag: &str) -> OptimizationResult {
        let improvement = |n: u32| Improvement {
            title: format!("{} 改进 {}", tag, n),
            content: format!("内容 {}", n),
            category: "clarity".to_string(),
        };
        OptimizationResult {
            purpose: format!("{} 目的", tag),
            structure: PromptStructure {
                system: "你是一名资深编辑".to_string(),
                user: "请润色下面的文字".to_string(),
                format: "Markdown 列表".to_string(),
            },
            improvements: [improvement(1), improvement(2), improvement(3)],
        }
    }

    /// 所有操作都失败的存储（模拟数据库不可达）
    pub(crate) struct UnreachableStore;

    fn unreachable() -> StoreError {
        StoreError::Unavailable("connection refused".to_string())
    }

    #[async_trait]
    impl SubmissionStore for UnreachableStore {
        async fn append(&self, _: NewSubmission) -> Result<SubmissionRecord, StoreError> {
            Err(unreachable())
        }

        async fn latest_created_at(&self, _: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
            Err(unreachable())
        }

        async fn list(&self, _: &str, _: u32, _: u32) -> Result<HistoryPage, StoreError> {
            Err(unreachable())
        }

        async fn get(&self, _: &str, _: i64) -> Result<Option<SubmissionRecord>, StoreError> {
            Err(unreachable())
        }

        async fn delete(&self, _: &str, _: i64) -> Result<bool, StoreError> {
            Err(unreachable())
        }

        async fn enforce_retention(&self, _: &str, _: usize) -> Result<u64, StoreError> {
            Err(unreachable())
        }

        async fn sweep_retention(&self, _: usize) -> Result<u64, StoreError> {
            Err(unreachable())
        }
    }

    /// 可读但写入失败的存储（模拟持久化失败）
    pub(crate) struct ReadOnlyStore {
        pub(crate) inner: SqliteSubmissionStore,
    }

    #[async_trait]
    impl SubmissionStore for ReadOnlyStore {
        async fn append(&self, _: NewSubmission) -> Result<SubmissionRecord, StoreError> {
            Err(StoreError::Unavailable("disk I/O error".to_string()))
        }

        async fn latest_created_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
            self.inner.latest_created_at(user_id).await
        }

        async fn list(&self, user_id: &str, page: u32, page_size: u32) -> Result<HistoryPage, StoreError> {
            self.inner.list(user_id, page, page_size).await
        }

        async fn get(&self, user_id: &str, id: i64) -> Result<Option<SubmissionRecord>, StoreError> {
            self.inner.get(user_id, id).await
        }

        async fn delete(&self, user_id: &str, id: i64) -> Result<bool, StoreError> {
            self.inner.delete(user_id, id).await
        }

        async fn enforce_retention(&self, user_id: &str, cap: usize) -> Result<u64, StoreError> {
            self.inner.enforce_retention(user_id, cap).await
        }

        async fn sweep_retention(&self, cap: usize) -> Result<u64, StoreError> {
            self.inner.sweep_retention(cap).await
        }
    }
}
