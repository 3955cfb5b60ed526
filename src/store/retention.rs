//! 保留策略后台清理
//!
//! 请求路径上写入后会按用户裁剪一次；这里的定期任务兜底处理
//! 裁剪失败或上限调小后遗留的旧记录。

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::SubmissionStore;

/// 执行一轮全量清理
pub async fn sweep_once(store: &dyn SubmissionStore, cap: usize) -> u64 {
    match store.sweep_retention(cap).await {
        Ok(removed) => {
            if removed > 0 {
                tracing::info!(removed = removed, cap = cap, "已按保留上限清理旧记录");
            }
            removed
        }
        Err(e) => {
            tracing::warn!("保留策略清理失败: {}", e);
            0
        }
    }
}

/// 启动定期清理任务
pub fn start_retention_task(
    store: Arc<dyn SubmissionStore>,
    cap: usize,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);
        loop {
            interval_timer.tick().await;
            sweep_once(store.as_ref(), cap).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{UnreachableStore, sample_result};
    use crate::store::{NewSubmission, SqliteSubmissionStore};
    use chrono::Utc;

    #[tokio::test]
    async fn test_sweep_once_trims_every_user() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();
        for user in ["alice", "bob"] {
            for i in 0..4 {
                store
                    .append(NewSubmission {
                        user_id: user.to_string(),
                        prompt: format!("p{}", i),
                        result: sample_result("r"),
                        created_at: Utc::now(),
                    })
                    .await
                    .unwrap();
            }
        }

        assert_eq!(sweep_once(&store, 3).await, 2);
        assert_eq!(sweep_once(&store, 3).await, 0);
    }

    #[tokio::test]
    async fn test_sweep_once_survives_store_failure() {
        assert_eq!(sweep_once(&UnreachableStore, 3).await, 0);
    }

    #[tokio::test]
    async fn test_retention_task_runs_periodically() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();
        for i in 0..3 {
            store
                .append(NewSubmission {
                    user_id: "alice".to_string(),
                    prompt: format!("p{}", i),
                    result: sample_result("r"),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let handle = start_retention_task(Arc::new(store.clone()), 1, Duration::from_millis(20));
        let mut total = u64::MAX;
        for _ in 0..100 {
            total = store.list("alice", 1, 10).await.unwrap().total;
            if total == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert_eq!(total, 1);
    }
}
