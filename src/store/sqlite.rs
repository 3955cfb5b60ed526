//! SQLite 提交记录存储

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use super::model::{HistoryPage, NewSubmission, OptimizationResult, SubmissionRecord};
use super::{StoreError, SubmissionStore};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS submissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        prompt TEXT NOT NULL,
        result TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_submissions_user ON submissions(user_id, id);
    CREATE INDEX IF NOT EXISTS idx_submissions_user_created ON submissions(user_id, created_at);
    CREATE TABLE IF NOT EXISTS rate_windows (
        user_id TEXT PRIMARY KEY,
        last_accepted_at TEXT NOT NULL
    );
    INSERT OR IGNORE INTO rate_windows (user_id, last_accepted_at)
        SELECT user_id, MAX(created_at) FROM submissions GROUP BY user_id;";

/// 时间统一存为毫秒精度的 UTC RFC3339，保证字典序与时间序一致
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("无效的时间戳 {}: {}", raw, e)))
}

/// 数据库行（解析前）
struct RawRow {
    id: i64,
    user_id: String,
    prompt: String,
    result: String,
    created_at: String,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            prompt: row.get(2)?,
            result: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<SubmissionRecord, StoreError> {
        let result: OptimizationResult = serde_json::from_str(&self.result)
            .map_err(|e| StoreError::Corrupt(format!("记录 #{} 结果无法解析: {}", self.id, e)))?;
        Ok(SubmissionRecord {
            id: self.id,
            user_id: self.user_id,
            prompt: self.prompt,
            result,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// 底层 SQLite 存储（同步）
struct SqliteInner {
    conn: Mutex<Connection>,
}

impl SqliteInner {
    fn new(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn append(&self, submission: NewSubmission) -> Result<SubmissionRecord, StoreError> {
        let result_json = serde_json::to_string(&submission.result)
            .map_err(|e| StoreError::Corrupt(format!("序列化结果失败: {}", e)))?;
        let created_at = format_timestamp(&submission.created_at);

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO submissions (user_id, prompt, result, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![submission.user_id, submission.prompt, result_json, created_at],
        )?;
        let id = tx.last_insert_rowid();
        // 限流窗口单独记录，删除记录或裁剪历史都不会重置冷却
        tx.execute(
            "INSERT INTO rate_windows (user_id, last_accepted_at) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE
             SET last_accepted_at = MAX(last_accepted_at, excluded.last_accepted_at)",
            params![submission.user_id, created_at],
        )?;
        tx.commit()?;

        Ok(SubmissionRecord {
            id,
            user_id: submission.user_id,
            prompt: submission.prompt,
            result: submission.result,
            // 与读回的值保持一致（毫秒精度）
            created_at: parse_timestamp(&created_at)?,
        })
    }

    fn latest_created_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let conn = self.conn.lock();
        let latest: Option<String> = conn
            .query_row(
                "SELECT last_accepted_at FROM rate_windows WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()?;
        latest.as_deref().map(parse_timestamp).transpose()
    }

    fn list(&self, user_id: &str, page: u32, page_size: u32) -> Result<HistoryPage, StoreError> {
        let page = page.max(1);
        let offset = (page - 1) as i64 * page_size as i64;

        let conn = self.conn.lock();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM submissions WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT id, user_id, prompt, result, created_at FROM submissions
             WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
            .query_map(params![user_id, page_size as i64, offset], RawRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        let records = rows
            .into_iter()
            .map(RawRow::into_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HistoryPage {
            total: total as u64,
            page,
            page_size,
            records,
        })
    }

    fn get(&self, user_id: &str, id: i64) -> Result<Option<SubmissionRecord>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, user_id, prompt, result, created_at FROM submissions
                 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                RawRow::from_row,
            )
            .optional()?;
        row.map(RawRow::into_record).transpose()
    }

    fn delete(&self, user_id: &str, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let count = conn.execute(
            "DELETE FROM submissions WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(count > 0)
    }

    fn enforce_retention(&self, user_id: &str, cap: usize) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count = conn.execute(
            "DELETE FROM submissions WHERE user_id = ?1 AND id NOT IN (
                SELECT id FROM submissions WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2
            )",
            params![user_id, cap as i64],
        )?;
        Ok(count as u64)
    }

    fn sweep_retention(&self, cap: usize) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count = conn.execute(
            "DELETE FROM submissions WHERE id IN (
                SELECT id FROM (
                    SELECT id, ROW_NUMBER() OVER (PARTITION BY user_id ORDER BY id DESC) AS rn
                    FROM submissions
                ) WHERE rn > ?1
            )",
            [cap as i64],
        )?;
        Ok(count as u64)
    }
}

/// 基于 SQLite 的提交记录存储
///
/// 同步的 rusqlite 调用统一放到 `spawn_blocking` 上执行
#[derive(Clone)]
pub struct SqliteSubmissionStore {
    inner: Arc<SqliteInner>,
}

impl SqliteSubmissionStore {
    /// 打开（必要时创建）数据库文件
    pub fn open(db_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        Ok(Self {
            inner: Arc::new(SqliteInner::new(conn)?),
        })
    }

    /// 内存数据库
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            inner: Arc::new(SqliteInner::new(conn)?),
        })
    }
}

#[async_trait]
impl SubmissionStore for SqliteSubmissionStore {
    async fn append(&self, submission: NewSubmission) -> Result<SubmissionRecord, StoreError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.append(submission)).await?
    }

    async fn latest_created_at(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let inner = self.inner.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || inner.latest_created_at(&user_id)).await?
    }

    async fn list(&self, user_id: &str, page: u32, page_size: u32) -> Result<HistoryPage, StoreError> {
        let inner = self.inner.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || inner.list(&user_id, page, page_size)).await?
    }

    async fn get(&self, user_id: &str, id: i64) -> Result<Option<SubmissionRecord>, StoreError> {
        let inner = self.inner.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || inner.get(&user_id, id)).await?
    }

    async fn delete(&self, user_id: &str, id: i64) -> Result<bool, StoreError> {
        let inner = self.inner.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || inner.delete(&user_id, id)).await?
    }

    async fn enforce_retention(&self, user_id: &str, cap: usize) -> Result<u64, StoreError> {
        let inner = self.inner.clone();
        let user_id = user_id.to_string();
        tokio::task::spawn_blocking(move || inner.enforce_retention(&user_id, cap)).await?
    }

    async fn sweep_retention(&self, cap: usize) -> Result<u64, StoreError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.sweep_retention(cap)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::sample_result;
    use chrono::TimeZone;

    fn submission(user: &str, tag: &str, secs: i64) -> NewSubmission {
        NewSubmission {
            user_id: user.to_string(),
            prompt: format!("prompt {}", tag),
            result: sample_result(tag),
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_append_and_get_roundtrip() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();
        let saved = store.append(submission("alice", "a", 0)).await.unwrap();

        let loaded = store.get("alice", saved.id).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.result.improvements.len(), 3);
    }

    #[tokio::test]
    async fn test_latest_created_at_per_user() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();
        assert!(store.latest_created_at("alice").await.unwrap().is_none());

        store.append(submission("alice", "a1", 0)).await.unwrap();
        store.append(submission("alice", "a2", 40)).await.unwrap();
        store.append(submission("bob", "b1", 100)).await.unwrap();

        let latest = store.latest_created_at("alice").await.unwrap().unwrap();
        assert_eq!(latest, Utc.timestamp_opt(1_700_000_040, 0).unwrap());
    }

    #[tokio::test]
    async fn test_latest_created_at_survives_delete_and_retention() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();
        store.append(submission("alice", "a1", 0)).await.unwrap();
        let newest = store.append(submission("alice", "a2", 40)).await.unwrap();

        assert!(store.delete("alice", newest.id).await.unwrap());
        store.enforce_retention("alice", 0).await.unwrap();
        store.sweep_retention(0).await.unwrap();
        assert_eq!(store.list("alice", 1, 10).await.unwrap().total, 0);

        let latest = store.latest_created_at("alice").await.unwrap().unwrap();
        assert_eq!(latest, Utc.timestamp_opt(1_700_000_040, 0).unwrap());
    }

    #[tokio::test]
    async fn test_latest_created_at_never_moves_backwards() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();
        store.append(submission("alice", "late", 100)).await.unwrap();
        store.append(submission("alice", "early", 10)).await.unwrap();

        let latest = store.latest_created_at("alice").await.unwrap().unwrap();
        assert_eq!(latest, Utc.timestamp_opt(1_700_000_100, 0).unwrap());
    }

    #[test]
    fn test_rate_windows_backfilled_from_existing_rows() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE submissions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                prompt TEXT NOT NULL,
                result TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            INSERT INTO submissions (user_id, prompt, result, created_at)
                VALUES ('alice', 'p', '{}', '2023-11-14T22:13:20.000Z');",
        )
        .unwrap();

        let inner = SqliteInner::new(conn).unwrap();
        let latest = inner.latest_created_at("alice").unwrap().unwrap();
        assert_eq!(latest, Utc.timestamp_opt(1_700_000_000, 0).unwrap());
    }

    #[tokio::test]
    async fn test_records_are_isolated_by_owner() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();
        let saved = store.append(submission("alice", "a", 0)).await.unwrap();

        assert!(store.get("bob", saved.id).await.unwrap().is_none());
        assert!(!store.delete("bob", saved.id).await.unwrap());
        assert!(store.get("alice", saved.id).await.unwrap().is_some());

        assert!(store.delete("alice", saved.id).await.unwrap());
        assert!(store.get("alice", saved.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first_with_paging() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.append(submission("alice", &format!("p{}", i), i * 60)).await.unwrap();
        }

        let first = store.list("alice", 1, 2).await.unwrap();
        assert_eq!(first.total, 5);
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.records[0].prompt, "prompt p4");
        assert_eq!(first.records[1].prompt, "prompt p3");

        let last = store.list("alice", 3, 2).await.unwrap();
        assert_eq!(last.records.len(), 1);
        assert_eq!(last.records[0].prompt, "prompt p0");
    }

    #[tokio::test]
    async fn test_enforce_retention_keeps_newest() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();
        for i in 0..4 {
            store.append(submission("alice", &format!("p{}", i), i * 60)).await.unwrap();
        }
        store.append(submission("bob", "b", 0)).await.unwrap();

        let removed = store.enforce_retention("alice", 3).await.unwrap();
        assert_eq!(removed, 1);

        let page = store.list("alice", 1, 10).await.unwrap();
        let prompts: Vec<_> = page.records.iter().map(|r| r.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["prompt p3", "prompt p2", "prompt p1"]);
        assert_eq!(store.list("bob", 1, 10).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_sweep_retention_across_users() {
        let store = SqliteSubmissionStore::open_in_memory().unwrap();
        for i in 0..3 {
            store.append(submission("alice", &format!("a{}", i), i)).await.unwrap();
            store.append(submission("bob", &format!("b{}", i), i)).await.unwrap();
        }
        store.append(submission("carol", "c", 0)).await.unwrap();

        let removed = store.sweep_retention(2).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.list("alice", 1, 10).await.unwrap().total, 2);
        assert_eq!(store.list("bob", 1, 10).await.unwrap().total, 2);
        assert_eq!(store.list("carol", 1, 10).await.unwrap().total, 1);
    }

    #[test]
    fn test_timestamp_format_sorts_lexicographically() {
        let earlier = Utc.timestamp_opt(1_700_000_000, 5_000_000).unwrap();
        let later = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
        assert!(format_timestamp(&earlier) < format_timestamp(&later));
        assert_eq!(parse_timestamp(&format_timestamp(&earlier)).unwrap(), earlier);
    }
}
