//! 提交记录数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 优化后的提示词结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptStructure {
    pub system: String,
    pub user: String,
    pub format: String,
}

/// 单个改进方案
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Improvement {
    pub title: String,
    pub content: String,
    pub category: String,
}

/// 一次优化的结构化结果
///
/// 改进方案固定为 3 个，由类型保证
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub purpose: String,
    pub structure: PromptStructure,
    pub improvements: [Improvement; 3],
}

/// 待写入的提交
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub user_id: String,
    pub prompt: String,
    pub result: OptimizationResult,
    pub created_at: DateTime<Utc>,
}

/// 已持久化的提交记录（创建后不可修改）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub id: i64,
    pub user_id: String,
    pub prompt: String,
    pub result: OptimizationResult,
    pub created_at: DateTime<Utc>,
}

/// 分页历史
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub records: Vec<SubmissionRecord>,
}
