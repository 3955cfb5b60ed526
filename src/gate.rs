//! 按用户的提交频率限制
//!
//! 以用户最近一次已接受提交的时间作为窗口起点。检查与写入不是原子的，
//! 同一用户的并发请求可能同时通过检查，这里只做尽力而为的限流。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::store::{StoreError, SubmissionStore};

/// 准入判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// 拒绝时，距离下次可提交的剩余时间
    pub retry_after: Option<Duration>,
}

impl Admission {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: None,
        }
    }

    fn deny(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            retry_after: Some(retry_after),
        }
    }
}

/// 限流检查失败（与正常的限流拒绝区分开）
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("限流存储不可用: {0}")]
    Unavailable(#[from] StoreError),
}

/// 提交频率闸门
#[derive(Clone)]
pub struct RateGate {
    store: Arc<dyn SubmissionStore>,
    cooldown: Duration,
}

impl RateGate {
    pub fn new(store: Arc<dyn SubmissionStore>, cooldown: Duration) -> Self {
        Self { store, cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// 判断 `identity` 在 `now` 时刻能否发起新的优化请求
    ///
    /// 存储不可达时返回错误，调用方应按拒绝处理
    pub async fn admit(&self, identity: &str, now: DateTime<Utc>) -> Result<Admission, GateError> {
        if self.cooldown.is_zero() {
            return Ok(Admission::allow());
        }

        let last = self.store.latest_created_at(identity).await?;
        Ok(decide(last, now, self.cooldown))
    }
}

/// 纯判定逻辑
fn decide(last: Option<DateTime<Utc>>, now: DateTime<Utc>, cooldown: Duration) -> Admission {
    let Some(last) = last else {
        return Admission::allow();
    };

    // 最近记录晚于当前时间（时钟偏差）时按刚刚提交处理
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    if elapsed >= cooldown {
        Admission::allow()
    } else {
        Admission::deny(cooldown - elapsed)
    }
}
