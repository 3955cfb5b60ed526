//! 提示词优化
//!
//! - `invoker`: 调用上游生成结构化优化结果
//! - `handler`: 单次优化请求的完整流程（校验、限流、调用、持久化）

pub mod backend;
pub mod handler;
pub mod invoker;
mod parse;
mod template;

pub use backend::{AnthropicBackend, GenerationBackend, UpstreamError};
pub use handler::{FailReason, Outcome, RejectReason, RequestHandler};
pub use invoker::{InvokeError, InvokerConfig, OptimizationInvoker};

/// 测试辅助
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::backend::{GenerationBackend, UpstreamError};

    pub(crate) const VALID_REPLY: &str = r#"{
        "purpose": "Summarize a research paper",
        "structure": {
            "system": "You are an expert science editor.",
            "user": "Summarize the following paper in 5 bullet points.",
            "format": "Markdown bullet list"
        },
        "improvements": [
            {"title": "Add audience", "content": "Summarize for a high-school reader...", "category": "clarity"},
            {"title": "Bound length", "content": "Use at most 120 words...", "category": "specificity"},
            {"title": "Sectioned output", "content": "Split into Findings and Limits...", "category": "structure"}
        ]
    }"#;

    /// 脚本中的一步
    pub(crate) enum Step {
        Reply(String),
        Fail(UpstreamError),
        /// 永不返回，用于触发超时
        Hang,
    }

    /// 按脚本依次返回结果的后端
    pub(crate) struct ScriptedBackend {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
        last_prompt: Mutex<Option<String>>,
    }

    impl ScriptedBackend {
        pub(crate) fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(None),
            }
        }

        /// 每次都返回合法结果
        pub(crate) fn always_ok(times: usize) -> Self {
            Self::new((0..times).map(|_| Step::Reply(VALID_REPLY.to_string())).collect())
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn last_prompt(&self) -> Option<String> {
            self.last_prompt.lock().clone()
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn generate(&self, _instruction: &str, prompt: &str) -> Result<String, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock() = Some(prompt.to_string());
            let step = self.steps.lock().pop_front();
            match step {
                Some(Step::Reply(text)) => Ok(text),
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Hang) => std::future::pending::<Result<String, UpstreamError>>().await,
                None => Err(UpstreamError::Unavailable("script exhausted".to_string())),
            }
        }
    }
}
