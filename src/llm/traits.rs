//! 模型客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 ModelClient：
//! infer 接收 Turn 历史与本回合的 system prompt，返回结构化意图 ModelOutput。
//! 失败以类型化 ModelError 上报，重试由编排引擎统一处理。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::ModelOutput;
use crate::memory::Turn;

/// 模型侧错误：不可用 / 限流 / 输出不可解析
#[derive(Error, Debug, Clone)]
pub enum ModelError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Malformed model output: {0}")]
    Malformed(String),
}

/// 模型客户端 trait：Turn 历史 + system prompt -> 结构化意图
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn infer(&self, turns: &[Turn], system_prompt: &str) -> Result<ModelOutput, ModelError>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
