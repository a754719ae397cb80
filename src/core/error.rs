//! 引擎错误类型
//!
//! 工具参数校验失败与工具执行失败不在此列：它们折叠为 ok=false 的 ToolResult，
//! 回合继续。这里只有让回合终止（FAILED）或需要调用方感知的错误。

use thiserror::Error;

use crate::llm::ModelError;
use crate::memory::StoreError;

/// 回合级错误：模型侧（重试耗尽）、路由、存储、取消
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Model provider failed after {attempts} attempts: {source}")]
    Provider {
        attempts: u32,
        #[source]
        source: ModelError,
    },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Delegation depth exceeded (max {0})")]
    DelegationDepthExceeded(u32),

    #[error("Model returned no actionable intent")]
    EmptyIntent,

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Turn cancelled")]
    Cancelled,
}
