//! Mock 模型客户端（无需 API）
//!
//! MockModelClient：无 Key 时兜底运行，回显用户消息或总结工具结果。
//! ScriptedModelClient：按脚本逐次返回预设意图/错误，供引擎测试驱动各条路由分支。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ModelClient, ModelError, ModelOutput};
use crate::memory::{Turn, TurnBody};

/// Mock 客户端：最近一条是工具结果则总结之，否则回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockModelClient;

#[async_trait]
impl ModelClient for MockModelClient {
    async fn infer(&self, turns: &[Turn], _system_prompt: &str) -> Result<ModelOutput, ModelError> {
        if let Some(TurnBody::ToolResult { result }) = turns.last().map(|t| &t.body) {
            return Ok(ModelOutput::answer(format!(
                "Based on the tool output: {}",
                result.output
            )));
        }

        let last_user = turns
            .iter()
            .rev()
            .find_map(|t| match &t.body {
                TurnBody::UserMessage { text } => Some(text.as_str()),
                _ => None,
            })
            .unwrap_or("(no input)");

        Ok(ModelOutput::answer(format!("Echo from Mock: {last_user}")))
    }
}

/// 脚本客户端：infer 依次弹出预设结果；脚本耗尽后返回固定回答
pub struct ScriptedModelClient {
    steps: Mutex<VecDeque<Result<ModelOutput, ModelError>>>,
    calls: AtomicU64,
}

impl ScriptedModelClient {
    pub fn new(steps: Vec<Result<ModelOutput, ModelError>>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicU64::new(0),
        }
    }

    /// infer 被调用的总次数（含重试）
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn infer(&self, _turns: &[Turn], _system_prompt: &str) -> Result<ModelOutput, ModelError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.steps
            .lock()
            .expect("script mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Ok(ModelOutput::answer("(script exhausted)")))
    }
}
