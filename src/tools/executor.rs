//! 工具执行器
//!
//! 执行一轮（一批）工具调用：先按声明 schema 校验参数，再在超时内并发调用，
//! 并发度由 Semaphore 限制。任何失败（校验、超时、工具报错）都折叠为
//! ok=false 的 ToolOutcome，绝不向编排层抛未处理错误；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::memory::{ToolInvocation, ToolOutcome};
use crate::tools::{validate_args, Tool, ToolRegistry};

/// 工具执行器：持有注册表、单次调用超时与并发许可
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, timeout_secs: u64, max_concurrent: usize) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行一轮调用：每个请求恰好产生一个结果，按 correlation_id 配对（与顺序无关）。
    /// 轮内并发执行，整轮完成后一起返回。
    pub async fn execute_round(&self, calls: &[ToolInvocation]) -> Vec<ToolOutcome> {
        let futures = calls.iter().map(|call| self.execute_one(call));
        futures_util::future::join_all(futures).await
    }

    /// 单次调用：校验 -> 许可 -> 超时内执行；失败折叠为 ToolOutcome::failure
    async fn execute_one(&self, call: &ToolInvocation) -> ToolOutcome {
        let start = Instant::now();

        let outcome = match self.registry.get(&call.tool) {
            None => ToolOutcome::failure(
                call.correlation_id,
                format!("Unknown tool: {}", call.tool),
            ),
            Some(tool) => {
                if let Err(e) = validate_args(&tool.parameters_schema(), &call.args) {
                    // 校验失败不执行工具
                    ToolOutcome::failure(call.correlation_id, format!("Invalid arguments: {e}"))
                } else {
                    let _permit = self
                        .permits
                        .clone()
                        .acquire_owned()
                        .await
                        .expect("tool semaphore closed");
                    // spawn 隔离：工具内部 panic 折叠为失败结果，不冲垮回合
                    let task = {
                        let args = call.args.clone();
                        tokio::spawn(async move { tool.execute(args).await })
                    };
                    let abort = task.abort_handle();
                    match timeout(self.timeout, task).await {
                        Ok(Ok(Ok(output))) => ToolOutcome::success(call.correlation_id, output),
                        Ok(Ok(Err(e))) => ToolOutcome::failure(
                            call.correlation_id,
                            format!("Tool execution failed: {e}"),
                        ),
                        Ok(Err(join_err)) => ToolOutcome::failure(
                            call.correlation_id,
                            format!("Tool crashed: {join_err}"),
                        ),
                        Err(_) => {
                            // 超时后终止后台任务，不让失控工具继续占用资源
                            abort.abort();
                            ToolOutcome::failure(
                                call.correlation_id,
                                format!("Tool timeout: {}", call.tool),
                            )
                        }
                    }
                }
            }
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": call.tool,
            "correlation_id": call.correlation_id.to_string(),
            "ok": outcome.ok,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        outcome
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
