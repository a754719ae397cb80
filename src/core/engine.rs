//! 编排引擎：回合状态机
//!
//! handle_turn 驱动单个回合：取 per-key 锁 -> 加载状态并追加用户消息（LOADED）->
//! 问模型（MODEL_CONSULTED，含重试退避）-> 路由（ROUTED）-> 工具轮（TOOLS_PENDING）
//! 循环回问模型，直到 Respond（TERMINAL）或出错（FAILED）。
//! 先持久化再应答；失败路径为悬挂 ToolCall 补合成失败结果并记 SystemNote。
//! 挂起点只有模型调用与工具执行两处，取消在挂起点生效。

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{route, AgentError, RouteContext, RoutingDecision, Strategy, StrategyTable};
use crate::llm::{
    create_deepseek_client, MockModelClient, ModelClient, ModelError, ModelOutput,
    OpenAiModelClient,
};
use crate::memory::{
    ConversationState, FileStateStore, MemoryStateStore, StateStore, ToolInvocation, ToolOutcome,
    TurnBody,
};
use crate::tools::{
    tool_intent_schema_json, CreateFeatureRequestTool, EchoTool, FileBugReportTool,
    SearchDocsTool, ToolExecutor, ToolRegistry,
};

/// 工具轮次耗尽时的降级回复
const DEGRADED_NOTICE: &str = "I could not finish the tool work needed for a complete answer. \
Service is degraded for this request; please try again or rephrase.";

/// 引擎参数：上下文窗口、移交/工具轮上限、模型重试
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 问模型时保留的最近 Turn 条数（丢最旧整条，不截断单条）
    pub max_context_turns: usize,
    pub max_delegation_depth: u32,
    pub max_tool_rounds: u32,
    pub retry_max_attempts: u32,
    pub retry_initial_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_context_turns: 40,
            max_delegation_depth: 2,
            max_tool_rounds: 4,
            retry_max_attempts: 3,
            retry_initial_backoff_ms: 500,
        }
    }
}

impl From<&AppConfig> for EngineConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            max_context_turns: cfg.engine.max_context_turns,
            max_delegation_depth: cfg.engine.max_delegation_depth,
            max_tool_rounds: cfg.engine.max_tool_rounds,
            retry_max_attempts: cfg.llm.retry.max_attempts,
            retry_initial_backoff_ms: cfg.llm.retry.initial_backoff_ms,
        }
    }
}

/// 回合内状态机的阶段：Consult -> (Tools -> Consult)* -> Done
enum TurnPhase {
    Consult,
    Tools(Vec<ToolInvocation>),
    Done(String),
}

/// 编排引擎：模型、执行器、存储、策略表与 per-key 回合锁
pub struct Engine {
    model: Arc<dyn ModelClient>,
    executor: ToolExecutor,
    store: Arc<dyn StateStore>,
    strategies: StrategyTable,
    cfg: EngineConfig,
    turn_locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Engine {
    pub fn new(
        model: Arc<dyn ModelClient>,
        executor: ToolExecutor,
        store: Arc<dyn StateStore>,
        strategies: StrategyTable,
        cfg: EngineConfig,
    ) -> Self {
        Self {
            model,
            executor,
            store,
            strategies,
            cfg,
            turn_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// 从配置构建：模型按 provider 与可用 Key 选择，注册内置工具，
    /// state_dir 设置时用文件存储，否则内存存储
    pub fn from_config(cfg: &AppConfig) -> Self {
        let model = create_model_from_config(cfg);
        let executor = ToolExecutor::new(
            Arc::new(default_registry()),
            cfg.tools.tool_timeout_secs,
            cfg.engine.max_concurrent_tools,
        );
        let store: Arc<dyn StateStore> = match &cfg.app.state_dir {
            Some(dir) => Arc::new(FileStateStore::new(dir)),
            None => Arc::new(MemoryStateStore::new()),
        };
        Self::new(
            model,
            executor,
            store,
            StrategyTable::builtin(),
            EngineConfig::from(cfg),
        )
    }

    /// 处理一个回合，返回最终助手回复
    pub async fn handle_turn(&self, key: &str, message: &str) -> Result<String, AgentError> {
        self.handle_turn_with(key, message, None, CancellationToken::new())
            .await
    }

    /// 完整入口：可携带幂等 turn_key 与取消令牌
    pub async fn handle_turn_with(
        &self,
        key: &str,
        message: &str,
        turn_key: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<String, AgentError> {
        // per-key 串行：LOADED 前取锁，TERMINAL/FAILED 后随 guard 释放；不同 key 互不阻塞
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        let mut state = self
            .store
            .load(key)
            .await?
            .unwrap_or_else(|| ConversationState::new(key));

        // 幂等重放：同 turn_key 已终止则直接返回已记录回复，不追加任何 Turn
        if let (Some(tk), Some(prev)) = (turn_key, state.scratch("last_turn_key")) {
            if tk == prev {
                if let Some(response) = state.scratch("last_response") {
                    tracing::info!(key, turn_key = tk, "replayed turn, returning recorded response");
                    return Ok(response.to_string());
                }
            }
        }

        state.append(TurnBody::user(message));

        match self.run_turn(&mut state, &cancel).await {
            Ok(answer) => {
                if let Some(tk) = turn_key {
                    state.set_scratch("last_turn_key", tk);
                }
                state.set_scratch("last_response", answer.clone());
                // 先持久化再应答：崩溃不会产生与存量历史不一致的回复
                self.store.save(key, &state).await?;
                Ok(answer)
            }
            Err(err) => {
                // 悬挂的 ToolCall 补合成失败结果，取消/失败后调用与结果依然成对
                for call in state.unresolved_calls() {
                    state.append(TurnBody::tool_result(ToolOutcome::failure(
                        call.correlation_id,
                        format!("Aborted before completion: {err}"),
                    )));
                }
                state.append(TurnBody::note(format!("Turn failed: {err}")));
                if let Err(save_err) = self.store.save(key, &state).await {
                    tracing::error!(key, error = %save_err, "state save failed after turn failure");
                }
                Err(err)
            }
        }
    }

    /// 回合主循环；返回最终回复文本（已追加为 AssistantMessage）
    async fn run_turn(
        &self,
        state: &mut ConversationState,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let mut strategy = self.strategies.default_strategy();
        let mut depth: u32 = 0;
        let mut rounds: u32 = 0;
        let mut phase = TurnPhase::Consult;

        loop {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            phase = match phase {
                TurnPhase::Consult => {
                    let output = self.consult_model(state, strategy, cancel).await?;
                    let allowed = self.allowed_tools(strategy);
                    let decision = route(
                        output,
                        state,
                        &RouteContext {
                            allowed_tools: &allowed,
                            strategies: &self.strategies,
                            delegation_depth: depth,
                            max_delegation_depth: self.cfg.max_delegation_depth,
                        },
                    );
                    state.set_scratch("last_route", decision.label());
                    match decision {
                        RoutingDecision::Respond(text) => TurnPhase::Done(text),
                        RoutingDecision::InvokeTools(calls) => TurnPhase::Tools(calls),
                        RoutingDecision::Delegate(name) => {
                            depth += 1;
                            strategy = self
                                .strategies
                                .get(&name)
                                .ok_or_else(|| AgentError::UnknownStrategy(name.clone()))?;
                            state.set_scratch("strategy", name);
                            tracing::debug!(key = %state.key, strategy = strategy.name, depth, "delegated");
                            TurnPhase::Consult
                        }
                        RoutingDecision::Fail(err) => return Err(err),
                    }
                }
                TurnPhase::Tools(calls) => {
                    if rounds >= self.cfg.max_tool_rounds {
                        tracing::warn!(key = %state.key, rounds, "tool round limit reached, degrading");
                        TurnPhase::Done(DEGRADED_NOTICE.to_string())
                    } else {
                        for call in &calls {
                            state.append(TurnBody::tool_call(call.clone()));
                        }
                        let results = tokio::select! {
                            r = self.executor.execute_round(&calls) => r,
                            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                        };
                        for result in results {
                            state.append(TurnBody::tool_result(result));
                        }
                        rounds += 1;
                        TurnPhase::Consult
                    }
                }
                TurnPhase::Done(text) => {
                    state.append(TurnBody::assistant(text.clone()));
                    return Ok(text);
                }
            };
        }
    }

    /// 问模型：上下文窗口取最近 N 条，失败统一重试（限流时尊重 retry_after），指数退避
    async fn consult_model(
        &self,
        state: &ConversationState,
        strategy: &Strategy,
        cancel: &CancellationToken,
    ) -> Result<ModelOutput, AgentError> {
        let system = self.system_prompt_for(strategy);
        let mut backoff = Duration::from_millis(self.cfg.retry_initial_backoff_ms);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let window = state.recent(self.cfg.max_context_turns);
            let result = tokio::select! {
                r = self.model.infer(window, &system) => r,
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            };
            match result {
                Ok(output) => return Ok(output),
                Err(err) if attempt < self.cfg.retry_max_attempts => {
                    tracing::warn!(key = %state.key, attempt, error = %err, "model call failed, retrying");
                    let wait = match &err {
                        ModelError::RateLimited { retry_after_ms } => {
                            backoff.max(Duration::from_millis(*retry_after_ms))
                        }
                        _ => backoff,
                    };
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                    }
                    backoff = backoff.saturating_mul(2);
                }
                Err(err) => {
                    return Err(AgentError::Provider {
                        attempts: attempt,
                        source: err,
                    })
                }
            }
        }
    }

    /// 动态 system：策略提示词 + 可用工具 spec + 意图 JSON 格式
    fn system_prompt_for(&self, strategy: &Strategy) -> String {
        let allowed = self.allowed_tools(strategy);
        let specs = self.executor.registry().specs_json(&allowed);
        format!(
            "{}\n\nAvailable tools:\n{}\n\nWhen you need a tool, reply with exactly one JSON \
             object and nothing else, shaped as:\n{}\nFor several tools at once use \
             {{\"tool_calls\": [...]}}.",
            strategy.prompt,
            specs,
            tool_intent_schema_json()
        )
    }

    /// 策略白名单为空时放开为注册表全部工具
    fn allowed_tools(&self, strategy: &Strategy) -> Vec<String> {
        if strategy.allowed_tools.is_empty() {
            self.executor.tool_names()
        } else {
            strategy.allowed_tools.iter().map(|s| s.to_string()).collect()
        }
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.turn_locks.lock().expect("turn lock table poisoned");
        locks.entry(key.to_string()).or_default().clone()
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }
}

/// 内置工具注册表：分诊三件套 + echo
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(SearchDocsTool);
    registry.register(FileBugReportTool);
    registry.register(CreateFeatureRequestTool);
    registry.register(EchoTool);
    registry
}

/// 根据配置与环境变量选择模型后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_model_from_config(cfg: &AppConfig) -> Arc<dyn ModelClient> {
    let provider = cfg.llm.provider.to_lowercase();
    // 有 DeepSeek Key，或配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        tracing::info!("Using DeepSeek model ({})", model);
        Arc::new(create_deepseek_client(Some(&model)))
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        tracing::info!("Using OpenAI-compatible model ({})", model);
        Arc::new(OpenAiModelClient::new(
            cfg.llm.base_url.as_deref(),
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock model");
        Arc::new(MockModelClient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedModelClient;

    fn test_engine(script: Vec<Result<ModelOutput, ModelError>>) -> (Engine, Arc<ScriptedModelClient>) {
        let model = Arc::new(ScriptedModelClient::new(script));
        let executor = ToolExecutor::new(Arc::new(default_registry()), 5, 3);
        let engine = Engine::new(
            model.clone(),
            executor,
            Arc::new(MemoryStateStore::new()),
            StrategyTable::builtin(),
            EngineConfig {
                retry_initial_backoff_ms: 1,
                ..EngineConfig::default()
            },
        );
        (engine, model)
    }

    #[tokio::test]
    async fn test_provider_error_is_retried() {
        let (engine, model) = test_engine(vec![
            Err(ModelError::Unavailable("down".to_string())),
            Ok(ModelOutput::answer("recovered")),
        ]);
        let answer = engine.handle_turn("c1", "hi").await.unwrap();
        assert_eq!(answer, "recovered");
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_provider_retries_exhausted() {
        let (engine, model) = test_engine(vec![
            Err(ModelError::Unavailable("down".to_string())),
            Err(ModelError::Unavailable("down".to_string())),
            Err(ModelError::Unavailable("down".to_string())),
        ]);
        let err = engine.handle_turn("c1", "hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Provider { attempts: 3, .. }));
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn test_tool_round_limit_degrades_to_notice() {
        // 每轮都再要工具，触发轮次上限后降级回复而非失败
        let script = (0..6)
            .map(|i| Ok(ModelOutput::tool_call("echo", serde_json::json!({"text": i.to_string()}))))
            .collect();
        let (engine, _) = test_engine(script);
        let answer = engine.handle_turn("c1", "loop forever").await.unwrap();
        assert!(answer.contains("degraded"));
    }
}
