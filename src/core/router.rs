//! 路由决策
//!
//! 纯函数：模型意图 + 会话状态 + 本回合限制 -> 下一步动作。
//! 取舍规则：工具调用优先于同批给出的直接回答（未解决工具调用时回答视为暂定并扣留）；
//! 未注册工具名与未知策略名一律 Fail，不做静默丢弃。

use crate::core::{AgentError, StrategyTable};
use crate::llm::ModelOutput;
use crate::memory::{ConversationState, ToolInvocation};

/// 路由结果：回答 / 执行工具 / 移交策略 / 失败
#[derive(Debug)]
pub enum RoutingDecision {
    Respond(String),
    InvokeTools(Vec<ToolInvocation>),
    Delegate(String),
    Fail(AgentError),
}

impl RoutingDecision {
    /// scratch 审计用标签
    pub fn label(&self) -> String {
        match self {
            Self::Respond(_) => "respond".to_string(),
            Self::InvokeTools(calls) => format!("invoke_tools:{}", calls.len()),
            Self::Delegate(name) => format!("delegate:{name}"),
            Self::Fail(err) => format!("fail:{err}"),
        }
    }
}

/// 本回合的路由限制：当前策略允许的工具、策略表、已用移交深度
#[derive(Debug)]
pub struct RouteContext<'a> {
    pub allowed_tools: &'a [String],
    pub strategies: &'a StrategyTable,
    pub delegation_depth: u32,
    pub max_delegation_depth: u32,
}

pub fn route(
    output: ModelOutput,
    state: &ConversationState,
    ctx: &RouteContext<'_>,
) -> RoutingDecision {
    if !output.tool_calls.is_empty() {
        if output.answer.is_some() {
            tracing::debug!(key = %state.key, "answer withheld, tool calls take precedence");
        }
        let mut calls = Vec::with_capacity(output.tool_calls.len());
        for request in output.tool_calls {
            if !ctx.allowed_tools.iter().any(|n| n == &request.tool) {
                return RoutingDecision::Fail(AgentError::UnknownTool(request.tool));
            }
            calls.push(ToolInvocation::new(request.tool, request.args));
        }
        return RoutingDecision::InvokeTools(calls);
    }

    if let Some(name) = output.delegate {
        if ctx.delegation_depth >= ctx.max_delegation_depth {
            return RoutingDecision::Fail(AgentError::DelegationDepthExceeded(
                ctx.max_delegation_depth,
            ));
        }
        if !ctx.strategies.contains(&name) {
            return RoutingDecision::Fail(AgentError::UnknownStrategy(name));
        }
        return RoutingDecision::Delegate(name);
    }

    if let Some(text) = output.answer {
        if !text.trim().is_empty() {
            return RoutingDecision::Respond(text);
        }
    }

    RoutingDecision::Fail(AgentError::EmptyIntent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx<'a>(allowed: &'a [String], strategies: &'a StrategyTable, depth: u32) -> RouteContext<'a> {
        RouteContext {
            allowed_tools: allowed,
            strategies,
            delegation_depth: depth,
            max_delegation_depth: 2,
        }
    }

    fn state() -> ConversationState {
        ConversationState::new("c1")
    }

    #[test]
    fn test_respond() {
        let strategies = StrategyTable::builtin();
        let decision = route(ModelOutput::answer("hi"), &state(), &ctx(&[], &strategies, 0));
        assert!(matches!(decision, RoutingDecision::Respond(t) if t == "hi"));
    }

    #[test]
    fn test_tools_take_precedence_over_answer() {
        let strategies = StrategyTable::builtin();
        let allowed = vec!["echo".to_string()];
        let mut output = ModelOutput::tool_call("echo", json!({"text": "hi"}));
        output.answer = Some("provisional".to_string());
        let decision = route(output, &state(), &ctx(&allowed, &strategies, 0));
        assert!(matches!(decision, RoutingDecision::InvokeTools(calls) if calls.len() == 1));
    }

    #[test]
    fn test_unknown_tool_fails() {
        let strategies = StrategyTable::builtin();
        let allowed = vec!["echo".to_string()];
        let output = ModelOutput::tool_call("rm_rf", json!({}));
        let decision = route(output, &state(), &ctx(&allowed, &strategies, 0));
        assert!(matches!(
            decision,
            RoutingDecision::Fail(AgentError::UnknownTool(name)) if name == "rm_rf"
        ));
    }

    #[test]
    fn test_delegate_within_depth() {
        let strategies = StrategyTable::builtin();
        let decision = route(ModelOutput::delegate("bug"), &state(), &ctx(&[], &strategies, 1));
        assert!(matches!(decision, RoutingDecision::Delegate(n) if n == "bug"));
    }

    #[test]
    fn test_delegate_depth_exceeded_fails() {
        let strategies = StrategyTable::builtin();
        let decision = route(ModelOutput::delegate("bug"), &state(), &ctx(&[], &strategies, 2));
        assert!(matches!(
            decision,
            RoutingDecision::Fail(AgentError::DelegationDepthExceeded(2))
        ));
    }

    #[test]
    fn test_unknown_strategy_fails() {
        let strategies = StrategyTable::builtin();
        let decision = route(
            ModelOutput::delegate("marketing"),
            &state(),
            &ctx(&[], &strategies, 0),
        );
        assert!(matches!(
            decision,
            RoutingDecision::Fail(AgentError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_empty_intent_fails() {
        let strategies = StrategyTable::builtin();
        let decision = route(ModelOutput::default(), &state(), &ctx(&[], &strategies, 0));
        assert!(matches!(decision, RoutingDecision::Fail(AgentError::EmptyIntent)));
    }
}
