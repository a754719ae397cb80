//! 会话状态：Turn 序列与暂存区
//!
//! 一个会话 = 追加式 Turn 列表（seq 严格递增且无空洞）+ 少量 scratch 键值（最近路由、幂等键等）。
//! Turn 一旦追加不可变、不可重排；引擎在回合内独占状态，回合间经 StateStore 持久化。

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 工具调用请求：tool 必须已注册，args 先经 schema 校验再执行，
/// correlation_id 将其与产生的 ToolOutcome 配对
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub args: serde_json::Value,
    pub correlation_id: Uuid,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            args,
            correlation_id: Uuid::new_v4(),
        }
    }
}

/// 工具执行结果：按 correlation_id 配对；ok=false 时 output 为错误描述
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub correlation_id: Uuid,
    pub ok: bool,
    pub output: String,
}

impl ToolOutcome {
    pub fn success(correlation_id: Uuid, output: impl Into<String>) -> Self {
        Self {
            correlation_id,
            ok: true,
            output: output.into(),
        }
    }

    pub fn failure(correlation_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            correlation_id,
            ok: false,
            output: error.into(),
        }
    }
}

/// Turn 变体（snake_case tag，与文件存储的 JSON 一致）
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnBody {
    UserMessage { text: String },
    AssistantMessage { text: String },
    ToolCall { call: ToolInvocation },
    ToolResult { result: ToolOutcome },
    SystemNote { text: String },
}

impl TurnBody {
    pub fn user(text: impl Into<String>) -> Self {
        Self::UserMessage { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::AssistantMessage { text: text.into() }
    }

    pub fn note(text: impl Into<String>) -> Self {
        Self::SystemNote { text: text.into() }
    }

    pub fn tool_call(call: ToolInvocation) -> Self {
        Self::ToolCall { call }
    }

    pub fn tool_result(result: ToolOutcome) -> Self {
        Self::ToolResult { result }
    }
}

/// 单条 Turn：seq 在会话内严格递增且无空洞，创建后不可变
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub body: TurnBody,
}

/// 会话状态：按 key 标识，Turn 仅追加，scratch 存放回合间的少量键值
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationState {
    pub key: String,
    turns: Vec<Turn>,
    #[serde(default)]
    scratch: HashMap<String, String>,
}

impl ConversationState {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            turns: Vec::new(),
            scratch: HashMap::new(),
        }
    }

    /// 追加一条 Turn，seq 取当前长度（追加是唯一写路径，保证无空洞）
    pub fn append(&mut self, body: TurnBody) -> &Turn {
        let turn = Turn {
            seq: self.turns.len() as u64,
            at: Utc::now(),
            body,
        };
        self.turns.push(turn);
        self.turns.last().expect("just pushed")
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// 上下文窗口：保留最近 max 条整 Turn，丢弃最旧的（不截断单条 Turn）
    pub fn recent(&self, max: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(max);
        &self.turns[start..]
    }

    /// 尚未有配对 ToolResult 的 ToolCall（取消/失败时需补合成结果）
    pub fn unresolved_calls(&self) -> Vec<ToolInvocation> {
        let resolved: HashSet<Uuid> = self
            .turns
            .iter()
            .filter_map(|t| match &t.body {
                TurnBody::ToolResult { result } => Some(result.correlation_id),
                _ => None,
            })
            .collect();
        self.turns
            .iter()
            .filter_map(|t| match &t.body {
                TurnBody::ToolCall { call } if !resolved.contains(&call.correlation_id) => {
                    Some(call.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn scratch(&self, key: &str) -> Option<&str> {
        self.scratch.get(key).map(String::as_str)
    }

    pub fn set_scratch(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.scratch.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_strictly_increasing_gapless() {
        let mut state = ConversationState::new("c1");
        state.append(TurnBody::user("hi"));
        state.append(TurnBody::assistant("hello"));
        state.append(TurnBody::note("note"));
        let seqs: Vec<u64> = state.turns().iter().map(|t| t.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_recent_drops_oldest_whole_turns() {
        let mut state = ConversationState::new("c1");
        for i in 0..5 {
            state.append(TurnBody::user(format!("m{i}")));
        }
        let window = state.recent(2);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].seq, 3);
        // 全量历史不受窗口影响
        assert_eq!(state.len(), 5);
    }

    #[test]
    fn test_unresolved_calls_pairing() {
        let mut state = ConversationState::new("c1");
        let a = ToolInvocation::new("echo", serde_json::json!({"text": "a"}));
        let b = ToolInvocation::new("echo", serde_json::json!({"text": "b"}));
        let a_id = a.correlation_id;
        let b_id = b.correlation_id;
        state.append(TurnBody::tool_call(a));
        state.append(TurnBody::tool_call(b));
        state.append(TurnBody::tool_result(ToolOutcome::success(a_id, "a")));

        let unresolved = state.unresolved_calls();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].correlation_id, b_id);

        state.append(TurnBody::tool_result(ToolOutcome::failure(b_id, "cancelled")));
        assert!(state.unresolved_calls().is_empty());
    }

    #[test]
    fn test_state_json_round_trip() {
        let mut state = ConversationState::new("c1");
        state.append(TurnBody::user("hi"));
        state.append(TurnBody::tool_call(ToolInvocation::new(
            "search_docs",
            serde_json::json!({"query": "api"}),
        )));
        state.set_scratch("last_route", "invoke_tools");

        let json = serde_json::to_string(&state).unwrap();
        let loaded: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.key, "c1");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.scratch("last_route"), Some("invoke_tools"));
        assert!(matches!(loaded.turns()[1].body, TurnBody::ToolCall { .. }));
    }
}
