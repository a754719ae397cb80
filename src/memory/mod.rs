//! 会话记忆层：Turn 模型与状态存储

pub mod conversation;
pub mod store;

pub use conversation::{ConversationState, ToolInvocation, ToolOutcome, Turn, TurnBody};
pub use store::{FileStateStore, MemoryStateStore, StateStore, StoreError};
