//! 状态存储
//!
//! load/save by key。内存实现用于测试与单实例运行；文件实现每会话一个 JSON 文件，
//! 跨进程恢复时整份加载。回合级互斥由引擎的 per-key 锁保证，存储本身只做读写。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::memory::ConversationState;

/// 存储层错误：序列化与 IO 分开报告
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State serialization failed: {0}")]
    Serialize(String),

    #[error("State io failed: {0}")]
    Io(String),
}

/// 状态存储接口：按会话 key 加载/保存整份 ConversationState
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<ConversationState>, StoreError>;

    async fn save(&self, key: &str, state: &ConversationState) -> Result<(), StoreError>;
}

/// 内存存储：RwLock<HashMap>，进程退出即丢失
#[derive(Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<String, ConversationState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, key: &str) -> Result<Option<ConversationState>, StoreError> {
        Ok(self.states.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, state: &ConversationState) -> Result<(), StoreError> {
        self.states
            .write()
            .await
            .insert(key.to_string(), state.clone());
        Ok(())
    }
}

/// 文件存储：root 下每会话一个 `<key>.json`，父目录不存在时自动创建
#[derive(Debug)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// key 中非 [A-Za-z0-9_-] 的字符替换为 '_'，避免路径逃逸
    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, key: &str) -> Result<Option<ConversationState>, StoreError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
        let state =
            serde_json::from_str(&data).map_err(|e| StoreError::Serialize(e.to_string()))?;
        Ok(Some(state))
    }

    async fn save(&self, key: &str, state: &ConversationState) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.root).map_err(|e| StoreError::Io(e.to_string()))?;
        let data = serde_json::to_string_pretty(state)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        std::fs::write(self.path_for(key), data).map_err(|e| StoreError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::TurnBody;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStateStore::new();
        assert!(store.load("c1").await.unwrap().is_none());

        let mut state = ConversationState::new("c1");
        state.append(TurnBody::user("hi"));
        store.save("c1", &state).await.unwrap();

        let loaded = store.load("c1").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        assert!(store.load("c1").await.unwrap().is_none());

        let mut state = ConversationState::new("c1");
        state.append(TurnBody::user("hi"));
        state.append(TurnBody::assistant("hello"));
        store.save("c1", &state).await.unwrap();

        let loaded = store.load("c1").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.turns()[1].seq, 1);
    }

    #[tokio::test]
    async fn test_file_store_sanitizes_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let state = ConversationState::new("team/channel:42");
        store.save("team/channel:42", &state).await.unwrap();

        // 读取用同一 key，落盘名已脱敏
        assert!(store.load("team/channel:42").await.unwrap().is_some());
        assert!(dir.path().join("team_channel_42.json").exists());
    }
}
