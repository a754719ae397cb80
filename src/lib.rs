//! Hive - 聊天助手的会话编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 回合状态机、路由、策略与错误
//! - **llm**: 模型客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 会话状态（Turn 序列）与状态存储
//! - **observability**: tracing 初始化
//! - **tools**: 工具注册表、执行器与内置工具

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;
