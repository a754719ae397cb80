//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖
//! （双下划线表示嵌套，如 `HIVE__ENGINE__MAX_TOOL_ROUNDS=6`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub engine: EngineSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、状态目录
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 会话状态落盘目录；未设置时用内存存储
    pub state_dir: Option<PathBuf>,
}

/// [engine] 段：回合状态机的各项上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// 问模型时保留的最近 Turn 条数（上下文窗口）
    pub max_context_turns: usize,
    /// 单回合最多移交几次策略
    pub max_delegation_depth: u32,
    /// 单回合最多执行几轮工具
    pub max_tool_rounds: u32,
    /// 单轮内工具并发上限
    pub max_concurrent_tools: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_context_turns: 40,
            max_delegation_depth: 2,
            max_tool_rounds: 4,
            max_concurrent_tools: 3,
        }
    }
}

/// [llm] 段：后端选择与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub deepseek: LlmDeepSeekSection,
    pub openai: LlmOpenAiSection,
    pub retry: RetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: None,
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
            retry: RetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

/// [llm.retry] 段：模型调用失败的重试上限与首个退避
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

/// [tools] 段：单次工具调用超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{name}.toml");
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.engine.max_tool_rounds, 4);
        assert_eq!(cfg.engine.max_delegation_depth, 2);
        assert_eq!(cfg.llm.retry.max_attempts, 3);
        assert!(cfg.app.state_dir.is_none());
    }
}
