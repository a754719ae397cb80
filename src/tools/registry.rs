//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），
//! 由 ToolRegistry 按名注册与查找；编排层只做表查找，不含任何调度逻辑。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// 工具 trait：名称、描述（供模型理解）、参数 JSON Schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型意图 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供模型理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认空对象表示无参数要求
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；Err 为面向模型的错误描述
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具注册表：name -> Arc<dyn Tool>，纯查找
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 生成指定工具的 spec JSON（name / description / parameters），拼入 system prompt。
    /// names 为空时输出全部已注册工具。
    pub fn specs_json(&self, names: &[String]) -> String {
        let specs: Vec<Value> = self
            .tools
            .iter()
            .filter(|(name, _)| names.is_empty() || names.contains(name))
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters_schema(),
                })
            })
            .collect();
        serde_json::to_string_pretty(&specs).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        assert!(registry.contains("echo"));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_specs_json_filters_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let all = registry.specs_json(&[]);
        assert!(all.contains("\"echo\""));
        let none = registry.specs_json(&["other".to_string()]);
        assert_eq!(none.trim(), "[]");
    }
}
