//! 文档检索工具
//!
//! 检索产品文档（当前为桩实现，返回检索回执；真实后端由部署方接入）。

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::tools::Tool;

fn default_max_results() -> u32 {
    10
}

/// search_docs 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchDocsArgs {
    /// 检索关键词
    pub query: String,
    /// 可选：限定文档分类
    pub category: Option<String>,
    /// 返回条数上限
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

/// 文档检索：供 documentation 策略使用
pub struct SearchDocsTool;

#[async_trait]
impl Tool for SearchDocsTool {
    fn name(&self) -> &str {
        "search_docs"
    }

    fn description(&self) -> &str {
        "Search product documentation. Args: {\"query\": \"...\", \"category\": \"...\", \"max_results\": 10}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schema_for!(SearchDocsArgs))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: SearchDocsArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        Ok(format!(
            "Documentation search performed for query: '{}' in category: '{}' with max_results: {}",
            args.query,
            args.category.as_deref().unwrap_or("any"),
            args.max_results
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_docs_defaults() {
        let out = SearchDocsTool
            .execute(serde_json::json!({"query": "rate limits"}))
            .await
            .unwrap();
        assert!(out.contains("'rate limits'"));
        assert!(out.contains("max_results: 10"));
    }

    #[test]
    fn test_schema_requires_query() {
        let schema = SearchDocsTool.parameters_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "query"));
    }
}
