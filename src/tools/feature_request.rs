//! 需求建议工具（桩实现，真实工单系统由部署方接入）

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::tools::Tool;

fn default_priority() -> String {
    "medium".to_string()
}

/// create_feature_request 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateFeatureRequestArgs {
    /// 需求标题
    pub title: String,
    /// 需求详细描述
    pub description: String,
    /// 优先级：low / medium / high / critical
    #[serde(default = "default_priority")]
    pub priority: String,
    /// 可选：指派给谁
    pub assignee: Option<String>,
}

/// 需求建议：供 feature_request 策略使用
pub struct CreateFeatureRequestTool;

#[async_trait]
impl Tool for CreateFeatureRequestTool {
    fn name(&self) -> &str {
        "create_feature_request"
    }

    fn description(&self) -> &str {
        "Create a feature request. Args: {\"title\": \"...\", \"description\": \"...\", \"priority\": \"medium\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schema_for!(CreateFeatureRequestArgs))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: CreateFeatureRequestArgs =
            serde_json::from_value(args).map_err(|e| e.to_string())?;
        Ok(format!(
            "Feature request created: '{}' with priority: '{}' assigned to: '{}'",
            args.title,
            args.priority,
            args.assignee.as_deref().unwrap_or("unassigned")
        ))
    }
}
