//! 缺陷上报工具（桩实现，真实工单系统由部署方接入）

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::tools::Tool;

fn default_severity() -> String {
    "medium".to_string()
}

/// file_bug_report 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct FileBugReportArgs {
    /// 缺陷标题
    pub title: String,
    /// 缺陷详细描述
    pub description: String,
    /// 严重程度：low / medium / high / critical
    #[serde(default = "default_severity")]
    pub severity: String,
    /// 可选：复现步骤
    pub steps_to_reproduce: Option<String>,
    /// 可选：环境信息
    pub environment: Option<String>,
}

/// 缺陷上报：供 bug 策略使用
pub struct FileBugReportTool;

#[async_trait]
impl Tool for FileBugReportTool {
    fn name(&self) -> &str {
        "file_bug_report"
    }

    fn description(&self) -> &str {
        "File a bug report. Args: {\"title\": \"...\", \"description\": \"...\", \"severity\": \"medium\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::to_value(schema_for!(FileBugReportArgs))
            .unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: FileBugReportArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
        Ok(format!(
            "Bug report filed: '{}' with severity: '{}' in environment: '{}'",
            args.title,
            args.severity,
            args.environment.as_deref().unwrap_or("unspecified")
        ))
    }
}
