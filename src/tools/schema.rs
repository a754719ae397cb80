//! 工具参数 schema：生成与校验
//!
//! schemars 自动生成意图格式的 Schema 拼入 system prompt，减少模型输出格式错误；
//! validate_args 在执行前按工具声明的 schema 做 required / 基本类型检查，
//! 校验失败的调用不会真正执行。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;
use std::collections::HashMap;

/// 模型意图格式：与解析器接受的 `{"tool": "...", "args": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolIntentFormat {
    /// 工具名，如 search_docs、file_bug_report、echo
    pub tool: String,
    /// 工具参数，依工具不同而不同（query、title、text 等）
    pub args: HashMap<String, String>,
}

/// 返回意图格式的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_intent_schema_json() -> String {
    let schema = schema_for!(ToolIntentFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

/// 按工具的 parameters_schema 校验 args：args 必须是对象，required 键必须齐全，
/// properties 中声明了基本类型（string/number/integer/boolean/array/object）的键类型必须匹配。
/// 嵌套结构交给工具自身的 serde 反序列化兜底。
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let obj = match args.as_object() {
        Some(o) => o,
        None => return Err("args must be a JSON object".to_string()),
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !obj.contains_key(key) {
                return Err(format!("missing required argument '{key}'"));
            }
        }
    }

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in obj {
            let declared = props
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str());
            let Some(expected) = declared else { continue };
            let matches = match expected {
                "string" => value.is_string(),
                "number" => value.is_number(),
                "integer" => value.is_i64() || value.is_u64(),
                "boolean" => value.is_boolean(),
                "array" => value.is_array(),
                "object" => value.is_object(),
                _ => true,
            };
            if !matches {
                return Err(format!("argument '{key}' must be of type {expected}"));
            }
        }
    }

    Ok(())
}
