//! 模型输出解析
//!
//! 从补全文本中提取意图 JSON（```json 围栏或首个 {...} 块）并解析为 ModelOutput：
//! 直接回答、工具调用（单个或批量）、策略移交，三者可并存，取舍由路由层决定。

use serde_json::Value;

use crate::llm::ModelError;

/// 模型请求的一次工具调用（尚未分配 correlation id）
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub tool: String,
    pub args: Value,
}

/// 模型的结构化意图
#[derive(Debug, Clone, Default)]
pub struct ModelOutput {
    /// 直接回答（与 tool_calls 并存时视为暂定，由路由层扣留）
    pub answer: Option<String>,
    /// 请求的工具调用，可能为空
    pub tool_calls: Vec<ToolRequest>,
    /// 请求移交到的策略名
    pub delegate: Option<String>,
}

impl ModelOutput {
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            answer: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn tool_call(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool_calls: vec![ToolRequest {
                tool: tool.into(),
                args,
            }],
            ..Self::default()
        }
    }

    pub fn delegate(strategy: impl Into<String>) -> Self {
        Self {
            delegate: Some(strategy.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.answer.is_none() && self.tool_calls.is_empty() && self.delegate.is_none()
    }
}

/// 解析补全文本。接受的意图形态：
/// - `{"tool": "...", "args": {...}}` 单个工具调用
/// - `{"tool_calls": [{"tool": "...", "args": {...}}, ...]}` 批量
/// - `{"delegate": "..."}` 策略移交
/// - `{"answer": "..."}` / `{"response": "..."}` 显式回答
/// - 其余文本整体作为直接回答
pub fn parse_model_output(raw: &str) -> Result<ModelOutput, ModelError> {
    let trimmed = raw.trim();

    // 只有 ```json 围栏或整体以 '{' 开头才视为意图 JSON；正文中途的花括号当普通文本
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim())
    } else if trimmed.starts_with('{') {
        match trimmed.rfind('}') {
            Some(end) => &trimmed[..=end],
            None => return Err(ModelError::Malformed(format!("unclosed intent: {trimmed}"))),
        }
    } else {
        return Ok(ModelOutput::answer(trimmed));
    };

    // 明示了意图却解析失败，按格式错误上报让引擎重试
    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| ModelError::Malformed(format!("{e}: {json_str}")))?;

    let Some(obj) = value.as_object() else {
        return Ok(ModelOutput::answer(trimmed));
    };

    let mut output = ModelOutput::default();

    if let Some(text) = obj
        .get("answer")
        .or_else(|| obj.get("response"))
        .and_then(|v| v.as_str())
    {
        output.answer = Some(text.to_string());
    }

    if let Some(name) = obj.get("delegate").and_then(|v| v.as_str()) {
        if !name.is_empty() {
            output.delegate = Some(name.to_string());
        }
    }

    if let Some(calls) = obj.get("tool_calls").and_then(|v| v.as_array()) {
        for call in calls {
            output.tool_calls.push(parse_tool_request(call)?);
        }
    } else if obj.get("tool").is_some() {
        let request = parse_tool_request(&value)?;
        if !request.tool.is_empty() {
            output.tool_calls.push(request);
        }
    }

    if output.is_empty() {
        // JSON 合法但无任何已知意图键：整体视为文本回答
        return Ok(ModelOutput::answer(trimmed));
    }
    Ok(output)
}

fn parse_tool_request(value: &Value) -> Result<ToolRequest, ModelError> {
    let tool = value
        .get("tool")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ModelError::Malformed(format!("tool call without a name: {value}")))?;
    let args = value
        .get("args")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    Ok(ToolRequest {
        tool: tool.to_string(),
        args,
    })
}
