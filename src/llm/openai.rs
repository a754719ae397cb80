//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 补全文本经 parse_model_output 转为结构化意图后返回。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{parse_model_output, ModelClient, ModelError, ModelOutput};
use crate::memory::{Turn, TurnBody};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，infer 时转 Turn 为 API 格式并解析首条 content
pub struct OpenAiModelClient {
    client: Client<OpenAIConfig>,
    model: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiModelClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            usage: TokenUsage::new(),
        }
    }

    /// Turn -> 对话消息。ToolCall/ToolResult 以文本形式回放给模型，
    /// correlation id 一并带上以便模型对应多路结果。
    fn to_chat_messages(&self, system: &str, turns: &[Turn]) -> Vec<ChatCompletionRequestMessage> {
        let mut messages = vec![ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system.to_string())
                .build()
                .unwrap(),
        )];
        for turn in turns {
            let message = match &turn.body {
                TurnBody::UserMessage { text } => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(text.clone())
                        .build()
                        .unwrap(),
                ),
                TurnBody::AssistantMessage { text } => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(text.clone())
                        .build()
                        .unwrap(),
                ),
                TurnBody::ToolCall { call } => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(format!(
                            "Tool call {} ({}): {}",
                            call.tool, call.correlation_id, call.args
                        ))
                        .build()
                        .unwrap(),
                ),
                TurnBody::ToolResult { result } => {
                    let body = if result.ok {
                        result.output.clone()
                    } else {
                        format!("Error: {}", result.output)
                    };
                    ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(format!("Observation ({}): {}", result.correlation_id, body))
                            .build()
                            .unwrap(),
                    )
                }
                TurnBody::SystemNote { text } => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(text.clone())
                        .build()
                        .unwrap(),
                ),
            };
            messages.push(message);
        }
        messages
    }
}

#[async_trait]
impl ModelClient for OpenAiModelClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn infer(&self, turns: &[Turn], system_prompt: &str) -> Result<ModelOutput, ModelError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_chat_messages(system_prompt, turns))
            .build()
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(classify_api_error)?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        parse_model_output(&content)
    }
}

/// 限流与其他 API 错误分开上报，退避节奏由引擎决定
fn classify_api_error(err: async_openai::error::OpenAIError) -> ModelError {
    let text = err.to_string();
    let lowered = text.to_lowercase();
    if lowered.contains("429") || lowered.contains("rate limit") {
        ModelError::RateLimited {
            retry_after_ms: 1000,
        }
    } else {
        ModelError::Unavailable(text)
    }
}
