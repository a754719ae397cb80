//! 模型层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod output;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use mock::{MockModelClient, ScriptedModelClient};
pub use openai::{OpenAiModelClient, TokenUsage};
pub use output::{parse_model_output, ModelOutput, ToolRequest};
pub use traits::{ModelClient, ModelError};
