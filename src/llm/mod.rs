//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod deepseek;
pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{create_deepseek_client, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT};
pub use message::{Message, Role};
pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{GenerationConfig, LlmClient, LlmError, LmConfig, LmMode, PromptInput};

/// 按 provider 创建客户端；未知 provider 为配置错误
pub fn create_client(
    provider: &str,
    model: &str,
    base_url: Option<&str>,
) -> Result<Arc<dyn LlmClient>, LlmError> {
    match provider.trim().to_lowercase().as_str() {
        "openai" => Ok(Arc::new(OpenAiClient::new(base_url, model, None))),
        "deepseek" => Ok(Arc::new(create_deepseek_client(model, base_url))),
        "mock" => Ok(Arc::new(MockLlmClient)),
        other => Err(LlmError::Unsupported(format!("provider '{}'", other))),
    }
}
