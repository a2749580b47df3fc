//! OpenAI 兼容 API 客户端
//!
//! chat 模式通过 async_openai 调用 `/chat/completions`；completion 模式直接 POST `/completions`。
//! 可配置 base_url，支持 OpenAI、DeepSeek、自建代理等。

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
use serde::Deserialize;

use crate::llm::{GenerationConfig, LlmClient, LlmError, Message, PromptInput, Role};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

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

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct CompletionUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| OPENAI_BASE_URL.to_string());

        let config = OpenAIConfig::new()
            .with_api_base(base_url.clone())
            .with_api_key(api_key.clone());

        Self {
            client: Client::with_config(config),
            http: reqwest::Client::new(),
            base_url,
            api_key,
            model: model.to_string(),
            usage: TokenUsage::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let invalid = |e: async_openai::error::OpenAIError| LlmError::InvalidRequest(e.to_string());
        messages
            .iter()
            .map(|m| {
                let msg = match m.role {
                    Role::System => {
                        let mut args = ChatCompletionRequestSystemMessageArgs::default();
                        args.content(m.content.clone());
                        if let Some(name) = &m.name {
                            args.name(name.clone());
                        }
                        ChatCompletionRequestMessage::System(args.build().map_err(invalid)?)
                    }
                    Role::User => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(invalid)?,
                    ),
                    Role::Assistant => ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(invalid)?,
                    ),
                };
                Ok(msg)
            })
            .collect()
    }

    #[allow(deprecated)]
    async fn complete_chat(
        &self,
        messages: &[Message],
        gen: &GenerationConfig,
    ) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(messages)?)
            .temperature(gen.temperature)
            .top_p(gen.top_p)
            .max_tokens(gen.max_tokens)
            .build()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        // 提取 token 使用统计
        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or(LlmError::EmptyResponse)?;
        Ok(cut_at_stop(content, gen.stop_token.as_deref()))
    }

    async fn complete_text(&self, prompt: &str, gen: &GenerationConfig) -> Result<String, LlmError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "temperature": gen.temperature,
            "top_p": gen.top_p,
            "max_tokens": gen.max_tokens,
        });
        if let Some(stop) = &gen.stop_token {
            body["stop"] = serde_json::Value::String(stop.clone());
        }

        let response = self
            .http
            .post(format!("{}/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{}: {}", status, text)));
        }
        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Api(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or(LlmError::EmptyResponse)
    }
}

/// 在 stop token 处截断（chat 接口不传 stop，本地截断）
fn cut_at_stop(content: String, stop: Option<&str>) -> String {
    match stop.filter(|s| !s.is_empty()) {
        Some(stop) => match content.find(stop) {
            Some(idx) => content[..idx].to_string(),
            None => content,
        },
        None => content,
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, prompt: &PromptInput, gen: &GenerationConfig) -> Result<String, LlmError> {
        tracing::debug!(model = %self.model, "llm request");
        match prompt {
            PromptInput::Chat(messages) => self.complete_chat(messages, gen).await,
            PromptInput::Text(text) => self.complete_text(text, gen).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_at_stop() {
        assert_eq!(cut_at_stop("abc```stop".to_string(), Some("stop")), "abc```");
        assert_eq!(cut_at_stop("abc".to_string(), None), "abc");
        assert_eq!(cut_at_stop("abc".to_string(), Some("")), "abc");
    }

    #[test]
    fn test_token_usage_accumulates() {
        let usage = TokenUsage::new();
        usage.add(10, 5);
        usage.add(1, 1);
        assert_eq!(usage.get(), (11, 6, 17));
    }
}
