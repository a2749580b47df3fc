//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：给定提示（消息序列或纯文本）与生成参数，返回一段文本。
//! chat / completion 的差异只体现在 PromptInput 上，由提示构造器负责适配。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::Message;

/// 模型后端错误；与动作/计划的解析失败严格区分
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Empty response from model")]
    EmptyResponse,
}

/// 调用方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LmMode {
    Chat,
    Completion,
}

impl LmMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "chat" => Some(Self::Chat),
            "completion" => Some(Self::Completion),
            _ => None,
        }
    }
}

/// 生成参数（构造后只读，两个角色共享）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    /// 0 表示不限制
    pub context_length: u32,
    pub max_tokens: u32,
    pub stop_token: Option<String>,
    /// 观察文本的最大估算 token 数，0 表示不截断
    pub max_obs_length: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.9,
            context_length: 0,
            max_tokens: 384,
            stop_token: None,
            max_obs_length: 1920,
        }
    }
}

/// 模型配置：provider、模型名、调用方式与生成参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmConfig {
    pub provider: String,
    pub model: String,
    pub mode: LmMode,
    pub gen: GenerationConfig,
}

/// 提示：chat 模式为角色消息序列，completion 模式为单段文本
#[derive(Debug, Clone, PartialEq)]
pub enum PromptInput {
    Chat(Vec<Message>),
    Text(String),
}

impl PromptInput {
    /// 拍平为一段文本（日志、Mock 匹配用）
    pub fn flatten(&self) -> String {
        match self {
            Self::Chat(messages) => messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Text(text) => text.clone(),
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 单次完成，无超时也无取消；步数上限由早停规则兜底
    async fn complete(&self, prompt: &PromptInput, gen: &GenerationConfig) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
