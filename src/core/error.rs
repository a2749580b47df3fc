//! Agent 错误类型与任务边界恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定跳过任务、记录错误后跳过，还是终止整个批次。

use thiserror::Error;

use crate::llm::LlmError;

/// 运行过程中可能出现的错误（模型后端、提示构造、浏览器环境、评估、配置等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型后端失败或拒绝请求；在任务边界处被捕获，该任务放弃评分
    #[error("LLM provider error: {0}")]
    Provider(#[from] LlmError),

    #[error("Prompt error: {0}")]
    Prompt(String),

    /// 浏览器环境本身不可用（启动失败、会话断开）；元素不存在等动作级失败不走这里
    #[error("Browser environment error: {0}")]
    Environment(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Task config error: {0}")]
    TaskConfig(String),

    /// 启动期配置错误（动作集与观察类型不兼容、站点 URL 缺失、不支持的 provider/mode）
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cancelled")]
    Cancelled,
}

/// 恢复引擎根据错误类型给出的任务边界动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 模型后端错误：记录日志后跳过该任务，不计分
    SkipTask(String),
    /// 其它错误：写入 error.txt 后跳过该任务
    RecordAndSkip(String),
    /// 终止整个批次（配置错误、取消）
    AbortBatch(String),
}
