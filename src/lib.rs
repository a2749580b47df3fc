//! Wayfinder - 两级规划的 LLM 网页浏览智能体
//!
//! 模块划分：
//! - **agent**: 从配置组装模型、提示构造器与执行循环
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、轨迹、任务状态、渲染、批量运行
//! - **action**: 类型化浏览器动作与动作解释器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **prompt**: 指令加载与提示构造（chat / completion）
//! - **plan**: 全局规划器、局部智能体、重规划协调、早停、分阶段执行循环
//! - **browser**: 浏览器环境抽象与实现
//! - **evaluation**: 基准任务评估
//! - **task**: 任务配置
//! - **sites**: 站点地址、URL 映射与测试数据准备

pub mod action;
pub mod agent;
pub mod browser;
pub mod config;
pub mod core;
pub mod evaluation;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod prompt;
pub mod sites;
pub mod task;

pub use agent::{create_agent_components, create_plan_session, AgentComponents};
pub use core::{AgentError, SessionDriver};
pub use plan::PlanSession;
