//! Agent 组装
//!
//! 从 AppConfig 构建：模型客户端、两个角色各自的提示构造器、动作解释器、PlanSession，
//! 以及浏览器环境工厂。main 与集成测试都通过这里得到可运行的组件。

use std::sync::Arc;

use crate::action::ActionInterpreter;
use crate::browser::BrowserEnvFactory;
use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{create_client, LlmClient};
use crate::plan::{GlobalPlanner, LocalAgent, PlanSession};
use crate::prompt::{Instruction, PromptConstructor, PromptedLm};

/// 预构建的 Agent 组件
pub struct AgentComponents {
    pub session: PlanSession,
    /// 模糊匹配评估的判分模型
    pub judge: Arc<dyn LlmClient>,
}

/// 按 [llm] 段创建客户端
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    Ok(create_client(
        &cfg.llm.provider,
        &cfg.llm.model,
        cfg.llm.base_url.as_deref(),
    )?)
}

/// 用给定客户端构建两个角色与执行循环；客户端由调用方注入便于测试
pub fn create_plan_session(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Result<PlanSession, AgentError> {
    let mode = cfg.lm_mode()?;
    let gen = cfg.generation_config();
    let url_mapper = cfg.sites.url_mapper();

    let global_instruction = Instruction::load_or(
        cfg.agent.global_instruction_path.as_deref(),
        Instruction::builtin_global,
    )?;
    let local_instruction = Instruction::load_or(
        cfg.agent.local_instruction_path.as_deref(),
        Instruction::builtin_local,
    )?;

    let global = PromptConstructor::new(global_instruction, mode)
        .with_max_obs_length(gen.max_obs_length)
        .with_url_mapper(url_mapper.clone());
    let local = PromptConstructor::new(local_instruction, mode)
        .with_max_obs_length(gen.max_obs_length)
        .with_url_mapper(url_mapper.clone());

    let interpreter = ActionInterpreter::new(cfg.action_set()?, local.action_splitter())
        .with_url_mapper(url_mapper);

    tracing::info!(
        provider = %cfg.llm.provider,
        model = %cfg.llm.model,
        mode = ?mode,
        action_set = %cfg.agent.action_set_tag,
        "agent created"
    );

    Ok(PlanSession::new(
        GlobalPlanner::new(PromptedLm::new(llm.clone(), gen.clone(), global)),
        LocalAgent::new(PromptedLm::new(llm, gen, local), interpreter),
        cfg.early_stop_config(),
    ))
}

pub fn create_agent_components(cfg: &AppConfig) -> Result<AgentComponents, AgentError> {
    let llm = create_llm_from_config(cfg)?;
    let judge = match &cfg.llm.judge_model {
        Some(model) if !model.trim().is_empty() => {
            create_client(&cfg.llm.provider, model, cfg.llm.base_url.as_deref())?
        }
        _ => llm.clone(),
    };
    Ok(AgentComponents {
        session: create_plan_session(cfg, llm)?,
        judge,
    })
}

/// 真实浏览器环境；未启用 feature "browser" 时为配置错误
#[cfg(feature = "browser")]
pub fn create_env_factory(cfg: &AppConfig) -> Result<Arc<dyn BrowserEnvFactory>, AgentError> {
    Ok(Arc::new(crate::browser::ChromeEnvFactory::new(cfg.browser.clone())))
}

#[cfg(not(feature = "browser"))]
pub fn create_env_factory(_cfg: &AppConfig) -> Result<Arc<dyn BrowserEnvFactory>, AgentError> {
    Err(AgentError::ConfigError(
        "this build has no browser environment; rebuild with --features browser".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_with_mock_provider() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        assert!(create_agent_components(&cfg).is_ok());
    }

    #[test]
    fn test_unknown_provider_is_provider_error() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "nope".to_string();
        assert!(matches!(
            create_agent_components(&cfg),
            Err(AgentError::Provider(_))
        ));
    }
}
