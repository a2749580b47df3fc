//! 提示构造：指令 + 当前状态 -> PromptInput
//!
//! 每种响应类型对应一个 meta prompt 与一组示例；meta prompt 追加在 intro 之后，
//! 当前输入由格式模板渲染，附加阶段上下文。chat / completion 的差异只在最后一步适配。

use std::sync::Arc;

use crate::core::{AgentError, StateInfo};
use crate::llm::{GenerationConfig, LlmClient, LmMode, Message, PromptInput};
use crate::prompt::{Instruction, TokenEstimator};
use crate::sites::UrlMapper;

/// 响应类型：全局规划器 4 种，局部智能体 6 种
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    GlobalPlan,
    Decide,
    GlobalRevise,
    Collation,
    LocalPlan,
    PassCheck,
    FalseCheck,
    LocalRevise,
    Overruled,
    Request,
}

impl ResponseKind {
    pub fn meta_key(&self) -> &'static str {
        match self {
            Self::GlobalPlan => "global_plan",
            Self::Decide => "decide",
            Self::GlobalRevise | Self::LocalRevise => "revise",
            Self::Collation => "collation",
            Self::LocalPlan => "local_plan",
            Self::PassCheck => "pass_check",
            Self::FalseCheck => "false_check",
            Self::Overruled => "overruled",
            Self::Request => "request",
        }
    }

    pub fn examples_key(&self) -> String {
        format!("{}_examples", self.meta_key())
    }
}

/// 单次提示所需的上下文
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub objective: String,
    pub url: String,
    pub observation: String,
    pub previous_action: String,
    /// 填入 meta prompt 的 `{reasons}`
    pub reasons: Option<String>,
    /// 追加在模板之后的附加段落（标题, 内容）
    pub sections: Vec<(String, String)>,
}

impl PromptContext {
    pub fn new(objective: &str, state: &StateInfo, previous_action: &str) -> Self {
        Self {
            objective: objective.to_string(),
            url: state.url.clone(),
            observation: state.observation.clone(),
            previous_action: previous_action.to_string(),
            reasons: None,
            sections: Vec::new(),
        }
    }

    pub fn with_reasons(mut self, reasons: impl Into<String>) -> Self {
        self.reasons = Some(reasons.into());
        self
    }

    pub fn with_section(mut self, title: impl Into<String>, content: impl Into<String>) -> Self {
        self.sections.push((title.into(), content.into()));
        self
    }
}

/// 单遍渲染 `{name}` 占位符；值中的花括号不会被二次展开。
/// 模板里出现但没有值的关键字占位符视为错误。
pub fn render_template(
    template: &str,
    values: &[(&str, &str)],
    keywords: &[String],
) -> Result<String, AgentError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let name = &after[..close];
        if let Some((_, value)) = values.iter().find(|(k, _)| *k == name) {
            out.push_str(value);
        } else if keywords.iter().any(|k| k == name) {
            return Err(AgentError::Prompt(format!("unsubstituted placeholder {{{}}}", name)));
        } else {
            out.push('{');
            out.push_str(name);
            out.push('}');
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// 提示构造器：一个角色一份指令
#[derive(Debug, Clone)]
pub struct PromptConstructor {
    instruction: Instruction,
    mode: LmMode,
    max_obs_length: usize,
    url_mapper: UrlMapper,
}

impl PromptConstructor {
    pub fn new(instruction: Instruction, mode: LmMode) -> Self {
        Self {
            instruction,
            mode,
            max_obs_length: 0,
            url_mapper: UrlMapper::default(),
        }
    }

    pub fn with_max_obs_length(mut self, max_obs_length: usize) -> Self {
        self.max_obs_length = max_obs_length;
        self
    }

    pub fn with_url_mapper(mut self, url_mapper: UrlMapper) -> Self {
        self.url_mapper = url_mapper;
        self
    }

    pub fn instruction(&self) -> &Instruction {
        &self.instruction
    }

    pub fn action_splitter(&self) -> &str {
        &self.instruction.meta_data.action_splitter
    }

    /// 渲染当前输入：模板 + 附加段落
    pub fn render_current(&self, ctx: &PromptContext) -> Result<String, AgentError> {
        let observation = TokenEstimator::truncate_to_tokens(&ctx.observation, self.max_obs_length);
        let observation = self.url_mapper.to_real(observation);
        let url = self.url_mapper.to_real(&ctx.url);
        let mut current = render_template(
            &self.instruction.template,
            &[
                ("objective", ctx.objective.as_str()),
                ("url", url.as_str()),
                ("observation", observation.as_str()),
                ("previous_action", ctx.previous_action.as_str()),
            ],
            &self.instruction.meta_data.keywords,
        )?;
        for (title, content) in &ctx.sections {
            current.push('\n');
            current.push_str(title);
            current.push_str(": ");
            current.push_str(content);
        }
        Ok(current)
    }

    pub fn construct(&self, kind: ResponseKind, ctx: &PromptContext) -> Result<PromptInput, AgentError> {
        let meta = self.instruction.meta_prompt(kind.meta_key()).ok_or_else(|| {
            AgentError::Prompt(format!("no meta prompt for response kind '{}'", kind.meta_key()))
        })?;
        let reasons = ctx.reasons.as_deref().unwrap_or("N/A");
        let meta = render_template(meta, &[("reasons", reasons)], &[])?;
        let intro = format!("{}{}", self.instruction.intro, meta);
        let current = self.render_current(ctx)?;
        let examples = self.instruction.examples_for(&kind.examples_key());
        Ok(self.to_api_input(&intro, examples, &current))
    }

    fn to_api_input(&self, intro: &str, examples: &[(String, String)], current: &str) -> PromptInput {
        match self.mode {
            LmMode::Chat => {
                let mut messages = vec![Message::system(intro)];
                for (x, y) in examples {
                    messages.push(Message::system(x.clone()).with_name("example_user"));
                    messages.push(Message::system(y.clone()).with_name("example_assistant"));
                }
                messages.push(Message::user(current));
                PromptInput::Chat(messages)
            }
            LmMode::Completion => {
                let mut text = format!("{}\n\n", intro);
                text.push_str("Here are a few examples:\n");
                for (x, y) in examples {
                    text.push_str(&format!("Observation\n:{}\n\n", x));
                    text.push_str(&format!("Action: {}\n\n", y));
                }
                text.push_str("Now make prediction given the observation\n\n");
                text.push_str(&format!("Observation\n:{}\n\n", current));
                text.push_str("Action:");
                PromptInput::Text(text)
            }
        }
    }
}

/// 一个角色的模型入口：客户端 + 生成参数 + 提示构造器
#[derive(Clone)]
pub struct PromptedLm {
    llm: Arc<dyn LlmClient>,
    gen: GenerationConfig,
    constructor: PromptConstructor,
}

impl PromptedLm {
    pub fn new(llm: Arc<dyn LlmClient>, gen: GenerationConfig, constructor: PromptConstructor) -> Self {
        Self { llm, gen, constructor }
    }

    pub fn constructor(&self) -> &PromptConstructor {
        &self.constructor
    }

    /// 构造提示并调用模型，返回原始文本
    pub async fn ask(&self, kind: ResponseKind, ctx: &PromptContext) -> Result<String, AgentError> {
        let prompt = self.constructor.construct(kind, ctx)?;
        let response = self.llm.complete(&prompt, &self.gen).await?;
        tracing::debug!(kind = kind.meta_key(), response = %response, "model response");
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    fn state() -> StateInfo {
        StateInfo::new("[1] RootWebArea 'Shop'", "http://localhost:7770/")
    }

    fn local(mode: LmMode) -> PromptConstructor {
        PromptConstructor::new(Instruction::builtin_local().unwrap(), mode)
    }

    #[test]
    fn test_render_template_single_pass() {
        let keywords = vec!["objective".to_string(), "url".to_string()];
        let out = render_template(
            "{objective} @ {url} {other}",
            &[("objective", "find {url}"), ("url", "x")],
            &keywords,
        )
        .unwrap();
        assert_eq!(out, "find {url} @ x {other}");
    }

    #[test]
    fn test_render_template_missing_keyword_is_error() {
        let keywords = vec!["url".to_string()];
        let err = render_template("URL: {url}", &[], &keywords).unwrap_err();
        assert!(matches!(err, AgentError::Prompt(_)));
    }

    #[test]
    fn test_chat_prompt_layout() {
        let ctx = PromptContext::new("What is the price?", &state(), "None")
            .with_section("CURRENT SUBTASK", "Read the price");
        let prompt = local(LmMode::Chat).construct(ResponseKind::LocalPlan, &ctx).unwrap();
        let PromptInput::Chat(messages) = prompt else {
            panic!("expected chat prompt");
        };
        // intro + 1 个示例对 + 当前输入
        assert_eq!(messages.len(), 4);
        assert!(messages[0].content.contains("## Local plan"));
        assert_eq!(messages[1].name.as_deref(), Some("example_user"));
        assert_eq!(messages[2].name.as_deref(), Some("example_assistant"));
        let last = messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.content.contains("OBJECTIVE: What is the price?"));
        assert!(last.content.contains("CURRENT SUBTASK: Read the price"));
    }

    #[test]
    fn test_completion_prompt_ends_with_action() {
        let ctx = PromptContext::new("goal", &state(), "None");
        let prompt = local(LmMode::Completion).construct(ResponseKind::PassCheck, &ctx).unwrap();
        let PromptInput::Text(text) = prompt else {
            panic!("expected text prompt");
        };
        assert!(text.contains("Here are a few examples:\n"));
        assert!(text.ends_with("Action:"));
    }

    #[test]
    fn test_reasons_filled_into_meta_prompt() {
        let ctx = PromptContext::new("goal", &state(), "None").with_reasons("the search box is gone");
        let prompt = local(LmMode::Chat).construct(ResponseKind::LocalRevise, &ctx).unwrap();
        assert!(prompt.flatten().contains("Your reasons: the search box is gone"));
    }

    #[test]
    fn test_unknown_kind_for_role_is_prompt_error() {
        let ctx = PromptContext::new("goal", &state(), "None");
        let err = local(LmMode::Chat).construct(ResponseKind::Decide, &ctx).unwrap_err();
        assert!(matches!(err, AgentError::Prompt(_)));
    }

    #[test]
    fn test_url_shown_as_real_domain_and_observation_truncated() {
        let mapper = UrlMapper::new(vec![(
            "http://localhost:7770".to_string(),
            "http://onestopmarket.com".to_string(),
        )]);
        let constructor = local(LmMode::Chat)
            .with_url_mapper(mapper)
            .with_max_obs_length(2);
        let current = constructor
            .render_current(&PromptContext::new("goal", &state(), "None"))
            .unwrap();
        assert!(current.contains("URL: http://onestopmarket.com/"));
        assert!(current.contains("OBSERVATION:\n[1] Root\n"));
    }
}
