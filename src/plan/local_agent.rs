//! Local Agent：把当前阶段拆成页面动作，校验执行结果，修订局部计划或请求重规划

use crate::action::{Action, ActionInterpreter};
use crate::core::{AgentError, TaskState};
use crate::plan::{
    parse_check_result, parse_local_plan, parse_request_result, parse_revise_result, CheckResult,
    LocalPlan, PhaseTask,
};
use crate::prompt::{PromptContext, PromptedLm, ResponseKind};

/// 局部智能体向全局规划器提交的重规划请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplanRequest {
    pub reasons: String,
    /// 发起请求时的阶段编号
    pub phase: usize,
}

pub struct LocalAgent {
    lm: PromptedLm,
    interpreter: ActionInterpreter,
}

impl LocalAgent {
    pub fn new(lm: PromptedLm, interpreter: ActionInterpreter) -> Self {
        Self { lm, interpreter }
    }

    fn context(state: &TaskState, phase: &PhaseTask) -> PromptContext {
        PromptContext::new(
            &state.intent,
            state.trajectory.last_state(),
            state.previous_action(),
        )
        .with_section("CURRENT SUBTASK", phase.subtask.clone())
        .with_section("EXPECTED STATE", phase.expected_state.clone())
    }

    /// 修订类响应可能带 `Revised Plan:` 前缀，也可能直接给出动作列表
    fn parse_plan_response(response: &str) -> LocalPlan {
        parse_revise_result(response)
            .map(|revised| parse_local_plan(&revised))
            .filter(|plan| !plan.is_empty())
            .unwrap_or_else(|| parse_local_plan(response))
    }

    pub async fn local_plan(&self, state: &TaskState, phase: &PhaseTask) -> Result<LocalPlan, AgentError> {
        let response = self
            .lm
            .ask(ResponseKind::LocalPlan, &Self::context(state, phase))
            .await?;
        Ok(parse_local_plan(&response))
    }

    /// 动作描述 -> 类型化动作；解析失败得到 None 哨兵
    pub fn next_action(&self, description: &str) -> Action {
        self.interpreter.interpret(description)
    }

    /// 校验最新状态是否符合阶段期望；上一步执行出错时改用异常检查提示
    pub async fn check_alignment(
        &self,
        state: &TaskState,
        phase: &PhaseTask,
        local_plan: &LocalPlan,
    ) -> Result<CheckResult, AgentError> {
        let last = state.trajectory.last_state();
        let mut ctx = Self::context(state, phase).with_section("LOCAL PLAN", local_plan.to_prompt_text());
        let kind = match &last.error {
            Some(error) => {
                ctx = ctx.with_section("EXECUTION ERROR", error.clone());
                ResponseKind::FalseCheck
            }
            None => ResponseKind::PassCheck,
        };
        let response = self.lm.ask(kind, &ctx).await?;
        Ok(parse_check_result(&response))
    }

    pub async fn revise_local_plan(
        &self,
        state: &TaskState,
        phase: &PhaseTask,
        reasons: &str,
    ) -> Result<LocalPlan, AgentError> {
        let ctx = Self::context(state, phase).with_reasons(reasons);
        let response = self.lm.ask(ResponseKind::LocalRevise, &ctx).await?;
        Ok(Self::parse_plan_response(&response))
    }

    /// 全局规划器驳回请求后，按其指导修订局部计划
    pub async fn overruled_local_plan(
        &self,
        state: &TaskState,
        phase: &PhaseTask,
        guidance: &str,
    ) -> Result<LocalPlan, AgentError> {
        let ctx = Self::context(state, phase).with_reasons(guidance);
        let response = self.lm.ask(ResponseKind::Overruled, &ctx).await?;
        Ok(Self::parse_plan_response(&response))
    }

    /// 组织重规划请求；模型未给出理由时沿用校验理由
    pub async fn request_replan(
        &self,
        state: &TaskState,
        phase: &PhaseTask,
        check_reasons: Option<&str>,
    ) -> Result<ReplanRequest, AgentError> {
        let ctx = Self::context(state, phase)
            .with_reasons(check_reasons.unwrap_or("N/A"))
            .with_section("GLOBAL PLAN", state.global_plan.to_prompt_text());
        let response = self.lm.ask(ResponseKind::Request, &ctx).await?;
        let request = parse_request_result(&response);
        let reasons = request
            .reasons
            .or_else(|| check_reasons.map(String::from))
            .unwrap_or_default();
        Ok(ReplanRequest {
            reasons,
            phase: phase.number,
        })
    }
}
