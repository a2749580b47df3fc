//! Global Planner：拆解任务为多阶段全局计划，裁决重规划请求，整理最终结果

use crate::core::{AgentError, TaskState};
use crate::plan::{
    parse_collation_result, parse_decide_result, parse_global_plan, parse_revise_result,
    DecideResult, GlobalPlan, ReplanRequest,
};
use crate::prompt::{PromptContext, PromptedLm, ResponseKind};

/// 全局规划器：持有自己的指令与模型入口
pub struct GlobalPlanner {
    lm: PromptedLm,
}

impl GlobalPlanner {
    pub fn new(lm: PromptedLm) -> Self {
        Self { lm }
    }

    fn context(state: &TaskState) -> PromptContext {
        PromptContext::new(
            &state.intent,
            state.trajectory.last_state(),
            state.previous_action(),
        )
    }

    /// 初始全局计划
    pub async fn global_plan(&self, state: &TaskState) -> Result<GlobalPlan, AgentError> {
        let response = self
            .lm
            .ask(ResponseKind::GlobalPlan, &Self::context(state))
            .await?;
        let plan = parse_global_plan(&response);
        tracing::info!(task_id = %state.task_id, phases = plan.len(), "global plan created");
        Ok(plan)
    }

    /// 对局部智能体的重规划请求做出裁决
    pub async fn decide_replan(
        &self,
        state: &TaskState,
        request: &ReplanRequest,
    ) -> Result<DecideResult, AgentError> {
        let ctx = Self::context(state)
            .with_reasons(request.reasons.clone())
            .with_section("GLOBAL PLAN", state.global_plan.to_prompt_text())
            .with_section("CURRENT PHASE", request.phase.to_string());
        let response = self.lm.ask(ResponseKind::Decide, &ctx).await?;
        let decision = parse_decide_result(&response);
        tracing::info!(
            task_id = %state.task_id,
            decision = ?decision.decision(),
            "replan decision"
        );
        Ok(decision)
    }

    /// 同意重规划后产出全新的全局计划（不在旧计划上修改）
    pub async fn revise_global_plan(
        &self,
        state: &TaskState,
        reasons: &str,
    ) -> Result<GlobalPlan, AgentError> {
        let ctx = Self::context(state)
            .with_reasons(reasons)
            .with_section("PREVIOUS GLOBAL PLAN", state.global_plan.to_prompt_text());
        let response = self.lm.ask(ResponseKind::GlobalRevise, &ctx).await?;
        let plan = parse_revise_result(&response)
            .map(|revised| parse_global_plan(&revised))
            .filter(|plan| !plan.is_empty())
            .unwrap_or_else(|| parse_global_plan(&response));
        Ok(plan)
    }

    /// 任务结束后整理最终结果
    pub async fn collate_result(&self, state: &TaskState) -> Result<Option<String>, AgentError> {
        let ctx = Self::context(state)
            .with_section("GLOBAL PLAN", state.global_plan.to_prompt_text())
            .with_section("ACTION HISTORY", state.action_history.join("\n"));
        let response = self.lm.ask(ResponseKind::Collation, &ctx).await?;
        Ok(parse_collation_result(&response))
    }
}
