//! Replan Coordinator：在局部智能体的请求与全局规划器的裁决之间协调
//!
//! 裁决期间持有 `&mut TaskState`，同一个全局计划上不会有并发的重规划请求。

use crate::core::{AgentError, TaskState};
use crate::plan::{GlobalPlan, GlobalPlanner, PlanEvent, ReplanDecision, ReplanRequest};

/// 裁决结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbitrationOutcome {
    /// 已换上全新的全局计划，从第 0 阶段重新开始
    Replanned { plan: GlobalPlan, resume_phase: usize },
    /// 保持全局计划，局部智能体按 guidance 修订局部计划
    Overruled { guidance: String },
}

pub struct ReplanCoordinator<'a> {
    planner: &'a GlobalPlanner,
}

impl<'a> ReplanCoordinator<'a> {
    pub fn new(planner: &'a GlobalPlanner) -> Self {
        Self { planner }
    }

    pub async fn arbitrate(
        &self,
        state: &mut TaskState,
        request: &ReplanRequest,
    ) -> Result<ArbitrationOutcome, AgentError> {
        state.record(PlanEvent::ReplanRequested {
            phase: request.phase,
            reasons: request.reasons.clone(),
        });
        let decision = self.planner.decide_replan(state, request).await?;
        let guidance = decision.reasons.clone().unwrap_or_default();

        match decision.decision() {
            ReplanDecision::Replan => {
                let plan = self.planner.revise_global_plan(state, &request.reasons).await?;
                if plan.is_empty() {
                    tracing::warn!(task_id = %state.task_id, "revised global plan is empty, keeping current plan");
                    let guidance = format!(
                        "The global plan could not be revised; continue with the current plan. {}",
                        guidance
                    )
                    .trim_end()
                    .to_string();
                    state.record(PlanEvent::Overruled {
                        guidance: guidance.clone(),
                    });
                    return Ok(ArbitrationOutcome::Overruled { guidance });
                }
                state.install_plan(plan.clone());
                tracing::info!(
                    task_id = %state.task_id,
                    revision = state.plan_revision,
                    phases = plan.len(),
                    "global plan revised"
                );
                Ok(ArbitrationOutcome::Replanned {
                    plan,
                    resume_phase: 0,
                })
            }
            ReplanDecision::Overrule => {
                tracing::info!(task_id = %state.task_id, guidance = %guidance, "replan request overruled");
                state.record(PlanEvent::Overruled {
                    guidance: guidance.clone(),
                });
                Ok(ArbitrationOutcome::Overruled { guidance })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::StateInfo;
    use crate::llm::{GenerationConfig, LmMode, ScriptedLlmClient};
    use crate::plan::parse_global_plan;
    use crate::prompt::{Instruction, PromptConstructor, PromptedLm};

    const TWO_PHASES: &str = "**Subtask 1: Open**\n- **Subtask**: Open products\n- **Expected State**: Products page\n\n\
        **Subtask 2: Answer**\n- **Subtask**: Report the price\n- **Expected State**: Price reported\n";
    const ONE_PHASE: &str = "**Subtask 1: Search**\n- **Subtask**: Search the catalog\n- **Expected State**: Results listed\n";

    fn planner(llm: Arc<ScriptedLlmClient>) -> GlobalPlanner {
        let global = PromptConstructor::new(Instruction::builtin_global().unwrap(), LmMode::Chat);
        GlobalPlanner::new(PromptedLm::new(llm, GenerationConfig::default(), global))
    }

    /// 第二阶段中途发起请求的任务状态
    fn state_in_phase_two() -> TaskState {
        let mut state = TaskState::new("7", "find the price", StateInfo::new("[1] link 'Products'", "http://shop/"));
        state.install_plan(parse_global_plan(TWO_PHASES));
        state.phase_index = 1;
        state
    }

    fn request() -> ReplanRequest {
        ReplanRequest {
            reasons: "the store has no products page".to_string(),
            phase: 2,
        }
    }

    #[tokio::test]
    async fn test_replan_installs_new_plan_from_phase_zero() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .on("## Replan decision", ["Decision: replan\nReasons: agreed"])
                .on("## Global revision", [format!("Revised Plan:\n{}", ONE_PHASE)]),
        );
        let planner = planner(llm);
        let mut state = state_in_phase_two();
        let before = state.global_plan.clone();

        let outcome = ReplanCoordinator::new(&planner)
            .arbitrate(&mut state, &request())
            .await
            .unwrap();

        match outcome {
            ArbitrationOutcome::Replanned { plan, resume_phase } => {
                assert_eq!(resume_phase, 0);
                assert_ne!(plan, before);
                assert_eq!(plan, state.global_plan);
            }
            other => panic!("expected a new plan, got {:?}", other),
        }
        assert_eq!(state.phase_index, 0);
        assert_eq!(state.plan_revision, 2);
        assert_eq!(state.global_plan.phases[0].subtask, "Search the catalog");
    }

    #[tokio::test]
    async fn test_overrule_keeps_plan_and_passes_guidance() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .on("## Replan decision", ["Decision: overrule\nReasons: use the search box instead"]),
        );
        let planner = planner(llm.clone());
        let mut state = state_in_phase_two();
        let before = state.global_plan.clone();

        let outcome = ReplanCoordinator::new(&planner)
            .arbitrate(&mut state, &request())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ArbitrationOutcome::Overruled {
                guidance: "use the search box instead".to_string()
            }
        );
        assert_eq!(state.global_plan, before);
        assert_eq!(state.phase_index, 1);
        assert_eq!(state.plan_revision, 1);
        assert_eq!(llm.hits("## Global revision"), 0);
        assert!(state
            .events
            .iter()
            .any(|e| matches!(e, PlanEvent::Overruled { guidance } if guidance == "use the search box instead")));
    }

    #[tokio::test]
    async fn test_empty_revised_plan_is_treated_as_overrule() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .on("## Replan decision", ["Decision: replan\nReasons: agreed"])
                .on("## Global revision", ["Revised Plan: I am not sure how to proceed."]),
        );
        let planner = planner(llm);
        let mut state = state_in_phase_two();
        let before = state.global_plan.clone();

        let outcome = ReplanCoordinator::new(&planner)
            .arbitrate(&mut state, &request())
            .await
            .unwrap();

        match outcome {
            ArbitrationOutcome::Overruled { guidance } => {
                assert!(guidance.starts_with("The global plan could not be revised"));
                assert!(guidance.ends_with("agreed"));
            }
            other => panic!("expected an overrule, got {:?}", other),
        }
        assert_eq!(state.global_plan, before);
        assert_eq!(state.phase_index, 1);
        assert_eq!(state.plan_revision, 1);
    }
}
