//! 分阶段执行循环（Plan → Execute → Check → Replan）
//!
//! 任务循环：取全局计划，逐阶段交给局部智能体。
//! 阶段循环：每步先过早停检查，再按局部计划取动作、执行、校验；
//! 校验结论为 move / revise / request，request 交给 ReplanCoordinator 裁决。
//! 所有可变状态都在 `&mut TaskState` 上，循环本身无状态。

use crate::action::Action;
use crate::browser::BrowserEnv;
use crate::core::{AgentError, TaskState};
use crate::plan::{
    early_stop, ArbitrationOutcome, CheckDecision, EarlyStopConfig, GlobalPlanner, LocalAgent,
    LocalPlan, PhaseTask, PlanEvent, ReplanCoordinator,
};

/// 阶段循环的出口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// 本阶段完成，进入下一阶段
    PhaseDone,
    /// 任务结束（模型 STOP 通过校验，或早停）
    TaskDone,
    /// 全局计划已被替换，从第 0 阶段重新开始
    Replanned,
}

/// 动作来源：决定 STOP 的含义
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionOrigin {
    Plan,
    Exhausted,
    EarlyStop,
}

pub struct PlanSession {
    planner: GlobalPlanner,
    local: LocalAgent,
    early_stop: EarlyStopConfig,
}

impl PlanSession {
    pub fn new(planner: GlobalPlanner, local: LocalAgent, early_stop: EarlyStopConfig) -> Self {
        Self {
            planner,
            local,
            early_stop,
        }
    }

    pub fn planner(&self) -> &GlobalPlanner {
        &self.planner
    }

    pub fn early_stop_config(&self) -> &EarlyStopConfig {
        &self.early_stop
    }

    /// 执行一个任务直到结束；评估由调用方完成
    pub async fn run_task(&self, state: &mut TaskState, env: &mut dyn BrowserEnv) -> Result<(), AgentError> {
        let plan = self.planner.global_plan(state).await?;
        if plan.is_empty() {
            let detail = "global planner returned no subtasks".to_string();
            tracing::warn!(task_id = %state.task_id, "{}", detail);
            state.record(PlanEvent::Stalled { detail });
            let stop = Action::stop("ERROR: the global plan is empty");
            self.execute(state, env, stop).await?;
            return Ok(());
        }
        state.install_plan(plan);

        while let Some(phase) = state.current_phase().cloned() {
            tracing::info!(
                task_id = %state.task_id,
                phase = phase.number,
                subtask = %phase.subtask,
                "phase started"
            );
            state.record(PlanEvent::PhaseStarted {
                phase: phase.number,
                subtask: phase.subtask.clone(),
            });

            match self.execute_phase(state, env, &phase).await? {
                PhaseOutcome::PhaseDone => state.phase_index += 1,
                PhaseOutcome::TaskDone => break,
                // install_plan 已将游标归零
                PhaseOutcome::Replanned => continue,
            }
        }

        let result = self.planner.collate_result(state).await?;
        tracing::info!(task_id = %state.task_id, result = ?result, "task collated");
        state.record(PlanEvent::Collation {
            result: result.clone(),
        });
        state.final_result = result;
        Ok(())
    }

    /// 执行动作并追加到轨迹；返回环境的 done 标记
    async fn execute(
        &self,
        state: &mut TaskState,
        env: &mut dyn BrowserEnv,
        action: Action,
    ) -> Result<bool, AgentError> {
        tracing::info!(task_id = %state.task_id, action = %action, "executing action");
        let outcome = env.step(&action).await?;
        if let Some(error) = &outcome.state.error {
            tracing::warn!(task_id = %state.task_id, error = %error, "action failed in environment");
        }
        state.push_step(action, outcome.state);
        Ok(outcome.done)
    }

    /// 单个阶段的状态机
    pub async fn execute_phase(
        &self,
        state: &mut TaskState,
        env: &mut dyn BrowserEnv,
        phase: &PhaseTask,
    ) -> Result<PhaseOutcome, AgentError> {
        let mut local_plan = self.local.local_plan(state, phase).await?;
        self.on_new_local_plan(state, phase, &local_plan);
        let mut cursor = 0usize;

        loop {
            let (stop, reason) = early_stop(&state.trajectory, &self.early_stop);
            let (action, origin) = if stop {
                tracing::info!(task_id = %state.task_id, reason = %reason, "early stop");
                state.record(PlanEvent::EarlyStop {
                    reason: reason.clone(),
                });
                state.early_stop = Some(reason.clone());
                (Action::stop(format!("Early stop: {}", reason)), ActionOrigin::EarlyStop)
            } else if let Some(description) = local_plan.get(cursor) {
                cursor += 1;
                (self.local.next_action(description), ActionOrigin::Plan)
            } else {
                let detail = format!(
                    "ERROR: local plan exhausted after {} actions without a stop action",
                    local_plan.len()
                );
                state.record(PlanEvent::Stalled {
                    detail: detail.clone(),
                });
                (Action::stop(detail), ActionOrigin::Exhausted)
            };

            let is_stop = action.is_stop();
            let done = self.execute(state, env, action).await?;

            // 早停 STOP 视为已对齐，直接结束任务
            if origin == ActionOrigin::EarlyStop {
                return Ok(PhaseOutcome::TaskDone);
            }

            let check = self.local.check_alignment(state, phase, &local_plan).await?;
            let decision = check.decision();
            tracing::info!(
                task_id = %state.task_id,
                phase = phase.number,
                decision = ?decision,
                "alignment check"
            );
            state.record(PlanEvent::Check {
                phase: phase.number,
                decision,
                reasons: check.reasons.clone(),
            });
            let reasons = check.reasons.clone().unwrap_or_default();

            match decision {
                CheckDecision::Move if is_stop && origin == ActionOrigin::Exhausted => {
                    return Ok(PhaseOutcome::PhaseDone);
                }
                CheckDecision::Move if is_stop => {
                    if !done {
                        tracing::debug!(task_id = %state.task_id, "environment did not report done on stop");
                    }
                    return Ok(PhaseOutcome::TaskDone);
                }
                CheckDecision::Move => {}
                CheckDecision::Revise => {
                    local_plan = self.local.revise_local_plan(state, phase, &reasons).await?;
                    self.on_new_local_plan(state, phase, &local_plan);
                    cursor = 0;
                }
                CheckDecision::Request => {
                    let request = self
                        .local
                        .request_replan(state, phase, check.reasons.as_deref())
                        .await?;
                    let coordinator = ReplanCoordinator::new(&self.planner);
                    match coordinator.arbitrate(state, &request).await? {
                        ArbitrationOutcome::Replanned { .. } => return Ok(PhaseOutcome::Replanned),
                        ArbitrationOutcome::Overruled { guidance } => {
                            local_plan = self.local.overruled_local_plan(state, phase, &guidance).await?;
                            self.on_new_local_plan(state, phase, &local_plan);
                            cursor = 0;
                        }
                    }
                }
            }
        }
    }

    fn on_new_local_plan(&self, state: &mut TaskState, phase: &PhaseTask, plan: &LocalPlan) {
        tracing::debug!(
            task_id = %state.task_id,
            phase = phase.number,
            actions = plan.len(),
            "local plan"
        );
        state.record(PlanEvent::LocalPlan {
            phase: phase.number,
            actions: plan.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::action::{ActionInterpreter, ActionSet, DEFAULT_ACTION_SPLITTER};
    use crate::browser::{ScriptedBrowserEnv, ScriptedPage};
    use crate::core::Trajectory;
    use crate::llm::{GenerationConfig, LmMode, ScriptedLlmClient};
    use crate::prompt::{Instruction, PromptConstructor, PromptedLm};
    use crate::task::TaskConfig;

    const START: &str = "http://shop/";

    fn session(llm: Arc<ScriptedLlmClient>, early_stop: EarlyStopConfig) -> PlanSession {
        let gen = GenerationConfig::default();
        let global = PromptConstructor::new(Instruction::builtin_global().unwrap(), LmMode::Chat);
        let local = PromptConstructor::new(Instruction::builtin_local().unwrap(), LmMode::Chat);
        PlanSession::new(
            GlobalPlanner::new(PromptedLm::new(llm.clone(), gen.clone(), global)),
            LocalAgent::new(
                PromptedLm::new(llm, gen, local),
                ActionInterpreter::new(ActionSet::IdBased, DEFAULT_ACTION_SPLITTER),
            ),
            early_stop,
        )
    }

    async fn start(env: &mut ScriptedBrowserEnv) -> TaskState {
        let task = TaskConfig::from_json(&format!(
            r#"{{"task_id": 1, "intent": "find it", "start_url": "{}", "eval": {{"eval_types": []}}}}"#,
            START
        ))
        .unwrap();
        let initial = env.reset(&task).await.unwrap();
        TaskState::new("1", "find it", initial)
    }

    fn env() -> ScriptedBrowserEnv {
        let mut pages = HashMap::new();
        pages.insert(
            START.to_string(),
            ScriptedPage::new("[1] link 'Products'\n[2] button 'Search'").with_link("1", "http://shop/products"),
        );
        pages.insert(
            "http://shop/products".to_string(),
            ScriptedPage::new("[5] StaticText 'Widget $3'"),
        );
        ScriptedBrowserEnv::new(pages)
    }

    const TWO_PHASES: &str = "**Subtask 1: Open**\n- **Subtask**: Open products\n- **Expected State**: Products page\n\n\
        **Subtask 2: Answer**\n- **Subtask**: Report the price\n- **Expected State**: Price reported\n";

    fn assert_odd(trajectory: &Trajectory) {
        assert_eq!(trajectory.len() % 2, 1);
    }

    #[tokio::test]
    async fn test_exhausted_plan_advances_phase() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .on("## Global plan", [TWO_PHASES])
                .on(
                    "## Local plan",
                    ["**Action 1:** ```click [1]```", "**Action 1:** ```stop [$3]```"],
                )
                .on("## Alignment check", ["Result: move\nReasons: ok"])
                .on("## Collation", ["Collation: $3"]),
        );
        let plan = session(llm.clone(), EarlyStopConfig::default());
        let mut env = env();
        let mut state = start(&mut env).await;
        plan.run_task(&mut state, &mut env).await.unwrap();

        // click，计划耗尽的 STOP（阶段 1 结束），阶段 2 的 STOP
        assert_eq!(state.trajectory.num_steps(), 3);
        assert_eq!(state.final_answer(), Some("$3"));
        assert_eq!(state.final_result.as_deref(), Some("$3"));
        assert_eq!(llm.hits("## Local plan"), 2);
        assert_odd(&state.trajectory);
    }

    #[tokio::test]
    async fn test_revise_replaces_local_plan() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .on("## Global plan", [TWO_PHASES])
                .on("## Local plan", ["**Action 1:** ```click [9]```"])
                .on("## Exception check", ["Result: revise\nReasons: element 9 is missing"])
                .on("## Local revision", ["Revised Plan:\n**Action 1:** ```stop [$3]```"])
                .on("## Alignment check", ["Result: move"])
                .on("## Collation", ["Collation: done"]),
        );
        let plan = session(llm.clone(), EarlyStopConfig::default());
        let mut env = env();
        let mut state = start(&mut env).await;
        plan.run_task(&mut state, &mut env).await.unwrap();

        assert_eq!(llm.hits("## Exception check"), 1);
        assert_eq!(llm.hits("## Local revision"), 1);
        assert_eq!(state.final_answer(), Some("$3"));
        assert_eq!(state.trajectory.num_steps(), 2);
    }

    #[tokio::test]
    async fn test_replan_resets_phase_index() {
        let one_phase = "**Subtask 1: Answer**\n- **Subtask**: Report\n- **Expected State**: Reported\n";
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .on("## Global plan", [TWO_PHASES])
                .on(
                    "## Local plan",
                    ["**Action 1:** ```scroll [down]```", "**Action 1:** ```stop [ok]```"],
                )
                .on("## Alignment check", ["Result: request\nReasons: wrong site", "Result: move"])
                .on("## Replan request", ["Request Type: replan\nReasons: wrong site"])
                .on("## Replan decision", ["Decision: replan\nReasons: agreed"])
                .on("## Global revision", [format!("Revised Plan:\n{}", one_phase)])
                .on("## Collation", ["Collation: ok"]),
        );
        let plan = session(llm.clone(), EarlyStopConfig::default());
        let mut env = env();
        let mut state = start(&mut env).await;
        plan.run_task(&mut state, &mut env).await.unwrap();

        assert_eq!(state.plan_revision, 2);
        assert_eq!(state.global_plan.len(), 1);
        assert_eq!(state.final_answer(), Some("ok"));
        assert!(state
            .events
            .iter()
            .any(|e| matches!(e, PlanEvent::ReplanRequested { reasons, .. } if reasons == "wrong site")));
    }

    #[tokio::test]
    async fn test_empty_global_plan_stalls_with_stop() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .on("## Global plan", ["I am not sure."])
                .with_default("Collation: N/A"),
        );
        let plan = session(llm, EarlyStopConfig::default());
        let mut env = env();
        let mut state = start(&mut env).await;
        plan.run_task(&mut state, &mut env).await.unwrap();

        assert_eq!(state.trajectory.num_steps(), 1);
        assert!(state.final_answer().unwrap().starts_with("ERROR"));
        assert!(state.events.iter().any(|e| matches!(e, PlanEvent::Stalled { .. })));
    }

    #[tokio::test]
    async fn test_repeated_action_triggers_early_stop() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .on("## Global plan", [TWO_PHASES])
                .on("## Local plan", ["**Action 1:** ```scroll [down]```\n**Action 2:** ```scroll [down]```\n**Action 3:** ```scroll [down]```\n**Action 4:** ```scroll [down]```"])
                .on("## Alignment check", ["Result: move"])
                .on("## Collation", ["Collation: N/A"]),
        );
        let plan = session(llm, EarlyStopConfig::default());
        let mut env = env();
        let mut state = start(&mut env).await;
        plan.run_task(&mut state, &mut env).await.unwrap();

        assert_eq!(state.early_stop.as_deref(), Some("Same action for 3 times"));
        assert_eq!(state.final_answer(), Some("Early stop: Same action for 3 times"));
        assert_eq!(state.trajectory.num_steps(), 4);
    }
}
