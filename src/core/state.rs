//! 任务状态：一次任务尝试拥有的全部可变状态
//!
//! 轨迹、当前全局计划、阶段游标、动作历史都显式放在 TaskState 上，
//! 控制循环的每个转移通过 `&mut TaskState` 传递，任务之间不共享。

use serde::Serialize;

use crate::action::{describe_action, Action};
use crate::core::{StateInfo, Trajectory};
use crate::plan::{GlobalPlan, PhaseTask, PlanEvent};

#[derive(Debug, Clone, Serialize)]
pub struct TaskState {
    pub task_id: String,
    pub intent: String,
    pub trajectory: Trajectory,
    pub global_plan: GlobalPlan,
    /// 全局计划版本号，初始计划为 1，每次重规划加 1
    pub plan_revision: usize,
    /// 当前阶段在 global_plan 中的下标
    pub phase_index: usize,
    /// 已执行动作的描述，首项为 "None"
    pub action_history: Vec<String>,
    pub early_stop: Option<String>,
    pub events: Vec<PlanEvent>,
    /// 全局规划器的最终整理结果
    pub final_result: Option<String>,
}

impl TaskState {
    pub fn new(task_id: impl Into<String>, intent: impl Into<String>, initial: StateInfo) -> Self {
        Self {
            task_id: task_id.into(),
            intent: intent.into(),
            trajectory: Trajectory::new(initial),
            global_plan: GlobalPlan::default(),
            plan_revision: 0,
            phase_index: 0,
            action_history: vec!["None".to_string()],
            early_stop: None,
            events: Vec::new(),
            final_result: None,
        }
    }

    pub fn previous_action(&self) -> &str {
        self.action_history
            .last()
            .map(String::as_str)
            .unwrap_or("None")
    }

    pub fn current_phase(&self) -> Option<&PhaseTask> {
        self.global_plan.phase(self.phase_index)
    }

    /// 整体替换全局计划并把阶段游标归零
    pub fn install_plan(&mut self, plan: GlobalPlan) {
        self.plan_revision += 1;
        self.phase_index = 0;
        self.record(PlanEvent::GlobalPlan {
            revision: self.plan_revision,
            phases: plan.len(),
        });
        self.global_plan = plan;
    }

    /// 追加一步到轨迹，并写入动作描述
    pub fn push_step(&mut self, action: Action, state: StateInfo) {
        let description = describe_action(&action, &self.trajectory.last_state().observation);
        self.trajectory.push_step(action, state);
        self.record(PlanEvent::ActionExecuted {
            step: self.trajectory.num_steps(),
            action: description.clone(),
        });
        self.action_history.push(description);
    }

    pub fn record(&mut self, event: PlanEvent) {
        tracing::debug!(task_id = %self.task_id, event = ?event, "plan event");
        self.events.push(event);
    }

    /// 最终答案：最后一个 STOP 动作的 answer
    pub fn final_answer(&self) -> Option<&str> {
        self.trajectory.last_action().and_then(Action::answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, ElementRef};

    #[test]
    fn test_push_step_records_description() {
        let initial = StateInfo::new("[42] button 'Add to Cart'", "http://shop/");
        let mut state = TaskState::new("3", "buy it", initial);
        assert_eq!(state.previous_action(), "None");

        let click = Action::new(
            ActionKind::Click {
                target: ElementRef::id("42"),
            },
            "```click [42]```",
        );
        state.push_step(click, StateInfo::new("cart", "http://shop/cart"));
        assert_eq!(
            state.previous_action(),
            "click [42] where [42] is button 'Add to Cart'"
        );
        assert_eq!(state.trajectory.len(), 3);
        assert_eq!(state.final_answer(), None);
    }

    #[test]
    fn test_install_plan_resets_phase() {
        let mut state = TaskState::new("1", "x", StateInfo::new("", ""));
        state.phase_index = 2;
        state.install_plan(GlobalPlan::default());
        assert_eq!(state.phase_index, 0);
        assert_eq!(state.plan_revision, 1);
        assert!(matches!(
            state.events.last(),
            Some(PlanEvent::GlobalPlan { revision: 1, .. })
        ));
    }
}
