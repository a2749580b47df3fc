//! 规划过程事件：记录在 TaskState 上，供日志与 HTML 渲染使用

use serde::Serialize;

use crate::plan::CheckDecision;

/// 单个任务内的规划/执行事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanEvent {
    /// 新的全局计划（revision 从 1 开始）
    GlobalPlan { revision: usize, phases: usize },
    PhaseStarted { phase: usize, subtask: String },
    LocalPlan { phase: usize, actions: usize },
    ActionExecuted { step: usize, action: String },
    /// 阶段校验结论
    Check {
        phase: usize,
        decision: CheckDecision,
        reasons: Option<String>,
    },
    ReplanRequested { phase: usize, reasons: String },
    Overruled { guidance: String },
    EarlyStop { reason: String },
    /// 计划为空或耗尽
    Stalled { detail: String },
    Collation { result: Option<String> },
}
