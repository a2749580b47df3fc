//! 规划层：计划解析、全局规划器、局部智能体、重规划协调、早停、分阶段执行循环

pub mod early_stop;
pub mod events;
pub mod global_planner;
pub mod local_agent;
pub mod loop_;
pub mod parser;
pub mod replan;

pub use early_stop::{early_stop, EarlyStopConfig};
pub use events::PlanEvent;
pub use global_planner::GlobalPlanner;
pub use local_agent::{LocalAgent, ReplanRequest};
pub use loop_::{PhaseOutcome, PlanSession};
pub use parser::{
    parse_check_result, parse_collation_result, parse_decide_result, parse_global_plan,
    parse_local_plan, parse_request_result, parse_revise_result, CheckDecision, CheckResult,
    DecideResult, GlobalPlan, LocalPlan, PhaseTask, ReplanDecision, RequestResult,
};
pub use replan::{ArbitrationOutcome, ReplanCoordinator};
