//! Early-Stop Monitor：每次取动作前检查轨迹，发现失控循环时给出停止理由
//!
//! 纯函数，不改变控制流；由执行循环合成终止 STOP。

use serde::{Deserialize, Serialize};

use crate::action::{is_equivalent, Action};
use crate::core::Trajectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarlyStopConfig {
    pub max_steps: usize,
    /// 连续解析失败阈值，0 表示关闭该规则
    pub parsing_failure_th: usize,
    /// 重复动作阈值，0 表示关闭该规则
    pub repeating_action_failure_th: usize,
}

impl Default for EarlyStopConfig {
    fn default() -> Self {
        Self {
            max_steps: 30,
            parsing_failure_th: 3,
            repeating_action_failure_th: 3,
        }
    }
}

/// 返回 (是否停止, 理由)
pub fn early_stop(trajectory: &Trajectory, config: &EarlyStopConfig) -> (bool, String) {
    let num_steps = trajectory.num_steps();
    if num_steps >= config.max_steps {
        return (true, format!("Reach max steps {}", config.max_steps));
    }

    let actions: Vec<&Action> = trajectory.actions();

    let k = config.parsing_failure_th;
    if k > 0 && actions.len() >= k && actions[actions.len() - k..].iter().all(|a| a.is_none()) {
        return (true, format!("Failed to parse actions for {} times", k));
    }

    let k = config.repeating_action_failure_th;
    let Some(last) = actions.last() else {
        return (false, String::new());
    };
    if k == 0 {
        return (false, String::new());
    }

    if !last.is_type() {
        // 非输入动作：只看最近 k 个
        if actions.len() >= k && actions[actions.len() - k..].iter().all(|a| is_equivalent(a, last)) {
            return (true, format!("Same action for {} times", k));
        }
    } else {
        // 输入动作：统计整个历史
        let count = actions.iter().filter(|a| is_equivalent(a, last)).count();
        if count >= k {
            return (true, format!("Same typing action for {} times", k));
        }
    }

    (false, String::new())
}
