//! 轨迹：状态与动作交替的序列，首尾均为状态
//!
//! 只能通过 `push_step(action, state)` 追加，长度始终为奇数，偶数下标为状态、奇数下标为动作。

use serde::{Deserialize, Serialize};

use crate::action::Action;

/// 一次观察：页面文本（无障碍树 / HTML）+ 环境元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateInfo {
    pub observation: String,
    pub url: String,
    /// 上一个动作执行失败时的错误描述（元素不存在等），由下一次校验处理
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl StateInfo {
    pub fn new(observation: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            observation: observation.into(),
            url: url.into(),
            error: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum TrajectoryItem {
    State(StateInfo),
    Action(Action),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trajectory {
    items: Vec<TrajectoryItem>,
}

impl Trajectory {
    pub fn new(initial: StateInfo) -> Self {
        Self {
            items: vec![TrajectoryItem::State(initial)],
        }
    }

    /// 追加一步：先动作、后结果状态
    pub fn push_step(&mut self, action: Action, state: StateInfo) {
        self.items.push(TrajectoryItem::Action(action));
        self.items.push(TrajectoryItem::State(state));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 已执行的步数：(len - 1) / 2
    pub fn num_steps(&self) -> usize {
        self.items.len().saturating_sub(1) / 2
    }

    pub fn items(&self) -> &[TrajectoryItem] {
        &self.items
    }

    pub fn actions(&self) -> Vec<&Action> {
        self.items
            .iter()
            .filter_map(|item| match item {
                TrajectoryItem::Action(a) => Some(a),
                TrajectoryItem::State(_) => None,
            })
            .collect()
    }

    pub fn states(&self) -> impl Iterator<Item = &StateInfo> {
        self.items.iter().filter_map(|item| match item {
            TrajectoryItem::State(s) => Some(s),
            TrajectoryItem::Action(_) => None,
        })
    }

    pub fn last_state(&self) -> &StateInfo {
        match self.items.last() {
            Some(TrajectoryItem::State(s)) => s,
            // push_step 保证末尾总是状态
            _ => unreachable!("trajectory always ends with a state"),
        }
    }

    pub fn last_action(&self) -> Option<&Action> {
        self.items.iter().rev().find_map(|item| match item {
            TrajectoryItem::Action(a) => Some(a),
            TrajectoryItem::State(_) => None,
        })
    }
}
