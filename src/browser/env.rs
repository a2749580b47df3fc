//! 浏览器环境抽象
//!
//! 控制循环只通过 BrowserEnv 与浏览器交互：reset 得到初始观察，step 执行动作得到新观察。
//! 动作级失败（元素不存在等）不返回 Err，而是体现在新 StateInfo 的 error 上；
//! Err 只表示环境本身不可用。

use std::path::Path;

use async_trait::async_trait;

use crate::action::Action;
use crate::core::{AgentError, StateInfo};
use crate::task::TaskConfig;

/// 一步执行结果
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub state: StateInfo,
    pub reward: f64,
    /// 环境认为任务已结束（执行了 STOP 等）
    pub done: bool,
}

#[async_trait]
pub trait BrowserEnv: Send {
    async fn reset(&mut self, task: &TaskConfig) -> Result<StateInfo, AgentError>;

    async fn step(&mut self, action: &Action) -> Result<StepOutcome, AgentError>;

    /// 当前活动页 URL
    fn current_url(&self) -> String;

    /// 取页面内容用于评估：`target_url` 为 None 时使用当前页；
    /// 空 locator 返回整页内容，`document.` 开头的 locator 作为 JS 表达式求值
    async fn select_content(&mut self, target_url: Option<&str>, locator: &str) -> Result<String, AgentError>;

    /// 保存执行轨迹（不支持时忽略）
    async fn save_trace(&mut self, _path: &Path) -> Result<(), AgentError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), AgentError>;
}

/// 关闭活动标签页并把活动页移到最后一页。
/// 只剩一页时不移除，返回 false，由调用方把这一页换成空白页。
pub fn remove_active_tab<T>(tabs: &mut Vec<T>, active: &mut usize) -> bool {
    if tabs.len() <= 1 {
        *active = 0;
        return false;
    }
    tabs.remove((*active).min(tabs.len() - 1));
    *active = tabs.len() - 1;
    true
}

/// 每个任务启动一个独立的浏览器会话
#[async_trait]
pub trait BrowserEnvFactory: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserEnv>, AgentError>;
}
