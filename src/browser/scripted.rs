//! 脚本化浏览器环境（用于测试，无需浏览器）
//!
//! 页面是内存中的固定观察文本；元素 id 可以绑定跳转目标。不存在的元素、标签页或页面
//! 会得到带 error 的 StateInfo，与真实环境的动作级失败表现一致。

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::action::{Action, ActionKind, ElementRef};
use crate::browser::{remove_active_tab, BrowserEnv, BrowserEnvFactory, StepOutcome};
use crate::core::{AgentError, StateInfo};
use crate::task::TaskConfig;

/// 一个内存页面
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    /// 无障碍树文本，每行形如 `[id] role 'name'`
    pub observation: String,
    /// 整页内容（HTML），为空时使用 observation
    pub content: String,
    /// 元素 id -> 点击后跳转的 URL
    pub links: HashMap<String, String>,
    /// locator -> 求值结果
    pub locators: HashMap<String, String>,
}

impl ScriptedPage {
    pub fn new(observation: impl Into<String>) -> Self {
        Self {
            observation: observation.into(),
            ..Self::default()
        }
    }

    pub fn with_link(mut self, id: impl Into<String>, url: impl Into<String>) -> Self {
        self.links.insert(id.into(), url.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_locator(mut self, locator: impl Into<String>, value: impl Into<String>) -> Self {
        self.locators.insert(locator.into(), value.into());
        self
    }

    fn has_element(&self, id: &str) -> bool {
        let marker = format!("[{}]", id.trim());
        self.observation
            .lines()
            .any(|line| line.trim_start().starts_with(&marker))
    }
}

#[derive(Debug, Clone, Default)]
struct Tab {
    history: Vec<String>,
    cursor: usize,
}

impl Tab {
    fn new(url: &str) -> Self {
        Self {
            history: vec![url.to_string()],
            cursor: 0,
        }
    }

    fn url(&self) -> &str {
        self.history.get(self.cursor).map(String::as_str).unwrap_or("about:blank")
    }

    fn navigate(&mut self, url: &str) {
        self.history.truncate(self.cursor + 1);
        self.history.push(url.to_string());
        self.cursor = self.history.len() - 1;
    }
}

/// 执行记录（跨 Box<dyn BrowserEnv> 共享给测试）
#[derive(Debug, Default)]
pub struct EnvLog {
    pub executed: Mutex<Vec<String>>,
    pub launched: AtomicUsize,
    pub closed: AtomicUsize,
}

impl EnvLog {
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct ScriptedBrowserEnv {
    pages: Arc<HashMap<String, ScriptedPage>>,
    tabs: Vec<Tab>,
    active: usize,
    log: Arc<EnvLog>,
}

impl ScriptedBrowserEnv {
    pub fn new(pages: HashMap<String, ScriptedPage>) -> Self {
        Self::with_log(Arc::new(pages), Arc::new(EnvLog::default()))
    }

    fn with_log(pages: Arc<HashMap<String, ScriptedPage>>, log: Arc<EnvLog>) -> Self {
        Self {
            pages,
            tabs: vec![Tab::new("about:blank")],
            active: 0,
            log,
        }
    }

    pub fn log(&self) -> Arc<EnvLog> {
        self.log.clone()
    }

    fn page(&self, url: &str) -> Option<&ScriptedPage> {
        self.pages.get(url)
    }

    fn active_tab(&mut self) -> &mut Tab {
        if self.tabs.is_empty() {
            self.tabs.push(Tab::new("about:blank"));
            self.active = 0;
        }
        let idx = self.active.min(self.tabs.len() - 1);
        &mut self.tabs[idx]
    }

    fn observe(&self) -> StateInfo {
        let url = self.current_url();
        let observation = match self.page(&url) {
            Some(page) => page.observation.clone(),
            None if url == "about:blank" => String::new(),
            None => format!("[1] RootWebArea 'Not Found'\n\tStaticText '404 {}'", url),
        };
        StateInfo::new(observation, url).with_metadata(serde_json::json!({
            "open_tabs": self.tabs.iter().map(|t| t.url().to_string()).collect::<Vec<_>>(),
            "active_tab": self.active,
        }))
    }

    /// 执行动作；返回动作级错误描述
    fn apply(&mut self, action: &Action) -> Option<String> {
        let current = self.current_url();
        let current_page = self.page(&current).cloned().unwrap_or_default();
        match &action.kind {
            ActionKind::Click { target } | ActionKind::Hover { target } => {
                let ElementRef::Id { id } = target else {
                    return None;
                };
                if !current_page.has_element(id) {
                    return Some(format!("Element [{}] not found on page", id));
                }
                if matches!(action.kind, ActionKind::Click { .. }) {
                    if let Some(next) = current_page.links.get(id.trim()) {
                        let next = next.clone();
                        self.active_tab().navigate(&next);
                    }
                }
                None
            }
            ActionKind::Type {
                target, press_enter, ..
            } => {
                if let ElementRef::Id { id } = target {
                    if !current_page.has_element(id) {
                        return Some(format!("Element [{}] not found on page", id));
                    }
                    if *press_enter {
                        if let Some(next) = current_page.links.get(id.trim()) {
                            let next = next.clone();
                            self.active_tab().navigate(&next);
                        }
                    }
                }
                None
            }
            ActionKind::KeyPress { .. } | ActionKind::Scroll { .. } => None,
            ActionKind::NewTab => {
                self.tabs.push(Tab::new("about:blank"));
                self.active = self.tabs.len() - 1;
                None
            }
            ActionKind::SwitchTab { index } => {
                if *index < self.tabs.len() {
                    self.active = *index;
                    None
                } else {
                    Some(format!("Tab {} does not exist", index))
                }
            }
            ActionKind::CloseTab => {
                if !remove_active_tab(&mut self.tabs, &mut self.active) {
                    self.tabs = vec![Tab::new("about:blank")];
                }
                None
            }
            ActionKind::NavigateUrl { url } => {
                self.active_tab().navigate(url);
                None
            }
            ActionKind::GoBack => {
                let tab = self.active_tab();
                tab.cursor = tab.cursor.saturating_sub(1);
                None
            }
            ActionKind::GoForward => {
                let tab = self.active_tab();
                if tab.cursor + 1 < tab.history.len() {
                    tab.cursor += 1;
                }
                None
            }
            ActionKind::Stop { .. } | ActionKind::None => None,
        }
    }
}

#[async_trait]
impl BrowserEnv for ScriptedBrowserEnv {
    async fn reset(&mut self, task: &TaskConfig) -> Result<StateInfo, AgentError> {
        let start = task.first_start_url();
        let start = if start.is_empty() { "about:blank" } else { start };
        self.tabs = vec![Tab::new(start)];
        self.active = 0;
        Ok(self.observe())
    }

    async fn step(&mut self, action: &Action) -> Result<StepOutcome, AgentError> {
        if let Ok(mut executed) = self.log.executed.lock() {
            executed.push(action.to_string());
        }
        let error = self.apply(action);
        let mut state = self.observe();
        if let Some(error) = error {
            tracing::debug!(error = %error, "scripted action failed");
            state = state.with_error(error);
        }
        Ok(StepOutcome {
            state,
            reward: 0.0,
            done: action.is_stop(),
        })
    }

    fn current_url(&self) -> String {
        self.tabs
            .get(self.active)
            .map(|t| t.url().to_string())
            .unwrap_or_else(|| "about:blank".to_string())
    }

    async fn select_content(&mut self, target_url: Option<&str>, locator: &str) -> Result<String, AgentError> {
        if let Some(url) = target_url {
            self.active_tab().navigate(url);
        }
        let url = self.current_url();
        let page = self.page(&url).cloned().unwrap_or_default();
        if locator.trim().is_empty() {
            return Ok(if page.content.is_empty() {
                page.observation
            } else {
                page.content
            });
        }
        if locator.starts_with("document.") {
            return Ok(page.locators.get(locator).cloned().unwrap_or_default());
        }
        Err(AgentError::Evaluation(format!("Unknown locator: {}", locator)))
    }

    async fn save_trace(&mut self, path: &Path) -> Result<(), AgentError> {
        let executed = self.log.executed();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&executed)?)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), AgentError> {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 为每个任务创建一个新的脚本化环境，共享页面与执行记录
#[derive(Clone, Default)]
pub struct ScriptedEnvFactory {
    pages: Arc<HashMap<String, ScriptedPage>>,
    log: Arc<EnvLog>,
}

impl ScriptedEnvFactory {
    pub fn new(pages: HashMap<String, ScriptedPage>) -> Self {
        Self {
            pages: Arc::new(pages),
            log: Arc::new(EnvLog::default()),
        }
    }

    pub fn log(&self) -> Arc<EnvLog> {
        self.log.clone()
    }
}

#[async_trait]
impl BrowserEnvFactory for ScriptedEnvFactory {
    async fn launch(&self) -> Result<Box<dyn BrowserEnv>, AgentError> {
        self.log.launched.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedBrowserEnv::with_log(
            self.pages.clone(),
            self.log.clone(),
        )))
    }
}
