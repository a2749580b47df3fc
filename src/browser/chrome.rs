//! Headless Chrome 环境
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//!
//! ## 语义快照（Semantic Snapshot）
//!
//! 抓取无障碍树（Accessibility Tree），每个节点一行 `[id] role 'name'`，id 为后端 DOM 节点号。
//! 动作按 id 定位：通过 DOM.pushNodesByBackendIdsToFrontend 取回节点后点击/输入/悬停。
//! headless_chrome 是同步 API，所有调用都放在 spawn_blocking 中执行。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::browser::tab::element::Element;
use headless_chrome::protocol::cdp::{Accessibility, DOM};
use headless_chrome::{Browser, LaunchOptions, Tab};

use crate::action::{Action, ActionKind, ElementRef, ScrollDirection};
use crate::browser::{remove_active_tab, BrowserEnv, BrowserEnvFactory, StepOutcome};
use crate::config::BrowserSection;
use crate::core::{AgentError, StateInfo};
use crate::task::TaskConfig;

fn env_err(e: impl std::fmt::Display) -> AgentError {
    AgentError::Environment(e.to_string())
}

/// 快照中省略的角色
fn is_skipped_role(role: &str) -> bool {
    matches!(role, "none" | "unknown" | "generic" | "InlineTextBox")
}

/// 构建无障碍树快照文本
fn accessibility_snapshot(tab: &Arc<Tab>) -> Result<String, AgentError> {
    let ax_tree = tab
        .call_method(Accessibility::GetFullAXTree {
            depth: None,
            frame_id: None,
        })
        .map_err(env_err)?;

    let mut lines = Vec::new();
    for node in &ax_tree.nodes {
        if node.ignored {
            continue;
        }
        let role = node
            .role
            .as_ref()
            .and_then(|r| r.value.as_ref())
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        if is_skipped_role(role) {
            continue;
        }
        let name = node
            .name
            .as_ref()
            .and_then(|n| n.value.as_ref())
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let Some(backend_id) = node.backend_dom_node_id else {
            continue;
        };
        if role == "StaticText" && name.trim().is_empty() {
            continue;
        }
        lines.push(format!("[{}] {} '{}'", backend_id, role, name));
    }
    Ok(lines.join("\n"))
}

/// 后端节点号 -> Element
fn element_by_backend_id<'a>(tab: &'a Tab, backend_id: &str) -> Result<Element<'a>, String> {
    let id: u32 = backend_id
        .trim()
        .parse()
        .map_err(|_| format!("Invalid element id [{}]", backend_id))?;
    tab.get_document().map_err(|e| e.to_string())?;
    let pushed = tab
        .call_method(DOM::PushNodesByBackendIdsToFrontend {
            backend_node_ids: vec![id],
        })
        .map_err(|e| e.to_string())?;
    let node_id = pushed
        .node_ids
        .first()
        .copied()
        .filter(|n| *n != 0)
        .ok_or_else(|| format!("Element [{}] not found on page", backend_id))?;
    Element::new(tab, node_id).map_err(|e| e.to_string())
}

/// 执行单个动作；Ok(Some(msg)) 表示动作级失败
fn perform(tab: &Arc<Tab>, action: &Action) -> Result<Option<String>, AgentError> {
    let result: Result<(), String> = match &action.kind {
        ActionKind::Click {
            target: ElementRef::Id { id },
        } => element_by_backend_id(tab, id).and_then(|el| el.click().map(|_| ()).map_err(|e| e.to_string())),
        ActionKind::Hover {
            target: ElementRef::Id { id },
        } => element_by_backend_id(tab, id)
            .and_then(|el| el.move_mouse_over().map(|_| ()).map_err(|e| e.to_string())),
        ActionKind::Type {
            target: ElementRef::Id { id },
            text,
            press_enter,
        } => element_by_backend_id(tab, id).and_then(|el| {
            el.click().map_err(|e| e.to_string())?;
            el.type_into(text).map_err(|e| e.to_string())?;
            if *press_enter {
                tab.press_key("Enter").map_err(|e| e.to_string())?;
            }
            Ok(())
        }),
        ActionKind::Click { .. } | ActionKind::Hover { .. } | ActionKind::Type { .. } => {
            Err("coordinate actions are not supported by this environment".to_string())
        }
        ActionKind::KeyPress { key_comb } => {
            let key = key_comb.rsplit('+').next().unwrap_or(key_comb);
            tab.press_key(key).map(|_| ()).map_err(|e| e.to_string())
        }
        ActionKind::Scroll { direction } => {
            let amount = match direction {
                ScrollDirection::Up => -500,
                ScrollDirection::Down => 500,
            };
            tab.evaluate(&format!("window.scrollBy(0, {})", amount), false)
                .map(|_| ())
                .map_err(|e| e.to_string())
        }
        ActionKind::NavigateUrl { url } => tab
            .navigate_to(url)
            .and_then(|t| t.wait_until_navigated())
            .map(|_| ())
            .map_err(|e| e.to_string()),
        ActionKind::GoBack => tab
            .evaluate("window.history.back()", false)
            .map(|_| ())
            .map_err(|e| e.to_string()),
        ActionKind::GoForward => tab
            .evaluate("window.history.forward()", false)
            .map(|_| ())
            .map_err(|e| e.to_string()),
        // 标签页动作由环境自身处理
        ActionKind::NewTab
        | ActionKind::SwitchTab { .. }
        | ActionKind::CloseTab
        | ActionKind::Stop { .. }
        | ActionKind::None => Ok(()),
    };
    Ok(result.err())
}

pub struct ChromeBrowserEnv {
    browser: Arc<Browser>,
    tabs: Vec<Arc<Tab>>,
    active: usize,
    observation_type: String,
    sleep_after_execution: Duration,
}

impl ChromeBrowserEnv {
    pub fn launch(config: &BrowserSection) -> Result<Self, AgentError> {
        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.viewport_width, config.viewport_height)))
            .build()
            .map_err(env_err)?;
        let browser = Browser::new(options).map_err(env_err)?;
        Ok(Self {
            browser: Arc::new(browser),
            tabs: Vec::new(),
            active: 0,
            observation_type: config.observation_type.clone(),
            sleep_after_execution: Duration::from_secs_f64(config.sleep_after_execution.max(0.0))
                + Duration::from_millis(config.slow_mo),
        })
    }

    fn tab(&self) -> Result<Arc<Tab>, AgentError> {
        self.tabs
            .get(self.active)
            .cloned()
            .ok_or_else(|| AgentError::Environment("no open tab".to_string()))
    }

    /// 关闭活动标签页；最后一页改为导航到空白页，失败记录为动作错误
    async fn close_active_tab(&mut self) -> Result<Option<String>, AgentError> {
        let tab = self.tab()?;
        if self.tabs.len() <= 1 {
            let blanked = tokio::task::spawn_blocking(move || {
                tab.navigate_to("about:blank")?;
                tab.wait_until_navigated().map(|_| ())
            })
            .await
            .map_err(env_err)?;
            return Ok(blanked.err().map(|e| format!("Failed to close tab: {}", e)));
        }
        let closed = tokio::task::spawn_blocking(move || tab.close(true))
            .await
            .map_err(env_err)?;
        match closed {
            Ok(_) => {
                remove_active_tab(&mut self.tabs, &mut self.active);
                Ok(None)
            }
            Err(e) => Ok(Some(format!("Failed to close tab: {}", e))),
        }
    }

    async fn observe(&self) -> Result<StateInfo, AgentError> {
        let tab = self.tab()?;
        let observation_type = self.observation_type.clone();
        let open_tabs: Vec<String> = self.tabs.iter().map(|t| t.get_url()).collect();
        let active = self.active;
        tokio::task::spawn_blocking(move || {
            let url = tab.get_url();
            let observation = match observation_type.as_str() {
                "html" => tab.get_content().map_err(env_err)?,
                _ => accessibility_snapshot(&tab)?,
            };
            Ok(StateInfo::new(observation, url).with_metadata(serde_json::json!({
                "open_tabs": open_tabs,
                "active_tab": active,
            })))
        })
        .await
        .map_err(env_err)?
    }
}

#[async_trait]
impl BrowserEnv for ChromeBrowserEnv {
    async fn reset(&mut self, task: &TaskConfig) -> Result<StateInfo, AgentError> {
        let browser = self.browser.clone();
        let start = task.first_start_url().to_string();
        let tab = tokio::task::spawn_blocking(move || {
            let tab = browser.new_tab().map_err(env_err)?;
            if !start.is_empty() {
                tab.navigate_to(&start).map_err(env_err)?;
                tab.wait_until_navigated().map_err(env_err)?;
            }
            Ok::<_, AgentError>(tab)
        })
        .await
        .map_err(env_err)??;
        self.tabs = vec![tab];
        self.active = 0;
        tracing::info!(task_id = %task.task_id, url = %task.first_start_url(), "browser reset");
        self.observe().await
    }

    async fn step(&mut self, action: &Action) -> Result<StepOutcome, AgentError> {
        let error = match &action.kind {
            ActionKind::NewTab => {
                let browser = self.browser.clone();
                match tokio::task::spawn_blocking(move || browser.new_tab())
                    .await
                    .map_err(env_err)?
                {
                    Ok(tab) => {
                        self.tabs.push(tab);
                        self.active = self.tabs.len() - 1;
                        None
                    }
                    Err(e) => Some(format!("Failed to open a new tab: {}", e)),
                }
            }
            ActionKind::SwitchTab { index } if *index >= self.tabs.len() => {
                Some(format!("Tab {} does not exist", index))
            }
            ActionKind::SwitchTab { index } => {
                self.active = *index;
                None
            }
            ActionKind::CloseTab => self.close_active_tab().await?,
            _ => {
                let tab = self.tab()?;
                let action = action.clone();
                match tokio::task::spawn_blocking(move || perform(&tab, &action))
                    .await
                    .map_err(env_err)?
                {
                    Ok(error) => error,
                    Err(e) => Some(e.to_string()),
                }
            }
        };
        if !self.sleep_after_execution.is_zero() {
            tokio::time::sleep(self.sleep_after_execution).await;
        }
        let mut state = self.observe().await?;
        if let Some(error) = error {
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
            .map(|t| t.get_url())
            .unwrap_or_default()
    }

    async fn select_content(&mut self, target_url: Option<&str>, locator: &str) -> Result<String, AgentError> {
        let tab = self.tab()?;
        let target_url = target_url.map(String::from);
        let locator = locator.to_string();
        tokio::task::spawn_blocking(move || {
            if let Some(url) = target_url {
                tab.navigate_to(&url).map_err(env_err)?;
                tab.wait_until_navigated().map_err(env_err)?;
            }
            if locator.trim().is_empty() {
                return tab.get_content().map_err(env_err);
            }
            if locator.starts_with("document.") {
                let value = tab
                    .evaluate(&format!("(() => {})()", locator), false)
                    .ok()
                    .and_then(|r| r.value)
                    .map(|v| match v {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    })
                    .unwrap_or_default();
                return Ok(value);
            }
            Err(AgentError::Evaluation(format!("Unknown locator: {}", locator)))
        })
        .await
        .map_err(env_err)?
    }

    async fn save_trace(&mut self, path: &Path) -> Result<(), AgentError> {
        // 没有 Playwright 式 trace，保存最终页面的 HTML 与纯文本
        let tab = self.tab()?;
        let content = tokio::task::spawn_blocking(move || tab.get_content().map_err(env_err))
            .await
            .map_err(env_err)??;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = html2text::from_read(content.as_bytes(), 120).unwrap_or_else(|_| content.clone());
        std::fs::write(path.with_extension("html"), &content)?;
        std::fs::write(path.with_extension("txt"), text)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), AgentError> {
        let tabs = std::mem::take(&mut self.tabs);
        tokio::task::spawn_blocking(move || {
            for tab in tabs {
                let _ = tab.close(true);
            }
        })
        .await
        .map_err(env_err)?;
        Ok(())
    }
}

/// 每个任务启动一个新的 Chrome 实例
pub struct ChromeEnvFactory {
    config: BrowserSection,
}

impl ChromeEnvFactory {
    pub fn new(config: BrowserSection) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserEnvFactory for ChromeEnvFactory {
    async fn launch(&self) -> Result<Box<dyn BrowserEnv>, AgentError> {
        let config = self.config.clone();
        let env = tokio::task::spawn_blocking(move || ChromeBrowserEnv::launch(&config))
            .await
            .map_err(env_err)??;
        Ok(Box::new(env))
    }
}
