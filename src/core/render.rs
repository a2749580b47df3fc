//! 任务渲染：每个任务输出一个 render_<task_id>.html，记录计划、动作、观察与决策
//!
//! 断点续跑以该文件是否存在为准（见 SessionDriver::get_unfinished）。

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::core::{AgentError, TaskState, TrajectoryItem};
use crate::plan::PlanEvent;
use crate::task::TaskConfig;

const STYLE: &str = "body{font-family:sans-serif;margin:1.5em}\
pre{white-space:pre-wrap;background:#f6f6f6;padding:.5em;max-height:24em;overflow:auto}\
.action{color:#0a5;font-weight:bold}.error{color:#c00}.event{color:#555}";

pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_path(result_dir: &Path, task_id: &str) -> PathBuf {
    result_dir.join(format!("render_{}.html", task_id))
}

pub struct RenderHelper {
    path: PathBuf,
}

impl RenderHelper {
    pub fn new(result_dir: &Path, task_id: &str) -> Self {
        Self {
            path: render_path(result_dir, task_id),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn render(&self, task: &TaskConfig, state: &TaskState, score: f64) -> Result<(), AgentError> {
        let html = Self::to_html(task, state, score)?;
        std::fs::write(&self.path, html)?;
        Ok(())
    }

    fn to_html(task: &TaskConfig, state: &TaskState, score: f64) -> Result<String, AgentError> {
        let mut html = String::new();
        let config = serde_json::to_string_pretty(task)?;
        // String 的 fmt::Write 不会失败
        let _ = write!(
            html,
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Task {id}</title><style>{STYLE}</style></head><body>\
             <h1>Task {id}</h1><p><b>Intent:</b> {intent}</p><p><b>Score:</b> {score}</p>\
             <details><summary>Config</summary><pre>{config}</pre></details>",
            id = html_escape(&state.task_id),
            intent = html_escape(&task.intent),
            config = html_escape(&config),
        );

        let _ = write!(html, "<h2>Global plan (revision {})</h2><ol>", state.plan_revision);
        for phase in &state.global_plan.phases {
            let _ = write!(
                html,
                "<li><b>{}</b> {}<br><i>Expected:</i> {}</li>",
                html_escape(&phase.title),
                html_escape(&phase.subtask),
                html_escape(&phase.expected_state)
            );
        }
        html.push_str("</ol><h2>Trajectory</h2>");

        let mut step = 0usize;
        for item in state.trajectory.items() {
            match item {
                TrajectoryItem::State(s) => {
                    let _ = write!(html, "<h3>URL: {}</h3>", html_escape(&s.url));
                    if let Some(error) = &s.error {
                        let _ = write!(html, "<p class=\"error\">{}</p>", html_escape(error));
                    }
                    let _ = write!(html, "<pre>{}</pre>", html_escape(&s.observation));
                }
                TrajectoryItem::Action(a) => {
                    step += 1;
                    let description = state
                        .action_history
                        .get(step)
                        .cloned()
                        .unwrap_or_else(|| a.to_string());
                    let _ = write!(
                        html,
                        "<div class=\"action\">Step {}: {}</div><pre>{}</pre>",
                        step,
                        html_escape(&description),
                        html_escape(&a.raw_prediction)
                    );
                }
            }
        }

        html.push_str("<h2>Decisions</h2><ul>");
        for event in &state.events {
            let line = match event {
                PlanEvent::ActionExecuted { .. } => continue,
                other => serde_json::to_string(other)?,
            };
            let _ = write!(html, "<li class=\"event\">{}</li>", html_escape(&line));
        }
        html.push_str("</ul>");

        if let Some(result) = &state.final_result {
            let _ = write!(html, "<h2>Collation</h2><pre>{}</pre>", html_escape(result));
        }
        html.push_str("</body></html>");
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::core::StateInfo;

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_render_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let task = TaskConfig::from_json(r#"{"task_id": 5, "intent": "<b>price</b>", "eval": {"eval_types": []}}"#)
            .unwrap();
        let mut state = TaskState::new("5", "<b>price</b>", StateInfo::new("[1] RootWebArea 'Shop'", "http://a"));
        state.push_step(Action::stop("$1"), StateInfo::new("done", "http://a"));

        let helper = RenderHelper::new(dir.path(), "5");
        helper.render(&task, &state, 1.0).unwrap();
        let html = std::fs::read_to_string(helper.path()).unwrap();
        assert!(html.contains("&lt;b&gt;price&lt;/b&gt;"));
        assert!(html.contains("Step 1"));
        assert!(dir.path().join("render_5.html").exists());
    }
}
