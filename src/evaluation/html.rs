//! 页面内容评估：按 program_html 目标取页面内容并检查要求的文本

use async_trait::async_trait;

use crate::browser::BrowserEnv;
use crate::core::{AgentError, Trajectory};
use crate::evaluation::string::{exact_match, must_include};
use crate::evaluation::Evaluator;
use crate::task::{ProgramHtmlTarget, TaskConfig};

#[derive(Debug, Default)]
pub struct HtmlContentEvaluator;

impl HtmlContentEvaluator {
    async fn score_target(&self, target: &ProgramHtmlTarget, env: &mut dyn BrowserEnv) -> Result<f64, AgentError> {
        if target.url.starts_with("func") {
            return Err(AgentError::Evaluation(format!(
                "Unsupported url helper: {}",
                target.url
            )));
        }
        if target.locator.starts_with("func:") {
            return Err(AgentError::Evaluation(format!(
                "Unsupported locator helper: {}",
                target.locator
            )));
        }
        let target_url = (target.url != "last").then_some(target.url.as_str());
        let selected = env.select_content(target_url, &target.locator).await?;

        let required = &target.required_contents;
        if let Some(reference) = &required.exact_match {
            return Ok(exact_match(reference, &selected));
        }
        if let Some(items) = &required.must_include {
            let mut score = 1.0;
            for content in items {
                let any = content
                    .split(" |OR| ")
                    .any(|alt| must_include(alt, &selected) > 0.0);
                if !any {
                    score = 0.0;
                }
            }
            return Ok(score);
        }
        Err(AgentError::Evaluation(
            "required_contents has neither exact_match nor must_include".to_string(),
        ))
    }
}

#[async_trait]
impl Evaluator for HtmlContentEvaluator {
    fn name(&self) -> &'static str {
        "program_html"
    }

    async fn score(
        &self,
        _trajectory: &Trajectory,
        task: &TaskConfig,
        env: &mut dyn BrowserEnv,
    ) -> Result<f64, AgentError> {
        let mut score = 1.0;
        for target in &task.eval.program_html {
            score *= self.score_target(target, env).await?;
        }
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{ScriptedBrowserEnv, ScriptedPage};
    use crate::core::StateInfo;
    use std::collections::HashMap;

    fn task(program_html: &str) -> TaskConfig {
        TaskConfig::from_json(&format!(
            r#"{{"task_id": 7, "intent": "edit", "start_url": "http://gitlab/profile",
                "eval": {{"eval_types": ["program_html"], "program_html": {}}}}}"#,
            program_html
        ))
        .unwrap()
    }

    fn env() -> ScriptedBrowserEnv {
        let mut pages = HashMap::new();
        pages.insert(
            "http://gitlab/profile".to_string(),
            ScriptedPage::new("[1] RootWebArea 'Profile'")
                .with_content("<html>Status: Busy, Bio: Rust fan</html>")
                .with_locator("document.querySelector('#status').value", "Busy"),
        );
        ScriptedBrowserEnv::new(pages)
    }

    #[tokio::test]
    async fn test_locator_and_full_page() {
        let mut env = env();
        let task = task(
            r#"[{"url": "last", "locator": "document.querySelector('#status').value",
                 "required_contents": {"exact_match": "busy"}},
                {"url": "http://gitlab/profile", "locator": "",
                 "required_contents": {"must_include": ["Rust |OR| Go", "bio"]}}]"#,
        );
        env.reset(&task).await.unwrap();
        let traj = Trajectory::new(StateInfo::new("", "http://gitlab/profile"));
        let score = HtmlContentEvaluator.score(&traj, &task, &mut env).await.unwrap();
        assert_eq!(score, 1.0);
    }

    #[tokio::test]
    async fn test_func_locator_is_error() {
        let mut env = env();
        let task = task(
            r#"[{"url": "last", "locator": "func:shopping_get_latest_order_url()",
                 "required_contents": {"must_include": ["x"]}}]"#,
        );
        env.reset(&task).await.unwrap();
        let traj = Trajectory::new(StateInfo::new("", "http://gitlab/profile"));
        let err = HtmlContentEvaluator.score(&traj, &task, &mut env).await.unwrap_err();
        assert!(matches!(err, AgentError::Evaluation(_)));
    }
}
