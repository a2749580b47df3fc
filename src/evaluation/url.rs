//! URL 评估：当前页 URL 与参考 URL 比较

use async_trait::async_trait;

use crate::browser::BrowserEnv;
use crate::core::{AgentError, Trajectory};
use crate::evaluation::Evaluator;
use crate::task::TaskConfig;

fn clean_url(url: &str) -> &str {
    let url = url.trim();
    url.strip_suffix('/').unwrap_or(url)
}

/// 按匹配规则比较；参考 URL 以 ` |OR| ` 分隔多个备选
pub fn url_match(pred: &str, reference: &str, rule: &str) -> Result<f64, AgentError> {
    let pred = clean_url(pred);
    let refs: Vec<&str> = reference.split(" |OR| ").map(clean_url).collect();
    let hit = match rule {
        "EXACT" => refs.iter().any(|r| *r == pred),
        "GOLD in PRED" => refs.iter().any(|r| pred.contains(r)),
        other => {
            return Err(AgentError::Evaluation(format!("Unknown matching rule: {}", other)));
        }
    };
    Ok(if hit { 1.0 } else { 0.0 })
}

#[derive(Debug, Default)]
pub struct UrlEvaluator;

#[async_trait]
impl Evaluator for UrlEvaluator {
    fn name(&self) -> &'static str {
        "url_match"
    }

    async fn score(
        &self,
        _trajectory: &Trajectory,
        task: &TaskConfig,
        env: &mut dyn BrowserEnv,
    ) -> Result<f64, AgentError> {
        let reference = task
            .eval
            .reference_url
            .as_deref()
            .ok_or_else(|| AgentError::Evaluation("url_match without reference_url".to_string()))?;
        let rule = task
            .eval
            .url_note
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("EXACT");
        url_match(&env.current_url(), reference, rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_with_trailing_slash_and_or() {
        assert_eq!(url_match("http://a/b/", "http://a/b", "EXACT").unwrap(), 1.0);
        assert_eq!(url_match("http://a/c", "http://a/b |OR| http://a/c/", "EXACT").unwrap(), 1.0);
        assert_eq!(url_match("http://a/b?x=1", "http://a/b", "EXACT").unwrap(), 0.0);
    }

    #[test]
    fn test_gold_in_pred_and_unknown_rule() {
        assert_eq!(url_match("http://a/b?x=1", "http://a/b", "GOLD in PRED").unwrap(), 1.0);
        assert!(matches!(
            url_match("http://a", "http://a", "FUZZY"),
            Err(AgentError::Evaluation(_))
        ));
    }
}
