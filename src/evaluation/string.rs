//! 字符串答案评估：精确匹配、必须包含、模糊匹配（LLM 判分）

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::browser::BrowserEnv;
use crate::core::{AgentError, Trajectory};
use crate::evaluation::Evaluator;
use crate::llm::{GenerationConfig, LlmClient, Message, PromptInput};
use crate::task::{FuzzyReference, TaskConfig};

static WORD_RE: OnceLock<Regex> = OnceLock::new();

fn word_re() -> &'static Regex {
    WORD_RE.get_or_init(|| Regex::new(r"\w+(?:[.,'’]\w+)*|[^\w\s]").unwrap())
}

/// 去掉成对的首尾引号并转小写
pub fn clean_answer(answer: &str) -> String {
    let trimmed = answer.trim();
    let unquoted = ['\'', '"']
        .iter()
        .find_map(|q| {
            (trimmed.len() >= 2 && trimmed.starts_with(*q) && trimmed.ends_with(*q))
                .then(|| &trimmed[1..trimmed.len() - 1])
        })
        .unwrap_or(trimmed);
    unquoted.to_lowercase()
}

/// 简单分词：单词（允许内部 `.` `,` `'`，如 279.49）或单个标点
pub fn word_tokenize(text: &str) -> Vec<&str> {
    word_re().find_iter(text).map(|m| m.as_str()).collect()
}

pub fn exact_match(reference: &str, pred: &str) -> f64 {
    if clean_answer(pred) == clean_answer(reference) {
        1.0
    } else {
        0.0
    }
}

/// 参考为单个词时按词匹配，避免 "0" 命中 "10" 这类误报
pub fn must_include(reference: &str, pred: &str) -> f64 {
    let clean_ref = clean_answer(reference);
    let clean_pred = clean_answer(pred);
    let hit = if word_tokenize(&clean_ref).len() == 1 {
        word_tokenize(&clean_pred).contains(&clean_ref.as_str())
    } else {
        clean_pred.contains(&clean_ref)
    };
    if hit {
        1.0
    } else {
        0.0
    }
}

const FUZZY_JUDGE_INTRO: &str = "You are grading whether a student's answer to a question is correct, \
given the reference answer. The student's answer may be phrased differently from the reference; \
judge only whether it conveys the same meaning.";

/// 答案评估器；模糊匹配需要判分模型
pub struct StringEvaluator {
    judge: Option<Arc<dyn LlmClient>>,
    gen: GenerationConfig,
}

impl StringEvaluator {
    pub fn new(judge: Option<Arc<dyn LlmClient>>) -> Self {
        let gen = GenerationConfig {
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: 768,
            ..GenerationConfig::default()
        };
        Self { judge, gen }
    }

    async fn fuzzy_match(&self, reference: &str, pred: &str, intent: &str) -> Result<f64, AgentError> {
        let judge = self.judge.as_ref().ok_or_else(|| {
            AgentError::Evaluation("fuzzy_match requires a judge model".to_string())
        })?;
        let question = format!(
            "question: {intent}\nreference answer: {reference}\nstudent answer: {pred}\n\
             Conclude the judgement by \"correct\", \"incorrect\", or \"partially correct\"."
        );
        let prompt = PromptInput::Chat(vec![Message::system(FUZZY_JUDGE_INTRO), Message::user(question)]);
        let response = judge.complete(&prompt, &self.gen).await?.to_lowercase();
        tracing::debug!(response = %response, "fuzzy match judgement");
        if response.contains("partially correct") || response.contains("incorrect") {
            Ok(0.0)
        } else if response.contains("correct") {
            Ok(1.0)
        } else {
            tracing::warn!(response = %response, "fuzzy match judgement has no verdict");
            Ok(0.0)
        }
    }
}

#[async_trait]
impl Evaluator for StringEvaluator {
    fn name(&self) -> &'static str {
        "string_match"
    }

    async fn score(
        &self,
        trajectory: &Trajectory,
        task: &TaskConfig,
        _env: &mut dyn BrowserEnv,
    ) -> Result<f64, AgentError> {
        let Some(refs) = &task.eval.reference_answers else {
            return Err(AgentError::Evaluation("string_match without reference_answers".to_string()));
        };
        let raw = trajectory
            .last_action()
            .and_then(|a| a.answer())
            .unwrap_or_default();
        let pred = clean_answer(raw);

        let mut score = 1.0;
        if let Some(reference) = &refs.exact_match {
            score *= exact_match(reference, &pred);
        }
        if let Some(required) = &refs.must_include {
            for item in required.items() {
                score *= must_include(item, &pred);
            }
        }
        match &refs.fuzzy_match {
            Some(FuzzyReference::Text(text)) if text == "N/A" => {
                score *= exact_match("N/A", &pred);
            }
            Some(FuzzyReference::Text(text)) => {
                score *= self.fuzzy_match(text, &pred, &task.intent).await?;
            }
            Some(FuzzyReference::List(items)) => {
                for reference in items {
                    score *= self.fuzzy_match(reference, &pred, &task.intent).await?;
                }
            }
            None => {}
        }
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::browser::ScriptedBrowserEnv;
    use crate::core::StateInfo;
    use crate::llm::ScriptedLlmClient;
    use std::collections::HashMap;

    fn trajectory_with_answer(answer: &str) -> Trajectory {
        let mut t = Trajectory::new(StateInfo::new("obs", "http://a"));
        t.push_step(Action::stop(answer), StateInfo::new("obs", "http://a"));
        t
    }

    #[test]
    fn test_clean_answer() {
        assert_eq!(clean_answer("\"Hello\""), "hello");
        assert_eq!(clean_answer("'$279.49'"), "$279.49");
        assert_eq!(clean_answer("\"unbalanced"), "\"unbalanced");
    }

    #[test]
    fn test_must_include_single_token() {
        assert_eq!(must_include("0", "there are 10 items"), 0.0);
        assert_eq!(must_include("10", "there are 10 items"), 1.0);
        assert_eq!(must_include("279.49", "it costs $279.49"), 1.0);
        assert_eq!(must_include("two words", "Here are TWO WORDS."), 1.0);
    }

    #[tokio::test]
    async fn test_string_evaluator_exact_and_na() {
        let mut env = ScriptedBrowserEnv::new(HashMap::new());
        let task = TaskConfig::from_json(
            r#"{"task_id": 1, "intent": "price?", "eval": {"eval_types": ["string_match"],
                "reference_answers": {"exact_match": "$279.49"}}}"#,
        )
        .unwrap();
        let evaluator = StringEvaluator::new(None);
        let score = evaluator
            .score(&trajectory_with_answer("$279.49"), &task, &mut env)
            .await
            .unwrap();
        assert_eq!(score, 1.0);

        let na_task = TaskConfig::from_json(
            r#"{"task_id": 2, "intent": "x", "eval": {"eval_types": ["string_match"],
                "reference_answers": {"fuzzy_match": "N/A"}}}"#,
        )
        .unwrap();
        let score = evaluator
            .score(&trajectory_with_answer("n/a"), &na_task, &mut env)
            .await
            .unwrap();
        assert_eq!(score, 1.0);
    }

    #[tokio::test]
    async fn test_fuzzy_match_uses_judge() {
        let mut env = ScriptedBrowserEnv::new(HashMap::new());
        let task = TaskConfig::from_json(
            r#"{"task_id": 3, "intent": "who?", "eval": {"eval_types": ["string_match"],
                "reference_answers": {"fuzzy_match": ["Alice and Bob"]}}}"#,
        )
        .unwrap();
        let judge = Arc::new(ScriptedLlmClient::new().on("student answer", ["The answer is correct."]));
        let evaluator = StringEvaluator::new(Some(judge.clone()));
        let score = evaluator
            .score(&trajectory_with_answer("Bob, Alice"), &task, &mut env)
            .await
            .unwrap();
        assert_eq!(score, 1.0);
        assert_eq!(judge.hits("student answer"), 1);

        let no_judge = StringEvaluator::new(None);
        let err = no_judge
            .score(&trajectory_with_answer("Bob"), &task, &mut env)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Evaluation(_)));
    }
}
