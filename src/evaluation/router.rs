//! 评估器组合与路由

use std::sync::Arc;

use async_trait::async_trait;

use crate::browser::BrowserEnv;
use crate::core::{AgentError, Trajectory};
use crate::evaluation::{Evaluator, HtmlContentEvaluator, StringEvaluator, UrlEvaluator};
use crate::llm::LlmClient;
use crate::task::TaskConfig;

/// 子评估器分数相乘
pub struct EvaluatorComb {
    evaluators: Vec<Box<dyn Evaluator>>,
}

impl EvaluatorComb {
    pub fn new(evaluators: Vec<Box<dyn Evaluator>>) -> Self {
        Self { evaluators }
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

#[async_trait]
impl Evaluator for EvaluatorComb {
    fn name(&self) -> &'static str {
        "comb"
    }

    async fn score(
        &self,
        trajectory: &Trajectory,
        task: &TaskConfig,
        env: &mut dyn BrowserEnv,
    ) -> Result<f64, AgentError> {
        let mut score = 1.0;
        for evaluator in &self.evaluators {
            let cur = evaluator.score(trajectory, task, env).await?;
            tracing::debug!(evaluator = evaluator.name(), score = cur, "sub-evaluator score");
            score *= cur;
        }
        Ok(score)
    }
}

/// 按任务配置的 eval_types 组装评估器；judge 用于 fuzzy_match
pub fn evaluator_router(task: &TaskConfig, judge: Option<Arc<dyn LlmClient>>) -> Result<EvaluatorComb, AgentError> {
    let mut evaluators: Vec<Box<dyn Evaluator>> = Vec::new();
    for eval_type in &task.eval.eval_types {
        match eval_type.as_str() {
            "string_match" => evaluators.push(Box::new(StringEvaluator::new(judge.clone()))),
            "url_match" => evaluators.push(Box::new(UrlEvaluator)),
            "program_html" => evaluators.push(Box::new(HtmlContentEvaluator)),
            other => {
                return Err(AgentError::Evaluation(format!("eval_type {} is not supported", other)));
            }
        }
    }
    Ok(EvaluatorComb::new(evaluators))
}
