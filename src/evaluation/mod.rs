//! 评估：根据任务配置对最终轨迹打分
//!
//! 每个评估器返回 [0, 1] 的分数，EvaluatorComb 以乘积组合（全部满足才得分）。

pub mod html;
pub mod router;
pub mod string;
pub mod url;

use async_trait::async_trait;

use crate::browser::BrowserEnv;
use crate::core::{AgentError, Trajectory};
use crate::task::TaskConfig;

pub use html::HtmlContentEvaluator;
pub use router::{evaluator_router, EvaluatorComb};
pub use string::{clean_answer, exact_match, must_include, word_tokenize, StringEvaluator};
pub use url::UrlEvaluator;

#[async_trait]
pub trait Evaluator: Send + Sync {
    /// 评估器名称（日志用）
    fn name(&self) -> &'static str;

    async fn score(
        &self,
        trajectory: &Trajectory,
        task: &TaskConfig,
        env: &mut dyn BrowserEnv,
    ) -> Result<f64, AgentError>;
}
