//! Mock LLM 客户端（用于测试，无需 API）
//!
//! - MockLlmClient：固定输出一段同时满足所有解析器的文本，便于本地跑通整个规划/执行流程。
//! - ScriptedLlmClient：按提示中的关键片段匹配预设回复队列，用于集成测试编排各角色的应答。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{GenerationConfig, LlmClient, LlmError, PromptInput};

/// Mock 客户端：一个阶段、一个 STOP 动作、检查通过、驳回重规划
#[derive(Debug, Default)]
pub struct MockLlmClient;

pub const MOCK_RESPONSE: &str = "**Subtask 1: Answer directly**\n\
- **Subtask**: Answer the objective without further navigation.\n\
- **Expected State**: The answer has been reported.\n\n\
**Action 1:** ```stop [N/A]```\n\n\
Result: move\n\
Decision: overrule\n\
Reasons: mock response\n\
Collation: N/A\n\
In summary, the next action I will perform is ```stop [N/A]```";

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _prompt: &PromptInput, _gen: &GenerationConfig) -> Result<String, LlmError> {
        Ok(MOCK_RESPONSE.to_string())
    }
}

#[derive(Debug)]
struct Rule {
    needle: String,
    responses: VecDeque<String>,
    hits: usize,
}

/// 脚本化客户端：第一个命中的规则出队一条回复，最后一条回复保持不变（可无限重复）
#[derive(Debug)]
pub struct ScriptedLlmClient {
    rules: Mutex<Vec<Rule>>,
    default_response: Option<String>,
    calls: AtomicUsize,
}

impl Default for ScriptedLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(Vec::new()),
            default_response: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// 提示包含 `needle` 时依次返回 `responses`
    pub fn on<I, S>(mut self, needle: impl Into<String>, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(rules) = self.rules.get_mut() {
            rules.push(Rule {
                needle: needle.into(),
                responses: responses.into_iter().map(Into::into).collect(),
                hits: 0,
            });
        }
        self
    }

    pub fn with_default(mut self, response: impl Into<String>) -> Self {
        self.default_response = Some(response.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 某条规则被命中的次数
    pub fn hits(&self, needle: &str) -> usize {
        self.rules
            .lock()
            .map(|rules| {
                rules
                    .iter()
                    .filter(|r| r.needle == needle)
                    .map(|r| r.hits)
                    .sum()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, prompt: &PromptInput, _gen: &GenerationConfig) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = prompt.flatten();
        let mut rules = self
            .rules
            .lock()
            .map_err(|_| LlmError::Api("scripted client poisoned".to_string()))?;

        if let Some(rule) = rules.iter_mut().find(|r| text.contains(&r.needle)) {
            rule.hits += 1;
            let response = if rule.responses.len() > 1 {
                rule.responses.pop_front()
            } else {
                rule.responses.front().cloned()
            };
            if let Some(response) = response {
                return Ok(response);
            }
        }
        self.default_response
            .clone()
            .ok_or_else(|| LlmError::Api("no scripted response for prompt".to_string()))
    }
}
