//! 任务配置：每个基准任务一个 JSON 文件

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// task_id 在数据集中可能是数字也可能是字符串
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskId {
    Num(u64),
    Text(String),
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

/// 模糊匹配参考：参考答案列表，或 "N/A"（按精确匹配 "N/A" 处理）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FuzzyReference {
    List(Vec<String>),
    Text(String),
}

/// must_include 可能是单个字符串或列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn items(&self) -> Vec<&str> {
        match self {
            Self::One(s) => vec![s.as_str()],
            Self::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceAnswers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_include: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy_match: Option<FuzzyReference>,
}

/// DOM 内容要求：精确匹配或必须包含（元素可写 `a |OR| b`）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredContents {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact_match: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub must_include: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramHtmlTarget {
    /// "last" 表示当前页面
    pub url: String,
    #[serde(default)]
    pub locator: String,
    pub required_contents: RequiredContents,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalSpec {
    pub eval_types: Vec<String>,
    #[serde(default)]
    pub reference_answers: Option<ReferenceAnswers>,
    #[serde(default)]
    pub reference_url: Option<String>,
    /// "EXACT"（默认）或 "GOLD in PRED"
    #[serde(default)]
    pub url_note: Option<String>,
    #[serde(default)]
    pub program_html: Vec<ProgramHtmlTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub task_id: TaskId,
    pub intent: String,
    #[serde(default)]
    pub sites: Vec<String>,
    #[serde(default)]
    pub start_url: String,
    #[serde(default)]
    pub require_login: bool,
    #[serde(default)]
    pub storage_state: Option<String>,
    pub eval: EvalSpec,
}

impl TaskConfig {
    pub fn from_json(text: &str) -> Result<Self, AgentError> {
        serde_json::from_str(text).map_err(|e| AgentError::TaskConfig(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AgentError::TaskConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// 起始页；多个起始页以 ` |AND| ` 分隔时取第一个
    pub fn first_start_url(&self) -> &str {
        self.start_url.split(" |AND| ").next().unwrap_or("").trim()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_webarena_style_config() {
        let json = r#"{
            "sites": ["shopping"],
            "task_id": 21,
            "require_login": true,
            "storage_state": "./.auth/shopping_state.json",
            "start_url": "http://localhost:7770",
            "geolocation": null,
            "intent": "What is the price of HP Inkjet Fax Machine",
            "eval": {
                "eval_types": ["string_match"],
                "reference_answers": {"exact_match": "$279.49"},
                "reference_url": "",
                "program_html": [],
                "string_note": ""
            }
        }"#;
        let task = TaskConfig::from_json(json).unwrap();
        assert_eq!(task.task_id.to_string(), "21");
        assert_eq!(
            task.eval.reference_answers.unwrap().exact_match.as_deref(),
            Some("$279.49")
        );
    }

    #[test]
    fn test_fuzzy_na_and_string_task_id() {
        let json = r#"{"task_id": "t-1", "intent": "x", "eval": {"eval_types": ["string_match"],
            "reference_answers": {"fuzzy_match": "N/A", "must_include": ["a", "b"]}}}"#;
        let task = TaskConfig::from_json(json).unwrap();
        let refs = task.eval.reference_answers.unwrap();
        assert_eq!(refs.fuzzy_match, Some(FuzzyReference::Text("N/A".to_string())));
        assert_eq!(refs.must_include.unwrap().items(), vec!["a", "b"]);
        assert_eq!(task.task_id, TaskId::Text("t-1".to_string()));
    }

    #[test]
    fn test_first_start_url() {
        let json = r#"{"task_id": 1, "intent": "x", "start_url": "http://a |AND| http://b",
            "eval": {"eval_types": []}}"#;
        assert_eq!(TaskConfig::from_json(json).unwrap().first_start_url(), "http://a");
    }
}
