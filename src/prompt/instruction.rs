//! 提示指令：intro、各响应类型的 meta prompt 与示例、格式模板与元数据
//!
//! 指令从 JSON 文件加载；未配置路径时使用内置指令（config/prompts/ 下的两份默认文件）。

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;

const BUILTIN_GLOBAL: &str = include_str!("../../config/prompts/global_planner.json");
const BUILTIN_LOCAL: &str = include_str!("../../config/prompts/local_agent.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionMeta {
    pub observation: String,
    pub action_type: String,
    /// 模板中必须全部被替换的占位符
    pub keywords: Vec<String>,
    #[serde(default)]
    pub answer_phrase: String,
    pub action_splitter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub intro: String,
    /// 键为 `<kind>_examples`，值为 (输入, 输出) 示例对
    #[serde(default)]
    pub examples: HashMap<String, Vec<(String, String)>>,
    pub meta_prompts: HashMap<String, String>,
    pub template: String,
    pub meta_data: InstructionMeta,
}

impl Instruction {
    pub fn from_json(text: &str) -> Result<Self, AgentError> {
        serde_json::from_str(text).map_err(|e| AgentError::Prompt(format!("invalid instruction: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AgentError::ConfigError(format!("cannot read instruction {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn builtin_global() -> Result<Self, AgentError> {
        Self::from_json(BUILTIN_GLOBAL)
    }

    pub fn builtin_local() -> Result<Self, AgentError> {
        Self::from_json(BUILTIN_LOCAL)
    }

    /// 有路径则加载文件，否则使用内置指令
    pub fn load_or(path: Option<&Path>, builtin: fn() -> Result<Self, AgentError>) -> Result<Self, AgentError> {
        match path {
            Some(p) => Self::load(p),
            None => builtin(),
        }
    }

    pub fn meta_prompt(&self, key: &str) -> Option<&str> {
        self.meta_prompts.get(key).map(String::as_str)
    }

    /// 缺少示例列表时视为无示例
    pub fn examples_for(&self, key: &str) -> &[(String, String)] {
        self.examples.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_instructions_parse() {
        let global = Instruction::builtin_global().unwrap();
        assert!(global.meta_prompt("global_plan").is_some());
        assert!(global.meta_prompt("collation").is_some());
        assert_eq!(global.meta_data.action_splitter, "```");

        let local = Instruction::builtin_local().unwrap();
        for key in ["local_plan", "pass_check", "false_check", "revise", "overruled", "request"] {
            assert!(local.meta_prompt(key).is_some(), "missing meta prompt {}", key);
        }
        assert_eq!(local.examples_for("local_plan_examples").len(), 1);
        assert!(local.examples_for("nonexistent").is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(
            &path,
            r#"{"intro": "hi", "meta_prompts": {"global_plan": "plan"}, "template": "{objective}",
                "meta_data": {"observation": "accessibility_tree", "action_type": "id_accessibility_tree",
                              "keywords": ["objective"], "action_splitter": "```"}}"#,
        )
        .unwrap();
        let inst = Instruction::load(&path).unwrap();
        assert_eq!(inst.intro, "hi");
        assert!(inst.examples.is_empty());
        assert!(Instruction::load(&dir.path().join("missing.json")).is_err());
    }
}
