//! 计划解析：模型自由文本 -> 结构化计划与决策记录
//!
//! 固定标记到字段的严格文法（`**Subtask N: ...**`、`**Action N:**`、`Result:`、`Decision:`、
//! `Reasons:`、`Revised Plan:`、`Request Type:`、`Collation:`）。找不到标记时字段为 `None`，
//! 与空串区分；格式错误的计划得到空序列，从不 panic。只看标记，不校验字段内容。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 全局计划中的一个阶段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTask {
    pub number: usize,
    pub title: String,
    pub subtask: String,
    pub expected_state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalPlan {
    pub phases: Vec<PhaseTask>,
}

impl GlobalPlan {
    pub fn new(phases: Vec<PhaseTask>) -> Self {
        Self { phases }
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn phase(&self, index: usize) -> Option<&PhaseTask> {
        self.phases.get(index)
    }

    /// 以模型输出格式重新渲染（写入后续提示的上下文）
    pub fn to_prompt_text(&self) -> String {
        self.phases
            .iter()
            .map(|p| {
                format!(
                    "**Subtask {}: {}**\n- **Subtask**: {}\n- **Expected State**: {}",
                    p.number, p.title, p.subtask, p.expected_state
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// 当前阶段的动作描述序列（未解析）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPlan {
    pub actions: Vec<String>,
}

impl LocalPlan {
    pub fn new(actions: Vec<String>) -> Self {
        Self { actions }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.actions.get(index).map(String::as_str)
    }

    pub fn to_prompt_text(&self) -> String {
        self.actions
            .iter()
            .enumerate()
            .map(|(i, a)| format!("**Action {}:** {}", i + 1, a))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 阶段校验结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckDecision {
    Move,
    Revise,
    Request,
}

impl CheckDecision {
    /// 缺失或无法识别的标签按 revise 处理
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("move") => Self::Move,
            Some("request") => Self::Request,
            _ => Self::Revise,
        }
    }
}

/// 全局规划器对重规划请求的裁决
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplanDecision {
    Replan,
    Overrule,
}

impl ReplanDecision {
    /// `replan` / `revise` 视为同意重规划，其余（含缺失）为驳回
    pub fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("replan") | Some("revise") => Self::Replan,
            _ => Self::Overrule,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub result: Option<String>,
    pub reasons: Option<String>,
}

impl CheckResult {
    pub fn decision(&self) -> CheckDecision {
        CheckDecision::from_label(self.result.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideResult {
    pub decision: Option<String>,
    pub reasons: Option<String>,
}

impl DecideResult {
    pub fn decision(&self) -> ReplanDecision {
        ReplanDecision::from_label(self.decision.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestResult {
    pub request_type: Option<String>,
    pub reasons: Option<String>,
}

fn subtask_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*Subtask (\d+):[ \t]*([^*\n]*)\*\*").unwrap())
}

fn subtask_body_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"-\s+\*\*Subtask\*\*:[ \t]*(.+?)[ \t]*\r?\n\s*-\s+\*\*Expected State\*\*:[ \t]*(.+?)[ \t]*(?:\r?\n|\z)",
        )
        .unwrap()
    })
}

/// 行首的已知字段标记，多行字段到此为止
fn marker_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?:Result|Decision|Reasons|Revised Plan|Request Type|Collation|Action):")
            .unwrap()
    })
}

fn local_plan_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)\*\*Action (\d+):\*\*[ \t]*(.+?)[ \t]*\r?$").unwrap())
}

/// 单行字段：`Label: value`，取首次出现
fn line_field(text: &str, label: &str) -> Option<String> {
    let re = Regex::new(&format!(r"{}:[ \t]*([^\r\n]*)", regex::escape(label))).ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// 多行字段：`Label:` 之后直到下一个标记行或文本末尾
fn tail_field(text: &str, label: &str) -> Option<String> {
    let start = text.find(&format!("{}:", label))? + label.len() + 1;
    let rest = &text[start..];
    let end = marker_line_re().find(rest).map_or(rest.len(), |m| m.start());
    Some(strip_fences(rest[..end].trim()).to_string())
}

/// 只去掉包裹整个值的一对 ``` 或落单的首尾 ```，值内成对的围栏原样保留
fn strip_fences(value: &str) -> &str {
    const FENCE: &str = "```";
    let count = value.matches(FENCE).count();
    if count == 2 && value.len() >= 2 * FENCE.len() && value.starts_with(FENCE) && value.ends_with(FENCE) {
        return value[FENCE.len()..value.len() - FENCE.len()].trim();
    }
    if count % 2 == 1 {
        if let Some(inner) = value.strip_suffix(FENCE) {
            return inner.trim_end();
        }
        if let Some(inner) = value.strip_prefix(FENCE) {
            return inner.trim_start();
        }
    }
    value
}

/// 决策标签规范化：去掉反引号、方括号、星号与标点，转小写
fn normalize_label(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

pub fn parse_global_plan(text: &str) -> GlobalPlan {
    let headers: Vec<_> = subtask_header_re().captures_iter(text).collect();
    let phases = headers
        .iter()
        .enumerate()
        .filter_map(|(i, header)| {
            let whole = header.get(0)?;
            // 正文截止到下一个阶段标题，缺字段的块不会借用后面块的内容
            let body_end = headers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(text.len(), |m| m.start());
            let body = subtask_body_re().captures(&text[whole.end()..body_end])?;
            Some(PhaseTask {
                number: header.get(1)?.as_str().parse().ok()?,
                title: header.get(2)?.as_str().trim().to_string(),
                subtask: body.get(1)?.as_str().trim().to_string(),
                expected_state: body.get(2)?.as_str().trim().to_string(),
            })
        })
        .collect();
    GlobalPlan { phases }
}

pub fn parse_local_plan(text: &str) -> LocalPlan {
    let actions = local_plan_re()
        .captures_iter(text)
        .filter_map(|c| c.get(2).map(|m| m.as_str().trim().to_string()))
        .filter(|a| !a.is_empty())
        .collect();
    LocalPlan { actions }
}

/// 阶段校验：`Result:`，兼容 `Action:`
pub fn parse_check_result(text: &str) -> CheckResult {
    let result = line_field(text, "Result")
        .or_else(|| line_field(text, "Action"))
        .map(|r| normalize_label(&r));
    CheckResult {
        result,
        reasons: tail_field(text, "Reasons"),
    }
}

/// 重规划裁决：`Decision:`，兼容 `Action:`
pub fn parse_decide_result(text: &str) -> DecideResult {
    let decision = line_field(text, "Decision")
        .or_else(|| line_field(text, "Action"))
        .map(|d| normalize_label(&d));
    DecideResult {
        decision,
        reasons: tail_field(text, "Reasons"),
    }
}

pub fn parse_request_result(text: &str) -> RequestResult {
    RequestResult {
        request_type: line_field(text, "Request Type").map(|r| normalize_label(&r)),
        reasons: tail_field(text, "Reasons"),
    }
}

pub fn parse_revise_result(text: &str) -> Option<String> {
    tail_field(text, "Revised Plan")
}

pub fn parse_collation_result(text: &str) -> Option<String> {
    tail_field(text, "Collation")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_subtasks_in_document_order() {
        let text = "**Subtask 1:** Search\n- **Subtask**: Search for the fax machine\n- **Expected State**: Results are listed\n\n\
                    **Subtask 2: Answer**\n- **Subtask**: Read the price\n- **Expected State**: Price reported\n\n";
        let plan = parse_global_plan(text);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.phases[0].number, 1);
        assert_eq!(plan.phases[0].subtask, "Search for the fax machine");
        assert_eq!(plan.phases[0].expected_state, "Results are listed");
        assert_eq!(plan.phases[1].number, 2);
        assert_eq!(plan.phases[1].title, "Answer");
        assert_eq!(plan.phases[1].expected_state, "Price reported");
    }

    #[test]
    fn test_last_subtask_without_trailing_blank_line() {
        let text = "**Subtask 1: Only**\n- **Subtask**: Do it\n- **Expected State**: Done";
        let plan = parse_global_plan(text);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.phases[0].expected_state, "Done");
    }

    #[test]
    fn test_malformed_plans_are_empty() {
        assert!(parse_global_plan("I cannot plan this task.").is_empty());
        assert!(parse_local_plan("click the button").is_empty());
        assert!(parse_global_plan("").is_empty());
    }

    #[test]
    fn test_local_plan_actions() {
        let text = "Plan:\n**Action 1:** ```type [164] [fax machine] [1]```\n**Action 2:** ```click [1744]```\n";
        let plan = parse_local_plan(text);
        assert_eq!(
            plan.actions,
            vec!["```type [164] [fax machine] [1]```", "```click [1744]```"]
        );
    }

    #[test]
    fn test_missing_reasons_is_absent() {
        let check = parse_check_result("Result: move\n");
        assert_eq!(check.result.as_deref(), Some("move"));
        assert_eq!(check.reasons, None);
        assert_eq!(check.decision(), CheckDecision::Move);
    }

    #[test]
    fn test_check_result_labels_and_multiline_reasons() {
        let check = parse_check_result("Action: ```request```\nReasons: The plan\nis wrong.```");
        assert_eq!(check.decision(), CheckDecision::Request);
        assert_eq!(check.reasons.as_deref(), Some("The plan\nis wrong."));

        let absent = parse_check_result("no markers at all");
        assert_eq!(absent.result, None);
        assert_eq!(absent.decision(), CheckDecision::Revise);

        let unknown = parse_check_result("Result: maybe\nReasons: unsure");
        assert_eq!(unknown.decision(), CheckDecision::Revise);
    }

    #[test]
    fn test_decide_result() {
        let d = parse_decide_result("Decision: [Overrule]\nReasons: keep searching on page 2");
        assert_eq!(d.decision(), ReplanDecision::Overrule);
        assert_eq!(d.reasons.as_deref(), Some("keep searching on page 2"));

        let d = parse_decide_result("Action: revise\nReasons: wrong site");
        assert_eq!(d.decision(), ReplanDecision::Replan);

        assert_eq!(parse_decide_result("").decision(), ReplanDecision::Overrule);
    }

    #[test]
    fn test_request_revise_collation() {
        let r = parse_request_result("Request Type: Replan\nReasons: the store has no search");
        assert_eq!(r.request_type.as_deref(), Some("replan"));
        assert_eq!(r.reasons.as_deref(), Some("the store has no search"));

        assert_eq!(
            parse_revise_result("Revised Plan: **Subtask 1: x**").as_deref(),
            Some("**Subtask 1: x**")
        );
        assert_eq!(parse_collation_result("Collation: $279.49").as_deref(), Some("$279.49"));
        assert_eq!(parse_collation_result("nothing"), None);
    }

    #[test]
    fn test_revised_local_plan_keeps_last_fenced_action() {
        let revised = parse_revise_result(
            "Reasons: the search box was missed\nRevised Plan:\n**Action 1:** ```click [5]```\n**Action 2:** ```stop [$3]```",
        )
        .unwrap();
        let plan = parse_local_plan(&revised);
        assert_eq!(plan.actions, vec!["```click [5]```", "```stop [$3]```"]);
    }

    #[test]
    fn test_wrapping_fence_is_removed() {
        assert_eq!(
            parse_revise_result("Revised Plan: ```\n**Action 1:** click [5]\n```").as_deref(),
            Some("**Action 1:** click [5]")
        );
    }

    #[test]
    fn test_block_without_subtask_line_does_not_borrow_next_block() {
        let text = "**Subtask 1: Search**\n- **Expected State**: Results are listed\n\n\
                    **Subtask 2: Answer**\n- **Subtask**: Read the price\n- **Expected State**: Price reported\n";
        let plan = parse_global_plan(text);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.phases[0].number, 2);
        assert_eq!(plan.phases[0].title, "Answer");
        assert_eq!(plan.phases[0].subtask, "Read the price");
    }

    #[test]
    fn test_reasons_stop_at_next_marker_line() {
        let check = parse_check_result("Reasons: The page shows the cart.\nResult: move\n");
        assert_eq!(check.reasons.as_deref(), Some("The page shows the cart."));
        assert_eq!(check.decision(), CheckDecision::Move);

        let d = parse_decide_result("Reasons: wrong site\nthe store has no search\nDecision: replan");
        assert_eq!(d.reasons.as_deref(), Some("wrong site\nthe store has no search"));
        assert_eq!(d.decision(), ReplanDecision::Replan);
    }
}
