//! Action Interpreter：自然语言动作描述 -> 类型化 Action
//!
//! 先按分隔符（默认 ```）截取动作片段，再按动作集（id / 坐标）校验语法并构造 Action。
//! 任何 ActionParsingError 都由 `interpret` 降级为 `None` 哨兵动作，控制循环永远有动作可执行。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::{Action, ActionKind, ElementRef, ScrollDirection};
use crate::sites::UrlMapper;

/// 默认动作分隔符
pub const DEFAULT_ACTION_SPLITTER: &str = "```";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionParsingError {
    #[error("Cannot parse action from response: {0}")]
    MissingDelimiter(String),
    #[error("Unknown action verb: {0}")]
    UnknownVerb(String),
    #[error("Malformed arguments for {verb}: {detail}")]
    MalformedArguments { verb: String, detail: String },
}

/// 动作集：按无障碍树 id 定位，或按页面坐标定位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSet {
    #[serde(rename = "id_accessibility_tree")]
    IdBased,
    #[serde(rename = "coordinate")]
    CoordinateBased,
}

impl ActionSet {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "id_accessibility_tree" => Some(Self::IdBased),
            "coordinate" | "coordinate_based" => Some(Self::CoordinateBased),
            _ => None,
        }
    }
}

/// 解释器：持有动作集、分隔符与 URL 映射（模型看到的是真实域名，执行时换回本地地址）
#[derive(Debug, Clone)]
pub struct ActionInterpreter {
    action_set: ActionSet,
    splitter: String,
    url_mapper: UrlMapper,
}

impl ActionInterpreter {
    pub fn new(action_set: ActionSet, splitter: impl Into<String>) -> Self {
        Self {
            action_set,
            splitter: splitter.into(),
            url_mapper: UrlMapper::default(),
        }
    }

    pub fn with_url_mapper(mut self, url_mapper: UrlMapper) -> Self {
        self.url_mapper = url_mapper;
        self
    }

    pub fn action_set(&self) -> ActionSet {
        self.action_set
    }

    /// 解析模型输出；失败时返回 `None` 哨兵，原始文本原样保留
    pub fn interpret(&self, response: &str) -> Action {
        match self.try_interpret(response) {
            Ok(kind) => Action::new(kind, response),
            Err(e) => {
                tracing::debug!(error = %e, "action parsing failed, using none action");
                Action::none(response)
            }
        }
    }

    pub fn try_interpret(&self, response: &str) -> Result<ActionKind, ActionParsingError> {
        let payload = extract_action(response, &self.splitter)?;
        let payload = self.url_mapper.to_local(payload.trim());
        match self.action_set {
            ActionSet::IdBased => parse_id_based(&payload),
            ActionSet::CoordinateBased => parse_coordinate_based(&payload),
        }
    }
}

/// 截取第一对分隔符之间的内容
pub fn extract_action<'a>(response: &'a str, splitter: &str) -> Result<&'a str, ActionParsingError> {
    let missing = || ActionParsingError::MissingDelimiter(response.to_string());
    if splitter.is_empty() {
        return Err(missing());
    }
    let start = response.find(splitter).ok_or_else(missing)? + splitter.len();
    let end = response[start..].find(splitter).ok_or_else(missing)?;
    Ok(&response[start..start + end])
}

/// 拆分动作文本：首个词为动作名，其后为顶层 `[...]` 参数（允许内部嵌套方括号）
fn split_command(text: &str) -> Result<(String, Vec<String>), ActionParsingError> {
    let text = text.trim();
    let verb_end = text
        .find(|c: char| c.is_whitespace() || c == '[')
        .unwrap_or(text.len());
    let verb = text[..verb_end].to_lowercase();
    if verb.is_empty() {
        return Err(ActionParsingError::UnknownVerb(text.to_string()));
    }

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in text[verb_end..].chars() {
        match c {
            '[' => {
                if depth > 0 {
                    current.push(c);
                }
                depth += 1;
            }
            ']' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    args.push(std::mem::take(&mut current));
                } else {
                    current.push(c);
                }
            }
            _ if depth > 0 => current.push(c),
            c if c.is_whitespace() => {}
            _ => {
                return Err(ActionParsingError::MalformedArguments {
                    verb,
                    detail: format!("unexpected text outside brackets in '{}'", text),
                })
            }
        }
    }
    if depth != 0 {
        return Err(ActionParsingError::MalformedArguments {
            verb,
            detail: "unbalanced brackets".to_string(),
        });
    }
    Ok((verb, args))
}

fn malformed(verb: &str, detail: impl Into<String>) -> ActionParsingError {
    ActionParsingError::MalformedArguments {
        verb: verb.to_string(),
        detail: detail.into(),
    }
}

fn expect_args(verb: &str, args: &[String], allowed: &[usize]) -> Result<(), ActionParsingError> {
    if allowed.contains(&args.len()) {
        Ok(())
    } else {
        Err(malformed(
            verb,
            format!("expected {:?} arguments, got {}", allowed, args.len()),
        ))
    }
}

fn element_id(verb: &str, raw: &str) -> Result<ElementRef, ActionParsingError> {
    let id = raw.trim();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed(verb, format!("invalid element id '{}'", raw)));
    }
    Ok(ElementRef::id(id))
}

fn coordinate(verb: &str, x: &str, y: &str) -> Result<ElementRef, ActionParsingError> {
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|_| malformed(verb, format!("invalid coordinate '{}'", v)))
    };
    Ok(ElementRef::Point {
        x: parse(x)?,
        y: parse(y)?,
    })
}

fn press_enter_flag(verb: &str, raw: &str) -> Result<bool, ActionParsingError> {
    let raw = raw.trim();
    let value = raw.strip_prefix("press_enter_after=").unwrap_or(raw);
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(malformed(verb, format!("invalid press_enter_after '{}'", other))),
    }
}

/// 与定位方式无关的动作（键盘、滚动、标签页、导航、停止）
fn parse_common(verb: &str, args: &[String]) -> Result<ActionKind, ActionParsingError> {
    match verb {
        "press" => {
            expect_args(verb, args, &[1])?;
            let key_comb = args[0].trim();
            if key_comb.is_empty() {
                return Err(malformed(verb, "empty key combination"));
            }
            Ok(ActionKind::KeyPress {
                key_comb: key_comb.to_string(),
            })
        }
        "scroll" => {
            expect_args(verb, args, &[1])?;
            let raw = args[0].trim().to_lowercase();
            let value = raw.strip_prefix("direction=").unwrap_or(&raw);
            let direction = match value {
                "up" => ScrollDirection::Up,
                "down" => ScrollDirection::Down,
                other => return Err(malformed(verb, format!("invalid direction '{}'", other))),
            };
            Ok(ActionKind::Scroll { direction })
        }
        "new_tab" => {
            expect_args(verb, args, &[0])?;
            Ok(ActionKind::NewTab)
        }
        "tab_focus" => {
            expect_args(verb, args, &[1])?;
            let index = args[0]
                .trim()
                .parse::<usize>()
                .map_err(|_| malformed(verb, format!("invalid tab index '{}'", args[0])))?;
            Ok(ActionKind::SwitchTab { index })
        }
        "close_tab" => {
            expect_args(verb, args, &[0])?;
            Ok(ActionKind::CloseTab)
        }
        "goto" => {
            expect_args(verb, args, &[1])?;
            let url = args[0].trim();
            if url.is_empty() {
                return Err(malformed(verb, "empty url"));
            }
            Ok(ActionKind::NavigateUrl {
                url: url.to_string(),
            })
        }
        "go_back" => {
            expect_args(verb, args, &[0])?;
            Ok(ActionKind::GoBack)
        }
        "go_forward" => {
            expect_args(verb, args, &[0])?;
            Ok(ActionKind::GoForward)
        }
        "stop" => {
            expect_args(verb, args, &[0, 1])?;
            let answer = args.first().map(|a| a.trim().to_string()).unwrap_or_default();
            Ok(ActionKind::Stop { answer })
        }
        other => Err(ActionParsingError::UnknownVerb(other.to_string())),
    }
}

/// id 动作集：`click [id]`、`hover [id]`、`type [id] [content] [press_enter_after=0|1]` 等
pub fn parse_id_based(text: &str) -> Result<ActionKind, ActionParsingError> {
    let (verb, args) = split_command(text)?;
    match verb.as_str() {
        "click" => {
            expect_args(&verb, &args, &[1])?;
            Ok(ActionKind::Click {
                target: element_id(&verb, &args[0])?,
            })
        }
        "hover" => {
            expect_args(&verb, &args, &[1])?;
            Ok(ActionKind::Hover {
                target: element_id(&verb, &args[0])?,
            })
        }
        "type" => {
            // 省略第三个参数时默认输入后按回车
            expect_args(&verb, &args, &[2, 3])?;
            let press_enter = match args.get(2) {
                Some(flag) => press_enter_flag(&verb, flag)?,
                None => true,
            };
            Ok(ActionKind::Type {
                target: element_id(&verb, &args[0])?,
                text: args[1].clone(),
                press_enter,
            })
        }
        _ => parse_common(&verb, &args),
    }
}

/// 坐标动作集：`click [x] [y]`、`hover [x] [y]`、`type [x] [y] [content] [0|1]` 等
pub fn parse_coordinate_based(text: &str) -> Result<ActionKind, ActionParsingError> {
    let (verb, args) = split_command(text)?;
    match verb.as_str() {
        "click" => {
            expect_args(&verb, &args, &[2])?;
            Ok(ActionKind::Click {
                target: coordinate(&verb, &args[0], &args[1])?,
            })
        }
        "hover" => {
            expect_args(&verb, &args, &[2])?;
            Ok(ActionKind::Hover {
                target: coordinate(&verb, &args[0], &args[1])?,
            })
        }
        "type" => {
            expect_args(&verb, &args, &[3, 4])?;
            let press_enter = match args.get(3) {
                Some(flag) => press_enter_flag(&verb, flag)?,
                None => true,
            };
            Ok(ActionKind::Type {
                target: coordinate(&verb, &args[0], &args[1])?,
                text: args[2].clone(),
                press_enter,
            })
        }
        _ => parse_common(&verb, &args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_interpreter() -> ActionInterpreter {
        ActionInterpreter::new(ActionSet::IdBased, DEFAULT_ACTION_SPLITTER)
    }

    #[test]
    fn test_missing_delimiter_yields_none_with_raw_text() {
        let raw = "I think I should click [42] now";
        let action = id_interpreter().interpret(raw);
        assert!(action.is_none());
        assert_eq!(action.raw_prediction, raw);
    }

    #[test]
    fn test_click_by_id() {
        let action = id_interpreter().interpret("In summary, ```click [42]```");
        assert_eq!(
            action.kind,
            ActionKind::Click {
                target: ElementRef::id("42")
            }
        );
    }

    #[test]
    fn test_type_without_enter() {
        let kind = parse_id_based("type [7] [hello] [0]").unwrap();
        assert_eq!(
            kind,
            ActionKind::Type {
                target: ElementRef::id("7"),
                text: "hello".to_string(),
                press_enter: false,
            }
        );
    }

    #[test]
    fn test_type_defaults_to_enter_and_keeps_nested_brackets() {
        let kind = parse_id_based("type [164] [restaurants [near] CMU]").unwrap();
        assert_eq!(
            kind,
            ActionKind::Type {
                target: ElementRef::id("164"),
                text: "restaurants [near] CMU".to_string(),
                press_enter: true,
            }
        );
    }

    #[test]
    fn test_stop_with_answer() {
        let action = id_interpreter().interpret("```stop [$279.49]```");
        assert_eq!(action.answer(), Some("$279.49"));
    }

    #[test]
    fn test_scroll_accepts_direction_prefix() {
        assert_eq!(
            parse_id_based("scroll [direction=down]").unwrap(),
            ActionKind::Scroll {
                direction: ScrollDirection::Down
            }
        );
        assert!(parse_id_based("scroll [sideways]").is_err());
    }

    #[test]
    fn test_unknown_verb_and_bad_arity() {
        assert!(matches!(
            parse_id_based("dance [1]"),
            Err(ActionParsingError::UnknownVerb(_))
        ));
        assert!(matches!(
            parse_id_based("click [1] [2]"),
            Err(ActionParsingError::MalformedArguments { .. })
        ));
        assert!(parse_id_based("click [abc]").is_err());
    }

    #[test]
    fn test_coordinate_click() {
        let kind = parse_coordinate_based("click [10.5] [200]").unwrap();
        assert_eq!(
            kind,
            ActionKind::Click {
                target: ElementRef::Point { x: 10.5, y: 200.0 }
            }
        );
        assert!(parse_coordinate_based("click [42]").is_err());
    }

    #[test]
    fn test_goto_maps_real_url_to_local() {
        let mapper = UrlMapper::new(vec![(
            "http://localhost:7770".to_string(),
            "http://onestopmarket.com".to_string(),
        )]);
        let interpreter = id_interpreter().with_url_mapper(mapper);
        let action = interpreter.interpret("```goto [http://onestopmarket.com/office.html]```");
        assert_eq!(
            action.kind,
            ActionKind::NavigateUrl {
                url: "http://localhost:7770/office.html".to_string()
            }
        );
    }
}
