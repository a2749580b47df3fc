//! 浏览器动作：封闭的标签联合
//!
//! 动作集合是固定的，解释器、等价判断、执行处都对 ActionKind 做穷尽匹配。
//! `None` 是模型输出无法解析时的哨兵，保留原始文本以便审计。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 动作作用的元素：按无障碍树 id，或按页面坐标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum ElementRef {
    Id { id: String },
    Point { x: f64, y: f64 },
}

impl ElementRef {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id { id: id.into() }
    }

    fn same_as(&self, other: &ElementRef) -> bool {
        match (self, other) {
            (Self::Id { id: a }, Self::Id { id: b }) => a.trim() == b.trim(),
            (Self::Point { x: x1, y: y1 }, Self::Point { x: x2, y: y2 }) => {
                (x1 - x2).abs() < 1e-6 && (y1 - y2).abs() < 1e-6
            }
            _ => false,
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id { id } => write!(f, "[{}]", id),
            Self::Point { x, y } => write!(f, "[{}] [{}]", x, y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// 动作类型及其参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Click { target: ElementRef },
    Type { target: ElementRef, text: String, press_enter: bool },
    Hover { target: ElementRef },
    KeyPress { key_comb: String },
    Scroll { direction: ScrollDirection },
    NewTab,
    SwitchTab { index: usize },
    CloseTab,
    NavigateUrl { url: String },
    GoBack,
    GoForward,
    Stop { answer: String },
    /// 解析失败哨兵
    None,
}

impl ActionKind {
    /// 动作类型标签（用于日志与等价判断）
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::Type { .. } => "type",
            Self::Hover { .. } => "hover",
            Self::KeyPress { .. } => "press",
            Self::Scroll { .. } => "scroll",
            Self::NewTab => "new_tab",
            Self::SwitchTab { .. } => "tab_focus",
            Self::CloseTab => "close_tab",
            Self::NavigateUrl { .. } => "goto",
            Self::GoBack => "go_back",
            Self::GoForward => "go_forward",
            Self::Stop { .. } => "stop",
            Self::None => "none",
        }
    }
}

/// 单个动作：类型化参数 + 模型原始输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub raw_prediction: String,
}

impl Action {
    pub fn new(kind: ActionKind, raw_prediction: impl Into<String>) -> Self {
        Self {
            kind,
            raw_prediction: raw_prediction.into(),
        }
    }

    /// 合成 STOP 动作（早停、计划耗尽、空计划时由控制循环生成）
    pub fn stop(answer: impl Into<String>) -> Self {
        let answer = answer.into();
        Self {
            raw_prediction: format!("stop [{}]", answer),
            kind: ActionKind::Stop { answer },
        }
    }

    /// 解析失败哨兵，保留原始文本
    pub fn none(raw_prediction: impl Into<String>) -> Self {
        Self::new(ActionKind::None, raw_prediction)
    }

    pub fn is_stop(&self) -> bool {
        matches!(self.kind, ActionKind::Stop { .. })
    }

    pub fn is_none(&self) -> bool {
        matches!(self.kind, ActionKind::None)
    }

    pub fn is_type(&self) -> bool {
        matches!(self.kind, ActionKind::Type { .. })
    }

    /// STOP 动作的答案；其它动作返回 None
    pub fn answer(&self) -> Option<&str> {
        match &self.kind {
            ActionKind::Stop { answer } => Some(answer),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<&ElementRef> {
        match &self.kind {
            ActionKind::Click { target }
            | ActionKind::Hover { target }
            | ActionKind::Type { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ActionKind::Click { target } => write!(f, "click {}", target),
            ActionKind::Type {
                target,
                text,
                press_enter,
            } => write!(f, "type {} [{}] [{}]", target, text, u8::from(*press_enter)),
            ActionKind::Hover { target } => write!(f, "hover {}", target),
            ActionKind::KeyPress { key_comb } => write!(f, "press [{}]", key_comb),
            ActionKind::Scroll { direction } => write!(f, "scroll [{}]", direction),
            ActionKind::NewTab => write!(f, "new_tab"),
            ActionKind::SwitchTab { index } => write!(f, "tab_focus [{}]", index),
            ActionKind::CloseTab => write!(f, "close_tab"),
            ActionKind::NavigateUrl { url } => write!(f, "goto [{}]", url),
            ActionKind::GoBack => write!(f, "go_back"),
            ActionKind::GoForward => write!(f, "go_forward"),
            ActionKind::Stop { answer } => write!(f, "stop [{}]", answer),
            ActionKind::None => write!(f, "none ({})", self.raw_prediction.trim()),
        }
    }
}

/// 两个动作是否等价：类型相同且规范化后的参数相同；STOP 仅在答案一致时等价
pub fn is_equivalent(a: &Action, b: &Action) -> bool {
    use ActionKind::*;
    match (&a.kind, &b.kind) {
        (Click { target: t1 }, Click { target: t2 }) | (Hover { target: t1 }, Hover { target: t2 }) => {
            t1.same_as(t2)
        }
        (
            Type {
                target: t1,
                text: x1,
                press_enter: e1,
            },
            Type {
                target: t2,
                text: x2,
                press_enter: e2,
            },
        ) => t1.same_as(t2) && x1.trim() == x2.trim() && e1 == e2,
        (KeyPress { key_comb: k1 }, KeyPress { key_comb: k2 }) => {
            k1.trim().eq_ignore_ascii_case(k2.trim())
        }
        (Scroll { direction: d1 }, Scroll { direction: d2 }) => d1 == d2,
        (SwitchTab { index: i1 }, SwitchTab { index: i2 }) => i1 == i2,
        (NavigateUrl { url: u1 }, NavigateUrl { url: u2 }) => u1.trim() == u2.trim(),
        (Stop { answer: a1 }, Stop { answer: a2 }) => a1.trim() == a2.trim(),
        (NewTab, NewTab) | (CloseTab, CloseTab) | (GoBack, GoBack) | (GoForward, GoForward) => true,
        (None, None) => true,
        _ => false,
    }
}

/// 动作描述（写入 action history，作为下一次提示的 PREVIOUS ACTION）
///
/// 若观察文本中能找到目标元素所在行，则附上该行内容，例如 `click [42] where [42] is button 'Add to Cart'`。
pub fn describe_action(action: &Action, observation: &str) -> String {
    let base = action.to_string();
    let Some(ElementRef::Id { id }) = action.target() else {
        return base;
    };
    let marker = format!("[{}]", id.trim());
    match observation
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with(&marker))
    {
        Some(line) => {
            let element = line[marker.len()..].trim();
            format!("{} where {} is {}", base, marker, element)
        }
        None => base,
    }
}
