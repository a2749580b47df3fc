//! 动作层：类型化浏览器动作与动作解释器

pub mod interpreter;
pub mod types;

pub use interpreter::{
    extract_action, parse_coordinate_based, parse_id_based, ActionInterpreter, ActionParsingError,
    ActionSet, DEFAULT_ACTION_SPLITTER,
};
pub use types::{describe_action, is_equivalent, Action, ActionKind, ElementRef, ScrollDirection};
