//! 提示层：指令加载、提示构造（chat / completion 适配）、观察截断

pub mod constructor;
pub mod instruction;
pub mod tokens;

pub use constructor::{render_template, PromptConstructor, PromptContext, PromptedLm, ResponseKind};
pub use instruction::{Instruction, InstructionMeta};
pub use tokens::TokenEstimator;
