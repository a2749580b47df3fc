//! 浏览器环境：抽象接口、脚本化实现（测试）与 Headless Chrome 实现（feature "browser"）

#[cfg(feature = "browser")]
pub mod chrome;
pub mod env;
pub mod scripted;

#[cfg(feature = "browser")]
pub use chrome::{ChromeBrowserEnv, ChromeEnvFactory};
pub use env::{remove_active_tab, BrowserEnv, BrowserEnvFactory, StepOutcome};
pub use scripted::{EnvLog, ScriptedBrowserEnv, ScriptedEnvFactory, ScriptedPage};
