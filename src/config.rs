//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WAYFINDER__*` 覆盖（双下划线表示嵌套，如 `WAYFINDER__LLM__PROVIDER=openai`）。
//! 站点地址另外接受 `REDDIT`、`SHOPPING` 等普通环境变量。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::action::ActionSet;
use crate::core::AgentError;
use crate::llm::{GenerationConfig, LmConfig, LmMode};
use crate::plan::EarlyStopConfig;
use crate::sites::SiteUrls;

const SUPPORTED_PROVIDERS: [&str; 3] = ["openai", "deepseek", "mock"];

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub browser: BrowserSection,
    pub sites: SiteUrls,
}

/// [app] 段：结果目录、日志目录、任务配置目录与任务下标范围
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 为空时使用 cache/results_<时间戳>
    pub result_dir: Option<PathBuf>,
    pub log_dir: PathBuf,
    /// 存放 `<idx>.json` 任务配置的目录
    pub config_dir: PathBuf,
    pub test_start_idx: usize,
    /// 不含
    pub test_end_idx: usize,
    /// 是否为每个任务输出 render_<id>.html
    pub render: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            result_dir: None,
            log_dir: PathBuf::from("log_files"),
            config_dir: PathBuf::from("config_files"),
            test_start_idx: 0,
            test_end_idx: 1000,
            render: true,
        }
    }
}

/// [llm] 段：后端、模型、调用方式与生成参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / deepseek / mock
    pub provider: String,
    pub model: String,
    /// chat / completion
    pub mode: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub context_length: u32,
    pub max_tokens: u32,
    pub stop_token: Option<String>,
    pub max_obs_length: usize,
    /// 模糊匹配评估所用模型，未设置时与 model 相同
    pub judge_model: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        let gen = GenerationConfig::default();
        Self {
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo-0613".to_string(),
            mode: "chat".to_string(),
            base_url: None,
            temperature: gen.temperature,
            top_p: gen.top_p,
            context_length: gen.context_length,
            max_tokens: gen.max_tokens,
            stop_token: gen.stop_token,
            max_obs_length: gen.max_obs_length,
            judge_model: None,
        }
    }
}

/// [agent] 段：动作集、指令文件、早停阈值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// id_accessibility_tree / coordinate
    pub action_set_tag: String,
    /// 未设置时使用内置指令
    pub local_instruction_path: Option<PathBuf>,
    pub global_instruction_path: Option<PathBuf>,
    pub max_steps: usize,
    pub parsing_failure_th: usize,
    pub repeating_action_failure_th: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        let early = EarlyStopConfig::default();
        Self {
            action_set_tag: "id_accessibility_tree".to_string(),
            local_instruction_path: None,
            global_instruction_path: None,
            max_steps: early.max_steps,
            parsing_failure_th: early.parsing_failure_th,
            repeating_action_failure_th: early.repeating_action_failure_th,
        }
    }
}

/// [browser] 段
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub headless: bool,
    /// 每个浏览器操作后的额外延迟（毫秒）
    pub slow_mo: u64,
    /// accessibility_tree / html / image
    pub observation_type: String,
    pub current_viewport_only: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub save_trace_enabled: bool,
    /// 执行动作后等待页面稳定的秒数
    pub sleep_after_execution: f64,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: true,
            slow_mo: 0,
            observation_type: "accessibility_tree".to_string(),
            current_viewport_only: false,
            viewport_width: 1280,
            viewport_height: 720,
            save_trace_enabled: false,
            sleep_after_execution: 0.0,
        }
    }
}

impl AppConfig {
    pub fn lm_mode(&self) -> Result<LmMode, AgentError> {
        LmMode::parse(&self.llm.mode)
            .ok_or_else(|| AgentError::ConfigError(format!("unsupported mode '{}'", self.llm.mode)))
    }

    pub fn action_set(&self) -> Result<ActionSet, AgentError> {
        ActionSet::from_tag(&self.agent.action_set_tag).ok_or_else(|| {
            AgentError::ConfigError(format!(
                "unsupported action set tag '{}'",
                self.agent.action_set_tag
            ))
        })
    }

    pub fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.llm.temperature,
            top_p: self.llm.top_p,
            context_length: self.llm.context_length,
            max_tokens: self.llm.max_tokens,
            stop_token: self.llm.stop_token.clone().filter(|s| !s.is_empty()),
            max_obs_length: self.llm.max_obs_length,
        }
    }

    pub fn lm_config(&self) -> Result<LmConfig, AgentError> {
        Ok(LmConfig {
            provider: self.llm.provider.clone(),
            model: self.llm.model.clone(),
            mode: self.lm_mode()?,
            gen: self.generation_config(),
        })
    }

    pub fn early_stop_config(&self) -> EarlyStopConfig {
        EarlyStopConfig {
            max_steps: self.agent.max_steps,
            parsing_failure_th: self.agent.parsing_failure_th,
            repeating_action_failure_th: self.agent.repeating_action_failure_th,
        }
    }

    /// 结果目录：未配置时按当前时间生成
    pub fn result_dir(&self) -> PathBuf {
        match &self.app.result_dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
            _ => PathBuf::from(format!(
                "cache/results_{}",
                chrono::Local::now().format("%Y%m%d%H%M%S")
            )),
        }
    }

    /// 启动期校验；任一失败即终止，不运行任何任务
    pub fn validate(&self) -> Result<(), AgentError> {
        let action_set = self.action_set()?;
        if action_set == ActionSet::IdBased && self.browser.observation_type != "accessibility_tree" {
            return Err(AgentError::ConfigError(format!(
                "action set '{}' requires the accessibility_tree observation, got '{}'",
                self.agent.action_set_tag, self.browser.observation_type
            )));
        }
        self.lm_mode()?;
        let provider = self.llm.provider.trim().to_lowercase();
        if !SUPPORTED_PROVIDERS.contains(&provider.as_str()) {
            return Err(AgentError::ConfigError(format!(
                "unsupported provider '{}'",
                self.llm.provider
            )));
        }
        if self.agent.max_steps == 0
            || self.agent.parsing_failure_th == 0
            || self.agent.repeating_action_failure_th == 0
        {
            return Err(AgentError::ConfigError(
                "max_steps and early-stop thresholds must be positive".to_string(),
            ));
        }
        if self.app.test_start_idx > self.app.test_end_idx {
            return Err(AgentError::ConfigError(format!(
                "test_start_idx {} is after test_end_idx {}",
                self.app.test_start_idx, self.app.test_end_idx
            )));
        }
        self.sites.validate()
    }
}

/// 从 config 目录加载配置，环境变量 WAYFINDER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 WAYFINDER__*（双下划线表示嵌套键）
/// 4. 站点地址最后读取 REDDIT / SHOPPING / ... 覆盖
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WAYFINDER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    let mut app: AppConfig = c.try_deserialize()?;
    app.sites = app.sites.with_env_overrides();
    Ok(app)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.early_stop_config(), EarlyStopConfig::default());
        assert_eq!(config.generation_config(), GenerationConfig::default());
    }

    #[test]
    fn test_id_action_set_requires_accessibility_tree() {
        let mut config = AppConfig::default();
        config.browser.observation_type = "html".to_string();
        assert!(matches!(config.validate(), Err(AgentError::ConfigError(_))));
    }

    #[test]
    fn test_unsupported_provider_and_mode() {
        let mut config = AppConfig::default();
        config.llm.provider = "huggingface".to_string();
        assert!(matches!(config.validate(), Err(AgentError::ConfigError(_))));

        let mut config = AppConfig::default();
        config.llm.mode = "streaming".to_string();
        assert!(matches!(config.validate(), Err(AgentError::ConfigError(_))));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[llm]\nprovider = \"mock\"\nmax_tokens = 128\n\n[agent]\nmax_steps = 7\n\n[sites]\nshopping = \"http://10.0.0.2:7770\""
        )
        .unwrap();
        let config = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.llm.provider, "mock");
        assert_eq!(config.llm.max_tokens, 128);
        assert_eq!(config.agent.max_steps, 7);
        assert_eq!(config.agent.parsing_failure_th, 3);
    }
}
