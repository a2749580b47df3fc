//! 任务边界错误恢复
//!
//! 根据 AgentError 类型返回 RecoveryAction，供 SessionDriver 决定跳过任务、记录错误还是终止批次。
//! 单个任务失败永远不会让整个批次崩溃。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为任务边界动作，并负责 error.txt 的追加写入
#[derive(Debug)]
pub struct RecoveryEngine {
    error_log: Option<PathBuf>,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryEngine {
    pub fn new() -> Self {
        Self { error_log: None }
    }

    /// 指定 error.txt 路径（通常为 result_dir/error.txt）
    pub fn with_error_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_log = Some(path.into());
        self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::Provider(e) => RecoveryAction::SkipTask(format!("[Provider Error] {e}")),
            AgentError::ConfigError(msg) => {
                RecoveryAction::AbortBatch(format!("[Config Error] {msg}"))
            }
            AgentError::Cancelled => RecoveryAction::AbortBatch("[Cancelled]".to_string()),
            other => RecoveryAction::RecordAndSkip(format!("[Unhandled Error] {other}")),
        }
    }

    /// 将失败任务写入 error.txt：配置文件、错误信息、调试表示
    pub fn record(&self, config_file: &Path, err: &AgentError) -> std::io::Result<()> {
        let Some(path) = &self.error_log else {
            return Ok(());
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "[Config file]: {}", config_file.display())?;
        writeln!(file, "[Unhandled Error] {err}")?;
        writeln!(file, "{err:#?}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_recovery_provider_error() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Provider(LlmError::Api("rate limited".to_string()));
        match engine.handle(&err) {
            RecoveryAction::SkipTask(msg) => assert!(msg.contains("rate limited")),
            other => panic!("Expected SkipTask, got {:?}", other),
        }
    }

    #[test]
    fn test_recovery_config_error_aborts() {
        let engine = RecoveryEngine::new();
        let err = AgentError::ConfigError("bad mode".to_string());
        assert!(matches!(engine.handle(&err), RecoveryAction::AbortBatch(_)));
    }

    #[test]
    fn test_recovery_cancelled() {
        let engine = RecoveryEngine::new();
        assert!(matches!(
            engine.handle(&AgentError::Cancelled),
            RecoveryAction::AbortBatch(_)
        ));
    }

    #[test]
    fn test_recovery_environment_error_is_recorded() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Environment("chrome crashed".to_string());
        assert!(matches!(engine.handle(&err), RecoveryAction::RecordAndSkip(_)));
    }

    #[test]
    fn test_record_appends_to_error_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("error.txt");
        let engine = RecoveryEngine::new().with_error_log(&log);
        let err = AgentError::Evaluation("locator failed".to_string());
        engine.record(Path::new("config_files/3.json"), &err).unwrap();
        engine.record(Path::new("config_files/4.json"), &err).unwrap();
        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.contains("config_files/3.json"));
        assert!(text.contains("config_files/4.json"));
        assert_eq!(text.matches("[Unhandled Error]").count(), 2);
    }
}
