//! Session Driver：批量运行任务
//!
//! 每个任务：启动浏览器 → reset → 规划执行循环 → 评估 → 保存轨迹/渲染 → 关闭浏览器。
//! 浏览器在任何退出路径上都会关闭；单个任务失败交给 RecoveryEngine，不会中断整个批次。
//! 任务之间可通过 CancellationToken 取消。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::browser::{BrowserEnv, BrowserEnvFactory};
use crate::config::AppConfig;
use crate::core::render::{render_path, RenderHelper};
use crate::core::{AgentError, RecoveryAction, RecoveryEngine, TaskState};
use crate::evaluation::{evaluator_router, Evaluator};
use crate::llm::LlmClient;
use crate::plan::PlanSession;
use crate::task::TaskConfig;

/// 单个任务的评分记录（逐行追加到 scores.jsonl）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskReport {
    pub task_id: String,
    pub config_file: PathBuf,
    pub score: f64,
    pub steps: usize,
    pub answer: Option<String>,
    pub early_stop: Option<String>,
    pub final_result: Option<String>,
}

/// 批次汇总：平均分只统计完成评分的任务
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub reports: Vec<TaskReport>,
    /// 模型后端错误跳过的任务数
    pub skipped: usize,
    /// 其它错误（已写入 error.txt）的任务数
    pub failed: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn average(&self) -> Option<f64> {
        if self.reports.is_empty() {
            None
        } else {
            Some(self.reports.iter().map(|r| r.score).sum::<f64>() / self.reports.len() as f64)
        }
    }
}

/// 创建结果目录及 traces/ 子目录
pub fn prepare_result_dir(result_dir: &Path) -> Result<(), AgentError> {
    std::fs::create_dir_all(result_dir.join("traces"))?;
    tracing::info!(dir = %result_dir.display(), "result directory prepared");
    Ok(())
}

/// 本次运行的配置写入 config.json（已存在时不覆盖）
pub fn dump_config(result_dir: &Path, config: &AppConfig) -> Result<(), AgentError> {
    let path = result_dir.join("config.json");
    if !path.exists() {
        std::fs::write(&path, serde_json::to_string_pretty(config)?)?;
        tracing::info!(path = %path.display(), "config dumped");
    }
    Ok(())
}

/// 日志文件路径追加到 log_files.txt
pub fn record_log_file(result_dir: &Path, log_file: &Path) -> Result<(), AgentError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(result_dir.join("log_files.txt"))?;
    writeln!(file, "{}", log_file.display())?;
    Ok(())
}

/// 跳过已有 render_<id>.html 的任务（id 取配置文件名）
pub fn get_unfinished(config_files: &[PathBuf], result_dir: &Path) -> Vec<PathBuf> {
    config_files
        .iter()
        .filter(|file| {
            let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                return true;
            };
            !render_path(result_dir, stem).exists()
        })
        .cloned()
        .collect()
}

/// 按下标范围列出 `<idx>.json`（不存在的文件跳过）
pub fn config_files_in_range(config_dir: &Path, start: usize, end: usize) -> Vec<PathBuf> {
    (start..end)
        .map(|i| config_dir.join(format!("{}.json", i)))
        .filter(|p| p.exists())
        .collect()
}

pub struct SessionDriver {
    session: PlanSession,
    env_factory: Arc<dyn BrowserEnvFactory>,
    judge: Option<Arc<dyn LlmClient>>,
    result_dir: PathBuf,
    recovery: RecoveryEngine,
    save_trace: bool,
    render: bool,
}

impl SessionDriver {
    pub fn new(session: PlanSession, env_factory: Arc<dyn BrowserEnvFactory>, result_dir: impl Into<PathBuf>) -> Self {
        let result_dir = result_dir.into();
        let recovery = RecoveryEngine::new().with_error_log(result_dir.join("error.txt"));
        Self {
            session,
            env_factory,
            judge: None,
            result_dir,
            recovery,
            save_trace: false,
            render: true,
        }
    }

    /// 模糊匹配评估使用的判分模型
    pub fn with_judge(mut self, judge: Arc<dyn LlmClient>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn with_save_trace(mut self, enabled: bool) -> Self {
        self.save_trace = enabled;
        self
    }

    pub fn with_render(mut self, enabled: bool) -> Self {
        self.render = enabled;
        self
    }

    pub fn result_dir(&self) -> &Path {
        &self.result_dir
    }

    /// 依次运行任务；取消只在任务之间生效
    pub async fn run_batch(
        &self,
        config_files: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, AgentError> {
        let mut summary = BatchSummary::default();
        for config_file in config_files {
            if cancel.is_cancelled() {
                tracing::warn!("batch cancelled");
                summary.cancelled = true;
                break;
            }
            match self.run_one(config_file).await {
                Ok(report) => {
                    let verdict = if report.score >= 1.0 { "PASS" } else { "FAIL" };
                    tracing::info!("[Result] ({}) {}", verdict, config_file.display());
                    self.append_score(&report)?;
                    summary.reports.push(report);
                }
                Err(err) => match self.recovery.handle(&err) {
                    RecoveryAction::SkipTask(msg) => {
                        tracing::error!(config_file = %config_file.display(), "{}", msg);
                        summary.skipped += 1;
                    }
                    RecoveryAction::RecordAndSkip(msg) => {
                        tracing::error!(config_file = %config_file.display(), "{}", msg);
                        if let Err(e) = self.recovery.record(config_file, &err) {
                            tracing::warn!(error = %e, "failed to write error log");
                        }
                        summary.failed += 1;
                    }
                    RecoveryAction::AbortBatch(msg) => {
                        tracing::error!(config_file = %config_file.display(), "{}", msg);
                        return Err(err);
                    }
                },
            }
        }
        match summary.average() {
            Some(avg) => tracing::info!(
                scored = summary.reports.len(),
                skipped = summary.skipped,
                failed = summary.failed,
                "Average score: {:.4}",
                avg
            ),
            None => tracing::info!("no task completed scoring"),
        }
        Ok(summary)
    }

    /// 单个任务；浏览器在所有路径上关闭
    pub async fn run_one(&self, config_file: &Path) -> Result<TaskReport, AgentError> {
        let task = TaskConfig::load(config_file)?;
        tracing::info!(task_id = %task.task_id, intent = %task.intent, "[Config file]: {}", config_file.display());

        let mut env = self.env_factory.launch().await?;
        let result = self.run_in_env(&task, env.as_mut()).await;
        if let Err(e) = env.close().await {
            tracing::warn!(task_id = %task.task_id, error = %e, "failed to close browser");
        }
        let (state, score) = result?;

        if self.render {
            RenderHelper::new(&self.result_dir, &render_id(config_file, &task)).render(&task, &state, score)?;
        }
        Ok(TaskReport {
            task_id: state.task_id.clone(),
            config_file: config_file.to_path_buf(),
            score,
            steps: state.trajectory.num_steps(),
            answer: state.final_answer().map(String::from),
            early_stop: state.early_stop.clone(),
            final_result: state.final_result.clone(),
        })
    }

    async fn run_in_env(&self, task: &TaskConfig, env: &mut dyn BrowserEnv) -> Result<(TaskState, f64), AgentError> {
        let initial = env.reset(task).await?;
        let mut state = TaskState::new(task.task_id.to_string(), task.intent.clone(), initial);
        self.session.run_task(&mut state, env).await?;

        let evaluator = evaluator_router(task, self.judge.clone())?;
        let score = evaluator.score(&state.trajectory, task, env).await?;
        tracing::info!(task_id = %state.task_id, score, "task scored");

        if self.save_trace {
            let path = self
                .result_dir
                .join("traces")
                .join(format!("{}.zip", task.task_id));
            env.save_trace(&path).await?;
        }
        Ok((state, score))
    }

    fn append_score(&self, report: &TaskReport) -> Result<(), AgentError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.result_dir.join("scores.jsonl"))?;
        writeln!(file, "{}", serde_json::to_string(report)?)?;
        Ok(())
    }
}

/// 渲染文件名与断点续跑使用同一个 id：配置文件名，否则 task_id
fn render_id(config_file: &Path, task: &TaskConfig) -> String {
    config_file
        .file_stem()
        .and_then(|s| s.to_str())
        .map(String::from)
        .unwrap_or_else(|| task.task_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_unfinished_skips_rendered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("render_0.html"), "<html></html>").unwrap();
        let files = vec![PathBuf::from("config_files/0.json"), PathBuf::from("config_files/1.json")];
        let unfinished = get_unfinished(&files, dir.path());
        assert_eq!(unfinished, vec![PathBuf::from("config_files/1.json")]);
    }

    #[test]
    fn test_prepare_and_dump() {
        let dir = tempfile::tempdir().unwrap();
        let result_dir = dir.path().join("results");
        prepare_result_dir(&result_dir).unwrap();
        assert!(result_dir.join("traces").is_dir());
        dump_config(&result_dir, &AppConfig::default()).unwrap();
        let text = std::fs::read_to_string(result_dir.join("config.json")).unwrap();
        assert!(text.contains("\"max_steps\": 30"));
        record_log_file(&result_dir, Path::new("log_files/log_1.log")).unwrap();
        record_log_file(&result_dir, Path::new("log_files/log_2.log")).unwrap();
        let logs = std::fs::read_to_string(result_dir.join("log_files.txt")).unwrap();
        assert_eq!(logs.lines().count(), 2);
    }

    #[test]
    fn test_average_over_scored_only() {
        let report = |score| TaskReport {
            task_id: "1".to_string(),
            config_file: PathBuf::from("1.json"),
            score,
            steps: 1,
            answer: None,
            early_stop: None,
            final_result: None,
        };
        let summary = BatchSummary {
            reports: vec![report(1.0), report(0.0)],
            skipped: 3,
            ..Default::default()
        };
        assert_eq!(summary.average(), Some(0.5));
        assert_eq!(BatchSummary::default().average(), None);
    }
}
