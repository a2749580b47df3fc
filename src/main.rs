//! Wayfinder 命令行入口
//!
//! - `run`：按配置批量运行基准任务并评分
//! - `prepare-configs`：替换测试数据中的站点占位符并拆分为逐任务配置

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use wayfinder::agent::{create_agent_components, create_env_factory};
use wayfinder::config::{load_config, AppConfig};
use wayfinder::core::{
    config_files_in_range, dump_config, get_unfinished, prepare_result_dir, record_log_file,
    SessionDriver,
};
use wayfinder::sites::split_test_configs;

#[derive(Parser, Debug)]
#[command(name = "wayfinder", version, about = "Two-tier planning web agent")]
struct Cli {
    /// 额外的 TOML 配置文件
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 运行任务批次
    Run {
        #[arg(long)]
        result_dir: Option<PathBuf>,
        #[arg(long)]
        config_dir: Option<PathBuf>,
        #[arg(long)]
        test_start_idx: Option<usize>,
        #[arg(long)]
        test_end_idx: Option<usize>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// chat / completion
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        max_steps: Option<usize>,
        /// 不输出 render_<id>.html
        #[arg(long)]
        no_render: bool,
        #[arg(long)]
        save_trace: bool,
    },
    /// 由 test.raw.json 生成逐任务配置
    PrepareConfigs {
        #[arg(long, default_value = "config_files/test.raw.json")]
        raw: PathBuf,
        #[arg(long, default_value = "config_files")]
        out_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = load_config(cli.config.clone()).context("Failed to load config")?;

    match cli.command {
        Command::PrepareConfigs { raw, out_dir } => {
            let _log = wayfinder::observability::init(&cfg.app.log_dir).context("Failed to init logging")?;
            cfg.sites.validate()?;
            let count = split_test_configs(&cfg.sites, &raw, &out_dir)
                .with_context(|| format!("Failed to split {}", raw.display()))?;
            println!("{} task configs written to {}", count, out_dir.display());
            Ok(())
        }
        Command::Run {
            result_dir,
            config_dir,
            test_start_idx,
            test_end_idx,
            provider,
            model,
            mode,
            max_steps,
            no_render,
            save_trace,
        } => {
            if let Some(v) = result_dir {
                cfg.app.result_dir = Some(v);
            }
            if let Some(v) = config_dir {
                cfg.app.config_dir = v;
            }
            if let Some(v) = test_start_idx {
                cfg.app.test_start_idx = v;
            }
            if let Some(v) = test_end_idx {
                cfg.app.test_end_idx = v;
            }
            if let Some(v) = provider {
                cfg.llm.provider = v;
            }
            if let Some(v) = model {
                cfg.llm.model = v;
            }
            if let Some(v) = mode {
                cfg.llm.mode = v;
            }
            if let Some(v) = max_steps {
                cfg.agent.max_steps = v;
            }
            if no_render {
                cfg.app.render = false;
            }
            if save_trace {
                cfg.browser.save_trace_enabled = true;
            }
            run(cfg).await
        }
    }
}

async fn run(mut cfg: AppConfig) -> anyhow::Result<()> {
    let log = wayfinder::observability::init(&cfg.app.log_dir).context("Failed to init logging")?;
    cfg.validate().context("Invalid configuration")?;

    let result_dir = cfg.result_dir();
    cfg.app.result_dir = Some(result_dir.clone());
    prepare_result_dir(&result_dir)?;
    dump_config(&result_dir, &cfg)?;
    record_log_file(&result_dir, &log.path)?;

    let components = create_agent_components(&cfg).context("Failed to create agent")?;
    let env_factory = create_env_factory(&cfg)?;

    let all = config_files_in_range(&cfg.app.config_dir, cfg.app.test_start_idx, cfg.app.test_end_idx);
    let todo = get_unfinished(&all, &result_dir);
    tracing::info!(total = all.len(), unfinished = todo.len(), "Total {} tasks left", todo.len());

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, stopping after the current task");
            on_ctrl_c.cancel();
        }
    });

    let driver = SessionDriver::new(components.session, env_factory, &result_dir)
        .with_judge(components.judge)
        .with_save_trace(cfg.browser.save_trace_enabled)
        .with_render(cfg.app.render);
    let summary = driver.run_batch(&todo, &cancel).await?;

    match summary.average() {
        Some(avg) => println!(
            "Average score: {:.4} over {} tasks ({} skipped, {} failed)",
            avg,
            summary.reports.len(),
            summary.skipped,
            summary.failed
        ),
        None => println!("No task completed scoring"),
    }
    Ok(())
}
