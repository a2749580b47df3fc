//! 可观测性：控制台 + 日志文件
//!
//! 日志文件为 `<log_dir>/log_<时间戳>_<短 uuid>.log`，通过 tracing-appender 非阻塞写入；
//! 返回的 guard 需在 main 中持有到进程结束，否则缓冲日志会丢失。

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub struct LogHandle {
    pub path: PathBuf,
    _guard: WorkerGuard,
}

/// 生成本次运行的日志文件名
pub fn log_file_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "log_{}_{}.log",
        chrono::Local::now().format("%Y%m%d%H%M%S"),
        &id[..8]
    )
}

/// 安装全局 subscriber；RUST_LOG 覆盖默认的 info 级别
pub fn init(log_dir: &Path) -> std::io::Result<LogHandle> {
    std::fs::create_dir_all(log_dir)?;
    let name = log_file_name();
    let path = log_dir.join(&name);
    let appender = tracing_appender::rolling::never(log_dir, &name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Ok(LogHandle { path, _guard: guard })
}
