//! 核心层：错误与恢复、轨迹、任务状态、渲染、批量运行

pub mod error;
pub mod recovery;
pub mod render;
pub mod session;
pub mod state;
pub mod trajectory;

pub use error::{AgentError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use render::RenderHelper;
pub use session::{
    config_files_in_range, dump_config, get_unfinished, prepare_result_dir, record_log_file,
    BatchSummary, SessionDriver, TaskReport,
};
pub use state::TaskState;
pub use trajectory::{StateInfo, Trajectory, TrajectoryItem};
