// ==========================================
// 配送机器人排程 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供上层传输层调用
// ==========================================

pub mod error;
pub mod robot_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use robot_api::RobotApi;
