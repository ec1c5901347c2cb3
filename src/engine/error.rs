// ==========================================
// 配送机器人排程 - 引擎层错误类型
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// 输入不合法（负载重、负重量/价值、规模超限等），优化前即拒绝
    #[error("无效输入: {0}")]
    InvalidInput(String),

    /// 排程被取消或超时中止，不返回任何部分结果
    #[error("排程已取消")]
    Cancelled,

    #[error(transparent)]
    Repository(RepositoryError),

    #[error("后台任务执行失败: {0}")]
    TaskJoinError(String),
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Cancelled => EngineError::Cancelled,
            other => EngineError::Repository(other),
        }
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        EngineError::TaskJoinError(err.to_string())
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
