// ==========================================
// 配送机器人排程 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换引擎/仓储错误为调用方可理解的错误消息
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 取消与超时
    // ==========================================
    #[error("操作已取消")]
    Cancelled,

    #[error("操作超时: timeout_ms={timeout_ms}")]
    DeadlineExceeded { timeout_ms: u64 },

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::Cancelled => ApiError::Cancelled,
            RepositoryError::TaskJoinError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            EngineError::Cancelled => ApiError::Cancelled,
            EngineError::Repository(err) => err.into(),
            EngineError::TaskJoinError(msg) => ApiError::InternalError(msg),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
