// ==========================================
// 配送机器人排程 - 核心库
// ==========================================
// 职责: 载重约束下的最优订单选取 + 乐观并发的状态认领
// 技术栈: Rust + SQLite + tokio
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 选取与提交
pub mod engine;

// 配置层 - 排程参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 性能统计
pub mod perf;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::{
    CandidateOrder, CommittedPlan, DeliveryPlan, Order, ShippedStatus, StatusTransition,
};

pub use engine::{DeliveryPlanCoordinator, EngineError, OrderSelector, SelectorLimits};

pub use repository::{OrderLedger, OrderRepository, RepositoryError};

pub use api::{ApiError, ApiResult, RobotApi};

pub use config::{ConfigManager, PlannerConfig};

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
