// ==========================================
// 配送机器人排程 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod order;
pub mod plan;
pub mod types;

// 重导出核心类型
pub use order::{CandidateOrder, Order};
pub use plan::{CommittedPlan, DeliveryPlan, StatusTransition};
pub use types::ShippedStatus;
