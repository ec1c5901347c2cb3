// ==========================================
// 配送机器人排程 - 引擎层
// ==========================================
// 职责: 订单选取 + 计划提交协调, 不拼 SQL
// ==========================================

pub mod delivery_coordinator;
pub mod error;
pub mod order_selector;

// 重导出核心引擎
pub use delivery_coordinator::DeliveryPlanCoordinator;
pub use error::{EngineError, EngineResult};
pub use order_selector::{OrderSelector, SelectorLimits};
