// ==========================================
// 配送机器人排程 - 配置层
// ==========================================
// 职责: 排程参数管理,支持数据库覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, PlannerConfig};
