// ==========================================
// 配送机器人排程 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope, 仅使用 global)
// ==========================================

use crate::db::open_sqlite_connection;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==========================================
// PlannerConfig - 排程参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// 单次排程/状态更新的默认截止时间（毫秒）
    pub plan_timeout_ms: u64,
    /// DP 每处理多少个订单检查一次取消信号
    pub cancel_check_interval: usize,
    /// 可接受的最大载重
    pub max_capacity: i64,
    /// DP 表最大单元数 n × (capacity + 1)
    pub max_table_cells: u64,
}

impl PlannerConfig {
    pub fn plan_timeout(&self) -> Duration {
        Duration::from_millis(self.plan_timeout_ms)
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            plan_timeout_ms: 5_000,
            cancel_check_interval: 256,
            max_capacity: 1_000_000,
            max_table_cells: 1 << 32,
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;

        Ok(())
    }

    /// 读取并解析配置值；缺失或格式错误时使用默认值
    fn get_parsed_or<T>(&self, key: &str, default: T) -> Result<T, Box<dyn Error>>
    where
        T: FromStr + Copy,
    {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };

        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    "配置格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 加载排程参数
    ///
    /// 非正数的间隔/上限视为配置错误，回退默认值
    pub fn load_planner_config(&self) -> Result<PlannerConfig, Box<dyn Error>> {
        let defaults = PlannerConfig::default();

        let plan_timeout_ms =
            self.get_parsed_or(config_keys::PLAN_TIMEOUT_MS, defaults.plan_timeout_ms)?;
        let cancel_check_interval = self.get_parsed_or(
            config_keys::CANCEL_CHECK_INTERVAL,
            defaults.cancel_check_interval,
        )?;
        let max_capacity = self.get_parsed_or(config_keys::MAX_CAPACITY, defaults.max_capacity)?;
        let max_table_cells =
            self.get_parsed_or(config_keys::MAX_TABLE_CELLS, defaults.max_table_cells)?;

        Ok(PlannerConfig {
            plan_timeout_ms: if plan_timeout_ms == 0 {
                defaults.plan_timeout_ms
            } else {
                plan_timeout_ms
            },
            cancel_check_interval: cancel_check_interval.max(1),
            max_capacity: if max_capacity < 0 {
                defaults.max_capacity
            } else {
                max_capacity
            },
            max_table_cells: if max_table_cells == 0 {
                defaults.max_table_cells
            } else {
                max_table_cells
            },
        })
    }
}

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    // 截止时间
    pub const PLAN_TIMEOUT_MS: &str = "robot.plan_timeout_ms";

    // DP 取消检查
    pub const CANCEL_CHECK_INTERVAL: &str = "robot.cancel_check_interval";

    // 运算规模上限
    pub const MAX_CAPACITY: &str = "robot.max_capacity";
    pub const MAX_TABLE_CELLS: &str = "robot.max_table_cells";
}
