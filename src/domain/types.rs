// ==========================================
// 配送机器人排程 - 领域类型定义
// ==========================================
// 订单配送状态: shipping(待配送) → delivering(配送中) → completed(已送达)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 配送状态 (Shipped Status)
// ==========================================
// 序列化格式: lowercase (与数据库 orders.shipped_status 一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShippedStatus {
    Shipping,   // 待配送（可被排程选中）
    Delivering, // 配送中（已被某台机器人认领）
    Completed,  // 已送达
}

impl ShippedStatus {
    /// 数据库存储值
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippedStatus::Shipping => "shipping",
            ShippedStatus::Delivering => "delivering",
            ShippedStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ShippedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ShippedStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shipping" => Ok(ShippedStatus::Shipping),
            "delivering" => Ok(ShippedStatus::Delivering),
            "completed" => Ok(ShippedStatus::Completed),
            other => Err(format!("未知的配送状态: {}", other)),
        }
    }
}
