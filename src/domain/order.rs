// ==========================================
// 配送机器人排程 - 订单领域模型
// ==========================================

use crate::domain::types::ShippedStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Order - 订单（orders 表的一行）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: i64,                     // 订单ID
    pub user_id: i64,                      // 下单用户
    pub product_id: i64,                   // 商品（重量/价值来源）
    pub shipped_status: ShippedStatus,     // 配送状态
    pub created_at: NaiveDateTime,         // 创建时间
    pub arrived_at: Option<NaiveDateTime>, // 送达时间
}

// ==========================================
// CandidateOrder - 候选订单
// ==========================================
// 红线: 每次排程调用时从仓储重新读取, 调用结束即丢弃
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateOrder {
    pub order_id: i64,
    pub weight: i64,
    pub value: i64,
}

impl CandidateOrder {
    pub fn new(order_id: i64, weight: i64, value: i64) -> Self {
        Self {
            order_id,
            weight,
            value,
        }
    }
}
