// ==========================================
// 配送机器人排程 - 配送计划领域模型
// ==========================================
// 红线: 计划本身不落库, 唯一持久痕迹是订单的 shipped_status
// ==========================================

use crate::domain::order::CandidateOrder;
use crate::domain::types::ShippedStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

// ==========================================
// DeliveryPlan - 配送计划
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPlan {
    pub robot_id: String,            // 机器人ID（调用方提供）
    pub orders: Vec<CandidateOrder>, // 选中订单（顺序无业务含义）
    pub total_weight: i64,           // 选中订单重量合计
    pub total_value: i64,            // 选中订单价值合计
}

impl DeliveryPlan {
    /// 空计划
    pub fn empty(robot_id: &str) -> Self {
        Self {
            robot_id: robot_id.to_string(),
            orders: Vec::new(),
            total_weight: 0,
            total_value: 0,
        }
    }

    /// 由具体订单构造计划，合计值始终按实际订单重新求和
    pub fn from_orders(robot_id: &str, orders: Vec<CandidateOrder>) -> Self {
        let total_weight = orders.iter().map(|o| o.weight).sum();
        let total_value = orders.iter().map(|o| o.value).sum();
        Self {
            robot_id: robot_id.to_string(),
            orders,
            total_weight,
            total_value,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn order_ids(&self) -> Vec<i64> {
        self.orders.iter().map(|o| o.order_id).collect()
    }

    /// 仅保留给定ID集合中的订单
    pub fn retain_ids(&self, ids: &HashSet<i64>) -> Self {
        let kept = self
            .orders
            .iter()
            .filter(|o| ids.contains(&o.order_id))
            .copied()
            .collect();
        Self::from_orders(&self.robot_id, kept)
    }
}

// ==========================================
// StatusTransition - 条件状态迁移请求
// ==========================================
// 仅当订单当前状态仍为 expected 时才迁移到 target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub order_ids: Vec<i64>,
    pub expected: ShippedStatus,
    pub target: ShippedStatus,
}

impl StatusTransition {
    /// 排程认领: shipping → delivering
    pub fn claim(order_ids: Vec<i64>) -> Self {
        Self {
            order_ids,
            expected: ShippedStatus::Shipping,
            target: ShippedStatus::Delivering,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.order_ids.is_empty()
    }
}

// ==========================================
// CommittedPlan - 一次排程调用的提交结果
// ==========================================
// computed: 优化器给出的原始选取（含计算合计）
// committed: 条件迁移实际落地的子集（合计重新求和）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedPlan {
    pub plan_id: Uuid,
    pub computed: DeliveryPlan,
    pub committed: DeliveryPlan,
}

impl CommittedPlan {
    /// 未发生写入的计划（选取结果为空）
    pub fn uncontested(plan_id: Uuid, plan: DeliveryPlan) -> Self {
        Self {
            plan_id,
            committed: plan.clone(),
            computed: plan,
        }
    }

    pub fn requested_count(&self) -> usize {
        self.computed.orders.len()
    }

    pub fn transitioned_count(&self) -> usize {
        self.committed.orders.len()
    }

    /// 被并发排程/人工操作抢先迁移的订单数
    pub fn shortfall(&self) -> usize {
        self.requested_count().saturating_sub(self.transitioned_count())
    }

    pub fn is_fully_committed(&self) -> bool {
        self.shortfall() == 0
    }
}
