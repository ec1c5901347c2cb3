// ==========================================
// 配送机器人排程 - 订单选取引擎
// ==========================================
// 问题: 0/1 背包: 总重量 ≤ 载重, 总价值最大
// 输入: 候选订单快照 + 载重
// 输出: DeliveryPlan（精确最优解）
// ==========================================
// 红线: 纯计算, 不访问存储; 取消时不返回部分结果
// ==========================================

use crate::config::PlannerConfig;
use crate::domain::order::CandidateOrder;
use crate::domain::plan::DeliveryPlan;
use crate::engine::error::{EngineError, EngineResult};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

// ==========================================
// SelectorLimits - 运算规模上限
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorLimits {
    pub max_capacity: i64,
    pub max_table_cells: u64,
    pub cancel_check_interval: usize,
}

impl Default for SelectorLimits {
    fn default() -> Self {
        Self::from(&PlannerConfig::default())
    }
}

impl From<&PlannerConfig> for SelectorLimits {
    fn from(config: &PlannerConfig) -> Self {
        Self {
            max_capacity: config.max_capacity,
            max_table_cells: config.max_table_cells,
            cancel_check_interval: config.cancel_check_interval.max(1),
        }
    }
}

// ==========================================
// TakenTable - 选取标记表
// ==========================================
// took(i, c) 按行优先存放在连续位图中
struct TakenTable {
    width: usize,
    bits: Vec<u64>,
}

impl TakenTable {
    fn new(rows: usize, width: usize) -> Self {
        let cells = rows * width;
        Self {
            width,
            bits: vec![0; (cells + 63) / 64],
        }
    }

    fn set(&mut self, row: usize, col: usize) {
        let idx = row * self.width + col;
        self.bits[idx / 64] |= 1u64 << (idx % 64);
    }

    fn get(&self, row: usize, col: usize) -> bool {
        let idx = row * self.width + col;
        self.bits[idx / 64] & (1u64 << (idx % 64)) != 0
    }
}

// ==========================================
// OrderSelector - 订单选取引擎
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct OrderSelector {
    limits: SelectorLimits,
}

impl OrderSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: SelectorLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &SelectorLimits {
        &self.limits
    }

    /// 选取订单
    ///
    /// 规则：
    /// 1) 校验: 载重/重量/价值非负, 订单ID不重复, 载重不超上限
    /// 2) 预过滤: 重量 ≤ 0、价值 ≤ 0、重量 > 载重 的订单不可能进入最优解
    /// 3) 快速路径: 剩余订单总重 ≤ 载重时全部选取
    /// 4) 一般情况: 动态规划求精确最优, 平局时不选（保证同输入同输出）
    ///
    /// # 错误
    /// - `EngineError::InvalidInput`: 输入不合法或 DP 规模超限
    /// - `EngineError::Cancelled`: DP 期间观察到取消信号
    #[instrument(skip(self, candidates, cancel), fields(candidates_count = candidates.len()))]
    pub fn select(
        &self,
        robot_id: &str,
        candidates: &[CandidateOrder],
        capacity: i64,
        cancel: &CancellationToken,
    ) -> EngineResult<DeliveryPlan> {
        self.validate(candidates, capacity)?;

        let eligible = Self::prefilter(candidates, capacity);
        debug!(
            eligible_count = eligible.len(),
            filtered_out = candidates.len() - eligible.len(),
            "预过滤完成"
        );

        if eligible.is_empty() || capacity == 0 {
            return Ok(DeliveryPlan::empty(robot_id));
        }

        let total_weight = eligible
            .iter()
            .fold(0i64, |acc, o| acc.saturating_add(o.weight));
        if total_weight <= capacity {
            debug!(total_weight, "全部候选可装载，走快速路径");
            return Ok(DeliveryPlan::from_orders(robot_id, eligible));
        }

        let selected = self.solve(&eligible, capacity, cancel)?;
        let plan = DeliveryPlan::from_orders(robot_id, selected);
        debug!(
            selected_count = plan.orders.len(),
            total_weight = plan.total_weight,
            total_value = plan.total_value,
            "选取完成"
        );
        Ok(plan)
    }

    fn validate(&self, candidates: &[CandidateOrder], capacity: i64) -> EngineResult<()> {
        if capacity < 0 {
            return Err(EngineError::InvalidInput(format!(
                "载重不能为负数: {}",
                capacity
            )));
        }
        if capacity > self.limits.max_capacity {
            return Err(EngineError::InvalidInput(format!(
                "载重超过上限: capacity={}, max_capacity={}",
                capacity, self.limits.max_capacity
            )));
        }

        let mut seen = HashSet::with_capacity(candidates.len());
        let mut value_sum: i64 = 0;
        for order in candidates {
            if order.weight < 0 || order.value < 0 {
                return Err(EngineError::InvalidInput(format!(
                    "订单重量/价值不能为负数: order_id={}, weight={}, value={}",
                    order.order_id, order.weight, order.value
                )));
            }
            if !seen.insert(order.order_id) {
                return Err(EngineError::InvalidInput(format!(
                    "候选订单重复: order_id={}",
                    order.order_id
                )));
            }
            value_sum = value_sum.checked_add(order.value).ok_or_else(|| {
                EngineError::InvalidInput("候选订单价值合计溢出".to_string())
            })?;
        }

        Ok(())
    }

    fn prefilter(candidates: &[CandidateOrder], capacity: i64) -> Vec<CandidateOrder> {
        candidates
            .iter()
            .filter(|o| o.weight > 0 && o.value > 0 && o.weight <= capacity)
            .copied()
            .collect()
    }

    /// 动态规划 + 回溯
    ///
    /// best[c] 滚动保存 best(i, c); took(i, c) 仅在严格更优时置位。
    /// 容量从大到小遍历，保证 best[c - w] 仍是上一行的值。
    fn solve(
        &self,
        items: &[CandidateOrder],
        capacity: i64,
        cancel: &CancellationToken,
    ) -> EngineResult<Vec<CandidateOrder>> {
        let cap = usize::try_from(capacity)
            .map_err(|_| EngineError::InvalidInput(format!("载重无效: {}", capacity)))?;
        let width = cap + 1;
        let rows = items.len();

        let cells = (rows as u64).checked_mul(width as u64);
        match cells {
            Some(cells) if cells <= self.limits.max_table_cells => {}
            _ => {
                return Err(EngineError::InvalidInput(format!(
                    "DP 规模超限: orders={}, capacity={}, max_table_cells={}",
                    rows, capacity, self.limits.max_table_cells
                )));
            }
        }

        let interval = self.limits.cancel_check_interval.max(1);
        let mut best = vec![0i64; width];
        let mut took = TakenTable::new(rows, width);

        for (i, item) in items.iter().enumerate() {
            if i % interval == 0 && cancel.is_cancelled() {
                debug!(processed = i, total = rows, "DP 期间收到取消信号");
                return Err(EngineError::Cancelled);
            }

            let w = item.weight as usize;
            for c in (w..=cap).rev() {
                let with_item = best[c - w] + item.value;
                if with_item > best[c] {
                    best[c] = with_item;
                    took.set(i, c);
                }
            }
        }

        // 回溯
        let mut selected = Vec::new();
        let mut cursor = cap;
        for i in (0..rows).rev() {
            if cursor == 0 {
                break;
            }
            if took.get(i, cursor) {
                selected.push(items[i]);
                cursor -= items[i].weight as usize;
            }
        }
        selected.reverse();

        debug_assert_eq!(
            selected.iter().map(|o| o.value).sum::<i64>(),
            best[cap],
            "回溯结果与 DP 最优值不一致"
        );

        Ok(selected)
    }
}
