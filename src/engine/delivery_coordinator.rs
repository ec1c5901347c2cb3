// ==========================================
// 配送机器人排程 - 配送计划提交协调器
// ==========================================
// 流程: 读取待配送快照 → 选取（阻塞线程池） → 条件批量迁移 → 汇报落地数量
// ==========================================
// 红线: 协调器不实现选取逻辑; 选取器不访问存储
// 红线: 认领只通过一条带状态守卫的集合写入完成（乐观并发）
// ==========================================

use crate::domain::plan::{CommittedPlan, StatusTransition};
use crate::domain::types::ShippedStatus;
use crate::engine::error::EngineResult;
use crate::engine::order_selector::OrderSelector;
use crate::repository::order_ledger::OrderLedger;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct DeliveryPlanCoordinator {
    ledger: Arc<dyn OrderLedger>,
    selector: Arc<OrderSelector>,
}

impl DeliveryPlanCoordinator {
    pub fn new(ledger: Arc<dyn OrderLedger>, selector: Arc<OrderSelector>) -> Self {
        Self { ledger, selector }
    }

    /// 生成并提交配送计划
    ///
    /// 1) 读取全部待配送订单（不分页）
    /// 2) 选取最优子集；为空则直接返回，不产生任何写入
    /// 3) 条件迁移 shipping → delivering，仅对仍处于 shipping 的订单生效
    /// 4) 实际迁移数少于选取数属于正常竞争结果，记录告警而非报错
    ///
    /// # 错误
    /// - `EngineError::Cancelled`: 任一阶段观察到取消信号（已保证无部分写入）
    /// - `EngineError::InvalidInput`: 载重或快照数据不合法
    /// - `EngineError::Repository`: 存储失败，原样上抛
    #[instrument(skip(self, cancel), fields(plan_id = tracing::field::Empty))]
    pub async fn generate_plan(
        &self,
        robot_id: &str,
        capacity: i64,
        cancel: &CancellationToken,
    ) -> EngineResult<CommittedPlan> {
        let plan_id = Uuid::new_v4();
        tracing::Span::current().record("plan_id", tracing::field::display(plan_id));

        // 1. 快照
        let candidates = self.ledger.fetch_ready_candidates(cancel.clone()).await?;
        let snapshot_count = candidates.len();

        // 2. 选取（CPU 密集，移出异步线程）
        let selector = Arc::clone(&self.selector);
        let robot = robot_id.to_string();
        let token = cancel.clone();
        let plan = tokio::task::spawn_blocking(move || {
            selector.select(&robot, &candidates, capacity, &token)
        })
        .await??;

        if plan.is_empty() {
            info!(snapshot_count, "无可配送订单，跳过状态写入");
            return Ok(CommittedPlan::uncontested(plan_id, plan));
        }

        // 3. 条件认领
        let transition = StatusTransition::claim(plan.order_ids());
        let transitioned = self
            .ledger
            .conditional_bulk_transition(&transition, cancel.clone())
            .await?;

        let landed: HashSet<i64> = transitioned.into_iter().collect();
        let committed = plan.retain_ids(&landed);
        let result = CommittedPlan {
            plan_id,
            computed: plan,
            committed,
        };

        // 4. 汇报
        if result.is_fully_committed() {
            info!(
                snapshot_count,
                requested = result.requested_count(),
                transitioned = result.transitioned_count(),
                total_weight = result.committed.total_weight,
                total_value = result.committed.total_value,
                "已将订单状态更新为 delivering"
            );
        } else {
            warn!(
                snapshot_count,
                requested = result.requested_count(),
                transitioned = result.transitioned_count(),
                shortfall = result.shortfall(),
                computed_value = result.computed.total_value,
                committed_value = result.committed.total_value,
                "部分订单已被其他排程认领"
            );
        }

        Ok(result)
    }

    /// 无条件更新单个订单状态（送达等排程外的生命周期变更）
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: i64,
        new_status: ShippedStatus,
    ) -> EngineResult<()> {
        self.ledger.update_status(order_id, new_status).await?;
        info!("订单状态已更新");
        Ok(())
    }
}
