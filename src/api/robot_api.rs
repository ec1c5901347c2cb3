// ==========================================
// 配送机器人排程 - 机器人 API
// ==========================================
// 职责: 配送计划生成、订单状态更新
// 约束: 每次调用受截止时间约束; 超时/取消时不返回部分计划
// ==========================================

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, PlannerConfig};
use crate::domain::plan::CommittedPlan;
use crate::domain::types::ShippedStatus;
use crate::engine::delivery_coordinator::DeliveryPlanCoordinator;
use crate::engine::order_selector::{OrderSelector, SelectorLimits};
use crate::repository::order_ledger::OrderLedger;
use crate::repository::order_repo::OrderRepository;

// ==========================================
// RobotApi - 机器人 API
// ==========================================

/// 机器人API
///
/// 职责：
/// 1. 生成配送计划（读取快照 → 选取 → 条件认领）
/// 2. 更新订单状态（送达等）
/// 3. 截止时间与取消信号管理
pub struct RobotApi {
    coordinator: Arc<DeliveryPlanCoordinator>,
    config: PlannerConfig,
}

impl RobotApi {
    /// 创建新的RobotApi实例
    ///
    /// # 参数
    /// - ledger: 订单台账（生产环境为 OrderRepository）
    /// - config: 排程参数
    pub fn new(ledger: Arc<dyn OrderLedger>, config: PlannerConfig) -> Self {
        let selector = Arc::new(OrderSelector::with_limits(SelectorLimits::from(&config)));
        Self {
            coordinator: Arc::new(DeliveryPlanCoordinator::new(ledger, selector)),
            config,
        }
    }

    /// 基于数据库文件创建（配置取自 config_kv，订单仓储使用独立连接）
    pub fn open(db_path: &str) -> ApiResult<Self> {
        let config = ConfigManager::new(db_path)
            .and_then(|manager| manager.load_planner_config())
            .map_err(|e| ApiError::InternalError(format!("加载排程配置失败: {}", e)))?;
        let repo = OrderRepository::new(db_path)?;

        Ok(Self::new(Arc::new(repo), config))
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    // ==========================================
    // 配送计划
    // ==========================================

    /// 生成配送计划（使用配置的默认截止时间）
    pub async fn generate_delivery_plan(
        &self,
        robot_id: &str,
        capacity: i64,
    ) -> ApiResult<CommittedPlan> {
        self.generate_delivery_plan_with(
            robot_id,
            capacity,
            self.config.plan_timeout(),
            CancellationToken::new(),
        )
        .await
    }

    /// 生成配送计划（调用方指定截止时间与取消信号）
    ///
    /// 截止时间到达时取消进行中的工作（含等待写锁），并等待其在下一个取消检查点退出：
    /// - 认领写入尚未提交 → 事务回滚，返回 `DeadlineExceeded`
    /// - 认领写入已经提交 → 返回已提交的计划（写入已落地，必须汇报）
    ///
    /// 返回的 future 被提前丢弃时同样触发取消，未提交的认领随之回滚。
    ///
    /// # 错误
    /// - `ApiError::InvalidInput`: robot_id 为空、载重非法
    /// - `ApiError::Cancelled`: 调用方取消
    /// - `ApiError::DeadlineExceeded`: 超过截止时间
    /// - 数据库错误: 原样上抛，不做本地恢复
    pub async fn generate_delivery_plan_with(
        &self,
        robot_id: &str,
        capacity: i64,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> ApiResult<CommittedPlan> {
        let robot_id = robot_id.trim();
        if robot_id.is_empty() {
            return Err(ApiError::InvalidInput("机器人ID不能为空".to_string()));
        }

        let work_token = cancel.child_token();
        let _cancel_on_drop = work_token.clone().drop_guard();
        let work = self.coordinator.generate_plan(robot_id, capacity, &work_token);
        tokio::pin!(work);

        let timeout_ms = deadline.as_millis() as u64;
        tokio::select! {
            result = &mut work => result.map_err(ApiError::from),
            _ = tokio::time::sleep(deadline) => {
                work_token.cancel();
                match work.await {
                    Ok(committed) => {
                        warn!(
                            robot_id,
                            plan_id = %committed.plan_id,
                            timeout_ms,
                            "截止时间已到，但认领写入已提交，返回已提交计划"
                        );
                        Ok(committed)
                    }
                    Err(_) if cancel.is_cancelled() => Err(ApiError::Cancelled),
                    Err(e) => {
                        debug!(robot_id, timeout_ms, error = %e, "配送计划生成超时，已中止");
                        Err(ApiError::DeadlineExceeded { timeout_ms })
                    }
                }
            }
        }
    }

    // ==========================================
    // 订单状态
    // ==========================================

    /// 更新订单状态（无条件写入，不与排程竞争）
    ///
    /// # 错误
    /// - `ApiError::InvalidInput`: order_id 非法
    /// - `ApiError::NotFound`: 订单不存在
    /// - `ApiError::DeadlineExceeded`: 超过默认截止时间
    pub async fn update_order_status(
        &self,
        order_id: i64,
        new_status: ShippedStatus,
    ) -> ApiResult<()> {
        if order_id <= 0 {
            return Err(ApiError::InvalidInput(format!(
                "订单ID必须为正数: {}",
                order_id
            )));
        }

        let timeout = self.config.plan_timeout();
        match tokio::time::timeout(timeout, self.coordinator.update_status(order_id, new_status))
            .await
        {
            Ok(result) => result.map_err(ApiError::from),
            Err(_) => Err(ApiError::DeadlineExceeded {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}
