// ==========================================
// 配送机器人排程 - 订单台账 Repository Trait
// ==========================================
// 职责: 定义排程所需的订单数据访问接口（不包含业务逻辑）
// 实现者: OrderRepository（使用 rusqlite）; 测试中可用内存实现替换
// ==========================================

use crate::domain::order::CandidateOrder;
use crate::domain::plan::StatusTransition;
use crate::domain::types::ShippedStatus;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// 读取全部待配送（shipping）订单的快照
    ///
    /// # 红线
    /// 不允许分页或 LIMIT：选取结果只有在看到完整待配送集合时才是最优
    ///
    /// # 返回
    /// - Ok(Vec<CandidateOrder>): 订单ID + 商品重量 + 商品价值
    /// - Err(RepositoryError::Cancelled): 读取前/后观察到取消信号
    async fn fetch_ready_candidates(
        &self,
        cancel: CancellationToken,
    ) -> RepositoryResult<Vec<CandidateOrder>>;

    /// 条件批量状态迁移（乐观并发控制）
    ///
    /// 单条集合语句: 仅迁移当前状态仍等于 `transition.expected` 的订单，
    /// 整体在一个事务内完成，要么全部落地要么全部不存在。
    ///
    /// # 返回
    /// - Ok(Vec<i64>): 实际完成迁移的订单ID（可能少于请求数）
    /// - Err(RepositoryError::Cancelled): 提交前观察到取消信号，事务已回滚
    async fn conditional_bulk_transition(
        &self,
        transition: &StatusTransition,
        cancel: CancellationToken,
    ) -> RepositoryResult<Vec<i64>>;

    /// 无条件更新单个订单状态（排程之外的生命周期变更，如送达）
    ///
    /// # 错误
    /// - `RepositoryError::NotFound`: order_id 不存在
    async fn update_status(&self, order_id: i64, new_status: ShippedStatus) -> RepositoryResult<()>;
}
