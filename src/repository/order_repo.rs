// ==========================================
// 配送机器人排程 - 订单数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 待配送快照不分页、不 LIMIT
// ==========================================
// 并发: 每个 OrderRepository 持有独立连接; 条件迁移在 IMMEDIATE 事务内
//       以单条 UPDATE ... RETURNING 完成
// ==========================================

use crate::db::{open_sqlite_connection, with_cancel_scope};
use crate::domain::order::{CandidateOrder, Order};
use crate::domain::plan::StatusTransition;
use crate::domain::types::ShippedStatus;
use crate::perf::{install_sqlite_tracing, PerfGuard};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::order_ledger::OrderLedger;
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

// ==========================================
// OrderRepository - 订单仓储
// ==========================================
pub struct OrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OrderRepository {
    /// 打开独立连接创建仓储
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let mut conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        install_sqlite_tracing(&mut conn);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(conn: &Mutex<Connection>) -> RepositoryResult<MutexGuard<'_, Connection>> {
        conn.lock().map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 在阻塞线程池中执行数据库操作，避免阻塞异步运行时
    ///
    /// 取消信号绑定到执行线程: 等锁与长语句会提前中止, 中止产生的
    /// SQLite 错误统一折叠为 `RepositoryError::Cancelled`
    async fn run_blocking<T, F>(&self, cancel: CancellationToken, op: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> RepositoryResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = Self::lock(&conn)?;
            with_cancel_scope(&cancel, || op(&mut guard)).map_err(|e| {
                if cancel.is_cancelled() {
                    debug!(error = %e, "存储操作因取消中止");
                    RepositoryError::Cancelled
                } else {
                    e
                }
            })
        })
        .await?
    }

    // ==========================================
    // 订单 CRUD
    // ==========================================

    /// 创建订单（初始状态 shipping）
    ///
    /// # 返回
    /// - `Ok(order_id)`: 新订单ID
    pub async fn create(&self, user_id: i64, product_id: i64) -> RepositoryResult<i64> {
        let now = Local::now().naive_local();

        self.run_blocking(CancellationToken::new(), move |conn| {
            conn.execute(
                r#"INSERT INTO orders (user_id, product_id, shipped_status, created_at)
                   VALUES (?1, ?2, ?3, ?4)"#,
                params![user_id, product_id, ShippedStatus::Shipping.as_str(), now],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// 按 order_id 查询订单
    ///
    /// # 返回
    /// - `Ok(Some(Order))`: 找到订单
    /// - `Ok(None)`: 未找到订单
    pub async fn find_by_id(&self, order_id: i64) -> RepositoryResult<Option<Order>> {
        self.run_blocking(CancellationToken::new(), move |conn| {
            let order = conn
                .query_row(
                    r#"SELECT order_id, user_id, product_id, shipped_status, created_at, arrived_at
                       FROM orders
                       WHERE order_id = ?1"#,
                    params![order_id],
                    Self::map_order_row,
                )
                .optional()?;
            Ok(order)
        })
        .await
    }

    fn map_order_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Order> {
        let raw_status: String = row.get(3)?;
        let shipped_status = raw_status.parse::<ShippedStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into())
        })?;

        Ok(Order {
            order_id: row.get(0)?,
            user_id: row.get(1)?,
            product_id: row.get(2)?,
            shipped_status,
            created_at: row.get::<_, NaiveDateTime>(4)?,
            arrived_at: row.get::<_, Option<NaiveDateTime>>(5)?,
        })
    }
}

// ==========================================
// OrderLedger Trait 实现
// ==========================================
#[async_trait]
impl OrderLedger for OrderRepository {
    async fn fetch_ready_candidates(
        &self,
        cancel: CancellationToken,
    ) -> RepositoryResult<Vec<CandidateOrder>> {
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }

        let candidates = self
            .run_blocking(cancel.clone(), |conn| {
                let _perf = PerfGuard::new("order_repo.fetch_ready_candidates");
                let mut stmt = conn.prepare_cached(
                    r#"SELECT o.order_id, p.weight, p.value
                       FROM orders o
                       JOIN products p ON o.product_id = p.product_id
                       WHERE o.shipped_status = ?1
                       ORDER BY o.order_id"#,
                )?;

                let rows = stmt
                    .query_map(params![ShippedStatus::Shipping.as_str()], |row| {
                        Ok(CandidateOrder {
                            order_id: row.get(0)?,
                            weight: row.get(1)?,
                            value: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(rows)
            })
            .await?;

        // 读取期间被取消: 丢弃快照
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }

        debug!(count = candidates.len(), "读取待配送订单快照");
        Ok(candidates)
    }

    async fn conditional_bulk_transition(
        &self,
        transition: &StatusTransition,
        cancel: CancellationToken,
    ) -> RepositoryResult<Vec<i64>> {
        if transition.is_empty() {
            return Ok(Vec::new());
        }
        if transition.expected == transition.target {
            return Err(RepositoryError::ValidationError(format!(
                "状态迁移前后状态相同: {}",
                transition.expected
            )));
        }
        if cancel.is_cancelled() {
            return Err(RepositoryError::Cancelled);
        }

        let ids_json = serde_json::to_string(&transition.order_ids)
            .map_err(|e| RepositoryError::Other(e.into()))?;
        let expected = transition.expected.as_str();
        let target = transition.target.as_str();

        self.run_blocking(cancel.clone(), move |conn| {
            let _perf = PerfGuard::new("order_repo.conditional_bulk_transition");

            // IMMEDIATE: 开始即获取写锁, 未提交前 drop 即回滚
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if cancel.is_cancelled() {
                return Err(RepositoryError::Cancelled);
            }

            let transitioned = {
                let mut stmt = tx.prepare(
                    r#"UPDATE orders
                       SET shipped_status = ?1
                       WHERE shipped_status = ?2
                         AND order_id IN (SELECT value FROM json_each(?3))
                       RETURNING order_id"#,
                )?;
                let rows = stmt
                    .query_map(params![target, expected, ids_json], |row| row.get::<_, i64>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            if cancel.is_cancelled() {
                return Err(RepositoryError::Cancelled);
            }
            tx.commit()
                .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

            Ok(transitioned)
        })
        .await
    }

    async fn update_status(
        &self,
        order_id: i64,
        new_status: ShippedStatus,
    ) -> RepositoryResult<()> {
        let now = Local::now().naive_local();

        let affected = self
            .run_blocking(CancellationToken::new(), move |conn| {
                // 送达时记录 arrived_at, 其他状态保持原值
                let affected = conn.execute(
                    r#"UPDATE orders
                       SET shipped_status = ?1,
                           arrived_at = CASE WHEN ?1 = 'completed' THEN ?2 ELSE arrived_at END
                       WHERE order_id = ?3"#,
                    params![new_status.as_str(), now, order_id],
                )?;
                Ok(affected)
            })
            .await?;

        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Order".to_string(),
                id: order_id.to_string(),
            });
        }

        Ok(())
    }
}
