// ==========================================
// RobotApi 集成测试
// ==========================================
// 职责: 验证机器人 API 的输入校验、截止时间、取消与端到端流程
// ==========================================


#[cfg(test)]
mod robot_api_test {
    use async_trait::async_trait;
    use delivery_planner::api::{ApiError, RobotApi};
    use delivery_planner::config::{config_keys, PlannerConfig};
    use delivery_planner::domain::{CandidateOrder, ShippedStatus, StatusTransition};
    use delivery_planner::logging;
    use delivery_planner::repository::{OrderLedger, RepositoryError, RepositoryResult};
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;

    use crate::test_helpers::{
        count_by_status, create_test_db, seed_ready_orders, set_config, status_of,
    };

    // ==========================================
    // 测试辅助: 可控延迟的台账
    // ==========================================

    struct SlowLedger {
        fetch_delay: Duration,
        commit_delay: Duration,
        candidates: Vec<CandidateOrder>,
        transition_calls: AtomicUsize,
    }

    impl SlowLedger {
        fn new(fetch_delay: Duration, commit_delay: Duration) -> Self {
            Self {
                fetch_delay,
                commit_delay,
                candidates: vec![CandidateOrder::new(1, 2, 3), CandidateOrder::new(2, 3, 4)],
                transition_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OrderLedger for SlowLedger {
        async fn fetch_ready_candidates(
            &self,
            cancel: CancellationToken,
        ) -> RepositoryResult<Vec<CandidateOrder>> {
            tokio::time::sleep(self.fetch_delay).await;
            if cancel.is_cancelled() {
                return Err(RepositoryError::Cancelled);
            }
            Ok(self.candidates.clone())
        }

        async fn conditional_bulk_transition(
            &self,
            transition: &StatusTransition,
            _cancel: CancellationToken,
        ) -> RepositoryResult<Vec<i64>> {
            self.transition_calls.fetch_add(1, Ordering::SeqCst);
            // 模拟提交已越过最后一个取消检查点
            tokio::time::sleep(self.commit_delay).await;
            Ok(transition.order_ids.clone())
        }

        async fn update_status(
            &self,
            _order_id: i64,
            _new_status: ShippedStatus,
        ) -> RepositoryResult<()> {
            tokio::time::sleep(self.commit_delay).await;
            Ok(())
        }
    }

    // ==========================================
    // 端到端
    // ==========================================

    #[tokio::test]
    async fn test_generate_plan_end_to_end() {
        logging::init_test();
        let (_tmp, db_path) = create_test_db().unwrap();
        let ids = seed_ready_orders(&db_path, &[(2, 3), (3, 4), (4, 5), (5, 6)]).unwrap();
        let api = RobotApi::open(&db_path).unwrap();

        let result = api.generate_delivery_plan("robot-1", 5).await.unwrap();

        assert_eq!(result.computed.robot_id, "robot-1");
        assert_eq!(result.committed.order_ids(), vec![ids[0], ids[1]]);
        assert_eq!(result.committed.total_weight, 5);
        assert_eq!(result.committed.total_value, 7);
        assert!(result.is_fully_committed());

        assert_eq!(status_of(&db_path, ids[0]).unwrap(), "delivering");
        assert_eq!(status_of(&db_path, ids[1]).unwrap(), "delivering");
        assert_eq!(status_of(&db_path, ids[2]).unwrap(), "shipping");
        assert_eq!(status_of(&db_path, ids[3]).unwrap(), "shipping");
    }

    #[tokio::test]
    async fn test_nothing_fits_leaves_store_untouched() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed_ready_orders(&db_path, &[(10, 5), (12, 9)]).unwrap();
        let api = RobotApi::open(&db_path).unwrap();

        let result = api.generate_delivery_plan("robot-1", 9).await.unwrap();

        assert!(result.computed.is_empty());
        assert!(result.committed.is_empty());
        assert_eq!(result.committed.total_value, 0);
        assert_eq!(count_by_status(&db_path, "shipping").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_order_status_to_completed() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ids = seed_ready_orders(&db_path, &[(1, 1)]).unwrap();
        let api = RobotApi::open(&db_path).unwrap();

        api.generate_delivery_plan("robot-1", 1).await.unwrap();
        api.update_order_status(ids[0], ShippedStatus::Completed)
            .await
            .unwrap();

        assert_eq!(status_of(&db_path, ids[0]).unwrap(), "completed");
    }

    #[tokio::test]
    async fn test_update_unknown_order_is_not_found() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let api = RobotApi::open(&db_path).unwrap();

        let result = api.update_order_status(77, ShippedStatus::Completed).await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    // ==========================================
    // 输入校验
    // ==========================================

    #[tokio::test]
    async fn test_invalid_inputs_rejected() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed_ready_orders(&db_path, &[(1, 1)]).unwrap();
        let api = RobotApi::open(&db_path).unwrap();

        assert!(matches!(
            api.generate_delivery_plan("  ", 5).await,
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            api.generate_delivery_plan("robot-1", -1).await,
            Err(ApiError::InvalidInput(_))
        ));
        assert!(matches!(
            api.update_order_status(0, ShippedStatus::Completed).await,
            Err(ApiError::InvalidInput(_))
        ));

        // 校验失败不产生写入
        assert_eq!(count_by_status(&db_path, "shipping").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_capacity_above_configured_limit() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed_ready_orders(&db_path, &[(1, 1)]).unwrap();
        set_config(&db_path, config_keys::MAX_CAPACITY, "100").unwrap();
        let api = RobotApi::open(&db_path).unwrap();

        assert_eq!(api.config().max_capacity, 100);
        assert!(matches!(
            api.generate_delivery_plan("robot-1", 101).await,
            Err(ApiError::InvalidInput(_))
        ));
        assert!(api.generate_delivery_plan("robot-1", 100).await.is_ok());
    }

    // ==========================================
    // 截止时间与取消
    // ==========================================

    #[tokio::test]
    async fn test_deadline_before_write_returns_deadline_exceeded() {
        let ledger = Arc::new(SlowLedger::new(Duration::from_millis(300), Duration::ZERO));
        let api = RobotApi::new(ledger.clone(), PlannerConfig::default());

        let result = api
            .generate_delivery_plan_with(
                "robot-1",
                10,
                Duration::from_millis(50),
                CancellationToken::new(),
            )
            .await;

        match result {
            Err(ApiError::DeadlineExceeded { timeout_ms }) => assert_eq!(timeout_ms, 50),
            other => panic!("期望 DeadlineExceeded, 实际 {:?}", other),
        }
        assert_eq!(ledger.transition_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deadline_after_commit_reports_landed_plan() {
        logging::init_test();
        let ledger = Arc::new(SlowLedger::new(Duration::ZERO, Duration::from_millis(300)));
        let api = RobotApi::new(ledger.clone(), PlannerConfig::default());

        let result = api
            .generate_delivery_plan_with(
                "robot-1",
                10,
                Duration::from_millis(50),
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(ledger.transition_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.committed.order_ids(), vec![1, 2]);
        assert_eq!(result.committed.total_value, 7);
    }

    #[tokio::test]
    async fn test_caller_cancellation() {
        let ledger = Arc::new(SlowLedger::new(Duration::from_millis(20), Duration::ZERO));
        let api = RobotApi::new(ledger.clone(), PlannerConfig::default());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = api
            .generate_delivery_plan_with("robot-1", 10, Duration::from_secs(5), cancel)
            .await;

        assert!(matches!(result, Err(ApiError::Cancelled)));
        assert_eq!(ledger.transition_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_caller_cancellation_wins_over_deadline() {
        let ledger = Arc::new(SlowLedger::new(Duration::from_millis(300), Duration::ZERO));
        let api = RobotApi::new(ledger.clone(), PlannerConfig::default());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = api
            .generate_delivery_plan_with("robot-1", 10, Duration::from_millis(100), cancel)
            .await;

        assert!(matches!(result, Err(ApiError::Cancelled)));
        assert_eq!(ledger.transition_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_status_deadline() {
        let ledger = Arc::new(SlowLedger::new(Duration::ZERO, Duration::from_millis(300)));
        let config = PlannerConfig {
            plan_timeout_ms: 50,
            ..PlannerConfig::default()
        };
        let api = RobotApi::new(ledger, config);

        let result = api.update_order_status(1, ShippedStatus::Completed).await;

        assert!(matches!(
            result,
            Err(ApiError::DeadlineExceeded { timeout_ms: 50 })
        ));
    }

    // ==========================================
    // 写锁被占用时的截止时间与放弃调用
    // ==========================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_while_write_lock_held() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let ids = seed_ready_orders(&db_path, &[(2, 3), (3, 4)]).unwrap();
        let api = RobotApi::open(&db_path).unwrap();

        let holder = Connection::open(&db_path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE;").unwrap();

        let start = Instant::now();
        let result = api
            .generate_delivery_plan_with(
                "robot-1",
                5,
                Duration::from_millis(50),
                CancellationToken::new(),
            )
            .await;
        let elapsed = start.elapsed();

        match result {
            Err(ApiError::DeadlineExceeded { timeout_ms }) => assert_eq!(timeout_ms, 50),
            other => panic!("期望 DeadlineExceeded, 实际 {:?}", other),
        }
        // 不等待完整的等锁上限
        assert!(elapsed < Duration::from_secs(2), "elapsed={:?}", elapsed);

        holder.execute_batch("ROLLBACK;").unwrap();
        assert_eq!(status_of(&db_path, ids[0]).unwrap(), "shipping");
        assert_eq!(status_of(&db_path, ids[1]).unwrap(), "shipping");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_call_rolls_back_claim() {
        let (_tmp, db_path) = create_test_db().unwrap();
        seed_ready_orders(&db_path, &[(2, 3), (3, 4)]).unwrap();
        let api = RobotApi::open(&db_path).unwrap();

        let holder = Connection::open(&db_path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE;").unwrap();

        // 调用方在外层超时后放弃 future
        let outer = tokio::time::timeout(
            Duration::from_millis(200),
            api.generate_delivery_plan_with(
                "robot-1",
                5,
                Duration::from_secs(30),
                CancellationToken::new(),
            ),
        )
        .await;
        assert!(outer.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        holder.execute_batch("ROLLBACK;").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // 没有汇报的计划就不能留下 delivering 订单
        assert_eq!(count_by_status(&db_path, "delivering").unwrap(), 0);
        assert_eq!(count_by_status(&db_path, "shipping").unwrap(), 2);

        // 仓储连接已释放，后续排程正常
        let next = api.generate_delivery_plan("robot-2", 5).await.unwrap();
        assert_eq!(next.transitioned_count(), 2);
    }
}
