// ==========================================
// 配送机器人排程 - 存储耗时统计
// ==========================================
// 开关: DELIVERY_PLANNER_PERF_SQL=1/0 (debug 构建默认开启)
//       DELIVERY_PLANNER_SLOW_SQL_MS 慢 SQL 阈值 (默认 50ms)
// ==========================================

use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static SLOW_SQL_MS: AtomicU64 = AtomicU64::new(u64::MAX);

thread_local! {
    // 当前线程已执行的语句数
    static STATEMENTS: Cell<u64> = const { Cell::new(0) };
}

/// 为连接安装语句 profile 回调
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let enabled = std::env::var("DELIVERY_PLANNER_PERF_SQL")
        .map(|v| matches!(v.trim(), "1" | "true"))
        .unwrap_or(cfg!(debug_assertions));
    if !enabled {
        return;
    }

    let slow_ms = std::env::var("DELIVERY_PLANNER_SLOW_SQL_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(50);
    SLOW_SQL_MS.store(slow_ms, Ordering::Relaxed);

    conn.profile(Some(record_statement));
}

fn record_statement(sql: &str, took: Duration) {
    STATEMENTS.with(|n| n.set(n.get().saturating_add(1)));

    let ms = took.as_millis() as u64;
    if ms >= SLOW_SQL_MS.load(Ordering::Relaxed) {
        tracing::warn!(target: "slow_sql", duration_ms = ms, sql = %compact_sql(sql), "慢 SQL");
    }
}

fn compact_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn statements() -> u64 {
    STATEMENTS.with(Cell::get)
}

/// 单次存储操作的耗时与语句数，drop 时以 debug 级别输出（target: perf）
///
/// 语句计数是线程局部的，需在执行 SQL 的阻塞线程内创建。
pub struct PerfGuard {
    op: &'static str,
    start: Instant,
    statements_before: u64,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            start: Instant::now(),
            statements_before: statements(),
        }
    }

    fn statements(&self) -> u64 {
        statements().saturating_sub(self.statements_before)
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        tracing::debug!(
            target: "perf",
            op = self.op,
            elapsed_ms = self.start.elapsed().as_millis() as u64,
            statements = self.statements(),
            "存储操作完成"
        );
    }
}
