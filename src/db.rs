// ==========================================
// 配送机器人排程 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - WAL: 快照读取与条件写入互不阻塞
// - 等锁期间可被取消: busy handler 读取当前线程的取消信号
// ==========================================

use rusqlite::Connection;
use std::cell::RefCell;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 默认等锁上限（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// busy handler 每次重试前的休眠（毫秒）
const BUSY_RETRY_STEP_MS: u64 = 10;

thread_local! {
    static CANCEL_SCOPE: RefCell<Option<CancellationToken>> = const { RefCell::new(None) };
}

/// 在当前线程上绑定取消信号后执行 `op`
///
/// 期间该线程上的 SQLite 等锁与长语句都会观察此信号；退出时恢复外层绑定。
pub fn with_cancel_scope<T>(cancel: &CancellationToken, op: impl FnOnce() -> T) -> T {
    struct Restore(Option<CancellationToken>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            CANCEL_SCOPE.with(|scope| *scope.borrow_mut() = previous);
        }
    }

    let previous = CANCEL_SCOPE.with(|scope| scope.borrow_mut().replace(cancel.clone()));
    let _restore = Restore(previous);
    op()
}

/// 当前线程绑定的取消信号是否已触发
pub fn scope_cancelled() -> bool {
    CANCEL_SCOPE.with(|scope| {
        scope
            .borrow()
            .as_ref()
            .map_or(false, CancellationToken::is_cancelled)
    })
}

fn cancellable_busy_wait(attempt: i32) -> bool {
    if scope_cancelled() {
        return false;
    }
    let waited_ms = u64::try_from(attempt).unwrap_or(0) * BUSY_RETRY_STEP_MS;
    if waited_ms >= DEFAULT_BUSY_TIMEOUT_MS {
        return false;
    }
    std::thread::sleep(Duration::from_millis(BUSY_RETRY_STEP_MS));
    true
}

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy handler 需要“每个连接”单独安装（替代 busy_timeout）
/// - journal_mode=WAL 是数据库级持久设置，重复执行幂等（内存库会保持 memory）
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_handler(Some(cancellable_busy_wait))?;
    // 长语句每执行约 1000 条虚拟机指令检查一次取消信号
    conn.progress_handler(1_000, Some(scope_cancelled));
    let _mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}
