//! 咨询锁引擎
//!
//! 把一次逻辑上的加锁请求（键、作用域、访问模式、等待上限）映射为正确的
//! 数据库语句序列，并给出明确的"获得 / 未获得"结果。
//!
//! ## 分支
//!
//! - 等待上限为零：调用非阻塞的 `pg_try_*` 函数，`false` 表示锁被他人持有
//! - 事务级、有等待上限：`SET LOCAL lock_timeout`，在保存点内调用阻塞函数，
//!   超时回滚到保存点（事务保持可用）并返回 `false`
//! - 会话级、有等待上限：读取并暂存 `lock_timeout`，设置为等待上限，
//!   调用阻塞函数，无论结果如何都恢复原值
//!
//! 超时由后端通过 `LockConnection::is_lock_unavailable` 识别，
//! 其他任何错误都是真实故障，包装为 `AdvisoryLockError::Acquire` 返回。

use std::time::{Duration, Instant};

use pglock_shared::config::LockingConfig;
use pglock_shared::observability::metrics::{record_lock_acquire, record_lock_release};
use tracing::{debug, instrument, warn};

use crate::connection::{LockConnection, SqlValue};
use crate::error::{AdvisoryLockError, Result};
use crate::handle::{SessionLock, TransactionLock};
use crate::key::LockKey;
use crate::sql::{self, Statement};
use crate::timeout::TimeoutDuration;
use crate::types::{AccessMode, LockScope};

const RELEASE_ALL_LABEL: &str = "[all]";

/// 咨询锁引擎
///
/// 引擎本身无状态，可以在多个连接之间共享；所有状态都在数据库会话里。
#[derive(Debug, Clone)]
pub struct AdvisoryLocker {
    savepoint_name: String,
}

impl Default for AdvisoryLocker {
    fn default() -> Self {
        Self {
            savepoint_name: LockingConfig::default().savepoint_name,
        }
    }
}

impl AdvisoryLocker {
    /// 根据配置创建引擎，保存点名称必须是普通 SQL 标识符
    pub fn new(config: &LockingConfig) -> Result<Self> {
        if !sql::is_valid_identifier(&config.savepoint_name) {
            return Err(AdvisoryLockError::invalid_argument(
                "savepoint_name",
                format!("不是合法的 SQL 标识符: {:?}", config.savepoint_name),
            ));
        }
        Ok(Self {
            savepoint_name: config.savepoint_name.clone(),
        })
    }

    pub fn savepoint_name(&self) -> &str {
        &self.savepoint_name
    }

    /// 获取锁
    ///
    /// 锁被其他会话持有时返回 `Ok(false)`，只有真实的数据库故障才返回错误。
    /// 事务级锁要求连接上有活动事务，否则在发出任何语句之前返回
    /// `AdvisoryLockError::Precondition`。
    #[instrument(skip_all, fields(lock = %key, scope = %scope, mode = %mode, timeout = %timeout))]
    pub async fn acquire<C: LockConnection>(
        &self,
        conn: &mut C,
        key: &LockKey,
        scope: LockScope,
        timeout: TimeoutDuration,
        mode: AccessMode,
    ) -> Result<bool> {
        if scope == LockScope::Transaction && !conn.is_transaction_active() {
            return Err(AdvisoryLockError::Precondition(format!(
                "获取事务级锁需要活动事务: lock={}",
                key
            )));
        }

        let started = Instant::now();
        let outcome = if timeout.is_zero() {
            try_once(conn, key, scope, mode).await
        } else {
            match scope {
                LockScope::Transaction => self.wait_in_transaction(conn, key, timeout, mode).await,
                LockScope::Session if conn.is_transaction_active() => {
                    self.wait_session_in_transaction(conn, key, timeout, mode)
                        .await
                }
                LockScope::Session => wait_session(conn, key, timeout, mode).await,
            }
        };
        record_acquire(scope, mode, &outcome, started.elapsed());

        match &outcome {
            Ok(true) => debug!("Advisory lock acquired"),
            Ok(false) => debug!("Advisory lock not acquired, held by another session"),
            Err(e) => warn!(error = %e, "Advisory lock acquisition failed"),
        }
        outcome
    }

    /// 获取会话级锁，返回可释放的句柄
    pub async fn acquire_session_lock<C: LockConnection>(
        &self,
        conn: &mut C,
        key: &LockKey,
        timeout: TimeoutDuration,
        mode: AccessMode,
    ) -> Result<SessionLock> {
        let acquired = self
            .acquire(conn, key, LockScope::Session, timeout, mode)
            .await?;
        Ok(SessionLock::new(key.clone(), mode, acquired))
    }

    /// 获取事务级锁，返回只读句柄，生命周期由所在事务决定
    pub async fn acquire_transaction_lock<C: LockConnection>(
        &self,
        conn: &mut C,
        key: &LockKey,
        timeout: TimeoutDuration,
        mode: AccessMode,
    ) -> Result<TransactionLock> {
        let acquired = self
            .acquire(conn, key, LockScope::Transaction, timeout, mode)
            .await?;
        Ok(TransactionLock::new(key.clone(), mode, acquired))
    }

    /// 释放一次会话级锁
    ///
    /// 服务端按 (键, 模式) 维护重入计数，每次调用只减一。
    /// 锁未被当前会话持有、模式不匹配、或者是事务级锁时返回 `Ok(false)`。
    #[instrument(skip_all, fields(lock = %key, mode = %mode))]
    pub async fn release<C: LockConnection>(
        &self,
        conn: &mut C,
        key: &LockKey,
        mode: AccessMode,
    ) -> Result<bool> {
        release_lock(conn, key, mode).await
    }

    /// 释放当前会话持有的全部会话级锁，没有可释放的锁时同样成功
    #[instrument(skip_all)]
    pub async fn release_all<C: LockConnection>(&self, conn: &mut C) -> Result<()> {
        let statement = sql::unlock_all();
        conn.execute(&statement.sql, &statement.params)
            .await
            .map_err(|e| AdvisoryLockError::release(RELEASE_ALL_LABEL, e))?;
        debug!("All session-level advisory locks released");
        Ok(())
    }

    /// 事务级有等待上限的获取
    ///
    /// `lock_timeout` 在事务剩余部分内生效；阻塞调用放在保存点内，
    /// 超时只回滚这一次尝试，不会让整个事务进入 aborted 状态。
    async fn wait_in_transaction<C: LockConnection>(
        &self,
        conn: &mut C,
        key: &LockKey,
        timeout: TimeoutDuration,
        mode: AccessMode,
    ) -> Result<bool> {
        run(conn, key, sql::set_lock_timeout(key, timeout.to_setting(), true)).await?;

        let savepoint = &self.savepoint_name;
        run(conn, key, sql::savepoint(key, savepoint)).await?;

        let attempt = sql::blocking_lock(key, LockScope::Transaction, mode);
        match conn.execute(&attempt.sql, &attempt.params).await {
            Ok(()) => {
                run(conn, key, sql::release_savepoint(key, savepoint)).await?;
                Ok(true)
            }
            Err(e) if conn.is_lock_unavailable(&e) => {
                run(conn, key, sql::rollback_to_savepoint(key, savepoint)).await?;
                Ok(false)
            }
            Err(e) => {
                rollback_quietly(conn, key, savepoint).await;
                Err(AdvisoryLockError::acquire(key.label(), e))
            }
        }
    }

    /// 会话级有等待上限的获取，连接处于事务中
    ///
    /// 超时错误会让事务进入 aborted 状态，因此同样借助保存点：
    /// 回滚到保存点时 `set_config` 的修改也一并撤销。
    /// 会话级锁不随保存点回滚释放，恢复失败时需要显式解锁。
    async fn wait_session_in_transaction<C: LockConnection>(
        &self,
        conn: &mut C,
        key: &LockKey,
        timeout: TimeoutDuration,
        mode: AccessMode,
    ) -> Result<bool> {
        let savepoint = &self.savepoint_name;
        run(conn, key, sql::savepoint(key, savepoint)).await?;

        let original = match current_lock_timeout(conn, key).await {
            Ok(original) => original,
            Err(e) => {
                rollback_quietly(conn, key, savepoint).await;
                return Err(e);
            }
        };
        if let Err(e) = run(conn, key, sql::set_lock_timeout(key, timeout.to_setting(), false)).await {
            rollback_quietly(conn, key, savepoint).await;
            return Err(e);
        }

        let attempt = sql::blocking_lock(key, LockScope::Session, mode);
        match conn.execute(&attempt.sql, &attempt.params).await {
            Ok(()) => {
                let restored = match run(conn, key, sql::set_lock_timeout(key, original, false)).await {
                    Ok(()) => run(conn, key, sql::release_savepoint(key, savepoint)).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = restored {
                    rollback_quietly(conn, key, savepoint).await;
                    discard_lock(conn, key, mode).await;
                    return Err(e);
                }
                Ok(true)
            }
            Err(e) if conn.is_lock_unavailable(&e) => {
                run(conn, key, sql::rollback_to_savepoint(key, savepoint)).await?;
                Ok(false)
            }
            Err(e) => {
                rollback_quietly(conn, key, savepoint).await;
                Err(AdvisoryLockError::acquire(key.label(), e))
            }
        }
    }
}

/// 非阻塞获取一次
async fn try_once<C: LockConnection>(
    conn: &mut C,
    key: &LockKey,
    scope: LockScope,
    mode: AccessMode,
) -> Result<bool> {
    let statement = sql::try_lock(key, scope, mode);
    let value = conn
        .fetch_scalar(&statement.sql, &statement.params)
        .await
        .map_err(|e| AdvisoryLockError::acquire(key.label(), e))?;
    expect_bool(value).map_err(|message| AdvisoryLockError::acquire(key.label(), message))
}

/// 会话级有等待上限的获取，连接不在事务中
///
/// 读取、修改、恢复 `lock_timeout` 与加锁尝试连续执行，中间不穿插其他语句。
async fn wait_session<C: LockConnection>(
    conn: &mut C,
    key: &LockKey,
    timeout: TimeoutDuration,
    mode: AccessMode,
) -> Result<bool> {
    let original = current_lock_timeout(conn, key).await?;
    run(conn, key, sql::set_lock_timeout(key, timeout.to_setting(), false)).await?;

    let attempt = sql::blocking_lock(key, LockScope::Session, mode);
    let attempted = conn.execute(&attempt.sql, &attempt.params).await;
    let restored = run(conn, key, sql::set_lock_timeout(key, original, false)).await;

    match attempted {
        Ok(()) => match restored {
            Ok(()) => Ok(true),
            Err(e) => {
                discard_lock(conn, key, mode).await;
                Err(e)
            }
        },
        Err(e) if conn.is_lock_unavailable(&e) => restored.map(|()| false),
        Err(e) => Err(AdvisoryLockError::acquire(key.label(), e)),
    }
}

pub(crate) async fn release_lock<C: LockConnection>(
    conn: &mut C,
    key: &LockKey,
    mode: AccessMode,
) -> Result<bool> {
    let statement = sql::unlock(key, mode);
    let outcome = match conn.fetch_scalar(&statement.sql, &statement.params).await {
        Ok(value) => {
            expect_bool(value).map_err(|message| AdvisoryLockError::release(key.label(), message))
        }
        Err(e) => Err(AdvisoryLockError::release(key.label(), e)),
    };

    let label = match &outcome {
        Ok(true) => "released",
        Ok(false) => "not_held",
        Err(_) => "error",
    };
    record_lock_release(mode.as_str(), label);

    match &outcome {
        Ok(true) => debug!(lock = %key, mode = %mode, "Advisory lock released"),
        Ok(false) => debug!(
            lock = %key,
            mode = %mode,
            "Advisory lock was not held by this session in the requested mode"
        ),
        Err(e) => warn!(lock = %key, mode = %mode, error = %e, "Advisory lock release failed"),
    }
    outcome
}

async fn run<C: LockConnection>(conn: &mut C, key: &LockKey, statement: Statement) -> Result<()> {
    conn.execute(&statement.sql, &statement.params)
        .await
        .map_err(|e| AdvisoryLockError::acquire(key.label(), e))
}

async fn current_lock_timeout<C: LockConnection>(conn: &mut C, key: &LockKey) -> Result<String> {
    let statement = sql::get_lock_timeout(key);
    let value = conn
        .fetch_scalar(&statement.sql, &statement.params)
        .await
        .map_err(|e| AdvisoryLockError::acquire(key.label(), e))?;
    match value {
        SqlValue::Text(setting) => Ok(setting),
        other => Err(AdvisoryLockError::acquire(
            key.label(),
            format!("lock_timeout 返回了非文本值: {:?}", other),
        )),
    }
}

/// 尽力回滚到保存点，失败只记录日志，由调用方返回原始错误
async fn rollback_quietly<C: LockConnection>(conn: &mut C, key: &LockKey, savepoint: &str) {
    let statement = sql::rollback_to_savepoint(key, savepoint);
    if let Err(e) = conn.execute(&statement.sql, &statement.params).await {
        warn!(lock = %key, error = %e, "Failed to roll back to savepoint after lock attempt");
    }
}

/// 尽力释放刚获得、但无法完成收尾的锁
async fn discard_lock<C: LockConnection>(conn: &mut C, key: &LockKey, mode: AccessMode) {
    let statement = sql::unlock(key, mode);
    if let Err(e) = conn.fetch_scalar(&statement.sql, &statement.params).await {
        warn!(
            lock = %key,
            error = %e,
            "Failed to release advisory lock after lock_timeout restore failure"
        );
    }
}

fn expect_bool(value: SqlValue) -> std::result::Result<bool, String> {
    value
        .as_bool()
        .ok_or_else(|| format!("锁函数返回了非布尔值: {:?}", value))
}

fn record_acquire(scope: LockScope, mode: AccessMode, outcome: &Result<bool>, elapsed: Duration) {
    let label = match outcome {
        Ok(true) => "acquired",
        Ok(false) => "not_acquired",
        Err(_) => "error",
    };
    record_lock_acquire(scope.as_str(), mode.as_str(), label, elapsed.as_secs_f64());
}
