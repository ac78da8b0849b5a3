//! 锁内执行
//!
//! 获取会话级锁，执行一次调用方的操作，然后确定性地释放。
//!
//! | 操作结果 | 释放结果 | 最终结果 |
//! |---|---|---|
//! | 成功 | 成功 | 操作的返回值 |
//! | 成功 | 失败 | `AdvisoryLockError::Release`，返回值被丢弃 |
//! | 失败 | 成功 / 未释放 | 原始错误 |
//! | 失败 | 失败 | 原始错误，释放错误被完全丢弃 |
//!
//! 这里不记录被丢弃的释放错误；需要可见性的调用方应使用
//! `acquire_session_lock` 与 `SessionLock::release` 手动管理。

use futures::future::BoxFuture;

use crate::connection::LockConnection;
use crate::engine::AdvisoryLocker;
use crate::error::AdvisoryLockError;
use crate::handle::SessionLock;
use crate::key::LockKey;
use crate::timeout::TimeoutDuration;
use crate::types::AccessMode;

impl AdvisoryLocker {
    /// 在会话级锁内执行操作
    ///
    /// 无论是否获得锁，操作都会收到句柄并恰好执行一次，
    /// 是否把"未获得"当作失败由调用方决定。
    /// 只有 `was_acquired()` 为 true 时才会释放，避免减掉其他持有者的重入计数。
    ///
    /// ```ignore
    /// let total = locker
    ///     .within_session_lock(&mut conn, &key, timeout, AccessMode::Exclusive, |conn, lock| {
    ///         Box::pin(async move {
    ///             if !lock.was_acquired() {
    ///                 return Ok(0);
    ///             }
    ///             let total: i64 = sqlx::query_scalar("SELECT count(*) FROM jobs")
    ///                 .fetch_one(&mut *conn)
    ///                 .await?;
    ///             Ok(total)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn within_session_lock<C, F, T, E>(
        &self,
        conn: &mut C,
        key: &LockKey,
        timeout: TimeoutDuration,
        mode: AccessMode,
        operation: F,
    ) -> Result<T, E>
    where
        C: LockConnection,
        F: for<'c> FnOnce(&'c mut C, &'c SessionLock) -> BoxFuture<'c, Result<T, E>>,
        E: From<AdvisoryLockError>,
    {
        let mut lock = self.acquire_session_lock(conn, key, timeout, mode).await?;

        let outcome = operation(conn, &lock).await;
        if !lock.was_acquired() {
            return outcome;
        }

        let released = lock.release(conn).await;
        match (outcome, released) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(release_error)) => Err(release_error.into()),
            (Err(operation_error), _) => Err(operation_error),
        }
    }
}
