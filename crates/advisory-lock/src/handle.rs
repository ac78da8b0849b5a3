//! 锁句柄
//!
//! 句柄在获取时创建，`was_acquired` 一经确定不再变化。

use tracing::{debug, warn};

use crate::connection::LockConnection;
use crate::engine;
use crate::error::Result;
use crate::key::LockKey;
use crate::types::AccessMode;

/// 会话级锁句柄
///
/// 持有到显式释放或连接断开。Drop 中无法执行异步语句，
/// 因此已获得但未释放的句柄被 drop 时只记录警告，锁仍由会话持有。
#[derive(Debug)]
pub struct SessionLock {
    key: LockKey,
    mode: AccessMode,
    acquired: bool,
    /// 只在服务端确认释放后置为 true
    released: bool,
}

impl SessionLock {
    pub(crate) fn new(key: LockKey, mode: AccessMode, acquired: bool) -> Self {
        Self {
            key,
            mode,
            acquired,
            released: false,
        }
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn was_acquired(&self) -> bool {
        self.acquired
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// 释放锁
    ///
    /// 幂等：未获得或已释放时不发出任何语句，直接返回 `Ok(false)`。
    pub async fn release<C: LockConnection>(&mut self, conn: &mut C) -> Result<bool> {
        if !self.acquired || self.released {
            debug!(lock = %self.key, "Skipping release of a lock that is not held");
            return Ok(false);
        }

        let released = engine::release_lock(conn, &self.key, self.mode).await?;
        if released {
            self.released = true;
        }
        Ok(released)
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if self.acquired && !self.released {
            warn!(
                lock = %self.key,
                mode = %self.mode,
                "SessionLock dropped without confirmed release - lock stays held until the session ends"
            );
        }
    }
}

/// 事务级锁句柄
///
/// 没有释放操作，所在事务结束时由数据库自动释放。
#[derive(Debug, Clone)]
pub struct TransactionLock {
    key: LockKey,
    mode: AccessMode,
    acquired: bool,
}

impl TransactionLock {
    pub(crate) fn new(key: LockKey, mode: AccessMode, acquired: bool) -> Self {
        Self {
            key,
            mode,
            acquired,
        }
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn was_acquired(&self) -> bool {
        self.acquired
    }
}
