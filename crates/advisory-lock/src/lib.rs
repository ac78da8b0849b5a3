//! PostgreSQL 咨询锁
//!
//! 以数据库会话 / 事务状态为协调介质，提供应用级互斥。
//! 真正的互斥由数据库服务端保证，这里负责正确地驱动它，
//! 并且永远如实报告是否获得了锁。
//!
//! ## 核心约定
//!
//! - **竞争不是错误**：锁被其他会话持有时返回 `false` / `was_acquired() == false`
//! - **故障才是错误**：连接断开、SQL 错误等包装为 `AdvisoryLockError` 返回
//! - **没有默认等待**：每次获取都要显式给出 `TimeoutDuration`，零表示只尝试一次
//!
//! ## 模块结构
//!
//! - `key`: 锁键派生与校验
//! - `timeout`: 等待上限
//! - `types`: 作用域与访问模式
//! - `connection`: 连接适配器契约
//! - `postgres`: sqlx 适配器
//! - `engine`: 获取 / 释放协议
//! - `handle`: 会话级与事务级句柄
//! - `scoped`: 锁内执行
//!
//! ## 使用示例
//!
//! ```ignore
//! let locker = AdvisoryLocker::default();
//! let key = LockKey::derive("user", "4")?;
//!
//! let mut lock = locker
//!     .acquire_session_lock(&mut *conn, &key, TimeoutDuration::from_secs(5)?, AccessMode::Exclusive)
//!     .await?;
//! if lock.was_acquired() {
//!     do_critical_work(&mut *conn).await?;
//!     lock.release(&mut *conn).await?;
//! }
//! ```

pub mod connection;
pub mod engine;
pub mod error;
pub mod handle;
pub mod key;
pub mod postgres;
mod scoped;
mod sql;
pub mod timeout;
pub mod types;

#[cfg(test)]
mod testing;

pub use connection::{LockConnection, SqlParam, SqlValue};
pub use engine::AdvisoryLocker;
pub use error::{AdvisoryLockError, Result};
pub use handle::{SessionLock, TransactionLock};
pub use key::LockKey;
pub use timeout::TimeoutDuration;
pub use types::{AccessMode, LockScope};
