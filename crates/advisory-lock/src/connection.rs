//! 连接适配器契约
//!
//! 锁引擎只依赖这里定义的最小能力集合，每种数据库后端各自实现一次。
//! 其中 `is_lock_unavailable` 是"正常竞争"与"真实故障"之间的分界线，
//! 必须基于后端原生的错误码实现。

use async_trait::async_trait;

/// 位置参数（`$1`, `$2`, ...）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Int(i32),
    Text(String),
}

/// 标量查询结果（首行首列）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Null,
}

impl SqlValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

/// 锁引擎所需的连接能力
///
/// 一个连接同一时间只服务一个逻辑调用方，不支持跨线程并发使用同一连接。
#[cfg_attr(test, mockall::automock(type Error = crate::testing::FakeDbError;))]
#[async_trait]
pub trait LockConnection: Send {
    /// 后端原生错误类型，原样向上传递，不做包装
    type Error: std::error::Error + Send + Sync + 'static;

    /// 执行参数化查询，返回首行首列
    async fn fetch_scalar(&mut self, sql: &str, params: &[SqlParam])
    -> Result<SqlValue, Self::Error>;

    /// 执行参数化语句，忽略结果
    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<(), Self::Error>;

    /// 当前连接上是否有活动事务
    fn is_transaction_active(&self) -> bool;

    /// 错误是否表示"在等待上限内未能获得锁"
    fn is_lock_unavailable(&self, error: &Self::Error) -> bool;
}
