//! 咨询锁错误类型
//!
//! 锁竞争（锁被其他会话持有）永远不是错误，而是 `false` 返回值；
//! 这里只定义真正的失败：参数非法、调用方前置条件违规、数据库故障。

use thiserror::Error;

/// 底层驱动错误的统一装箱形式
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 咨询锁错误类型
#[derive(Debug, Error)]
pub enum AdvisoryLockError {
    /// 构造阶段的参数校验失败（越界 id、负数超时、空的键组成部分等）
    #[error("无效的参数: {field} - {message}")]
    InvalidArgument { field: String, message: String },

    /// 调用方违反前置条件，例如没有活动事务时获取事务级锁
    #[error("前置条件不满足: {0}")]
    Precondition(String),

    /// 获取锁时发生的数据库故障（连接断开、SQL 错误、未分类的服务端错误）
    #[error("获取锁失败: lock={label}: {source}")]
    Acquire {
        label: String,
        #[source]
        source: BoxError,
    },

    /// 释放锁时发生的数据库故障
    #[error("释放锁失败: lock={label}: {source}")]
    Release {
        label: String,
        #[source]
        source: BoxError,
    },
}

/// 咨询锁 Result 类型别名
pub type Result<T> = std::result::Result<T, AdvisoryLockError>;

impl AdvisoryLockError {
    pub(crate) fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn acquire(label: &str, source: impl Into<BoxError>) -> Self {
        Self::Acquire {
            label: label.to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn release(label: &str, source: impl Into<BoxError>) -> Self {
        Self::Release {
            label: label.to_string(),
            source: source.into(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Precondition(_) => "PRECONDITION_FAILED",
            Self::Acquire { .. } => "LOCK_ACQUIRE_FAILED",
            Self::Release { .. } => "LOCK_RELEASE_FAILED",
        }
    }

    /// 是否为参数校验错误
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// 是否由数据库故障引起（可能值得重试）
    pub fn is_database_failure(&self) -> bool {
        matches!(self, Self::Acquire { .. } | Self::Release { .. })
    }
}
