//! 等待超时
//!
//! 没有隐式默认值，也没有"无限等待"的写法：调用方必须显式给出等待上限。

use std::fmt;
use std::time::Duration;

use crate::error::{AdvisoryLockError, Result};

/// PostgreSQL `lock_timeout` 可接受的最大毫秒数
const MAX_TIMEOUT_MILLIS: u64 = i32::MAX as u64;

/// 获取锁时的最长等待时间（毫秒）
///
/// 零是特殊值：只尝试一次，不等待。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeoutDuration {
    millis: u64,
}

impl TimeoutDuration {
    /// 只尝试一次，不等待
    pub const fn zero() -> Self {
        Self { millis: 0 }
    }

    /// 以毫秒构造，负数或超过上限返回 `InvalidArgument`
    pub fn from_millis(millis: i64) -> Result<Self> {
        if millis < 0 {
            return Err(AdvisoryLockError::invalid_argument(
                "timeout",
                format!("等待时间不能为负数: {}ms", millis),
            ));
        }
        Self::checked(millis as u64)
    }

    /// 以秒构造
    pub fn from_secs(secs: i64) -> Result<Self> {
        if secs < 0 {
            return Err(AdvisoryLockError::invalid_argument(
                "timeout",
                format!("等待时间不能为负数: {}s", secs),
            ));
        }
        let millis = (secs as u64).checked_mul(1000).ok_or_else(|| {
            AdvisoryLockError::invalid_argument("timeout", format!("等待时间过长: {}s", secs))
        })?;
        Self::checked(millis)
    }

    fn checked(millis: u64) -> Result<Self> {
        if millis > MAX_TIMEOUT_MILLIS {
            return Err(AdvisoryLockError::invalid_argument(
                "timeout",
                format!(
                    "等待时间 {}ms 超过上限 {}ms",
                    millis, MAX_TIMEOUT_MILLIS
                ),
            ));
        }
        Ok(Self { millis })
    }

    pub fn as_millis(&self) -> u64 {
        self.millis
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.millis)
    }

    /// `lock_timeout` 配置值，如 `1500ms`
    pub(crate) fn to_setting(self) -> String {
        format!("{}ms", self.millis)
    }
}

impl TryFrom<Duration> for TimeoutDuration {
    type Error = AdvisoryLockError;

    /// 不足 1ms 的部分向下取整
    fn try_from(duration: Duration) -> Result<Self> {
        let millis = u64::try_from(duration.as_millis()).map_err(|_| {
            AdvisoryLockError::invalid_argument("timeout", format!("等待时间过长: {:?}", duration))
        })?;
        Self::checked(millis)
    }
}

impl fmt::Display for TimeoutDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.millis)
    }
}
