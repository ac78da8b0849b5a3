//! 锁作用域与访问模式

use serde::{Deserialize, Serialize};
use std::fmt;

/// 锁作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockScope {
    /// 持续到显式释放或连接断开
    Session,
    /// 事务结束（提交、回滚、连接丢失）时自动释放，不能显式释放
    Transaction,
}

impl LockScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Transaction => "transaction",
        }
    }
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 访问模式
///
/// 释放时必须使用与获取时相同的模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessMode {
    /// 至多一个持有者
    Exclusive,
    /// 允许多个共享持有者，与排他持有者互斥
    Share,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exclusive => "exclusive",
            Self::Share => "share",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_representation() {
        assert_eq!(
            serde_json::to_string(&LockScope::Transaction).unwrap(),
            "\"TRANSACTION\""
        );
        let mode: AccessMode = serde_json::from_str("\"SHARE\"").unwrap();
        assert_eq!(mode, AccessMode::Share);
    }

    #[test]
    fn test_display() {
        assert_eq!(LockScope::Session.to_string(), "session");
        assert_eq!(AccessMode::Exclusive.to_string(), "exclusive");
    }
}
