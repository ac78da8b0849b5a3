//! 单元测试用的内存连接
//!
//! `RecordingConnection` 按顺序记录每条语句，并按脚本依次返回结果，
//! 用于断言锁协议发出的完整语句序列。

use async_trait::async_trait;
use std::collections::VecDeque;
use thiserror::Error;

use crate::connection::{LockConnection, SqlParam, SqlValue};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FakeDbError {
    #[error("canceling statement due to lock timeout")]
    LockNotAvailable,
    #[error("server closed the connection unexpectedly")]
    ConnectionLost,
}

/// 脚本化的语句响应
#[derive(Debug, Clone)]
pub enum Reply {
    Value(SqlValue),
    Done,
    Fail(FakeDbError),
}

#[derive(Debug, Default)]
pub struct RecordingConnection {
    pub in_transaction: bool,
    pub statements: Vec<(String, Vec<SqlParam>)>,
    replies: VecDeque<Reply>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_transaction() -> Self {
        Self {
            in_transaction: true,
            ..Self::default()
        }
    }

    pub fn reply(mut self, reply: Reply) -> Self {
        self.replies.push_back(reply);
        self
    }

    /// 去掉标签注释后的语句文本
    pub fn sql(&self) -> Vec<String> {
        self.statements
            .iter()
            .map(|(sql, _)| match sql.split_once(" -- ") {
                Some((statement, _)) => statement.to_string(),
                None => sql.clone(),
            })
            .collect()
    }

    fn next_reply(&mut self, sql: &str, params: &[SqlParam]) -> Reply {
        self.statements.push((sql.to_string(), params.to_vec()));
        self.replies
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted reply for statement: {}", sql))
    }
}

#[async_trait]
impl LockConnection for RecordingConnection {
    type Error = FakeDbError;

    async fn fetch_scalar(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<SqlValue, Self::Error> {
        match self.next_reply(sql, params) {
            Reply::Value(value) => Ok(value),
            Reply::Done => Ok(SqlValue::Null),
            Reply::Fail(error) => Err(error),
        }
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<(), Self::Error> {
        match self.next_reply(sql, params) {
            Reply::Value(_) | Reply::Done => Ok(()),
            Reply::Fail(error) => Err(error),
        }
    }

    fn is_transaction_active(&self) -> bool {
        self.in_transaction
    }

    fn is_lock_unavailable(&self, error: &Self::Error) -> bool {
        matches!(error, FakeDbError::LockNotAvailable)
    }
}

pub fn yes() -> Reply {
    Reply::Value(SqlValue::Bool(true))
}

pub fn no() -> Reply {
    Reply::Value(SqlValue::Bool(false))
}

pub fn text(value: &str) -> Reply {
    Reply::Value(SqlValue::Text(value.to_string()))
}

pub fn done() -> Reply {
    Reply::Done
}

pub fn fail(error: FakeDbError) -> Reply {
    Reply::Fail(error)
}
