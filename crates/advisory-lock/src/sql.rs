//! PostgreSQL 咨询锁语句
//!
//! 每条语句末尾追加 `-- <label>` 注释，便于在 `pg_stat_activity`
//! 和服务端日志中按锁关联。标签在 `LockKey` 构造时已去除控制字符。

use crate::connection::SqlParam;
use crate::key::LockKey;
use crate::types::{AccessMode, LockScope};

/// 一条待执行的语句及其参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    fn new(sql: String, params: Vec<SqlParam>) -> Self {
        Self { sql, params }
    }
}

fn with_comment(sql: &str, key: &LockKey) -> String {
    format!("{} -- {}", sql, key.label())
}

fn key_params(key: &LockKey) -> Vec<SqlParam> {
    vec![
        SqlParam::Int(key.class_id()),
        SqlParam::Int(key.object_id()),
    ]
}

fn lock_function(scope: LockScope, mode: AccessMode, wait: bool) -> &'static str {
    match (wait, scope, mode) {
        (false, LockScope::Session, AccessMode::Exclusive) => "pg_try_advisory_lock",
        (false, LockScope::Session, AccessMode::Share) => "pg_try_advisory_lock_shared",
        (false, LockScope::Transaction, AccessMode::Exclusive) => "pg_try_advisory_xact_lock",
        (false, LockScope::Transaction, AccessMode::Share) => "pg_try_advisory_xact_lock_shared",
        (true, LockScope::Session, AccessMode::Exclusive) => "pg_advisory_lock",
        (true, LockScope::Session, AccessMode::Share) => "pg_advisory_lock_shared",
        (true, LockScope::Transaction, AccessMode::Exclusive) => "pg_advisory_xact_lock",
        (true, LockScope::Transaction, AccessMode::Share) => "pg_advisory_xact_lock_shared",
    }
}

/// 非阻塞获取，返回 boolean
pub(crate) fn try_lock(key: &LockKey, scope: LockScope, mode: AccessMode) -> Statement {
    let sql = format!("SELECT {}($1, $2)", lock_function(scope, mode, false));
    Statement::new(with_comment(&sql, key), key_params(key))
}

/// 阻塞获取，等待上限由 `lock_timeout` 控制
pub(crate) fn blocking_lock(key: &LockKey, scope: LockScope, mode: AccessMode) -> Statement {
    let sql = format!("SELECT {}($1, $2)", lock_function(scope, mode, true));
    Statement::new(with_comment(&sql, key), key_params(key))
}

/// 释放会话级锁，返回 boolean
pub(crate) fn unlock(key: &LockKey, mode: AccessMode) -> Statement {
    let function = match mode {
        AccessMode::Exclusive => "pg_advisory_unlock",
        AccessMode::Share => "pg_advisory_unlock_shared",
    };
    let sql = format!("SELECT {}($1, $2)", function);
    Statement::new(with_comment(&sql, key), key_params(key))
}

/// 释放当前会话持有的全部会话级锁
pub(crate) fn unlock_all() -> Statement {
    Statement::new("SELECT pg_advisory_unlock_all()".to_string(), Vec::new())
}

pub(crate) fn get_lock_timeout(key: &LockKey) -> Statement {
    Statement::new(
        with_comment("SELECT pg_catalog.current_setting('lock_timeout')", key),
        Vec::new(),
    )
}

/// `is_local = true` 时只在当前事务内生效
pub(crate) fn set_lock_timeout(key: &LockKey, value: String, is_local: bool) -> Statement {
    let sql = format!(
        "SELECT pg_catalog.set_config('lock_timeout', $1, {})",
        is_local
    );
    Statement::new(with_comment(&sql, key), vec![SqlParam::Text(value)])
}

pub(crate) fn savepoint(key: &LockKey, name: &str) -> Statement {
    Statement::new(with_comment(&format!("SAVEPOINT {}", name), key), Vec::new())
}

pub(crate) fn rollback_to_savepoint(key: &LockKey, name: &str) -> Statement {
    Statement::new(
        with_comment(&format!("ROLLBACK TO SAVEPOINT {}", name), key),
        Vec::new(),
    )
}

pub(crate) fn release_savepoint(key: &LockKey, name: &str) -> Statement {
    Statement::new(
        with_comment(&format!("RELEASE SAVEPOINT {}", name), key),
        Vec::new(),
    )
}

/// 保存点名称只允许普通 SQL 标识符，因为它会直接拼接进语句
pub(crate) fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
