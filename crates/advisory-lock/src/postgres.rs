//! PostgreSQL 连接适配器（sqlx）
//!
//! - `PgConnection`：按连接上报告的事务状态判断，`&mut *tx` 传入时同样视为处于事务中
//! - `Transaction<'_, Postgres>`：始终处于事务中
//!
//! `lock_timeout` 到期时 PostgreSQL 报告 SQLSTATE `55P03`（lock_not_available），
//! 这是唯一被识别为"锁竞争"的错误。

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgConnection, Postgres, Row, Transaction, TypeInfo};

use crate::connection::{LockConnection, SqlParam, SqlValue};

/// PostgreSQL `lock_not_available`
pub const LOCK_NOT_AVAILABLE: &str = "55P03";

/// 错误是否为 `lock_timeout` 到期（SQLSTATE 55P03）
pub fn is_lock_not_available(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db_error| db_error.code())
        .is_some_and(|code| code == LOCK_NOT_AVAILABLE)
}

fn bind_params<'q>(sql: &'q str, params: &[SqlParam]) -> Query<'q, Postgres, PgArguments> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            SqlParam::Int(value) => query.bind(*value),
            SqlParam::Text(value) => query.bind(value.clone()),
        };
    }
    query
}

fn first_column(row: &PgRow) -> Result<SqlValue, sqlx::Error> {
    let Some(column) = row.columns().first() else {
        return Ok(SqlValue::Null);
    };

    let value = match column.type_info().name() {
        "BOOL" => row.try_get::<Option<bool>, _>(0)?.map(SqlValue::Bool),
        "INT2" => row.try_get::<Option<i16>, _>(0)?.map(|v| SqlValue::Int(v.into())),
        "INT4" => row.try_get::<Option<i32>, _>(0)?.map(|v| SqlValue::Int(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(0)?.map(SqlValue::Int),
        "VOID" => None,
        _ => row.try_get::<Option<String>, _>(0)?.map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

async fn fetch_scalar_on(
    conn: &mut PgConnection,
    sql: &str,
    params: &[SqlParam],
) -> Result<SqlValue, sqlx::Error> {
    let row = bind_params(sql, params).fetch_optional(&mut *conn).await?;
    match row {
        Some(row) => first_column(&row),
        None => Ok(SqlValue::Null),
    }
}

async fn execute_on(
    conn: &mut PgConnection,
    sql: &str,
    params: &[SqlParam],
) -> Result<(), sqlx::Error> {
    bind_params(sql, params).execute(&mut *conn).await?;
    Ok(())
}

#[async_trait]
impl LockConnection for PgConnection {
    type Error = sqlx::Error;

    async fn fetch_scalar(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<SqlValue, Self::Error> {
        fetch_scalar_on(self, sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<(), Self::Error> {
        execute_on(self, sql, params).await
    }

    fn is_transaction_active(&self) -> bool {
        sqlx::Connection::is_in_transaction(self)
    }

    fn is_lock_unavailable(&self, error: &Self::Error) -> bool {
        is_lock_not_available(error)
    }
}

#[async_trait]
impl<'c> LockConnection for Transaction<'c, Postgres> {
    type Error = sqlx::Error;

    async fn fetch_scalar(
        &mut self,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<SqlValue, Self::Error> {
        fetch_scalar_on(self, sql, params).await
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<(), Self::Error> {
        execute_on(self, sql, params).await
    }

    fn is_transaction_active(&self) -> bool {
        true
    }

    fn is_lock_unavailable(&self, error: &Self::Error) -> bool {
        is_lock_not_available(error)
    }
}
