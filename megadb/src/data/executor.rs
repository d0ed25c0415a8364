//! Shared statement execution
//!
//! A connection owns exactly one statement handle. Every statement is
//! prepared into that handle, bound, executed and fully materialized while
//! the handle's mutex is held, so callers sharing a connection are
//! serialized and never observe each other's pending results.
//!
//! The statement timeout is enforced inside SQLite through a progress
//! handler. Once the deadline passes the running statement is interrupted
//! and rolled back, so a timed-out write never commits and the connection
//! is idle again before the mutex is released.

use std::time::{Duration, Instant};

use serde_json::Value;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection, SqliteRow, SqliteStatement};
use sqlx::{Column, Connection, Either, Executor, Row, Statement, ValueRef};
use tokio::sync::Mutex;

use super::builder::BoundStatement;
use super::catalog::ColumnType;
use super::error::DbError;
use super::result::{QueryResult, Row as ResultRow};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// VM instructions between deadline checks
const PROGRESS_OPS: i32 = 1000;

/// SQLITE_INTERRUPT result code
const SQLITE_INTERRUPT: &str = "9";

/// The connection and its single prepared statement
struct StatementHandle {
    conn: SqliteConnection,
    current: Option<SqliteStatement<'static>>,
}

pub struct StatementExecutor {
    handle: Mutex<StatementHandle>,
    timeout: Duration,
}

impl StatementExecutor {
    pub fn new(conn: SqliteConnection, timeout: Duration) -> Self {
        Self {
            handle: Mutex::new(StatementHandle {
                conn,
                current: None,
            }),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Prepare, bind and run a statement, bounded by the statement timeout
    ///
    /// Statements that return columns are fetched into rows; all others
    /// report affected rows and the last inserted row id.
    pub async fn run(&self, statement: &BoundStatement) -> Result<QueryResult, DbError> {
        let mut guard = self.handle.lock().await;

        tracing::trace!(
            sql = %statement.sql,
            types = %statement.type_codes(),
            "Running statement"
        );

        let deadline = Instant::now() + self.timeout;
        guard
            .conn
            .lock_handle()
            .await
            .map_err(DbError::Exec)?
            .set_progress_handler(PROGRESS_OPS, move || Instant::now() < deadline);

        let result = run_locked(&mut guard, statement).await;

        match guard.conn.lock_handle().await {
            Ok(mut handle) => handle.remove_progress_handler(),
            Err(e) => tracing::warn!(error = %e, "Failed to remove progress handler"),
        }

        match result {
            Err(e) if is_interrupted(&e) => {
                tracing::warn!(
                    sql = %statement.sql,
                    "Statement timed out after {}s",
                    self.timeout.as_secs()
                );
                Err(DbError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                })
            }
            other => other,
        }
    }

    /// Close the underlying connection
    pub async fn close(self) -> Result<(), DbError> {
        let handle = self.handle.into_inner();
        drop(handle.current);
        handle.conn.close().await.map_err(DbError::Connection)
    }
}

async fn run_locked(
    handle: &mut StatementHandle,
    statement: &BoundStatement,
) -> Result<QueryResult, DbError> {
    let StatementHandle { conn, current } = handle;

    let prepared = (&mut *conn)
        .prepare(statement.sql.as_str())
        .await
        .map_err(|source| DbError::Prepare {
            sql: statement.sql.clone(),
            source,
        })?;
    let prepared = current.insert(Statement::to_owned(&prepared));

    let expected = match prepared.parameters() {
        Some(Either::Left(params)) => params.len(),
        Some(Either::Right(count)) => count,
        None => statement.values.len(),
    };
    if statement.values.len() != statement.types.len() || statement.values.len() != expected {
        return Err(DbError::BindArity {
            expected,
            values: statement.values.len(),
            types: statement.types.len(),
        });
    }

    let mut query = prepared.query();
    for (index, (value, ty)) in statement.values.iter().zip(&statement.types).enumerate() {
        query = bind_value(query, index, value, *ty)?;
    }

    if prepared.columns().is_empty() {
        let done = query.execute(&mut *conn).await.map_err(DbError::Exec)?;
        Ok(QueryResult::from_execution(
            done.rows_affected(),
            done.last_insert_rowid(),
        ))
    } else {
        let rows = query.fetch_all(&mut *conn).await.map_err(DbError::Exec)?;
        Ok(QueryResult::from_rows(rows.iter().map(decode_row).collect()))
    }
}

fn is_interrupted(error: &DbError) -> bool {
    let source = match error {
        DbError::Prepare { source, .. } => source,
        DbError::Exec(source) => source,
        _ => return false,
    };
    match source {
        sqlx::Error::Database(e) => {
            sqlx::error::DatabaseError::code(e.as_ref()).as_deref() == Some(SQLITE_INTERRUPT)
        }
        _ => false,
    }
}

fn bind_value<'q>(
    query: SqliteQuery<'q>,
    index: usize,
    value: &str,
    ty: ColumnType,
) -> Result<SqliteQuery<'q>, DbError> {
    let invalid = || DbError::InvalidValue {
        index,
        value: value.to_string(),
        expected: ty,
    };

    Ok(match ty {
        ColumnType::Integer => query.bind(value.trim().parse::<i64>().map_err(|_| invalid())?),
        ColumnType::Float => query.bind(value.trim().parse::<f64>().map_err(|_| invalid())?),
        ColumnType::String => query.bind(value.to_string()),
    })
}

fn decode_row(row: &SqliteRow) -> ResultRow {
    row.columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            (column.name().to_string(), decode_value(row, index))
        })
        .collect()
}

fn decode_value(row: &SqliteRow, index: usize) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Err(_) => return Value::Null,
        Ok(_) => {}
    }

    row.try_get::<i64, _>(index)
        .map(Value::from)
        .or_else(|_| row.try_get::<f64, _>(index).map(Value::from))
        .or_else(|_| row.try_get::<String, _>(index).map(Value::from))
        .or_else(|_| {
            row.try_get::<Vec<u8>, _>(index)
                .map(|bytes| Value::from(hex::encode(bytes)))
        })
        .unwrap_or(Value::Null)
}
