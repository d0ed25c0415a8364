//! Data access layer
//!
//! A [`Database`] owns one SQLite connection with a single shared statement
//! handle and offers table-oriented CRUD on top of it:
//! - `catalog` - column type resolution and optional caching
//! - `filters` - nested AND/OR filters compiled to WHERE expressions
//! - `builder` - INSERT/UPDATE/SELECT/DELETE statement construction
//! - `executor` - prepare/bind/execute under one mutex with a timeout
//! - `result` - materialized rows
//! - `error` - error kinds and the per-connection last error
//!
//! Every operation returns `Result`. A failure is also recorded with the
//! caller's file and line, available from [`Database::last_error`].

pub mod builder;
pub mod catalog;
pub mod error;
pub mod executor;
pub mod filters;
pub mod result;

pub use builder::{BoundStatement, ListQuery, OrderBy, SortDirection};
pub use catalog::{ColumnType, ColumnTypes, TypeCatalog};
pub use error::{DbError, ErrorRecord};
pub use executor::StatementExecutor;
pub use result::{QueryResult, Row};

use std::panic::Location;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use tracing::log::LevelFilter;

use crate::core::config::DatabaseConfig;
use crate::utils::file::database_stem;
use crate::utils::sql::is_ddl;

use error::LastError;

const TABLE_EXISTS_SQL: &str = "SELECT name FROM sqlite_master WHERE type='table' AND name=?";

const TABLE_LIST_SQL: &str = "SELECT name, type, sql FROM sqlite_master \
     WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

/// Connection to one database
pub struct Database {
    name: Option<String>,
    executor: StatementExecutor,
    catalog: TypeCatalog,
    last_error: LastError,
}

impl Database {
    /// Open the database described by `config`
    ///
    /// Accepts `sqlite:` URLs, plain file paths and `:memory:`. File
    /// databases are created when missing.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        if config.statement_timeout_secs == 0 {
            return Err(DbError::invalid_input(
                "statement_timeout_secs must be at least 1",
            ));
        }
        let url = normalize_url(&config.url);

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DbError::Connection)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .log_statements(LevelFilter::Trace);

        let conn = options.connect().await.map_err(|e| {
            tracing::warn!(url = %url, error = %e, "Database connection failed");
            DbError::Connection(e)
        })?;

        let name = database_name(&url);
        tracing::debug!(
            url = %url,
            name = name.as_deref().unwrap_or("<memory>"),
            schema_cache = config.schema_cache.enabled,
            "Database connected"
        );

        Ok(Self {
            name,
            executor: StatementExecutor::new(
                conn,
                Duration::from_secs(config.statement_timeout_secs),
            ),
            catalog: TypeCatalog::new(&config.schema_cache),
            last_error: LastError::default(),
        })
    }

    /// Database name (file stem), `None` for in-memory databases
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Most recent failure on this connection
    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.last_error.get()
    }

    pub fn clear_error(&self) {
        self.last_error.clear();
    }

    /// Column name to bind type for `table`
    #[track_caller]
    pub fn resolve_types<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Future<Output = Result<Arc<ColumnTypes>, DbError>> + 'a {
        let location = Location::caller();
        self.tracked(location, self.types_of(table))
    }

    /// Insert a row and return its generated id
    #[track_caller]
    pub fn add<'a, K, V>(
        &'a self,
        table: &'a str,
        fields: &'a [(K, V)],
    ) -> impl Future<Output = Result<i64, DbError>> + 'a
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let location = Location::caller();
        self.tracked(location, async move {
            let types = self.types_of(table).await?;
            let statement = builder::build_insert(table, fields, &types)?;
            let result = self.executor.run(&statement).await?;
            tracing::debug!(table, id = result.last_insert_id(), "Row added");
            Ok(result.last_insert_id())
        })
    }

    /// Update the row with `id` and return the number of affected rows
    #[track_caller]
    pub fn update<'a, K, V>(
        &'a self,
        table: &'a str,
        id: i64,
        fields: &'a [(K, V)],
    ) -> impl Future<Output = Result<u64, DbError>> + 'a
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let location = Location::caller();
        self.tracked(location, async move {
            let types = self.types_of(table).await?;
            let statement = builder::build_update(table, id, fields, &types)?;
            let result = self.executor.run(&statement).await?;
            tracing::debug!(table, id, rows = result.rows_affected(), "Row updated");
            Ok(result.rows_affected())
        })
    }

    #[track_caller]
    pub fn get_by_id<'a>(
        &'a self,
        table: &'a str,
        id: i64,
    ) -> impl Future<Output = Result<QueryResult, DbError>> + 'a {
        let location = Location::caller();
        self.tracked(location, async move {
            let statement = builder::build_select_by_id(table, id)?;
            self.executor.run(&statement).await
        })
    }

    /// Filtered, ordered and limited select
    #[track_caller]
    pub fn get_list<'a>(
        &'a self,
        table: &'a str,
        query: &'a ListQuery,
    ) -> impl Future<Output = Result<QueryResult, DbError>> + 'a {
        let location = Location::caller();
        self.tracked(location, async move {
            let types = self.types_of(table).await?;
            let statement = builder::build_list(table, query, &types)?;
            self.executor.run(&statement).await
        })
    }

    /// Delete the row with `id`; zero affected rows is not an error
    #[track_caller]
    pub fn delete<'a>(
        &'a self,
        table: &'a str,
        id: i64,
    ) -> impl Future<Output = Result<u64, DbError>> + 'a {
        let location = Location::caller();
        self.tracked(location, async move {
            let statement = builder::build_delete(table, id)?;
            let result = self.executor.run(&statement).await?;
            tracing::debug!(table, id, rows = result.rows_affected(), "Row deleted");
            Ok(result.rows_affected())
        })
    }

    /// Run raw SQL through the shared statement handle
    ///
    /// Schema changes drop every cached column type map.
    #[track_caller]
    pub fn query<'a>(
        &'a self,
        sql: &'a str,
    ) -> impl Future<Output = Result<QueryResult, DbError>> + 'a {
        let location = Location::caller();
        self.tracked(location, async move {
            let result = self.executor.run(&BoundStatement::new(sql)).await?;
            if is_ddl(sql) {
                self.catalog.invalidate_all();
            }
            Ok(result)
        })
    }

    #[track_caller]
    pub fn table_exists<'a>(
        &'a self,
        table: &'a str,
    ) -> impl Future<Output = Result<bool, DbError>> + 'a {
        let location = Location::caller();
        self.tracked(location, async move {
            let statement = BoundStatement::new(TABLE_EXISTS_SQL).bind(table, ColumnType::String);
            Ok(self.executor.run(&statement).await?.row_count() > 0)
        })
    }

    /// User tables with their type and creation SQL, ordered by name
    #[track_caller]
    pub fn table_list(&self) -> impl Future<Output = Result<QueryResult, DbError>> + '_ {
        let location = Location::caller();
        self.tracked(location, async move {
            self.executor.run(&BoundStatement::new(TABLE_LIST_SQL)).await
        })
    }

    /// Close the connection
    pub async fn close(self) -> Result<(), DbError> {
        tracing::debug!(name = self.name.as_deref().unwrap_or("<memory>"), "Closing database");
        self.executor.close().await
    }

    async fn types_of(&self, table: &str) -> Result<Arc<ColumnTypes>, DbError> {
        builder::check_table(table)?;
        self.catalog.resolve(&self.executor, table).await
    }

    async fn tracked<T>(
        &self,
        location: &'static Location<'static>,
        operation: impl Future<Output = Result<T, DbError>>,
    ) -> Result<T, DbError> {
        let result = operation.await;
        if let Err(e) = &result {
            tracing::warn!(
                error = %e,
                code = e.code(),
                caller = %location,
                "Database operation failed"
            );
            self.last_error.record(e, location);
        }
        result
    }
}

/// Turn a path or `:memory:` into a `sqlite:` URL
fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("sqlite:") {
        url.to_string()
    } else if url == ":memory:" {
        "sqlite::memory:".to_string()
    } else {
        format!("sqlite:{}", url)
    }
}

fn database_name(url: &str) -> Option<String> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path == ":memory:" || url.contains("mode=memory") {
        return None;
    }
    database_stem(Path::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::data::filters::{Combinator, FilterGroup, parse_filter};

    async fn users_db(cache: bool) -> Database {
        let db = Database::connect(&DatabaseConfig::in_memory().with_schema_cache(cache))
            .await
            .unwrap();
        db.query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name VARCHAR(50), \
             age INT, score DOUBLE)",
        )
        .await
        .unwrap();
        db
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("sqlite:data.db"), "sqlite:data.db");
        assert_eq!(normalize_url(":memory:"), "sqlite::memory:");
        assert_eq!(normalize_url("/tmp/app.db"), "sqlite:/tmp/app.db");
    }

    #[test]
    fn test_database_name() {
        assert_eq!(database_name("sqlite:/var/lib/shop.db"), Some("shop".to_string()));
        assert_eq!(database_name("sqlite://data/app.sqlite?mode=rwc"), Some("app".to_string()));
        assert_eq!(database_name("sqlite::memory:"), None);
        assert_eq!(database_name("sqlite:file:x?mode=memory"), None);
    }

    #[tokio::test]
    async fn test_crud_round() {
        let db = users_db(false).await;

        let id = db
            .add("users", &[("name", "Ann"), ("age", "30"), ("score", "4.5")])
            .await
            .unwrap();
        assert_eq!(id, 1);

        let mut row = db.get_by_id("users", id).await.unwrap();
        assert_eq!(row.row_count(), 1);
        let first = row.next_row().unwrap();
        assert_eq!(first["name"], json!("Ann"));
        assert_eq!(first["age"], json!(30));
        assert_eq!(first["score"], json!(4.5));

        let updated = db.update("users", id, &[("age", "31")]).await.unwrap();
        assert_eq!(updated, 1);
        let row = db.get_by_id("users", id).await.unwrap();
        assert_eq!(row.fetch_all()[0]["age"], json!(31));

        assert_eq!(db.delete("users", id).await.unwrap(), 1);
        assert_eq!(db.get_by_id("users", id).await.unwrap().row_count(), 0);
        assert!(db.last_error().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_row_is_success() {
        let db = users_db(false).await;
        assert_eq!(db.delete("users", 999).await.unwrap(), 0);
        assert!(db.last_error().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_row_affects_nothing() {
        let db = users_db(false).await;
        assert_eq!(db.update("users", 42, &[("name", "x")]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_list_with_filter_order_select_limit() {
        let db = users_db(false).await;
        for (name, age) in [("a", "15"), ("b", "20"), ("c", "35"), ("root", "99")] {
            db.add("users", &[("name", name), ("age", age)]).await.unwrap();
        }

        let query = ListQuery::new()
            .select(["name", "age"])
            .filter(
                FilterGroup::new()
                    .field("age", ">=18")
                    .field("age", "<50")
                    .logic(Combinator::Or)
                    .field("name", "root"),
            )
            .order(OrderBy::desc("age"))
            .limit(2);
        let result = db.get_list("users", &query).await.unwrap();

        let names: Vec<_> = result.fetch_all().iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("root"), json!("c")]);
        assert_eq!(result.columns(), vec!["name", "age"]);
    }

    #[tokio::test]
    async fn test_get_list_from_parsed_filter() {
        let db = users_db(false).await;
        for (name, age) in [("a", "10"), ("b", "20"), ("c", "30")] {
            db.add("users", &[("name", name), ("age", age)]).await.unwrap();
        }

        let filter =
            parse_filter(r#"{"g": {"LOGIC": "OR", "name": "a", "age": ">25"}}"#).unwrap();
        let query = ListQuery::new().filter(filter).order(OrderBy::asc("id"));
        let result = db.get_list("users", &query).await.unwrap();

        let names: Vec<_> = result.into_iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("a"), json!("c")]);
    }

    #[tokio::test]
    async fn test_get_list_without_filter_returns_all() {
        let db = users_db(false).await;
        db.add("users", &[("name", "a")]).await.unwrap();
        db.add("users", &[("name", "b")]).await.unwrap();

        let result = db.get_list("users", &ListQuery::new()).await.unwrap();
        assert_eq!(result.row_count(), 2);
    }

    #[tokio::test]
    async fn test_last_error_records_caller_location() {
        let db = users_db(false).await;

        let line = line!() + 1;
        let err = db.add("users", &[("ghost", "1")]).await.unwrap_err();
        assert!(matches!(err, DbError::UnknownColumn { .. }));

        let record = db.last_error().unwrap();
        assert_eq!(record.code, 3);
        assert_eq!(record.kind, "unknown_column");
        assert_eq!(record.message, "Unknown column: ghost");
        assert!(record.file.ends_with("mod.rs"));
        assert_eq!(record.line, line);

        db.clear_error();
        assert!(db.last_error().is_none());
    }

    #[tokio::test]
    async fn test_last_error_keeps_most_recent() {
        let db = users_db(false).await;

        assert!(db.get_by_id("missing_table", 1).await.is_err());
        assert_eq!(db.last_error().unwrap().kind, "prepare");

        assert!(db.add("users", &[("age", "old")]).await.is_err());
        let record = db.last_error().unwrap();
        assert_eq!(record.kind, "invalid_value");

        db.add("users", &[("age", "5")]).await.unwrap();
        assert_eq!(db.last_error().unwrap(), record);
    }

    #[tokio::test]
    async fn test_missing_table_is_schema_error() {
        let db = users_db(false).await;
        let err = db.add("nope", &[("a", "1")]).await.unwrap_err();
        assert!(matches!(err, DbError::Schema { .. }));
        assert_eq!(db.last_error().unwrap().code, 2);
    }

    #[tokio::test]
    async fn test_invalid_table_name_rejected() {
        let db = users_db(false).await;
        let err = db
            .get_list("users; DROP TABLE users", &ListQuery::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput(_)));
        assert!(db.table_exists("users").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_fields_rejected() {
        let db = users_db(false).await;
        let empty: Vec<(String, String)> = Vec::new();
        assert!(matches!(
            db.add("users", empty.as_slice()).await,
            Err(DbError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_types() {
        let db = users_db(false).await;
        let types = db.resolve_types("users").await.unwrap();
        let codes: String = types.iter().map(|(_, ty)| ty.code()).collect();
        assert_eq!(codes, "isid");
    }

    #[tokio::test]
    async fn test_ddl_through_query_invalidates_cache() {
        let db = users_db(true).await;
        assert_eq!(db.resolve_types("users").await.unwrap().len(), 4);

        db.query("ALTER TABLE users ADD COLUMN email TEXT").await.unwrap();
        let types = db.resolve_types("users").await.unwrap();
        assert_eq!(types.len(), 5);

        let id = db.add("users", &[("email", "a@b.c")]).await.unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn test_commented_ddl_invalidates_cache() {
        let db = users_db(true).await;
        assert_eq!(db.resolve_types("users").await.unwrap().len(), 4);

        db.query("/* migrate */ ALTER TABLE users ADD COLUMN email TEXT")
            .await
            .unwrap();
        db.query("-- second step\nALTER TABLE users ADD COLUMN nick TEXT")
            .await
            .unwrap();

        let id = db
            .add("users", &[("email", "a@b.c"), ("nick", "ab")])
            .await
            .unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn test_timed_out_write_does_not_commit() {
        let config = DatabaseConfig {
            statement_timeout_secs: 1,
            ..DatabaseConfig::in_memory()
        };
        let db = Database::connect(&config).await.unwrap();
        db.query("CREATE TABLE big (n INTEGER)").await.unwrap();

        let err = db
            .query(
                "INSERT INTO big (n) WITH RECURSIVE c(x) AS \
                 (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 100000000) SELECT x FROM c",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Timeout { timeout_secs: 1 }));
        assert_eq!(db.last_error().unwrap().kind, "timeout");

        let count = db.query("SELECT count(*) AS n FROM big").await.unwrap();
        assert_eq!(count.fetch_all()[0]["n"], json!(0));
    }

    #[tokio::test]
    async fn test_zero_statement_timeout_rejected() {
        let config = DatabaseConfig {
            statement_timeout_secs: 0,
            ..DatabaseConfig::in_memory()
        };
        let result = Database::connect(&config).await;
        assert!(matches!(result, Err(DbError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_cached_and_uncached_types_agree() {
        let cached = users_db(true).await;
        let uncached = users_db(false).await;
        assert_eq!(
            *cached.resolve_types("users").await.unwrap(),
            *uncached.resolve_types("users").await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_table_exists_and_list() {
        let db = users_db(false).await;
        db.query("CREATE TABLE audit (id INTEGER PRIMARY KEY, note TEXT)")
            .await
            .unwrap();

        assert!(db.table_exists("users").await.unwrap());
        assert!(!db.table_exists("ghosts").await.unwrap());

        let tables = db.table_list().await.unwrap();
        let names: Vec<_> = tables.fetch_all().iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("audit"), json!("users")]);
        assert_eq!(tables.fetch_all()[0]["type"], json!("table"));
    }

    #[tokio::test]
    async fn test_query_returns_rows() {
        let db = users_db(false).await;
        db.add("users", &[("name", "x")]).await.unwrap();
        let result = db.query("SELECT count(*) AS n FROM users").await.unwrap();
        assert_eq!(result.fetch_all()[0]["n"], json!(1));
    }

    #[tokio::test]
    async fn test_concurrent_operations_through_arc() {
        let db = Arc::new(users_db(false).await);

        let mut tasks = Vec::new();
        for i in 0..16 {
            let db = Arc::clone(&db);
            tasks.push(tokio::spawn(async move {
                let age = i.to_string();
                let id = db.add("users", &[("name", "n"), ("age", age.as_str())]).await?;
                db.get_by_id("users", id).await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().row_count(), 1);
        }

        let all = db.get_list("users", &ListQuery::new()).await.unwrap();
        assert_eq!(all.row_count(), 16);
    }

    #[tokio::test]
    async fn test_name_of_memory_database() {
        let db = users_db(false).await;
        assert_eq!(db.name(), None);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.db");
        let config = DatabaseConfig::new(path.to_string_lossy());

        let db = Database::connect(&config).await.unwrap();
        assert_eq!(db.name(), Some("inventory"));
        db.query("CREATE TABLE parts (id INTEGER PRIMARY KEY, label TEXT)")
            .await
            .unwrap();
        db.add("parts", &[("label", "bolt")]).await.unwrap();
        db.close().await.unwrap();

        let reopened = Database::connect(&config).await.unwrap();
        let row = reopened.get_by_id("parts", 1).await.unwrap();
        assert_eq!(row.fetch_all()[0]["label"], json!("bolt"));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nested").join("x.db");
        let result = Database::connect(&DatabaseConfig::new(path.to_string_lossy())).await;
        assert!(matches!(result, Err(DbError::Connection(_))));
    }
}
