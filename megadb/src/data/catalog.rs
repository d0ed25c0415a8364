//! Column type resolution
//!
//! Derives a bind-type code for every column of a table from the declared
//! SQL type reported by `pragma_table_info`. Resolved maps can optionally be
//! cached per table; the cache is dropped whenever DDL runs through
//! [`Database::query`](super::Database::query).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use serde::Serialize;

use crate::core::config::SchemaCacheConfig;

use super::builder::BoundStatement;
use super::error::DbError;
use super::executor::StatementExecutor;

const TABLE_INFO_SQL: &str = "SELECT name, type FROM pragma_table_info(?) ORDER BY cid";

/// Bind-type code of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    String,
}

impl ColumnType {
    /// Classify a declared SQL type by substring
    ///
    /// `int` anywhere means Integer, `float` or `double` means Float (checked
    /// last, so it wins), everything else binds as String.
    pub fn from_declared(declared: &str) -> Self {
        let declared = declared.to_ascii_lowercase();
        if declared.contains("float") || declared.contains("double") {
            Self::Float
        } else if declared.contains("int") {
            Self::Integer
        } else {
            Self::String
        }
    }

    /// One-character bind code (`i`, `d`, `s`)
    pub fn code(&self) -> char {
        match self {
            Self::Integer => 'i',
            Self::Float => 'd',
            Self::String => 's',
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::String => write!(f, "string"),
        }
    }
}

/// Column name to bind type, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnTypes {
    columns: Vec<(String, ColumnType)>,
}

impl ColumnTypes {
    pub fn new(columns: Vec<(String, ColumnType)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, ty)| *ty)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns.iter().map(|(name, ty)| (name.as_str(), *ty))
    }
}

impl<S: Into<String>> FromIterator<(S, ColumnType)> for ColumnTypes {
    fn from_iter<I: IntoIterator<Item = (S, ColumnType)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(name, ty)| (name.into(), ty)).collect())
    }
}

/// Resolves and optionally caches column types per table
pub struct TypeCatalog {
    cache: Option<Cache<String, Arc<ColumnTypes>>>,
}

impl TypeCatalog {
    pub fn new(config: &SchemaCacheConfig) -> Self {
        let cache = config.enabled.then(|| {
            let builder = Cache::builder().max_capacity(config.max_entries);
            if config.ttl_secs > 0 {
                builder
                    .time_to_live(Duration::from_secs(config.ttl_secs))
                    .build()
            } else {
                builder.build()
            }
        });
        Self { cache }
    }

    /// Resolve `column -> ColumnType` for a table
    ///
    /// Fails with [`DbError::Schema`] when the table yields no columns or the
    /// metadata query fails; never returns a partial map.
    pub async fn resolve(
        &self,
        executor: &StatementExecutor,
        table: &str,
    ) -> Result<Arc<ColumnTypes>, DbError> {
        if let Some(cache) = &self.cache
            && let Some(types) = cache.get(table)
        {
            tracing::trace!(table, "Column types served from cache");
            return Ok(types);
        }

        let types = Arc::new(load_types(executor, table).await?);
        tracing::debug!(table, columns = types.len(), "Resolved column types");

        if let Some(cache) = &self.cache {
            cache.insert(table.to_string(), Arc::clone(&types));
        }
        Ok(types)
    }

    /// Drop every cached table (after schema changes)
    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
            tracing::debug!("Column type cache invalidated");
        }
    }

    pub fn is_caching(&self) -> bool {
        self.cache.is_some()
    }
}

async fn load_types(executor: &StatementExecutor, table: &str) -> Result<ColumnTypes, DbError> {
    let schema_error = |reason: String| DbError::Schema {
        table: table.to_string(),
        reason,
    };

    let statement = BoundStatement::new(TABLE_INFO_SQL).bind(table, ColumnType::String);
    let result = executor
        .run(&statement)
        .await
        .map_err(|e| schema_error(e.to_string()))?;

    let mut columns = Vec::with_capacity(result.row_count());
    for row in result.fetch_all() {
        let name = row
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| schema_error("column without a name".to_string()))?;
        let declared = row.get("type").and_then(|v| v.as_str()).unwrap_or("");
        columns.push((name.to_string(), ColumnType::from_declared(declared)));
    }

    if columns.is_empty() {
        return Err(schema_error("no columns found".to_string()));
    }
    Ok(ColumnTypes::new(columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::executor::tests::memory_executor;

    #[test]
    fn test_from_declared_integer() {
        for declared in ["INTEGER", "int", "BIGINT", "smallint(6)", "TINYINT UNSIGNED", "Point"] {
            assert_eq!(ColumnType::from_declared(declared), ColumnType::Integer, "{declared}");
        }
    }

    #[test]
    fn test_from_declared_float() {
        for declared in ["FLOAT", "double", "DOUBLE PRECISION", "float(8,2)"] {
            assert_eq!(ColumnType::from_declared(declared), ColumnType::Float, "{declared}");
        }
    }

    #[test]
    fn test_from_declared_string() {
        for declared in ["TEXT", "VARCHAR(255)", "REAL", "DECIMAL(10,2)", "BLOB", ""] {
            assert_eq!(ColumnType::from_declared(declared), ColumnType::String, "{declared}");
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(ColumnType::Integer.code(), 'i');
        assert_eq!(ColumnType::Float.code(), 'd');
        assert_eq!(ColumnType::String.code(), 's');
    }

    #[test]
    fn test_column_types_lookup() {
        let types: ColumnTypes = [("id", ColumnType::Integer), ("name", ColumnType::String)]
            .into_iter()
            .collect();
        assert_eq!(types.len(), 2);
        assert_eq!(types.get("id"), Some(ColumnType::Integer));
        assert!(types.contains("name"));
        assert!(!types.contains("missing"));
        assert_eq!(
            types.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            vec!["id", "name"]
        );
    }

    #[tokio::test]
    async fn test_resolve_one_entry_per_column() {
        let executor = memory_executor().await;
        executor
            .run(&BoundStatement::new(
                "CREATE TABLE metrics (id INTEGER PRIMARY KEY, label VARCHAR(20), \
                 ratio DOUBLE, weight FLOAT, note TEXT, raw)",
            ))
            .await
            .unwrap();

        let catalog = TypeCatalog::new(&SchemaCacheConfig::default());
        let types = catalog.resolve(&executor, "metrics").await.unwrap();

        let expected: ColumnTypes = [
            ("id", ColumnType::Integer),
            ("label", ColumnType::String),
            ("ratio", ColumnType::Float),
            ("weight", ColumnType::Float),
            ("note", ColumnType::String),
            ("raw", ColumnType::String),
        ]
        .into_iter()
        .collect();
        assert_eq!(*types, expected);
    }

    #[tokio::test]
    async fn test_resolve_missing_table_is_schema_error() {
        let executor = memory_executor().await;
        let catalog = TypeCatalog::new(&SchemaCacheConfig::default());

        let err = catalog.resolve(&executor, "nope").await.unwrap_err();
        assert!(matches!(err, DbError::Schema { ref table, .. } if table == "nope"));
    }

    #[tokio::test]
    async fn test_cache_serves_stale_until_invalidated() {
        let executor = memory_executor().await;
        executor
            .run(&BoundStatement::new("CREATE TABLE t (a INTEGER)"))
            .await
            .unwrap();

        let config = SchemaCacheConfig {
            enabled: true,
            ..Default::default()
        };
        let catalog = TypeCatalog::new(&config);
        assert!(catalog.is_caching());
        assert_eq!(catalog.resolve(&executor, "t").await.unwrap().len(), 1);

        executor
            .run(&BoundStatement::new("ALTER TABLE t ADD COLUMN b TEXT"))
            .await
            .unwrap();
        assert_eq!(catalog.resolve(&executor, "t").await.unwrap().len(), 1);

        catalog.invalidate_all();
        let types = catalog.resolve(&executor, "t").await.unwrap();
        assert_eq!(types.get("b"), Some(ColumnType::String));
    }

    #[tokio::test]
    async fn test_uncached_catalog_sees_schema_changes() {
        let executor = memory_executor().await;
        executor
            .run(&BoundStatement::new("CREATE TABLE t (a INTEGER)"))
            .await
            .unwrap();
        let catalog = TypeCatalog::new(&SchemaCacheConfig::default());
        assert!(!catalog.is_caching());
        assert_eq!(catalog.resolve(&executor, "t").await.unwrap().len(), 1);

        executor
            .run(&BoundStatement::new("ALTER TABLE t ADD COLUMN b REAL"))
            .await
            .unwrap();
        assert_eq!(catalog.resolve(&executor, "t").await.unwrap().len(), 2);
    }
}
