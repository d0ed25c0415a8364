//! SQL statement builders
//!
//! Turns CRUD requests into parameterized statements. Identifiers are checked
//! before they reach the SQL text: table names must be plain identifiers and
//! every column must exist in the table's resolved types.

use std::fmt;
use std::str::FromStr;

use crate::utils::sql::{is_valid_identifier, quote_identifier};

use super::catalog::{ColumnType, ColumnTypes};
use super::error::DbError;
use super::filters::{FilterNode, compile};

/// SQL text with its bind values and types in placeholder order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub values: Vec<String>,
    pub types: Vec<ColumnType>,
}

impl BoundStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    /// Append one bind value
    pub fn bind(mut self, value: impl Into<String>, ty: ColumnType) -> Self {
        self.values.push(value.into());
        self.types.push(ty);
        self
    }

    /// Bind codes as one string (`"si"`)
    pub fn type_codes(&self) -> String {
        self.types.iter().map(ColumnType::code).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for SortDirection {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(DbError::invalid_input(format!(
                "Invalid sort direction '{}'. Valid options: asc, desc",
                s
            ))),
        }
    }
}

/// One sort key of a list query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Asc)
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Desc)
    }

    pub fn to_sql(&self) -> String {
        format!("{} {}", self.column, self.direction)
    }
}

/// Parses `column` or `column:asc` / `column:desc`
impl FromStr for OrderBy {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [column] if !column.trim().is_empty() => Ok(Self::asc(column.trim())),
            [column, direction] if !column.trim().is_empty() => {
                Ok(Self::new(column.trim(), direction.parse()?))
            }
            _ => Err(DbError::invalid_input(format!(
                "Invalid order '{}'. Use 'column', 'column:asc' or 'column:desc'",
                s
            ))),
        }
    }
}

/// Parameters of a list query
///
/// An empty select list means all columns and a zero limit means no limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub order: Vec<OrderBy>,
    pub filter: FilterNode,
    pub select: Vec<String>,
    pub limit: u32,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    pub fn filter(mut self, filter: impl Into<FilterNode>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

/// Reject table names that are not plain identifiers
pub fn check_table(table: &str) -> Result<(), DbError> {
    if is_valid_identifier(table) {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!("Invalid table name '{}'", table)))
    }
}

fn column_type(types: &ColumnTypes, column: &str) -> Result<ColumnType, DbError> {
    types.get(column).ok_or_else(|| DbError::unknown_column(column))
}

fn check_fields<T>(fields: &[T]) -> Result<(), DbError> {
    if fields.is_empty() {
        return Err(DbError::invalid_input("No fields given"));
    }
    Ok(())
}

/// `INSERT INTO table (`a`, `b`) VALUES (?, ?)`
pub fn build_insert<K, V>(
    table: &str,
    fields: &[(K, V)],
    types: &ColumnTypes,
) -> Result<BoundStatement, DbError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    check_table(table)?;
    check_fields(fields)?;

    let mut statement = BoundStatement::default();
    let mut columns = Vec::with_capacity(fields.len());
    for (column, value) in fields {
        let column = column.as_ref();
        let ty = column_type(types, column)?;
        columns.push(quote_identifier(column));
        statement = statement.bind(value.as_ref(), ty);
    }

    let placeholders = vec!["?"; fields.len()].join(", ");
    statement.sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    );
    Ok(statement)
}

/// `UPDATE table SET a=?, b=? WHERE id=?` with the id bound last
pub fn build_update<K, V>(
    table: &str,
    id: i64,
    fields: &[(K, V)],
    types: &ColumnTypes,
) -> Result<BoundStatement, DbError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    check_table(table)?;
    check_fields(fields)?;

    let mut statement = BoundStatement::default();
    let mut assignments = Vec::with_capacity(fields.len());
    for (column, value) in fields {
        let column = column.as_ref();
        let ty = column_type(types, column)?;
        assignments.push(format!("{}=?", column));
        statement = statement.bind(value.as_ref(), ty);
    }

    statement.sql = format!("UPDATE {} SET {} WHERE id=?", table, assignments.join(", "));
    Ok(statement.bind(id.to_string(), ColumnType::Integer))
}

pub fn build_select_by_id(table: &str, id: i64) -> Result<BoundStatement, DbError> {
    check_table(table)?;
    Ok(BoundStatement::new(format!("SELECT * FROM {} WHERE id=?", table))
        .bind(id.to_string(), ColumnType::Integer))
}

pub fn build_delete(table: &str, id: i64) -> Result<BoundStatement, DbError> {
    check_table(table)?;
    Ok(BoundStatement::new(format!("DELETE FROM {} WHERE id=?", table))
        .bind(id.to_string(), ColumnType::Integer))
}

/// `SELECT <select|*> FROM table [WHERE ...] [ORDER BY ...] [LIMIT n]`
pub fn build_list(
    table: &str,
    query: &ListQuery,
    types: &ColumnTypes,
) -> Result<BoundStatement, DbError> {
    check_table(table)?;

    let select = if query.select.is_empty() {
        "*".to_string()
    } else {
        for column in &query.select {
            if column != "*" {
                column_type(types, column)?;
            }
        }
        query.select.join(", ")
    };

    let mut sql = format!("SELECT {} FROM {}", select, table);

    let filter = compile(&query.filter, types)?;
    if !filter.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&filter.sql);
    }

    if !query.order.is_empty() {
        let keys = query
            .order
            .iter()
            .map(|order| column_type(types, &order.column).map(|_| order.to_sql()))
            .collect::<Result<Vec<_>, _>>()?;
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    if query.limit > 0 {
        sql.push_str(&format!(" LIMIT {}", query.limit));
    }

    Ok(BoundStatement {
        sql,
        values: filter.values,
        types: filter.types,
    })
}
