//! SQL utility functions

use std::sync::OnceLock;

use regex::Regex;

/// Check that a name can be interpolated into SQL as a bare identifier.
///
/// Table and column names cannot be bound as parameters, so anything that
/// reaches the SQL text unquoted must match `[A-Za-z_][A-Za-z0-9_]*`.
///
/// # Example
///
/// ```
/// use megadb::utils::sql::is_valid_identifier;
///
/// assert!(is_valid_identifier("user_accounts"));
/// assert!(!is_valid_identifier("users; DROP TABLE users"));
/// ```
pub fn is_valid_identifier(name: &str) -> bool {
    static RE_IDENT: OnceLock<Regex> = OnceLock::new();
    RE_IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex"))
        .is_match(name)
}

/// Quote an identifier with backticks (understood by SQLite and MySQL)
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Whether a statement changes the schema (CREATE, ALTER, DROP)
///
/// Leading `--` and `/* */` comments are skipped before the keyword.
pub fn is_ddl(sql: &str) -> bool {
    let keyword = skip_leading_comments(sql)
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("");
    ["CREATE", "ALTER", "DROP"]
        .iter()
        .any(|k| keyword.eq_ignore_ascii_case(k))
}

fn skip_leading_comments(mut sql: &str) -> &str {
    loop {
        sql = sql.trim_start();
        if let Some(rest) = sql.strip_prefix("--") {
            sql = rest.split_once('\n').map_or("", |(_, after)| after);
        } else if let Some(rest) = sql.strip_prefix("/*") {
            sql = rest.split_once("*/").map_or("", |(_, after)| after);
        } else {
            return sql;
        }
    }
}
