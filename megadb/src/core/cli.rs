use clap::{Parser, Subcommand};

use std::path::PathBuf;

use crate::data::OrderBy;

use super::constants::{
    ENV_CONFIG, ENV_DATABASE_URL, ENV_SCHEMA_CACHE, ENV_STATEMENT_TIMEOUT_SECS,
};

#[derive(Parser)]
#[command(name = "megadb")]
#[command(version, about = "Type-aware table access over SQLite", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database URL, file path or :memory:
    #[arg(long, short = 'd', global = true, env = ENV_DATABASE_URL)]
    pub database_url: Option<String>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Per-statement timeout in seconds
    #[arg(long, global = true, env = ENV_STATEMENT_TIMEOUT_SECS, value_parser = parse_timeout)]
    pub statement_timeout: Option<u64>,

    /// Cache resolved column types between statements
    #[arg(long, global = true, env = ENV_SCHEMA_CACHE)]
    pub schema_cache: Option<bool>,
}

/// Parse a statement timeout in whole seconds (at least 1)
fn parse_timeout(s: &str) -> Result<u64, String> {
    match s.trim().parse::<u64>() {
        Ok(0) => Err("Statement timeout must be at least 1 second".to_string()),
        Ok(secs) => Ok(secs),
        Err(_) => Err(format!("Invalid timeout '{}'. Use whole seconds", s)),
    }
}

/// Parse a `column=value` pair
fn parse_field(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => {
            Ok((column.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Invalid field '{}'. Use column=value", s)),
    }
}

/// Parse a sort key (`column`, `column:asc`, `column:desc`)
fn parse_order(s: &str) -> Result<OrderBy, String> {
    s.parse::<OrderBy>().map_err(|e| e.to_string())
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// List tables
    Tables,
    /// Check whether a table exists
    Exists { table: String },
    /// Show column bind types of a table
    Columns { table: String },
    /// Fetch one row by id
    Get { table: String, id: i64 },
    /// Fetch rows with an optional filter, order, column list and limit
    List {
        table: String,

        /// Filter as JSON, e.g. '{"age": ">=18", "LOGIC": "OR", "name": "root"}'
        #[arg(long, short = 'f')]
        filter: Option<String>,

        /// Sort key, repeatable (column or column:asc|desc)
        #[arg(long, short = 'o', value_parser = parse_order)]
        order: Vec<OrderBy>,

        /// Column to return, repeatable (all columns when omitted)
        #[arg(long, short = 's')]
        select: Vec<String>,

        /// Maximum number of rows (0 = no limit)
        #[arg(long, short = 'l', default_value_t = 0)]
        limit: u32,
    },
    /// Insert a row
    Add {
        table: String,

        /// Values as column=value
        #[arg(required = true, value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Update a row by id
    Update {
        table: String,
        id: i64,

        /// Values as column=value
        #[arg(required = true, value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },
    /// Delete a row by id
    Delete { table: String, id: i64 },
    /// Run raw SQL
    Query { sql: String },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub database_url: Option<String>,
    pub config: Option<PathBuf>,
    pub statement_timeout_secs: Option<u64>,
    pub schema_cache: Option<bool>,
}

impl From<&Cli> for CliConfig {
    fn from(cli: &Cli) -> Self {
        Self {
            database_url: cli.database_url.clone(),
            config: cli.config.clone(),
            statement_timeout_secs: cli.statement_timeout,
            schema_cache: cli.schema_cache,
        }
    }
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Commands) {
    let cli = Cli::parse();
    (CliConfig::from(&cli), cli.command)
}
