//! Core application

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};

use crate::core::cli::{self, CliConfig, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::data::filters::parse_filter;
use crate::data::{Database, DbError, ListQuery, QueryResult};

pub struct CoreApp {
    pub config: AppConfig,
    pub database: Database,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        let app = Self::init(&cli_config).await?;
        let outcome = app.execute(command).await;
        let failure = app.database.last_error();
        app.database
            .close()
            .await
            .context("Failed to close database")?;

        let output = match (outcome, failure) {
            (Ok(output), _) => output,
            (Err(_), Some(record)) => anyhow::bail!(
                "{} (code {}, {}:{})",
                record.message,
                record.code,
                record.file,
                record.line
            ),
            (Err(e), None) => return Err(e.into()),
        };

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;
        Self::open(config).await
    }

    /// Connect using an already loaded configuration
    pub async fn open(config: AppConfig) -> Result<Self> {
        let database = Database::connect(&config.database)
            .await
            .with_context(|| format!("Failed to open database {}", config.database.url))?;
        Ok(Self { config, database })
    }

    /// Run one command and render its result as JSON
    pub async fn execute(&self, command: Commands) -> Result<Value, DbError> {
        let db = &self.database;
        let output = match command {
            Commands::Tables => rows_json(db.table_list().await?),
            Commands::Exists { table } => {
                let exists = db.table_exists(&table).await?;
                json!({ "table": table, "exists": exists })
            }
            Commands::Columns { table } => {
                let types = db.resolve_types(&table).await?;
                let columns: Map<String, Value> = types
                    .iter()
                    .map(|(name, ty)| (name.to_string(), Value::from(ty.to_string())))
                    .collect();
                Value::Object(columns)
            }
            Commands::Get { table, id } => rows_json(db.get_by_id(&table, id).await?),
            Commands::List {
                table,
                filter,
                order,
                select,
                limit,
            } => {
                let query = ListQuery {
                    order,
                    filter: parse_filter(filter.as_deref().unwrap_or(""))?,
                    select,
                    limit,
                };
                rows_json(db.get_list(&table, &query).await?)
            }
            Commands::Add { table, fields } => {
                json!({ "id": db.add(&table, fields.as_slice()).await? })
            }
            Commands::Update { table, id, fields } => {
                json!({ "rows_affected": db.update(&table, id, fields.as_slice()).await? })
            }
            Commands::Delete { table, id } => {
                json!({ "rows_affected": db.delete(&table, id).await? })
            }
            Commands::Query { sql } => {
                let result = db.query(&sql).await?;
                json!({
                    "rows_affected": result.rows_affected(),
                    "last_insert_id": result.last_insert_id(),
                    "rows": result.into_rows(),
                })
            }
        };
        Ok(output)
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .with_writer(std::io::stderr)
            .compact()
            .with_env_filter(filter)
            .init();
    }
}

fn rows_json(result: QueryResult) -> Value {
    Value::Array(result.into_iter().map(Value::Object).collect())
}
