// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "megadb";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".megadb";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "megadb.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "MEGADB_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "MEGADB_LOG";

// =============================================================================
// Environment Variables - Database
// =============================================================================

/// Environment variable for the database URL or file path
pub const ENV_DATABASE_URL: &str = "MEGADB_DATABASE_URL";

/// Environment variable for the per-statement timeout
pub const ENV_STATEMENT_TIMEOUT_SECS: &str = "MEGADB_STATEMENT_TIMEOUT_SECS";

/// Environment variable to enable or disable the column type cache
pub const ENV_SCHEMA_CACHE: &str = "MEGADB_SCHEMA_CACHE";

// =============================================================================
// Database Defaults
// =============================================================================

/// Default database location
pub const DEFAULT_DATABASE_URL: &str = "sqlite:megadb.db";

/// Upper bound for a single prepare + execute sequence
pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 30;

/// SQLite busy timeout (waiting on locks held by other processes)
pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// Column Type Cache Defaults
// =============================================================================

/// Maximum number of tables kept in the column type cache
pub const DEFAULT_SCHEMA_CACHE_MAX_ENTRIES: u64 = 256;

/// Time-to-live for cached column types (0 = until invalidated)
pub const DEFAULT_SCHEMA_CACHE_TTL_SECS: u64 = 300;
