//! Table-oriented access to SQLite
//!
//! Column types are resolved from the schema, filters compile to
//! parameterized WHERE expressions, and every statement runs through one
//! shared prepared-statement handle per connection.

pub mod app;
pub mod core;
pub mod data;
pub mod utils;
