//! Query filter system
//!
//! Nested AND/OR filters compiled into parameterized WHERE expressions.
//!
//! ## Usage
//!
//! ```
//! use megadb::data::catalog::{ColumnType, ColumnTypes};
//! use megadb::data::filters::{Combinator, FilterGroup, compile, parse_filter};
//!
//! let types: ColumnTypes = [("age", ColumnType::Integer), ("name", ColumnType::String)]
//!     .into_iter()
//!     .collect();
//!
//! let built = FilterGroup::new()
//!     .field("age", ">=18")
//!     .logic(Combinator::Or)
//!     .field("name", "admin");
//! let compiled = compile(&built.into(), &types).unwrap();
//! assert_eq!(compiled.sql, "age>=? OR name=?");
//!
//! let parsed = parse_filter(r#"{"age": ">=18", "LOGIC": "OR", "name": "admin"}"#).unwrap();
//! assert_eq!(compile(&parsed, &types).unwrap(), compiled);
//! ```

mod compiler;
mod parser;
mod types;

pub use compiler::compile;
pub use parser::{LOGIC_KEY, filter_from_value, parse_filter};
pub use types::{
    Combinator, CompiledFilter, Condition, FilterEntry, FilterGroup, FilterNode, Operator,
};
