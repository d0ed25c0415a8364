//! Filter parsing
//!
//! Parses the JSON mapping vocabulary into a [`FilterNode`]: scalar values are
//! conditions, nested objects are groups, and the reserved `LOGIC` key switches
//! the combinator for later keys at the same level.

use serde_json::{Map, Value};

use crate::data::error::DbError;

use super::types::{Combinator, FilterGroup, FilterNode};

/// Reserved key that rebinds the combinator
pub const LOGIC_KEY: &str = "LOGIC";

/// Maximum size of filter JSON in bytes (64KB)
const MAX_FILTER_JSON_SIZE: usize = 64 * 1024;

/// Maximum nesting depth of groups
const MAX_FILTER_DEPTH: usize = 16;

/// Maximum number of conditions allowed
const MAX_FILTER_CONDITIONS: usize = 100;

/// Parse a filter from its JSON text
///
/// An empty or whitespace-only string is an empty filter.
pub fn parse_filter(json_str: &str) -> Result<FilterNode, DbError> {
    if json_str.len() > MAX_FILTER_JSON_SIZE {
        return Err(DbError::invalid_input(format!(
            "Filter JSON exceeds maximum size of {} bytes",
            MAX_FILTER_JSON_SIZE
        )));
    }
    if json_str.trim().is_empty() {
        return Ok(FilterNode::default());
    }

    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| DbError::invalid_input(format!("Invalid filter JSON: {}", e)))?;
    filter_from_value(&value)
}

/// Build a filter from an already parsed JSON object
pub fn filter_from_value(value: &Value) -> Result<FilterNode, DbError> {
    let Value::Object(map) = value else {
        return Err(DbError::invalid_input("Filter must be a JSON object"));
    };

    let mut conditions = 0;
    let group = parse_group(map, 1, &mut conditions)?;
    Ok(FilterNode::Group(group))
}

fn parse_group(
    map: &Map<String, Value>,
    depth: usize,
    conditions: &mut usize,
) -> Result<FilterGroup, DbError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(DbError::invalid_input(format!(
            "Filter nesting exceeds maximum depth of {}",
            MAX_FILTER_DEPTH
        )));
    }

    let mut group = FilterGroup::new();
    for (key, value) in map {
        if key == LOGIC_KEY {
            let combinator = value
                .as_str()
                .ok_or_else(|| DbError::invalid_input("LOGIC must be \"AND\" or \"OR\""))?
                .parse::<Combinator>()?;
            group.push_logic(combinator);
            continue;
        }

        match value {
            Value::Object(nested) => {
                group.push(FilterNode::Group(parse_group(nested, depth + 1, conditions)?));
            }
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                *conditions += 1;
                if *conditions > MAX_FILTER_CONDITIONS {
                    return Err(DbError::invalid_input(format!(
                        "Maximum {} filter conditions allowed",
                        MAX_FILTER_CONDITIONS
                    )));
                }
                group.push(FilterNode::leaf(key.as_str(), scalar_text(value)));
            }
            Value::Null | Value::Array(_) => {
                return Err(DbError::invalid_input(format!(
                    "Unsupported value for filter field '{}'",
                    key
                )));
            }
        }
    }
    Ok(group)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
