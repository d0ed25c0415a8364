//! Filter type definitions
//!
//! A filter is a tree of conditions and groups. Groups join their entries
//! with a combinator that `Logic` entries can rebind part-way through.

use std::fmt;
use std::str::FromStr;

use crate::data::catalog::ColumnType;
use crate::data::error::DbError;

/// Boolean operator joining sibling conditions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Combinator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            _ => Err(DbError::invalid_input(format!(
                "Invalid combinator '{}'. Valid options: AND, OR",
                s
            ))),
        }
    }
}

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Lte,
    Gte,
    Lt,
    Gt,
    Ne,
}

impl Operator {
    /// Operators recognised inside raw values, in match priority order
    pub const EMBEDDED: [Operator; 5] = [Self::Lte, Self::Gte, Self::Lt, Self::Gt, Self::Ne];

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Lte => "<=",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Ne => "!=",
        }
    }

    /// Split a raw filter value into operator and operand
    ///
    /// The first embedded operator contained in the value wins and every
    /// occurrence of it is removed. Without one the operator is `=` and the
    /// value is used as is.
    pub fn extract(raw: &str) -> (Self, String) {
        Self::EMBEDDED
            .iter()
            .find(|op| raw.contains(op.as_sql()))
            .map(|op| (*op, raw.replace(op.as_sql(), "")))
            .unwrap_or_else(|| (Self::Eq, raw.to_string()))
    }
}

/// A single `field <op> value` test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    /// Raw value, possibly carrying an embedded operator (`">=18"`)
    pub value: String,
}

impl Condition {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Node of a filter tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterNode {
    Leaf(Condition),
    Group(FilterGroup),
}

impl FilterNode {
    pub fn leaf(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Leaf(Condition::new(field, value))
    }

    /// Number of conditions in the tree
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf(_) => 1,
            Self::Group(group) => group.leaf_count(),
        }
    }

    /// True when the tree holds no conditions at all
    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }
}

impl Default for FilterNode {
    fn default() -> Self {
        Self::Group(FilterGroup::new())
    }
}

impl From<FilterGroup> for FilterNode {
    fn from(group: FilterGroup) -> Self {
        Self::Group(group)
    }
}

impl From<Condition> for FilterNode {
    fn from(condition: Condition) -> Self {
        Self::Leaf(condition)
    }
}

/// Entry of a group: a nested node or a combinator switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEntry {
    Node(FilterNode),
    /// Rebinds the combinator for the entries that follow at this level
    Logic(Combinator),
}

/// Ordered entries joined by a combinator
///
/// Without an explicit combinator a group inherits the one active in its
/// parent where the group appears (AND at the root).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterGroup {
    combinator: Option<Combinator>,
    entries: Vec<FilterEntry>,
}

impl FilterGroup {
    /// Group that inherits its combinator
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_combinator(combinator: Combinator) -> Self {
        Self {
            combinator: Some(combinator),
            entries: Vec::new(),
        }
    }

    /// Group joined with AND
    pub fn all() -> Self {
        Self::with_combinator(Combinator::And)
    }

    /// Group joined with OR
    pub fn any() -> Self {
        Self::with_combinator(Combinator::Or)
    }

    /// Append a condition
    pub fn field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(FilterNode::leaf(field, value));
        self
    }

    /// Append a nested group
    pub fn group(mut self, group: FilterGroup) -> Self {
        self.push(FilterNode::Group(group));
        self
    }

    /// Switch the combinator for the entries appended after this one
    pub fn logic(mut self, combinator: Combinator) -> Self {
        self.entries.push(FilterEntry::Logic(combinator));
        self
    }

    pub fn push(&mut self, node: FilterNode) {
        self.entries.push(FilterEntry::Node(node));
    }

    pub fn push_logic(&mut self, combinator: Combinator) {
        self.entries.push(FilterEntry::Logic(combinator));
    }

    pub fn combinator(&self) -> Option<Combinator> {
        self.combinator
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    pub fn leaf_count(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                FilterEntry::Node(node) => node.leaf_count(),
                FilterEntry::Logic(_) => 0,
            })
            .sum()
    }
}

/// Compiled WHERE expression with aligned bind values and types
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    pub sql: String,
    pub values: Vec<String>,
    pub types: Vec<ColumnType>,
}

impl CompiledFilter {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Bind codes as one string (`"sid"`)
    pub fn type_codes(&self) -> String {
        self.types.iter().map(ColumnType::code).collect()
    }
}
