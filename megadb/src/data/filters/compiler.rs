//! Filter compiler
//!
//! Turns a [`FilterNode`] tree into a WHERE expression with `?` placeholders
//! plus bind values and types in placeholder order.
//!
//! Separator rule: a combinator is written only between two entries that both
//! produce SQL, using the combinator active when the later one is reached.
//! `Logic` entries and empty groups produce no SQL, so they can never leave a
//! dangling or doubled separator behind.

use crate::data::catalog::ColumnTypes;
use crate::data::error::DbError;

use super::types::{
    Combinator, CompiledFilter, Condition, FilterEntry, FilterGroup, FilterNode, Operator,
};

/// Compiled SQL of one group and how many entries produced it
struct Fragment {
    sql: String,
    terms: usize,
}

/// Compile a filter tree against the column types of its table
///
/// Fails with [`DbError::UnknownColumn`] when a condition names a column
/// missing from `types`. An empty tree compiles to an empty expression.
pub fn compile(filter: &FilterNode, types: &ColumnTypes) -> Result<CompiledFilter, DbError> {
    let mut compiled = CompiledFilter::default();
    let sql = match filter {
        FilterNode::Leaf(condition) => compile_condition(condition, types, &mut compiled)?,
        FilterNode::Group(group) => {
            compile_group(group, Combinator::default(), types, &mut compiled)?.sql
        }
    };
    compiled.sql = sql;

    tracing::trace!(
        sql = %compiled.sql,
        types = %compiled.type_codes(),
        "Compiled filter"
    );
    Ok(compiled)
}

fn compile_group(
    group: &FilterGroup,
    inherited: Combinator,
    types: &ColumnTypes,
    params: &mut CompiledFilter,
) -> Result<Fragment, DbError> {
    let mut active = group.combinator().unwrap_or(inherited);
    let mut sql = String::new();
    let mut terms = 0;

    for entry in group.entries() {
        let part = match entry {
            FilterEntry::Logic(combinator) => {
                active = *combinator;
                continue;
            }
            FilterEntry::Node(FilterNode::Leaf(condition)) => {
                compile_condition(condition, types, params)?
            }
            FilterEntry::Node(FilterNode::Group(nested)) => {
                let inner = compile_group(nested, active, types, params)?;
                match inner.terms {
                    0 => continue,
                    1 => inner.sql,
                    _ => format!("({})", inner.sql),
                }
            }
        };

        if terms > 0 {
            sql.push(' ');
            sql.push_str(active.as_sql());
            sql.push(' ');
        }
        sql.push_str(&part);
        terms += 1;
    }

    Ok(Fragment { sql, terms })
}

fn compile_condition(
    condition: &Condition,
    types: &ColumnTypes,
    params: &mut CompiledFilter,
) -> Result<String, DbError> {
    let ty = types
        .get(&condition.field)
        .ok_or_else(|| DbError::unknown_column(&condition.field))?;
    let (operator, operand) = Operator::extract(&condition.value);

    params.values.push(operand);
    params.types.push(ty);
    Ok(format!("{}{}?", condition.field, operator.as_sql()))
}
