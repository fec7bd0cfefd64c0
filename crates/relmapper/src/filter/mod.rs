//! Filter expression parser.
//!
//! Parses the user-facing filter string `field:op:value,field:op:value` into
//! a [`FilterExpression`]. Fields resolve through a caller-supplied
//! whitelist mapping display names to column SQL; operators come from a fixed
//! set. Any error aborts the whole parse.
//!
//! ```text
//! username:LIKE:adm%,active:=:true,role:IN:editor|owner,email:IS:null
//! ```

use std::fmt;

use indexmap::IndexMap;

use crate::error::{MapperError, Result};

/// Display name to column SQL (e.g. `role` to `"roles"."role"`).
pub type FilterFields = IndexMap<String, String>;

/// Build a [`FilterFields`] whitelist from pairs.
pub fn filter_fields<'a>(pairs: impl IntoIterator<Item = (&'a str, String)>) -> FilterFields {
    pairs
        .into_iter()
        .map(|(name, sql)| (name.to_string(), sql))
        .collect()
}

/// Whitelisted comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
    NotLike,
    ILike,
    NotILike,
    Is,
    IsNot,
    In,
    NotIn,
}

impl Operator {
    /// Parse an operator token, case-insensitively.
    pub fn parse(token: &str) -> Option<Self> {
        let normalized = token
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        let op = match normalized.as_str() {
            "=" => Operator::Eq,
            "!=" | "<>" => Operator::NotEq,
            "<" => Operator::Lt,
            ">" => Operator::Gt,
            "<=" => Operator::Le,
            ">=" => Operator::Ge,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "ILIKE" => Operator::ILike,
            "NOT ILIKE" => Operator::NotILike,
            "IS" => Operator::Is,
            "IS NOT" => Operator::IsNot,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "<>",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::ILike => "ILIKE",
            Operator::NotILike => "NOT ILIKE",
            Operator::Is => "IS",
            Operator::IsNot => "IS NOT",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
        }
    }

    pub fn is_null_test(&self) -> bool {
        matches!(self, Operator::Is | Operator::IsNot)
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// The right-hand side of one comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    Null,
    Text(String),
    /// `IN` / `NOT IN` items.
    List(Vec<String>),
}

/// All comparisons on one column. They are OR'd together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterEntry {
    pub column: String,
    pub operators: Vec<Operator>,
    pub values: Vec<FilterValue>,
}

impl FilterEntry {
    pub fn new(column: impl Into<String>, operator: Operator, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            operators: vec![operator],
            values: vec![value],
        }
    }

    pub fn comparisons(&self) -> impl Iterator<Item = (&Operator, &FilterValue)> {
        self.operators.iter().zip(self.values.iter())
    }
}

/// A parsed filter: entries on distinct columns, AND'd together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterExpression {
    entries: Vec<FilterEntry>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add one comparison, merging into an existing entry on the same column.
    pub fn push(&mut self, column: &str, operator: Operator, value: FilterValue) {
        match self.entries.iter_mut().find(|e| e.column == column) {
            Some(entry) => {
                entry.operators.push(operator);
                entry.values.push(value);
            }
            None => self.entries.push(FilterEntry::new(column, operator, value)),
        }
    }

    /// Split into (matching, rest) by a predicate on the column SQL.
    pub fn partition<F>(&self, mut predicate: F) -> (FilterExpression, FilterExpression)
    where
        F: FnMut(&str) -> bool,
    {
        let (matching, rest): (Vec<_>, Vec<_>) = self
            .entries
            .iter()
            .cloned()
            .partition(|entry| predicate(&entry.column));
        (
            FilterExpression { entries: matching },
            FilterExpression { entries: rest },
        )
    }
}

/// Parse a filter string against a field whitelist.
///
/// An empty or whitespace-only string yields an empty expression.
pub fn parse(input: &str, fields: &FilterFields) -> Result<FilterExpression> {
    let mut expression = FilterExpression::new();
    if input.trim().is_empty() {
        return Ok(expression);
    }

    for segment in input.split(',') {
        let mut parts = segment.splitn(3, ':');
        let (field, op, value) = match (parts.next(), parts.next(), parts.next()) {
            (Some(field), Some(op), Some(value)) => (field.trim(), op.trim(), value.trim()),
            _ => {
                return Err(MapperError::filter(
                    segment.trim(),
                    "expected field:operator:value",
                ))
            }
        };

        if field.is_empty() {
            return Err(MapperError::filter(segment.trim(), "missing field name"));
        }

        let column = fields
            .get(field)
            .ok_or_else(|| MapperError::filter(field, "unknown field"))?;

        let operator = Operator::parse(op)
            .ok_or_else(|| MapperError::filter(field, format!("unknown operator '{}'", op)))?;

        let is_null = value.eq_ignore_ascii_case("null");
        let value = match (operator.is_null_test(), is_null) {
            (true, true) => FilterValue::Null,
            (true, false) => {
                return Err(MapperError::filter(
                    field,
                    format!("{} only accepts null", operator),
                ))
            }
            (false, true) => {
                return Err(MapperError::filter(
                    field,
                    format!("null is only valid with IS or IS NOT, not {}", operator),
                ))
            }
            (false, false) if operator.is_list() => {
                let items: Vec<String> = value.split('|').map(|s| s.trim().to_string()).collect();
                if items.iter().any(String::is_empty) {
                    return Err(MapperError::filter(
                        field,
                        format!("{} needs a |-separated list of values", operator),
                    ));
                }
                FilterValue::List(items)
            }
            (false, false) => FilterValue::Text(value.to_string()),
        };

        expression.push(column, operator, value);
    }

    Ok(expression)
}
