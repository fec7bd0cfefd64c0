//! Column descriptors built from catalog metadata.

use serde::Serialize;

use crate::catalog::{RawColumn, TableConstraints};
use crate::core::value::SqlValue;
use crate::error::{MapperError, Result};
use crate::schema::numeric;

/// A parsed column default.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ColumnDefault {
    /// String, enum, or numeric literal with quoting and cast removed.
    Literal(String),
    Bool(bool),
    /// Sequence-function call, e.g. `nextval('roles_id_seq'::regclass)`.
    Sequence(String),
    /// Any other expression (`now()`, `CURRENT_TIMESTAMP`, ...), kept verbatim.
    Expression(String),
}

impl ColumnDefault {
    /// Parse a default expression as `pg_get_expr` renders it.
    ///
    /// Returns `None` for an explicit `NULL` default.
    pub fn parse(expr: &str, sequence_function: &str) -> Option<Self> {
        let expr = expr.trim();

        if expr.starts_with(sequence_function)
            && expr[sequence_function.len()..].trim_start().starts_with('(')
        {
            return Some(ColumnDefault::Sequence(expr.to_string()));
        }

        let uncast = strip_cast(expr);
        if uncast.eq_ignore_ascii_case("null") {
            return None;
        }
        if uncast.eq_ignore_ascii_case("true") {
            return Some(ColumnDefault::Bool(true));
        }
        if uncast.eq_ignore_ascii_case("false") {
            return Some(ColumnDefault::Bool(false));
        }

        if let Some(literal) = quoted_literal(expr) {
            return Some(match literal.to_ascii_lowercase().as_str() {
                "true" | "t" if expr.ends_with("::boolean") => ColumnDefault::Bool(true),
                "false" | "f" if expr.ends_with("::boolean") => ColumnDefault::Bool(false),
                _ => ColumnDefault::Literal(literal),
            });
        }

        let unparenthesized = uncast.trim_start_matches('(').trim_end_matches(')');
        if unparenthesized.parse::<f64>().is_ok() {
            return Some(ColumnDefault::Literal(unparenthesized.to_string()));
        }

        Some(ColumnDefault::Expression(expr.to_string()))
    }

    /// The default as display text (literal value or expression source).
    pub fn as_text(&self) -> String {
        match self {
            ColumnDefault::Literal(s) | ColumnDefault::Sequence(s) | ColumnDefault::Expression(s) => {
                s.clone()
            }
            ColumnDefault::Bool(b) => b.to_string(),
        }
    }
}

/// Drop a trailing `::type` cast that sits outside any quoted literal.
fn strip_cast(expr: &str) -> &str {
    let mut in_quotes = false;
    for (idx, c) in expr.char_indices() {
        match c {
            '\'' => in_quotes = !in_quotes,
            ':' if !in_quotes && expr[idx..].starts_with("::") => return expr[..idx].trim(),
            _ => {}
        }
    }
    expr
}

/// Extract `'...'` (with `''` unescaped) when the whole expression is a
/// single quoted literal, optionally followed by a cast.
fn quoted_literal(expr: &str) -> Option<String> {
    let body = expr.strip_prefix('\'')?;
    let mut literal = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if c == '\'' {
            if matches!(chars.peek(), Some((_, '\''))) {
                literal.push('\'');
                chars.next();
                continue;
            }
            let rest = body[idx + 1..].trim();
            return (rest.is_empty() || rest.starts_with("::")).then_some(literal);
        }
        literal.push(c);
    }
    None
}

/// Immutable metadata for one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    name: String,
    sql_type: String,
    nullable: bool,
    default: Option<ColumnDefault>,
    max_length: Option<u32>,
    is_primary_key: bool,
    is_unique: bool,
    enum_labels: Option<Vec<String>>,
    is_sequence_backed: bool,
}

impl ColumnDescriptor {
    /// Build a descriptor from catalog data.
    ///
    /// `enum_labels` must be supplied for enum columns. Fails for a nullable
    /// boolean column, and for an enum column without labels.
    pub fn from_catalog(
        raw: RawColumn,
        constraints: &TableConstraints,
        enum_labels: Option<Vec<String>>,
        sequence_function: &str,
    ) -> Result<Self> {
        if is_boolean_type(&raw.sql_type) && raw.nullable {
            return Err(MapperError::Schema(format!(
                "boolean column '{}' must be NOT NULL",
                raw.name
            )));
        }

        if raw.is_enum && enum_labels.as_ref().map_or(true, Vec::is_empty) {
            return Err(MapperError::Schema(format!(
                "enum column '{}' of type '{}' has no labels",
                raw.name, raw.sql_type
            )));
        }

        let default = raw
            .default
            .as_deref()
            .and_then(|expr| ColumnDefault::parse(expr, sequence_function));
        let is_sequence_backed =
            raw.is_identity || matches!(default, Some(ColumnDefault::Sequence(_)));

        Ok(Self {
            is_primary_key: constraints.primary_key.as_deref() == Some(raw.name.as_str()),
            is_unique: constraints.unique_columns.contains(&raw.name),
            enum_labels: if raw.is_enum { enum_labels } else { None },
            name: raw.name,
            sql_type: raw.sql_type,
            nullable: raw.nullable,
            default,
            max_length: raw.max_length,
            is_sequence_backed,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql_type(&self) -> &str {
        &self.sql_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn default(&self) -> Option<&ColumnDefault> {
        self.default.as_ref()
    }

    pub fn max_length(&self) -> Option<u32> {
        self.max_length
    }

    pub fn is_primary_key(&self) -> bool {
        self.is_primary_key
    }

    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    pub fn is_enum(&self) -> bool {
        self.enum_labels.is_some()
    }

    pub fn is_sequence_backed(&self) -> bool {
        self.is_sequence_backed
    }

    pub fn is_numeric_type(&self) -> bool {
        numeric::is_numeric_type(&self.sql_type)
    }

    pub fn is_integer_type(&self) -> bool {
        numeric::is_integer_type(&self.sql_type)
    }

    pub fn is_boolean(&self) -> bool {
        is_boolean_type(&self.sql_type)
    }

    /// Whether values of this column decode as read. Arrays, intervals,
    /// network addresses, money, ranges and the like are selected as `::text`.
    pub fn decodes_natively(&self) -> bool {
        self.is_enum() || is_natively_decoded_type(&self.sql_type)
    }

    /// Enum labels in declaration order; empty for non-enum columns.
    pub fn enum_options(&self) -> &[String] {
        self.enum_labels.as_deref().unwrap_or(&[])
    }

    /// The value a blank form field stands for in this column.
    pub fn blank_value(&self) -> SqlValue {
        if self.nullable {
            SqlValue::Null
        } else if self.is_numeric_type() {
            SqlValue::Int(0)
        } else if self.is_boolean() {
            SqlValue::Bool(false)
        } else {
            SqlValue::Text(String::new())
        }
    }

    /// Check a candidate value against nullability, numeric bounds, boolean
    /// literals, enum labels, and declared length.
    pub fn check_value(&self, value: &SqlValue) -> Result<()> {
        if value.is_null() {
            if self.nullable || self.is_sequence_backed || self.default.is_some() {
                return Ok(());
            }
            return Err(self.invalid("cannot be null"));
        }

        if let Some(numeric) = numeric::lookup(&self.sql_type) {
            if numeric.integer {
                let v = value
                    .as_i64()
                    .ok_or_else(|| self.invalid(format!("'{}' is not an integer", value)))?;
                let below = numeric.min.is_some_and(|min| v < min);
                let above = numeric.max.is_some_and(|max| v > max);
                if below || above {
                    return Err(self.invalid(format!(
                        "{} is out of range for {}",
                        v, numeric.name
                    )));
                }
            } else if value.as_decimal().is_none() {
                return Err(self.invalid(format!("'{}' is not a number", value)));
            }
            return Ok(());
        }

        if self.is_boolean() {
            return value
                .as_bool()
                .map(|_| ())
                .ok_or_else(|| self.invalid(format!("'{}' is not a boolean", value)));
        }

        if let Some(labels) = &self.enum_labels {
            let text = value.to_string();
            if !labels.contains(&text) {
                return Err(self.invalid(format!(
                    "'{}' is not one of: {}",
                    text,
                    labels.join(", ")
                )));
            }
        }

        if let Some(max) = self.max_length {
            let len = value.to_string().chars().count();
            if len > max as usize {
                return Err(self.invalid(format!(
                    "length {} exceeds maximum of {}",
                    len, max
                )));
            }
        }

        Ok(())
    }

    fn invalid(&self, message: impl std::fmt::Display) -> MapperError {
        MapperError::Validation(format!("{}: {}", self.name, message))
    }

    /// The shape handed to form and validation collaborators.
    pub fn metadata(&self) -> ColumnMetadata {
        ColumnMetadata {
            name: self.name.clone(),
            sql_type: self.sql_type.clone(),
            nullable: self.nullable,
            max_length: self.max_length,
            default: self.default.as_ref().map(ColumnDefault::as_text),
            is_primary_key: self.is_primary_key,
            is_unique: self.is_unique,
            enum_options: self.enum_options().to_vec(),
        }
    }
}

fn is_boolean_type(sql_type: &str) -> bool {
    matches!(sql_type.to_ascii_lowercase().as_str(), "boolean" | "bool")
}

fn is_natively_decoded_type(sql_type: &str) -> bool {
    matches!(
        sql_type.to_ascii_lowercase().as_str(),
        "boolean"
            | "bool"
            | "smallint"
            | "integer"
            | "bigint"
            | "oid"
            | "real"
            | "double precision"
            | "numeric"
            | "uuid"
            | "timestamp without time zone"
            | "timestamp with time zone"
            | "date"
            | "time without time zone"
            | "json"
            | "jsonb"
            | "text"
            | "character varying"
            | "character"
            | "name"
            | "citext"
            | "bytea"
    )
}

/// Column metadata exported to external form/validation code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub max_length: Option<u32>,
    pub default: Option<String>,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub enum_options: Vec<String>,
}
