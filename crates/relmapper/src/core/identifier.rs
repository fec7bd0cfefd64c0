//! Identifier validation and quoting.
//!
//! Identifiers (schema, table, column names) cannot be bound as parameters,
//! so every one that reaches SQL text goes through [`quote_pg`]. Values never
//! do: they are always bound positionally.
//!
//! Caller-controlled fragments that are concatenated verbatim (ORDER BY
//! clauses, projection lists, whitelisted filter column SQL) are checked by
//! [`validate_fragment`] for statement separators and comment markers.

use crate::error::{MapperError, Result};

/// PostgreSQL truncates identifiers at 63 bytes.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier before it is quoted into SQL text.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MapperError::Schema("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(MapperError::Schema(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MapperError::Schema(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier, doubling embedded double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// `"schema"."table"`.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// `"table"."column"`.
pub fn column_ref(table: &str, column: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(table)?, quote_pg(column)?))
}

/// Validate a caller-supplied SQL fragment that will be concatenated verbatim.
///
/// Rejects statement separators, comment markers, and unbalanced quotes or
/// parentheses. Fragments are expected to be identifiers, qualified column
/// references, sort directions, and simple function calls.
pub fn validate_fragment(fragment: &str) -> Result<()> {
    if fragment.trim().is_empty() {
        return Err(MapperError::Validation("SQL fragment cannot be empty".into()));
    }

    if fragment.contains(';') || fragment.contains('\0') {
        return Err(MapperError::Validation(format!(
            "SQL fragment contains a statement separator: {:?}",
            fragment
        )));
    }

    if fragment.contains("--") || fragment.contains("/*") || fragment.contains("*/") {
        return Err(MapperError::Validation(format!(
            "SQL fragment contains comment markers: {:?}",
            fragment
        )));
    }

    if fragment.matches('\'').count() % 2 != 0 || fragment.matches('"').count() % 2 != 0 {
        return Err(MapperError::Validation(format!(
            "SQL fragment has unbalanced quotes: {:?}",
            fragment
        )));
    }

    let mut depth = 0i32;
    for c in fragment.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            break;
        }
    }
    if depth != 0 {
        return Err(MapperError::Validation(format!(
            "SQL fragment has unbalanced parentheses: {:?}",
            fragment
        )));
    }

    Ok(())
}

/// Validate an ORDER BY list: comma-separated expressions with an optional
/// `ASC`/`DESC` and `NULLS FIRST`/`NULLS LAST`.
pub fn validate_order_by(order_by: &str) -> Result<()> {
    validate_fragment(order_by)?;

    let lower = order_by.to_lowercase();
    for word in lower.split(|c: char| c.is_whitespace() || c == ',' || c == '(' || c == ')') {
        if matches!(
            word,
            "select" | "insert" | "update" | "delete" | "drop" | "union" | "into" | "exec" | "execute"
        ) {
            return Err(MapperError::Validation(format!(
                "ORDER BY contains a disallowed keyword '{}': {:?}",
                word, order_by
            )));
        }
    }

    Ok(())
}
