//! Fixed numeric type table.
//!
//! Drives value bounds checks and blank-input coercion. It is not read from
//! the catalog.

/// One numeric type name with its integer range, when it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericType {
    pub name: &'static str,
    pub integer: bool,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

const fn integer(name: &'static str, min: i64, max: i64) -> NumericType {
    NumericType {
        name,
        integer: true,
        min: Some(min),
        max: Some(max),
    }
}

const fn unbounded(name: &'static str) -> NumericType {
    NumericType {
        name,
        integer: false,
        min: None,
        max: None,
    }
}

pub const NUMERIC_TYPES: &[NumericType] = &[
    integer("smallint", i16::MIN as i64, i16::MAX as i64),
    integer("int2", i16::MIN as i64, i16::MAX as i64),
    integer("smallserial", 1, i16::MAX as i64),
    integer("integer", i32::MIN as i64, i32::MAX as i64),
    integer("int", i32::MIN as i64, i32::MAX as i64),
    integer("int4", i32::MIN as i64, i32::MAX as i64),
    integer("serial", 1, i32::MAX as i64),
    integer("bigint", i64::MIN, i64::MAX),
    integer("int8", i64::MIN, i64::MAX),
    integer("bigserial", 1, i64::MAX),
    unbounded("numeric"),
    unbounded("decimal"),
    unbounded("real"),
    unbounded("float4"),
    unbounded("double precision"),
    unbounded("float8"),
];

/// Look up a type name, ignoring case and any `(precision, scale)` suffix.
pub fn lookup(sql_type: &str) -> Option<&'static NumericType> {
    let base = sql_type
        .split('(')
        .next()
        .unwrap_or(sql_type)
        .trim()
        .to_ascii_lowercase();
    NUMERIC_TYPES.iter().find(|t| t.name == base)
}

pub fn is_numeric_type(sql_type: &str) -> bool {
    lookup(sql_type).is_some()
}

pub fn is_integer_type(sql_type: &str) -> bool {
    lookup(sql_type).is_some_and(|t| t.integer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_strips_modifiers() {
        assert_eq!(lookup("numeric(10,2)").map(|t| t.name), Some("numeric"));
        assert_eq!(lookup("INTEGER").map(|t| t.name), Some("integer"));
        assert!(lookup("character varying").is_none());
    }

    #[test]
    fn test_integer_bounds() {
        let smallint = lookup("smallint").unwrap();
        assert_eq!(smallint.min, Some(-32768));
        assert_eq!(smallint.max, Some(32767));
        assert_eq!(lookup("serial").unwrap().min, Some(1));
    }

    #[test]
    fn test_numeric_vs_integer() {
        assert!(is_integer_type("bigint"));
        assert!(is_numeric_type("bigint"));
        assert!(is_numeric_type("double precision"));
        assert!(!is_integer_type("double precision"));
        assert!(!is_numeric_type("boolean"));
    }
}
