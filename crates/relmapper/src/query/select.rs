//! SELECT builder.

use crate::core::identifier::{validate_fragment, validate_order_by};
use crate::core::value::SqlValue;
use crate::error::Result;
use crate::filter::{FilterEntry, FilterExpression, FilterValue, Operator};
use crate::query::builder::QueryBuilder;

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Entry(FilterEntry),
    Equals { column: String, value: SqlValue },
    InSubquery { column: String, subquery: Box<SelectBuilder> },
}

/// Builds `SELECT <columns> FROM <source> [WHERE ...] [ORDER BY ...] [LIMIT $n]`.
///
/// The source, column list, and ORDER BY are caller-controlled SQL; every
/// filter value is bound as a parameter. Conditions on different columns are
/// AND'd; comparisons within one filter entry are OR'd.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectBuilder {
    columns: String,
    from: String,
    conditions: Vec<Condition>,
    order_by: Option<String>,
    limit: Option<u32>,
}

impl SelectBuilder {
    /// `from` is a quoted table name or join expression.
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            columns: "*".to_string(),
            from: from.into(),
            conditions: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    /// Add every entry of a parsed filter.
    #[must_use]
    pub fn filter(mut self, filter: &FilterExpression) -> Self {
        self.conditions
            .extend(filter.entries().iter().cloned().map(Condition::Entry));
        self
    }

    #[must_use]
    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.conditions.push(Condition::Equals {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    /// `<column> IN (<subquery>)`, with the subquery's parameters renumbered
    /// into this statement.
    #[must_use]
    pub fn where_in_subquery(mut self, column: impl Into<String>, subquery: SelectBuilder) -> Self {
        self.conditions.push(Condition::InSubquery {
            column: column.into(),
            subquery: Box::new(subquery),
        });
        self
    }

    #[must_use]
    pub fn order_by(mut self, order_by: Option<&str>) -> Self {
        self.order_by = order_by.map(str::to_string);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    /// Render into a fresh [`QueryBuilder`].
    pub fn build(&self) -> Result<QueryBuilder> {
        let mut query = QueryBuilder::default();
        self.render(&mut query)?;
        Ok(query)
    }

    fn render(&self, query: &mut QueryBuilder) -> Result<()> {
        if self.columns != "*" {
            validate_fragment(&self.columns)?;
        }
        query.push_sql(&format!("SELECT {} FROM {}", self.columns, self.from));

        for (idx, condition) in self.conditions.iter().enumerate() {
            query.push_sql(if idx == 0 { " WHERE " } else { " AND " });
            match condition {
                Condition::Entry(entry) => render_entry(entry, query)?,
                Condition::Equals { column, value } => {
                    query.add(&format!("{} = ", column), Some(value.clone()));
                }
                Condition::InSubquery { column, subquery } => {
                    query.push_sql(&format!("{} IN (", column));
                    subquery.render(query)?;
                    query.push_sql(")");
                }
            }
        }

        if let Some(order_by) = &self.order_by {
            validate_order_by(order_by)?;
            query.push_sql(&format!(" ORDER BY {}", order_by));
        }

        if let Some(limit) = self.limit {
            query.add(" LIMIT ", Some(SqlValue::Int(limit.into())));
        }

        Ok(())
    }
}

fn render_entry(entry: &FilterEntry, query: &mut QueryBuilder) -> Result<()> {
    validate_fragment(&entry.column)?;
    let grouped = entry.operators.len() > 1;
    if grouped {
        query.push_sql("(");
    }
    for (idx, (operator, value)) in entry.comparisons().enumerate() {
        if idx > 0 {
            query.push_sql(" OR ");
        }
        render_comparison(&entry.column, *operator, value, query);
    }
    if grouped {
        query.push_sql(")");
    }
    Ok(())
}

fn render_comparison(column: &str, operator: Operator, value: &FilterValue, query: &mut QueryBuilder) {
    match value {
        FilterValue::Null => {
            query.push_sql(&format!("{} {} NULL", column, operator));
        }
        FilterValue::List(items) => {
            let placeholders: Vec<String> = items
                .iter()
                .map(|item| query.add_param(SqlValue::from(item.as_str())))
                .collect();
            query.push_sql(&format!(
                "{} {} ({})",
                column,
                operator,
                placeholders.join(", ")
            ));
        }
        FilterValue::Text(text) => {
            query.add(
                &format!("{} {} ", column, operator),
                Some(SqlValue::from(text.as_str())),
            );
        }
    }
}
