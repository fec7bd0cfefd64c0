//! Test doubles and fixtures shared by unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::catalog::{RawColumn, TableConstraints};
use crate::core::connection::{nested_transaction_error, Connection};
use crate::core::value::{Record, SqlValue};
use crate::error::{MapperError, Result};
use crate::schema::{ColumnDescriptor, TableDescriptor};

enum Reply {
    Rows(Vec<Record>),
    Affected(u64),
}

struct Scripted {
    needle: String,
    reply: Reply,
}

struct Failure {
    needle: String,
    nth: usize,
    seen: usize,
}

#[derive(Default)]
struct State {
    statements: Vec<(String, Vec<SqlValue>)>,
    replies: Vec<Scripted>,
    failures: Vec<Failure>,
    in_transaction: bool,
}

/// A `Connection` that records statements and answers from a script.
///
/// Replies are one-shot and matched by substring, first match wins. Queries
/// with no scripted reply return no rows; executes affect one row.
#[derive(Default)]
pub(crate) struct ScriptedConnection {
    state: Mutex<State>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, needle: &str, rows: Vec<Record>) {
        self.state.lock().unwrap().replies.push(Scripted {
            needle: needle.to_string(),
            reply: Reply::Rows(rows),
        });
    }

    pub fn affect(&self, needle: &str, count: u64) {
        self.state.lock().unwrap().replies.push(Scripted {
            needle: needle.to_string(),
            reply: Reply::Affected(count),
        });
    }

    /// Fail the `nth` (1-based) statement containing `needle`.
    pub fn fail_on(&self, needle: &str, nth: usize) {
        self.state.lock().unwrap().failures.push(Failure {
            needle: needle.to_string(),
            nth,
            seen: 0,
        });
    }

    pub fn statements(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .statements
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }

    pub fn params(&self, idx: usize) -> Vec<SqlValue> {
        self.state.lock().unwrap().statements[idx].1.clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.statements().iter().filter(|s| s.contains(needle)).count()
    }

    /// Index of the first statement containing `needle`.
    pub fn position(&self, needle: &str) -> Option<usize> {
        self.statements().iter().position(|s| s.contains(needle))
    }

    fn log(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Reply>> {
        let mut state = self.state.lock().unwrap();
        state.statements.push((sql.to_string(), params.to_vec()));

        for failure in state.failures.iter_mut() {
            if sql.contains(&failure.needle) {
                failure.seen += 1;
                if failure.seen == failure.nth {
                    return Err(MapperError::DataModel(format!(
                        "injected failure on: {}",
                        sql
                    )));
                }
            }
        }

        let reply = state
            .replies
            .iter()
            .position(|r| sql.contains(&r.needle))
            .map(|idx| state.replies.remove(idx).reply);
        Ok(reply)
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Record>> {
        Ok(match self.log(sql, params)? {
            Some(Reply::Rows(rows)) => rows,
            _ => Vec::new(),
        })
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        Ok(match self.log(sql, params)? {
            Some(Reply::Affected(count)) => count,
            Some(Reply::Rows(rows)) => rows.len() as u64,
            None => 1,
        })
    }

    async fn begin(&self) -> Result<()> {
        if self.in_transaction() {
            return Err(nested_transaction_error());
        }
        self.log("BEGIN", &[])?;
        self.state.lock().unwrap().in_transaction = true;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.state.lock().unwrap().in_transaction = false;
        self.log("COMMIT", &[])?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.state.lock().unwrap().in_transaction = false;
        self.log("ROLLBACK", &[])?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.state.lock().unwrap().in_transaction
    }
}

// ===== Descriptor fixtures =====

pub(crate) fn raw(name: &str, sql_type: &str, nullable: bool, default: Option<&str>) -> RawColumn {
    RawColumn {
        name: name.to_string(),
        sql_type: sql_type.to_string(),
        nullable,
        default: default.map(str::to_string),
        max_length: None,
        is_enum: false,
        is_identity: false,
    }
}

pub(crate) fn table(name: &str, pk: Option<&str>, unique: &[&str], columns: Vec<RawColumn>) -> TableDescriptor {
    let constraints = TableConstraints {
        primary_key: pk.map(str::to_string),
        unique_columns: unique.iter().map(|c| c.to_string()).collect(),
    };
    let columns = columns
        .into_iter()
        .map(|raw| ColumnDescriptor::from_catalog(raw, &constraints, None, "nextval").unwrap())
        .collect();
    TableDescriptor::new("public", name, columns, constraints.primary_key.clone()).unwrap()
}

pub(crate) fn administrators_table() -> TableDescriptor {
    table(
        "administrators",
        Some("id"),
        &["id", "username"],
        vec![
            raw("id", "integer", false, Some("nextval('administrators_id_seq'::regclass)")),
            raw("username", "character varying", false, None),
            raw("name", "character varying", true, None),
            raw("email", "character varying", true, None),
            raw("active", "boolean", false, Some("true")),
        ],
    )
}

pub(crate) fn roles_table() -> TableDescriptor {
    table(
        "roles",
        Some("id"),
        &["id", "role"],
        vec![
            raw("id", "integer", false, Some("nextval('roles_id_seq'::regclass)")),
            raw("role", "character varying", false, None),
        ],
    )
}

pub(crate) fn administrator_roles_table() -> TableDescriptor {
    table(
        "administrator_roles",
        None,
        &[],
        vec![
            raw("administrator_id", "integer", false, None),
            raw("role_id", "integer", false, None),
        ],
    )
}

pub(crate) fn permissions_table() -> TableDescriptor {
    table(
        "permissions",
        Some("id"),
        &["id", "title"],
        vec![
            raw("id", "integer", false, Some("nextval('permissions_id_seq'::regclass)")),
            raw("title", "character varying", false, None),
            raw("description", "text", true, None),
        ],
    )
}

pub(crate) fn roles_permissions_table() -> TableDescriptor {
    table(
        "roles_permissions",
        None,
        &[],
        vec![
            raw("role_id", "integer", false, None),
            raw("permission_id", "integer", false, None),
        ],
    )
}
