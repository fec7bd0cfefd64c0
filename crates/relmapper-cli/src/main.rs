//! relmapper CLI - inspect mapped tables and entity lists from the terminal.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use relmapper::domain::{administrators, declared_fields, permissions, roles, FieldSpec};
use relmapper::filter::{self, FilterExpression, FilterValue};
use relmapper::{
    AdministratorMapper, Config, MapperError, PermissionMapper, PgConnection, RoleMapper,
    TableMapper,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "relmapper")]
#[command(about = "Schema-introspecting data mapper for PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the introspected column metadata of a table
    Describe {
        /// Table name in the configured schema
        table: String,
    },

    /// List administrators with their roles
    Administrators {
        #[command(flatten)]
        list: ListArgs,
    },

    /// List permissions with the roles granted them
    Permissions {
        #[command(flatten)]
        list: ListArgs,
    },

    /// List roles
    Roles {
        #[command(flatten)]
        list: ListArgs,
    },

    /// Parse a filter expression without touching the database
    CheckFilter {
        /// Entity whose filter fields apply
        #[arg(value_enum)]
        entity: EntityKind,

        /// Filter expression, e.g. "username:LIKE:a%,role:=:editor"
        expression: String,
    },

    /// Test the database connection
    HealthCheck,
}

#[derive(clap::Args)]
struct ListArgs {
    /// Filter expression: field:operator:value[,field:operator:value...]
    #[arg(long, default_value = "")]
    filter: String,

    /// ORDER BY clause, e.g. "\"administrators\".\"username\" DESC"
    #[arg(long)]
    order_by: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum EntityKind {
    Administrators,
    Permissions,
    Roles,
}

impl EntityKind {
    fn fields(self) -> &'static [FieldSpec] {
        match self {
            EntityKind::Administrators => administrators::FILTER_FIELDS,
            EntityKind::Permissions => permissions::FILTER_FIELDS,
            EntityKind::Roles => roles::FILTER_FIELDS,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MapperError> {
    let cli = Cli::parse();

    // Offline: no config, no logging noise on stdout
    if let Commands::CheckFilter { entity, expression } = &cli.command {
        let fields = declared_fields(entity.fields())?;
        let parsed = filter::parse(expression, &fields)?;
        print_filter(&parsed, cli.output_json)?;
        return Ok(());
    }

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MapperError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let conn = Arc::new(PgConnection::connect(&config.database).await?);
    let schema = config.database.schema.as_str();

    match cli.command {
        Commands::CheckFilter { .. } => unreachable!(), // Handled above

        Commands::Describe { table } => {
            let mapper = TableMapper::load(conn, schema, &table, &config.mapper).await?;
            let metadata = mapper.descriptor().column_metadata();
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            } else {
                println!("Table {}.{}:", schema, table);
                for column in &metadata {
                    println!(
                        "  {:<24} {:<28} {}{}{}",
                        column.name,
                        column.sql_type,
                        if column.nullable { "NULL" } else { "NOT NULL" },
                        if column.is_primary_key { " PK" } else { "" },
                        if column.is_unique { " UNIQUE" } else { "" },
                    );
                }
            }
        }

        Commands::Administrators { list } => {
            let mapper = AdministratorMapper::load(conn, schema, &config.mapper).await?;
            let view = mapper
                .list_view(&list.filter, list.order_by.as_deref(), None)
                .await?;
            print_list(&view.items, view.notice.as_deref(), cli.output_json, |admin| {
                let roles: Vec<&str> = admin.roles.iter().map(|r| r.role.as_str()).collect();
                format!("{:>6}  {:<24} [{}]", admin.id, admin.username, roles.join(", "))
            })?;
        }

        Commands::Permissions { list } => {
            let mapper = PermissionMapper::load(conn, schema, &config.mapper).await?;
            let view = mapper
                .list_view(&list.filter, list.order_by.as_deref())
                .await?;
            print_list(&view.items, view.notice.as_deref(), cli.output_json, |permission| {
                let roles: Vec<&str> = permission.roles.iter().map(|r| r.role.as_str()).collect();
                format!("{:>6}  {:<32} [{}]", permission.id, permission.title, roles.join(", "))
            })?;
        }

        Commands::Roles { list } => {
            let mapper = RoleMapper::load(conn, schema, &config.mapper).await?;
            let view = mapper
                .list_view(&list.filter, list.order_by.as_deref())
                .await?;
            print_list(&view.items, view.notice.as_deref(), cli.output_json, |role| {
                format!("{:>6}  {}", role.id, role.role)
            })?;
        }

        Commands::HealthCheck => {
            let version = conn.server_version().await?;
            if cli.output_json {
                let result = json!({
                    "healthy": true,
                    "host": config.database.host,
                    "database": config.database.database,
                    "server_version": version,
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  PostgreSQL {}:{}/{}: OK",
                    config.database.host, config.database.port, config.database.database
                );
                println!("  Server: {}", version);
            }
        }
    }

    Ok(())
}

fn print_list<T: Serialize>(
    items: &[T],
    notice: Option<&str>,
    as_json: bool,
    line: impl Fn(&T) -> String,
) -> Result<(), MapperError> {
    if as_json {
        let result = json!({ "items": items, "notice": notice });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if let Some(notice) = notice {
        eprintln!("{}", notice);
    }
    for item in items {
        println!("{}", line(item));
    }
    println!("{} row(s)", items.len());
    Ok(())
}

fn print_filter(parsed: &FilterExpression, as_json: bool) -> Result<(), MapperError> {
    if as_json {
        let entries: Vec<_> = parsed
            .entries()
            .iter()
            .map(|entry| {
                let comparisons: Vec<_> = entry
                    .comparisons()
                    .map(|(operator, value)| {
                        json!({ "operator": operator.as_sql(), "value": value_json(value) })
                    })
                    .collect();
                json!({ "column": entry.column, "comparisons": comparisons })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if parsed.is_empty() {
        println!("(empty filter)");
    }
    for entry in parsed.entries() {
        let comparisons: Vec<String> = entry
            .comparisons()
            .map(|(operator, value)| format!("{} {} {}", entry.column, operator, value_text(value)))
            .collect();
        println!("{}", comparisons.join(" OR "));
    }
    Ok(())
}

fn value_text(value: &FilterValue) -> String {
    match value {
        FilterValue::Null => "NULL".to_string(),
        FilterValue::Text(text) => format!("'{}'", text),
        FilterValue::List(items) => {
            let quoted: Vec<String> = items.iter().map(|item| format!("'{}'", item)).collect();
            format!("({})", quoted.join(", "))
        }
    }
}

fn value_json(value: &FilterValue) -> serde_json::Value {
    match value {
        FilterValue::Null => serde_json::Value::Null,
        FilterValue::Text(text) => json!(text),
        FilterValue::List(items) => json!(items),
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}
