//! `simpledb` - run SQL against MySQL through a SimpleDb connection pool
//!
//! Connection settings come from the settings file, then environment
//! variables, then flags, each overriding the previous.

mod logging;
mod output;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use simpledb_core::Value;
use simpledb_driver_mysql::DEFAULT_PORT;
use simpledb_query::SimpleDb;

use crate::logging::LogFormat;
use crate::settings::Settings;

#[derive(Debug, Parser)]
#[command(name = "simpledb", version, about = "Run SQL through a pooled MySQL connection")]
struct Cli {
    /// Settings file (defaults to <config dir>/simpledb/settings.toml)
    #[arg(long, env = "SIMPLEDB_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(flatten)]
    pool: PoolArgs,

    /// Log every statement and its parameters
    #[arg(long)]
    dev: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Console log format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct ConnectionArgs {
    #[arg(long, env = "SIMPLEDB_HOST")]
    host: Option<String>,

    #[arg(long, env = "SIMPLEDB_PORT")]
    port: Option<u16>,

    #[arg(short, long, env = "SIMPLEDB_DATABASE")]
    database: Option<String>,

    #[arg(short, long, env = "SIMPLEDB_USER")]
    user: Option<String>,

    #[arg(long, env = "SIMPLEDB_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Debug, Args)]
struct PoolArgs {
    /// Connections opened up front
    #[arg(long)]
    min_size: Option<usize>,

    /// Upper bound on open connections
    #[arg(long)]
    max_size: Option<usize>,

    /// How long to wait for a free connection
    #[arg(long)]
    acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a query and print its rows
    Query {
        sql: String,
        /// Positional parameter bound to the next `?`
        #[arg(short, long = "param")]
        params: Vec<String>,
        /// Print rows as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Run a statement and print the number of affected rows
    Exec {
        sql: String,
        #[arg(short, long = "param")]
        params: Vec<String>,
    },
    /// Run an INSERT and print the generated key
    Insert {
        sql: String,
        #[arg(short, long = "param")]
        params: Vec<String>,
    },
    /// Open the pool and print its statistics
    Ping,
}

impl Cli {
    fn apply_overrides(&self, settings: &mut Settings) {
        let conn = &mut settings.connection;
        if let Some(host) = &self.connection.host {
            conn.host = host.clone();
        }
        if let Some(port) = self.connection.port {
            conn.port = port;
        }
        if let Some(database) = &self.connection.database {
            conn.database = Some(database.clone());
        }
        if let Some(user) = &self.connection.user {
            conn.username = Some(user.clone());
        }
        if let Some(password) = &self.connection.password {
            conn.password = Some(password.clone());
        }

        let mut pool = settings.pool.clone();
        if let Some(min_size) = self.pool.min_size {
            pool = pool.with_min_size(min_size);
        }
        if let Some(max_size) = self.pool.max_size {
            pool = pool.with_max_size(max_size);
        }
        if let Some(timeout_ms) = self.pool.acquire_timeout_ms {
            pool = pool.with_acquire_timeout_ms(timeout_ms);
        }
        settings.pool = pool;

        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
        settings.dev_mode |= self.dev;
    }
}

fn bind(params: &[String]) -> Vec<Value> {
    params.iter().map(|p| Value::String(p.clone())).collect()
}

async fn run_command(db: &SimpleDb, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Query { sql, params, json } => {
            let result = db
                .gen_sql()
                .append(&sql, &bind(&params))
                .select_result()
                .await
                .context("query failed")?;
            if json {
                println!("{}", output::render_json(&result.rows)?);
            } else {
                println!("{}", output::render_table(&result));
            }
        }
        Command::Exec { sql, params } => {
            let affected = db.run(&sql, &bind(&params)).await.context("statement failed")?;
            println!("{} row(s) affected", affected);
        }
        Command::Insert { sql, params } => {
            let id = db
                .gen_sql()
                .append(&sql, &bind(&params))
                .insert()
                .await
                .context("insert failed")?;
            println!("inserted id {}", id);
        }
        Command::Ping => {
            let stats = db.pool().stats();
            println!(
                "ok: {} open, {} idle, {} in use",
                stats.total(),
                stats.idle(),
                stats.in_use()
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut settings);

    let log_config = if cli.verbose {
        settings.logging.clone().verbose()
    } else {
        settings.logging.clone()
    };
    let _log_guard = logging::init(&log_config)?;

    tracing::debug!(connection = ?settings.connection, pool = ?settings.pool, "starting");

    let db = SimpleDb::connect_mysql(settings.connection.clone(), settings.pool.clone())
        .await
        .with_context(|| {
            format!(
                "failed to connect to {}:{}",
                settings.connection.host,
                settings.connection.port_or(DEFAULT_PORT)
            )
        })?;
    db.set_dev_mode(settings.dev_mode);

    let outcome = run_command(&db, cli.command).await;

    let closed = db.close().await;
    tracing::debug!(closed, "connection pool shut down");
    outcome
}
