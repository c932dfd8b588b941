//! Live PostgreSQL inspection.
//!
//! One [`Inspector`] owns one connection to one database and is driven
//! strictly sequentially: capability probing, ranked statement
//! collection, safe plan collection and the table/index snapshots all
//! go through it, each individual query under its own short
//! `statement_timeout`. There is no retry at any level: a failed query
//! means "this data point is unavailable" and the run continues.

pub mod capabilities;
pub mod explain;
pub mod indexes;
pub mod queries;
pub mod statements;
pub mod tables;

use std::time::Duration;

use postgres::{Client, NoTls};
use tracing::debug;

/// Timeout for capability and metadata probes.
pub(crate) const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
/// Timeout for ranked-list fetches and snapshot queries.
pub(crate) const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for PostgreSQL collection.
#[derive(Debug)]
pub enum CollectError {
    /// Environment variable not set.
    EnvNotSet(String),
    /// Connection failed.
    ConnectionError(String),
    /// Query execution failed.
    QueryError(String),
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::EnvNotSet(var) => write!(f, "PostgreSQL: {} not set", var),
            CollectError::ConnectionError(msg) => write!(f, "PostgreSQL: {}", msg),
            CollectError::QueryError(msg) => write!(f, "PostgreSQL query error: {}", msg),
        }
    }
}

impl std::error::Error for CollectError {}

/// Minimal query surface needed by the safe plan executor.
///
/// The live [`Inspector`] implements it over the real connection;
/// tests drive the executor with a scripted fake instead.
pub trait PlanRunner {
    /// Executes a statement, discarding any result rows.
    fn execute(&mut self, sql: &str, timeout: Duration) -> Result<(), CollectError>;

    /// Executes a query whose result is a single text column per row
    /// (the shape EXPLAIN produces) and returns the rows as lines.
    fn query_lines(&mut self, sql: &str, timeout: Duration) -> Result<Vec<String>, CollectError>;
}

/// Connection to a single database under inspection.
///
/// Connects using standard environment variables:
/// - PGHOST (default: localhost)
/// - PGPORT (default: 5432)
/// - PGUSER (default: $USER)
/// - PGPASSWORD (default: empty)
/// - PGDATABASE (default: same as PGUSER)
pub struct Inspector {
    connection_string: String,
    pub(crate) client: Option<Client>,
    last_error: Option<String>,
}

impl Inspector {
    /// Creates an inspector from environment variables.
    ///
    /// Uses $USER as default if PGUSER is not set.
    pub fn from_env() -> Result<Self, CollectError> {
        let user = std::env::var("PGUSER")
            .or_else(|_| std::env::var("USER"))
            .map_err(|_| CollectError::EnvNotSet("PGUSER or USER".to_string()))?;

        let host = std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string());
        let port = std::env::var("PGPORT").unwrap_or_else(|_| "5432".to_string());
        let password = std::env::var("PGPASSWORD").unwrap_or_default();
        let database = std::env::var("PGDATABASE").unwrap_or_else(|_| user.clone());

        let connection_string = if password.is_empty() {
            format!(
                "host={} port={} user={} dbname={}",
                host, port, user, database
            )
        } else {
            format!(
                "host={} port={} user={} password={} dbname={}",
                host, port, user, password, database
            )
        };

        Ok(Self::with_connection_string(connection_string))
    }

    /// Creates an inspector with an explicit connection string.
    pub fn with_connection_string(connection_string: String) -> Self {
        Self {
            connection_string,
            client: None,
            last_error: None,
        }
    }

    /// Returns an inspector for another database on the same server.
    pub fn for_database(&self, datname: &str) -> Self {
        Self::with_connection_string(replace_dbname(&self.connection_string, datname))
    }

    /// Attempts to connect. Useful as a startup check before running
    /// the pipeline.
    pub fn try_connect(&mut self) -> Result<(), CollectError> {
        self.ensure_connected()
    }

    /// Returns the last error message, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn ensure_connected(&mut self) -> Result<(), CollectError> {
        if self.client.is_some() {
            return Ok(());
        }

        match Client::connect(&self.connection_string, NoTls) {
            Ok(client) => {
                self.client = Some(client);
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                let msg = format_postgres_error(&e);
                self.last_error = Some(msg.clone());
                Err(CollectError::ConnectionError(msg))
            }
        }
    }

    /// Runs a query under its own statement_timeout and returns rows.
    ///
    /// The timeout is reset afterwards even when the query fails; a bad
    /// query must not leak a shortened timeout into later calls.
    pub(crate) fn query_rows(
        &mut self,
        sql: &str,
        timeout: Duration,
    ) -> Result<Vec<postgres::Row>, CollectError> {
        self.ensure_connected()?;
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| CollectError::ConnectionError("not connected".to_string()))?;

        set_statement_timeout(client, timeout)?;
        let result = client.query(sql, &[]);
        reset_statement_timeout(client);

        result.map_err(|e| {
            let msg = format_postgres_error(&e);
            debug!(error = %msg, "query failed");
            CollectError::QueryError(msg)
        })
    }
}

impl PlanRunner for Inspector {
    fn execute(&mut self, sql: &str, timeout: Duration) -> Result<(), CollectError> {
        self.ensure_connected()?;
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| CollectError::ConnectionError("not connected".to_string()))?;

        set_statement_timeout(client, timeout)?;
        let result = client.batch_execute(sql);
        reset_statement_timeout(client);

        result.map_err(|e| CollectError::QueryError(format_postgres_error(&e)))
    }

    fn query_lines(&mut self, sql: &str, timeout: Duration) -> Result<Vec<String>, CollectError> {
        self.ensure_connected()?;
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| CollectError::ConnectionError("not connected".to_string()))?;

        set_statement_timeout(client, timeout)?;
        let result = client.simple_query(sql);
        reset_statement_timeout(client);

        let messages = result.map_err(|e| CollectError::QueryError(format_postgres_error(&e)))?;
        let mut lines = Vec::new();
        for message in messages {
            if let postgres::SimpleQueryMessage::Row(row) = message {
                lines.push(row.get(0).unwrap_or_default().to_string());
            }
        }
        Ok(lines)
    }
}

fn set_statement_timeout(client: &mut Client, timeout: Duration) -> Result<(), CollectError> {
    client
        .batch_execute(&format!("SET statement_timeout = {}", timeout.as_millis()))
        .map_err(|e| CollectError::QueryError(format_postgres_error(&e)))
}

fn reset_statement_timeout(client: &mut Client) {
    // Best effort: a failed reset means the connection is gone anyway.
    let _ = client.batch_execute("RESET statement_timeout");
}

/// Replaces the `dbname=xxx` parameter in a libpq-style connection string.
///
/// If the connection string contains `dbname=...`, it is replaced with the
/// new database name. If it does not contain `dbname=`, the parameter is
/// appended.
pub(crate) fn replace_dbname(connection_string: &str, new_db: &str) -> String {
    // libpq key=value format: tokens separated by spaces
    let mut found = false;
    let parts: Vec<String> = connection_string
        .split_whitespace()
        .map(|token| {
            if token.starts_with("dbname=") {
                found = true;
                format!("dbname={}", new_db)
            } else {
                token.to_string()
            }
        })
        .collect();

    if found {
        parts.join(" ")
    } else {
        format!("{} dbname={}", connection_string, new_db)
    }
}

/// Formats PostgreSQL error message for display.
pub(crate) fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else {
            msg
        }
    }
}
