//! Database Connection Management
//!
//! This module provides the database connection and schema initialization
//! for the permission tree using libsql.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf (see [`TreeConfig`])
//! - **WAL mode**: Write-Ahead Logging so readers never block the single writer
//! - **Foreign keys**: Enabled on every connection for referential integrity
//! - **Busy timeout**: Writers wait for the write lock instead of failing at once
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions.** It applies the
//! per-connection PRAGMAs (busy timeout, foreign keys) that plain `connect()`
//! leaves at SQLite defaults.
//!
//! ```no_run
//! # use treeperm_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/treeperm.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::TreeConfig;
use crate::db::error::DatabaseError;
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing libsql connection and schema
///
/// # Examples
///
/// ```no_run
/// use treeperm_core::config::TreeConfig;
/// use treeperm_core::db::DatabaseService;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = TreeConfig::for_path("/path/to/treeperm.db");
///     let db_service = DatabaseService::with_config(&config).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    busy_timeout_ms: u64,

    wal: bool,
}

impl DatabaseService {
    /// Open a database with default settings
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::with_config(&TreeConfig::for_path(db_path)).await
    }

    /// Open (and if needed create) the database described by `config`
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - The configuration is invalid
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn with_config(config: &TreeConfig) -> Result<Self, DatabaseError> {
        config.validate()?;

        let db_path = config.database_path.clone();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout_ms: config.busy_timeout_ms,
            wal: config.wal,
        };

        service.initialize_schema().await?;

        tracing::info!(
            "Opened tree database at {} (busy_timeout={}ms, wal={})",
            service.db_path.display(),
            service.busy_timeout_ms,
            service.wal
        );

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    async fn execute_ddl(
        &self,
        conn: &libsql::Connection,
        label: &str,
        sql: &str,
    ) -> Result<(), DatabaseError> {
        conn.execute(sql, ()).await.map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create {}: {}", label, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent: every statement is `IF NOT EXISTS`.
    ///
    /// # Schema
    ///
    /// - `nodes`: the tree, one row per node, unique on `node_hash`
    /// - `roles`: role definitions, unique on `name`
    /// - `node_roles`: grants, unique on (node, role, user)
    async fn initialize_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        if self.wal {
            self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
                .await?;
        }

        // Disabled leaves keep their row with parent_id = NULL, so deleting a
        // parent row only ever detaches; it never cascades through the tree.
        self.execute_ddl(
            &conn,
            "nodes table",
            "CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                alias TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                parent_id TEXT,
                is_leaf INTEGER NOT NULL DEFAULT 0,
                disabled INTEGER NOT NULL DEFAULT 0,
                path TEXT NOT NULL DEFAULT '',
                depth INTEGER NOT NULL DEFAULT 1,
                node_hash TEXT NOT NULL UNIQUE,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (parent_id) REFERENCES nodes(id) ON DELETE SET NULL
            )",
        )
        .await?;

        self.execute_ddl(
            &conn,
            "roles table",
            "CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                alias TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                can_manage INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .await?;

        self.execute_ddl(
            &conn,
            "node_roles table",
            "CREATE TABLE IF NOT EXISTS node_roles (
                id TEXT PRIMARY KEY,
                node_id TEXT NOT NULL,
                role_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (node_id, role_id, user_id),
                FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE CASCADE,
                FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE
            )",
        )
        .await?;

        self.create_indexes(&conn).await?;

        Ok(())
    }

    async fn create_indexes(&self, conn: &libsql::Connection) -> Result<(), DatabaseError> {
        // Leaf lookup by name (key search, duplicate leaf check)
        self.execute_ddl(
            conn,
            "index 'idx_nodes_leaf_name'",
            "CREATE INDEX IF NOT EXISTS idx_nodes_leaf_name ON nodes(is_leaf, disabled, name)",
        )
        .await?;

        // Prefix and exact path queries
        self.execute_ddl(
            conn,
            "index 'idx_nodes_path'",
            "CREATE INDEX IF NOT EXISTS idx_nodes_path ON nodes(path)",
        )
        .await?;

        self.execute_ddl(
            conn,
            "index 'idx_nodes_parent'",
            "CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id)",
        )
        .await?;

        self.execute_ddl(
            conn,
            "index 'idx_node_roles_user'",
            "CREATE INDEX IF NOT EXISTS idx_node_roles_user ON node_roles(user_id, role_id)",
        )
        .await?;

        self.execute_ddl(
            conn,
            "index 'idx_node_roles_node'",
            "CREATE INDEX IF NOT EXISTS idx_node_roles_node ON node_roles(node_id)",
        )
        .await?;

        Ok(())
    }

    /// Get a connection without per-connection PRAGMAs
    ///
    /// Most code should use `connect_with_timeout()` instead.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::from)
    }

    /// Get a connection with busy timeout and foreign keys configured
    ///
    /// The busy timeout makes a writer wait for the write lock held by another
    /// transaction; only when the wait exceeds the timeout does the statement
    /// fail with `SQLITE_BUSY` (surfaced as [`DatabaseError::Busy`]).
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(
            &conn,
            &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms),
        )
        .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    pub fn busy_timeout_ms(&self) -> u64 {
        self.busy_timeout_ms
    }

    /// Flush the WAL into the main database file
    pub async fn checkpoint(&self) -> Result<(), DatabaseError> {
        if !self.wal {
            return Ok(());
        }
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_schema_initialization_is_idempotent() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("nested").join("tree.db");

        let first = DatabaseService::new(db_path.clone()).await?;
        drop(first);
        let second = DatabaseService::new(db_path.clone()).await?;

        let conn = second.connect_with_timeout().await?;
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                (),
            )
            .await?;
        let mut tables = Vec::new();
        while let Some(row) = rows.next().await? {
            tables.push(row.get::<String>(0)?);
        }

        assert!(tables.contains(&"nodes".to_string()));
        assert!(tables.contains(&"roles".to_string()));
        assert!(tables.contains(&"node_roles".to_string()));
        assert!(db_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_with_config_rejects_zero_timeout() -> anyhow::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut config = TreeConfig::for_path(temp_dir.path().join("tree.db"));
        config.busy_timeout_ms = 0;

        let result = DatabaseService::with_config(&config).await;
        assert!(matches!(result, Err(DatabaseError::InvalidConfig(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_checkpoint_after_writes() -> anyhow::Result<()> {
        use crate::db::{LibsqlStore, TreeStore, TxMode};
        use crate::models::Node;

        let temp_dir = TempDir::new()?;
        let db = DatabaseService::new(temp_dir.path().join("tree.db")).await?;
        assert_eq!(db.busy_timeout_ms(), 5000);

        let store = LibsqlStore::new(Arc::new(db));
        let mut tx = store.begin(TxMode::Write).await?;
        tx.insert_node(&Node::new("team", "", "", false).placed_under(None))
            .await?;
        tx.commit().await?;

        store.database().checkpoint().await?;
        Ok(())
    }
}
