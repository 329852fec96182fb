//! TreeStore Trait - Transactional Row Store Abstraction
//!
//! This module defines the `TreeStore` and `TreeTransaction` traits that sit
//! between the tree services (business rules) and the database backend.
//!
//! # Architecture
//!
//! - **Transaction-scoped**: every read and write goes through a
//!   `TreeTransaction`, so a multi-row mutation is either fully committed or
//!   fully rolled back
//! - **Write serialization**: `TxMode::Write` transactions take the store's
//!   write lock when they begin; overlapping writers wait (up to the busy
//!   timeout) instead of interleaving
//! - **No business rules**: implementations never derive paths or check
//!   tree invariants; they persist exactly what the services hand them
//!
//! # Examples
//!
//! ```rust,no_run
//! use treeperm_core::db::{DatabaseService, LibsqlStore, TreeStore, TxMode};
//! use treeperm_core::models::NodeQuery;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/tree.db")).await?);
//!     let store: Arc<dyn TreeStore> = Arc::new(LibsqlStore::new(db));
//!
//!     let mut tx = store.begin(TxMode::Read).await?;
//!     let roots = tx.find_nodes(&NodeQuery::enabled().with_is_root(true)).await?;
//!     tx.commit().await?;
//!
//!     println!("{} roots", roots.len());
//!     Ok(())
//! }
//! ```

use crate::db::DatabaseError;
use crate::models::{GrantDetail, GrantQuery, Node, NodeQuery, NodeRole, Role};
use async_trait::async_trait;

/// Locking mode requested when a transaction begins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Consistent snapshot; never blocks writers
    Read,
    /// Takes the write lock up front
    Write,
}

/// Source of transactions over the tree tables
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a store can be shared behind an
/// `Arc` by concurrent callers.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Begin a transaction
    ///
    /// # Errors
    ///
    /// [`DatabaseError::Busy`] when a `Write` transaction cannot obtain the
    /// write lock within the busy timeout.
    async fn begin(&self, mode: TxMode) -> Result<Box<dyn TreeTransaction>, DatabaseError>;
}

/// Row-level operations inside one open transaction
///
/// Dropping a transaction without calling [`commit`](TreeTransaction::commit)
/// discards its writes.
#[async_trait]
pub trait TreeTransaction: Send {
    //
    // NODES
    //

    async fn get_node(&mut self, id: &str) -> Result<Option<Node>, DatabaseError>;

    /// All nodes matching `query`, in the query's order
    async fn find_nodes(&mut self, query: &NodeQuery) -> Result<Vec<Node>, DatabaseError>;

    async fn count_nodes(&mut self, query: &NodeQuery) -> Result<u64, DatabaseError>;

    /// Insert a fully derived node row
    ///
    /// # Errors
    ///
    /// [`DatabaseError::ConstraintViolation`] on a duplicate id or `node_hash`.
    async fn insert_node(&mut self, node: &Node) -> Result<(), DatabaseError>;

    /// Overwrite a node row if its stored version still equals `expected_version`
    ///
    /// The stored version becomes `node.version`.
    ///
    /// # Errors
    ///
    /// [`DatabaseError::VersionConflict`] when the row was changed (or removed)
    /// since `expected_version` was read.
    async fn update_node(&mut self, node: &Node, expected_version: i64)
        -> Result<(), DatabaseError>;

    /// Hard-delete node rows, returning the number removed
    async fn delete_nodes(&mut self, ids: &[String]) -> Result<u64, DatabaseError>;

    //
    // ROLES
    //

    async fn get_role(&mut self, id: &str) -> Result<Option<Role>, DatabaseError>;

    async fn get_role_by_name(&mut self, name: &str) -> Result<Option<Role>, DatabaseError>;

    async fn list_roles(&mut self) -> Result<Vec<Role>, DatabaseError>;

    async fn insert_role(&mut self, role: &Role) -> Result<(), DatabaseError>;

    async fn update_role(&mut self, role: &Role) -> Result<u64, DatabaseError>;

    async fn delete_role(&mut self, id: &str) -> Result<u64, DatabaseError>;

    //
    // GRANTS
    //

    async fn insert_grant(&mut self, grant: &NodeRole) -> Result<(), DatabaseError>;

    /// Grants matching `query`, joined with their node and role
    async fn find_grants(&mut self, query: &GrantQuery) -> Result<Vec<GrantDetail>, DatabaseError>;

    /// Delete grants matching `query`, returning the number removed
    async fn delete_grants(&mut self, query: &GrantQuery) -> Result<u64, DatabaseError>;

    //
    // LIFECYCLE
    //

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}
