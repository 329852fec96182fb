//! TreePerm Core
//!
//! This crate provides a hierarchical node tree with role grants that are
//! inherited down the tree, persisted in an embedded libsql database.
//!
//! # Architecture
//!
//! - **Materialized paths**: every enabled node stores its dot-delimited path
//!   and depth, so subtree queries are prefix filters
//! - **Disabled leaves**: removing a leaf detaches and disables it instead of
//!   deleting it, so it can be re-enabled under a new parent
//! - **Path-based inheritance**: a grant at a node covers its whole subtree;
//!   nothing is copied down the tree
//! - **libsql**: embedded SQLite-compatible store, one transaction per operation
//!
//! # Modules
//!
//! - [`models`] - Data structures (Node, Role, NodeRole, queries)
//! - [`path_codec`] - Pure path derivation and comparison helpers
//! - [`services`] - Business services (TreeService, PermissionResolver, RoleService)
//! - [`db`] - Database layer with libsql integration
//! - [`config`] - Store configuration

pub mod config;
pub mod db;
pub mod models;
pub mod path_codec;
pub mod services;

// Re-export commonly used types
pub use config::TreeConfig;
pub use models::*;
pub use path_codec::PathCodec;
pub use services::*;
