//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management ([`DatabaseService`])
//! - The transactional row-store abstraction ([`TreeStore`], [`TreeTransaction`])
//! - The libsql implementation of that abstraction ([`LibsqlStore`])
//!
//! # Architecture
//!
//! The services never issue SQL themselves. They open a transaction through
//! `TreeStore::begin`, read and write rows through `TreeTransaction`, and
//! commit or roll back as a unit.

mod database;
mod error;
mod libsql_store;
mod tree_store;

pub use database::DatabaseService;
pub use error::DatabaseError;
pub use libsql_store::{LibsqlStore, LibsqlTransaction};
pub use tree_store::{TreeStore, TreeTransaction, TxMode};
