//! Business Services
//!
//! This module contains the core business logic services:
//!
//! - `TreeService` - Node lifecycle (create, update, move, remove, enable) and reads
//! - `PermissionResolver` - Granted paths, subtree scopes and manage checks
//! - `RoleService` - Role CRUD and (node, role, user) grants
//! - `SearchResolver` - Value search rules over a node set
//! - `TreeAssembler` - Nested tree reconstruction from flat rows
//!
//! Services coordinate between the database layer and application logic,
//! implementing the tree rules and keeping every mutation in one transaction.

pub mod error;
pub mod permission;
pub mod retry;
pub mod role_service;
pub mod search;
pub mod tree_assembler;
pub mod tree_service;

pub use error::{DuplicateKind, ParentProblem, TreeError};
pub use permission::{PathScope, PermissionResolver};
pub use retry::retry_on_conflict;
pub use role_service::RoleService;
pub use search::{SearchResolver, SearchResult, SearchRule, SearchStep};
pub use tree_assembler::{TreeAssembler, TreeEntry};
pub use tree_service::{RemoveOptions, TreeService};

