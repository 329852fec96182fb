//! Data Models
//!
//! This module contains the core data structures of the permission tree:
//!
//! - `Node` - A named position in the tree, addressed by materialized path
//! - `Role` - A named capability set that can be granted at a node
//! - `NodeRole` - A (node, role, user) grant
//!
//! Request types (`NodeQuery`, `NodeUpdate`, `GrantQuery`, ...) are explicit
//! typed structures; derived columns can never be written through them.

mod node;
mod role;

pub use node::{
    validate_name, NewNode, Node, NodeOrder, NodeQuery, NodeRef, NodeUpdate, ValidationError,
    MAX_ALIAS_LENGTH, MAX_DESCRIPTION_LENGTH,
};
pub use role::{GrantDetail, GrantQuery, NodeRole, Role, RoleUpdate};
