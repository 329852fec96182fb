//! Service Layer Error Types
//!
//! This module defines error types for tree operations. Every rule violation
//! has its own variant; raw store errors never reach callers unclassified.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use std::fmt;
use thiserror::Error;

/// Why a parent reference was rejected during node creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentProblem {
    NotFound,
    Leaf,
    Disabled,
}

impl fmt::Display for ParentProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::Leaf => write!(f, "is a leaf node"),
            Self::Disabled => write!(f, "is disabled"),
        }
    }
}

/// Which uniqueness rule a new or moved node would break
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    /// An enabled leaf already uses this name
    LeafName,
    /// An enabled node already lives at this path
    Path,
}

impl fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeafName => write!(f, "leaf name"),
            Self::Path => write!(f, "path"),
        }
    }
}

/// Tree operation errors
#[derive(Error, Debug)]
pub enum TreeError {
    /// A leaf node was requested without a parent
    #[error("Leaf node '{name}' cannot be a root")]
    InvalidTree { name: String },

    #[error("Invalid parent {parent}: {reason}")]
    InvalidParent {
        parent: String,
        reason: ParentProblem,
    },

    #[error("Duplicate node: {kind} '{value}' already exists")]
    DuplicateNode { kind: DuplicateKind, value: String },

    /// Leaf identity is its name
    #[error("Leaf node '{name}' cannot be renamed")]
    ImmutableName { name: String },

    #[error("Node {node_id} cannot become a child of itself or of its own descendant")]
    SelfParent { node_id: String },

    #[error("Node '{path}' has {children} children; removal requires cascading")]
    HasChildren { path: String, children: u64 },

    #[error("Node {node_id} is already disabled")]
    AlreadyDisabled { node_id: String },

    #[error("Leaf node '{name}' is not disabled")]
    NotDisabled { name: String },

    #[error("Enabling leaf node '{name}' requires an existing parent")]
    MissingParent { name: String },

    #[error("Parent not found: {reference}")]
    ParentNotFound { reference: String },

    #[error("Leaf node '{path}' cannot be used as a parent")]
    NotAllowedAsParent { path: String },

    #[error("Node {node_id} is disabled")]
    DisabledNode { node_id: String },

    /// Lost a write race; the caller may retry
    #[error("Concurrent modification: {context}")]
    ConcurrentModification { context: String },

    #[error("Node not found: {reference}")]
    NodeNotFound { reference: String },

    #[error("Role not found: {reference}")]
    RoleNotFound { reference: String },

    #[error("Role '{name}' already exists")]
    DuplicateRole { name: String },

    #[error("User {user_id} already holds role {role_id} at node {node_id}")]
    DuplicateGrant {
        node_id: String,
        role_id: String,
        user_id: String,
    },

    #[error("Grant not found: {id}")]
    GrantNotFound { id: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database operation failed: {0}")]
    Database(#[source] DatabaseError),
}

impl From<DatabaseError> for TreeError {
    fn from(err: DatabaseError) -> Self {
        if err.is_conflict() {
            Self::ConcurrentModification {
                context: err.to_string(),
            }
        } else {
            Self::Database(err)
        }
    }
}

impl TreeError {
    pub fn invalid_tree(name: impl Into<String>) -> Self {
        Self::InvalidTree { name: name.into() }
    }

    pub fn invalid_parent(parent: impl fmt::Display, reason: ParentProblem) -> Self {
        Self::InvalidParent {
            parent: parent.to_string(),
            reason,
        }
    }

    pub fn duplicate(kind: DuplicateKind, value: impl Into<String>) -> Self {
        Self::DuplicateNode {
            kind,
            value: value.into(),
        }
    }

    pub fn immutable_name(name: impl Into<String>) -> Self {
        Self::ImmutableName { name: name.into() }
    }

    pub fn self_parent(node_id: impl Into<String>) -> Self {
        Self::SelfParent {
            node_id: node_id.into(),
        }
    }

    pub fn has_children(path: impl Into<String>, children: u64) -> Self {
        Self::HasChildren {
            path: path.into(),
            children,
        }
    }

    pub fn already_disabled(node_id: impl Into<String>) -> Self {
        Self::AlreadyDisabled {
            node_id: node_id.into(),
        }
    }

    pub fn not_disabled(name: impl Into<String>) -> Self {
        Self::NotDisabled { name: name.into() }
    }

    pub fn missing_parent(name: impl Into<String>) -> Self {
        Self::MissingParent { name: name.into() }
    }

    pub fn parent_not_found(reference: impl fmt::Display) -> Self {
        Self::ParentNotFound {
            reference: reference.to_string(),
        }
    }

    pub fn not_allowed_as_parent(path: impl Into<String>) -> Self {
        Self::NotAllowedAsParent { path: path.into() }
    }

    pub fn disabled_node(node_id: impl Into<String>) -> Self {
        Self::DisabledNode {
            node_id: node_id.into(),
        }
    }

    pub fn concurrent_modification(context: impl Into<String>) -> Self {
        Self::ConcurrentModification {
            context: context.into(),
        }
    }

    pub fn node_not_found(reference: impl fmt::Display) -> Self {
        Self::NodeNotFound {
            reference: reference.to_string(),
        }
    }

    pub fn role_not_found(reference: impl fmt::Display) -> Self {
        Self::RoleNotFound {
            reference: reference.to_string(),
        }
    }

    pub fn duplicate_role(name: impl Into<String>) -> Self {
        Self::DuplicateRole { name: name.into() }
    }

    pub fn grant_not_found(id: impl Into<String>) -> Self {
        Self::GrantNotFound { id: id.into() }
    }

    /// `true` only for write conflicts a caller can retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}
