//! Node Data Structures
//!
//! This module defines the `Node` row of the tree table and the request types
//! that operate on it.
//!
//! # Architecture
//!
//! - **Materialized path**: every enabled node stores its full dot-delimited
//!   ancestry in `path`, so subtree queries are prefix matches, not recursive joins
//! - **Derived columns**: `path`, `depth` and `node_hash` are never assigned from
//!   caller input; they are produced by [`crate::path_codec::PathCodec`]
//! - **Leaf ("key") nodes**: cannot have children, their name is globally unique
//!   among enabled leaves, and removal disables them instead of deleting
//!
//! # Examples
//!
//! ```rust
//! use treeperm_core::models::{Node, NodeQuery};
//!
//! let team = Node::new("team", "Team", "", false);
//! assert!(team.is_root());
//!
//! let query = NodeQuery::new().with_is_leaf(true).with_name_contains("svc");
//! assert!(!query.matches(&team));
//! ```

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;
use uuid::Uuid;

use crate::path_codec::{DerivedPath, PathCodec};

/// Maximum alias length (characters)
pub const MAX_ALIAS_LENGTH: usize = 64;

/// Maximum description length (characters)
pub const MAX_DESCRIPTION_LENGTH: usize = 1024;

/// Validation errors for node and role attributes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid {field} '{value}': use 2-64 lowercase letters, digits, '-' or '_', starting with a letter and ending with a letter or digit")]
    InvalidName { field: &'static str, value: String },

    #[error("{field} exceeds {max} characters (got {len})")]
    TooLong {
        field: &'static str,
        max: usize,
        len: usize,
    },

    #[error("Node '{0}' cannot be its own parent")]
    SelfReference(String),

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Node and role names: 2-64 chars, lowercase identifier with `-` or `_`
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_-]{0,62}[a-z0-9]$").expect("valid name pattern"));

/// Check a node or role name against the identifier pattern
pub fn validate_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if NAME_RE.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidName {
            field,
            value: value.to_string(),
        })
    }
}

pub(crate) fn validate_length(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len > max {
        return Err(ValidationError::TooLong { field, max, len });
    }
    Ok(())
}

/// A single row of the tree table.
///
/// # Fields
///
/// - `id`: Stable identity (UUID), independent of position in the tree
/// - `name`: Local path segment; immutable once the node is a leaf
/// - `parent_id`: `None` for roots and for disabled leaves
/// - `is_leaf`: Marks a "key" node that can never have children
/// - `disabled`: Soft-removed leaf, kept so it can be re-enabled later
/// - `path`, `depth`, `node_hash`: Derived, see [`PathCodec::derive`]
/// - `version`: Bumped on every persisted change (optimistic concurrency)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub alias: String,

    #[serde(default)]
    pub description: String,

    pub parent_id: Option<String>,

    #[serde(default)]
    pub is_leaf: bool,

    #[serde(default)]
    pub disabled: bool,

    /// Full dot-path from the root; empty for disabled nodes
    #[serde(default)]
    pub path: String,

    /// Number of segments in `path` (root = 1)
    pub depth: i64,

    #[serde(skip_serializing)]
    #[serde(default)]
    pub node_hash: String,

    pub version: i64,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Create an unattached node with a generated UUID.
    ///
    /// Derived columns are left empty until the node is placed with
    /// [`Node::with_derived`].
    pub fn new(
        name: impl Into<String>,
        alias: impl Into<String>,
        description: impl Into<String>,
        is_leaf: bool,
    ) -> Self {
        Self::new_with_id(Uuid::new_v4().to_string(), name, alias, description, is_leaf)
    }

    /// Create a node with a caller-chosen ID
    pub fn new_with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        alias: impl Into<String>,
        description: impl Into<String>,
        is_leaf: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            alias: alias.into(),
            description: description.into(),
            parent_id: None,
            is_leaf,
            disabled: false,
            path: String::new(),
            depth: 1,
            node_hash: String::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate caller-controlled attributes
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("node name", &self.name)?;
        validate_length("alias", &self.alias, MAX_ALIAS_LENGTH)?;
        validate_length("description", &self.description, MAX_DESCRIPTION_LENGTH)?;
        if self.parent_id.as_deref() == Some(self.id.as_str()) {
            return Err(ValidationError::SelfReference(self.id.clone()));
        }
        Ok(())
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Prefix shared by every strict descendant of this node
    pub fn subtree_prefix(&self) -> String {
        PathCodec::subtree_prefix(&self.path)
    }

    /// Return a snapshot carrying freshly derived path columns
    pub fn with_derived(mut self, derived: DerivedPath) -> Self {
        self.path = derived.path;
        self.depth = derived.depth;
        self.node_hash = derived.node_hash;
        self
    }

    /// Re-derive path columns against `parent` (or as a root)
    pub fn placed_under(mut self, parent: Option<&Node>) -> Self {
        self.parent_id = parent.map(|p| p.id.clone());
        let derived = PathCodec::derive(&self, parent);
        self.with_derived(derived)
    }
}

/// Request to create a node.
///
/// # Examples
///
/// ```rust
/// use treeperm_core::models::{NewNode, NodeRef};
///
/// let root = NewNode::root("team");
/// let key = NewNode::leaf("svc1", NodeRef::path("team.alpha")).with_alias("Service 1");
/// assert!(key.is_leaf && root.parent.is_none());
/// ```
#[derive(Debug, Clone)]
pub struct NewNode {
    pub name: String,
    pub alias: String,
    pub description: String,
    pub parent: Option<NodeRef>,
    pub is_leaf: bool,
}

impl NewNode {
    /// Non-leaf node without a parent
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: String::new(),
            description: String::new(),
            parent: None,
            is_leaf: false,
        }
    }

    /// Non-leaf node under `parent`
    pub fn child(name: impl Into<String>, parent: NodeRef) -> Self {
        Self {
            parent: Some(parent),
            ..Self::root(name)
        }
    }

    /// Leaf ("key") node under `parent`
    pub fn leaf(name: impl Into<String>, parent: NodeRef) -> Self {
        Self {
            is_leaf: true,
            ..Self::child(name, parent)
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parent(mut self, parent: Option<NodeRef>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_is_leaf(mut self, is_leaf: bool) -> Self {
        self.is_leaf = is_leaf;
        self
    }
}

/// Typed update request for a node.
///
/// Only these caller-facing attributes can be changed; derived columns are
/// recomputed by the service and cannot be written through an update.
///
/// # Examples
///
/// ```rust
/// use treeperm_core::models::{NodeRef, NodeUpdate};
///
/// let update = NodeUpdate::new()
///     .with_alias("Platform team")
///     .with_parent(NodeRef::path("org"));
/// assert!(!update.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub alias: Option<String>,
    pub description: Option<String>,
    /// New parent; the node is moved when it differs from the current one
    pub parent: Option<NodeRef>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parent(mut self, parent: NodeRef) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.alias.is_none()
            && self.description.is_none()
            && self.parent.is_none()
    }
}

/// Reference to a node by one of its identities.
///
/// A `Node` snapshot is checked against the stored row's `version`; a stale
/// snapshot is rejected rather than silently overwritten.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeRef {
    Node(Box<Node>),
    /// Leaf ("key") node by its globally unique name
    Key(String),
    Id(String),
    Path(String),
}

impl NodeRef {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    pub fn key(name: impl Into<String>) -> Self {
        Self::Key(name.into())
    }

    /// First present reference in target order: object > key > id > path
    pub fn pick_target(
        node: Option<Node>,
        key: Option<String>,
        id: Option<String>,
        path: Option<String>,
    ) -> Option<Self> {
        node.map(|n| Self::Node(Box::new(n)))
            .or_else(|| key.map(Self::Key))
            .or_else(|| id.map(Self::Id))
            .or_else(|| path.map(Self::Path))
    }

    /// First present reference in parent order: object > id > path
    pub fn pick_parent(node: Option<Node>, id: Option<String>, path: Option<String>) -> Option<Self> {
        Self::pick_target(node, None, id, path)
    }
}

impl From<&Node> for NodeRef {
    fn from(node: &Node) -> Self {
        Self::Node(Box::new(node.clone()))
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(node) => write!(f, "node {}", node.id),
            Self::Key(name) => write!(f, "key '{}'", name),
            Self::Id(id) => write!(f, "id {}", id),
            Self::Path(path) => write!(f, "path '{}'", path),
        }
    }
}

/// Result ordering for node listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeOrder {
    #[default]
    Path,
    Name,
}

/// Named filter predicates over the tree table.
///
/// All set fields are combined with AND. The same query is compiled to SQL
/// by the store and evaluated in memory by [`NodeQuery::matches`].
///
/// # Examples
///
/// ```rust
/// use treeperm_core::models::NodeQuery;
///
/// // Enabled nodes under "team.alpha", at most three levels deep
/// let query = NodeQuery::new()
///     .with_disabled(false)
///     .with_within(vec!["team.alpha".to_string()])
///     .with_depth_lte(3);
/// # let _ = query;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_contains: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,

    /// Raw string prefix; use [`PathCodec::subtree_prefix`] for strict descendants
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_starts_with: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_contains: Option<String>,

    /// Path equals one of these, or lies below one of them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub within: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_root: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_leaf: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_lte: Option<i64>,

    #[serde(default)]
    pub order_by: NodeOrder,
}

impl NodeQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enabled nodes only
    pub fn enabled() -> Self {
        Self::new().with_disabled(false)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_name_contains(mut self, value: impl Into<String>) -> Self {
        self.name_contains = Some(value.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        self.paths = Some(paths);
        self
    }

    pub fn with_path_starts_with(mut self, prefix: impl Into<String>) -> Self {
        self.path_starts_with = Some(prefix.into());
        self
    }

    pub fn with_path_contains(mut self, value: impl Into<String>) -> Self {
        self.path_contains = Some(value.into());
        self
    }

    pub fn with_within(mut self, paths: Vec<String>) -> Self {
        self.within = Some(paths);
        self
    }

    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_is_root(mut self, is_root: bool) -> Self {
        self.is_root = Some(is_root);
        self
    }

    pub fn with_is_leaf(mut self, is_leaf: bool) -> Self {
        self.is_leaf = Some(is_leaf);
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = Some(disabled);
        self
    }

    pub fn with_depth_lte(mut self, depth: i64) -> Self {
        self.depth_lte = Some(depth);
        self
    }

    pub fn with_order_by(mut self, order_by: NodeOrder) -> Self {
        self.order_by = order_by;
        self
    }

    /// Evaluate the query against an in-memory node
    pub fn matches(&self, node: &Node) -> bool {
        if let Some(id) = &self.id {
            if &node.id != id {
                return false;
            }
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&node.id) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if &node.name != name {
                return false;
            }
        }
        if let Some(value) = &self.name_contains {
            if !node.name.contains(value.as_str()) {
                return false;
            }
        }
        if let Some(path) = &self.path {
            if &node.path != path {
                return false;
            }
        }
        if let Some(paths) = &self.paths {
            if !paths.contains(&node.path) {
                return false;
            }
        }
        if let Some(prefix) = &self.path_starts_with {
            if !node.path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(value) = &self.path_contains {
            if !node.path.contains(value.as_str()) {
                return false;
            }
        }
        if let Some(roots) = &self.within {
            if !roots.iter().any(|p| PathCodec::is_within(&node.path, p)) {
                return false;
            }
        }
        if let Some(parent_id) = &self.parent_id {
            if node.parent_id.as_ref() != Some(parent_id) {
                return false;
            }
        }
        if let Some(is_root) = self.is_root {
            if node.is_root() != is_root {
                return false;
            }
        }
        if let Some(is_leaf) = self.is_leaf {
            if node.is_leaf != is_leaf {
                return false;
            }
        }
        if let Some(disabled) = self.disabled {
            if node.disabled != disabled {
                return false;
            }
        }
        if let Some(depth) = self.depth_lte {
            if node.depth > depth {
                return false;
            }
        }
        true
    }

    /// Sort nodes the way the store orders query results
    pub fn sort(&self, nodes: &mut [Node]) {
        match self.order_by {
            NodeOrder::Path => nodes.sort_by(|a, b| a.path.cmp(&b.path).then(a.id.cmp(&b.id))),
            NodeOrder::Name => nodes.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed(name: &str, parent: Option<&Node>, is_leaf: bool) -> Node {
        Node::new(name, "", "", is_leaf).placed_under(parent)
    }

    #[test]
    fn test_node_creation() {
        let node = Node::new("team", "Team", "", false);

        assert!(!node.id.is_empty());
        assert_eq!(node.name, "team");
        assert!(node.is_root());
        assert_eq!(node.version, 1);
        assert!(node.path.is_empty());
    }

    #[test]
    fn test_validate_name_pattern() {
        assert!(validate_name("node name", "ab").is_ok());
        assert!(validate_name("node name", "svc-a_1").is_ok());
        assert!(validate_name("node name", "a").is_err());
        assert!(validate_name("node name", "1abc").is_err());
        assert!(validate_name("node name", "abc-").is_err());
        assert!(validate_name("node name", "Abc").is_err());
        assert!(validate_name("node name", "a.b").is_err());
        assert!(validate_name("node name", &"a".repeat(64)).is_ok());
        assert!(validate_name("node name", &"a".repeat(65)).is_err());
    }

    #[test]
    fn test_node_validation_lengths() {
        let mut node = Node::new("team", "", "", false);
        node.alias = "x".repeat(MAX_ALIAS_LENGTH + 1);
        assert!(matches!(
            node.validate(),
            Err(ValidationError::TooLong { field: "alias", .. })
        ));
    }

    #[test]
    fn test_node_validation_self_parent() {
        let mut node = Node::new("team", "", "", false);
        node.parent_id = Some(node.id.clone());
        assert!(matches!(
            node.validate(),
            Err(ValidationError::SelfReference(_))
        ));
    }

    #[test]
    fn test_placed_under_derives_path() {
        let team = placed("team", None, false);
        let alpha = placed("alpha", Some(&team), false);
        let svc = placed("svc1", Some(&alpha), true);

        assert_eq!(svc.path, "team.alpha.svc1");
        assert_eq!(svc.depth, 3);
        assert_eq!(svc.parent_id.as_deref(), Some(alpha.id.as_str()));
    }

    #[test]
    fn test_query_matches_combines_predicates() {
        let team = placed("team", None, false);
        let svc = placed("svc1", Some(&team), true);

        let query = NodeQuery::enabled().with_is_leaf(true).with_name_contains("svc");
        assert!(query.matches(&svc));
        assert!(!query.matches(&team));

        let roots = NodeQuery::new().with_is_root(true);
        assert!(roots.matches(&team));
        assert!(!roots.matches(&svc));
    }

    #[test]
    fn test_query_within_requires_delimiter() {
        let team = placed("team", None, false);
        let alpha = placed("alpha", Some(&team), false);
        let alphabeta = placed("alphabeta", Some(&team), false);

        let query = NodeQuery::new().with_within(vec!["team.alpha".to_string()]);
        assert!(query.matches(&alpha));
        assert!(!query.matches(&alphabeta));
    }

    #[test]
    fn test_pick_target_order() {
        let node = Node::new("team", "", "", false);
        let picked = NodeRef::pick_target(
            Some(node.clone()),
            Some("key".into()),
            Some("id".into()),
            None,
        );
        assert_eq!(picked, Some(NodeRef::Node(Box::new(node))));

        let picked = NodeRef::pick_target(None, None, Some("id".into()), Some("a.b".into()));
        assert_eq!(picked, Some(NodeRef::id("id")));

        let picked = NodeRef::pick_parent(None, None, Some("a.b".into()));
        assert_eq!(picked, Some(NodeRef::path("a.b")));

        assert_eq!(NodeRef::pick_parent(None, None, None), None);
    }

    #[test]
    fn test_update_is_empty() {
        assert!(NodeUpdate::new().is_empty());
        assert!(!NodeUpdate::new().with_description("x").is_empty());
    }
}
