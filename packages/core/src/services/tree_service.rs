//! Tree Service - Node Lifecycle Operations
//!
//! `TreeService` owns every mutation of the tree table. Each public write
//! operation runs in exactly one `TxMode::Write` transaction: it either
//! commits all of its row changes or none of them.
//!
//! # Operations
//!
//! - **create_node**: attach a new node under an enabled, non-leaf parent
//! - **update_node**: change alias/description, rename a non-leaf node, and
//!   optionally move it
//! - **move_node**: reparent a node and rewrite the paths of its subtree
//! - **remove_node**: delete non-leaf nodes, disable leaf nodes
//! - **enable_node**: reattach a disabled leaf under a new parent
//!
//! Read helpers (`get_node`, `find_nodes`, `children_of`, `search`, `tree`)
//! run in `TxMode::Read` transactions.

use crate::config::TreeConfig;
use crate::db::{DatabaseService, LibsqlStore, TreeStore, TreeTransaction, TxMode};
use crate::models::{GrantQuery, NewNode, Node, NodeOrder, NodeQuery, NodeRef, NodeUpdate};
use crate::path_codec::PathCodec;
use crate::services::error::{DuplicateKind, ParentProblem, TreeError};
use crate::services::search::{SearchResolver, SearchResult};
use crate::services::tree_assembler::{TreeAssembler, TreeEntry};
use chrono::Utc;
use std::sync::Arc;

type Tx = Box<dyn TreeTransaction>;

/// Options for [`TreeService::remove_node`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Allow removing a non-leaf node that still has children
    pub cascade_children: bool,
    /// Delete grants of leaves that get disabled
    pub cascade_grants: bool,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self {
            cascade_children: false,
            cascade_grants: true,
        }
    }
}

impl RemoveOptions {
    pub fn cascading() -> Self {
        Self {
            cascade_children: true,
            ..Self::default()
        }
    }
}

/// Node lifecycle and read operations over a [`TreeStore`]
///
/// # Examples
///
/// ```no_run
/// use treeperm_core::config::TreeConfig;
/// use treeperm_core::models::{NewNode, NodeRef};
/// use treeperm_core::services::TreeService;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = TreeService::open(&TreeConfig::for_path("./tree.db")).await?;
///
///     service.create_node(NewNode::root("team")).await?;
///     service
///         .create_node(NewNode::leaf("svc1", NodeRef::path("team")))
///         .await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct TreeService {
    store: Arc<dyn TreeStore>,
}

impl TreeService {
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }

    /// Open the libsql store described by `config`
    pub async fn open(config: &TreeConfig) -> Result<Self, TreeError> {
        let db = DatabaseService::with_config(config).await?;
        Ok(Self::new(Arc::new(LibsqlStore::new(Arc::new(db)))))
    }

    pub fn store(&self) -> Arc<dyn TreeStore> {
        Arc::clone(&self.store)
    }

    //
    // TRANSACTION HELPERS
    //

    async fn finish_write<T>(
        tx: Tx,
        operation: &str,
        result: Result<T, TreeError>,
    ) -> Result<T, TreeError> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("{}: rollback failed: {}", operation, rollback_err);
                }
                tracing::warn!("{} rolled back: {}", operation, err);
                Err(err)
            }
        }
    }

    pub(crate) async fn finish_read<T>(
        tx: Tx,
        result: Result<T, TreeError>,
    ) -> Result<T, TreeError> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                Err(err)
            }
        }
    }

    /// Snapshot with the version bumped for the next write
    fn bumped(mut node: Node) -> Node {
        node.version += 1;
        node.updated_at = Utc::now();
        node
    }

    //
    // RESOLUTION
    //

    /// Resolve a reference inside an open transaction
    ///
    /// A `NodeRef::Node` snapshot must still match the stored version.
    pub(crate) async fn resolve_in(
        tx: &mut dyn TreeTransaction,
        target: &NodeRef,
    ) -> Result<Option<Node>, TreeError> {
        match target {
            NodeRef::Node(snapshot) => match tx.get_node(&snapshot.id).await? {
                Some(stored) if stored.version != snapshot.version => {
                    Err(TreeError::concurrent_modification(format!(
                        "node {} changed since version {} (now {})",
                        snapshot.id, snapshot.version, stored.version
                    )))
                }
                other => Ok(other),
            },
            NodeRef::Key(name) => {
                let leaves = tx
                    .find_nodes(&NodeQuery::new().with_is_leaf(true).with_name(name))
                    .await?;
                Ok(Self::pick_leaf(leaves))
            }
            NodeRef::Id(id) => Ok(tx.get_node(id).await?),
            NodeRef::Path(path) => {
                let mut nodes = tx
                    .find_nodes(&NodeQuery::enabled().with_path(path))
                    .await?;
                Ok(nodes.pop())
            }
        }
    }

    /// The enabled leaf of a name, else its most recently disabled row
    fn pick_leaf(leaves: Vec<Node>) -> Option<Node> {
        let (enabled, disabled): (Vec<Node>, Vec<Node>) =
            leaves.into_iter().partition(|n| !n.disabled);
        enabled
            .into_iter()
            .next()
            .or_else(|| disabled.into_iter().max_by_key(|n| n.updated_at))
    }

    pub(crate) async fn require_in(
        tx: &mut dyn TreeTransaction,
        target: &NodeRef,
    ) -> Result<Node, TreeError> {
        Self::resolve_in(tx, target)
            .await?
            .ok_or_else(|| TreeError::node_not_found(target))
    }

    /// Resolve a parent reference
    ///
    /// With `required`, a missing or unresolvable reference is an error;
    /// otherwise it yields `None`.
    async fn resolve_parent_in(
        tx: &mut dyn TreeTransaction,
        parent: Option<&NodeRef>,
        required: bool,
    ) -> Result<Option<Node>, TreeError> {
        let Some(reference) = parent else {
            if required {
                return Err(TreeError::parent_not_found("none given"));
            }
            return Ok(None);
        };

        let Some(node) = Self::resolve_in(tx, reference).await? else {
            if required {
                return Err(TreeError::parent_not_found(reference));
            }
            return Ok(None);
        };

        if node.disabled {
            return Err(TreeError::disabled_node(&node.id));
        }
        if node.is_leaf {
            return Err(TreeError::not_allowed_as_parent(&node.path));
        }
        Ok(Some(node))
    }

    /// Reject a derived node whose path or leaf name is already taken
    async fn ensure_unique(tx: &mut dyn TreeTransaction, node: &Node) -> Result<(), TreeError> {
        if node.disabled {
            return Ok(());
        }

        if node.is_leaf {
            let same_name = tx
                .find_nodes(
                    &NodeQuery::enabled()
                        .with_is_leaf(true)
                        .with_name(&node.name),
                )
                .await?;
            if same_name.iter().any(|n| n.id != node.id) {
                return Err(TreeError::duplicate(DuplicateKind::LeafName, &node.name));
            }
        }

        let same_path = tx
            .find_nodes(&NodeQuery::enabled().with_path(&node.path))
            .await?;
        if same_path.iter().any(|n| n.id != node.id) {
            return Err(TreeError::duplicate(DuplicateKind::Path, &node.path));
        }
        Ok(())
    }

    fn duplicate_for(node: &Node) -> TreeError {
        if node.is_leaf {
            TreeError::duplicate(DuplicateKind::LeafName, &node.name)
        } else {
            TreeError::duplicate(DuplicateKind::Path, &node.path)
        }
    }

    /// Persist `next` over `current`, mapping a hash collision to `DuplicateNode`
    async fn write_node(
        tx: &mut dyn TreeTransaction,
        current: &Node,
        next: &Node,
    ) -> Result<(), TreeError> {
        match tx.update_node(next, current.version).await {
            Err(crate::db::DatabaseError::ConstraintViolation(_)) => Err(Self::duplicate_for(next)),
            other => Ok(other?),
        }
    }

    //
    // READS
    //

    pub async fn get_node(&self, target: &NodeRef) -> Result<Node, TreeError> {
        let mut tx = self.store.begin(TxMode::Read).await?;
        let result = Self::require_in(tx.as_mut(), target).await;
        Self::finish_read(tx, result).await
    }

    pub async fn find_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>, TreeError> {
        let mut tx = self.store.begin(TxMode::Read).await?;
        let result = tx.find_nodes(query).await.map_err(TreeError::from);
        Self::finish_read(tx, result).await
    }

    /// Validate a parent reference without changing anything
    ///
    /// # Errors
    ///
    /// - `ParentNotFound` when `required` and the reference is absent or does
    ///   not resolve (without `required` both yield `Ok(None)`)
    /// - `NotAllowedAsParent` when the parent is a leaf
    /// - `DisabledNode` when the parent is disabled
    pub async fn resolve_parent(
        &self,
        parent: Option<&NodeRef>,
        required: bool,
    ) -> Result<Option<Node>, TreeError> {
        let mut tx = self.store.begin(TxMode::Read).await?;
        let result = Self::resolve_parent_in(tx.as_mut(), parent, required).await;
        Self::finish_read(tx, result).await
    }

    /// Direct enabled children of `node`, or all enabled roots
    pub async fn children_of(&self, node: Option<&NodeRef>) -> Result<Vec<Node>, TreeError> {
        let mut tx = self.store.begin(TxMode::Read).await?;
        let result: Result<Vec<Node>, TreeError> = async {
            let query = match node {
                Some(target) => {
                    let parent = Self::require_in(tx.as_mut(), target).await?;
                    NodeQuery::enabled().with_parent_id(parent.id)
                }
                None => NodeQuery::enabled().with_is_root(true),
            };
            Ok(tx.find_nodes(&query).await?)
        }
        .await;
        Self::finish_read(tx, result).await
    }

    /// Value search over the enabled nodes matching `base`
    ///
    /// `None` or a blank value returns the whole base set. Otherwise each
    /// rule runs as its own store query, in order, inside one read
    /// transaction, until one returns rows.
    pub async fn search(
        &self,
        value: Option<&str>,
        base: &NodeQuery,
    ) -> Result<Vec<Node>, TreeError> {
        let base = base.clone().with_disabled(false);
        let Some(steps) = SearchResolver::steps(value) else {
            return self.find_nodes(&base).await;
        };

        let mut tx = self.store.begin(TxMode::Read).await?;
        let result: Result<SearchResult, TreeError> = async {
            for step in steps {
                let mut hits = tx.find_nodes(&step.narrowing(&base)).await?;
                // A base predicate the rule replaced still has to hold
                hits.retain(|n| base.matches(n));
                if !hits.is_empty() {
                    return Ok(step.finish(hits));
                }
            }
            Ok(SearchResult::empty())
        }
        .await;
        let result = Self::finish_read(tx, result).await?;
        tracing::debug!(
            "Search {:?} resolved by {:?}: {} nodes",
            value,
            result.rule,
            result.nodes.len()
        );
        Ok(result.nodes)
    }

    /// Search restricted to enabled leaf ("key") nodes, ordered by name
    pub async fn search_keys(&self, value: Option<&str>) -> Result<Vec<Node>, TreeError> {
        let base = NodeQuery::enabled()
            .with_is_leaf(true)
            .with_order_by(NodeOrder::Name);
        let mut nodes = self.search(value, &base).await?;
        base.sort(&mut nodes);
        Ok(nodes)
    }

    /// Nodes matching `query` assembled into a forest
    ///
    /// With `trace_to_root`, every ancestor of a matched node is loaded too,
    /// so each result hangs off a real root.
    pub async fn tree(
        &self,
        query: &NodeQuery,
        trace_to_root: bool,
    ) -> Result<Vec<TreeEntry>, TreeError> {
        let mut tx = self.store.begin(TxMode::Read).await?;
        let result: Result<Vec<Node>, TreeError> = async {
            let mut nodes = tx.find_nodes(query).await?;
            if trace_to_root {
                let paths = PathCodec::ancestor_chains(nodes.iter().map(|n| n.path.as_str()));
                nodes = tx
                    .find_nodes(&NodeQuery::enabled().with_paths(paths))
                    .await?;
            }
            Ok(nodes)
        }
        .await;
        let nodes = Self::finish_read(tx, result).await?;
        Ok(TreeAssembler::assemble(nodes))
    }

    //
    // CREATE
    //

    /// Create a node
    ///
    /// # Errors
    ///
    /// - `InvalidTree` for a leaf without a parent
    /// - `InvalidParent` when the parent is missing, a leaf, or disabled
    /// - `DuplicateNode` when the path or leaf name is taken
    /// - `Validation` for malformed names or oversized text
    pub async fn create_node(&self, request: NewNode) -> Result<Node, TreeError> {
        let mut tx = self.store.begin(TxMode::Write).await?;
        let result = Self::create_in(tx.as_mut(), request).await;
        let node = Self::finish_write(tx, "create_node", result).await?;
        tracing::info!("Created node {} at '{}'", node.id, node.path);
        Ok(node)
    }

    async fn create_in(tx: &mut dyn TreeTransaction, request: NewNode) -> Result<Node, TreeError> {
        if request.is_leaf && request.parent.is_none() {
            return Err(TreeError::invalid_tree(&request.name));
        }

        let parent = match Self::resolve_parent_in(tx, request.parent.as_ref(), false).await {
            // A given parent that does not resolve never falls back to a root
            Ok(None) => match &request.parent {
                Some(reference) => Err(TreeError::parent_not_found(reference)),
                None => Ok(None),
            },
            other => other,
        };
        let parent = match parent {
            Ok(parent) => parent,
            Err(err) => {
                let reason = match err {
                    TreeError::ParentNotFound { .. } => ParentProblem::NotFound,
                    TreeError::NotAllowedAsParent { .. } => ParentProblem::Leaf,
                    TreeError::DisabledNode { .. } => ParentProblem::Disabled,
                    other => return Err(other),
                };
                let reference = request
                    .parent
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_default();
                return Err(TreeError::invalid_parent(reference, reason));
            }
        };

        let candidate = Node::new(
            request.name,
            request.alias,
            request.description,
            request.is_leaf,
        );
        candidate.validate()?;
        let node = candidate.placed_under(parent.as_ref());

        Self::ensure_unique(tx, &node).await?;
        match tx.insert_node(&node).await {
            Err(crate::db::DatabaseError::ConstraintViolation(_)) => {
                return Err(Self::duplicate_for(&node))
            }
            other => other?,
        }
        Ok(node)
    }

    //
    // UPDATE / RENAME / MOVE
    //

    /// Apply a typed update
    ///
    /// Renaming a non-leaf node rewrites its subtree; renaming a leaf fails with
    /// `ImmutableName`. A `parent` that differs from the current one moves the
    /// node after the attribute changes, in the same transaction.
    pub async fn update_node(
        &self,
        target: &NodeRef,
        update: NodeUpdate,
    ) -> Result<Node, TreeError> {
        let mut tx = self.store.begin(TxMode::Write).await?;
        let result = Self::update_in(tx.as_mut(), target, update).await;
        let (node, rows) = Self::finish_write(tx, "update_node", result).await?;
        tracing::info!(
            "Updated node {} at '{}' ({} rows)",
            node.id,
            node.path,
            rows
        );
        Ok(node)
    }

    async fn update_in(
        tx: &mut dyn TreeTransaction,
        target: &NodeRef,
        update: NodeUpdate,
    ) -> Result<(Node, u64), TreeError> {
        let current = Self::require_in(tx, target).await?;
        let mut next = current.clone();
        let mut changed = false;
        let mut renamed = false;

        if let Some(name) = update.name {
            if name != current.name {
                if current.is_leaf {
                    return Err(TreeError::immutable_name(&current.name));
                }
                next.name = name;
                renamed = true;
                changed = true;
            }
        }
        if let Some(alias) = update.alias {
            if alias != current.alias {
                next.alias = alias;
                changed = true;
            }
        }
        if let Some(description) = update.description {
            if description != current.description {
                next.description = description;
                changed = true;
            }
        }

        let mut rows = 0;
        if changed {
            next.validate()?;
            if renamed {
                let parent = match &current.parent_id {
                    Some(parent_id) => tx.get_node(parent_id).await?,
                    None => None,
                };
                rows += Self::relocate_in(tx, &current, next, parent.as_ref()).await?;
            } else {
                Self::write_node(tx, &current, &Self::bumped(next)).await?;
                rows += 1;
            }
        }

        if let Some(parent) = update.parent {
            let fresh = Self::require_in(tx, &NodeRef::id(&current.id)).await?;
            rows += Self::move_in(tx, fresh, &parent).await?;
        }

        let node = Self::require_in(tx, &NodeRef::id(&current.id)).await?;
        Ok((node, rows))
    }

    /// Move `target` under `new_parent`
    ///
    /// Returns the number of rewritten rows (the node plus its descendants),
    /// or 0 when `new_parent` already is the node's parent.
    ///
    /// # Errors
    ///
    /// - `SelfParent` when `new_parent` is the node itself or lies in its subtree
    /// - `DisabledNode` when the node or the new parent is disabled
    /// - `ParentNotFound` / `NotAllowedAsParent` for an unusable parent
    /// - `DuplicateNode` when the new path is taken
    pub async fn move_node(&self, target: &NodeRef, new_parent: &NodeRef) -> Result<u64, TreeError> {
        let mut tx = self.store.begin(TxMode::Write).await?;
        let result: Result<(String, u64), TreeError> = async {
            let node = Self::require_in(tx.as_mut(), target).await?;
            let id = node.id.clone();
            let rows = Self::move_in(tx.as_mut(), node, new_parent).await?;
            Ok((id, rows))
        }
        .await;
        let (id, rows) = Self::finish_write(tx, "move_node", result).await?;
        tracing::info!("Moved node {} under {} ({} rows)", id, new_parent, rows);
        Ok(rows)
    }

    async fn move_in(
        tx: &mut dyn TreeTransaction,
        node: Node,
        new_parent: &NodeRef,
    ) -> Result<u64, TreeError> {
        if node.disabled {
            return Err(TreeError::disabled_node(&node.id));
        }

        let parent = Self::resolve_parent_in(tx, Some(new_parent), true)
            .await?
            .ok_or_else(|| TreeError::parent_not_found(new_parent))?;

        if parent.id == node.id || PathCodec::is_descendant(&parent.path, &node.path) {
            return Err(TreeError::self_parent(&node.id));
        }
        if node.parent_id.as_deref() == Some(parent.id.as_str()) {
            return Ok(0);
        }

        let next = node.clone();
        Self::relocate_in(tx, &node, next, Some(&parent)).await
    }

    /// Re-derive `next` under `parent` and rebase every descendant of `current`
    ///
    /// `current` is the stored row before the change; `next` carries the new
    /// name (for a rename). Returns the number of rows written.
    async fn relocate_in(
        tx: &mut dyn TreeTransaction,
        current: &Node,
        next: Node,
        parent: Option<&Node>,
    ) -> Result<u64, TreeError> {
        let old_path = current.path.clone();
        let old_prefix = PathCodec::subtree_prefix(&old_path);

        let next = Self::bumped(next.placed_under(parent));
        Self::ensure_unique(tx, &next).await?;

        let descendants = tx
            .find_nodes(&NodeQuery::new().with_path_starts_with(&old_prefix))
            .await?;

        Self::write_node(tx, current, &next).await?;
        let mut rows = 1;

        for descendant in descendants {
            // Matched by prefix above, so the rebase always applies
            let Some(new_path) = PathCodec::rebase(&descendant.path, &old_path, &next.path) else {
                continue;
            };
            let derived = PathCodec::derive_with_path(&descendant, new_path);
            let rebased = Self::bumped(descendant.clone().with_derived(derived));
            Self::write_node(tx, &descendant, &rebased).await?;
            rows += 1;
        }

        tracing::debug!(
            "Rebased '{}' -> '{}' ({} rows)",
            old_path,
            next.path,
            rows
        );
        Ok(rows)
    }

    //
    // REMOVE / ENABLE
    //

    /// Remove a node
    ///
    /// - leaf: disabled and detached, returns 0
    /// - non-leaf without children: deleted, returns 1
    /// - non-leaf with children: requires `cascade_children`; enabled leaves in
    ///   the subtree are disabled, every non-leaf (the node included) is
    ///   deleted; returns the number of deleted rows
    ///
    /// Grants of deleted nodes are always removed. Grants of disabled leaves
    /// are removed when `cascade_grants` is set.
    pub async fn remove_node(
        &self,
        target: &NodeRef,
        options: RemoveOptions,
    ) -> Result<u64, TreeError> {
        let mut tx = self.store.begin(TxMode::Write).await?;
        let result: Result<(String, u64), TreeError> = async {
            let node = Self::require_in(tx.as_mut(), target).await?;
            let id = node.id.clone();
            let rows = Self::remove_in(tx.as_mut(), node, options).await?;
            Ok((id, rows))
        }
        .await;
        let (id, rows) = Self::finish_write(tx, "remove_node", result).await?;
        tracing::info!("Removed node {} ({} rows deleted)", id, rows);
        Ok(rows)
    }

    fn disabled_copy(node: &Node) -> Node {
        let mut next = node.clone();
        next.disabled = true;
        Self::bumped(next.placed_under(None))
    }

    async fn remove_in(
        tx: &mut dyn TreeTransaction,
        node: Node,
        options: RemoveOptions,
    ) -> Result<u64, TreeError> {
        if node.disabled {
            return Err(TreeError::already_disabled(&node.id));
        }

        if node.is_leaf {
            Self::write_node(tx, &node, &Self::disabled_copy(&node)).await?;
            if options.cascade_grants {
                tx.delete_grants(&GrantQuery::new().with_node_id(&node.id))
                    .await?;
            }
            return Ok(0);
        }

        let children = tx
            .count_nodes(&NodeQuery::new().with_parent_id(&node.id))
            .await?;

        if children == 0 {
            tx.delete_grants(&GrantQuery::new().with_node_id(&node.id))
                .await?;
            return Ok(tx.delete_nodes(&[node.id.clone()]).await?);
        }

        if !options.cascade_children {
            return Err(TreeError::has_children(&node.path, children));
        }

        let subtree = tx
            .find_nodes(&NodeQuery::new().with_within(vec![node.path.clone()]))
            .await?;
        let (leaves, branches): (Vec<Node>, Vec<Node>) =
            subtree.into_iter().partition(|n| n.is_leaf);

        let mut disabled_ids = Vec::with_capacity(leaves.len());
        for leaf in &leaves {
            Self::write_node(tx, leaf, &Self::disabled_copy(leaf)).await?;
            disabled_ids.push(leaf.id.clone());
        }
        if options.cascade_grants && !disabled_ids.is_empty() {
            tx.delete_grants(&GrantQuery::new().with_node_ids(disabled_ids))
                .await?;
        }

        let branch_ids: Vec<String> = branches.into_iter().map(|n| n.id).collect();
        tx.delete_grants(&GrantQuery::new().with_node_ids(branch_ids.clone()))
            .await?;
        let deleted = tx.delete_nodes(&branch_ids).await?;

        tracing::debug!(
            "Cascade removal of '{}': {} leaves disabled, {} nodes deleted",
            node.path,
            leaves.len(),
            deleted
        );
        Ok(deleted)
    }

    /// Re-enable the disabled leaf `name` under `parent`
    ///
    /// # Errors
    ///
    /// - `NotDisabled` when an enabled leaf with that name exists
    /// - `NodeNotFound` when no leaf with that name exists
    /// - `MissingParent` when the parent is absent, unknown, a leaf, or disabled
    /// - `DuplicateNode` when the restored path is taken
    pub async fn enable_node(&self, name: &str, parent: Option<&NodeRef>) -> Result<Node, TreeError> {
        let mut tx = self.store.begin(TxMode::Write).await?;
        let result = Self::enable_in(tx.as_mut(), name, parent).await;
        let node = Self::finish_write(tx, "enable_node", result).await?;
        tracing::info!("Enabled leaf node {} at '{}'", node.id, node.path);
        Ok(node)
    }

    async fn enable_in(
        tx: &mut dyn TreeTransaction,
        name: &str,
        parent: Option<&NodeRef>,
    ) -> Result<Node, TreeError> {
        let leaves = tx
            .find_nodes(&NodeQuery::new().with_is_leaf(true).with_name(name))
            .await?;
        if leaves.iter().any(|n| !n.disabled) {
            return Err(TreeError::not_disabled(name));
        }
        let node = Self::pick_leaf(leaves)
            .ok_or_else(|| TreeError::node_not_found(NodeRef::key(name)))?;

        let parent = match Self::resolve_parent_in(tx, parent, true).await {
            Ok(Some(parent)) => parent,
            Ok(None)
            | Err(TreeError::ParentNotFound { .. })
            | Err(TreeError::NotAllowedAsParent { .. })
            | Err(TreeError::DisabledNode { .. }) => {
                return Err(TreeError::missing_parent(name));
            }
            Err(other) => return Err(other),
        };

        let mut next = node.clone();
        next.disabled = false;
        let next = Self::bumped(next.placed_under(Some(&parent)));

        Self::ensure_unique(tx, &next).await?;
        Self::write_node(tx, &node, &next).await?;
        Ok(next)
    }
}

// Service-level tests against a real libsql store
#[cfg(test)]
#[path = "tree_service_test.rs"]
mod tree_service_test;
