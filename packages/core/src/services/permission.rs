//! Permission Resolution
//!
//! A grant at a node covers that node and everything below it. There is no
//! separate table of inherited grants: access is decided by comparing paths
//! against the granted paths with a delimiter-aware prefix test.
//!
//! # Examples
//!
//! ```rust
//! use treeperm_core::services::PathScope;
//!
//! let scope = PathScope::new(["team.alpha"]);
//! assert!(scope.permits("team.alpha.service1"));
//! assert!(!scope.permits("team.alphabeta"));
//! ```

use crate::db::{TreeStore, TxMode};
use crate::models::{GrantDetail, GrantQuery, Node, NodeQuery, NodeRef};
use crate::path_codec::PathCodec;
use crate::services::error::TreeError;
use crate::services::tree_service::TreeService;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Set of granted paths, each covering its own subtree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathScope {
    roots: BTreeSet<String>,
}

impl PathScope {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roots: paths
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    /// `true` iff `path` is a granted path or lies below one
    pub fn permits(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        PathCodec::ancestor_chain(path)
            .iter()
            .any(|prefix| self.roots.contains(prefix))
    }

    /// No grants: nothing is permitted
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.roots.iter().map(String::as_str)
    }

    /// Granted paths with any path already covered by another removed
    pub fn minimal_roots(&self) -> Vec<String> {
        self.roots
            .iter()
            .filter(|p| {
                !self
                    .roots
                    .iter()
                    .any(|other| PathCodec::is_descendant(p, other))
            })
            .cloned()
            .collect()
    }
}

/// Maps users to the paths they may act on
pub struct PermissionResolver {
    store: Arc<dyn TreeStore>,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }

    async fn grants(&self, query: &GrantQuery) -> Result<Vec<GrantDetail>, TreeError> {
        let mut tx = self.store.begin(TxMode::Read).await?;
        let result = tx.find_grants(query).await.map_err(TreeError::from);
        TreeService::finish_read(tx, result).await
    }

    /// Distinct paths of enabled nodes where `user_id` holds a grant
    ///
    /// `role_ids` narrows the grants considered. A user without grants gets an
    /// empty set.
    pub async fn resolve_granted_paths(
        &self,
        user_id: &str,
        role_ids: Option<&[String]>,
    ) -> Result<BTreeSet<String>, TreeError> {
        let mut query = GrantQuery::for_user(user_id).with_node_disabled(false);
        if let Some(role_ids) = role_ids {
            query = query.with_role_ids(role_ids.to_vec());
        }
        let paths: BTreeSet<String> = self
            .grants(&query)
            .await?
            .into_iter()
            .map(|g| g.node_path)
            .filter(|p| !p.is_empty())
            .collect();

        tracing::debug!("User {} holds grants at {} paths", user_id, paths.len());
        Ok(paths)
    }

    /// Predicate accepting `paths` and all of their descendants
    pub fn expand_to_descendants<I, S>(paths: I) -> PathScope
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PathScope::new(paths)
    }

    /// The user's granted paths expanded to their subtrees
    pub async fn scope_for(
        &self,
        user_id: &str,
        role_ids: Option<&[String]>,
    ) -> Result<PathScope, TreeError> {
        let paths = self.resolve_granted_paths(user_id, role_ids).await?;
        Ok(Self::expand_to_descendants(paths))
    }

    /// Enabled nodes the user may act on, further narrowed by `filter`
    pub async fn permitted_nodes(
        &self,
        user_id: &str,
        role_ids: Option<&[String]>,
        filter: &NodeQuery,
    ) -> Result<Vec<Node>, TreeError> {
        let scope = self.scope_for(user_id, role_ids).await?;
        if scope.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = filter.clone().with_disabled(false);
        if query.within.is_none() {
            query.within = Some(scope.minimal_roots());
        }

        let mut tx = self.store.begin(TxMode::Read).await?;
        let result = tx.find_nodes(&query).await.map_err(TreeError::from);
        let nodes = TreeService::finish_read(tx, result).await?;

        Ok(nodes.into_iter().filter(|n| scope.permits(&n.path)).collect())
    }

    /// `true` iff the user holds a managing role at the node or an ancestor
    pub async fn can_manage(&self, user_id: &str, target: &NodeRef) -> Result<bool, TreeError> {
        let mut tx = self.store.begin(TxMode::Read).await?;
        let result = TreeService::require_in(tx.as_mut(), target).await;
        let node = TreeService::finish_read(tx, result).await?;
        if node.disabled {
            return Ok(false);
        }

        let query = GrantQuery::for_user(user_id)
            .with_can_manage(true)
            .with_node_disabled(false)
            .with_node_paths(PathCodec::ancestor_chain(&node.path));
        Ok(!self.grants(&query).await?.is_empty())
    }

    /// Grants of `role_id` at every node on the way from the root to `path`
    ///
    /// Ordered deepest node first, then by user id.
    pub async fn role_members_along_path(
        &self,
        role_id: &str,
        path: &str,
    ) -> Result<Vec<GrantDetail>, TreeError> {
        let chain = PathCodec::ancestor_chain(path);
        if chain.is_empty() {
            return Ok(Vec::new());
        }
        let query = GrantQuery::new()
            .with_role_id(role_id)
            .with_node_disabled(false)
            .with_node_paths(chain);
        let mut grants = self.grants(&query).await?;
        grants.sort_by(|a, b| {
            PathCodec::depth(&b.node_path)
                .cmp(&PathCodec::depth(&a.node_path))
                .then_with(|| a.grant.user_id.cmp(&b.grant.user_id))
        });
        Ok(grants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_requires_delimiter() {
        let scope = PermissionResolver::expand_to_descendants(["team.alpha"]);
        assert!(scope.permits("team.alpha"));
        assert!(scope.permits("team.alpha.service1"));
        assert!(!scope.permits("team.alphabeta"));
        assert!(!scope.permits("team"));
    }

    #[test]
    fn test_empty_scope_permits_nothing() {
        let scope = PathScope::new(Vec::<String>::new());
        assert!(scope.is_empty());
        assert!(!scope.permits("team"));
        assert!(!scope.permits(""));
    }

    #[test]
    fn test_empty_paths_are_ignored() {
        let scope = PathScope::new(["", "team"]);
        assert_eq!(scope.roots().collect::<Vec<_>>(), vec!["team"]);
    }

    #[test]
    fn test_minimal_roots() {
        let scope = PathScope::new(["team", "team.alpha", "org.beta", "org.betamax"]);
        assert_eq!(
            scope.minimal_roots(),
            vec!["org.beta".to_string(), "org.betamax".to_string(), "team".to_string()]
        );
    }
}

// Service-level tests against a real libsql store
#[cfg(test)]
#[path = "permission_test.rs"]
mod permission_test;
