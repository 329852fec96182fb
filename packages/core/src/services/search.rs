//! Value search over a node set
//!
//! The resolver tries a fixed sequence of rules and stops at the first one
//! that matches anything. Values containing the path delimiter are treated
//! as path fragments; anything else is looked up by name, leaf nodes first.
//!
//! Each rule is a [`NodeQuery`], so the same sequence runs against the
//! store (see `TreeService::search`) or over nodes already in memory
//! ([`SearchResolver::resolve`]).

use crate::models::{Node, NodeQuery};
use crate::path_codec::PATH_DELIMITER;

/// The rule that produced a search result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchRule {
    /// No value given; the whole candidate set
    All,
    PathExact,
    PathPrefix,
    PathContains,
    LeafExact,
    LeafContains,
    NameContains,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    /// `None` when no rule matched
    pub rule: Option<SearchRule>,
    pub nodes: Vec<Node>,
}

impl SearchResult {
    pub fn empty() -> Self {
        Self {
            rule: None,
            nodes: Vec::new(),
        }
    }
}

/// One rule of the search sequence
#[derive(Debug, Clone, PartialEq)]
pub struct SearchStep {
    pub rule: SearchRule,
    /// The rule's predicates alone
    pub query: NodeQuery,
    /// Reduce hits to the shallowest depth found
    pub shallowest: bool,
}

impl SearchStep {
    fn new(rule: SearchRule, query: NodeQuery, shallowest: bool) -> Self {
        Self {
            rule,
            query,
            shallowest,
        }
    }

    /// The rule's predicates layered over `base`; base ordering is kept
    pub fn narrowing(&self, base: &NodeQuery) -> NodeQuery {
        let rule = &self.query;
        NodeQuery {
            name: rule.name.clone().or_else(|| base.name.clone()),
            name_contains: rule.name_contains.clone().or_else(|| base.name_contains.clone()),
            path: rule.path.clone().or_else(|| base.path.clone()),
            path_starts_with: rule
                .path_starts_with
                .clone()
                .or_else(|| base.path_starts_with.clone()),
            path_contains: rule.path_contains.clone().or_else(|| base.path_contains.clone()),
            is_leaf: rule.is_leaf.or(base.is_leaf),
            ..base.clone()
        }
    }

    /// Turn the rule's hits into its result
    pub fn finish(self, hits: Vec<Node>) -> SearchResult {
        let nodes = if self.shallowest {
            SearchResolver::shallowest(hits)
        } else {
            hits
        };
        SearchResult {
            rule: Some(self.rule),
            nodes,
        }
    }
}

pub struct SearchResolver;

impl SearchResolver {
    /// The rule sequence for `value`, or `None` for a blank value
    ///
    /// Path fragments: exact path, else path prefix, else path substring,
    /// each reduced to the shallowest depth found. Other values: exact leaf
    /// name, else leaf name substring, else any name substring reduced to
    /// the shallowest depth. Values are matched lowercased, like names.
    pub fn steps(value: Option<&str>) -> Option<Vec<SearchStep>> {
        let value = value.map(|v| v.trim().to_lowercase()).unwrap_or_default();
        if value.is_empty() {
            return None;
        }

        let steps = if value.contains(PATH_DELIMITER) {
            vec![
                SearchStep::new(SearchRule::PathExact, NodeQuery::new().with_path(&value), true),
                SearchStep::new(
                    SearchRule::PathPrefix,
                    NodeQuery::new().with_path_starts_with(&value),
                    true,
                ),
                SearchStep::new(
                    SearchRule::PathContains,
                    NodeQuery::new().with_path_contains(&value),
                    true,
                ),
            ]
        } else {
            let leaves = NodeQuery::new().with_is_leaf(true);
            vec![
                SearchStep::new(SearchRule::LeafExact, leaves.clone().with_name(&value), false),
                SearchStep::new(
                    SearchRule::LeafContains,
                    leaves.with_name_contains(&value),
                    false,
                ),
                SearchStep::new(
                    SearchRule::NameContains,
                    NodeQuery::new().with_name_contains(&value),
                    true,
                ),
            ]
        };
        Some(steps)
    }

    /// Resolve `value` against nodes already loaded
    pub fn resolve(value: Option<&str>, candidates: Vec<Node>) -> SearchResult {
        let Some(steps) = Self::steps(value) else {
            return SearchResult {
                rule: Some(SearchRule::All),
                nodes: candidates,
            };
        };

        for step in steps {
            let hits: Vec<Node> = candidates
                .iter()
                .filter(|n| step.query.matches(n))
                .cloned()
                .collect();
            if !hits.is_empty() {
                return step.finish(hits);
            }
        }
        SearchResult::empty()
    }

    /// Keep only the nodes at the minimum depth present
    pub fn shallowest(nodes: Vec<Node>) -> Vec<Node> {
        let Some(min_depth) = nodes.iter().map(|n| n.depth).min() else {
            return nodes;
        };
        nodes.into_iter().filter(|n| n.depth == min_depth).collect()
    }
}
