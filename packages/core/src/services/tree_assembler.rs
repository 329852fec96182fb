//! Nested tree reconstruction from flat query results
//!
//! Works on any filtered node set: a node whose parent is not in the set
//! becomes a local root of the returned forest.

use crate::models::Node;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A node with its assembled children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntry {
    #[serde(flatten)]
    pub node: Node,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeEntry>,
}

impl TreeEntry {
    /// Number of entries in this subtree, itself included
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeEntry::size).sum::<usize>()
    }

    /// Depth-first search by node id
    pub fn find(&self, id: &str) -> Option<&TreeEntry> {
        if self.node.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }
}

pub struct TreeAssembler;

impl TreeAssembler {
    /// Assemble `nodes` into a forest
    ///
    /// Sibling order follows input order. One pass builds the parent index,
    /// a second attaches each child list once, so the cost is linear in the
    /// number of nodes.
    pub fn assemble(nodes: Vec<Node>) -> Vec<TreeEntry> {
        let present: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();

        let mut children: HashMap<String, Vec<Node>> = HashMap::new();
        let mut roots = Vec::new();
        for node in nodes {
            match node.parent_id.as_ref().filter(|p| present.contains(*p)) {
                Some(parent_id) => children.entry(parent_id.clone()).or_default().push(node),
                None => roots.push(node),
            }
        }

        roots
            .into_iter()
            .map(|root| Self::attach(root, &mut children))
            .collect()
    }

    fn attach(node: Node, children: &mut HashMap<String, Vec<Node>>) -> TreeEntry {
        let direct = children.remove(&node.id).unwrap_or_default();
        let children = direct
            .into_iter()
            .map(|child| Self::attach(child, children))
            .collect();
        TreeEntry { node, children }
    }
}
