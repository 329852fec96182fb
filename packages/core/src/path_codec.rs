//! Materialized Path Codec
//!
//! Pure functions over dot-delimited node paths. Nothing here touches the
//! database; the services call these to produce the derived columns
//! (`path`, `depth`, `node_hash`) and the prefix strings used by subtree
//! queries and permission checks.
//!
//! A path is a non-empty sequence of node names joined by `.`. Node names
//! never contain `.` (see [`crate::models::validate_name`]), so every `.` is
//! a segment boundary. Descendant checks always append the delimiter before
//! comparing prefixes: `team.alpha` is not an ancestor of `team.alphabeta`.

use sha2::{Digest, Sha256};

use crate::models::Node;

/// Segment delimiter in materialized paths
pub const PATH_DELIMITER: char = '.';

/// Derived columns for one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedPath {
    pub path: String,
    pub depth: i64,
    pub node_hash: String,
}

pub struct PathCodec;

impl PathCodec {
    /// Compute derived columns for `node` placed under `parent`.
    ///
    /// Disabled nodes get an empty path. Enabled nodes get `parent.path + "." + name`,
    /// or just `name` when there is no parent.
    pub fn derive(node: &Node, parent: Option<&Node>) -> DerivedPath {
        let path = if node.disabled {
            String::new()
        } else {
            match parent {
                Some(parent) => Self::join(&parent.path, &node.name),
                None => node.name.clone(),
            }
        };
        Self::derive_with_path(node, path)
    }

    /// Compute derived columns from an already rewritten path.
    ///
    /// Used for descendants during a subtree rewrite, where the new path
    /// comes from [`PathCodec::rebase`] rather than from a parent row.
    pub fn derive_with_path(node: &Node, path: String) -> DerivedPath {
        let path = if node.disabled { String::new() } else { path };
        let depth = Self::depth(&path);
        let node_hash = Self::uniqueness_hash(node, &path);
        DerivedPath {
            path,
            depth,
            node_hash,
        }
    }

    /// Uniqueness digest over a domain-tagged input.
    ///
    /// - disabled node: `id:<id>` (never collides with anything)
    /// - enabled leaf: `leaf:<name>` (leaf names are globally unique)
    /// - enabled non-leaf: `path:<path>` (paths are unique)
    pub fn uniqueness_hash(node: &Node, path: &str) -> String {
        let input = if node.disabled {
            format!("id:{}", node.id)
        } else if node.is_leaf {
            format!("leaf:{}", node.name)
        } else {
            format!("path:{}", path)
        };
        format!("{:x}", Sha256::digest(input.as_bytes()))
    }

    /// Number of segments; an empty path counts as one
    pub fn depth(path: &str) -> i64 {
        path.matches(PATH_DELIMITER).count() as i64 + 1
    }

    pub fn join(parent_path: &str, name: &str) -> String {
        if parent_path.is_empty() {
            name.to_string()
        } else {
            format!("{}{}{}", parent_path, PATH_DELIMITER, name)
        }
    }

    /// Prefix shared by all strict descendants of `path`
    pub fn subtree_prefix(path: &str) -> String {
        format!("{}{}", path, PATH_DELIMITER)
    }

    /// Smallest string greater than every string starting with `prefix`.
    ///
    /// `s.starts_with(prefix)` holds exactly when `prefix <= s < bound`
    /// under byte-wise comparison, which lets a prefix match run as an
    /// index range scan. `None` when no bound exists (empty prefix, or one
    /// made only of `char::MAX`).
    pub fn prefix_upper_bound(prefix: &str) -> Option<String> {
        let mut chars: Vec<char> = prefix.chars().collect();
        while let Some(last) = chars.pop() {
            let next = match last as u32 + 1 {
                0xD800 => Some('\u{E000}'),
                code => char::from_u32(code),
            };
            if let Some(next) = next {
                chars.push(next);
                return Some(chars.into_iter().collect());
            }
        }
        None
    }

    /// `true` when `path` equals `root` or lies below it
    pub fn is_within(path: &str, root: &str) -> bool {
        if root.is_empty() || path.is_empty() {
            return false;
        }
        path == root
            || (path.len() > root.len()
                && path.starts_with(root)
                && path[root.len()..].starts_with(PATH_DELIMITER))
    }

    /// `true` when `path` lies strictly below `root`
    pub fn is_descendant(path: &str, root: &str) -> bool {
        path != root && Self::is_within(path, root)
    }

    /// Path without its last segment; empty for a single-segment path
    pub fn parent_path(path: &str) -> &str {
        match path.rfind(PATH_DELIMITER) {
            Some(i) => &path[..i],
            None => "",
        }
    }

    pub fn last_segment(path: &str) -> &str {
        match path.rfind(PATH_DELIMITER) {
            Some(i) => &path[i + 1..],
            None => path,
        }
    }

    /// Every prefix of `path`, root first, `path` itself last.
    ///
    /// `"a.b.c"` yields `["a", "a.b", "a.b.c"]`.
    pub fn ancestor_chain(path: &str) -> Vec<String> {
        if path.is_empty() {
            return Vec::new();
        }
        let mut chain = Vec::new();
        for (i, ch) in path.char_indices() {
            if ch == PATH_DELIMITER {
                chain.push(path[..i].to_string());
            }
        }
        chain.push(path.to_string());
        chain
    }

    /// Union of the ancestor chains of several paths, sorted and deduplicated
    pub fn ancestor_chains<'a, I>(paths: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut all: Vec<String> = paths.into_iter().flat_map(Self::ancestor_chain).collect();
        all.sort();
        all.dedup();
        all
    }

    /// Replace the leading `old_root` of `path` with `new_root`.
    ///
    /// Returns `None` when `path` is not `old_root` or one of its descendants.
    pub fn rebase(path: &str, old_root: &str, new_root: &str) -> Option<String> {
        if !Self::is_within(path, old_root) {
            return None;
        }
        Some(format!("{}{}", new_root, &path[old_root.len()..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(name: &str, is_leaf: bool) -> Node {
        Node::new(name, "", "", is_leaf)
    }

    #[test]
    fn test_derive_root_and_child() {
        let root = enabled("team", false).placed_under(None);
        assert_eq!(root.path, "team");
        assert_eq!(root.depth, 1);

        let child = enabled("alpha", false);
        let derived = PathCodec::derive(&child, Some(&root));
        assert_eq!(derived.path, "team.alpha");
        assert_eq!(derived.depth, 2);
    }

    #[test]
    fn test_derive_disabled_has_empty_path() {
        let root = enabled("team", false).placed_under(None);
        let mut leaf = enabled("svc1", true);
        leaf.disabled = true;

        let derived = PathCodec::derive(&leaf, Some(&root));
        assert_eq!(derived.path, "");
        assert_eq!(derived.depth, 1);
    }

    #[test]
    fn test_hash_domains() {
        let a = enabled("team", false).placed_under(None);
        let b = enabled("team", false).placed_under(None);
        // Same path, different ids: collide on purpose
        assert_eq!(a.node_hash, b.node_hash);

        let leaf_a = enabled("svc1", true).placed_under(Some(&a));
        let other_parent = enabled("other", false).placed_under(None);
        let leaf_b = enabled("svc1", true).placed_under(Some(&other_parent));
        // Leaf names are unique regardless of parent
        assert_eq!(leaf_a.node_hash, leaf_b.node_hash);

        let mut off = enabled("svc1", true);
        off.disabled = true;
        let off = off.placed_under(None);
        assert_ne!(off.node_hash, leaf_a.node_hash);

        // A leaf named like a path must not collide with that path
        let non_leaf = enabled("svc1", false).placed_under(None);
        let leaf_root = enabled("svc1", true).placed_under(None);
        assert_ne!(non_leaf.node_hash, leaf_root.node_hash);

        assert_eq!(a.node_hash.len(), 64);
    }

    #[test]
    fn test_is_within_requires_delimiter() {
        assert!(PathCodec::is_within("team.alpha", "team.alpha"));
        assert!(PathCodec::is_within("team.alpha.svc", "team.alpha"));
        assert!(!PathCodec::is_within("team.alphabeta", "team.alpha"));
        assert!(!PathCodec::is_within("team", "team.alpha"));
        assert!(!PathCodec::is_within("", "team"));

        assert!(PathCodec::is_descendant("team.alpha", "team"));
        assert!(!PathCodec::is_descendant("team", "team"));
    }

    #[test]
    fn test_ancestor_chain() {
        assert_eq!(
            PathCodec::ancestor_chain("a.b.c"),
            vec!["a".to_string(), "a.b".to_string(), "a.b.c".to_string()]
        );
        assert_eq!(PathCodec::ancestor_chain("a"), vec!["a".to_string()]);
        assert!(PathCodec::ancestor_chain("").is_empty());
    }

    #[test]
    fn test_ancestor_chains_dedup() {
        let chains = PathCodec::ancestor_chains(["a.b.c", "a.b.d", "x"]);
        assert_eq!(chains, vec!["a", "a.b", "a.b.c", "a.b.d", "x"]);
    }

    #[test]
    fn test_prefix_upper_bound() {
        assert_eq!(
            PathCodec::prefix_upper_bound("team.alpha.").as_deref(),
            Some("team.alpha/")
        );
        assert_eq!(PathCodec::prefix_upper_bound("ab").as_deref(), Some("ac"));
        assert_eq!(PathCodec::prefix_upper_bound(""), None);
        assert_eq!(
            PathCodec::prefix_upper_bound("a\u{10FFFF}").as_deref(),
            Some("b")
        );
        assert_eq!(PathCodec::prefix_upper_bound("\u{10FFFF}"), None);
        assert_eq!(
            PathCodec::prefix_upper_bound("x\u{D7FF}").as_deref(),
            Some("x\u{E000}")
        );

        let bound = PathCodec::prefix_upper_bound("team.alpha").unwrap_or_default();
        for path in ["team.alpha", "team.alpha.svc1", "team.alphabeta"] {
            assert!(path >= "team.alpha" && path < bound.as_str(), "{}", path);
        }
        for path in ["team.alph", "team.alpi", "team.b"] {
            assert!(!(path >= "team.alpha" && path < bound.as_str()), "{}", path);
        }
    }

    #[test]
    fn test_rebase() {
        assert_eq!(
            PathCodec::rebase("team.alpha.svc", "team.alpha", "org.beta").as_deref(),
            Some("org.beta.svc")
        );
        assert_eq!(
            PathCodec::rebase("team.alpha", "team.alpha", "alpha").as_deref(),
            Some("alpha")
        );
        assert_eq!(PathCodec::rebase("team.alphabeta", "team.alpha", "x"), None);
    }

    #[test]
    fn test_parent_and_last_segment() {
        assert_eq!(PathCodec::parent_path("a.b.c"), "a.b");
        assert_eq!(PathCodec::parent_path("a"), "");
        assert_eq!(PathCodec::last_segment("a.b.c"), "c");
        assert_eq!(PathCodec::last_segment("a"), "a");
    }
}
