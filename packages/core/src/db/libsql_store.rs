//! LibsqlStore - TreeStore Implementation for libsql
//!
//! Each transaction owns its own connection. `TxMode::Write` issues
//! `BEGIN IMMEDIATE`, so the SQLite write lock is taken before the first
//! read: two writers touching overlapping subtrees can never both read
//! the same pre-move paths. A writer that cannot get the lock within the
//! busy timeout fails with [`DatabaseError::Busy`].
//!
//! # Row Conversion
//!
//! Booleans are stored as `INTEGER` 0/1 and timestamps as RFC 3339 text.
//! [`NodeQuery`] and [`GrantQuery`] are compiled into parameterized `WHERE`
//! clauses. Path prefixes compile to a half-open range
//! (`path >= prefix AND path < bound`) rather than `LIKE`, so no character
//! in a path is a wildcard and the `path` index serves the scan.
//!
//! # Batching
//!
//! Lists of ids, paths or roots are bound one value per placeholder.
//! Queries whose lists exceed [`MAX_BOUND_VALUES`] run once per batch and
//! the results are merged, keeping every statement under SQLite's limit
//! on host parameters.

use crate::db::tree_store::{TreeStore, TreeTransaction, TxMode};
use crate::db::{DatabaseError, DatabaseService};
use crate::models::{GrantDetail, GrantQuery, Node, NodeOrder, NodeQuery, NodeRole, Role};
use crate::path_codec::PathCodec;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::params::Params;
use libsql::{Connection, Row, Value};
use std::collections::HashSet;
use std::sync::Arc;

const NODE_COLUMNS: &str = "id, name, alias, description, parent_id, is_leaf, disabled, path, \
     depth, node_hash, version, created_at, updated_at";

const ROLE_COLUMNS: &str = "id, name, alias, description, can_manage, created_at, updated_at";

const GRANT_SELECT: &str = "SELECT g.id, g.node_id, g.role_id, g.user_id, g.created_at, \
     n.path, n.name, r.name, r.can_manage \
     FROM node_roles g \
     JOIN nodes n ON n.id = g.node_id \
     JOIN roles r ON r.id = g.role_id";

/// Upper limit on values bound for one list predicate; SQLite builds older
/// than 3.32 reject statements with more than 999 parameters
pub const MAX_BOUND_VALUES: usize = 900;

/// TreeStore backed by a libsql database
pub struct LibsqlStore {
    db: Arc<DatabaseService>,
}

impl LibsqlStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }
}

#[async_trait]
impl TreeStore for LibsqlStore {
    async fn begin(&self, mode: TxMode) -> Result<Box<dyn TreeTransaction>, DatabaseError> {
        let conn = self.db.connect_with_timeout().await?;
        let statement = match mode {
            TxMode::Read => "BEGIN DEFERRED",
            TxMode::Write => "BEGIN IMMEDIATE",
        };
        conn.execute(statement, ()).await?;
        tracing::debug!("Began {:?} transaction", mode);
        Ok(Box::new(LibsqlTransaction { conn }))
    }
}

/// One open libsql transaction
pub struct LibsqlTransaction {
    conn: Connection,
}

/// `WHERE` clause under construction
#[derive(Default)]
struct Filter {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Filter {
    fn push(&mut self, clause: impl Into<String>, params: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.into());
        self.params.extend(params);
    }

    fn eq(&mut self, column: &str, value: Value) {
        self.push(format!("{} = ?", column), [value]);
    }

    fn in_list(&mut self, column: &str, values: &[String]) {
        if values.is_empty() {
            self.push("0", []);
        } else {
            let marks = vec!["?"; values.len()].join(", ");
            self.push(
                format!("{} IN ({})", column, marks),
                values.iter().map(|v| text(v)),
            );
        }
    }

    /// Raw string prefix without pattern semantics, as an index range
    fn starts_with(&mut self, column: &str, prefix: &str) {
        let (clause, params) = prefix_range(column, prefix);
        self.push(clause, params);
    }

    fn contains(&mut self, column: &str, value: &str) {
        self.push(format!("instr({}, ?) > 0", column), [text(value)]);
    }

    /// Path equals one of `roots` or lies below one of them
    fn within(&mut self, column: &str, roots: &[String]) {
        if roots.is_empty() {
            self.push("0", []);
            return;
        }
        let mut alternatives = Vec::with_capacity(roots.len());
        let mut params = Vec::with_capacity(roots.len() * 3);
        for root in roots {
            let (range, bounds) = prefix_range(column, &PathCodec::subtree_prefix(root));
            alternatives.push(format!("({} = ? OR {})", column, range));
            params.push(text(root));
            params.extend(bounds);
        }
        self.push(format!("({})", alternatives.join(" OR ")), params);
    }

    fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// `column >= prefix AND column < bound`, open-ended when no bound exists
fn prefix_range(column: &str, prefix: &str) -> (String, Vec<Value>) {
    match PathCodec::prefix_upper_bound(prefix) {
        Some(bound) => (
            format!("({c} >= ? AND {c} < ?)", c = column),
            vec![text(prefix), text(&bound)],
        ),
        None => (format!("{} >= ?", column), vec![text(prefix)]),
    }
}

/// Split `list` into batches and rebuild the query around each
fn batched<Q, F>(query: &Q, list: Option<&Vec<String>>, size: usize, rebuild: F) -> Option<Vec<Q>>
where
    F: Fn(&Q, Vec<String>) -> Q,
{
    let list = list.filter(|l| l.len() > size)?;
    Some(list.chunks(size).map(|chunk| rebuild(query, chunk.to_vec())).collect())
}

/// One query per batch of every oversized list field
fn node_batches(query: &NodeQuery) -> Vec<NodeQuery> {
    let split = batched(query, query.ids.as_ref(), MAX_BOUND_VALUES, |q, ids| NodeQuery {
        ids: Some(ids),
        ..q.clone()
    })
    .or_else(|| {
        batched(query, query.paths.as_ref(), MAX_BOUND_VALUES, |q, paths| NodeQuery {
            paths: Some(paths),
            ..q.clone()
        })
    })
    .or_else(|| {
        // Three values per root
        batched(query, query.within.as_ref(), MAX_BOUND_VALUES / 3, |q, roots| NodeQuery {
            within: Some(roots),
            ..q.clone()
        })
    });
    match split {
        Some(parts) => parts.iter().flat_map(node_batches).collect(),
        None => vec![query.clone()],
    }
}

fn grant_batches(query: &GrantQuery) -> Vec<GrantQuery> {
    let split = batched(query, query.node_ids.as_ref(), MAX_BOUND_VALUES, |q, ids| GrantQuery {
        node_ids: Some(ids),
        ..q.clone()
    })
    .or_else(|| {
        batched(query, query.node_paths.as_ref(), MAX_BOUND_VALUES, |q, paths| GrantQuery {
            node_paths: Some(paths),
            ..q.clone()
        })
    })
    .or_else(|| {
        batched(query, query.role_ids.as_ref(), MAX_BOUND_VALUES, |q, ids| GrantQuery {
            role_ids: Some(ids),
            ..q.clone()
        })
    });
    match split {
        Some(parts) => parts.iter().flat_map(grant_batches).collect(),
        None => vec![query.clone()],
    }
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn int(value: i64) -> Value {
    Value::Integer(value)
}

fn flag(value: bool) -> Value {
    Value::Integer(value as i64)
}

fn opt_text(value: Option<&str>) -> Value {
    value.map(text).unwrap_or(Value::Null)
}

fn timestamp(value: &DateTime<Utc>) -> Value {
    Value::Text(value.to_rfc3339())
}

fn node_filter(query: &NodeQuery) -> Filter {
    let mut filter = Filter::default();
    if let Some(id) = &query.id {
        filter.eq("id", text(id));
    }
    if let Some(ids) = &query.ids {
        filter.in_list("id", ids);
    }
    if let Some(name) = &query.name {
        filter.eq("name", text(name));
    }
    if let Some(value) = &query.name_contains {
        filter.contains("name", value);
    }
    if let Some(path) = &query.path {
        filter.eq("path", text(path));
    }
    if let Some(paths) = &query.paths {
        filter.in_list("path", paths);
    }
    if let Some(prefix) = &query.path_starts_with {
        filter.starts_with("path", prefix);
    }
    if let Some(value) = &query.path_contains {
        filter.contains("path", value);
    }
    if let Some(roots) = &query.within {
        filter.within("path", roots);
    }
    if let Some(parent_id) = &query.parent_id {
        filter.eq("parent_id", text(parent_id));
    }
    if let Some(is_root) = query.is_root {
        filter.push(
            if is_root {
                "parent_id IS NULL"
            } else {
                "parent_id IS NOT NULL"
            },
            [],
        );
    }
    if let Some(is_leaf) = query.is_leaf {
        filter.eq("is_leaf", flag(is_leaf));
    }
    if let Some(disabled) = query.disabled {
        filter.eq("disabled", flag(disabled));
    }
    if let Some(depth) = query.depth_lte {
        filter.push("depth <= ?", [int(depth)]);
    }
    filter
}

fn order_clause(order: NodeOrder) -> &'static str {
    match order {
        NodeOrder::Path => " ORDER BY path, id",
        NodeOrder::Name => " ORDER BY name, id",
    }
}

fn grant_filter(query: &GrantQuery) -> Filter {
    let mut filter = Filter::default();
    if let Some(id) = &query.id {
        filter.eq("g.id", text(id));
    }
    if let Some(node_id) = &query.node_id {
        filter.eq("g.node_id", text(node_id));
    }
    if let Some(node_ids) = &query.node_ids {
        filter.in_list("g.node_id", node_ids);
    }
    if let Some(paths) = &query.node_paths {
        filter.in_list("n.path", paths);
    }
    if let Some(role_id) = &query.role_id {
        filter.eq("g.role_id", text(role_id));
    }
    if let Some(role_ids) = &query.role_ids {
        filter.in_list("g.role_id", role_ids);
    }
    if let Some(user_id) = &query.user_id {
        filter.eq("g.user_id", text(user_id));
    }
    if let Some(can_manage) = query.can_manage {
        filter.eq("r.can_manage", flag(can_manage));
    }
    if let Some(disabled) = query.node_disabled {
        filter.eq("n.disabled", flag(disabled));
    }
    filter
}

fn get_text(row: &Row, table: &'static str, idx: i32, column: &str) -> Result<String, DatabaseError> {
    row.get::<String>(idx)
        .map_err(|e| DatabaseError::row_decode(table, format!("{}: {}", column, e)))
}

fn get_opt_text(
    row: &Row,
    table: &'static str,
    idx: i32,
    column: &str,
) -> Result<Option<String>, DatabaseError> {
    row.get::<Option<String>>(idx)
        .map_err(|e| DatabaseError::row_decode(table, format!("{}: {}", column, e)))
}

fn get_int(row: &Row, table: &'static str, idx: i32, column: &str) -> Result<i64, DatabaseError> {
    row.get::<i64>(idx)
        .map_err(|e| DatabaseError::row_decode(table, format!("{}: {}", column, e)))
}

fn get_timestamp(
    row: &Row,
    table: &'static str,
    idx: i32,
    column: &str,
) -> Result<DateTime<Utc>, DatabaseError> {
    let raw = get_text(row, table, idx, column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DatabaseError::row_decode(table, format!("{} '{}': {}", column, raw, e)))
}

fn row_to_node(row: &Row) -> Result<Node, DatabaseError> {
    const T: &str = "nodes";
    Ok(Node {
        id: get_text(row, T, 0, "id")?,
        name: get_text(row, T, 1, "name")?,
        alias: get_text(row, T, 2, "alias")?,
        description: get_text(row, T, 3, "description")?,
        parent_id: get_opt_text(row, T, 4, "parent_id")?,
        is_leaf: get_int(row, T, 5, "is_leaf")? != 0,
        disabled: get_int(row, T, 6, "disabled")? != 0,
        path: get_text(row, T, 7, "path")?,
        depth: get_int(row, T, 8, "depth")?,
        node_hash: get_text(row, T, 9, "node_hash")?,
        version: get_int(row, T, 10, "version")?,
        created_at: get_timestamp(row, T, 11, "created_at")?,
        updated_at: get_timestamp(row, T, 12, "updated_at")?,
    })
}

fn row_to_role(row: &Row) -> Result<Role, DatabaseError> {
    const T: &str = "roles";
    Ok(Role {
        id: get_text(row, T, 0, "id")?,
        name: get_text(row, T, 1, "name")?,
        alias: get_text(row, T, 2, "alias")?,
        description: get_text(row, T, 3, "description")?,
        can_manage: get_int(row, T, 4, "can_manage")? != 0,
        created_at: get_timestamp(row, T, 5, "created_at")?,
        updated_at: get_timestamp(row, T, 6, "updated_at")?,
    })
}

fn row_to_grant(row: &Row) -> Result<GrantDetail, DatabaseError> {
    const T: &str = "node_roles";
    Ok(GrantDetail {
        grant: NodeRole {
            id: get_text(row, T, 0, "id")?,
            node_id: get_text(row, T, 1, "node_id")?,
            role_id: get_text(row, T, 2, "role_id")?,
            user_id: get_text(row, T, 3, "user_id")?,
            created_at: get_timestamp(row, T, 4, "created_at")?,
        },
        node_path: get_text(row, T, 5, "path")?,
        node_name: get_text(row, T, 6, "node name")?,
        role_name: get_text(row, T, 7, "role name")?,
        can_manage: get_int(row, T, 8, "can_manage")? != 0,
    })
}

impl LibsqlTransaction {
    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<u64, DatabaseError> {
        Ok(self.conn.execute(sql, Params::Positional(params)).await?)
    }

    async fn collect<T, F>(&self, sql: &str, params: Vec<Value>, convert: F) -> Result<Vec<T>, DatabaseError>
    where
        F: Fn(&Row) -> Result<T, DatabaseError>,
    {
        let mut rows = self.conn.query(sql, Params::Positional(params)).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(convert(&row)?);
        }
        Ok(out)
    }
}

#[async_trait]
impl TreeTransaction for LibsqlTransaction {
    async fn get_node(&mut self, id: &str) -> Result<Option<Node>, DatabaseError> {
        let sql = format!("SELECT {} FROM nodes WHERE id = ?", NODE_COLUMNS);
        let mut nodes = self.collect(&sql, vec![text(id)], row_to_node).await?;
        Ok(nodes.pop())
    }

    async fn find_nodes(&mut self, query: &NodeQuery) -> Result<Vec<Node>, DatabaseError> {
        let batches = node_batches(query);
        if batches.len() > 1 {
            tracing::debug!("Splitting node query into {} batches", batches.len());
        }

        let mut nodes = Vec::new();
        for batch in &batches {
            let filter = node_filter(batch);
            let sql = format!(
                "SELECT {} FROM nodes{}{}",
                NODE_COLUMNS,
                filter.where_clause(),
                order_clause(query.order_by)
            );
            nodes.extend(self.collect(&sql, filter.params, row_to_node).await?);
        }

        if batches.len() > 1 {
            // Overlapping roots can match a row in more than one batch
            let mut seen = HashSet::new();
            nodes.retain(|n| seen.insert(n.id.clone()));
            match query.order_by {
                NodeOrder::Path => nodes.sort_by(|a, b| (&a.path, &a.id).cmp(&(&b.path, &b.id))),
                NodeOrder::Name => nodes.sort_by(|a, b| (&a.name, &a.id).cmp(&(&b.name, &b.id))),
            }
        }
        Ok(nodes)
    }

    async fn count_nodes(&mut self, query: &NodeQuery) -> Result<u64, DatabaseError> {
        if node_batches(query).len() > 1 {
            return Ok(self.find_nodes(query).await?.len() as u64);
        }
        let filter = node_filter(query);
        let sql = format!("SELECT COUNT(*) FROM nodes{}", filter.where_clause());
        let counts = self
            .collect(&sql, filter.params, |row| get_int(row, "nodes", 0, "count"))
            .await?;
        Ok(counts.first().copied().unwrap_or(0) as u64)
    }

    async fn insert_node(&mut self, node: &Node) -> Result<(), DatabaseError> {
        let sql = format!(
            "INSERT INTO nodes ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            NODE_COLUMNS
        );
        self.execute(
            &sql,
            vec![
                text(&node.id),
                text(&node.name),
                text(&node.alias),
                text(&node.description),
                opt_text(node.parent_id.as_deref()),
                flag(node.is_leaf),
                flag(node.disabled),
                text(&node.path),
                int(node.depth),
                text(&node.node_hash),
                int(node.version),
                timestamp(&node.created_at),
                timestamp(&node.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_node(
        &mut self,
        node: &Node,
        expected_version: i64,
    ) -> Result<(), DatabaseError> {
        let changed = self
            .execute(
                "UPDATE nodes SET name = ?, alias = ?, description = ?, parent_id = ?, \
                 is_leaf = ?, disabled = ?, path = ?, depth = ?, node_hash = ?, version = ?, \
                 updated_at = ? \
                 WHERE id = ? AND version = ?",
                vec![
                    text(&node.name),
                    text(&node.alias),
                    text(&node.description),
                    opt_text(node.parent_id.as_deref()),
                    flag(node.is_leaf),
                    flag(node.disabled),
                    text(&node.path),
                    int(node.depth),
                    text(&node.node_hash),
                    int(node.version),
                    timestamp(&node.updated_at),
                    text(&node.id),
                    int(expected_version),
                ],
            )
            .await?;

        if changed == 0 {
            return Err(DatabaseError::version_conflict(
                "nodes",
                &node.id,
                expected_version,
            ));
        }
        Ok(())
    }

    async fn delete_nodes(&mut self, ids: &[String]) -> Result<u64, DatabaseError> {
        let mut deleted = 0;
        for batch in ids.chunks(MAX_BOUND_VALUES) {
            let mut filter = Filter::default();
            filter.in_list("id", batch);
            let sql = format!("DELETE FROM nodes{}", filter.where_clause());
            deleted += self.execute(&sql, filter.params).await?;
        }
        Ok(deleted)
    }

    async fn get_role(&mut self, id: &str) -> Result<Option<Role>, DatabaseError> {
        let sql = format!("SELECT {} FROM roles WHERE id = ?", ROLE_COLUMNS);
        let mut roles = self.collect(&sql, vec![text(id)], row_to_role).await?;
        Ok(roles.pop())
    }

    async fn get_role_by_name(&mut self, name: &str) -> Result<Option<Role>, DatabaseError> {
        let sql = format!("SELECT {} FROM roles WHERE name = ?", ROLE_COLUMNS);
        let mut roles = self.collect(&sql, vec![text(name)], row_to_role).await?;
        Ok(roles.pop())
    }

    async fn list_roles(&mut self) -> Result<Vec<Role>, DatabaseError> {
        let sql = format!("SELECT {} FROM roles ORDER BY name", ROLE_COLUMNS);
        self.collect(&sql, Vec::new(), row_to_role).await
    }

    async fn insert_role(&mut self, role: &Role) -> Result<(), DatabaseError> {
        let sql = format!(
            "INSERT INTO roles ({}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            ROLE_COLUMNS
        );
        self.execute(
            &sql,
            vec![
                text(&role.id),
                text(&role.name),
                text(&role.alias),
                text(&role.description),
                flag(role.can_manage),
                timestamp(&role.created_at),
                timestamp(&role.updated_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_role(&mut self, role: &Role) -> Result<u64, DatabaseError> {
        self.execute(
            "UPDATE roles SET name = ?, alias = ?, description = ?, can_manage = ?, updated_at = ? \
             WHERE id = ?",
            vec![
                text(&role.name),
                text(&role.alias),
                text(&role.description),
                flag(role.can_manage),
                timestamp(&role.updated_at),
                text(&role.id),
            ],
        )
        .await
    }

    async fn delete_role(&mut self, id: &str) -> Result<u64, DatabaseError> {
        self.execute("DELETE FROM node_roles WHERE role_id = ?", vec![text(id)])
            .await?;
        self.execute("DELETE FROM roles WHERE id = ?", vec![text(id)])
            .await
    }

    async fn insert_grant(&mut self, grant: &NodeRole) -> Result<(), DatabaseError> {
        self.execute(
            "INSERT INTO node_roles (id, node_id, role_id, user_id, created_at) \
             VALUES (?, ?, ?, ?, ?)",
            vec![
                text(&grant.id),
                text(&grant.node_id),
                text(&grant.role_id),
                text(&grant.user_id),
                timestamp(&grant.created_at),
            ],
        )
        .await?;
        Ok(())
    }

    async fn find_grants(&mut self, query: &GrantQuery) -> Result<Vec<GrantDetail>, DatabaseError> {
        let batches = grant_batches(query);
        let mut grants = Vec::new();
        for batch in &batches {
            let filter = grant_filter(batch);
            let sql = format!(
                "{}{} ORDER BY n.path, r.name, g.user_id",
                GRANT_SELECT,
                filter.where_clause()
            );
            grants.extend(self.collect(&sql, filter.params, row_to_grant).await?);
        }

        if batches.len() > 1 {
            let mut seen = HashSet::new();
            grants.retain(|g| seen.insert(g.grant.id.clone()));
            grants.sort_by(|a, b| {
                (&a.node_path, &a.role_name, &a.grant.user_id).cmp(&(
                    &b.node_path,
                    &b.role_name,
                    &b.grant.user_id,
                ))
            });
        }
        Ok(grants)
    }

    async fn delete_grants(&mut self, query: &GrantQuery) -> Result<u64, DatabaseError> {
        if grant_filter(query).is_empty() {
            return Err(DatabaseError::sql_execution(
                "Refusing to delete grants without a filter",
            ));
        }

        let mut deleted = 0;
        for batch in grant_batches(query) {
            let filter = grant_filter(&batch);
            let sql = format!(
                "DELETE FROM node_roles WHERE id IN (SELECT g.id FROM node_roles g \
                 JOIN nodes n ON n.id = g.node_id \
                 JOIN roles r ON r.id = g.role_id{})",
                filter.where_clause()
            );
            deleted += self.execute(&sql, filter.params).await?;
        }
        Ok(deleted)
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            let _ = self.conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::from(e));
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.conn.execute("ROLLBACK", ()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_store() -> anyhow::Result<(LibsqlStore, TempDir)> {
        let temp_dir = TempDir::new()?;
        let db = DatabaseService::new(temp_dir.path().join("store.db")).await?;
        Ok((LibsqlStore::new(Arc::new(db)), temp_dir))
    }

    #[tokio::test]
    async fn test_insert_and_query_nodes() -> anyhow::Result<()> {
        let (store, _temp) = open_store().await?;
        let team = Node::new("team", "Team", "", false).placed_under(None);
        let alpha = Node::new("alpha", "", "", false).placed_under(Some(&team));
        let alphabeta = Node::new("alphabeta", "", "", false).placed_under(Some(&team));

        let mut tx = store.begin(TxMode::Write).await?;
        tx.insert_node(&team).await?;
        tx.insert_node(&alpha).await?;
        tx.insert_node(&alphabeta).await?;
        tx.commit().await?;

        let mut tx = store.begin(TxMode::Read).await?;
        let loaded = tx.get_node(&alpha.id).await?.expect("alpha stored");
        assert_eq!(loaded, alpha);

        let within = tx
            .find_nodes(&NodeQuery::new().with_within(vec!["team.alpha".into()]))
            .await?;
        assert_eq!(within.len(), 1);
        assert_eq!(within[0].id, alpha.id);

        let children = tx
            .count_nodes(&NodeQuery::new().with_parent_id(&team.id))
            .await?;
        assert_eq!(children, 2);

        let contains = tx
            .find_nodes(&NodeQuery::new().with_path_contains("alpha"))
            .await?;
        assert_eq!(contains.len(), 2);
        tx.commit().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_hash_is_constraint_violation() -> anyhow::Result<()> {
        let (store, _temp) = open_store().await?;
        let first = Node::new("team", "", "", false).placed_under(None);
        let second = Node::new("team", "", "", false).placed_under(None);

        let mut tx = store.begin(TxMode::Write).await?;
        tx.insert_node(&first).await?;
        let err = tx.insert_node(&second).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
        tx.rollback().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() -> anyhow::Result<()> {
        let (store, _temp) = open_store().await?;
        let team = Node::new("team", "", "", false).placed_under(None);

        let mut tx = store.begin(TxMode::Write).await?;
        tx.insert_node(&team).await?;

        let mut updated = team.clone();
        updated.alias = "Team".into();
        updated.version = 2;
        tx.update_node(&updated, 1).await?;

        let err = tx.update_node(&updated, 1).await.unwrap_err();
        assert!(matches!(err, DatabaseError::VersionConflict { .. }));
        tx.commit().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() -> anyhow::Result<()> {
        let (store, _temp) = open_store().await?;
        let team = Node::new("team", "", "", false).placed_under(None);

        let mut tx = store.begin(TxMode::Write).await?;
        tx.insert_node(&team).await?;
        tx.rollback().await?;

        let mut tx = store.begin(TxMode::Read).await?;
        assert!(tx.get_node(&team.id).await?.is_none());
        tx.commit().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_grants_join_and_cascade() -> anyhow::Result<()> {
        let (store, _temp) = open_store().await?;
        let team = Node::new("team", "", "", false).placed_under(None);
        let role = Role::new("admin", "", "", true);
        let grant = NodeRole::new(&team.id, &role.id, "user-1");

        let mut tx = store.begin(TxMode::Write).await?;
        tx.insert_node(&team).await?;
        tx.insert_role(&role).await?;
        tx.insert_grant(&grant).await?;

        let duplicate = NodeRole::new(&team.id, &role.id, "user-1");
        assert!(matches!(
            tx.insert_grant(&duplicate).await,
            Err(DatabaseError::ConstraintViolation(_))
        ));

        let found = tx.find_grants(&GrantQuery::for_user("user-1")).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].node_path, "team");
        assert_eq!(found[0].role_name, "admin");
        assert!(found[0].can_manage);

        tx.delete_nodes(&[team.id.clone()]).await?;
        assert!(tx.find_grants(&GrantQuery::for_user("user-1")).await?.is_empty());
        tx.commit().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_prefix_match_is_literal_range() -> anyhow::Result<()> {
        let (store, _temp) = open_store().await?;
        let team = Node::new("team", "", "", false).placed_under(None);
        let alpha = Node::new("alpha", "", "", false).placed_under(Some(&team));
        let alphabeta = Node::new("alphabeta", "", "", false).placed_under(Some(&team));
        let deep = Node::new("deep", "", "", false).placed_under(Some(&alpha));

        let mut tx = store.begin(TxMode::Write).await?;
        for node in [&team, &alpha, &alphabeta, &deep] {
            tx.insert_node(node).await?;
        }
        // Pattern characters must match only themselves
        for name in ["a%b", "axb", "a_c", "abc"] {
            tx.insert_node(&Node::new(name, "", "", false).placed_under(None))
                .await?;
        }
        tx.commit().await?;

        let mut tx = store.begin(TxMode::Read).await?;
        let paths = |nodes: Vec<Node>| nodes.into_iter().map(|n| n.path).collect::<Vec<_>>();

        let below = tx
            .find_nodes(&NodeQuery::new().with_path_starts_with("team.alpha."))
            .await?;
        assert_eq!(paths(below), vec!["team.alpha.deep"]);

        let raw = tx
            .find_nodes(&NodeQuery::new().with_path_starts_with("team.alpha"))
            .await?;
        assert_eq!(
            paths(raw),
            vec!["team.alpha", "team.alpha.deep", "team.alphabeta"]
        );

        let within = tx
            .find_nodes(&NodeQuery::new().with_within(vec!["team.alpha".into()]))
            .await?;
        assert_eq!(paths(within), vec!["team.alpha", "team.alpha.deep"]);

        let percent = tx
            .find_nodes(&NodeQuery::new().with_path_starts_with("a%"))
            .await?;
        assert_eq!(paths(percent), vec!["a%b"]);

        let underscore = tx
            .find_nodes(&NodeQuery::new().with_path_starts_with("a_"))
            .await?;
        assert_eq!(paths(underscore), vec!["a_c"]);
        tx.commit().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_large_lists_run_in_batches() -> anyhow::Result<()> {
        let (store, _temp) = open_store().await?;
        let nodes: Vec<Node> = (0..1500)
            .map(|i| Node::new(format!("n{:04}", i), "", "", false).placed_under(None))
            .collect();
        let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        let paths: Vec<String> = nodes.iter().map(|n| n.path.clone()).collect();
        let role = Role::new("viewer", "", "", false);

        let mut tx = store.begin(TxMode::Write).await?;
        for node in &nodes {
            tx.insert_node(node).await?;
        }
        tx.insert_role(&role).await?;
        tx.insert_grant(&NodeRole::new(&nodes[10].id, &role.id, "user-1"))
            .await?;
        tx.insert_grant(&NodeRole::new(&nodes[1400].id, &role.id, "user-1"))
            .await?;
        tx.commit().await?;

        let mut tx = store.begin(TxMode::Write).await?;
        let found = tx
            .find_nodes(&NodeQuery::new().with_ids(ids.clone()))
            .await?;
        assert_eq!(found.len(), 1500);
        assert_eq!(found[0].path, "n0000");
        assert_eq!(found[1499].path, "n1499");
        assert!(found.windows(2).all(|w| w[0].path < w[1].path));

        let count = tx
            .count_nodes(&NodeQuery::new().with_paths(paths.clone()))
            .await?;
        assert_eq!(count, 1500);

        // Repeated roots land in different batches and must not double count
        let mut roots = paths.clone();
        roots.extend(paths[..50].iter().cloned());
        let within = tx
            .find_nodes(&NodeQuery::new().with_within(roots.clone()))
            .await?;
        assert_eq!(within.len(), 1500);
        assert_eq!(
            tx.count_nodes(&NodeQuery::new().with_within(roots)).await?,
            1500
        );

        let grants = tx
            .find_grants(&GrantQuery::new().with_node_ids(ids.clone()))
            .await?;
        let granted: Vec<&str> = grants.iter().map(|g| g.node_path.as_str()).collect();
        assert_eq!(granted, vec!["n0010", "n1400"]);

        let revoked = tx
            .delete_grants(&GrantQuery::new().with_node_ids(ids.clone()))
            .await?;
        assert_eq!(revoked, 2);

        assert_eq!(tx.delete_nodes(&ids).await?, 1500);
        assert_eq!(tx.count_nodes(&NodeQuery::new()).await?, 0);
        tx.commit().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_grants_requires_filter() -> anyhow::Result<()> {
        let (store, _temp) = open_store().await?;
        let mut tx = store.begin(TxMode::Write).await?;
        assert!(tx.delete_grants(&GrantQuery::new()).await.is_err());
        tx.rollback().await?;
        Ok(())
    }
}
