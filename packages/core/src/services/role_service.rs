//! Role and grant management
//!
//! Roles are independent of the tree. Grants tie a role and a user to one
//! enabled node; they are deleted together with their node, and with their
//! leaf node when it is disabled with grant cascading.

use crate::db::{DatabaseError, TreeStore, TreeTransaction, TxMode};
use crate::models::{GrantDetail, GrantQuery, NodeRef, NodeRole, Role, RoleUpdate, ValidationError};
use crate::services::error::TreeError;
use crate::services::tree_service::TreeService;
use std::sync::Arc;

/// CRUD over roles and (node, role, user) grants
pub struct RoleService {
    store: Arc<dyn TreeStore>,
}

impl RoleService {
    pub fn new(store: Arc<dyn TreeStore>) -> Self {
        Self { store }
    }

    async fn finish_write<T>(
        tx: Box<dyn TreeTransaction>,
        operation: &str,
        result: Result<T, TreeError>,
    ) -> Result<T, TreeError> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback().await;
                tracing::warn!("{} rolled back: {}", operation, err);
                Err(err)
            }
        }
    }

    //
    // ROLES
    //

    pub async fn create_role(
        &self,
        name: &str,
        alias: &str,
        description: &str,
        can_manage: bool,
    ) -> Result<Role, TreeError> {
        let role = Role::new(name, alias, description, can_manage);
        role.validate()?;

        let mut tx = self.store.begin(TxMode::Write).await?;
        let result: Result<(), TreeError> = async {
            if tx.get_role_by_name(&role.name).await?.is_some() {
                return Err(TreeError::duplicate_role(&role.name));
            }
            match tx.insert_role(&role).await {
                Err(DatabaseError::ConstraintViolation(_)) => {
                    Err(TreeError::duplicate_role(&role.name))
                }
                other => Ok(other?),
            }
        }
        .await;
        Self::finish_write(tx, "create_role", result).await?;

        tracing::info!("Created role {} ('{}')", role.id, role.name);
        Ok(role)
    }

    pub async fn get_role(&self, id: &str) -> Result<Role, TreeError> {
        let mut tx = self.store.begin(TxMode::Read).await?;
        let result = match tx.get_role(id).await {
            Ok(Some(role)) => Ok(role),
            Ok(None) => Err(TreeError::role_not_found(id)),
            Err(err) => Err(err.into()),
        };
        TreeService::finish_read(tx, result).await
    }

    pub async fn get_role_by_name(&self, name: &str) -> Result<Role, TreeError> {
        let mut tx = self.store.begin(TxMode::Read).await?;
        let result = match tx.get_role_by_name(name).await {
            Ok(Some(role)) => Ok(role),
            Ok(None) => Err(TreeError::role_not_found(name)),
            Err(err) => Err(err.into()),
        };
        TreeService::finish_read(tx, result).await
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>, TreeError> {
        let mut tx = self.store.begin(TxMode::Read).await?;
        let result = tx.list_roles().await.map_err(TreeError::from);
        TreeService::finish_read(tx, result).await
    }

    pub async fn update_role(&self, id: &str, update: RoleUpdate) -> Result<Role, TreeError> {
        let mut tx = self.store.begin(TxMode::Write).await?;
        let result: Result<Role, TreeError> = async {
            let current = tx
                .get_role(id)
                .await?
                .ok_or_else(|| TreeError::role_not_found(id))?;
            if update.is_empty() {
                return Ok(current);
            }

            let renamed = update.name.as_ref().is_some_and(|n| n != &current.name);
            let role = current.updated(update);
            role.validate()?;

            if renamed && tx.get_role_by_name(&role.name).await?.is_some() {
                return Err(TreeError::duplicate_role(&role.name));
            }
            tx.update_role(&role).await?;
            Ok(role)
        }
        .await;
        let role = Self::finish_write(tx, "update_role", result).await?;

        tracing::info!("Updated role {} ('{}')", role.id, role.name);
        Ok(role)
    }

    /// Delete a role and every grant of it
    pub async fn delete_role(&self, id: &str) -> Result<(), TreeError> {
        let mut tx = self.store.begin(TxMode::Write).await?;
        let result: Result<(), TreeError> = async {
            if tx.delete_role(id).await? == 0 {
                return Err(TreeError::role_not_found(id));
            }
            Ok(())
        }
        .await;
        Self::finish_write(tx, "delete_role", result).await?;

        tracing::info!("Deleted role {}", id);
        Ok(())
    }

    //
    // GRANTS
    //

    /// Grant `role_id` to `user_id` at `node`
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` / `RoleNotFound` for unknown references
    /// - `DisabledNode` when the node is disabled
    /// - `DuplicateGrant` when the triple already exists
    pub async fn grant(
        &self,
        node: &NodeRef,
        role_id: &str,
        user_id: &str,
    ) -> Result<NodeRole, TreeError> {
        if user_id.trim().is_empty() {
            return Err(ValidationError::Empty("user id").into());
        }

        let mut tx = self.store.begin(TxMode::Write).await?;
        let result: Result<NodeRole, TreeError> = async {
            let node = TreeService::require_in(tx.as_mut(), node).await?;
            if node.disabled {
                return Err(TreeError::disabled_node(&node.id));
            }
            let role = tx
                .get_role(role_id)
                .await?
                .ok_or_else(|| TreeError::role_not_found(role_id))?;

            let grant = NodeRole::new(&node.id, &role.id, user_id);
            match tx.insert_grant(&grant).await {
                Err(DatabaseError::ConstraintViolation(_)) => Err(TreeError::DuplicateGrant {
                    node_id: node.id.clone(),
                    role_id: role.id.clone(),
                    user_id: user_id.to_string(),
                }),
                other => {
                    other?;
                    Ok(grant)
                }
            }
        }
        .await;
        let grant = Self::finish_write(tx, "grant", result).await?;

        tracing::info!(
            "Granted role {} to user {} at node {}",
            grant.role_id,
            grant.user_id,
            grant.node_id
        );
        Ok(grant)
    }

    /// Revoke a grant by id
    pub async fn revoke(&self, grant_id: &str) -> Result<(), TreeError> {
        let query = GrantQuery {
            id: Some(grant_id.to_string()),
            ..GrantQuery::default()
        };
        let mut tx = self.store.begin(TxMode::Write).await?;
        let result: Result<(), TreeError> = async {
            if tx.delete_grants(&query).await? == 0 {
                return Err(TreeError::grant_not_found(grant_id));
            }
            Ok(())
        }
        .await;
        Self::finish_write(tx, "revoke", result).await?;

        tracing::info!("Revoked grant {}", grant_id);
        Ok(())
    }

    /// Revoke the grant of `role_id` to `user_id` at `node_id`
    pub async fn revoke_triple(
        &self,
        node_id: &str,
        role_id: &str,
        user_id: &str,
    ) -> Result<(), TreeError> {
        let query = GrantQuery::new()
            .with_node_id(node_id)
            .with_role_id(role_id)
            .with_user_id(user_id);
        let mut tx = self.store.begin(TxMode::Write).await?;
        let result: Result<(), TreeError> = async {
            if tx.delete_grants(&query).await? == 0 {
                return Err(TreeError::grant_not_found(format!(
                    "{}/{}/{}",
                    node_id, role_id, user_id
                )));
            }
            Ok(())
        }
        .await;
        Self::finish_write(tx, "revoke_triple", result).await?;

        tracing::info!(
            "Revoked role {} from user {} at node {}",
            role_id,
            user_id,
            node_id
        );
        Ok(())
    }

    pub async fn list_grants(&self, query: &GrantQuery) -> Result<Vec<GrantDetail>, TreeError> {
        let mut tx = self.store.begin(TxMode::Read).await?;
        let result = tx.find_grants(query).await.map_err(TreeError::from);
        TreeService::finish_read(tx, result).await
    }
}

// Service-level tests against a real libsql store
#[cfg(test)]
#[path = "role_service_test.rs"]
mod role_service_test;
