//! Roles and role grants
//!
//! A [`Role`] is a named capability set. A [`NodeRole`] grants one role to one
//! user at one node; by prefix expansion the grant also covers every
//! descendant of that node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::{
    validate_length, validate_name, ValidationError, MAX_ALIAS_LENGTH, MAX_DESCRIPTION_LENGTH,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub description: String,
    /// Holder may administer grants at and under the granted node
    #[serde(default)]
    pub can_manage: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(
        name: impl Into<String>,
        alias: impl Into<String>,
        description: impl Into<String>,
        can_manage: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            alias: alias.into(),
            description: description.into(),
            can_manage,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name("role name", &self.name)?;
        validate_length("alias", &self.alias, MAX_ALIAS_LENGTH)?;
        validate_length("description", &self.description, MAX_DESCRIPTION_LENGTH)?;
        Ok(())
    }

    /// Apply a typed update, returning the new snapshot
    pub fn updated(mut self, update: RoleUpdate) -> Self {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(alias) = update.alias {
            self.alias = alias;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(can_manage) = update.can_manage {
            self.can_manage = can_manage;
        }
        self.updated_at = Utc::now();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub alias: Option<String>,
    pub description: Option<String>,
    pub can_manage: Option<bool>,
}

impl RoleUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.alias.is_none()
            && self.description.is_none()
            && self.can_manage.is_none()
    }
}

/// A (node, role, user) grant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRole {
    pub id: String,
    pub node_id: String,
    pub role_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl NodeRole {
    pub fn new(
        node_id: impl Into<String>,
        role_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            node_id: node_id.into(),
            role_id: role_id.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Filter over grants, joined with their node and role.
///
/// All set fields are combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantQuery {
    pub id: Option<String>,
    pub node_id: Option<String>,
    pub node_ids: Option<Vec<String>>,
    pub node_paths: Option<Vec<String>>,
    pub role_id: Option<String>,
    pub role_ids: Option<Vec<String>>,
    pub user_id: Option<String>,
    /// Restrict to grants whose role has this `can_manage` flag
    pub can_manage: Option<bool>,
    /// Restrict to grants on enabled (`false`) or disabled (`true`) nodes
    pub node_disabled: Option<bool>,
}

impl GrantQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_node_ids(mut self, node_ids: Vec<String>) -> Self {
        self.node_ids = Some(node_ids);
        self
    }

    pub fn with_node_paths(mut self, paths: Vec<String>) -> Self {
        self.node_paths = Some(paths);
        self
    }

    pub fn with_role_id(mut self, role_id: impl Into<String>) -> Self {
        self.role_id = Some(role_id.into());
        self
    }

    pub fn with_role_ids(mut self, role_ids: Vec<String>) -> Self {
        self.role_ids = Some(role_ids);
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_can_manage(mut self, can_manage: bool) -> Self {
        self.can_manage = Some(can_manage);
        self
    }

    pub fn with_node_disabled(mut self, disabled: bool) -> Self {
        self.node_disabled = Some(disabled);
        self
    }
}

/// A grant together with the node and role it refers to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantDetail {
    #[serde(flatten)]
    pub grant: NodeRole,
    pub node_path: String,
    pub node_name: String,
    pub role_name: String,
    pub can_manage: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_validation() {
        assert!(Role::new("admin", "Admin", "", true).validate().is_ok());
        assert!(Role::new("Admin", "", "", true).validate().is_err());
        let mut role = Role::new("viewer", "", "", false);
        role.description = "d".repeat(MAX_DESCRIPTION_LENGTH + 1);
        assert!(role.validate().is_err());
    }

    #[test]
    fn test_role_update_applies_fields() {
        let role = Role::new("viewer", "", "", false);
        let update = RoleUpdate {
            can_manage: Some(true),
            alias: Some("Viewer".into()),
            ..Default::default()
        };
        assert!(!update.is_empty());

        let updated = role.clone().updated(update);
        assert_eq!(updated.name, "viewer");
        assert_eq!(updated.alias, "Viewer");
        assert!(updated.can_manage);
        assert_eq!(updated.id, role.id);
    }

    #[test]
    fn test_grant_detail_serializes_flat() {
        let detail = GrantDetail {
            grant: NodeRole::new("n1", "r1", "u1"),
            node_path: "team.alpha".into(),
            node_name: "alpha".into(),
            role_name: "admin".into(),
            can_manage: true,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["nodeId"], "n1");
        assert_eq!(json["nodePath"], "team.alpha");
        assert_eq!(json["canManage"], true);
    }
}
