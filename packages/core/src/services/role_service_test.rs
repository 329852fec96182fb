//! Tests for RoleService
//!
//! Tests cover:
//! - Role CRUD and name uniqueness
//! - Grant rules (enabled node, known role, one grant per triple)
//! - Revocation and grant cleanup on role deletion

#[cfg(test)]
mod tests {
    use crate::config::TreeConfig;
    use crate::models::{GrantQuery, NewNode, NodeRef, RoleUpdate};
    use crate::services::{RemoveOptions, RoleService, TreeError, TreeService};
    use tempfile::TempDir;

    /// Helper to create test services sharing one store
    async fn create_test_services() -> anyhow::Result<(TreeService, RoleService, TempDir)> {
        let temp_dir = TempDir::new()?;
        let config = TreeConfig::for_path(temp_dir.path().join("roles.db"));
        let tree = TreeService::open(&config).await?;
        let roles = RoleService::new(tree.store());

        tree.create_node(NewNode::root("team")).await?;
        tree.create_node(NewNode::leaf("svc1", NodeRef::path("team")))
            .await?;

        Ok((tree, roles, temp_dir))
    }

    #[tokio::test]
    async fn test_role_crud() -> anyhow::Result<()> {
        let (_tree, roles, _temp) = create_test_services().await?;

        let admin = roles.create_role("admin", "Admin", "", true).await?;
        roles.create_role("viewer", "Viewer", "read only", false).await?;

        let err = roles.create_role("admin", "", "", false).await.unwrap_err();
        assert!(matches!(err, TreeError::DuplicateRole { .. }));

        let err = roles.create_role("Bad Role", "", "", false).await.unwrap_err();
        assert!(matches!(err, TreeError::Validation(_)));

        let names: Vec<String> = roles
            .list_roles()
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["admin", "viewer"]);

        let updated = roles
            .update_role(
                &admin.id,
                RoleUpdate {
                    name: Some("owner".into()),
                    can_manage: Some(false),
                    ..RoleUpdate::default()
                },
            )
            .await?;
        assert_eq!(updated.name, "owner");
        assert!(!updated.can_manage);
        assert_eq!(roles.get_role_by_name("owner").await?.id, admin.id);

        let err = roles
            .update_role(
                &admin.id,
                RoleUpdate {
                    name: Some("viewer".into()),
                    ..RoleUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::DuplicateRole { .. }));

        roles.delete_role(&admin.id).await?;
        let err = roles.get_role(&admin.id).await.unwrap_err();
        assert!(matches!(err, TreeError::RoleNotFound { .. }));

        let err = roles.delete_role(&admin.id).await.unwrap_err();
        assert!(matches!(err, TreeError::RoleNotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_grant_rules() -> anyhow::Result<()> {
        let (tree, roles, _temp) = create_test_services().await?;
        let viewer = roles.create_role("viewer", "", "", false).await?;

        let grant = roles
            .grant(&NodeRef::path("team"), &viewer.id, "user-1")
            .await?;
        assert_eq!(grant.user_id, "user-1");

        let err = roles
            .grant(&NodeRef::path("team"), &viewer.id, "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::DuplicateGrant { .. }));

        let err = roles
            .grant(&NodeRef::path("team"), "missing-role", "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::RoleNotFound { .. }));

        let err = roles
            .grant(&NodeRef::path("team"), &viewer.id, "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::Validation(_)));

        tree.remove_node(&NodeRef::key("svc1"), RemoveOptions::default())
            .await?;
        let err = roles
            .grant(&NodeRef::key("svc1"), &viewer.id, "user-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::DisabledNode { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_and_revoke_grants() -> anyhow::Result<()> {
        let (_tree, roles, _temp) = create_test_services().await?;
        let viewer = roles.create_role("viewer", "", "", false).await?;
        let admin = roles.create_role("admin", "", "", true).await?;

        let first = roles
            .grant(&NodeRef::path("team"), &viewer.id, "user-1")
            .await?;
        roles
            .grant(&NodeRef::key("svc1"), &admin.id, "user-1")
            .await?;
        roles
            .grant(&NodeRef::path("team"), &admin.id, "user-2")
            .await?;

        let details = roles.list_grants(&GrantQuery::for_user("user-1")).await?;
        let summary: Vec<(&str, &str)> = details
            .iter()
            .map(|d| (d.node_path.as_str(), d.role_name.as_str()))
            .collect();
        assert_eq!(summary, vec![("team", "viewer"), ("team.svc1", "admin")]);
        assert!(details[1].can_manage);

        roles.revoke(&first.id).await?;
        let err = roles.revoke(&first.id).await.unwrap_err();
        assert!(matches!(err, TreeError::GrantNotFound { .. }));

        let team = details[0].grant.node_id.clone();
        roles.revoke_triple(&team, &admin.id, "user-2").await?;
        let err = roles
            .revoke_triple(&team, &admin.id, "user-2")
            .await
            .unwrap_err();
        assert!(matches!(err, TreeError::GrantNotFound { .. }));

        let remaining = roles.list_grants(&GrantQuery::new()).await?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].node_path, "team.svc1");
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_role_removes_grants() -> anyhow::Result<()> {
        let (_tree, roles, _temp) = create_test_services().await?;
        let viewer = roles.create_role("viewer", "", "", false).await?;
        roles
            .grant(&NodeRef::path("team"), &viewer.id, "user-1")
            .await?;

        roles.delete_role(&viewer.id).await?;

        let grants = roles
            .list_grants(&GrantQuery::new().with_role_id(&viewer.id))
            .await?;
        assert!(grants.is_empty());
        Ok(())
    }
}
