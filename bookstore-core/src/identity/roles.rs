//! Role provisioning and role administration

use super::claims::claims_catalog;
use super::manager::ADMIN_ROLE;
use super::models::*;
use super::IdentityManager;
use crate::error::{Result, ServiceError};
use crate::store::normalize;
use chrono::Utc;
use tracing::{info, instrument};

impl IdentityManager {
    pub(super) async fn get_role(&self, id: &str) -> Result<Role> {
        self.store
            .find_role(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("role: {}", id)))
    }

    /// Return the role named `name`, creating it when absent. Losing a
    /// creation race to another caller counts as success.
    #[instrument(skip(self))]
    pub async fn ensure_role(&self, name: &str) -> Result<Role> {
        if let Some(role) = self.store.find_role_by_name(name).await? {
            return Ok(role);
        }
        let role = Role {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: None,
            claims: vec![],
        };
        match self.store.insert_role(role.clone()).await {
            Ok(()) => {
                info!(role_id = %role.id, role = %name, "created role");
                Ok(role)
            }
            Err(ServiceError::AlreadyExists(_)) => self
                .store
                .find_role_by_name(name)
                .await?
                .ok_or_else(|| ServiceError::Provisioning(format!("role {} vanished", name))),
            Err(e) => Err(e),
        }
    }

    /// Put `user` in `role`; a no-op when it already is.
    pub(super) async fn add_user_to_role(&self, mut user: User, role: &Role) -> Result<User> {
        if !user.role_ids.contains(&role.id) {
            user.role_ids.push(role.id.clone());
            user.updated_at = Some(Utc::now());
            self.store.update_user(user.clone()).await?;
        }
        Ok(user)
    }

    /// Ensure the default role exists and assign it to the user.
    #[instrument(skip(self))]
    pub async fn provision_default_role(&self, user_id: &str) -> Result<()> {
        let provision = async {
            let role = self.ensure_role(&self.default_role).await?;
            let user = self.get_user(user_id).await?;
            self.add_user_to_role(user, &role).await
        };
        provision
            .await
            .map(|_| ())
            .map_err(|e| match e {
                ServiceError::Provisioning(_) => e,
                other => ServiceError::Provisioning(other.to_string()),
            })
    }

    /// Create (or top up) the administrator: role `Admin` plus every catalog
    /// claim. Safe to run on every start.
    #[instrument(skip(self, password))]
    pub async fn seed_admin(&self, email: &str, password: &str) -> Result<UserSummary> {
        let user = match self.store.find_user_by_email(email).await? {
            Some(user) => user,
            None => {
                Self::validate_password_strength(password)?;
                let hash = self.hash_password(password).await?;
                let user = Self::new_user(email.trim(), Some(hash), String::new(), String::new());
                self.store.insert_user(user.clone()).await?;
                info!(user_id = %user.id, "created admin account");
                user
            }
        };
        let role = self.ensure_role(ADMIN_ROLE).await?;
        let mut user = self.add_user_to_role(user, &role).await?;
        let missing: Vec<Claim> = claims_catalog()
            .into_iter()
            .filter(|c| !user.claims.contains(c))
            .collect();
        if !missing.is_empty() {
            user.claims.extend(missing);
            user.updated_at = Some(Utc::now());
            self.store.update_user(user.clone()).await?;
        }
        Ok(user.into())
    }

    #[instrument(skip(self, req), fields(role = %req.name))]
    pub async fn create_role(&self, req: CreateRoleRequest) -> Result<Role> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(ServiceError::invalid("name", "role name is required"));
        }
        let role = Role {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: req.description,
            claims: vec![],
        };
        self.store.insert_role(role.clone()).await?;
        info!(role_id = %role.id, "created role");
        Ok(role)
    }

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        self.store.list_roles().await
    }

    /// Role with member usernames and claim values.
    #[instrument(skip(self))]
    pub async fn get_role_details(&self, id: &str) -> Result<RoleDetails> {
        let role = self.get_role(id).await?;
        let users = self
            .store
            .list_users()
            .await?
            .into_iter()
            .filter(|u| u.role_ids.contains(&role.id))
            .map(|u| u.username)
            .collect();
        Ok(RoleDetails {
            claims: role.claims.iter().map(|c| c.value.clone()).collect(),
            id: role.id,
            name: role.name,
            description: role.description,
            users,
        })
    }

    #[instrument(skip(self, req))]
    pub async fn update_role(&self, id: &str, req: UpdateRoleRequest) -> Result<Role> {
        let mut role = self.get_role(id).await?;
        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ServiceError::invalid("name", "role name is required"));
            }
            role.name = name.to_string();
        }
        if let Some(description) = req.description {
            role.description = Some(description);
        }
        self.store.update_role(role.clone()).await?;
        info!(role_id = %id, "updated role");
        Ok(role)
    }

    #[instrument(skip(self))]
    pub async fn delete_role(&self, id: &str) -> Result<()> {
        self.store.delete_role(id).await?;
        info!(role_id = %id, "deleted role");
        Ok(())
    }

    /// Apply a membership edit for one role: selected users are added,
    /// deselected ones removed, the rest untouched.
    #[instrument(skip(self, selections))]
    pub async fn edit_role_members(
        &self,
        role_id: &str,
        selections: Vec<RoleMemberSelection>,
    ) -> Result<RoleDetails> {
        let role = self.get_role(role_id).await?;
        for s in selections {
            let mut user = self.get_user(&s.user_id).await?;
            let member = user.role_ids.contains(&role.id);
            if s.is_selected && !member {
                user.role_ids.push(role.id.clone());
            } else if !s.is_selected && member {
                user.role_ids.retain(|rid| rid != &role.id);
            } else {
                continue;
            }
            user.updated_at = Some(Utc::now());
            self.store.update_user(user).await?;
        }
        self.get_role_details(role_id).await
    }

    /// Replace all of a user's roles with `role_names`. Unknown names fail
    /// before anything changes.
    #[instrument(skip(self))]
    pub async fn set_user_roles(
        &self,
        user_id: &str,
        role_names: Vec<String>,
    ) -> Result<Vec<String>> {
        let mut user = self.get_user(user_id).await?;
        let mut role_ids = Vec::with_capacity(role_names.len());
        for name in &role_names {
            let role = self
                .store
                .find_role_by_name(name)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("role: {}", name)))?;
            if !role_ids.contains(&role.id) {
                role_ids.push(role.id);
            }
        }
        user.role_ids = role_ids;
        user.updated_at = Some(Utc::now());
        self.store.update_user(user.clone()).await?;
        info!(user_id = %user_id, "updated user roles");
        self.role_names(&user).await
    }

    /// Whether the user behind `email` is in `role`.
    pub async fn is_in_role(&self, email: &str, role: &str) -> Result<bool> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            return Ok(false);
        };
        let key = normalize(role);
        Ok(self
            .role_names(&user)
            .await?
            .iter()
            .any(|r| normalize(r) == key))
    }
}
