//! Claim assembly for tokens plus user/role claim administration

use chrono::Utc;
use tracing::{info, instrument};

use super::models::*;
use super::IdentityManager;
use crate::error::{FieldError, Result, ServiceError};

/// Claim type names written into tokens.
pub mod claim_types {
    pub const EMAIL: &str = "email";
    pub const JTI: &str = "jti";
    pub const ROLE: &str = "role";
}

/// Assignable claims. Type and value are the same string.
pub const CLAIMS_CATALOG: &[&str] = &["Create Role", "Edit Role", "Delete Role"];

pub fn claims_catalog() -> Vec<Claim> {
    CLAIMS_CATALOG.iter().map(|c| Claim::new(*c, *c)).collect()
}

fn catalog_claim(claim_type: &str) -> Option<Claim> {
    CLAIMS_CATALOG
        .iter()
        .find(|c| **c == claim_type)
        .map(|c| Claim::new(*c, *c))
}

/// Token claims for an authenticated user: email, a fresh `jti`, then one
/// `role` entry per role (duplicates kept).
pub fn build_claims(email: &str, roles: &[String]) -> Vec<Claim> {
    let mut claims = Vec::with_capacity(roles.len() + 2);
    claims.push(Claim::new(claim_types::EMAIL, email));
    claims.push(Claim::new(
        claim_types::JTI,
        uuid::Uuid::new_v4().to_string(),
    ));
    claims.extend(roles.iter().map(|r| Claim::new(claim_types::ROLE, r.as_str())));
    claims
}

fn resolve_selection(selections: &[ClaimSelection]) -> Result<Vec<Claim>> {
    let mut unknown = Vec::new();
    let mut selected = Vec::new();
    for s in selections {
        match catalog_claim(&s.claim_type) {
            Some(claim) if s.is_selected => selected.push(claim),
            Some(_) => {}
            None => unknown.push(FieldError::new(
                "claim_type",
                format!("unknown claim: {}", s.claim_type),
            )),
        }
    }
    if !unknown.is_empty() {
        return Err(ServiceError::Validation(unknown));
    }
    Ok(selected)
}

impl IdentityManager {
    /// Replace a user's claims with the selected catalog entries.
    #[instrument(skip(self, selections))]
    pub async fn set_user_claims(
        &self,
        user_id: &str,
        selections: Vec<ClaimSelection>,
    ) -> Result<Vec<Claim>> {
        let selected = resolve_selection(&selections)?;
        let mut user = self.get_user(user_id).await?;
        user.claims = selected;
        user.updated_at = Some(Utc::now());
        self.store.update_user(user.clone()).await?;
        info!(user_id = %user_id, count = user.claims.len(), "updated user claims");
        Ok(user.claims)
    }

    /// Add selected claims missing from the role and remove deselected ones
    /// it holds; entries left out of `selections` are untouched.
    #[instrument(skip(self, selections))]
    pub async fn set_role_claims(
        &self,
        role_id: &str,
        selections: Vec<ClaimSelection>,
    ) -> Result<Vec<Claim>> {
        resolve_selection(&selections)?;
        let mut role = self.get_role(role_id).await?;
        for s in &selections {
            let held = role.claims.iter().any(|c| c.claim_type == s.claim_type);
            if s.is_selected && !held {
                if let Some(claim) = catalog_claim(&s.claim_type) {
                    role.claims.push(claim);
                }
            } else if !s.is_selected && held {
                role.claims.retain(|c| c.claim_type != s.claim_type);
            }
        }
        self.store.update_role(role.clone()).await?;
        info!(role_id = %role_id, count = role.claims.len(), "updated role claims");
        Ok(role.claims)
    }

    /// The user's own claims followed by those of each of its roles.
    pub async fn effective_claims(&self, user: &User) -> Result<Vec<Claim>> {
        let mut claims = user.claims.clone();
        for role_id in &user.role_ids {
            if let Some(role) = self.store.find_role(role_id).await? {
                for claim in role.claims {
                    if !claims.contains(&claim) {
                        claims.push(claim);
                    }
                }
            }
        }
        Ok(claims)
    }

    /// Whether the account behind `email` holds `claim_type`, directly or
    /// through a role. Unknown emails hold nothing.
    pub async fn has_claim(&self, email: &str, claim_type: &str) -> Result<bool> {
        let Some(user) = self.store.find_user_by_email(email).await? else {
            return Ok(false);
        };
        Ok(self
            .effective_claims(&user)
            .await?
            .iter()
            .any(|c| c.claim_type == claim_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::testing::manager;

    #[test]
    fn builder_emits_one_role_claim_per_role() {
        let roles = vec!["Customer".to_string(), "Customer".to_string()];
        let claims = build_claims("a@x.com", &roles);
        assert_eq!(claims[0], Claim::new("email", "a@x.com"));
        assert_eq!(claims[1].claim_type, "jti");
        let role_claims: Vec<_> = claims.iter().filter(|c| c.claim_type == "role").collect();
        assert_eq!(role_claims.len(), 2);
    }

    #[test]
    fn builder_generates_distinct_jti() {
        let a = build_claims("a@x.com", &[]);
        let b = build_claims("a@x.com", &[]);
        assert_ne!(a[1].value, b[1].value);
        assert!(uuid::Uuid::parse_str(&a[1].value).is_ok());
    }

    #[tokio::test]
    async fn user_claims_replace_previous_selection() {
        let mgr = manager();
        let user = mgr.create_test_user("claims@x.com").await;
        mgr.set_user_claims(
            &user.id,
            vec![
                ClaimSelection {
                    claim_type: "Edit Role".into(),
                    is_selected: true,
                },
                ClaimSelection {
                    claim_type: "Delete Role".into(),
                    is_selected: true,
                },
            ],
        )
        .await
        .unwrap();
        let claims = mgr
            .set_user_claims(
                &user.id,
                vec![ClaimSelection {
                    claim_type: "Create Role".into(),
                    is_selected: true,
                }],
            )
            .await
            .unwrap();
        assert_eq!(claims, vec![Claim::new("Create Role", "Create Role")]);
    }

    #[tokio::test]
    async fn unknown_claims_are_rejected() {
        let mgr = manager();
        let user = mgr.create_test_user("claims@x.com").await;
        let err = mgr
            .set_user_claims(
                &user.id,
                vec![ClaimSelection {
                    claim_type: "Launch Rockets".into(),
                    is_selected: true,
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn role_claims_flow_into_effective_claims() {
        let mgr = manager();
        let user = mgr.create_test_user("editor@x.com").await;
        let role = mgr
            .create_role(CreateRoleRequest {
                name: "Editor".into(),
                description: None,
            })
            .await
            .unwrap();
        mgr.set_user_roles(&user.id, vec!["Editor".into()])
            .await
            .unwrap();
        assert!(!mgr.has_claim("editor@x.com", "Edit Role").await.unwrap());

        mgr.set_role_claims(
            &role.id,
            vec![ClaimSelection {
                claim_type: "Edit Role".into(),
                is_selected: true,
            }],
        )
        .await
        .unwrap();
        assert!(mgr.has_claim("EDITOR@x.com", "Edit Role").await.unwrap());

        let claims = mgr
            .set_role_claims(
                &role.id,
                vec![ClaimSelection {
                    claim_type: "Edit Role".into(),
                    is_selected: false,
                }],
            )
            .await
            .unwrap();
        assert!(claims.is_empty());
        assert!(!mgr.has_claim("editor@x.com", "Edit Role").await.unwrap());
    }
}
