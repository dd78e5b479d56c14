use async_trait::async_trait;
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sea_orm::{DatabaseConnection, EntityTrait};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, warn};

use super::AuthUser;
use crate::config::{AdminStrategy, AppConfig};
use crate::entities::profile;
use crate::errors::ServiceError;

/// Decides whether an authenticated principal is an administrator.
#[async_trait]
pub trait AdminAuthority: Send + Sync {
    async fn is_admin(&self, principal: &AuthUser) -> Result<bool, ServiceError>;

    /// `Unauthorized` without a principal, `Forbidden` when not an admin.
    async fn require_admin(&self, principal: Option<&AuthUser>) -> Result<(), ServiceError> {
        let principal = principal
            .ok_or_else(|| ServiceError::Unauthorized("Authentication required".into()))?;

        if self.is_admin(principal).await? {
            Ok(())
        } else {
            warn!(user_id = %principal.user_id, "non-admin principal denied");
            Err(ServiceError::Forbidden("Admin access required".into()))
        }
    }
}

/// Reads `profiles.is_admin` for the principal's user id.
pub struct ProfileFlagAuthority {
    db: Arc<DatabaseConnection>,
}

impl ProfileFlagAuthority {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AdminAuthority for ProfileFlagAuthority {
    async fn is_admin(&self, principal: &AuthUser) -> Result<bool, ServiceError> {
        let profile = profile::Entity::find_by_id(principal.user_id)
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = %principal.user_id, "admin lookup failed");
                ServiceError::DatabaseError(e)
            })?;

        Ok(profile.map(|p| p.is_admin).unwrap_or(false))
    }
}

/// Accepts principals whose verified email is on a configured list.
pub struct EmailAllowListAuthority {
    emails: HashSet<String>,
}

impl EmailAllowListAuthority {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }
}

#[async_trait]
impl AdminAuthority for EmailAllowListAuthority {
    async fn is_admin(&self, principal: &AuthUser) -> Result<bool, ServiceError> {
        Ok(principal
            .verified_email()
            .map(|email| self.emails.contains(&email))
            .unwrap_or(false))
    }
}

pub fn authority_from_config(
    config: &AppConfig,
    db: Arc<DatabaseConnection>,
) -> Arc<dyn AdminAuthority> {
    match config.admin_strategy {
        AdminStrategy::ProfileFlag => Arc::new(ProfileFlagAuthority::new(db)),
        AdminStrategy::EmailAllowList => {
            Arc::new(EmailAllowListAuthority::new(config.admin_email_list()))
        }
    }
}

/// Admin gate. Runs after [`super::auth_middleware`] and before any handler
/// extracts the body, so rejected calls never touch the store.
pub async fn admin_middleware(request: Request, next: Next) -> Response {
    let authority = match request.extensions().get::<Arc<dyn AdminAuthority>>() {
        Some(authority) => authority.clone(),
        None => {
            return ServiceError::InternalError("Admin authority not available".into())
                .into_response()
        }
    };

    let principal = request.extensions().get::<AuthUser>().cloned();
    match authority.require_admin(principal.as_ref()).await {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}
