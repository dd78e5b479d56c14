/*!
 * Authentication for the storefront API.
 *
 * Session tokens are issued by the external identity provider and signed
 * with a shared HS256 secret. This module only verifies them: it turns a
 * `Bearer` token into an [`AuthUser`] placed in the request extensions.
 * Whether that user may use the admin surface is decided separately by
 * [`admin::AdminAuthority`].
 */

pub mod admin;
pub mod rate_limit;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

pub use admin::{
    admin_middleware, authority_from_config, AdminAuthority, EmailAllowListAuthority,
    ProfileFlagAuthority,
};
pub use rate_limit::{CouponRateLimiter, RateLimitDecision, RateLimitKey};

/// JWT claims as issued by the identity provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Authenticated principal extracted from the session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub email_verified: bool,
    pub roles: Vec<String>,
}

impl AuthUser {
    /// Lower-cased email, only when the provider verified it.
    pub fn verified_email(&self) -> Option<String> {
        if self.email_verified {
            self.email.as_ref().map(|e| e.trim().to_ascii_lowercase())
        } else {
            None
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenCreation(msg) => ServiceError::InternalError(msg),
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            issuer: cfg.jwt_issuer.clone(),
            audience: cfg.jwt_audience.clone(),
        }
    }
}

/// Verifies (and, for tooling and tests, mints) session tokens.
#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_audience(&[self.config.audience.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    pub fn authenticate(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthUser {
            user_id,
            email: claims.email,
            email_verified: claims.email_verified,
            roles: claims.roles,
        })
    }

    /// Signs a token for `user`, valid for `ttl_secs`.
    pub fn issue_token(&self, user: &AuthUser, ttl_secs: i64) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.user_id.to_string(),
            email: user.email.clone(),
            email_verified: user.email_verified,
            roles: user.roles.clone(),
            iat: now,
            exp: now + ttl_secs,
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn auth_service(request: &Request) -> Result<Arc<AuthService>, ServiceError> {
    request
        .extensions()
        .get::<Arc<AuthService>>()
        .cloned()
        .ok_or_else(|| ServiceError::InternalError("Authentication service not available".into()))
}

/// Requires a valid session token and stores the principal in the request.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth = match auth_service(&request) {
        Ok(auth) => auth,
        Err(e) => return e.into_response(),
    };

    let user = match bearer_token(request.headers()) {
        Some(token) => auth.authenticate(token),
        None => Err(AuthError::MissingAuth),
    };

    match user {
        Ok(user) => {
            debug!(user_id = %user.user_id, "authenticated request");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => {
            warn!(error = %e, path = %request.uri().path(), "rejected unauthenticated request");
            e.into_response()
        }
    }
}

/// Like [`auth_middleware`] but lets guests through. A token that is present
/// but invalid is still rejected.
pub async fn optional_auth_middleware(mut request: Request, next: Next) -> Response {
    let auth = match auth_service(&request) {
        Ok(auth) => auth,
        Err(e) => return e.into_response(),
    };

    if let Some(token) = bearer_token(request.headers()) {
        match auth.authenticate(token) {
            Ok(user) => {
                request.extensions_mut().insert(user);
            }
            Err(e) => return e.into_response(),
        }
    }

    next.run(request).await
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("Authentication required".into()))
    }
}

/// Router helpers that wrap every route with the auth middlewares.
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_optional_auth(self) -> Self;
    /// Authentication followed by the admin gate, both ahead of body parsing.
    fn with_admin(self) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_optional_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(optional_auth_middleware))
    }

    fn with_admin(self) -> Self {
        self.layer(axum::middleware::from_fn(admin_middleware))
            .with_auth()
    }
}
