/*!
 * # Authentication and Access Context
 *
 * Identity is owned by an external provider. This module only verifies the
 * bearer token it issues and turns the claims into a [`RequestContext`] that
 * handlers receive explicitly.
 *
 * Roles are a closed enum; every role check is an exhaustive match rather than
 * a string comparison.
 */

use crate::config::AppConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

/// Platform roles. Canonical form is lowercase; parsing accepts any casing.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Role {
    #[sea_orm(string_value = "company")]
    Company,
    #[sea_orm(string_value = "distributor")]
    Distributor,
    #[sea_orm(string_value = "driver")]
    Driver,
}

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,          // Subject (user ID)
    pub role: String,         // Parsed into `Role` case-insensitively
    pub name: Option<String>, // Display name
    pub iat: i64,             // Issued at time
    pub exp: i64,             // Expiration time
    pub iss: String,          // Issuer
    pub aud: String,          // Audience
}

/// The authenticated caller, built once per request from the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: String,
    pub role: Role,
    pub name: Option<String>,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            name: None,
        }
    }

    pub fn require(&self, role: Role) -> Result<(), ServiceError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "this action requires the {} role",
                role
            )))
        }
    }
}

impl TryFrom<Claims> for RequestContext {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let role = claims
            .role
            .parse::<Role>()
            .map_err(|_| AuthError::UnknownRole(claims.role.clone()))?;
        Ok(Self {
            user_id: claims.sub,
            role,
            name: claims.name,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("authentication required".to_string()))
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_audience: cfg.jwt_audience.clone(),
            jwt_issuer: cfg.jwt_issuer.clone(),
            access_token_expiration: Duration::from_secs(cfg.jwt_expiration as u64),
        }
    }
}

/// Verifies tokens from the identity provider.
///
/// `issue_token` exists for tooling and tests; production tokens come from the
/// provider signed with the same secret.
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn issue_token(
        &self,
        user_id: &str,
        role: Role,
        name: Option<String>,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            name,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);

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

    pub fn authenticate(&self, token: &str) -> Result<RequestContext, AuthError> {
        let claims = self.validate_token(token)?;
        RequestContext::try_from(claims)
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Insufficient role")]
    InsufficientRole,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingAuth
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::UnknownRole(_) => ServiceError::Unauthorized(err.to_string()),
            AuthError::InsufficientRole => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(_) | AuthError::InternalError(_) => {
                ServiceError::InternalError(err.to_string())
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Bearer header first, then `?access_token=` for websocket clients that
/// cannot set headers.
fn extract_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    from_header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(q)| q.access_token)
            .filter(|t| !t.is_empty())
    })
}

/// Authentication middleware that validates the token and installs a
/// [`RequestContext`] in the request extensions.
pub async fn auth_middleware(mut request: Request, next: Next) -> Result<Response, AuthError> {
    let auth_service = request
        .extensions()
        .get::<Arc<AuthService>>()
        .cloned()
        .ok_or_else(|| AuthError::InternalError("authentication service not available".into()))?;

    let token = extract_token(&request).ok_or(AuthError::MissingAuth)?;
    let context = auth_service.authenticate(&token).map_err(|e| {
        warn!(error = %e, "rejected bearer token");
        e
    })?;

    debug!(user_id = %context.user_id, role = %context.role, "authenticated request");
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Role middleware to check if the caller has the required role
pub async fn role_middleware(
    State(required_role): State<Role>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let context = request
        .extensions()
        .get::<RequestContext>()
        .ok_or(AuthError::MissingAuth)?;

    if context.role != required_role {
        return Err(AuthError::InsufficientRole);
    }
    Ok(next.run(request).await)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_role(self, role: Role) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_role(self, role: Role) -> Self {
        self.layer(axum::middleware::from_fn_with_state(role, role_middleware))
            .with_auth()
    }
}
