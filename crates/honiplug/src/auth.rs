//! Credentials
//!
//! Tokens are looked up in a static table from configuration. A request or
//! streaming connection carrying a known token acts as that token's user.

use std::collections::HashMap;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::Serialize;

use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::server::AppState;

/// Role that unlocks administrative routes
pub const ADMIN_ROLE: &str = "admin";

/// An authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}

/// Token to identity table
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    tokens: HashMap<String, Identity>,
}

impl CredentialStore {
    pub fn from_config(config: &AuthConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|t| {
                (
                    t.token.clone(),
                    Identity {
                        user_id: t.user_id.clone(),
                        roles: t.roles.clone(),
                    },
                )
            })
            .collect();
        Self { tokens }
    }

    pub fn authenticate(&self, token: &str) -> Option<Identity> {
        self.tokens.get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Resolve an optional token, rejecting tokens that are present but unknown
pub fn resolve(store: &CredentialStore, token: Option<&str>) -> Result<Option<Identity>, ApiError> {
    match token {
        None => Ok(None),
        Some(token) => store
            .authenticate(token)
            .map(Some)
            .ok_or(ApiError::AUTHENTICATION_FAILED),
    }
}

/// The caller's identity taken from an `Authorization: Bearer` header
///
/// Missing credentials extract as `None`; the handler decides whether that is
/// acceptable.
pub struct Credential(pub Option<Identity>);

impl Credential {
    /// Require a user
    pub fn user(self) -> Result<Identity, ApiError> {
        self.0.ok_or(ApiError::CREDENTIAL_REQUIRED)
    }

    /// Require a user with the admin role
    pub fn admin(self) -> Result<Identity, ApiError> {
        let identity = self.user()?;
        if identity.is_admin() {
            Ok(identity)
        } else {
            Err(ApiError::ROLE_REQUIRED)
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Credential {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        resolve(state.credentials(), token).map(Credential)
    }
}
