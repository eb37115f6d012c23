use super::verifier::{AuthError, TokenVerifier};
use crate::config::{AuthConfig, AuthMode};
use crate::identity::AuthenticatedUser;
use crate::metrics_defs::AUTH_REJECTED;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::{Map, Value};
use shared::counter;
use std::sync::Arc;

#[derive(Clone)]
pub enum Authenticator {
    Enforce(Arc<TokenVerifier>),
    /// Skips token checks and runs every request as a fixed identity.
    Bypass(AuthenticatedUser),
}

impl Authenticator {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        match config.mode {
            AuthMode::Enforce => Ok(Authenticator::Enforce(Arc::new(
                TokenVerifier::from_config(config)?,
            ))),
            AuthMode::Bypass => {
                let claims = config
                    .bypass_claims
                    .clone()
                    .unwrap_or_else(default_bypass_claims);
                let user =
                    AuthenticatedUser::from_claims(claims).ok_or(AuthError::MissingSubject)?;
                tracing::warn!(
                    user = %user.display_name(),
                    "Authentication is disabled, every request runs as the bypass identity"
                );
                Ok(Authenticator::Bypass(user))
            }
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, AuthError> {
        match self {
            Authenticator::Enforce(verifier) => {
                let token = bearer_token(headers).ok_or(AuthError::MissingToken)?;
                verifier.verify(token).await
            }
            Authenticator::Bypass(user) => {
                tracing::debug!(user = %user.display_name(), "Authentication bypassed");
                Ok(user.clone())
            }
        }
    }
}

fn default_bypass_claims() -> Map<String, Value> {
    Map::from_iter([
        ("sub".to_string(), Value::from("test-user-123")),
        ("username".to_string(), Value::from("test-user")),
        ("cognito:username".to_string(), Value::from("test-user")),
    ])
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Rejects requests without a valid caller and stores the caller in the request extensions.
pub async fn require_auth(
    State(authenticator): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = match authenticator.authenticate(request.headers()).await {
        Ok(user) => user,
        Err(e) => {
            counter!(AUTH_REJECTED, "reason" => e.reason()).increment(1);
            tracing::warn!(error = %e, path = %request.uri().path(), "Rejected request");
            return Err(e);
        }
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
