use crate::config::AuthConfig;
use crate::identity::AuthenticatedUser;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

/// The only signing algorithm the user pool uses.
const ALGORITHM: Algorithm = Algorithm::RS256;

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("no bearer token provided")]
    MissingToken,
    #[error("signing keys unavailable: {0}")]
    KeySetUnavailable(String),
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("no signing key matches kid {0:?}")]
    UnknownKey(Option<String>),
    #[error("token rejected: {0}")]
    Rejected(#[from] JwtError),
    #[error("token has no subject")]
    MissingSubject,
}

impl AuthError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::KeySetUnavailable(_) => "keys_unavailable",
            AuthError::MalformedToken(_) => "malformed",
            AuthError::UnknownKey(_) => "unknown_key",
            AuthError::Rejected(_) => "rejected",
            AuthError::MissingSubject => "missing_subject",
        }
    }
}

/// A public key entry of the provider's JWKS document.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Jwk {
    pub kid: String,
    #[serde(default)]
    pub kty: String,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

#[derive(Clone)]
pub enum JwkSource {
    Static(Vec<Jwk>),
    /// Fetched again for every verification.
    Http { url: Url, client: reqwest::Client },
}

/// The `token_use` claim of a Cognito token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenUse {
    Access,
    Id,
    Unspecified,
}

impl TokenUse {
    fn from_claim(claim: Option<&str>) -> Self {
        match claim {
            Some("access") => TokenUse::Access,
            Some("id") => TokenUse::Id,
            _ => TokenUse::Unspecified,
        }
    }

    /// Verification attempts in order. The first attempt that succeeds wins.
    ///
    /// Access tokens issued by the pool do not reliably carry the client id as audience,
    /// so they are first checked without it.
    pub fn verification_plan(self) -> &'static [AudienceCheck] {
        match self {
            TokenUse::Access => &[AudienceCheck::Skip, AudienceCheck::Require],
            TokenUse::Id => &[AudienceCheck::Require],
            TokenUse::Unspecified => &[AudienceCheck::Skip],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudienceCheck {
    Skip,
    Require,
}

/// Payload fields read before the signature is checked. Only used to pick the
/// verification plan and for logging, never as identity.
#[derive(Debug, Default, Deserialize)]
struct UnverifiedClaims {
    token_use: Option<Value>,
    aud: Option<Value>,
    client_id: Option<Value>,
    username: Option<Value>,
    sub: Option<Value>,
}

/// Verifies bearer tokens issued by a Cognito user pool.
pub struct TokenVerifier {
    issuer: String,
    client_id: String,
    keys: JwkSource,
}

impl TokenVerifier {
    pub fn new(issuer: impl Into<String>, client_id: impl Into<String>, keys: JwkSource) -> Self {
        TokenVerifier {
            issuer: issuer.into(),
            client_id: client_id.into(),
            keys,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let url = config
            .jwks_url()
            .map_err(|e| AuthError::KeySetUnavailable(format!("invalid jwks url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.jwks_timeout_secs))
            .build()
            .map_err(|e| {
                AuthError::KeySetUnavailable(format!("failed to build http client: {e}"))
            })?;

        Ok(TokenVerifier::new(
            config.issuer(),
            config.client_id.clone(),
            JwkSource::Http { url, client },
        ))
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub async fn verify(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let keys = self.fetch_keys().await?;

        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| AuthError::MalformedToken(format!("invalid header: {e}")))?;
        let unverified = peek_claims(token)?;
        tracing::debug!(
            token_use = ?unverified.token_use,
            aud = ?unverified.aud,
            client_id = ?unverified.client_id,
            username = ?unverified.username,
            sub = ?unverified.sub,
            "Verifying token"
        );

        let jwk = keys
            .iter()
            .find(|jwk| header.kid.as_deref() == Some(jwk.kid.as_str()))
            .ok_or_else(|| AuthError::UnknownKey(header.kid.clone()))?;
        let key = decoding_key(jwk)?;

        let token_use =
            TokenUse::from_claim(unverified.token_use.as_ref().and_then(Value::as_str));
        let claims = verify_with_plan(token_use.verification_plan(), |check| {
            jsonwebtoken::decode::<Map<String, Value>>(token, &key, &self.validation(check))
                .map(|data| data.claims)
        })?;

        let user = AuthenticatedUser::from_claims(claims).ok_or(AuthError::MissingSubject)?;
        tracing::info!(user = %user.display_name(), "Token verification successful");
        Ok(user)
    }

    async fn fetch_keys(&self) -> Result<Vec<Jwk>, AuthError> {
        match &self.keys {
            JwkSource::Static(keys) => Ok(keys.clone()),
            JwkSource::Http { url, client } => {
                let response = client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| AuthError::KeySetUnavailable(format!("jwks fetch error: {e}")))?;
                if response.status() != StatusCode::OK {
                    return Err(AuthError::KeySetUnavailable(format!(
                        "jwks fetch status: {}",
                        response.status()
                    )));
                }
                let set: JwkSet = response
                    .json()
                    .await
                    .map_err(|e| AuthError::KeySetUnavailable(format!("jwks decode error: {e}")))?;
                Ok(set.keys)
            }
        }
    }

    fn validation(&self, check: AudienceCheck) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        match check {
            AudienceCheck::Skip => {
                validation.validate_aud = false;
                validation.set_required_spec_claims(&["exp", "iss"]);
            }
            AudienceCheck::Require => {
                validation.set_audience(&[&self.client_id]);
                validation.set_required_spec_claims(&["exp", "iss", "aud"]);
            }
        }
        validation
    }
}

/// Runs `attempt` for each step of `plan` until one succeeds. Returns the last error otherwise.
fn verify_with_plan<F>(
    plan: &[AudienceCheck],
    mut attempt: F,
) -> Result<Map<String, Value>, JwtError>
where
    F: FnMut(AudienceCheck) -> Result<Map<String, Value>, JwtError>,
{
    let mut last_error = JwtError::from(ErrorKind::InvalidToken);
    for &check in plan {
        match attempt(check) {
            Ok(claims) => return Ok(claims),
            Err(e) => {
                tracing::warn!(audience = ?check, error = %e, "Token verification attempt failed");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

fn peek_claims(token: &str) -> Result<UnverifiedClaims, AuthError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::MalformedToken("missing payload".into()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedToken(format!("payload is not a claims object: {e}")))
}

fn decoding_key(jwk: &Jwk) -> Result<DecodingKey, AuthError> {
    if jwk.kty != "RSA" {
        return Err(AuthError::UnknownKey(Some(jwk.kid.clone())));
    }
    if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
        return Err(AuthError::UnknownKey(Some(jwk.kid.clone())));
    }

    match (&jwk.n, &jwk.e) {
        (Some(n), Some(e)) => Ok(DecodingKey::from_rsa_components(n, e)?),
        _ => Err(AuthError::UnknownKey(Some(jwk.kid.clone()))),
    }
}
