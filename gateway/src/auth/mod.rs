//! Caller authentication.
//!
//! Bearer tokens are verified against the Cognito user pool's published keys. The
//! [`Authenticator`] decides whether verification is enforced and is installed in front of
//! the API routes with [`require_auth`].

mod middleware;
mod verifier;

pub use middleware::{Authenticator, require_auth};
pub use verifier::{AudienceCheck, AuthError, Jwk, JwkSet, JwkSource, TokenUse, TokenVerifier};

#[cfg(test)]
pub(crate) use verifier::tests as test_tokens;
