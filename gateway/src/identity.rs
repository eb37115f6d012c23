use serde::Serialize;
use serde_json::{Map, Value};

/// Claims that may carry a human readable user name, in order of preference.
const USERNAME_CLAIMS: &[&str] = &["cognito:username", "username", "preferred_username"];

/// The caller of a request, built from verified token claims.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AuthenticatedUser {
    claims: Map<String, Value>,
}

impl AuthenticatedUser {
    /// Returns `None` unless the claims contain a non-empty `sub`.
    pub fn from_claims(claims: Map<String, Value>) -> Option<Self> {
        let user = AuthenticatedUser { claims };
        user.claim("sub")?;
        Some(user)
    }

    pub fn subject(&self) -> &str {
        self.claim("sub").unwrap_or_default()
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// A claim holding a non-empty string.
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims
            .get(name)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Name shown in responses and written to the audit log.
    pub fn display_name(&self) -> String {
        if let Some(name) = USERNAME_CLAIMS.iter().find_map(|claim| self.claim(claim)) {
            return name.to_string();
        }

        if let Some(local) = self
            .claim("email")
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
        {
            return local.to_string();
        }

        match self.claim("sub") {
            Some(sub) => sub.chars().take(8).collect(),
            None => "unknown".to_string(),
        }
    }
}
