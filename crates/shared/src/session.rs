//! Session derived from the identity provider's bearer token
//!
//! The token is issued and verified elsewhere; the client only reads the
//! identity and role claims once, when the session starts.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::SharedError;
use crate::types::{ParticipantId, Role};

/// Claims the client reads from the identity provider token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (participant identity)
    pub sub: String,
    /// Marketplace role
    pub role: String,
    /// Expiration
    pub exp: i64,
}

/// The authenticated actor for the current application instance.
///
/// Immutable for its lifetime; the hosting application creates it at login and
/// drops it at logout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Session {
    identity: ParticipantId,
    role: Role,
}

impl Session {
    pub fn new(identity: impl Into<ParticipantId>, role: Role) -> Self {
        Self {
            identity: identity.into(),
            role,
        }
    }

    /// Decode a session from a bearer token without verifying its signature.
    ///
    /// The server re-verifies the token on every request and on the realtime
    /// handshake, so only the claim shape and expiry are checked here.
    pub fn from_bearer_token(token: &str) -> Result<Self, SharedError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.leeway = 60; // 60 second clock skew tolerance
        // Provider tokens carry an audience meant for the server, not for us
        validation.validate_aud = false;

        let claims = decode::<SessionClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .map(|data| data.claims)
            .map_err(|e| SharedError::InvalidToken(e.to_string()))?;

        if claims.sub.trim().is_empty() {
            return Err(SharedError::InvalidToken("empty subject".to_string()));
        }

        let role = claims
            .role
            .parse::<Role>()
            .map_err(|_| SharedError::InvalidRole(claims.role.clone()))?;

        Ok(Self::new(claims.sub, role))
    }

    pub fn identity(&self) -> &ParticipantId {
        &self.identity
    }

    pub fn role(&self) -> Role {
        self.role
    }
}
