//! Signed bearer tokens.
//!
//! HS256 JWTs whose `sub` is the user id. Nothing is stored server-side;
//! a token is valid until `exp`.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use tee_studio_core::UserId;

use super::AuthError;

/// JWT claims carried by every bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id as a decimal string.
    pub sub: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expires at (unix seconds).
    pub exp: i64,
}

/// Signing and verification keys derived from the configured secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys")
            .field("keys", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenKeys {
    #[must_use]
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl,
        }
    }

    /// Issue a token for `user_id`, valid for the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenSigning` if encoding fails.
    pub fn issue(&self, user_id: UserId) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::TokenSigning)
    }

    /// Verify a token and return the user it was issued to.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for any malformed, tampered, or expired token.
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| AuthError::InvalidToken)?;
        data.claims
            .sub
            .parse::<UserId>()
            .map_err(|_| AuthError::InvalidToken)
    }

    /// Sign arbitrary claims. Used to mint expired tokens in tests.
    #[cfg(test)]
    pub(crate) fn sign_claims(&self, claims: &Claims) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn keys(secret: &str) -> TokenKeys {
        TokenKeys::new(&SecretString::from(secret), Duration::from_secs(3600))
    }

    #[test]
    fn test_issue_then_verify() {
        let keys = keys("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%");
        let token = keys.issue(UserId::new(42)).unwrap();
        assert_eq!(keys.verify(&token).unwrap(), UserId::new(42));
    }

    #[test]
    fn test_rejects_token_from_other_key() {
        let token = keys("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%")
            .issue(UserId::new(1))
            .unwrap();
        let other = keys("Zq8#Lm4!Vt2@Xp6$Rw1^Ks9&Jd3*Hf5%");
        assert!(matches!(other.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_rejects_expired_and_garbage() {
        let keys = keys("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%");
        let now = Utc::now().timestamp();
        let expired = keys.sign_claims(&Claims {
            sub: "1".to_string(),
            iat: now - 7200,
            exp: now - 3600,
        });
        assert!(matches!(keys.verify(&expired), Err(AuthError::InvalidToken)));
        assert!(matches!(keys.verify("not-a-jwt"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_rejects_non_numeric_subject() {
        let keys = keys("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6%");
        let now = Utc::now().timestamp();
        let token = keys.sign_claims(&Claims {
            sub: "admin".to_string(),
            iat: now,
            exp: now + 60,
        });
        assert!(matches!(keys.verify(&token), Err(AuthError::InvalidToken)));
    }
}
