//! Bearer token verification
//!
//! Tokens are issued by the external identity provider and signed with
//! HS256 using a shared secret. This module only decodes and checks them;
//! [`TokenVerifier::issue`] exists for development and tests.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::identity::IdentityClaims;
use crate::config::MIN_SECRET_LEN;
use crate::error::WardError;

/// Payload carried by the issuer's token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Stable subject identifier at the issuer
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl From<TokenClaims> for IdentityClaims {
    fn from(claims: TokenClaims) -> Self {
        IdentityClaims {
            subject: claims.sub,
            email: claims.email,
            name: claims.name,
        }
    }
}

/// Token verifier
#[derive(Clone)]
pub struct TokenVerifier {
    secret: String,
}

impl TokenVerifier {
    /// Returns an error if the secret is missing or too short
    pub fn new(secret: String) -> Result<Self, WardError> {
        if secret.is_empty() {
            return Err(WardError::Config("token secret is required".into()));
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(WardError::Config(format!(
                "token secret must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }
        Ok(Self { secret })
    }

    /// Verify and decode a token into identity claims
    pub fn verify(&self, token: &str) -> Result<IdentityClaims, WardError> {
        let validation = Validation::default();

        match decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => Ok(data.claims.into()),
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let reason = match err.kind() {
                    ErrorKind::ExpiredSignature => "token expired",
                    ErrorKind::InvalidToken => "invalid token",
                    ErrorKind::InvalidSignature => "invalid signature",
                    _ => "token validation failed",
                };
                Err(WardError::Authentication(reason.into()))
            }
        }
    }

    /// Issue a token the way the identity provider would (development only)
    pub fn issue(
        &self,
        subject: &str,
        email: Option<&str>,
        ttl_seconds: u64,
    ) -> Result<String, WardError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| WardError::Internal(format!("System time error: {}", e)))?
            .as_secs();

        let claims = TokenClaims {
            sub: subject.to_string(),
            email: email.map(str::to_string),
            name: None,
            iat: now,
            exp: now.saturating_add(ttl_seconds),
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?)
    }
}

/// Extract token from an Authorization header.
/// Supports "Bearer <token>" format and raw tokens.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;

    if let Some(token) = header.strip_prefix("Bearer ") {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    if !header.contains(' ') {
        let token = header.trim();
        if !token.is_empty() {
            return Some(token);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_verifier() -> TokenVerifier {
        TokenVerifier::new("test-secret-that-is-at-least-32-characters-long".into()).unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let verifier = test_verifier();
        let token = verifier.issue("sub-42", Some("ravi@example.org"), 3600).unwrap();

        let claims = verifier.verify(&token).unwrap();
        assert_eq!(claims.subject, "sub-42");
        assert_eq!(claims.email.as_deref(), Some("ravi@example.org"));
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let verifier = test_verifier();
        let token = verifier.issue("sub-42", None, u64::MAX).unwrap();
        assert_eq!(verifier.verify(&token).unwrap().subject, "sub-42");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = test_verifier().issue("sub-42", None, 3600).unwrap();
        let other =
            TokenVerifier::new("another-secret-that-is-also-32-characters".into()).unwrap();

        assert!(matches!(
            other.verify(&token),
            Err(WardError::Authentication(_))
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            test_verifier().verify("not.a.token"),
            Err(WardError::Authentication(_))
        ));
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(TokenVerifier::new("short".into()).is_err());
        assert!(TokenVerifier::new(String::new()).is_err());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic a b")), None);
        assert_eq!(extract_token_from_header(None), None);
    }
}
