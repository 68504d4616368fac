//! Caller identity
//!
//! Provides:
//! - Bearer token verification against the external issuer's shared secret
//! - Resolution of verified claims to an internal user, provisioning
//!   first-seen citizens

pub mod identity;
pub mod token;

pub use identity::{IdentityClaims, IdentityResolver};
pub use token::{extract_token_from_header, TokenClaims, TokenVerifier};
