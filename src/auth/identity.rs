//! Resolution of verified claims to internal users
//!
//! Linking order: subject, then email (attaching the subject to a
//! pre-registered row exactly once), then provisioning a ward-less CITIZEN.
//! The UNIQUE constraint on `users.subject` makes concurrent first contact
//! safe: a losing insert falls back to reading the winner's row.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::db::users::{self, NewUser};
use crate::db::Database;
use crate::error::WardError;
use crate::types::{Role, User};

/// Claims handed over by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub subject: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl IdentityClaims {
    pub fn new(subject: impl Into<String>, email: Option<&str>) -> Self {
        Self {
            subject: subject.into(),
            email: email.map(str::to_string),
            name: None,
        }
    }
}

/// Resolves claims to users, provisioning on first contact
pub struct IdentityResolver {
    db: Arc<Database>,
}

impl IdentityResolver {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Map claims to an active user. Never changes an existing user's role.
    pub fn resolve(&self, claims: &IdentityClaims) -> Result<User, WardError> {
        let subject = claims.subject.trim();
        if subject.is_empty() {
            return Err(WardError::Authentication("credential has no subject".into()));
        }
        let email = normalize_email(claims.email.as_deref());

        let user = self.db.with_conn(|conn| {
            if let Some(user) = users::get_user_by_subject(conn, subject)? {
                return Ok(user);
            }

            if let Some(email) = email.as_deref() {
                if let Some(user) = users::get_user_by_email(conn, email)? {
                    return link_by_email(conn, user, subject);
                }
            }

            let new_user = NewUser {
                subject: Some(subject.to_string()),
                email: email.clone(),
                role: Role::Citizen,
                ward: None,
                display_name: display_name_for(claims, email.as_deref()),
                phone: None,
            };

            match users::insert_user(conn, &new_user) {
                Ok(user) => {
                    info!(user_id = %user.id, subject = %subject, "Provisioned citizen on first contact");
                    Ok(user)
                }
                Err(e) if e.is_constraint_violation() => {
                    debug!(subject = %subject, "Provisioning raced, reading existing user");
                    users::get_user_by_subject(conn, subject)?.ok_or_else(|| {
                        WardError::Authentication(
                            "email is already registered to another identity".into(),
                        )
                    })
                }
                Err(e) => Err(e),
            }
        })?;

        if !user.is_active {
            return Err(WardError::Authentication("account is disabled".into()));
        }

        Ok(user)
    }
}

/// Attach `subject` to a user found by email, or reject a mismatch
fn link_by_email(
    conn: &rusqlite::Connection,
    user: User,
    subject: &str,
) -> Result<User, WardError> {
    match user.subject.as_deref() {
        None => {
            if users::link_subject(conn, &user.id, subject)? {
                info!(user_id = %user.id, subject = %subject, "Linked subject to existing user by email");
            }
            // Re-read: a concurrent resolution may have linked a different subject
            let linked = users::get_user(conn, &user.id)?
                .ok_or_else(|| WardError::NotFound(format!("user {}", user.id)))?;
            if linked.subject.as_deref() == Some(subject) {
                Ok(linked)
            } else {
                Err(WardError::Authentication(
                    "email is already linked to another identity".into(),
                ))
            }
        }
        Some(existing) if existing == subject => Ok(user),
        Some(_) => {
            warn!(user_id = %user.id, "Refusing to relink email to a different subject");
            Err(WardError::Authentication(
                "email is already linked to another identity".into(),
            ))
        }
    }
}

fn normalize_email(email: Option<&str>) -> Option<String> {
    email
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
}

fn display_name_for(claims: &IdentityClaims, email: Option<&str>) -> String {
    if let Some(name) = claims.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    email
        .and_then(|e| e.split('@').next())
        .filter(|local| !local.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "Citizen".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> (Arc<Database>, IdentityResolver) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (db.clone(), IdentityResolver::new(db))
    }

    #[test]
    fn test_first_contact_provisions_citizen() {
        let (_, resolver) = resolver();
        let user = resolver
            .resolve(&IdentityClaims::new("sub-1", Some(" Meera@Example.org ")))
            .unwrap();

        assert_eq!(user.role, Role::Citizen);
        assert_eq!(user.ward, None);
        assert_eq!(user.email.as_deref(), Some("meera@example.org"));
        assert_eq!(user.display_name, "meera");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let (db, resolver) = resolver();
        let claims = IdentityClaims::new("sub-1", Some("meera@example.org"));
        let first = resolver.resolve(&claims).unwrap();
        let second = resolver.resolve(&claims).unwrap();

        assert_eq!(first.id, second.id);
        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_missing_subject_fails() {
        let (_, resolver) = resolver();
        assert!(matches!(
            resolver.resolve(&IdentityClaims::new("   ", Some("x@example.org"))),
            Err(WardError::Authentication(_))
        ));
    }

    #[test]
    fn test_email_repair_links_preregistered_staff() {
        let (db, resolver) = resolver();
        let staff = db
            .with_conn(|conn| {
                users::insert_user(
                    conn,
                    &NewUser {
                        subject: None,
                        email: Some("officer@ward3.gov".into()),
                        role: Role::Officer,
                        ward: Some(3),
                        display_name: "Officer".into(),
                        phone: None,
                    },
                )
            })
            .unwrap();

        let user = resolver
            .resolve(&IdentityClaims::new("sub-officer", Some("Officer@Ward3.gov")))
            .unwrap();
        assert_eq!(user.id, staff.id);
        assert_eq!(user.role, Role::Officer);
        assert_eq!(user.subject.as_deref(), Some("sub-officer"));

        // A different subject presenting the same email is refused
        assert!(matches!(
            resolver.resolve(&IdentityClaims::new("sub-other", Some("officer@ward3.gov"))),
            Err(WardError::Authentication(_))
        ));
    }

    #[test]
    fn test_disabled_user_rejected() {
        let (db, resolver) = resolver();
        let user = resolver.resolve(&IdentityClaims::new("sub-1", None)).unwrap();
        db.with_conn(|conn| {
            conn.execute("UPDATE users SET is_active = 0 WHERE id = ?", [&user.id])?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            resolver.resolve(&IdentityClaims::new("sub-1", None)),
            Err(WardError::Authentication(_))
        ));
    }

    #[test]
    fn test_display_name_prefers_claim_name() {
        let claims = IdentityClaims {
            subject: "s".into(),
            email: Some("x@example.org".into()),
            name: Some("Kavya R".into()),
        };
        assert_eq!(display_name_for(&claims, Some("x@example.org")), "Kavya R");
        assert_eq!(display_name_for(&IdentityClaims::new("s", None), None), "Citizen");
    }
}
