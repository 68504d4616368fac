//! User directory: staff registration, profile edits and role changes
//!
//! Staff are registered by email without a subject; the identity resolver
//! links the subject on their first login.

use std::sync::Arc;

use rusqlite::TransactionBehavior;
use serde::Deserialize;
use tracing::info;

use super::notify::Notifier;
use super::with_write_retry;
use crate::db::users::{self, NewUser, ProfileChanges};
use crate::db::{assignments, complaints, Database};
use crate::error::WardError;
use crate::types::{Actor, AssignmentStatus, NotificationKind, Role, User};

const ROLE_REVOKED_NOTE: &str = "Officer role revoked";

/// Input for pre-registering an officer or administrator
#[derive(Debug, Clone, Deserialize)]
pub struct NewStaff {
    pub email: String,
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub ward: Option<u32>,
}

pub struct UserService {
    db: Arc<Database>,
    notifier: Notifier,
    retries: u32,
}

impl UserService {
    pub fn new(db: Arc<Database>, notifier: Notifier, retries: u32) -> Self {
        Self {
            db,
            notifier,
            retries,
        }
    }

    pub fn get(&self, id: &str) -> Result<User, WardError> {
        self.db
            .with_conn(|conn| users::get_user(conn, id))?
            .ok_or_else(|| WardError::NotFound(format!("user {}", id)))
    }

    pub fn register_staff(&self, admin: &Actor, input: NewStaff) -> Result<User, WardError> {
        require_admin(admin)?;
        check_role_ward(input.role, input.ward)?;
        if input.role == Role::Citizen {
            return Err(WardError::Validation("staff must be an officer or admin".into()));
        }

        let email = input.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(WardError::Validation(format!("invalid email: {}", input.email)));
        }
        let display_name = input.display_name.trim();
        if display_name.is_empty() {
            return Err(WardError::Validation("display name must not be empty".into()));
        }

        let new_user = NewUser {
            subject: None,
            email: Some(email.clone()),
            role: input.role,
            ward: input.ward,
            display_name: display_name.to_string(),
            phone: None,
        };

        let user = self
            .db
            .with_conn(|conn| users::insert_user(conn, &new_user))
            .map_err(|e| {
                if e.is_constraint_violation() {
                    WardError::Validation(format!("{} is already registered", email))
                } else {
                    e
                }
            })?;

        info!(user_id = %user.id, role = %user.role, ward = ?user.ward, "Staff registered");
        Ok(user)
    }

    /// Update the actor's own profile. Staff wards are managed by admins.
    pub fn update_profile(&self, actor: &Actor, changes: ProfileChanges) -> Result<User, WardError> {
        if changes.ward.is_some() && actor.role != Role::Citizen {
            return Err(WardError::Permission(
                "staff wards are changed through role assignment".into(),
            ));
        }
        if changes.ward == Some(0) {
            return Err(WardError::Validation("ward must be a positive number".into()));
        }
        let display_name = match changes.display_name.map(|n| n.trim().to_string()) {
            Some(name) if name.is_empty() => {
                return Err(WardError::Validation("display name must not be empty".into()))
            }
            other => other,
        };
        let changes = ProfileChanges {
            display_name,
            phone: changes.phone.map(|p| p.trim().to_string()),
            ward: changes.ward,
        };

        self.db.with_conn(|conn| {
            if !users::update_profile(conn, &actor.id, &changes)? {
                return Err(WardError::NotFound(format!("user {}", actor.id)));
            }
            users::get_user(conn, &actor.id)?
                .ok_or_else(|| WardError::NotFound(format!("user {}", actor.id)))
        })
    }

    pub fn set_role(
        &self,
        admin: &Actor,
        user_id: &str,
        role: Role,
        ward: Option<u32>,
    ) -> Result<User, WardError> {
        require_admin(admin)?;
        check_role_ward(role, ward)?;
        if admin.id == user_id && role != Role::Admin {
            return Err(WardError::Validation(
                "administrators may not demote themselves".into(),
            ));
        }

        let (user, released, admin_ids) = with_write_retry(self.retries, "set_role", || {
            self.db.with_conn_mut(|conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let previous = users::get_user(&tx, user_id)?
                    .ok_or_else(|| WardError::NotFound(format!("user {}", user_id)))?;

                // Assignments may only be held by officers
                let mut released = Vec::new();
                if previous.role == Role::Officer && role != Role::Officer {
                    for active in assignments::list_active_for_officer(&tx, user_id)? {
                        if !assignments::close_active(
                            &tx,
                            &active.id,
                            AssignmentStatus::Transferred,
                            Some(ROLE_REVOKED_NOTE),
                        )? {
                            return Err(WardError::Conflict(format!(
                                "assignment {} changed concurrently",
                                active.id
                            )));
                        }
                        complaints::set_assigned_officer(&tx, &active.complaint_id, None)?;
                        released.push(active.complaint_id);
                    }
                }

                users::set_role(&tx, user_id, role, ward)?;
                let user = users::get_user(&tx, user_id)?
                    .ok_or_else(|| WardError::Internal("User vanished during role change".into()))?;
                let admin_ids = if released.is_empty() {
                    Vec::new()
                } else {
                    users::list_admin_ids(&tx)?
                };

                tx.commit()?;
                Ok((user, released, admin_ids))
            })
        })?;

        info!(
            user_id = %user.id,
            role = %role,
            ward = ?ward,
            actor_id = %admin.id,
            released = released.len(),
            "Role changed"
        );

        for complaint_id in &released {
            let message = format!(
                "Complaint {} needs a new officer: {} no longer holds the officer role.",
                complaint_id, user.display_name
            );
            for admin_id in admin_ids.iter().filter(|id| **id != admin.id) {
                self.notifier.send(
                    admin_id,
                    NotificationKind::Assignment,
                    message.as_str(),
                    Some(complaint_id.as_str()),
                );
            }
        }

        Ok(user)
    }
}

fn require_admin(actor: &Actor) -> Result<(), WardError> {
    if actor.role == Role::Admin {
        Ok(())
    } else {
        Err(WardError::Permission("administrator role required".into()))
    }
}

/// Officers belong to exactly one ward; admins to none
fn check_role_ward(role: Role, ward: Option<u32>) -> Result<(), WardError> {
    match (role, ward) {
        (Role::Officer, None) | (Role::Officer, Some(0)) => {
            Err(WardError::Validation("an officer requires a ward".into()))
        }
        (Role::Admin, Some(_)) => Err(WardError::Validation(
            "an administrator has no ward".into(),
        )),
        (_, Some(0)) => Err(WardError::Validation("ward must be a positive number".into())),
        _ => Ok(()),
    }
}
