//! Officer assignment lifecycle
//!
//! At most one ACTIVE assignment exists per complaint. Reassignment closes
//! the previous row as TRANSFERRED and inserts the new one in the same
//! immediate transaction; the partial unique index catches anything that
//! slips past that (two connections racing), which surfaces as a retried
//! `Conflict`.

use std::sync::Arc;

use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use super::lifecycle::{apply_transition, notify_status_change, StatusChange};
use super::notify::Notifier;
use super::with_write_retry;
use crate::db::{assignments, complaints, users, Database};
use crate::error::WardError;
use crate::policy::can_view_complaint;
use crate::types::{
    Actor, Assignment, AssignmentStatus, Complaint, ComplaintStatus, NotificationKind, Role,
};

/// Result of a committed assignment, before side effects
struct Assigned {
    assignment: Assignment,
    complaint: Complaint,
    /// False when the officer already held the assignment
    changed: bool,
    status_moved: bool,
}

/// Result of a committed transfer or escalation
struct Released {
    assignment: Assignment,
    complaint: Complaint,
    admin_ids: Vec<String>,
}

pub struct AssignmentService {
    db: Arc<Database>,
    notifier: Notifier,
    retries: u32,
}

impl AssignmentService {
    pub fn new(db: Arc<Database>, notifier: Notifier, retries: u32) -> Self {
        Self {
            db,
            notifier,
            retries,
        }
    }

    /// Give `officer_id` the ACTIVE assignment on a complaint.
    ///
    /// Assigning a PENDING complaint also moves it to IN_REVIEW within the
    /// same transaction. Re-assigning the current holder returns the
    /// existing row untouched.
    pub fn assign(
        &self,
        actor: &Actor,
        complaint_id: &str,
        officer_id: &str,
    ) -> Result<Assignment, WardError> {
        let outcome = with_write_retry(self.retries, "assign", || {
            self.db.with_conn_mut(|conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let complaint = load_complaint(&tx, complaint_id)?;
                check_assign_permission(actor, &complaint, officer_id)?;

                let officer = users::get_user(&tx, officer_id)?
                    .ok_or_else(|| WardError::NotFound(format!("user {}", officer_id)))?;
                if officer.role != Role::Officer || !officer.is_active {
                    return Err(WardError::Validation(format!(
                        "user {} is not an active officer",
                        officer_id
                    )));
                }

                if complaint.status.is_terminal() {
                    return Err(WardError::InvalidTransition(format!(
                        "complaint {} is {} and cannot be assigned",
                        complaint.id, complaint.status
                    )));
                }

                let current = assignments::get_active_for_complaint(&tx, &complaint.id)?;
                if let Some(current) = current {
                    if current.officer_id == officer_id {
                        return Ok(Assigned {
                            assignment: current,
                            complaint,
                            changed: false,
                            status_moved: false,
                        });
                    }
                    if actor.role != Role::Admin {
                        return Err(WardError::Permission(format!(
                            "complaint {} is held by another officer; only an administrator may reassign",
                            complaint.id
                        )));
                    }
                    if !assignments::close_active(
                        &tx,
                        &current.id,
                        AssignmentStatus::Transferred,
                        Some("Reassigned"),
                    )? {
                        return Err(WardError::Conflict(format!(
                            "assignment {} changed concurrently",
                            current.id
                        )));
                    }
                }

                let assignment =
                    assignments::insert_active(&tx, &complaint.id, officer_id, &actor.id)?;
                complaints::set_assigned_officer(&tx, &complaint.id, Some(officer_id))?;

                let mut updated = load_complaint(&tx, &complaint.id)?;
                let status_moved = updated.status == ComplaintStatus::Pending;
                if status_moved {
                    let change = StatusChange::to(ComplaintStatus::InReview)
                        .with_note("Assigned to officer");
                    updated = apply_transition(&tx, actor, &updated, &change)?;
                }

                tx.commit()?;
                Ok(Assigned {
                    assignment,
                    complaint: updated,
                    changed: true,
                    status_moved,
                })
            })
        })?;

        if !outcome.changed {
            info!(
                complaint_id = %complaint_id,
                officer_id = %officer_id,
                "Officer already assigned, nothing to do"
            );
            return Ok(outcome.assignment);
        }

        info!(
            complaint_id = %outcome.complaint.id,
            officer_id = %officer_id,
            assigned_by = %actor.id,
            assignment_id = %outcome.assignment.id,
            "Complaint assigned"
        );

        self.notifier.send(
            officer_id,
            NotificationKind::Assignment,
            format!("You have been assigned \"{}\".", outcome.complaint.title),
            Some(&outcome.complaint.id),
        );
        if outcome.status_moved {
            notify_status_change(&self.notifier, &outcome.complaint);
        }

        Ok(outcome.assignment)
    }

    /// Hand the active assignment back for reassignment
    pub fn transfer(
        &self,
        actor: &Actor,
        complaint_id: &str,
        reason: &str,
    ) -> Result<Assignment, WardError> {
        self.release(actor, complaint_id, reason, AssignmentStatus::Transferred)
    }

    /// Raise the active assignment to the administrators
    pub fn escalate(
        &self,
        actor: &Actor,
        complaint_id: &str,
        reason: &str,
    ) -> Result<Assignment, WardError> {
        self.release(actor, complaint_id, reason, AssignmentStatus::Escalated)
    }

    fn release(
        &self,
        actor: &Actor,
        complaint_id: &str,
        reason: &str,
        status: AssignmentStatus,
    ) -> Result<Assignment, WardError> {
        let reason = reason.trim();
        let op = status.as_str();

        let released = with_write_retry(self.retries, op, || {
            self.db.with_conn_mut(|conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let complaint = load_complaint(&tx, complaint_id)?;

                let active = assignments::get_active_for_complaint(&tx, &complaint.id)?
                    .ok_or_else(|| {
                        WardError::NotFound(format!(
                            "no active assignment on complaint {}",
                            complaint.id
                        ))
                    })?;
                if active.officer_id != actor.id && actor.role != Role::Admin {
                    return Err(WardError::Permission(
                        "only the assigned officer or an administrator may do this".into(),
                    ));
                }
                if reason.is_empty() {
                    return Err(WardError::Validation("a reason is required".into()));
                }

                if !assignments::close_active(&tx, &active.id, status, Some(reason))? {
                    return Err(WardError::Conflict(format!(
                        "assignment {} changed concurrently",
                        active.id
                    )));
                }
                complaints::set_assigned_officer(&tx, &complaint.id, None)?;

                let assignment = assignments::get_assignment(&tx, &active.id)?.ok_or_else(|| {
                    WardError::Internal("Assignment vanished during release".into())
                })?;
                let admin_ids = users::list_admin_ids(&tx)?;

                tx.commit()?;
                Ok(Released {
                    assignment,
                    complaint,
                    admin_ids,
                })
            })
        })?;

        info!(
            complaint_id = %released.complaint.id,
            assignment_id = %released.assignment.id,
            actor_id = %actor.id,
            status = %status,
            "Assignment released"
        );

        let (kind, verb) = match status {
            AssignmentStatus::Escalated => (NotificationKind::Escalation, "escalated"),
            _ => (NotificationKind::Assignment, "transferred"),
        };
        let message = format!(
            "\"{}\" was {}: {}",
            released.complaint.title, verb, reason
        );
        for admin_id in released.admin_ids.iter().filter(|id| **id != actor.id) {
            self.notifier
                .send(admin_id, kind, message.as_str(), Some(&released.complaint.id));
        }

        Ok(released.assignment)
    }

    /// Assignment trail of a complaint, oldest first. Staff only.
    pub fn assignments(
        &self,
        actor: &Actor,
        complaint_id: &str,
    ) -> Result<Vec<Assignment>, WardError> {
        if !actor.role.is_staff() {
            return Err(WardError::Permission(
                "assignment history is available to staff only".into(),
            ));
        }

        self.db.with_conn(|conn| {
            let complaint = load_complaint(conn, complaint_id)?;
            if !can_view_complaint(Some(actor), &complaint) {
                return Err(WardError::Permission(format!(
                    "complaint {} is not visible",
                    complaint.id
                )));
            }
            assignments::list_for_complaint(conn, &complaint.id)
        })
    }
}

fn load_complaint(conn: &Connection, complaint_id: &str) -> Result<Complaint, WardError> {
    complaints::get_complaint(conn, complaint_id)?
        .ok_or_else(|| WardError::NotFound(format!("complaint {}", complaint_id)))
}

fn check_assign_permission(
    actor: &Actor,
    complaint: &Complaint,
    officer_id: &str,
) -> Result<(), WardError> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Citizen => Err(WardError::Permission("citizens cannot assign officers".into())),
        Role::Officer => {
            if officer_id != actor.id {
                return Err(WardError::Permission(
                    "officers may only claim complaints for themselves".into(),
                ));
            }
            if !can_view_complaint(Some(actor), complaint) || actor.ward != Some(complaint.ward) {
                return Err(WardError::Permission(format!(
                    "complaint {} is outside this officer's ward",
                    complaint.id
                )));
            }
            Ok(())
        }
    }
}

/// Mark the complaint's ACTIVE assignment COMPLETED, if there is one.
/// `assigned_officer_id` stays set so the resolver remains on record.
pub(crate) fn complete_active(
    conn: &Connection,
    complaint_id: &str,
) -> Result<Option<Assignment>, WardError> {
    let Some(active) = assignments::get_active_for_complaint(conn, complaint_id)? else {
        return Ok(None);
    };
    if !assignments::close_active(conn, &active.id, AssignmentStatus::Completed, None)? {
        return Ok(None);
    }
    assignments::get_assignment(conn, &active.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fixtures::fixture;
    use crate::types::ComplaintVisibility;

    #[test]
    fn test_assign_moves_pending_to_in_review() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);

        let assignment = f
            .services
            .assignments
            .assign(&f.admin.actor(), &complaint.id, &f.officer.id)
            .unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Active);

        let updated = f
            .services
            .complaints
            .get(Some(&f.admin.actor()), &complaint.id)
            .unwrap();
        assert_eq!(updated.status, ComplaintStatus::InReview);
        assert_eq!(updated.assigned_officer_id.as_deref(), Some(f.officer.id.as_str()));
        assert_eq!(f.pending_notifications(&f.officer), 1);
        assert_eq!(f.pending_notifications(&f.citizen), 1);
    }

    #[test]
    fn test_reassign_transfers_previous() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);
        let admin = f.admin.actor();

        let first = f.services.assignments.assign(&admin, &complaint.id, &f.officer.id).unwrap();
        let second = f
            .services
            .assignments
            .assign(&admin, &complaint.id, &f.colleague.id)
            .unwrap();
        assert_ne!(first.id, second.id);

        let trail = f.services.assignments.assignments(&admin, &complaint.id).unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].status, AssignmentStatus::Transferred);
        assert_eq!(trail[1].status, AssignmentStatus::Active);
    }

    #[test]
    fn test_same_officer_twice_is_noop() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);
        let admin = f.admin.actor();

        let first = f.services.assignments.assign(&admin, &complaint.id, &f.officer.id).unwrap();
        let again = f.services.assignments.assign(&admin, &complaint.id, &f.officer.id).unwrap();
        assert_eq!(first.id, again.id);

        let trail = f.services.assignments.assignments(&admin, &complaint.id).unwrap();
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn test_assign_permissions() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);

        assert!(matches!(
            f.services.assignments.assign(&f.citizen.actor(), &complaint.id, &f.officer.id),
            Err(WardError::Permission(_))
        ));
        // Officers cannot assign colleagues
        assert!(matches!(
            f.services.assignments.assign(&f.officer.actor(), &complaint.id, &f.colleague.id),
            Err(WardError::Permission(_))
        ));
        // Nor claim outside their ward
        assert!(matches!(
            f.services
                .assignments
                .assign(&f.far_officer.actor(), &complaint.id, &f.far_officer.id),
            Err(WardError::Permission(_))
        ));
        // Self-claim in ward is allowed
        f.services
            .assignments
            .assign(&f.officer.actor(), &complaint.id, &f.officer.id)
            .unwrap();
    }

    #[test]
    fn test_officer_cannot_claim_held_complaint() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);
        f.services
            .assignments
            .assign(&f.admin.actor(), &complaint.id, &f.officer.id)
            .unwrap();

        assert!(matches!(
            f.services
                .assignments
                .assign(&f.colleague.actor(), &complaint.id, &f.colleague.id),
            Err(WardError::Permission(_))
        ));

        let trail = f
            .services
            .assignments
            .assignments(&f.admin.actor(), &complaint.id)
            .unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].status, AssignmentStatus::Active);
        assert_eq!(trail[0].officer_id, f.officer.id);
    }

    #[test]
    fn test_assign_target_must_be_officer() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);

        assert!(matches!(
            f.services.assignments.assign(&f.admin.actor(), &complaint.id, &f.neighbour.id),
            Err(WardError::Validation(_))
        ));
        assert!(matches!(
            f.services.assignments.assign(&f.admin.actor(), &complaint.id, "nobody"),
            Err(WardError::NotFound(_))
        ));
    }

    #[test]
    fn test_escalate_clears_officer_and_notifies_admins() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);
        f.services
            .assignments
            .assign(&f.admin.actor(), &complaint.id, &f.officer.id)
            .unwrap();

        let escalated = f
            .services
            .assignments
            .escalate(&f.officer.actor(), &complaint.id, "Needs the electricity board")
            .unwrap();
        assert_eq!(escalated.status, AssignmentStatus::Escalated);
        assert_eq!(escalated.notes.as_deref(), Some("Needs the electricity board"));

        let updated = f
            .services
            .complaints
            .get(Some(&f.admin.actor()), &complaint.id)
            .unwrap();
        assert_eq!(updated.assigned_officer_id, None);
        assert_eq!(updated.status, ComplaintStatus::InReview);
        assert_eq!(f.pending_notifications(&f.admin), 1);
    }

    #[test]
    fn test_transfer_rules() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);

        assert!(matches!(
            f.services.assignments.transfer(&f.officer.actor(), &complaint.id, "busy"),
            Err(WardError::NotFound(_))
        ));

        f.services
            .assignments
            .assign(&f.admin.actor(), &complaint.id, &f.officer.id)
            .unwrap();

        assert!(matches!(
            f.services.assignments.transfer(&f.colleague.actor(), &complaint.id, "busy"),
            Err(WardError::Permission(_))
        ));
        assert!(matches!(
            f.services.assignments.transfer(&f.officer.actor(), &complaint.id, "  "),
            Err(WardError::Validation(_))
        ));

        let transferred = f
            .services
            .assignments
            .transfer(&f.admin.actor(), &complaint.id, "Rebalancing workload")
            .unwrap();
        assert_eq!(transferred.status, AssignmentStatus::Transferred);
    }

    #[test]
    fn test_history_is_staff_only() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);

        assert!(matches!(
            f.services.assignments.assignments(&f.citizen.actor(), &complaint.id),
            Err(WardError::Permission(_))
        ));
        assert!(f
            .services
            .assignments
            .assignments(&f.officer.actor(), &complaint.id)
            .unwrap()
            .is_empty());
    }
}
