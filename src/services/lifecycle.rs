//! Complaint status state machine
//!
//! ```text
//! PENDING ──► IN_REVIEW ──► RESOLVED
//!    │            │
//!    └────────────┴──► CLOSED   (admin only)
//! ```
//!
//! RESOLVED and CLOSED are terminal. This module is the only writer of
//! `complaints.status` and `status_history`; both are written in one
//! transaction so the current status always equals the latest history entry.

use std::sync::Arc;

use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;
use tracing::{info, warn};

use super::assignment::complete_active;
use super::notify::Notifier;
use super::with_write_retry;
use crate::db::{complaints, history, now_timestamp, Database};
use crate::error::WardError;
use crate::policy::can_mutate_complaint_status;
use crate::types::{Actor, Complaint, ComplaintStatus, NotificationKind, Role};

/// Requested status change
#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub new_status: ComplaintStatus,
    #[serde(default)]
    pub note: Option<String>,
    /// Status the caller believes is current; a mismatch is rejected as stale
    #[serde(default)]
    pub expected_current: Option<ComplaintStatus>,
}

impl StatusChange {
    pub fn to(new_status: ComplaintStatus) -> Self {
        Self {
            new_status,
            note: None,
            expected_current: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn expecting(mut self, current: ComplaintStatus) -> Self {
        self.expected_current = Some(current);
        self
    }
}

/// Drives status transitions and their side effects
pub struct LifecycleService {
    db: Arc<Database>,
    notifier: Notifier,
    retries: u32,
}

impl LifecycleService {
    pub fn new(db: Arc<Database>, notifier: Notifier, retries: u32) -> Self {
        Self {
            db,
            notifier,
            retries,
        }
    }

    /// Move a complaint to a new status.
    ///
    /// Status and history are committed together. Completing the active
    /// assignment and notifying the author happen afterwards and cannot undo
    /// the transition.
    pub fn transition_status(
        &self,
        actor: &Actor,
        complaint_id: &str,
        change: StatusChange,
    ) -> Result<Complaint, WardError> {
        let (previous, updated) = with_write_retry(self.retries, "transition_status", || {
            self.db.with_conn_mut(|conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let complaint = complaints::get_complaint(&tx, complaint_id)?
                    .ok_or_else(|| WardError::NotFound(format!("complaint {}", complaint_id)))?;
                let updated = apply_transition(&tx, actor, &complaint, &change)?;
                tx.commit()?;
                Ok((complaint.status, updated))
            })
        })?;

        info!(
            complaint_id = %updated.id,
            actor_id = %actor.id,
            from = %previous,
            to = %updated.status,
            "Complaint status changed"
        );

        if updated.status.is_terminal() {
            match self.db.with_conn(|conn| complete_active(conn, &updated.id)) {
                Ok(Some(assignment)) => info!(
                    complaint_id = %updated.id,
                    assignment_id = %assignment.id,
                    "Active assignment completed"
                ),
                Ok(None) => {}
                Err(e) => warn!(
                    complaint_id = %updated.id,
                    error = %e,
                    "Failed to complete active assignment"
                ),
            }
        }

        notify_status_change(&self.notifier, &updated);

        Ok(updated)
    }
}

/// Validate and apply one transition inside the caller's transaction.
///
/// The status write is guarded on the status read by the caller; a miss
/// means another writer got there first and is reported as `Conflict`.
pub(crate) fn apply_transition(
    conn: &Connection,
    actor: &Actor,
    complaint: &Complaint,
    change: &StatusChange,
) -> Result<Complaint, WardError> {
    if !can_mutate_complaint_status(actor, complaint) {
        return Err(WardError::Permission(format!(
            "actor {} may not change the status of complaint {}",
            actor.id, complaint.id
        )));
    }

    if change.new_status == ComplaintStatus::Closed && actor.role != Role::Admin {
        return Err(WardError::Permission(
            "only administrators may close a complaint".into(),
        ));
    }

    if let Some(expected) = change.expected_current {
        if expected != complaint.status {
            return Err(WardError::InvalidTransition(format!(
                "complaint {} is {}, request was made against {}",
                complaint.id, complaint.status, expected
            )));
        }
    }

    if !complaint.status.can_transition_to(change.new_status) {
        return Err(WardError::InvalidTransition(format!(
            "{} -> {} is not allowed",
            complaint.status, change.new_status
        )));
    }

    let now = now_timestamp();
    if !complaints::update_status(conn, &complaint.id, complaint.status, change.new_status, &now)? {
        return Err(WardError::Conflict(format!(
            "complaint {} changed status concurrently",
            complaint.id
        )));
    }

    history::append_entry(
        conn,
        &complaint.id,
        change.new_status,
        &actor.id,
        change.note.as_deref(),
        &now,
    )?;

    complaints::get_complaint(conn, &complaint.id)?
        .ok_or_else(|| WardError::Internal("Complaint vanished during transition".into()))
}

/// Write the PENDING entry that opens a new complaint's history
pub(crate) fn record_initial_status(
    conn: &Connection,
    complaint: &Complaint,
    actor_id: &str,
) -> Result<(), WardError> {
    history::append_entry(
        conn,
        &complaint.id,
        complaint.status,
        actor_id,
        Some("Complaint filed"),
        &complaint.created_at,
    )?;
    Ok(())
}

/// Tell the author their complaint moved
pub(crate) fn notify_status_change(notifier: &Notifier, complaint: &Complaint) {
    notifier.send(
        &complaint.author_id,
        NotificationKind::StatusChange,
        format!(
            "Your complaint \"{}\" is now {}.",
            complaint.title,
            complaint.status.label()
        ),
        Some(&complaint.id),
    );
}
