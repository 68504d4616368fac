//! Complaint registry: filing, reading, editing and removing complaints
//!
//! Status is never written here; see [`super::lifecycle`].

use std::sync::Arc;

use rusqlite::TransactionBehavior;
use serde::Deserialize;
use tracing::{debug, info};

use super::lifecycle::record_initial_status;
use crate::db::complaints::{self, ComplaintEdit, ComplaintQuery, InsertComplaint};
use crate::db::{history, Database};
use crate::error::WardError;
use crate::policy::can_view_complaint;
use crate::types::{
    Actor, Category, Complaint, ComplaintVisibility, Role, StatusHistoryEntry,
};

/// Input for filing a complaint
#[derive(Debug, Clone, Deserialize)]
pub struct NewComplaint {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub ward: u32,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_visibility")]
    pub visibility: ComplaintVisibility,
}

fn default_visibility() -> ComplaintVisibility {
    ComplaintVisibility::Public
}

pub struct ComplaintService {
    db: Arc<Database>,
}

impl ComplaintService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// File a complaint as PENDING together with its first history entry
    pub fn create(&self, actor: &Actor, input: NewComplaint) -> Result<Complaint, WardError> {
        if actor.role != Role::Citizen {
            return Err(WardError::Permission("only citizens may file complaints".into()));
        }

        let title = input.title.trim();
        let description = input.description.trim();
        if title.is_empty() {
            return Err(WardError::Validation("title must not be empty".into()));
        }
        if description.is_empty() {
            return Err(WardError::Validation("description must not be empty".into()));
        }
        if input.ward == 0 {
            return Err(WardError::Validation("ward must be a positive number".into()));
        }
        let address = input
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty());

        let complaint = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let complaint = complaints::insert_complaint(
                &tx,
                &InsertComplaint {
                    title,
                    description,
                    category: input.category,
                    ward: input.ward,
                    address,
                    author_id: &actor.id,
                    visibility: input.visibility,
                },
            )?;
            record_initial_status(&tx, &complaint, &actor.id)?;
            tx.commit()?;
            Ok(complaint)
        })?;

        info!(
            complaint_id = %complaint.id,
            author_id = %actor.id,
            ward = complaint.ward,
            category = %complaint.category,
            "Complaint filed"
        );
        Ok(complaint)
    }

    pub fn get(&self, actor: Option<&Actor>, id: &str) -> Result<Complaint, WardError> {
        let complaint = self
            .db
            .with_conn(|conn| complaints::get_complaint(conn, id))?
            .ok_or_else(|| WardError::NotFound(format!("complaint {}", id)))?;

        if !can_view_complaint(actor, &complaint) {
            return Err(WardError::Permission(format!("complaint {} is not visible", id)));
        }
        Ok(complaint)
    }

    /// Complaints matching `query` that `actor` may see, newest first.
    ///
    /// Filtering happens after the page is fetched, so a page may hold fewer
    /// than `limit` rows.
    pub fn list(
        &self,
        actor: Option<&Actor>,
        query: &ComplaintQuery,
    ) -> Result<Vec<Complaint>, WardError> {
        let rows = self.db.with_conn(|conn| complaints::list_complaints(conn, query))?;
        let fetched = rows.len();
        let visible: Vec<Complaint> = rows
            .into_iter()
            .filter(|c| can_view_complaint(actor, c))
            .collect();
        debug!(fetched, visible = visible.len(), "Listed complaints");
        Ok(visible)
    }

    /// Status trail, oldest first
    pub fn history(
        &self,
        actor: Option<&Actor>,
        id: &str,
    ) -> Result<Vec<StatusHistoryEntry>, WardError> {
        let complaint = self.get(actor, id)?;
        self.db
            .with_conn(|conn| history::list_for_complaint(conn, &complaint.id))
    }

    /// Author edits while the complaint is still open
    pub fn edit(&self, actor: &Actor, id: &str, edit: ComplaintEdit) -> Result<Complaint, WardError> {
        let edit = ComplaintEdit {
            title: trimmed(edit.title, "title")?,
            description: trimmed(edit.description, "description")?,
            address: edit.address.map(|a| a.trim().to_string()),
            visibility: edit.visibility,
        };

        let updated = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let complaint = complaints::get_complaint(&tx, id)?
                .ok_or_else(|| WardError::NotFound(format!("complaint {}", id)))?;

            if complaint.author_id != actor.id {
                return Err(WardError::Permission(
                    "only the author may edit a complaint".into(),
                ));
            }
            if complaint.status.is_terminal() {
                return Err(WardError::InvalidTransition(format!(
                    "complaint {} is {} and can no longer be edited",
                    id, complaint.status
                )));
            }

            complaints::apply_edit(&tx, id, &edit)?;
            let updated = complaints::get_complaint(&tx, id)?
                .ok_or_else(|| WardError::Internal("Complaint vanished during edit".into()))?;
            tx.commit()?;
            Ok(updated)
        })?;

        info!(complaint_id = %id, author_id = %actor.id, "Complaint edited");
        Ok(updated)
    }

    /// Remove a complaint and everything hanging off it. Admin only.
    pub fn delete(&self, actor: &Actor, id: &str) -> Result<(), WardError> {
        if actor.role != Role::Admin {
            return Err(WardError::Permission(
                "only administrators may delete complaints".into(),
            ));
        }

        let deleted = self.db.with_conn(|conn| complaints::delete_complaint(conn, id))?;
        if !deleted {
            return Err(WardError::NotFound(format!("complaint {}", id)));
        }

        info!(complaint_id = %id, actor_id = %actor.id, "Complaint deleted");
        Ok(())
    }
}

fn trimmed(value: Option<String>, field: &str) -> Result<Option<String>, WardError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Err(WardError::Validation(format!(
            "{} must not be empty",
            field
        ))),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fixtures::fixture;
    use crate::services::StatusChange;
    use crate::types::ComplaintStatus;

    fn input() -> NewComplaint {
        NewComplaint {
            title: "Garbage not collected".into(),
            description: "Bins on 4th cross untouched since Monday".into(),
            category: Category::Sanitation,
            ward: 3,
            address: None,
            visibility: ComplaintVisibility::Public,
        }
    }

    #[test]
    fn test_create_writes_initial_history() {
        let f = fixture();
        let complaint = f.services.complaints.create(&f.citizen.actor(), input()).unwrap();
        assert_eq!(complaint.status, ComplaintStatus::Pending);

        let trail = f.services.complaints.history(None, &complaint.id).unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].status, ComplaintStatus::Pending);
        assert_eq!(trail[0].changed_by, f.citizen.id);
    }

    #[test]
    fn test_create_is_citizen_only_and_validated() {
        let f = fixture();
        assert!(matches!(
            f.services.complaints.create(&f.officer.actor(), input()),
            Err(WardError::Permission(_))
        ));

        let mut blank = input();
        blank.title = "  ".into();
        assert!(matches!(
            f.services.complaints.create(&f.citizen.actor(), blank),
            Err(WardError::Validation(_))
        ));

        let mut no_ward = input();
        no_ward.ward = 0;
        assert!(matches!(
            f.services.complaints.create(&f.citizen.actor(), no_ward),
            Err(WardError::Validation(_))
        ));
    }

    #[test]
    fn test_private_complaint_hidden_from_others() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Private);

        assert!(f.services.complaints.get(Some(&f.citizen.actor()), &complaint.id).is_ok());
        assert!(f.services.complaints.get(Some(&f.admin.actor()), &complaint.id).is_ok());
        for actor in [None, Some(f.neighbour.actor()), Some(f.officer.actor())] {
            assert!(matches!(
                f.services.complaints.get(actor.as_ref(), &complaint.id),
                Err(WardError::Permission(_))
            ));
        }

        let listed = f
            .services
            .complaints
            .list(Some(&f.officer.actor()), &ComplaintQuery::default())
            .unwrap();
        assert!(listed.is_empty());
    }

    #[test]
    fn test_missing_complaint_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.services.complaints.get(Some(&f.admin.actor()), "missing"),
            Err(WardError::NotFound(_))
        ));
    }

    #[test]
    fn test_edit_rules() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);

        let edit = ComplaintEdit {
            title: Some("Streetlight still broken".into()),
            visibility: Some(ComplaintVisibility::Private),
            ..Default::default()
        };
        assert!(matches!(
            f.services.complaints.edit(&f.neighbour.actor(), &complaint.id, edit.clone()),
            Err(WardError::Permission(_))
        ));

        let updated = f
            .services
            .complaints
            .edit(&f.citizen.actor(), &complaint.id, edit.clone())
            .unwrap();
        assert_eq!(updated.title, "Streetlight still broken");
        assert_eq!(updated.visibility, ComplaintVisibility::Private);
        assert_eq!(updated.ward, complaint.ward);

        f.services
            .lifecycle
            .transition_status(&f.admin.actor(), &complaint.id, StatusChange::to(ComplaintStatus::Closed))
            .unwrap();
        assert!(matches!(
            f.services.complaints.edit(&f.citizen.actor(), &complaint.id, edit),
            Err(WardError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_delete_is_admin_only() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);

        assert!(matches!(
            f.services.complaints.delete(&f.citizen.actor(), &complaint.id),
            Err(WardError::Permission(_))
        ));
        f.services.complaints.delete(&f.admin.actor(), &complaint.id).unwrap();
        assert!(matches!(
            f.services.complaints.delete(&f.admin.actor(), &complaint.id),
            Err(WardError::NotFound(_))
        ));
    }
}
