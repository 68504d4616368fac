//! Comment posting and per-viewer listing

use std::sync::Arc;

use rusqlite::TransactionBehavior;
use tracing::{debug, info};

use super::notify::Notifier;
use crate::db::{comments, complaints, users, Database};
use crate::error::WardError;
use crate::policy::{
    can_post_comment, can_view_comment, can_view_complaint, filter_visible_comments,
};
use crate::types::{Actor, Comment, CommentVisibility, NotificationKind};

pub struct CommentService {
    db: Arc<Database>,
    notifier: Notifier,
}

impl CommentService {
    pub fn new(db: Arc<Database>, notifier: Notifier) -> Self {
        Self { db, notifier }
    }

    /// Post a comment. The author is notified when someone else posts a
    /// comment they can read.
    pub fn post(
        &self,
        actor: &Actor,
        complaint_id: &str,
        content: &str,
        visibility: CommentVisibility,
    ) -> Result<Comment, WardError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(WardError::Validation("comment must not be empty".into()));
        }

        let (complaint, comment, author) = self.db.with_conn(|conn| {
            let complaint = complaints::get_complaint(conn, complaint_id)?
                .ok_or_else(|| WardError::NotFound(format!("complaint {}", complaint_id)))?;
            can_post_comment(actor, &complaint, visibility)?;
            let comment =
                comments::insert_comment(conn, &complaint.id, &actor.id, content, visibility)?;
            let author = users::get_user(conn, &complaint.author_id)?;
            Ok((complaint, comment, author))
        })?;

        info!(
            complaint_id = %complaint.id,
            comment_id = %comment.id,
            author_id = %actor.id,
            visibility = %visibility,
            "Comment posted"
        );

        // The author's current role decides what they can read
        let author_can_read = author
            .is_some_and(|author| can_view_comment(Some(&author.actor()), &complaint, &comment));
        if complaint.author_id != actor.id && author_can_read {
            self.notifier.send(
                &complaint.author_id,
                NotificationKind::Comment,
                format!("New comment on \"{}\".", complaint.title),
                Some(&complaint.id),
            );
        }

        Ok(comment)
    }

    /// Comments on a complaint that `actor` may read, newest first.
    ///
    /// Complaint and comments are read in one transaction so the result is a
    /// consistent snapshot.
    pub fn list_visible_comments(
        &self,
        actor: Option<&Actor>,
        complaint_id: &str,
    ) -> Result<Vec<Comment>, WardError> {
        let (complaint, all) = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
            let complaint = complaints::get_complaint(&tx, complaint_id)?
                .ok_or_else(|| WardError::NotFound(format!("complaint {}", complaint_id)))?;
            if !can_view_complaint(actor, &complaint) {
                return Err(WardError::Permission(format!(
                    "complaint {} is not visible",
                    complaint_id
                )));
            }
            let all = comments::list_for_complaint(&tx, &complaint.id)?;
            tx.commit()?;
            Ok((complaint, all))
        })?;

        let total = all.len();
        let visible = filter_visible_comments(actor, &complaint, all);
        debug!(
            complaint_id = %complaint.id,
            total,
            visible = visible.len(),
            "Filtered comments"
        );
        Ok(visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fixtures::fixture;
    use crate::types::{ComplaintVisibility, Role};

    #[test]
    fn test_viewer_specific_listing() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);
        f.services
            .assignments
            .assign(&f.admin.actor(), &complaint.id, &f.officer.id)
            .unwrap();

        let officer = f.officer.actor();
        f.services
            .comments
            .post(&officer, &complaint.id, "Crew scheduled", CommentVisibility::Public)
            .unwrap();
        f.services
            .comments
            .post(&officer, &complaint.id, "Call me on this number", CommentVisibility::Private)
            .unwrap();
        f.services
            .comments
            .post(&officer, &complaint.id, "Vendor contract lapsed", CommentVisibility::Internal)
            .unwrap();

        let count = |actor: Option<&Actor>| {
            f.services
                .comments
                .list_visible_comments(actor, &complaint.id)
                .unwrap()
                .len()
        };
        assert_eq!(count(None), 1);
        assert_eq!(count(Some(&f.neighbour.actor())), 1);
        assert_eq!(count(Some(&f.citizen.actor())), 2);
        assert_eq!(count(Some(&f.colleague.actor())), 2);
        assert_eq!(count(Some(&f.far_officer.actor())), 1);
        assert_eq!(count(Some(&officer)), 3);
        assert_eq!(count(Some(&f.admin.actor())), 3);
    }

    #[test]
    fn test_newest_first() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);
        let author = f.citizen.actor();
        for text in ["first", "second", "third"] {
            f.services
                .comments
                .post(&author, &complaint.id, text, CommentVisibility::Public)
                .unwrap();
        }

        let listed = f
            .services
            .comments
            .list_visible_comments(Some(&author), &complaint.id)
            .unwrap();
        let order: Vec<_> = listed.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(order, vec!["third", "second", "first"]);
    }

    #[test]
    fn test_hidden_complaint_yields_permission_error() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Private);
        assert!(matches!(
            f.services
                .comments
                .list_visible_comments(Some(&f.officer.actor()), &complaint.id),
            Err(WardError::Permission(_))
        ));
    }

    #[test]
    fn test_post_rules_and_author_notification() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);

        assert!(matches!(
            f.services
                .comments
                .post(&f.neighbour.actor(), &complaint.id, "+1", CommentVisibility::Public),
            Err(WardError::Permission(_))
        ));
        assert!(matches!(
            f.services
                .comments
                .post(&f.citizen.actor(), &complaint.id, "   ", CommentVisibility::Public),
            Err(WardError::Validation(_))
        ));

        f.services
            .comments
            .post(&f.officer.actor(), &complaint.id, "Internal note", CommentVisibility::Internal)
            .unwrap();
        assert_eq!(f.pending_notifications(&f.citizen), 0);

        f.services
            .comments
            .post(&f.officer.actor(), &complaint.id, "On it", CommentVisibility::Public)
            .unwrap();
        assert_eq!(f.pending_notifications(&f.citizen), 1);
    }

    #[test]
    fn test_author_promoted_to_staff_hears_internal_comments() {
        let f = fixture();
        let complaint = f.file(ComplaintVisibility::Public);
        f.services
            .users
            .set_role(&f.admin.actor(), &f.citizen.id, Role::Officer, Some(3))
            .unwrap();

        f.services
            .comments
            .post(&f.officer.actor(), &complaint.id, "Contractor lapsed", CommentVisibility::Internal)
            .unwrap();
        assert_eq!(f.pending_notifications(&f.citizen), 1);
    }
}
