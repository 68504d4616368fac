//! Read/write eligibility for complaints and comments
//!
//! Pure decisions over (actor, record). No I/O, no locking; every service
//! routes its checks through these functions.
//!
//! A PRIVATE complaint with no assigned officer is visible to no officer,
//! even one from the same ward.

use crate::error::WardError;
use crate::types::{Actor, Comment, CommentVisibility, Complaint, ComplaintVisibility, Role};

fn is_author(actor: &Actor, complaint: &Complaint) -> bool {
    actor.id == complaint.author_id
}

fn is_assigned(actor: &Actor, complaint: &Complaint) -> bool {
    complaint.assigned_officer_id.as_deref() == Some(actor.id.as_str())
}

fn in_ward(actor: &Actor, complaint: &Complaint) -> bool {
    actor.ward == Some(complaint.ward)
}

/// Officer with ward or assignment jurisdiction over the complaint
fn has_jurisdiction(actor: &Actor, complaint: &Complaint) -> bool {
    actor.role == Role::Officer && (in_ward(actor, complaint) || is_assigned(actor, complaint))
}

/// May `actor` (None = anonymous) read this complaint?
pub fn can_view_complaint(actor: Option<&Actor>, complaint: &Complaint) -> bool {
    let public = complaint.visibility == ComplaintVisibility::Public;

    let Some(actor) = actor else {
        return public;
    };

    match actor.role {
        Role::Admin => true,
        _ if is_author(actor, complaint) => true,
        // Ward match alone does not open a PRIVATE complaint
        Role::Officer => public || is_assigned(actor, complaint),
        Role::Citizen => public,
    }
}

/// May `actor` change the complaint's status?
pub fn can_mutate_complaint_status(actor: &Actor, complaint: &Complaint) -> bool {
    match actor.role {
        Role::Citizen => false,
        Role::Admin => true,
        Role::Officer => has_jurisdiction(actor, complaint),
    }
}

/// May `actor` read this comment? Nothing on a complaint the actor cannot
/// view is ever visible.
pub fn can_view_comment(actor: Option<&Actor>, complaint: &Complaint, comment: &Comment) -> bool {
    if !can_view_complaint(actor, complaint) {
        return false;
    }

    match comment.visibility {
        CommentVisibility::Public => true,
        CommentVisibility::Private => actor.is_some_and(|a| {
            a.role == Role::Admin || is_author(a, complaint) || is_assigned(a, complaint)
        }),
        CommentVisibility::Internal => {
            actor.is_some_and(|a| a.role == Role::Admin || has_jurisdiction(a, complaint))
        }
    }
}

/// May `actor` post a comment with the requested visibility?
pub fn can_post_comment(
    actor: &Actor,
    complaint: &Complaint,
    requested: CommentVisibility,
) -> Result<(), WardError> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Citizen => {
            if !is_author(actor, complaint) {
                return Err(WardError::Permission(
                    "only the complaint author may comment as a citizen".into(),
                ));
            }
            if requested == CommentVisibility::Internal {
                return Err(WardError::Permission(
                    "citizens cannot post internal comments".into(),
                ));
            }
            Ok(())
        }
        Role::Officer => {
            if !can_view_complaint(Some(actor), complaint) {
                return Err(WardError::Permission(format!(
                    "complaint {} is not visible to this officer",
                    complaint.id
                )));
            }
            match requested {
                CommentVisibility::Public => Ok(()),
                CommentVisibility::Internal if has_jurisdiction(actor, complaint) => Ok(()),
                CommentVisibility::Internal => Err(WardError::Permission(
                    "internal comments require ward or assignment jurisdiction".into(),
                )),
                CommentVisibility::Private if is_assigned(actor, complaint) => Ok(()),
                CommentVisibility::Private => Err(WardError::Permission(
                    "private comments are reserved for the assigned officer".into(),
                )),
            }
        }
    }
}
