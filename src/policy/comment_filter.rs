//! Per-comment filtering for complaint detail views

use crate::types::{Actor, Comment, Complaint};

use super::visibility::can_view_comment;

/// Keep only the comments `actor` may read, preserving input order
pub fn filter_visible_comments(
    actor: Option<&Actor>,
    complaint: &Complaint,
    comments: Vec<Comment>,
) -> Vec<Comment> {
    comments
        .into_iter()
        .filter(|comment| can_view_comment(actor, complaint, comment))
        .collect()
}
