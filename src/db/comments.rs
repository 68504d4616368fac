//! Comment CRUD operations

use rusqlite::{params, Connection, Row};

use super::{new_id, now_timestamp};
use crate::error::WardError;
use crate::types::{Comment, CommentVisibility};

fn comment_from_row(row: &Row) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get("id")?,
        complaint_id: row.get("complaint_id")?,
        author_id: row.get("author_id")?,
        content: row.get("content")?,
        visibility: row.get("visibility")?,
        created_at: row.get("created_at")?,
    })
}

pub fn insert_comment(
    conn: &Connection,
    complaint_id: &str,
    author_id: &str,
    content: &str,
    visibility: CommentVisibility,
) -> Result<Comment, WardError> {
    let comment = Comment {
        id: new_id(),
        complaint_id: complaint_id.to_string(),
        author_id: author_id.to_string(),
        content: content.to_string(),
        visibility,
        created_at: now_timestamp(),
    };

    conn.execute(
        r#"
        INSERT INTO comments (id, complaint_id, author_id, content, visibility, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        params![
            comment.id,
            comment.complaint_id,
            comment.author_id,
            comment.content,
            comment.visibility,
            comment.created_at,
        ],
    )?;

    Ok(comment)
}

/// All comments on a complaint, newest first. Insertion order breaks
/// timestamp ties so the order is stable.
pub fn list_for_complaint(conn: &Connection, complaint_id: &str) -> Result<Vec<Comment>, WardError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM comments WHERE complaint_id = ? ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt
        .query_map(params![complaint_id], comment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
