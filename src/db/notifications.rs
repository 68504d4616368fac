//! Notification outbox
//!
//! Rows are written by the engine and drained by an external delivery
//! worker, which stamps `delivered_at`.

use rusqlite::{params, Connection, Row};

use super::{new_id, now_timestamp};
use crate::error::WardError;
use crate::types::{Notification, NotificationKind};

fn notification_from_row(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        kind: row.get("kind")?,
        message: row.get("message")?,
        complaint_id: row.get("complaint_id")?,
        created_at: row.get("created_at")?,
        delivered_at: row.get("delivered_at")?,
    })
}

pub fn insert_notification(
    conn: &Connection,
    user_id: &str,
    kind: NotificationKind,
    message: &str,
    complaint_id: Option<&str>,
) -> Result<String, WardError> {
    let id = new_id();
    conn.execute(
        r#"
        INSERT INTO notifications (id, user_id, kind, message, complaint_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        params![id, user_id, kind, message, complaint_id, now_timestamp()],
    )?;
    Ok(id)
}

/// Undelivered notifications for a user, oldest first
pub fn list_pending_for_user(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<Notification>, WardError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT * FROM notifications
        WHERE user_id = ? AND delivered_at IS NULL
        ORDER BY created_at ASC, rowid ASC
        "#,
    )?;
    let rows = stmt
        .query_map(params![user_id], notification_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_delivered(conn: &Connection, id: &str) -> Result<bool, WardError> {
    let changes = conn.execute(
        "UPDATE notifications SET delivered_at = ? WHERE id = ? AND delivered_at IS NULL",
        params![now_timestamp(), id],
    )?;
    Ok(changes > 0)
}
