//! Status history (append-only)

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::new_id;
use crate::error::WardError;
use crate::types::{ComplaintStatus, StatusHistoryEntry};

fn entry_from_row(row: &Row) -> rusqlite::Result<StatusHistoryEntry> {
    Ok(StatusHistoryEntry {
        id: row.get("id")?,
        complaint_id: row.get("complaint_id")?,
        status: row.get("status")?,
        changed_by: row.get("changed_by")?,
        note: row.get("note")?,
        changed_at: row.get("changed_at")?,
    })
}

pub fn append_entry(
    conn: &Connection,
    complaint_id: &str,
    status: ComplaintStatus,
    changed_by: &str,
    note: Option<&str>,
    changed_at: &str,
) -> Result<StatusHistoryEntry, WardError> {
    let id = new_id();
    conn.execute(
        r#"
        INSERT INTO status_history (id, complaint_id, status, changed_by, note, changed_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        params![id, complaint_id, status, changed_by, note, changed_at],
    )?;

    Ok(StatusHistoryEntry {
        id,
        complaint_id: complaint_id.to_string(),
        status,
        changed_by: changed_by.to_string(),
        note: note.map(str::to_string),
        changed_at: changed_at.to_string(),
    })
}

/// Full trail, oldest first
pub fn list_for_complaint(
    conn: &Connection,
    complaint_id: &str,
) -> Result<Vec<StatusHistoryEntry>, WardError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM status_history WHERE complaint_id = ? ORDER BY changed_at ASC, rowid ASC",
    )?;
    let entries = stmt
        .query_map(params![complaint_id], entry_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Most recently appended entry
pub fn latest_for_complaint(
    conn: &Connection,
    complaint_id: &str,
) -> Result<Option<StatusHistoryEntry>, WardError> {
    Ok(conn
        .query_row(
            "SELECT * FROM status_history WHERE complaint_id = ? ORDER BY changed_at DESC, rowid DESC LIMIT 1",
            params![complaint_id],
            entry_from_row,
        )
        .optional()?)
}
