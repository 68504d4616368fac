//! Assignment CRUD operations
//!
//! The partial unique index `idx_assignments_one_active` rejects a second
//! ACTIVE row for the same complaint.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{new_id, now_timestamp};
use crate::error::WardError;
use crate::types::{Assignment, AssignmentStatus};

fn assignment_from_row(row: &Row) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: row.get("id")?,
        complaint_id: row.get("complaint_id")?,
        officer_id: row.get("officer_id")?,
        assigned_by: row.get("assigned_by")?,
        status: row.get("status")?,
        assigned_at: row.get("assigned_at")?,
        completed_at: row.get("completed_at")?,
        notes: row.get("notes")?,
    })
}

pub fn get_assignment(conn: &Connection, id: &str) -> Result<Option<Assignment>, WardError> {
    Ok(conn
        .query_row(
            "SELECT * FROM assignments WHERE id = ?",
            params![id],
            assignment_from_row,
        )
        .optional()?)
}

pub fn get_active_for_complaint(
    conn: &Connection,
    complaint_id: &str,
) -> Result<Option<Assignment>, WardError> {
    Ok(conn
        .query_row(
            "SELECT * FROM assignments WHERE complaint_id = ? AND status = 'ACTIVE'",
            params![complaint_id],
            assignment_from_row,
        )
        .optional()?)
}

/// Assignment trail for a complaint, oldest first
pub fn list_for_complaint(
    conn: &Connection,
    complaint_id: &str,
) -> Result<Vec<Assignment>, WardError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM assignments WHERE complaint_id = ? ORDER BY assigned_at ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![complaint_id], assignment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// ACTIVE assignments held by one officer, oldest first
pub fn list_active_for_officer(
    conn: &Connection,
    officer_id: &str,
) -> Result<Vec<Assignment>, WardError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM assignments WHERE officer_id = ? AND status = 'ACTIVE' \
         ORDER BY assigned_at ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![officer_id], assignment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert a new ACTIVE assignment. A concurrent ACTIVE row for the same
/// complaint is reported as `Conflict`.
pub fn insert_active(
    conn: &Connection,
    complaint_id: &str,
    officer_id: &str,
    assigned_by: &str,
) -> Result<Assignment, WardError> {
    let id = new_id();
    let result = conn.execute(
        r#"
        INSERT INTO assignments (id, complaint_id, officer_id, assigned_by, status, assigned_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            complaint_id,
            officer_id,
            assigned_by,
            AssignmentStatus::Active,
            now_timestamp(),
        ],
    );

    if let Err(e) = result {
        let err = WardError::from(e);
        if err.is_constraint_violation() {
            return Err(WardError::Conflict(format!(
                "complaint {} already has an active assignment",
                complaint_id
            )));
        }
        return Err(err);
    }

    get_assignment(conn, &id)?
        .ok_or_else(|| WardError::Internal("Assignment not found after insert".to_string()))
}

/// Move an ACTIVE assignment to a closing state. Returns false if the row
/// was no longer ACTIVE.
pub fn close_active(
    conn: &Connection,
    id: &str,
    status: AssignmentStatus,
    notes: Option<&str>,
) -> Result<bool, WardError> {
    let completed_at = match status {
        AssignmentStatus::Completed => Some(now_timestamp()),
        _ => None,
    };

    let changes = conn.execute(
        r#"
        UPDATE assignments SET
            status = ?,
            notes = COALESCE(?, notes),
            completed_at = COALESCE(?, completed_at)
        WHERE id = ? AND status = 'ACTIVE'
        "#,
        params![status, notes, completed_at, id],
    )?;
    Ok(changes > 0)
}
