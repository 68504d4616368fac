//! Complaint CRUD operations
//!
//! Status columns are only written through [`update_status`], which callers
//! pair with a history append inside one transaction.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Deserialize;
use tracing::debug;

use super::{new_id, now_timestamp};
use crate::error::WardError;
use crate::types::{Category, Complaint, ComplaintStatus, ComplaintVisibility};

const COMPLAINT_COLUMNS: &str = "id, title, description, category, ward, address, author_id, \
     status, visibility, assigned_officer_id, created_at, updated_at";

fn complaint_from_row(row: &Row) -> rusqlite::Result<Complaint> {
    Ok(Complaint {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        category: row.get("category")?,
        ward: row.get("ward")?,
        address: row.get("address")?,
        author_id: row.get("author_id")?,
        status: row.get("status")?,
        visibility: row.get("visibility")?,
        assigned_officer_id: row.get("assigned_officer_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Validated input for inserting a complaint
#[derive(Debug, Clone)]
pub struct InsertComplaint<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub category: Category,
    pub ward: u32,
    pub address: Option<&'a str>,
    pub author_id: &'a str,
    pub visibility: ComplaintVisibility,
}

/// Author-editable fields; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComplaintEdit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub visibility: Option<ComplaintVisibility>,
}

/// Query parameters for listing complaints
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintQuery {
    #[serde(default)]
    pub ward: Option<u32>,
    #[serde(default)]
    pub status: Option<ComplaintStatus>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    100
}

impl Default for ComplaintQuery {
    fn default() -> Self {
        Self {
            ward: None,
            status: None,
            category: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

pub fn get_complaint(conn: &Connection, id: &str) -> Result<Option<Complaint>, WardError> {
    let sql = format!("SELECT {} FROM complaints WHERE id = ?", COMPLAINT_COLUMNS);
    Ok(conn
        .query_row(&sql, params![id], complaint_from_row)
        .optional()?)
}

/// List complaints, newest first. Visibility filtering is the caller's job.
pub fn list_complaints(
    conn: &Connection,
    query: &ComplaintQuery,
) -> Result<Vec<Complaint>, WardError> {
    let mut sql = format!("SELECT {} FROM complaints", COMPLAINT_COLUMNS);
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];
    let mut conditions = vec![];

    if let Some(ward) = query.ward {
        conditions.push("ward = ?");
        params.push(Box::new(ward));
    }
    if let Some(status) = query.status {
        conditions.push("status = ?");
        params.push(Box::new(status));
    }
    if let Some(category) = query.category {
        conditions.push("category = ?");
        params.push(Box::new(category));
    }

    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?");
    params.push(Box::new(query.limit as i64));
    params.push(Box::new(query.offset as i64));

    debug!("Executing query: {}", sql);

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), complaint_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Insert a complaint row in status PENDING. The initial history entry is
/// written by the caller in the same transaction.
pub fn insert_complaint(
    conn: &Connection,
    input: &InsertComplaint<'_>,
) -> Result<Complaint, WardError> {
    let id = new_id();
    let now = now_timestamp();

    conn.execute(
        r#"
        INSERT INTO complaints (
            id, title, description, category, ward, address, author_id,
            status, visibility, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            input.title,
            input.description,
            input.category,
            input.ward,
            input.address,
            input.author_id,
            ComplaintStatus::Pending,
            input.visibility,
            now,
            now,
        ],
    )?;

    get_complaint(conn, &id)?
        .ok_or_else(|| WardError::Internal("Complaint not found after insert".to_string()))
}

/// Compare-and-set the status. Returns false when the stored status no
/// longer equals `expected`.
pub fn update_status(
    conn: &Connection,
    id: &str,
    expected: ComplaintStatus,
    next: ComplaintStatus,
    now: &str,
) -> Result<bool, WardError> {
    let changes = conn.execute(
        "UPDATE complaints SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        params![next, now, id, expected],
    )?;
    Ok(changes > 0)
}

pub fn set_assigned_officer(
    conn: &Connection,
    id: &str,
    officer_id: Option<&str>,
) -> Result<bool, WardError> {
    let changes = conn.execute(
        "UPDATE complaints SET assigned_officer_id = ?, updated_at = ? WHERE id = ?",
        params![officer_id, now_timestamp(), id],
    )?;
    Ok(changes > 0)
}

pub fn apply_edit(conn: &Connection, id: &str, edit: &ComplaintEdit) -> Result<bool, WardError> {
    let changes = conn.execute(
        r#"
        UPDATE complaints SET
            title = COALESCE(?, title),
            description = COALESCE(?, description),
            address = COALESCE(?, address),
            visibility = COALESCE(?, visibility),
            updated_at = ?
        WHERE id = ?
        "#,
        params![
            edit.title,
            edit.description,
            edit.address,
            edit.visibility,
            now_timestamp(),
            id,
        ],
    )?;
    Ok(changes > 0)
}

/// Delete a complaint; comments, history and assignments cascade
pub fn delete_complaint(conn: &Connection, id: &str) -> Result<bool, WardError> {
    let changes = conn.execute("DELETE FROM complaints WHERE id = ?", params![id])?;
    Ok(changes > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::users::{insert_user, NewUser};
    use crate::db::Database;
    use crate::types::Role;

    fn seed(conn: &Connection) -> Result<Complaint, WardError> {
        let author = insert_user(
            conn,
            &NewUser {
                subject: Some("sub".into()),
                email: None,
                role: Role::Citizen,
                ward: Some(3),
                display_name: "Author".into(),
                phone: None,
            },
        )?;
        insert_complaint(
            conn,
            &InsertComplaint {
                title: "Pothole",
                description: "Deep pothole near the school",
                category: Category::Roads,
                ward: 3,
                address: Some("12 Station Road"),
                author_id: &author.id,
                visibility: ComplaintVisibility::Public,
            },
        )
    }

    #[test]
    fn test_compare_and_set_status() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let complaint = seed(conn)?;
            let now = now_timestamp();

            assert!(update_status(
                conn,
                &complaint.id,
                ComplaintStatus::Pending,
                ComplaintStatus::InReview,
                &now
            )?);
            // Stale expectation no longer matches
            assert!(!update_status(
                conn,
                &complaint.id,
                ComplaintStatus::Pending,
                ComplaintStatus::Closed,
                &now
            )?);
            assert_eq!(
                get_complaint(conn, &complaint.id)?.unwrap().status,
                ComplaintStatus::InReview
            );
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_ward_is_immutable() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let complaint = seed(conn)?;
            let result = conn.execute(
                "UPDATE complaints SET ward = 9 WHERE id = ?",
                params![complaint.id],
            );
            assert!(result.is_err());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_list_filters_by_ward() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            seed(conn)?;
            let in_ward = list_complaints(conn, &ComplaintQuery { ward: Some(3), ..Default::default() })?;
            assert_eq!(in_ward.len(), 1);
            let elsewhere = list_complaints(conn, &ComplaintQuery { ward: Some(4), ..Default::default() })?;
            assert!(elsewhere.is_empty());
            Ok(())
        })
        .unwrap();
    }
}
