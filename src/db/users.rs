//! User CRUD operations

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{new_id, now_timestamp};
use crate::error::WardError;
use crate::types::{Role, User};

const USER_COLUMNS: &str =
    "id, subject, email, role, ward, display_name, phone, is_active, created_at, updated_at";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        subject: row.get("subject")?,
        email: row.get("email")?,
        role: row.get("role")?,
        ward: row.get("ward")?,
        display_name: row.get("display_name")?,
        phone: row.get("phone")?,
        is_active: row.get::<_, i64>("is_active")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Input for inserting a user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub subject: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    pub ward: Option<u32>,
    pub display_name: String,
    pub phone: Option<String>,
}

/// Partial profile update; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub ward: Option<u32>,
}

fn get_user_where(conn: &Connection, column: &str, value: &str) -> Result<Option<User>, WardError> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
    Ok(conn
        .query_row(&sql, params![value], user_from_row)
        .optional()?)
}

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>, WardError> {
    get_user_where(conn, "id", id)
}

pub fn get_user_by_subject(conn: &Connection, subject: &str) -> Result<Option<User>, WardError> {
    get_user_where(conn, "subject", subject)
}

/// Email comparison is case-insensitive (column collation)
pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, WardError> {
    get_user_where(conn, "email", email)
}

/// Insert a user; a duplicate subject or email surfaces as a constraint violation
pub fn insert_user(conn: &Connection, input: &NewUser) -> Result<User, WardError> {
    let id = new_id();
    let now = now_timestamp();

    conn.execute(
        r#"
        INSERT INTO users (id, subject, email, role, ward, display_name, phone, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            input.subject,
            input.email,
            input.role,
            input.ward,
            input.display_name,
            input.phone,
            now,
            now,
        ],
    )?;

    get_user(conn, &id)?
        .ok_or_else(|| WardError::Internal("User not found after insert".to_string()))
}

/// Attach a subject to a user that has none yet. Returns false when the row
/// already carries a subject.
pub fn link_subject(conn: &Connection, user_id: &str, subject: &str) -> Result<bool, WardError> {
    let changes = conn.execute(
        "UPDATE users SET subject = ?, updated_at = ? WHERE id = ? AND subject IS NULL",
        params![subject, now_timestamp(), user_id],
    )?;
    Ok(changes > 0)
}

pub fn update_profile(
    conn: &Connection,
    user_id: &str,
    changes: &ProfileChanges,
) -> Result<bool, WardError> {
    let updated = conn.execute(
        r#"
        UPDATE users SET
            display_name = COALESCE(?, display_name),
            phone = COALESCE(?, phone),
            ward = COALESCE(?, ward),
            updated_at = ?
        WHERE id = ?
        "#,
        params![
            changes.display_name,
            changes.phone,
            changes.ward,
            now_timestamp(),
            user_id,
        ],
    )?;
    Ok(updated > 0)
}

pub fn set_role(
    conn: &Connection,
    user_id: &str,
    role: Role,
    ward: Option<u32>,
) -> Result<bool, WardError> {
    let updated = conn.execute(
        "UPDATE users SET role = ?, ward = ?, updated_at = ? WHERE id = ?",
        params![role, ward, now_timestamp(), user_id],
    )?;
    Ok(updated > 0)
}

/// Ids of active administrators, for escalation fan-out
pub fn list_admin_ids(conn: &Connection) -> Result<Vec<String>, WardError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM users WHERE role = 'ADMIN' AND is_active = 1 ORDER BY created_at",
    )?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn citizen(subject: &str, email: &str) -> NewUser {
        NewUser {
            subject: Some(subject.into()),
            email: Some(email.into()),
            role: Role::Citizen,
            ward: None,
            display_name: "Test".into(),
            phone: None,
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let user = insert_user(conn, &citizen("sub-1", "asha@example.org"))?;
            assert_eq!(user.role, Role::Citizen);
            assert!(user.is_active);

            let by_subject = get_user_by_subject(conn, "sub-1")?.unwrap();
            assert_eq!(by_subject.id, user.id);
            let by_email = get_user_by_email(conn, "ASHA@example.org")?.unwrap();
            assert_eq!(by_email.id, user.id);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_duplicate_subject_is_constraint_violation() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_user(conn, &citizen("sub-1", "a@example.org"))?;
            let err = insert_user(conn, &citizen("sub-1", "b@example.org")).unwrap_err();
            assert!(err.is_constraint_violation());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_link_subject_only_once() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let mut input = citizen("unused", "staff@example.org");
            input.subject = None;
            let user = insert_user(conn, &input)?;

            assert!(link_subject(conn, &user.id, "sub-a")?);
            assert!(!link_subject(conn, &user.id, "sub-b")?);
            assert_eq!(get_user(conn, &user.id)?.unwrap().subject.as_deref(), Some("sub-a"));
            Ok(())
        })
        .unwrap();
    }
}
