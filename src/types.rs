//! Domain types shared by the policy, lifecycle and storage layers
//!
//! Every tagged field (role, status, visibility, category, ...) is a closed
//! enumeration with one canonical SCREAMING_SNAKE spelling. Parsing at the
//! boundary is forgiving about case and separators but rejects anything
//! outside the set.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::WardError;

/// Declares a closed string-backed enum with canonical text, parsing and
/// SQLite conversions.
macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($what:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = WardError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let canonical = canonicalize(s);
                match canonical.as_str() {
                    $( $text => Ok($name::$variant), )+
                    _ => Err(WardError::Validation(format!(
                        "Unknown {}: '{}'. Valid values: {:?}",
                        $what,
                        s,
                        $name::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>()
                    ))),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: WardError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

/// Normalize free-form input ("in review", "In-Review") to canonical form
fn canonicalize(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

closed_enum! {
    /// Actor role
    pub enum Role ("role") {
        Citizen => "CITIZEN",
        Officer => "OFFICER",
        Admin => "ADMIN",
    }
}

closed_enum! {
    /// Complaint lifecycle status
    pub enum ComplaintStatus ("complaint status") {
        Pending => "PENDING",
        InReview => "IN_REVIEW",
        Resolved => "RESOLVED",
        Closed => "CLOSED",
    }
}

closed_enum! {
    /// Visibility tag on a complaint
    pub enum ComplaintVisibility ("complaint visibility") {
        Public => "PUBLIC",
        Private => "PRIVATE",
    }
}

closed_enum! {
    /// Visibility tag on a comment, evaluated independently of its complaint
    pub enum CommentVisibility ("comment visibility") {
        Public => "PUBLIC",
        Private => "PRIVATE",
        /// Staff-only notes
        Internal => "INTERNAL",
    }
}

closed_enum! {
    /// Officer assignment state
    pub enum AssignmentStatus ("assignment status") {
        Active => "ACTIVE",
        Transferred => "TRANSFERRED",
        Escalated => "ESCALATED",
        Completed => "COMPLETED",
    }
}

closed_enum! {
    /// Complaint category
    pub enum Category ("category") {
        Roads => "ROADS",
        WaterSupply => "WATER_SUPPLY",
        Sanitation => "SANITATION",
        Electricity => "ELECTRICITY",
        StreetLighting => "STREET_LIGHTING",
        Drainage => "DRAINAGE",
        PublicSafety => "PUBLIC_SAFETY",
        Other => "OTHER",
    }
}

closed_enum! {
    /// Kind of notification handed to the notification sink
    pub enum NotificationKind ("notification kind") {
        StatusChange => "STATUS_CHANGE",
        Assignment => "ASSIGNMENT",
        Escalation => "ESCALATION",
        Comment => "COMMENT",
    }
}

impl ComplaintStatus {
    /// RESOLVED and CLOSED accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, ComplaintStatus::Resolved | ComplaintStatus::Closed)
    }

    /// Legal successors, regardless of who asks
    pub fn successors(&self) -> &'static [ComplaintStatus] {
        match self {
            ComplaintStatus::Pending => &[ComplaintStatus::InReview, ComplaintStatus::Closed],
            ComplaintStatus::InReview => &[ComplaintStatus::Resolved, ComplaintStatus::Closed],
            ComplaintStatus::Resolved | ComplaintStatus::Closed => &[],
        }
    }

    pub fn can_transition_to(&self, next: ComplaintStatus) -> bool {
        self.successors().contains(&next)
    }

    /// Human-readable label for notification text
    pub fn label(&self) -> &'static str {
        match self {
            ComplaintStatus::Pending => "pending",
            ComplaintStatus::InReview => "in review",
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Closed => "closed",
        }
    }
}

impl Role {
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Officer | Role::Admin)
    }
}

/// Resolved identity of the caller, passed explicitly to every operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
    pub ward: Option<u32>,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role, ward: Option<u32>) -> Self {
        Self {
            id: id.into(),
            role,
            ward,
        }
    }
}

/// User row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Linking key from the identity issuer, None until first login
    pub subject: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    pub ward: Option<u32>,
    pub display_name: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id.clone(), self.role, self.ward)
    }
}

/// Complaint row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub ward: u32,
    pub address: Option<String>,
    pub author_id: String,
    pub status: ComplaintStatus,
    pub visibility: ComplaintVisibility,
    pub assigned_officer_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Comment row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub complaint_id: String,
    pub author_id: String,
    pub content: String,
    pub visibility: CommentVisibility,
    pub created_at: String,
}

/// Append-only audit record of one status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: String,
    pub complaint_id: String,
    pub status: ComplaintStatus,
    pub changed_by: String,
    pub note: Option<String>,
    pub changed_at: String,
}

/// Officer assignment row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub complaint_id: String,
    pub officer_id: String,
    pub assigned_by: String,
    pub status: AssignmentStatus,
    pub assigned_at: String,
    pub completed_at: Option<String>,
    pub notes: Option<String>,
}

/// Notification outbox row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub complaint_id: Option<String>,
    pub created_at: String,
    pub delivered_at: Option<String>,
}
