//! Wardwatch - access-control and lifecycle engine for ward complaint tracking
//!
//! Decides who may see and change civic complaints, their comments, status
//! history and officer assignments, and keeps status, history and
//! assignments consistent under concurrent writers.
//!
//! ## Layout
//!
//! - [`auth`] - bearer token verification and identity resolution
//! - [`policy`] - pure visibility and mutation predicates
//! - [`services`] - lifecycle, assignment, registry, comments, users
//! - [`db`] - SQLite repositories and schema
//!
//! ```text
//! token ─► TokenVerifier ─► IdentityResolver ─► Actor
//!                                                 │
//!                         Services ◄──────────────┘
//!                            │  policy checks
//!                            ▼
//!                         Database (rusqlite, WAL)
//!                            │  after commit
//!                            ▼
//!                      NotificationSink
//! ```

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod policy;
pub mod services;
pub mod types;

pub use auth::{IdentityClaims, IdentityResolver, TokenVerifier};
pub use config::Config;
pub use db::Database;
pub use error::{Result, WardError};
pub use services::{Services, StatusChange};
pub use types::{
    Actor, Assignment, AssignmentStatus, Category, Comment, CommentVisibility, Complaint,
    ComplaintStatus, ComplaintVisibility, Notification, NotificationKind, Role,
    StatusHistoryEntry, User,
};
