//! Service layer for wardwatch
//!
//! Services sit between a thin caller (CLI, HTTP handler) and the
//! repository functions in `db/*`. Each one:
//! - Takes the resolved actor explicitly
//! - Consults the visibility policy before reading or mutating
//! - Owns its transaction boundaries
//! - Enqueues notifications only after commit
//!
//! ## Architecture
//!
//! ```text
//! Caller (thin)
//!     ↓
//! Service Layer (policy + lifecycle)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod assignment;
pub mod comments;
pub mod complaints;
pub mod lifecycle;
pub mod notify;
pub mod users;

#[cfg(test)]
pub(crate) mod fixtures;

pub use assignment::AssignmentService;
pub use comments::CommentService;
pub use complaints::ComplaintService;
pub use lifecycle::{LifecycleService, StatusChange};
pub use notify::{BroadcastSink, Notice, NotificationSink, Notifier, OutboxSink};
pub use users::UserService;

use std::sync::Arc;

use tracing::debug;

use crate::auth::IdentityResolver;
use crate::config::Config;
use crate::db::Database;
use crate::error::WardError;

/// Service container for dependency injection
pub struct Services {
    pub identity: Arc<IdentityResolver>,
    pub users: Arc<UserService>,
    pub complaints: Arc<ComplaintService>,
    pub lifecycle: Arc<LifecycleService>,
    pub assignments: Arc<AssignmentService>,
    pub comments: Arc<CommentService>,
    pub notifier: Notifier,
}

impl Services {
    /// Create all services over a shared database and notification sink
    pub fn new(db: Arc<Database>, sink: Arc<dyn NotificationSink>, config: &Config) -> Self {
        let notifier = Notifier::new(sink);
        let retries = config.max_write_retries.max(1);

        Self {
            identity: Arc::new(IdentityResolver::new(db.clone())),
            users: Arc::new(UserService::new(db.clone(), notifier.clone(), retries)),
            complaints: Arc::new(ComplaintService::new(db.clone())),
            lifecycle: Arc::new(LifecycleService::new(db.clone(), notifier.clone(), retries)),
            assignments: Arc::new(AssignmentService::new(db.clone(), notifier.clone(), retries)),
            comments: Arc::new(CommentService::new(db, notifier.clone())),
            notifier,
        }
    }

    /// Services whose notifications land in the database outbox
    pub fn with_outbox(db: Arc<Database>, config: &Config) -> Self {
        let sink = Arc::new(OutboxSink::new(db.clone()));
        Self::new(db, sink, config)
    }

    /// Services whose notifications fan out to in-process subscribers
    pub fn with_broadcast(db: Arc<Database>, config: &Config) -> (Self, Arc<BroadcastSink>) {
        let sink = Arc::new(BroadcastSink::new(config.notification_capacity.max(1)));
        (Self::new(db, sink.clone(), config), sink)
    }
}

/// Run a transactional write, retrying contention up to `attempts` times
pub(crate) fn with_write_retry<T, F>(attempts: u32, op: &str, mut f: F) -> Result<T, WardError>
where
    F: FnMut() -> Result<T, WardError>,
{
    let mut attempt = 1;
    loop {
        match f() {
            Err(e) if e.is_retryable() && attempt < attempts => {
                debug!(op = %op, attempt, error = %e, "Write contended, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}
