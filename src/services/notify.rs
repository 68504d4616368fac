//! Notification enqueueing
//!
//! The engine hands notifications to a [`NotificationSink`] after its
//! transaction has committed. Delivery belongs to whoever drains the sink.
//! [`Notifier`] swallows and logs sink failures so they never fail the
//! operation that triggered them.

use std::sync::Arc;

use rusqlite::TransactionBehavior;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::db::{notifications, Database};
use crate::error::WardError;
use crate::types::{Notification, NotificationKind};

/// One queued notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub user_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub complaint_id: Option<String>,
}

/// Destination for notifications
pub trait NotificationSink: Send + Sync {
    fn enqueue(&self, notice: &Notice) -> Result<(), WardError>;
}

/// Persists notifications to the `notifications` outbox table
pub struct OutboxSink {
    db: Arc<Database>,
}

impl OutboxSink {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Take a user's undelivered notifications, oldest first, and mark
    /// them delivered in the same transaction
    pub fn drain(&self, user_id: &str) -> Result<Vec<Notification>, WardError> {
        let drained = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let pending = notifications::list_pending_for_user(&tx, user_id)?;
            for notification in &pending {
                notifications::mark_delivered(&tx, &notification.id)?;
            }
            tx.commit()?;
            Ok(pending)
        })?;
        debug!(user_id = %user_id, count = drained.len(), "Outbox drained");
        Ok(drained)
    }
}

impl NotificationSink for OutboxSink {
    fn enqueue(&self, notice: &Notice) -> Result<(), WardError> {
        let id = self.db.with_conn(|conn| {
            notifications::insert_notification(
                conn,
                &notice.user_id,
                notice.kind,
                &notice.message,
                notice.complaint_id.as_deref(),
            )
        })?;
        trace!(notification_id = %id, user_id = %notice.user_id, "Notification stored in outbox");
        Ok(())
    }
}

/// Fans notifications out to in-process subscribers
pub struct BroadcastSink {
    sender: broadcast::Sender<Notice>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }
}

impl NotificationSink for BroadcastSink {
    fn enqueue(&self, notice: &Notice) -> Result<(), WardError> {
        // No subscribers is not an error
        let _ = self.sender.send(notice.clone());
        Ok(())
    }
}

/// Best-effort front for a sink
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Enqueue and forget; failures are logged and discarded
    pub fn send(
        &self,
        user_id: &str,
        kind: NotificationKind,
        message: impl Into<String>,
        complaint_id: Option<&str>,
    ) {
        let notice = Notice {
            user_id: user_id.to_string(),
            kind,
            message: message.into(),
            complaint_id: complaint_id.map(str::to_string),
        };

        match self.sink.enqueue(&notice) {
            Ok(()) => debug!(user_id = %user_id, kind = %kind, "Notification enqueued"),
            Err(e) => warn!(
                user_id = %user_id,
                kind = %kind,
                error = %e,
                "Failed to enqueue notification, discarding"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    struct FailingSink;

    impl NotificationSink for FailingSink {
        fn enqueue(&self, _notice: &Notice) -> Result<(), WardError> {
            Err(WardError::Internal("sink offline".into()))
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscriber() {
        let sink = Arc::new(BroadcastSink::new(16));
        let mut receiver = sink.subscribe();
        let notifier = Notifier::new(sink.clone());

        notifier.send("u1", NotificationKind::StatusChange, "Resolved", Some("c1"));

        let notice = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");
        assert_eq!(notice.user_id, "u1");
        assert_eq!(notice.kind, NotificationKind::StatusChange);
        assert_eq!(notice.complaint_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let notifier = Notifier::new(Arc::new(BroadcastSink::new(4)));
        notifier.send("u1", NotificationKind::Comment, "hello", None);
    }

    #[test]
    fn test_sink_failure_is_swallowed() {
        let notifier = Notifier::new(Arc::new(FailingSink));
        notifier.send("u1", NotificationKind::Escalation, "help", None);
    }

    #[test]
    fn test_outbox_persists() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let notifier = Notifier::new(Arc::new(OutboxSink::new(db.clone())));
        notifier.send("u1", NotificationKind::Assignment, "You were assigned", Some("c1"));

        let pending = db
            .with_conn(|conn| notifications::list_pending_for_user(conn, "u1"))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, NotificationKind::Assignment);
    }

    #[test]
    fn test_outbox_drain_marks_delivered() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let outbox = Arc::new(OutboxSink::new(db.clone()));
        let notifier = Notifier::new(outbox.clone());
        notifier.send("u1", NotificationKind::Assignment, "You were assigned", Some("c1"));
        notifier.send("u1", NotificationKind::Comment, "New comment", Some("c1"));
        notifier.send("u2", NotificationKind::Comment, "Someone else's", None);

        let drained = outbox.drain("u1").unwrap();
        let kinds: Vec<_> = drained.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::Assignment, NotificationKind::Comment]);

        assert!(outbox.drain("u1").unwrap().is_empty());
        assert_eq!(outbox.drain("u2").unwrap().len(), 1);
    }
}
