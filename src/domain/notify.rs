//! Notification intents and the gateway boundary.
//!
//! The reconciler decides *what* to surface; rendering is someone else's
//! problem. The daemon installs `NotificationLog`, an in-memory ring read by
//! the console API that also mirrors every intent through `tracing`.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_graphql::{Enum, SimpleObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// One operator-facing notification decided by the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize, SimpleObject)]
#[serde(rename_all = "camelCase")]
pub struct NotificationIntent {
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub node_id: Option<String>,
    pub at: DateTime<Utc>,
}

impl NotificationIntent {
    pub fn new(severity: Severity, title: &str, message: String, node_id: Option<String>) -> Self {
        Self {
            severity,
            title: title.to_string(),
            message,
            node_id,
            at: Utc::now(),
        }
    }
}

/// Where decided intents go. The engine never renders or stores beyond this.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, intent: NotificationIntent);
}

/// Bounded in-memory notification history, oldest dropped first.
pub struct NotificationLog {
    entries: Mutex<VecDeque<NotificationIntent>>,
    capacity: usize,
}

impl NotificationLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
        }
    }

    /// Snapshot in arrival order.
    pub fn snapshot(&self) -> Vec<NotificationIntent> {
        self.entries
            .lock()
            .expect("notification log lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .expect("notification log lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for NotificationLog {
    fn publish(&self, intent: NotificationIntent) {
        match intent.severity {
            Severity::Error => error!(
                node_id = intent.node_id.as_deref().unwrap_or("-"),
                message = %intent.message,
                "notification"
            ),
            Severity::Warning => warn!(
                node_id = intent.node_id.as_deref().unwrap_or("-"),
                message = %intent.message,
                "notification"
            ),
            _ => info!(
                node_id = intent.node_id.as_deref().unwrap_or("-"),
                message = %intent.message,
                "notification"
            ),
        }

        let mut entries = self.entries.lock().expect("notification log lock poisoned");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(intent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(message: &str) -> NotificationIntent {
        NotificationIntent::new(Severity::Info, "test", message.to_string(), None)
    }

    #[test]
    fn keeps_arrival_order() {
        let log = NotificationLog::new(10);
        log.publish(intent("first"));
        log.publish(intent("second"));
        let entries = log.snapshot();
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].message, "second");
    }

    #[test]
    fn drops_oldest_past_capacity() {
        let log = NotificationLog::new(2);
        log.publish(intent("a"));
        log.publish(intent("b"));
        log.publish(intent("c"));
        let entries = log.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "b");
        assert_eq!(entries[1].message, "c");
    }
}
