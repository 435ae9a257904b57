//! Row Change Feed
//!
//! Fan-out of row change notifications to interested listeners.
//! Uses a tokio broadcast channel; each subscription filters by table.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast;

/// Tables of the managed database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profiles,
    Content,
    CourseSteps,
    SystemSettings,
}

impl Table {
    /// REST path segment / topic name
    pub fn name(&self) -> &'static str {
        match self {
            Table::Profiles => "profiles",
            Table::Content => "content",
            Table::CourseSteps => "course_steps",
            Table::SystemSettings => "system_settings",
        }
    }

    /// Parse a topic name; `*` is handled by [`ChangeSubscription::topics`]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "profiles" => Some(Table::Profiles),
            "content" => Some(Table::Content),
            "course_steps" => Some(Table::CourseSteps),
            "system_settings" => Some(Table::SystemSettings),
            _ => None,
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single row change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    /// Primary key of the changed row, as text
    pub id: String,
}

impl ChangeEvent {
    pub fn new(table: Table, kind: ChangeKind, id: impl ToString) -> Self {
        Self {
            table,
            kind,
            id: id.to_string(),
        }
    }
}

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// A row changed in a subscribed table
    Change(ChangeEvent),
    /// Events were dropped; cached state should be refetched wholesale
    Resync,
}

/// Broadcast hub for row changes
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChangeFeed {
    /// Create a feed buffering up to `capacity` undelivered events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to every subscriber
    pub fn publish(&self, event: ChangeEvent) {
        tracing::trace!(table = %event.table, kind = ?event.kind, id = %event.id, "Row change");
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Subscribe to every table
    pub fn subscribe(&self) -> ChangeSubscription {
        ChangeSubscription {
            rx: self.tx.subscribe(),
            tables: None,
        }
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving end of a [`ChangeFeed`]
pub struct ChangeSubscription {
    rx: broadcast::Receiver<ChangeEvent>,
    /// None means every table
    tables: Option<HashSet<Table>>,
}

impl ChangeSubscription {
    /// Restrict the subscription to the given topics (`*` = all tables)
    ///
    /// Unknown topic names are ignored with a warning.
    pub fn topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tables = HashSet::new();
        for topic in topics {
            let topic = topic.as_ref();
            if topic == "*" {
                self.tables = None;
                return self;
            }
            match Table::from_name(topic) {
                Some(table) => {
                    tables.insert(table);
                }
                None => tracing::warn!(topic = %topic, "Invalid topic ignored"),
            }
        }
        self.tables = Some(tables);
        self
    }

    /// Restrict the subscription to a single table
    pub fn only(self, table: Table) -> Self {
        self.topics([table.name()])
    }

    fn wants(&self, table: Table) -> bool {
        self.tables.as_ref().map_or(true, |t| t.contains(&table))
    }

    /// Wait for the next relevant message; None once the feed is gone
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.wants(event.table) => return Some(FeedMessage::Change(event)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change feed lagged, requesting resync");
                    return Some(FeedMessage::Resync);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Option<FeedMessage> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.wants(event.table) => return Some(FeedMessage::Change(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => return Some(FeedMessage::Resync),
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names() {
        for table in [
            Table::Profiles,
            Table::Content,
            Table::CourseSteps,
            Table::SystemSettings,
        ] {
            assert_eq!(Table::from_name(table.name()), Some(table));
        }
        assert_eq!(Table::from_name("random"), None);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let feed = ChangeFeed::default();
        let mut sub = feed.subscribe();

        feed.publish(ChangeEvent::new(Table::Content, ChangeKind::Insert, 7));

        assert_eq!(
            sub.recv().await,
            Some(FeedMessage::Change(ChangeEvent::new(
                Table::Content,
                ChangeKind::Insert,
                "7"
            )))
        );
    }

    #[tokio::test]
    async fn test_table_filter() {
        let feed = ChangeFeed::default();
        let mut profiles = feed.subscribe().only(Table::Profiles);

        feed.publish(ChangeEvent::new(Table::Content, ChangeKind::Delete, 1));
        feed.publish(ChangeEvent::new(Table::Profiles, ChangeKind::Update, "u-1"));

        match profiles.recv().await {
            Some(FeedMessage::Change(event)) => {
                assert_eq!(event.table, Table::Profiles);
                assert_eq!(event.id, "u-1");
            }
            other => panic!("Expected profile change, got {:?}", other),
        }
        assert!(profiles.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_wildcard_and_invalid_topics() {
        let feed = ChangeFeed::default();
        let mut all = feed.subscribe().topics(["content", "*"]);
        let mut none = feed.subscribe().topics(["bogus"]);

        feed.publish(ChangeEvent::new(Table::CourseSteps, ChangeKind::Insert, 3));

        assert!(matches!(all.try_recv(), Some(FeedMessage::Change(_))));
        assert!(none.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lag_requests_resync() {
        let feed = ChangeFeed::new(2);
        let mut sub = feed.subscribe();

        for i in 0..5 {
            feed.publish(ChangeEvent::new(Table::Content, ChangeKind::Update, i));
        }

        assert_eq!(sub.recv().await, Some(FeedMessage::Resync));
    }

    #[test]
    fn test_event_serialization() {
        let event = ChangeEvent::new(Table::CourseSteps, ChangeKind::Delete, 9);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"table":"course_steps","kind":"DELETE","id":"9"}"#);
    }
}
