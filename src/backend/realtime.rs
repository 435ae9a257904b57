//! Realtime Listener
//!
//! Client for the managed database's Phoenix-channel websocket. Joins one
//! `realtime:public:{table}` channel per table and republishes every
//! `postgres_changes` notification on a [`ChangeFeed`], so cached views see
//! rows written by other clients.

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::changes::{ChangeEvent, ChangeFeed, ChangeKind, Table};
use super::{BackendError, BackendResult};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Websocket subscription to row changes
pub struct RealtimeListener {
    url: String,
    access_token: String,
    tables: Vec<Table>,
    feed: ChangeFeed,
}

impl RealtimeListener {
    /// Listener for `project_url` (the same URL the REST client uses)
    pub fn new(project_url: &str, api_key: &str, access_token: &str, feed: ChangeFeed) -> Self {
        Self {
            url: websocket_url(project_url, api_key),
            access_token: access_token.to_string(),
            tables: vec![Table::Profiles, Table::Content],
            feed,
        }
    }

    /// Builder method: tables to join
    pub fn tables(mut self, tables: impl IntoIterator<Item = Table>) -> Self {
        self.tables = tables.into_iter().collect();
        self
    }

    /// Run the listener in the background, reconnecting after failures
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.run().await {
                    Ok(()) => tracing::info!("Realtime connection closed, reconnecting"),
                    Err(e) => tracing::warn!(error = %e, "Realtime connection failed"),
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        })
    }

    fn join_message(&self, table: Table, msg_ref: usize) -> String {
        json!({
            "topic": format!("realtime:public:{}", table.name()),
            "event": "phx_join",
            "payload": {
                "config": {
                    "postgres_changes": [
                        { "event": "*", "schema": "public", "table": table.name() }
                    ]
                },
                "access_token": self.access_token,
            },
            "ref": msg_ref.to_string(),
        })
        .to_string()
    }

    async fn run(&self) -> BackendResult<()> {
        let (socket, _) = connect_async(self.url.as_str()).await.map_err(realtime_error)?;
        let (mut sink, mut stream) = socket.split();

        let mut msg_ref = 0;
        for table in &self.tables {
            msg_ref += 1;
            sink.send(Message::Text(self.join_message(*table, msg_ref)))
                .await
                .map_err(realtime_error)?;
        }
        tracing::info!(tables = self.tables.len(), "Joined realtime channels");

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        // First tick completes immediately
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    msg_ref += 1;
                    sink.send(Message::Text(heartbeat_message(msg_ref)))
                        .await
                        .map_err(realtime_error)?;
                }
                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = parse_change(&text) {
                            self.feed.publish(event);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(realtime_error(e)),
                }
            }
        }
    }
}

/// `wss://{host}/realtime/v1/websocket` for an `https://{host}` project URL
pub fn websocket_url(project_url: &str, api_key: &str) -> String {
    let base = project_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!(
        "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
        base,
        urlencoding::encode(api_key)
    )
}

fn heartbeat_message(msg_ref: usize) -> String {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string(),
    })
    .to_string()
}

fn realtime_error(e: tokio_tungstenite::tungstenite::Error) -> BackendError {
    BackendError::Realtime(e.to_string())
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct RowChange {
    table: String,
    #[serde(rename = "type")]
    kind: ChangeKind,
    #[serde(default)]
    record: Value,
    #[serde(default)]
    old_record: Value,
}

/// Extract a row change from a channel message
///
/// Accepts both the `postgres_changes` envelope and the older per-event
/// (`INSERT`/`UPDATE`/`DELETE`) form. Replies, heartbeats and rows of
/// unknown tables yield None.
pub fn parse_change(text: &str) -> Option<ChangeEvent> {
    let envelope: Envelope = serde_json::from_str(text).ok()?;
    let data = match envelope.event.as_str() {
        "postgres_changes" => envelope.payload.get("data")?.clone(),
        "INSERT" | "UPDATE" | "DELETE" => envelope.payload,
        _ => return None,
    };

    let change: RowChange = serde_json::from_value(data).ok()?;
    let table = Table::from_name(&change.table)?;
    // Deletes only carry the old row
    let id = [&change.record, &change.old_record]
        .into_iter()
        .find_map(|row| match row.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default();

    Some(ChangeEvent::new(table, change.kind, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url() {
        assert_eq!(
            websocket_url("https://demo.supabase.co/", "anon key"),
            "wss://demo.supabase.co/realtime/v1/websocket?apikey=anon%20key&vsn=1.0.0"
        );
        assert!(websocket_url("http://localhost:54321", "k").starts_with("ws://localhost:54321/"));
    }

    #[test]
    fn test_parse_postgres_changes_insert() {
        let text = r#"{
            "topic": "realtime:public:profiles",
            "event": "postgres_changes",
            "payload": {
                "ids": [1],
                "data": {
                    "schema": "public",
                    "table": "profiles",
                    "commit_timestamp": "2024-01-01T00:00:00Z",
                    "type": "INSERT",
                    "record": {"id": "u-9", "full_name": "New Student", "role": "student"},
                    "old_record": {}
                }
            },
            "ref": null
        }"#;

        assert_eq!(
            parse_change(text),
            Some(ChangeEvent::new(Table::Profiles, ChangeKind::Insert, "u-9"))
        );
    }

    #[test]
    fn test_parse_delete_uses_old_record() {
        let text = r#"{
            "topic": "realtime:public:content",
            "event": "postgres_changes",
            "payload": {"data": {"table": "content", "type": "DELETE", "record": null, "old_record": {"id": 42}}},
            "ref": null
        }"#;

        assert_eq!(
            parse_change(text),
            Some(ChangeEvent::new(Table::Content, ChangeKind::Delete, 42))
        );
    }

    #[test]
    fn test_parse_per_event_form() {
        let text = r#"{
            "topic": "realtime:public:content",
            "event": "UPDATE",
            "payload": {"table": "content", "type": "UPDATE", "record": {"id": 3, "title": "Renamed"}},
            "ref": null
        }"#;

        assert_eq!(
            parse_change(text),
            Some(ChangeEvent::new(Table::Content, ChangeKind::Update, 3))
        );
    }

    #[test]
    fn test_ignores_replies_and_unknown_tables() {
        let reply = r#"{"topic": "realtime:public:profiles", "event": "phx_reply", "payload": {"status": "ok"}, "ref": "1"}"#;
        assert!(parse_change(reply).is_none());

        let other = r#"{"event": "postgres_changes", "payload": {"data": {"table": "audit_log", "type": "INSERT", "record": {"id": 1}}}}"#;
        assert!(parse_change(other).is_none());

        assert!(parse_change("not json").is_none());
    }

    #[test]
    fn test_join_message() {
        let listener = RealtimeListener::new("https://demo.supabase.co", "anon", "jwt", ChangeFeed::default())
            .tables([Table::Content]);
        let join: Value = serde_json::from_str(&listener.join_message(Table::Content, 1)).unwrap();

        assert_eq!(join["topic"], "realtime:public:content");
        assert_eq!(join["event"], "phx_join");
        assert_eq!(join["payload"]["config"]["postgres_changes"][0]["table"], "content");
        assert_eq!(join["payload"]["access_token"], "jwt");
        assert_eq!(join["ref"], "1");
        assert_eq!(listener.tables, vec![Table::Content]);
    }
}
