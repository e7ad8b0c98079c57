//! Firebase Realtime Database connector over its REST API
//!
//! Writes use `PATCH {base}/{path}.json`, reads a plain `GET`, and
//! subscriptions the `text/event-stream` variant of `GET`. The stream sends
//! `put` and `patch` events relative to the subscribed node, so the
//! connector keeps its own copy of the node and emits the whole record after
//! each event.

use std::collections::VecDeque;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{header::ACCEPT, Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{realtime::RealtimeStore, snapshot::RemoteTimerSnapshot};
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct FirebaseRealtimeStore {
    client: Client,
    base_url: String,
    auth: Option<String>,
}

impl FirebaseRealtimeStore {
    pub fn new(base_url: impl Into<String>, auth: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(token) => builder.query(&[("auth", token)]),
            None => builder,
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl RealtimeStore for FirebaseRealtimeStore {
    fn subscribe(&self, path: &str) -> BoxStream<'static, RemoteTimerSnapshot> {
        let request = self
            .request(self.client.get(self.url(path)))
            .header(ACCEPT, "text/event-stream");
        let feed = EventFeed::new(request);

        stream::unfold(feed, |mut feed| async move {
            feed.next_snapshot().await.map(|snapshot| (snapshot, feed))
        })
        .boxed()
    }

    async fn write(&self, path: &str, value: &RemoteTimerSnapshot) -> Result<(), StoreError> {
        let response = self
            .request(self.client.patch(self.url(path)))
            .json(value)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn read_once(&self, path: &str) -> Result<Option<RemoteTimerSnapshot>, StoreError> {
        let response = self.request(self.client.get(self.url(path))).send().await?;
        let body = check_status(response).await?.text().await?;
        let value: Value = serde_json::from_str(&body)?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}

/// One server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    event: String,
    data: String,
}

/// Incremental `text/event-stream` decoder
#[derive(Debug, Default)]
struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.event.take() {
                    events.push(SseEvent {
                        event,
                        data: self.data.join("\n"),
                    });
                }
                self.data.clear();
            } else if let Some(value) = line.strip_prefix("event:") {
                self.event = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                self.data.push(value.trim_start().to_string());
            }
        }
        events
    }
}

#[derive(Debug, Deserialize)]
struct NodeChange {
    path: String,
    data: Value,
}

#[derive(Debug, PartialEq, Eq)]
enum FeedAction {
    Emit,
    Skip,
    End,
}

/// Fold one event into the cached node
fn apply_event(node: &mut Value, event: &SseEvent) -> FeedAction {
    match event.event.as_str() {
        "put" | "patch" => {
            let change: NodeChange = match serde_json::from_str(&event.data) {
                Ok(change) => change,
                Err(e) => {
                    warn!("Ignoring malformed {} event: {}", event.event, e);
                    return FeedAction::Skip;
                }
            };
            let target = node_at(node, &change.path);
            if event.event == "put" {
                *target = change.data;
            } else if let (Some(fields), Value::Object(patch)) =
                (ensure_object(target), change.data)
            {
                for (key, value) in patch {
                    if value.is_null() {
                        fields.remove(&key);
                    } else {
                        fields.insert(key, value);
                    }
                }
            }
            FeedAction::Emit
        }
        "keep-alive" => FeedAction::Skip,
        "cancel" | "auth_revoked" => {
            warn!("Realtime subscription closed by server: {}", event.event);
            FeedAction::End
        }
        other => {
            debug!("Ignoring realtime event '{}'", other);
            FeedAction::Skip
        }
    }
}

/// Mutable slot at a `/`-separated path, creating objects on the way
fn node_at<'a>(node: &'a mut Value, path: &str) -> &'a mut Value {
    let mut current = node;
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        ensure_object(current);
        current = match current {
            Value::Object(fields) => fields.entry(segment.to_string()).or_insert(Value::Null),
            other => other,
        };
    }
    current
}

fn ensure_object(value: &mut Value) -> Option<&mut serde_json::Map<String, Value>> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }
    value.as_object_mut()
}

/// State of one streaming subscription
struct EventFeed {
    request: Option<RequestBuilder>,
    body: Option<BoxStream<'static, reqwest::Result<Vec<u8>>>>,
    parser: SseParser,
    node: Value,
    pending: VecDeque<RemoteTimerSnapshot>,
}

impl EventFeed {
    fn new(request: RequestBuilder) -> Self {
        Self {
            request: Some(request),
            body: None,
            parser: SseParser::default(),
            node: Value::Null,
            pending: VecDeque::new(),
        }
    }

    async fn next_snapshot(&mut self) -> Option<RemoteTimerSnapshot> {
        loop {
            if let Some(snapshot) = self.pending.pop_front() {
                return Some(snapshot);
            }

            if self.body.is_none() {
                let request = self.request.take()?;
                let response = match request.send().await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Realtime subscription failed to connect: {}", e);
                        return None;
                    }
                };
                let response = match check_status(response).await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Realtime subscription refused: {}", e);
                        return None;
                    }
                };
                info!("Realtime subscription connected");
                self.body = Some(
                    response
                        .bytes_stream()
                        .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                        .boxed(),
                );
            }

            let chunk = match self.body.as_mut()?.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    warn!("Realtime subscription stream error: {}", e);
                    self.body = None;
                    return self.pending.pop_front();
                }
                None => {
                    self.body = None;
                    return self.pending.pop_front();
                }
            };

            for event in self.parser.push(&chunk) {
                match apply_event(&mut self.node, &event) {
                    FeedAction::Emit => self.queue_node(),
                    FeedAction::Skip => {}
                    FeedAction::End => {
                        self.body = None;
                        return self.pending.pop_front();
                    }
                }
            }
        }
    }

    fn queue_node(&mut self) {
        if self.node.is_null() {
            return;
        }
        match serde_json::from_value::<RemoteTimerSnapshot>(self.node.clone()) {
            Ok(snapshot) => self.pending.push_back(snapshot),
            Err(e) => warn!("Remote timer record has an unexpected shape: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(name: &str, data: Value) -> SseEvent {
        SseEvent {
            event: name.to_string(),
            data: data.to_string(),
        }
    }

    #[test]
    fn parser_handles_split_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.push(b"event: put\r\nda").is_empty());
        let events = parser.push(b"ta: {\"path\":\"/\",\"data\":null}\r\n\r\nevent: keep-alive\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: "put".into(),
                data: "{\"path\":\"/\",\"data\":null}".into(),
            }]
        );

        let events = parser.push(b"data: null\n\n");
        assert_eq!(events[0].event, "keep-alive");
    }

    #[test]
    fn root_put_replaces_node_and_field_put_updates_it() {
        let mut node = Value::Null;
        let action = apply_event(
            &mut node,
            &event(
                "put",
                json!({"path": "/", "data": {"min": 3, "sec": 30, "updatedAt": 1, "running": false}}),
            ),
        );
        assert_eq!(action, FeedAction::Emit);

        apply_event(&mut node, &event("put", json!({"path": "/running", "data": true})));
        assert_eq!(node["running"], true);
        assert_eq!(node["min"], 3);
    }

    #[test]
    fn patch_merges_and_removes_fields() {
        let mut node = json!({"min": 3, "sec": 30, "updatedAt": 1, "running": false, "clientId": "a"});
        apply_event(
            &mut node,
            &event("patch", json!({"path": "/", "data": {"sec": 29, "updatedAt": 2, "clientId": null}})),
        );
        assert_eq!(node["sec"], 29);
        assert_eq!(node["updatedAt"], 2);
        assert!(node.get("clientId").is_none());

        let snapshot: RemoteTimerSnapshot = serde_json::from_value(node).unwrap();
        assert_eq!(snapshot.sec, 29);
    }

    #[test]
    fn control_events() {
        let mut node = Value::Null;
        assert_eq!(apply_event(&mut node, &event("keep-alive", Value::Null)), FeedAction::Skip);
        assert_eq!(apply_event(&mut node, &event("auth_revoked", Value::Null)), FeedAction::End);
        assert_eq!(apply_event(&mut node, &event("cancel", Value::Null)), FeedAction::End);
        assert_eq!(
            apply_event(&mut node, &SseEvent { event: "put".into(), data: "not json".into() }),
            FeedAction::Skip
        );
    }

    #[test]
    fn urls_carry_path_and_json_suffix() {
        let store = FirebaseRealtimeStore::new("https://example.firebaseio.com/", None);
        assert_eq!(store.url("/timer"), "https://example.firebaseio.com/timer.json");
    }
}
