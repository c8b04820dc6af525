use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

use super::message;
use super::presence::{PresenceEvent, PresenceState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Joining,
    Joined,
    Leaving,
    Closed,
    Errored,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Joining => "joining",
            ChannelState::Joined => "joined",
            ChannelState::Leaving => "leaving",
            ChannelState::Closed => "closed",
            ChannelState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// One `postgres_changes` subscription. `event` is `INSERT`, `UPDATE`,
/// `DELETE` or `*`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostgresChangesFilter {
    pub event: String,
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl PostgresChangesFilter {
    /// `[schema.]table`, schema defaulting to `public`.
    pub fn for_table(spec: &str) -> Self {
        let (schema, table) = match spec.split_once('.') {
            Some((schema, table)) => (schema, table),
            None => ("public", spec),
        };
        Self {
            event: "*".to_string(),
            schema: schema.to_string(),
            table: (!table.is_empty()).then(|| table.to_string()),
            filter: None,
        }
    }

    /// Does a `postgres_changes` data object belong to this filter?
    pub fn matches(&self, data: &Value) -> bool {
        let field = |name: &str| data.get(name).and_then(Value::as_str);
        (self.event == "*" || field("type") == Some(self.event.as_str()))
            && field("schema").is_none_or(|s| s == self.schema)
            && match &self.table {
                Some(table) => field("table").is_none_or(|t| t == table),
                None => true,
            }
    }
}

impl fmt::Display for PostgresChangesFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.schema)?;
        if let Some(table) = &self.table {
            write!(f, ".{table}")?;
        }
        write!(f, ":{}", self.event)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelOptions {
    pub broadcast_ack: bool,
    pub broadcast_self: bool,
    pub presence_key: String,
    pub private: bool,
    pub postgres_changes: Vec<PostgresChangesFilter>,
}

impl ChannelOptions {
    pub fn with_postgres_changes(mut self, filter: PostgresChangesFilter) -> Self {
        self.postgres_changes.push(filter);
        self
    }

    /// `config` object of the join payload.
    pub fn join_config(&self) -> Value {
        json!({
            "broadcast": {"ack": self.broadcast_ack, "self": self.broadcast_self},
            "presence": {"key": self.presence_key},
            "postgres_changes": self.postgres_changes,
            "private": self.private,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Broadcast { event: String, payload: Value },
    Presence(PresenceEvent),
    PostgresChanges(Value),
    System(Value),
}

pub type ChannelCallback = Arc<dyn Fn(&str, ChannelEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BindingKind {
    /// Broadcast event name, `*` for all of them.
    Broadcast(String),
    Presence,
    PostgresChanges(PostgresChangesFilter),
    System,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Broadcast(event) => write!(f, "broadcast:{event}"),
            BindingKind::Presence => f.write_str("presence"),
            BindingKind::PostgresChanges(filter) => write!(f, "postgres_changes:{filter}"),
            BindingKind::System => f.write_str("system"),
        }
    }
}

#[derive(Clone)]
pub(crate) struct Binding {
    pub kind: BindingKind,
    pub callback: ChannelCallback,
}

/// Snapshot of a channel for listings.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub name: String,
    pub topic: String,
    pub state: ChannelState,
    pub events: Vec<String>,
}

pub(crate) struct Channel {
    pub name: String,
    pub topic: String,
    pub join_ref: String,
    pub state: ChannelState,
    pub options: ChannelOptions,
    pub bindings: Vec<Binding>,
    pub presence: PresenceState,
}

impl Channel {
    pub fn new(name: &str, topic: String, join_ref: String, options: ChannelOptions) -> Self {
        Self {
            name: name.to_string(),
            topic,
            join_ref,
            state: ChannelState::Joining,
            options,
            bindings: Vec::new(),
            presence: PresenceState::default(),
        }
    }

    pub fn info(&self) -> ChannelInfo {
        ChannelInfo {
            name: self.name.clone(),
            topic: self.topic.clone(),
            state: self.state,
            events: self.bindings.iter().map(|b| b.kind.to_string()).collect(),
        }
    }

    /// Callbacks interested in `event`, each paired with the event to hand
    /// them.
    pub fn route(&mut self, event: &str, payload: &Value) -> Vec<(ChannelCallback, ChannelEvent)> {
        let mut out = Vec::new();
        match event {
            message::BROADCAST => {
                let name = payload
                    .get("event")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let inner = payload.get("payload").cloned().unwrap_or(Value::Null);
                for binding in &self.bindings {
                    if let BindingKind::Broadcast(wanted) = &binding.kind {
                        if wanted == "*" || wanted == name {
                            out.push((
                                binding.callback.clone(),
                                ChannelEvent::Broadcast {
                                    event: name.to_string(),
                                    payload: inner.clone(),
                                },
                            ));
                        }
                    }
                }
            }
            message::PRESENCE_STATE | message::PRESENCE_DIFF => {
                let changes = if event == message::PRESENCE_STATE {
                    self.presence.sync_state(payload)
                } else {
                    self.presence.sync_diff(payload)
                };
                let events = changes.into_events(&self.presence);
                for binding in &self.bindings {
                    if binding.kind == BindingKind::Presence {
                        for event in &events {
                            out.push((
                                binding.callback.clone(),
                                ChannelEvent::Presence(event.clone()),
                            ));
                        }
                    }
                }
            }
            message::POSTGRES_CHANGES => {
                let data = payload.get("data").cloned().unwrap_or(Value::Null);
                for binding in &self.bindings {
                    if let BindingKind::PostgresChanges(filter) = &binding.kind {
                        if filter.matches(&data) {
                            out.push((
                                binding.callback.clone(),
                                ChannelEvent::PostgresChanges(data.clone()),
                            ));
                        }
                    }
                }
            }
            message::SYSTEM => {
                for binding in &self.bindings {
                    if binding.kind == BindingKind::System {
                        out.push((
                            binding.callback.clone(),
                            ChannelEvent::System(payload.clone()),
                        ));
                    }
                }
            }
            _ => {}
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (ChannelCallback, Arc<Mutex<Vec<ChannelEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let callback: ChannelCallback = {
            let seen = seen.clone();
            Arc::new(move |_, event| seen.lock().unwrap().push(event))
        };
        (callback, seen)
    }

    fn channel() -> Channel {
        Channel::new(
            "room",
            "realtime:room".to_string(),
            "1".to_string(),
            ChannelOptions::default(),
        )
    }

    #[test]
    fn test_table_filter() {
        let filter = PostgresChangesFilter::for_table("todos");
        assert_eq!(filter.schema, "public");
        assert_eq!(filter.to_string(), "public.todos:*");
        assert!(filter.matches(&json!({"type": "INSERT", "schema": "public", "table": "todos"})));
        assert!(!filter.matches(&json!({"type": "INSERT", "schema": "public", "table": "notes"})));

        let filter = PostgresChangesFilter::for_table("audit.log");
        assert_eq!(filter.schema, "audit");
        assert_eq!(filter.table.as_deref(), Some("log"));
    }

    #[test]
    fn test_join_config() {
        let options = ChannelOptions {
            broadcast_self: true,
            ..Default::default()
        }
        .with_postgres_changes(PostgresChangesFilter::for_table("todos"));
        assert_eq!(
            options.join_config(),
            json!({
                "broadcast": {"ack": false, "self": true},
                "presence": {"key": ""},
                "postgres_changes": [{"event": "*", "schema": "public", "table": "todos"}],
                "private": false
            })
        );
    }

    #[test]
    fn test_broadcast_routing_by_event() {
        let mut channel = channel();
        let (test_cb, test_seen) = recorder();
        let (any_cb, any_seen) = recorder();
        channel.bindings.push(Binding {
            kind: BindingKind::Broadcast("test".to_string()),
            callback: test_cb,
        });
        channel.bindings.push(Binding {
            kind: BindingKind::Broadcast("*".to_string()),
            callback: any_cb,
        });

        let payload = json!({"type": "broadcast", "event": "other", "payload": {"message": "hi"}});
        for (callback, event) in channel.route("broadcast", &payload) {
            callback("room", event);
        }
        assert!(test_seen.lock().unwrap().is_empty());
        assert_eq!(
            any_seen.lock().unwrap()[0],
            ChannelEvent::Broadcast {
                event: "other".to_string(),
                payload: json!({"message": "hi"})
            }
        );
        assert_eq!(
            channel.info().events,
            vec!["broadcast:test".to_string(), "broadcast:*".to_string()]
        );
    }

    #[test]
    fn test_presence_routing_tracks_state() {
        let mut channel = channel();
        let (callback, seen) = recorder();
        channel.bindings.push(Binding {
            kind: BindingKind::Presence,
            callback,
        });

        for (callback, event) in channel.route(
            "presence_state",
            &json!({"alice": {"metas": [{"phx_ref": "a1"}]}}),
        ) {
            callback("room", event);
        }
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(&seen[0], ChannelEvent::Presence(PresenceEvent::Join { key, .. }) if key == "alice"));
        assert!(matches!(&seen[1], ChannelEvent::Presence(PresenceEvent::Sync(_))));
    }
}
