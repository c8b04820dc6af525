//! Client side view of who is present on a channel.
//!
//! The server sends one `presence_state` with everybody, then
//! `presence_diff` messages. Each key maps to a list of metas, one per
//! connection tracking under that key, told apart by `phx_ref`.

use serde_json::Value;
use std::collections::BTreeMap;

pub type Presences = BTreeMap<String, Vec<Value>>;

#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    Sync(Presences),
    Join { key: String, new_presences: Vec<Value> },
    Leave { key: String, left_presences: Vec<Value> },
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PresenceChanges {
    pub joins: Vec<(String, Vec<Value>)>,
    pub leaves: Vec<(String, Vec<Value>)>,
}

impl PresenceChanges {
    /// Join and leave events followed by a sync of `state`.
    pub fn into_events(self, state: &PresenceState) -> Vec<PresenceEvent> {
        let mut events: Vec<PresenceEvent> = self
            .joins
            .into_iter()
            .map(|(key, new_presences)| PresenceEvent::Join { key, new_presences })
            .collect();
        events.extend(
            self.leaves
                .into_iter()
                .map(|(key, left_presences)| PresenceEvent::Leave {
                    key,
                    left_presences,
                }),
        );
        events.push(PresenceEvent::Sync(state.list().clone()));
        events
    }
}

#[derive(Debug, Default, Clone)]
pub struct PresenceState {
    entries: Presences,
}

fn metas(entry: &Value) -> Vec<Value> {
    entry
        .get("metas")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn phx_ref(meta: &Value) -> Option<&str> {
    meta.get("phx_ref").and_then(Value::as_str)
}

fn contains_ref(list: &[Value], meta: &Value) -> bool {
    let Some(wanted) = phx_ref(meta) else {
        return list.contains(meta);
    };
    list.iter().any(|m| phx_ref(m) == Some(wanted))
}

fn entries(map: &Value) -> impl Iterator<Item = (&String, Vec<Value>)> {
    map.as_object()
        .into_iter()
        .flat_map(|object| object.iter())
        .map(|(key, entry)| (key, metas(entry)))
}

impl PresenceState {
    pub fn list(&self) -> &Presences {
        &self.entries
    }

    /// Replace the state with a full `presence_state` payload.
    pub fn sync_state(&mut self, new_state: &Value) -> PresenceChanges {
        let mut changes = PresenceChanges::default();
        let mut next = Presences::new();

        for (key, new_metas) in entries(new_state) {
            let current = self.entries.get(key).cloned().unwrap_or_default();
            let joined: Vec<Value> = new_metas
                .iter()
                .filter(|m| !contains_ref(&current, m))
                .cloned()
                .collect();
            let left: Vec<Value> = current
                .iter()
                .filter(|m| !contains_ref(&new_metas, m))
                .cloned()
                .collect();
            if !joined.is_empty() {
                changes.joins.push((key.clone(), joined));
            }
            if !left.is_empty() {
                changes.leaves.push((key.clone(), left));
            }
            next.insert(key.clone(), new_metas);
        }

        for (key, current) in &self.entries {
            if !next.contains_key(key) {
                changes.leaves.push((key.clone(), current.clone()));
            }
        }

        self.entries = next;
        changes
    }

    /// Apply a `presence_diff` payload (`{joins, leaves}`).
    pub fn sync_diff(&mut self, diff: &Value) -> PresenceChanges {
        let mut changes = PresenceChanges::default();
        let empty = Value::Null;

        for (key, joined) in entries(diff.get("joins").unwrap_or(&empty)) {
            let current = self.entries.entry(key.clone()).or_default();
            let fresh: Vec<Value> = joined
                .into_iter()
                .filter(|m| !contains_ref(current, m))
                .collect();
            current.extend(fresh.iter().cloned());
            if current.is_empty() {
                self.entries.remove(key);
            }
            if !fresh.is_empty() {
                changes.joins.push((key.clone(), fresh));
            }
        }

        for (key, left) in entries(diff.get("leaves").unwrap_or(&empty)) {
            let Some(current) = self.entries.get_mut(key) else {
                continue;
            };
            current.retain(|m| !contains_ref(&left, m));
            if current.is_empty() {
                self.entries.remove(key);
            }
            changes.leaves.push((key.clone(), left));
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(r: &str, user: &str) -> Value {
        json!({"phx_ref": r, "user": user})
    }

    #[test]
    fn test_state_then_diff() {
        let mut state = PresenceState::default();
        let changes = state.sync_state(&json!({
            "alice": {"metas": [meta("a1", "alice")]},
            "bob": {"metas": [meta("b1", "bob")]}
        }));
        assert_eq!(changes.joins.len(), 2);
        assert!(changes.leaves.is_empty());

        let changes = state.sync_diff(&json!({
            "joins": {"carol": {"metas": [meta("c1", "carol")]}},
            "leaves": {"bob": {"metas": [meta("b1", "bob")]}}
        }));
        assert_eq!(changes.joins, vec![("carol".to_string(), vec![meta("c1", "carol")])]);
        assert_eq!(changes.leaves, vec![("bob".to_string(), vec![meta("b1", "bob")])]);
        assert_eq!(
            state.list().keys().cloned().collect::<Vec<_>>(),
            vec!["alice", "carol"]
        );
    }

    #[test]
    fn test_second_state_reports_departures() {
        let mut state = PresenceState::default();
        state.sync_state(&json!({"alice": {"metas": [meta("a1", "alice")]}}));
        let changes = state.sync_state(&json!({"bob": {"metas": [meta("b1", "bob")]}}));

        assert_eq!(changes.joins, vec![("bob".to_string(), vec![meta("b1", "bob")])]);
        assert_eq!(changes.leaves, vec![("alice".to_string(), vec![meta("a1", "alice")])]);

        let events = changes.into_events(&state);
        assert_eq!(events.len(), 3);
        assert!(matches!(events.last(), Some(PresenceEvent::Sync(p)) if p.contains_key("bob")));
    }

    #[test]
    fn test_duplicate_join_is_ignored() {
        let mut state = PresenceState::default();
        let diff = json!({"joins": {"alice": {"metas": [meta("a1", "alice")]}}, "leaves": {}});
        state.sync_diff(&diff);
        let changes = state.sync_diff(&diff);
        assert!(changes.joins.is_empty());
        assert_eq!(state.list()["alice"].len(), 1);
    }
}
