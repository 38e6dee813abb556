//! Per-form client state round-tripped with every Ajax request.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

/// Mutable state the client keeps for one form.
///
/// Read by the request encoder, written by the response interpreter after a
/// successful response. The single-in-flight invariant guarantees the two
/// never interleave for the same request cycle.
#[derive(Debug, Clone)]
pub struct FormState {
    /// Session token minted at page load (or assigned by the server).
    pub uuid: Uuid,
    /// Monotonic request counter, advanced once per request that carries at
    /// least one non-heartbeat/non-progress event.
    pub sequence: u64,
    /// Immutable-per-load state blob; rarely changes after first load.
    pub static_state: String,
    /// Mutable state blob, replaced wholesale after every successful
    /// response.
    pub dynamic_state: String,
    /// The dynamic state as it was at page load, for full-replay requests.
    pub initial_dynamic_state: String,
    /// Per-control last value known/acknowledged by the server.
    server_values: HashMap<String, String>,
    /// Controls the user edited since the last request was sent.
    changed_ids: HashSet<String>,
}

impl FormState {
    /// Creates state for a freshly loaded form. The initial dynamic state is
    /// captured from `dynamic_state` as given.
    #[must_use]
    pub fn new(uuid: Uuid, sequence: u64, static_state: String, dynamic_state: String) -> Self {
        Self {
            uuid,
            sequence,
            static_state,
            initial_dynamic_state: dynamic_state.clone(),
            dynamic_state,
            server_values: HashMap::new(),
            changed_ids: HashSet::new(),
        }
    }

    /// The last value the server acknowledged for `control_id`, if any.
    ///
    /// Presence is explicit: an empty-string id or empty-string value is a
    /// real entry, never conflated with "absent".
    #[must_use]
    pub fn server_value(&self, control_id: &str) -> Option<&str> {
        self.server_values.get(control_id).map(String::as_str)
    }

    /// Records `value` as the server-acknowledged value for `control_id`.
    pub fn record_server_value(&mut self, control_id: impl Into<String>, value: impl Into<String>) {
        self.server_values.insert(control_id.into(), value.into());
    }

    /// Marks a control as locally edited since the last outbound request.
    pub fn mark_changed(&mut self, control_id: impl Into<String>) {
        self.changed_ids.insert(control_id.into());
    }

    /// Whether the user touched `control_id` since the last outbound request.
    #[must_use]
    pub fn is_changed(&self, control_id: &str) -> bool {
        self.changed_ids.contains(control_id)
    }

    /// Forgets the mark for one control, called when an outbound request
    /// carries its value change. Marks made while that request is in flight
    /// stay, so the response cannot clobber a newer local edit.
    pub fn unmark_changed(&mut self, control_id: &str) {
        self.changed_ids.remove(control_id);
    }

    /// Advances the sequence number by one, returning the value to encode.
    pub fn next_sequence(&mut self) -> u64 {
        let current = self.sequence;
        self.sequence += 1;
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> FormState {
        FormState::new(Uuid::new_v4(), 1, "static".into(), "dyn0".into())
    }

    #[test]
    fn initial_dynamic_state_is_captured() {
        let mut s = state();
        s.dynamic_state = "dyn1".into();
        assert_eq!(s.initial_dynamic_state, "dyn0");
    }

    #[test]
    fn server_values_are_presence_checked() {
        let mut s = state();
        assert_eq!(s.server_value(""), None);
        s.record_server_value("", "");
        // Empty id and empty value are real entries.
        assert_eq!(s.server_value(""), Some(""));
    }

    #[test]
    fn changed_ids_lifecycle() {
        let mut s = state();
        assert!(!s.is_changed("c1"));
        s.mark_changed("c1");
        s.mark_changed("c2");
        assert!(s.is_changed("c1"));
        s.unmark_changed("c1");
        assert!(!s.is_changed("c1"));
        // Marks for controls the request did not carry survive.
        assert!(s.is_changed("c2"));
    }

    #[test]
    fn next_sequence_returns_current_then_advances() {
        let mut s = state();
        assert_eq!(s.next_sequence(), 1);
        assert_eq!(s.next_sequence(), 2);
        assert_eq!(s.sequence, 3);
    }
}
