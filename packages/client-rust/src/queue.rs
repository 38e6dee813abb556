//! Queue batching policy: the collapsing pass, deferred-mode gating, and
//! per-batch aggregate traits.
//!
//! All of this is pure over its inputs; the runtime drains its queue, runs
//! these passes, and sends whatever survives.

use std::collections::{HashMap, HashSet};

use liveform_core::{EventName, UiEvent};

use crate::config::ClientConfig;
use crate::dom::{ControlKind, FormDom};

// ---------------------------------------------------------------------------
// Collapsing
// ---------------------------------------------------------------------------

/// Read access the collapsing pass needs. Implemented by the runtime over
/// its DOM and per-form state.
pub trait CollapseLookup {
    /// The last value the server acknowledged for a control, if any.
    fn server_value(&self, control_id: &str) -> Option<String>;

    /// The kind of a control, if known.
    fn control_kind(&self, control_id: &str) -> Option<ControlKind>;
}

/// Collapses a drained batch before encoding.
///
/// In order:
/// - events whose target was detached at creation (no form id) are dropped;
/// - filtered event names are dropped;
/// - consecutive value changes for the same target collapse into the
///   earliest retained one, latest value winning, with any intervening
///   non-value event acting as a barrier;
/// - a value change equal to the server-acknowledged value is an echo and is
///   dropped, except for uploads, whose value doubles as selection state;
/// - upload-progress polls for the same target collapse to one, regardless
///   of barriers, since they are idempotent.
#[must_use]
pub fn collapse(
    events: Vec<UiEvent>,
    config: &ClientConfig,
    lookup: &dyn CollapseLookup,
) -> Vec<UiEvent> {
    let mut out: Vec<UiEvent> = Vec::with_capacity(events.len());
    let mut value_slots: HashMap<String, usize> = HashMap::new();
    let mut progress_slots: HashMap<String, usize> = HashMap::new();

    for event in events {
        if event.form_id.is_none() {
            tracing::debug!(target_id = %event.target_id, "dropping event for detached target");
            continue;
        }
        if config.filtered_events.contains(&event.name) {
            continue;
        }
        match event.name {
            EventName::ValueChange => {
                if let Some(&slot) = value_slots.get(&event.target_id) {
                    out[slot].value = event.value;
                    continue;
                }
                let is_upload =
                    lookup.control_kind(&event.target_id) == Some(ControlKind::Upload);
                if !is_upload {
                    // Presence check: Some("") is a real acknowledged value.
                    let acked = lookup.server_value(&event.target_id);
                    if acked.is_some() && acked.as_deref() == event.value.as_deref() {
                        continue;
                    }
                }
                value_slots.insert(event.target_id.clone(), out.len());
                out.push(event);
            }
            EventName::UploadProgress => {
                if let Some(&slot) = progress_slots.get(&event.target_id) {
                    out[slot] = event;
                    continue;
                }
                progress_slots.insert(event.target_id.clone(), out.len());
                out.push(event);
            }
            _ => {
                // Any other event is a barrier: later value changes for the
                // same target must stay after it.
                value_slots.clear();
                out.push(event);
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Deferred-mode gate
// ---------------------------------------------------------------------------

/// Whether a batch justifies a round trip under deferred mode.
///
/// A batch activates when it contains an activation or server-events replay,
/// when any event targets a control outside every default-deferred
/// container, or when the batch spans more than one container.
#[must_use]
pub fn batch_is_activating(events: &[UiEvent], dom: &dyn FormDom) -> bool {
    let mut containers: HashSet<String> = HashSet::new();
    for event in events {
        match event.name {
            EventName::Activate | EventName::ServerEvents => return true,
            _ => {}
        }
        match dom.deferred_container_of(&event.target_id) {
            None => return true,
            Some(container) => {
                containers.insert(container);
                if containers.len() >= 2 {
                    return true;
                }
            }
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Aggregate traits
// ---------------------------------------------------------------------------

/// Flags aggregated over one outbound batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTraits {
    /// Show the busy indicator if any event wants it.
    pub show_progress: bool,
    /// Progress message for the indicator; set only when every event that
    /// specifies one agrees on it.
    pub progress_message: Option<String>,
    /// Suppress failure surfacing only when every event tolerates it.
    pub ignore_errors: bool,
}

impl BatchTraits {
    #[must_use]
    pub fn of(events: &[UiEvent]) -> Self {
        let show_progress = events.iter().any(|e| e.show_progress);
        let mut progress_message: Option<String> = None;
        for message in events
            .iter()
            .filter(|e| e.show_progress)
            .filter_map(|e| e.progress_message.as_ref())
        {
            match &progress_message {
                None => progress_message = Some(message.clone()),
                Some(agreed) if agreed == message => {}
                Some(_) => {
                    progress_message = None;
                    break;
                }
            }
        }
        let ignore_errors = !events.is_empty() && events.iter().all(|e| e.ignore_errors);
        Self {
            show_progress,
            progress_message,
            ignore_errors,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-form split
// ---------------------------------------------------------------------------

/// Splits a batch into the first form's events and the remainder.
///
/// One request serves one form; events for other forms stay queued in their
/// original order and go out on the follow-up cycle.
#[must_use]
pub fn split_first_form(events: Vec<UiEvent>) -> Option<(String, Vec<UiEvent>, Vec<UiEvent>)> {
    let first_form = events
        .iter()
        .find_map(|e| e.form_id.clone())?;
    let mut taken = Vec::new();
    let mut rest = Vec::new();
    for event in events {
        if event.form_id.as_deref() == Some(first_form.as_str()) {
            taken.push(event);
        } else {
            rest.push(event);
        }
    }
    Some((first_form, taken, rest))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct StubLookup {
        server_values: HashMap<String, String>,
        kinds: HashMap<String, ControlKind>,
    }

    impl CollapseLookup for StubLookup {
        fn server_value(&self, control_id: &str) -> Option<String> {
            self.server_values.get(control_id).cloned()
        }
        fn control_kind(&self, control_id: &str) -> Option<ControlKind> {
            self.kinds.get(control_id).copied()
        }
    }

    fn vc(target: &str, value: &str) -> UiEvent {
        UiEvent::value_change(Some("f1".into()), target, value)
    }

    #[test]
    fn consecutive_value_changes_collapse_latest_wins() {
        let events = vec![vc("c1", "a"), vc("c1", "ab"), vc("c1", "abc")];
        let out = collapse(events, &ClientConfig::default(), &StubLookup::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].value.as_deref(), Some("abc"));
    }

    #[test]
    fn barrier_stops_value_collapse() {
        let events = vec![
            vc("c1", "a"),
            UiEvent::activate(Some("f1".into()), "t1"),
            vc("c1", "b"),
        ];
        let out = collapse(events, &ClientConfig::default(), &StubLookup::default());
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].value.as_deref(), Some("a"));
        assert_eq!(out[2].value.as_deref(), Some("b"));
    }

    #[test]
    fn server_echo_is_dropped() {
        let mut lookup = StubLookup::default();
        lookup.server_values.insert("c1".into(), "same".into());
        let out = collapse(
            vec![vc("c1", "same"), vc("c2", "new")],
            &ClientConfig::default(),
            &lookup,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target_id, "c2");
    }

    #[test]
    fn empty_string_echo_is_still_an_echo() {
        let mut lookup = StubLookup::default();
        lookup.server_values.insert("c1".into(), String::new());
        let out = collapse(vec![vc("c1", "")], &ClientConfig::default(), &lookup);
        assert!(out.is_empty());
    }

    #[test]
    fn upload_value_is_never_treated_as_echo() {
        let mut lookup = StubLookup::default();
        lookup.server_values.insert("up1".into(), "file.bin".into());
        lookup.kinds.insert("up1".into(), ControlKind::Upload);
        let out = collapse(vec![vc("up1", "file.bin")], &ClientConfig::default(), &lookup);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn upload_progress_collapses_across_barriers() {
        let events = vec![
            UiEvent::upload_progress(Some("f1".into()), "up1"),
            UiEvent::activate(Some("f1".into()), "t1"),
            UiEvent::upload_progress(Some("f1".into()), "up1"),
        ];
        let out = collapse(events, &ClientConfig::default(), &StubLookup::default());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, EventName::UploadProgress);
        assert_eq!(out[1].name, EventName::Activate);
    }

    #[test]
    fn detached_and_filtered_events_are_dropped() {
        let mut config = ClientConfig::default();
        config.filtered_events.insert(EventName::FocusIn);
        let detached = UiEvent::value_change(None, "gone", "x");
        let filtered = UiEvent::new(Some("f1".into()), "c1", EventName::FocusIn, None);
        let out = collapse(
            vec![detached, filtered, vc("c2", "keep")],
            &config,
            &StubLookup::default(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target_id, "c2");
    }

    #[test]
    fn batch_traits_aggregate() {
        let mut quiet = UiEvent::heartbeat("f1");
        quiet.progress_message = Some("ignored, not shown".into());
        let mut loud = vc("c1", "v");
        loud.progress_message = Some("Saving...".into());
        let traits = BatchTraits::of(&[quiet.clone(), loud.clone()]);
        assert!(traits.show_progress);
        assert_eq!(traits.progress_message.as_deref(), Some("Saving..."));
        assert!(!traits.ignore_errors);

        // The message only survives when every event that sets one agrees.
        let mut seconding = vc("c2", "w");
        seconding.progress_message = Some("Saving...".into());
        let traits = BatchTraits::of(&[loud.clone(), seconding]);
        assert_eq!(traits.progress_message.as_deref(), Some("Saving..."));

        let mut competing = vc("c2", "w");
        competing.progress_message = Some("Uploading...".into());
        let traits = BatchTraits::of(&[loud, competing]);
        assert!(traits.show_progress);
        assert_eq!(traits.progress_message, None);

        let traits = BatchTraits::of(&[quiet]);
        assert!(!traits.show_progress);
        assert!(traits.ignore_errors);
    }

    #[test]
    fn split_keeps_other_forms_queued_in_order() {
        let mut e2 = vc("c2", "v2");
        e2.form_id = Some("f2".into());
        let events = vec![vc("c1", "v1"), e2.clone(), vc("c3", "v3")];
        let (form, taken, rest) = split_first_form(events).unwrap();
        assert_eq!(form, "f1");
        assert_eq!(taken.len(), 2);
        assert_eq!(rest, vec![e2]);
    }

    mod deferred {
        use super::*;
        use crate::dom::MemoryDom;

        fn dom() -> MemoryDom {
            MemoryDom::builder()
                .form("f1")
                .control("a", ControlKind::Input, "")
                .in_deferred_container("a", "panel1")
                .control("b", ControlKind::Input, "")
                .in_deferred_container("b", "panel2")
                .control("c", ControlKind::Input, "")
                .build()
        }

        #[test]
        fn single_container_batch_waits() {
            let dom = dom();
            assert!(!batch_is_activating(&[vc("a", "x")], &dom));
        }

        #[test]
        fn activation_opens_the_gate() {
            let dom = dom();
            let batch = [vc("a", "x"), UiEvent::activate(Some("f1".into()), "a")];
            assert!(batch_is_activating(&batch, &dom));
        }

        #[test]
        fn outside_any_container_opens_the_gate() {
            let dom = dom();
            assert!(batch_is_activating(&[vc("c", "x")], &dom));
        }

        #[test]
        fn spanning_two_containers_opens_the_gate() {
            let dom = dom();
            let batch = [vc("a", "x"), vc("b", "y")];
            assert!(batch_is_activating(&batch, &dom));
        }
    }
}
