//! Outbound `event-request` document encoder.

use uuid::Uuid;

use crate::event::UiEvent;
use crate::state::FormState;
use crate::wire::xml::{escape_attr, escape_text};

/// One encoded request: the session/state envelope plus a batch of events.
///
/// Built from a [`FormState`] snapshot and the partitioned batch; encoding
/// preserves event order exactly as partitioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRequest {
    pub uuid: Uuid,
    /// Present only when the batch advances the sequence number; heartbeats
    /// and upload-progress polls must not consume a sequence slot.
    pub sequence: Option<u64>,
    /// Omitted when empty: the static state rarely changes after first load.
    pub static_state: Option<String>,
    pub dynamic_state: String,
    /// Carried only when an event in the batch requires a full replay.
    pub initial_dynamic_state: Option<String>,
    pub events: Vec<UiEvent>,
}

impl EventRequest {
    /// Assembles a request from the current form state and an event batch.
    ///
    /// When the batch contains at least one sequence-advancing event, the
    /// state's sequence counter is consumed (and incremented); otherwise the
    /// request carries no sequence at all.
    pub fn assemble(state: &mut FormState, events: Vec<UiEvent>) -> Self {
        let advances = events.iter().any(UiEvent::advances_sequence);
        let needs_initial = events.iter().any(UiEvent::requires_initial_dynamic_state);
        Self {
            uuid: state.uuid,
            sequence: advances.then(|| state.next_sequence()),
            static_state: (!state.static_state.is_empty()).then(|| state.static_state.clone()),
            dynamic_state: state.dynamic_state.clone(),
            initial_dynamic_state: needs_initial.then(|| state.initial_dynamic_state.clone()),
            events,
        }
    }

    /// Serializes the request to its wire form.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(256);
        out.push_str("<event-request>");
        out.push_str(&format!("<uuid>{}</uuid>", self.uuid));
        if let Some(sequence) = self.sequence {
            out.push_str(&format!("<sequence>{sequence}</sequence>"));
        }
        if let Some(static_state) = &self.static_state {
            out.push_str(&format!(
                "<static-state>{}</static-state>",
                escape_text(static_state)
            ));
        }
        out.push_str(&format!(
            "<dynamic-state>{}</dynamic-state>",
            escape_text(&self.dynamic_state)
        ));
        if let Some(initial) = &self.initial_dynamic_state {
            out.push_str(&format!(
                "<initial-dynamic-state>{}</initial-dynamic-state>",
                escape_text(initial)
            ));
        }
        out.push_str("<action>");
        for event in &self.events {
            out.push_str(&encode_event(event));
        }
        out.push_str("</action>");
        out.push_str("</event-request>");
        out
    }
}

fn encode_event(event: &UiEvent) -> String {
    let mut out = String::with_capacity(64);
    out.push_str(&format!(
        "<event name=\"{}\" source-control-id=\"{}\"",
        escape_attr(event.name.as_str()),
        escape_attr(&event.target_id)
    ));
    if let Some(other_id) = &event.other_id {
        out.push_str(&format!(" other-control-id=\"{}\"", escape_attr(other_id)));
    }
    for (name, value) in &event.additional_attrs {
        out.push_str(&format!(" {name}=\"{}\"", escape_attr(value)));
    }
    match &event.value {
        Some(value) => out.push_str(&format!(">{}</event>", escape_text(value))),
        None => out.push_str("/>"),
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::event::{EventName, UiEvent};
    use crate::state::FormState;
    use crate::wire::xml;

    use super::*;

    fn state() -> FormState {
        FormState::new(Uuid::nil(), 7, "ss".into(), "ds".into())
    }

    #[test]
    fn sequence_advances_only_for_substantive_events() {
        let mut s = state();
        let req = EventRequest::assemble(
            &mut s,
            vec![UiEvent::value_change(Some("f1".into()), "c1", "v")],
        );
        assert_eq!(req.sequence, Some(7));
        assert_eq!(s.sequence, 8);
    }

    #[test]
    fn heartbeat_only_batch_omits_sequence() {
        let mut s = state();
        let req = EventRequest::assemble(&mut s, vec![UiEvent::heartbeat("f1")]);
        assert_eq!(req.sequence, None);
        assert_eq!(s.sequence, 7);
        assert!(!req.to_xml().contains("<sequence>"));
    }

    #[test]
    fn empty_static_state_is_omitted() {
        let mut s = state();
        s.static_state = String::new();
        let req = EventRequest::assemble(&mut s, vec![UiEvent::activate(Some("f1".into()), "t1")]);
        assert!(!req.to_xml().contains("static-state"));
    }

    #[test]
    fn initial_dynamic_state_carried_on_demand() {
        let mut s = state();
        let req = EventRequest::assemble(
            &mut s,
            vec![UiEvent::new(
                Some("f1".into()),
                "f1",
                EventName::AllEventsRequired,
                None,
            )],
        );
        assert_eq!(req.initial_dynamic_state.as_deref(), Some("ds"));
        assert!(req.to_xml().contains("<initial-dynamic-state>ds</initial-dynamic-state>"));
    }

    #[test]
    fn event_order_and_escaping_are_preserved() {
        let mut s = state();
        let mut second = UiEvent::value_change(Some("f1".into()), "b", "1 < 2 & 3");
        second.other_id = Some("obs".into());
        second.additional_attrs.push(("dnd-start".into(), "4".into()));
        let req = EventRequest::assemble(
            &mut s,
            vec![UiEvent::value_change(Some("f1".into()), "a", "x"), second],
        );
        let doc = xml::parse(&req.to_xml()).unwrap();
        let action = doc.child("action").unwrap();
        let events: Vec<_> = action.children_named("event").collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].attr("source-control-id"), Some("a"));
        assert_eq!(events[1].attr("source-control-id"), Some("b"));
        assert_eq!(events[1].attr("other-control-id"), Some("obs"));
        assert_eq!(events[1].attr("dnd-start"), Some("4"));
        assert_eq!(events[1].text, "1 < 2 & 3");
    }
}
