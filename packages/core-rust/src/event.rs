//! Client-side interaction events destined for the server.
//!
//! A `UiEvent` is created by a UI interaction handler (or by the response
//! interpreter, for server-requested deferred events), queued, possibly
//! collapsed against neighbouring events, and finally serialized into an
//! `event-request` document.

// ---------------------------------------------------------------------------
// Event vocabulary
// ---------------------------------------------------------------------------

/// Fixed vocabulary of event names understood by the server.
///
/// The wire tag for each variant is stable; `Custom` carries names the
/// server introduced after this client was built (server-requested deferred
/// events are echoed back verbatim).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    /// The user committed a new value for a control.
    ValueChange,
    /// The user activated a trigger/submit control.
    Activate,
    /// Focus entered a control.
    FocusIn,
    /// Focus left a control.
    FocusOut,
    /// Keep-alive ping; carries no form data.
    Heartbeat,
    /// Poll for the progress of a running file upload.
    UploadProgress,
    /// Replay of server-stashed events, fired on a delay the server chose.
    ServerEvents,
    /// The server asked for a full replay from the initial dynamic state.
    AllEventsRequired,
    /// A name outside the fixed vocabulary.
    Custom(String),
}

impl EventName {
    /// The tag used on the wire for this event name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ValueChange => "value-change",
            Self::Activate => "activate",
            Self::FocusIn => "focus-in",
            Self::FocusOut => "focus-out",
            Self::Heartbeat => "session-heartbeat",
            Self::UploadProgress => "upload-progress",
            Self::ServerEvents => "server-events",
            Self::AllEventsRequired => "all-events-required",
            Self::Custom(name) => name,
        }
    }

    /// Parses a wire tag, falling back to `Custom` for unknown names.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        match tag {
            "value-change" => Self::ValueChange,
            "activate" => Self::Activate,
            "focus-in" => Self::FocusIn,
            "focus-out" => Self::FocusOut,
            "session-heartbeat" => Self::Heartbeat,
            "upload-progress" => Self::UploadProgress,
            "server-events" => Self::ServerEvents,
            "all-events-required" => Self::AllEventsRequired,
            other => Self::Custom(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// UiEvent
// ---------------------------------------------------------------------------

/// A single user/client-triggered interaction destined for the server.
///
/// Immutable once enqueued, except that the collapsing pass may rewrite the
/// retained instance of an upload-progress poll. Destroyed when encoded into
/// a request or dropped by a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiEvent {
    /// Host form, resolved at creation from the target's nearest enclosing
    /// form-like container. `None` when the target was detached from the
    /// document at creation time; such events are dropped by the batching
    /// policy rather than crashing.
    pub form_id: Option<String>,
    /// Id of the control the event targets.
    pub target_id: String,
    /// Secondary id, e.g. the destination of a drag or the observed control
    /// of a script.
    pub other_id: Option<String>,
    /// Payload value, e.g. the new control value.
    pub value: Option<String>,
    /// Name tag from the fixed vocabulary.
    pub name: EventName,
    /// Whether the event bubbles (round-tripped to the server).
    pub bubbles: bool,
    /// Whether the event is cancelable (round-tripped to the server).
    pub cancelable: bool,
    /// When set, a failing round trip for this event is not surfaced.
    pub ignore_errors: bool,
    /// Whether this event wants the busy indicator shown.
    pub show_progress: bool,
    /// Optional message for the progress panel.
    pub progress_message: Option<String>,
    /// Extra (name, value) attribute pairs carried on the wire element.
    pub additional_attrs: Vec<(String, String)>,
}

impl UiEvent {
    /// Creates an event with the given identity and payload; flags default
    /// to bubbling, cancelable, error-surfacing, progress-showing.
    #[must_use]
    pub fn new(
        form_id: Option<String>,
        target_id: impl Into<String>,
        name: EventName,
        value: Option<String>,
    ) -> Self {
        Self {
            form_id,
            target_id: target_id.into(),
            other_id: None,
            value,
            name,
            bubbles: true,
            cancelable: true,
            ignore_errors: false,
            show_progress: true,
            progress_message: None,
            additional_attrs: Vec::new(),
        }
    }

    /// A committed value change for `target_id`.
    #[must_use]
    pub fn value_change(
        form_id: Option<String>,
        target_id: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(form_id, target_id, EventName::ValueChange, Some(value.into()))
    }

    /// An activation (click/submit) of `target_id`.
    #[must_use]
    pub fn activate(form_id: Option<String>, target_id: impl Into<String>) -> Self {
        Self::new(form_id, target_id, EventName::Activate, None)
    }

    /// A session keep-alive for the given form. Heartbeats never advance the
    /// sequence number, never show progress, and tolerate errors.
    #[must_use]
    pub fn heartbeat(form_id: impl Into<String>) -> Self {
        let form_id = form_id.into();
        let mut event = Self::new(Some(form_id.clone()), form_id, EventName::Heartbeat, None);
        event.ignore_errors = true;
        event.show_progress = false;
        event
    }

    /// An upload-progress poll for `target_id`.
    #[must_use]
    pub fn upload_progress(form_id: Option<String>, target_id: impl Into<String>) -> Self {
        let mut event = Self::new(form_id, target_id, EventName::UploadProgress, None);
        event.show_progress = false;
        event
    }

    /// Whether a request carrying this event advances the sequence number.
    ///
    /// Heartbeats and upload-progress polls are idempotent from the server's
    /// point of view and must not consume a sequence slot.
    #[must_use]
    pub fn advances_sequence(&self) -> bool {
        !matches!(self.name, EventName::Heartbeat | EventName::UploadProgress)
    }

    /// Whether this event forces the request to carry the initial dynamic
    /// state blob alongside the current one.
    #[must_use]
    pub fn requires_initial_dynamic_state(&self) -> bool {
        matches!(self.name, EventName::AllEventsRequired)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_name_tags_roundtrip() {
        for name in [
            EventName::ValueChange,
            EventName::Activate,
            EventName::FocusIn,
            EventName::FocusOut,
            EventName::Heartbeat,
            EventName::UploadProgress,
            EventName::ServerEvents,
            EventName::AllEventsRequired,
        ] {
            assert_eq!(EventName::parse(name.as_str()), name);
        }
    }

    #[test]
    fn unknown_tag_parses_as_custom() {
        let name = EventName::parse("dnd-move");
        assert_eq!(name, EventName::Custom("dnd-move".to_string()));
        assert_eq!(name.as_str(), "dnd-move");
    }

    #[test]
    fn heartbeat_does_not_advance_sequence() {
        assert!(!UiEvent::heartbeat("f1").advances_sequence());
        assert!(!UiEvent::upload_progress(Some("f1".into()), "up1").advances_sequence());
        assert!(UiEvent::value_change(Some("f1".into()), "c1", "v").advances_sequence());
        assert!(UiEvent::activate(Some("f1".into()), "t1").advances_sequence());
    }

    #[test]
    fn heartbeat_flags() {
        let hb = UiEvent::heartbeat("f1");
        assert!(hb.ignore_errors);
        assert!(!hb.show_progress);
        assert_eq!(hb.form_id.as_deref(), Some("f1"));
    }

    #[test]
    fn all_events_required_needs_initial_state() {
        let event = UiEvent::new(Some("f1".into()), "f1", EventName::AllEventsRequired, None);
        assert!(event.requires_initial_dynamic_state());
        assert!(!UiEvent::activate(Some("f1".into()), "t1").requires_initial_dynamic_state());
    }
}
