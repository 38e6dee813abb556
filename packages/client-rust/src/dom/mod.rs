//! DOM collaborator interfaces.
//!
//! The runtime never touches a real document directly: it depends on the
//! [`FormDom`] trait for every read and mutation, and notifies the host
//! through [`ClientObserver`]. `MemoryDom` is the in-tree reference
//! implementation (and the substrate of the test suite); a wasm host would
//! provide its own.

use liveform_core::wire::Item;

use crate::error::DomError;

pub mod memory;

pub use memory::{MemoryDom, MemoryDomBuilder, TemplateEntry};

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// The kinds of control the runtime distinguishes.
///
/// Provided by the surrounding collaborator layer; the runtime never infers
/// a kind from markup conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Single-line or multi-line text entry.
    Input,
    /// Selection control backed by an itemset.
    Select,
    /// File upload. Value changes double as file-selection state and are
    /// never collapsed away.
    Upload,
    /// Pure action control (trigger/submit); carries no value.
    Trigger,
    /// Read-only computed output.
    Output,
}

impl ControlKind {
    /// Whether this kind has no value to read or write.
    #[must_use]
    pub fn is_action_control(self) -> bool {
        matches!(self, Self::Trigger)
    }
}

/// Boolean markers toggled on elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// The element is currently irrelevant (hidden/disabled by the model).
    Irrelevant,
    Readonly,
    Required,
    Invalid,
    /// A case/dialog element that is currently hidden.
    Hidden,
}

/// Text surfaces attached to a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelPart {
    Label,
    Hint,
    Help,
    Alert,
}

// ---------------------------------------------------------------------------
// FormDom
// ---------------------------------------------------------------------------

/// Primitive document operations the runtime is built on.
///
/// Structural repeat operations take the repeat's full instance id (base id
/// plus iteration suffix for nested repeats). Implementations own the
/// delimiter bookkeeping; `delimiter_position` exposes enough of it for the
/// runtime (and tests) to reason about iteration identity.
pub trait FormDom: Send + Sync {
    /// Whether an element with this id is attached to the document.
    fn exists(&self, id: &str) -> bool;

    /// Nearest enclosing form-like container of the element, if attached.
    fn nearest_form(&self, id: &str) -> Option<String>;

    /// The control kind of the element, if it is a control.
    fn control_kind(&self, id: &str) -> Option<ControlKind>;

    /// Current value of a control, `None` for non-value controls.
    fn value(&self, id: &str) -> Option<String>;

    /// Writes a control value. The write may normalize: read the value back
    /// rather than assuming it took verbatim.
    ///
    /// # Errors
    ///
    /// Fails for unknown ids and for action controls.
    fn set_value(&self, id: &str, value: &str) -> Result<(), DomError>;

    /// Adds or removes a boolean marker.
    ///
    /// # Errors
    ///
    /// Fails for unknown ids.
    fn set_marker(&self, id: &str, marker: Marker, on: bool) -> Result<(), DomError>;

    /// Whether a marker is currently set.
    fn has_marker(&self, id: &str, marker: Marker) -> bool;

    /// Replaces one of the control's text surfaces.
    ///
    /// # Errors
    ///
    /// Fails for unknown ids.
    fn set_text(&self, id: &str, part: LabelPart, text: &str) -> Result<(), DomError>;

    /// Currently selected values of a selection control.
    fn selected_values(&self, id: &str) -> Vec<String>;

    /// Replaces a selection control's choices, keeping any previously
    /// selected value that still exists in the new set.
    ///
    /// # Errors
    ///
    /// Fails for unknown ids and non-selection controls.
    fn set_items(&self, id: &str, items: &[Item]) -> Result<(), DomError>;

    /// Structurally recreates the control with a new type (e.g. a string
    /// input becoming a date picker). The value is reset by the recreation.
    ///
    /// # Errors
    ///
    /// Fails for unknown ids.
    fn change_type(&self, id: &str, new_type: &str) -> Result<(), DomError>;

    /// Moves focus to the control. Unknown ids are ignored.
    fn focus(&self, id: &str);

    /// The default-deferred container enclosing the element, if any. Used
    /// by deferred-mode gating.
    fn deferred_container_of(&self, id: &str) -> Option<String>;

    // -- structural repeat operations --

    /// Clones the repeat's template once per iteration in
    /// `start..=end`, appending each clone (delimiter first) before the end
    /// marker and rewriting embedded ids with the iteration suffix.
    ///
    /// # Errors
    ///
    /// Fails for unknown repeats or repeats without a template.
    fn copy_repeat_template(&self, repeat_id: &str, start: u32, end: u32) -> Result<(), DomError>;

    /// Removes the last `count` iterations, walking backward from the end
    /// marker and skipping nested repeats via a nesting-depth counter.
    ///
    /// # Errors
    ///
    /// Fails for unknown repeats or when fewer than `count` iterations
    /// exist.
    fn delete_repeat_iterations(&self, repeat_id: &str, count: u32) -> Result<(), DomError>;

    /// Toggles the relevance marker on every node of one iteration.
    ///
    /// # Errors
    ///
    /// Fails for unknown repeats.
    fn set_iteration_relevance(
        &self,
        repeat_id: &str,
        iteration: u32,
        relevant: bool,
    ) -> Result<(), DomError>;

    /// Moves the currently-selected-iteration highlight: clears the old
    /// index's marker first, then sets the new one. Index 0 clears the
    /// highlight entirely.
    ///
    /// # Errors
    ///
    /// Fails for unknown repeats.
    fn move_repeat_index(&self, repeat_id: &str, iteration: u32) -> Result<(), DomError>;

    /// The current highlighted iteration of a repeat (0 when none).
    fn repeat_index(&self, repeat_id: &str) -> Option<u32>;

    /// Number of iterations currently in the repeat.
    fn iteration_count(&self, repeat_id: &str) -> Option<u32>;

    /// Position, in document order within the repeat run, of the delimiter
    /// that opens the given iteration. Logically equivalent delimiters at
    /// the same position compare equal across delete/reinsert cycles.
    fn delimiter_position(&self, repeat_id: &str, iteration: u32) -> Option<usize>;
}

// ---------------------------------------------------------------------------
// ClientObserver
// ---------------------------------------------------------------------------

/// Severity of a user-facing message, re-exported for observers.
pub use liveform_core::wire::MessageLevel;

/// Outward notifications from the runtime to the host UI layer.
///
/// All methods default to no-ops so hosts implement only what they render.
pub trait ClientObserver: Send + Sync {
    /// One full request/response cycle completed.
    fn on_response_processed(&self, _form_id: &str) {}

    /// A permanent error or client-side exception should be surfaced.
    fn on_error(&self, _title: &str, _body: &str) {}

    /// A `message` action.
    fn on_message(&self, _level: MessageLevel, _text: &str) {}

    /// A `load` action; `target` of `None` replaces the current page.
    fn on_load(&self, _resource: &str, _target: Option<&str>) {}

    /// A `submission` action: physically submit the host form, carrying any
    /// stashed server events in a hidden field.
    fn on_submit(&self, _form_id: &str, _server_events: Option<&str>, _target: Option<&str>) {}

    /// A `script` action.
    fn on_script(&self, _name: &str, _target_id: &str, _observer_id: &str) {}

    /// A `help` action.
    fn on_help(&self, _control_id: &str) {}

    /// The legacy `offline` hook.
    fn on_offline(&self) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ClientObserver for NullObserver {}
