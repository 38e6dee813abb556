//! Response action schema.
//!
//! Each top-level `action` block in a response carries an ordered list of
//! heterogeneous DOM-mutation instructions. They are parsed into the tagged
//! [`Action`] enum and applied in three fixed passes: structural repeat
//! mutations first, itemset rebuilds second, everything else in document
//! order. The pass is a property of the action kind, not of its position in
//! the document.

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

/// Interpreter pass an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApplyPass {
    /// `copy-repeat-template` / `delete-repeat-elements`: later actions may
    /// target ids that only exist after these run.
    Structural,
    /// `itemset`: option lists must be rebuilt before a value lands on them.
    Itemset,
    /// Everything else, in document order.
    General,
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Field updates for one control (`control` action).
///
/// Absent fields mean "unchanged". Value semantics are subtle: see the
/// interpreter's update rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControlUpdate {
    pub id: String,
    pub value: Option<String>,
    pub relevant: Option<bool>,
    pub readonly: Option<bool>,
    pub required: Option<bool>,
    pub valid: Option<bool>,
    /// New control type; a change forces structural recreation of the
    /// control, which in turn forces the value write.
    pub control_type: Option<String>,
    pub label: Option<String>,
    pub help: Option<String>,
    pub hint: Option<String>,
    pub alert: Option<String>,
}

/// One selectable choice in an itemset; groups carry children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Item {
    pub label: String,
    pub value: String,
    pub children: Vec<Item>,
}

/// Replacement of a selection control's choices (`itemset` action).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemsetUpdate {
    pub id: String,
    pub items: Vec<Item>,
}

/// Show/hide toggle for a case or dialog element (`divs` action child).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivToggle {
    pub id: String,
    pub visible: bool,
}

/// Severity of a user-facing `message` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Modal,
    Modeless,
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// A single parsed response action. Transient: constructed while parsing,
/// discarded once applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Update one control's value/flags/texts.
    Control(ControlUpdate),
    /// Replace a selection control's choices.
    Itemset(ItemsetUpdate),
    /// Toggle relevance of every node within one repeat iteration.
    RepeatIteration {
        repeat_id: String,
        iteration: u32,
        relevant: bool,
    },
    /// Show/hide a batch of case/dialog elements.
    Divs(Vec<DivToggle>),
    /// Move the currently-selected-iteration highlight of repeats.
    RepeatIndexes(Vec<(String, u32)>),
    /// Deferred events the server wants echoed back later (or stashed for a
    /// two-phase submission).
    ServerEvents {
        /// Opaque payload, round-tripped verbatim.
        payload: String,
        delay_ms: Option<u64>,
        /// Discardable timers are cancelled when a substantive flush occurs.
        discardable: bool,
        show_progress: bool,
    },
    /// Physically submit the host form (second phase of a two-phase
    /// submission).
    Submission {
        show_progress: bool,
        /// Navigation target; `None` replaces the current page.
        target: Option<String>,
    },
    /// Show a user-facing message.
    Message { level: MessageLevel, text: String },
    /// Navigate or open a window.
    Load {
        resource: String,
        /// `None` replaces the current page.
        target: Option<String>,
        show_progress: bool,
    },
    /// Move focus to a control.
    SetFocus { control_id: String },
    /// Invoke a named client-side callback.
    Script {
        name: String,
        target_id: String,
        observer_id: String,
    },
    /// Show the help surface for a control.
    Help { control_id: String },
    /// Legacy disconnected-mode hook.
    Offline,
    /// Clone a repeat's template between its delimiters.
    CopyRepeatTemplate {
        repeat_id: String,
        /// Joined indexes of the enclosing iterations; empty when top-level.
        parent_indexes: String,
        start_iteration: u32,
        end_iteration: u32,
    },
    /// Remove trailing iterations from a repeat.
    DeleteRepeatElements {
        repeat_id: String,
        parent_indexes: String,
        count: u32,
    },
}

impl Action {
    /// The interpreter pass this action belongs to.
    #[must_use]
    pub fn pass(&self) -> ApplyPass {
        match self {
            Self::CopyRepeatTemplate { .. } | Self::DeleteRepeatElements { .. } => {
                ApplyPass::Structural
            }
            Self::Itemset(_) => ApplyPass::Itemset,
            _ => ApplyPass::General,
        }
    }

    /// The wire tag of this action kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Control(_) => "control",
            Self::Itemset(_) => "itemset",
            Self::RepeatIteration { .. } => "repeat-iteration",
            Self::Divs(_) => "divs",
            Self::RepeatIndexes(_) => "repeat-indexes",
            Self::ServerEvents { .. } => "server-events",
            Self::Submission { .. } => "submission",
            Self::Message { .. } => "message",
            Self::Load { .. } => "load",
            Self::SetFocus { .. } => "setfocus",
            Self::Script { .. } => "script",
            Self::Help { .. } => "help",
            Self::Offline => "offline",
            Self::CopyRepeatTemplate { .. } => "copy-repeat-template",
            Self::DeleteRepeatElements { .. } => "delete-repeat-elements",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_actions_sort_before_itemsets_before_general() {
        let copy = Action::CopyRepeatTemplate {
            repeat_id: "r".into(),
            parent_indexes: String::new(),
            start_iteration: 1,
            end_iteration: 1,
        };
        let itemset = Action::Itemset(ItemsetUpdate {
            id: "s".into(),
            items: vec![],
        });
        let control = Action::Control(ControlUpdate {
            id: "c".into(),
            ..ControlUpdate::default()
        });
        assert!(copy.pass() < itemset.pass());
        assert!(itemset.pass() < control.pass());
        assert_eq!(
            Action::DeleteRepeatElements {
                repeat_id: "r".into(),
                parent_indexes: String::new(),
                count: 1
            }
            .pass(),
            ApplyPass::Structural
        );
    }

    #[test]
    fn kinds_match_wire_tags() {
        assert_eq!(Action::Offline.kind(), "offline");
        assert_eq!(
            Action::SetFocus {
                control_id: "c".into()
            }
            .kind(),
            "setfocus"
        );
    }
}
