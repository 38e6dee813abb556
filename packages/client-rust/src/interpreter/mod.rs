//! Response action interpreter.
//!
//! Applies a parsed `event-response` to the document in three fixed passes:
//! structural repeat mutations first (later actions may target ids that only
//! exist afterwards), itemset rebuilds second (a value must land on the new
//! option list), then everything else in document order. State blobs are
//! persisted before any action runs, so a crash mid-application never loses
//! the server's state handoff.

mod controls;
mod repeats;

use std::collections::HashSet;

use liveform_core::repeat::suffixed_id;
use liveform_core::wire::{Action, ApplyPass, ResponseDocument};
use liveform_core::{FormState, RepeatTree};

use crate::dom::{ClientObserver, FormDom, Marker};
use crate::error::ClientError;

pub use controls::apply_control;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// A server-requested deferred replay to schedule after this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEvents {
    /// Opaque payload echoed back in a `server-events` event.
    pub payload: String,
    pub delay_ms: u64,
    /// Cancelled if a substantive flush happens before the timer fires.
    pub discardable: bool,
    pub show_progress: bool,
}

/// Side effects of one applied response that outlive the interpreter call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Deferred replays to schedule.
    pub scheduled: Vec<ScheduledEvents>,
    /// A `load` without a target replaced the page; the runtime stops
    /// dismissing the indicator and stops flushing.
    pub page_replaced: bool,
    /// A submission was handed to the host.
    pub submitted: bool,
}

// ---------------------------------------------------------------------------
// Interpreter
// ---------------------------------------------------------------------------

/// Borrowed collaborators for one response application.
pub struct Interpreter<'a> {
    pub dom: &'a dyn FormDom,
    pub observer: &'a dyn ClientObserver,
    pub repeat_tree: &'a RepeatTree,
}

impl Interpreter<'_> {
    /// Applies `doc` to the form, mutating `state` in place.
    ///
    /// # Errors
    ///
    /// Structural inconsistencies (unknown repeats, too few iterations)
    /// surface as errors; a missing plain control is only logged, since the
    /// server may legitimately reference controls a host chose not to
    /// render.
    pub fn apply(
        &self,
        form_id: &str,
        state: &mut FormState,
        doc: &ResponseDocument,
    ) -> Result<Applied, ClientError> {
        // State first. Everything after this point is replayable.
        if let Some(dynamic) = &doc.dynamic_state {
            state.dynamic_state = dynamic.clone();
        }
        if let Some(static_state) = &doc.static_state {
            state.static_state = static_state.clone();
        }

        let mut applied = Applied::default();
        let mut rebuilt_itemsets: HashSet<String> = HashSet::new();
        let mut stashed_server_events: Option<String> = None;
        let has_submission = doc.has_submission();

        for pass in [ApplyPass::Structural, ApplyPass::Itemset, ApplyPass::General] {
            for action in doc.actions.iter().filter(|a| a.pass() == pass) {
                self.apply_one(
                    form_id,
                    state,
                    action,
                    has_submission,
                    &mut rebuilt_itemsets,
                    &mut stashed_server_events,
                    &mut applied,
                )?;
            }
        }

        Ok(applied)
    }

    #[allow(clippy::too_many_arguments, clippy::too_many_lines)]
    fn apply_one(
        &self,
        form_id: &str,
        state: &mut FormState,
        action: &Action,
        has_submission: bool,
        rebuilt_itemsets: &mut HashSet<String>,
        stashed_server_events: &mut Option<String>,
        applied: &mut Applied,
    ) -> Result<(), ClientError> {
        match action {
            Action::CopyRepeatTemplate {
                repeat_id,
                parent_indexes,
                start_iteration,
                end_iteration,
            } => {
                let instance = suffixed_id(repeat_id, parent_indexes);
                self.dom
                    .copy_repeat_template(&instance, *start_iteration, *end_iteration)?;
            }
            Action::DeleteRepeatElements {
                repeat_id,
                parent_indexes,
                count,
            } => {
                let instance = suffixed_id(repeat_id, parent_indexes);
                self.dom.delete_repeat_iterations(&instance, *count)?;
            }
            Action::Itemset(update) => {
                self.dom.set_items(&update.id, &update.items)?;
                rebuilt_itemsets.insert(update.id.clone());
            }
            Action::Control(update) => {
                controls::apply_control(self.dom, state, update, rebuilt_itemsets)?;
            }
            Action::RepeatIteration {
                repeat_id,
                iteration,
                relevant,
            } => {
                self.dom
                    .set_iteration_relevance(repeat_id, *iteration, *relevant)?;
            }
            Action::Divs(toggles) => {
                for toggle in toggles {
                    if let Err(err) =
                        self.dom
                            .set_marker(&toggle.id, Marker::Hidden, !toggle.visible)
                    {
                        tracing::warn!(id = %toggle.id, %err, "div toggle target missing");
                    }
                }
            }
            Action::RepeatIndexes(moves) => {
                repeats::apply_indexes(self.dom, self.repeat_tree, moves)?;
            }
            Action::ServerEvents {
                payload,
                delay_ms,
                discardable,
                show_progress,
            } => {
                if has_submission {
                    // First phase of a two-phase submission: the payload
                    // travels with the physical submit, not over Ajax.
                    *stashed_server_events = Some(payload.clone());
                } else {
                    applied.scheduled.push(ScheduledEvents {
                        payload: payload.clone(),
                        delay_ms: delay_ms.unwrap_or(0),
                        discardable: *discardable,
                        show_progress: *show_progress,
                    });
                }
            }
            Action::Submission { target, .. } => {
                self.observer.on_submit(
                    form_id,
                    stashed_server_events.take().as_deref(),
                    target.as_deref(),
                );
                applied.submitted = true;
            }
            Action::Message { level, text } => {
                self.observer.on_message(*level, text);
            }
            Action::Load {
                resource, target, ..
            } => {
                if target.is_none() {
                    applied.page_replaced = true;
                }
                self.observer.on_load(resource, target.as_deref());
            }
            Action::SetFocus { control_id } => {
                self.dom.focus(control_id);
            }
            Action::Script {
                name,
                target_id,
                observer_id,
            } => {
                self.observer.on_script(name, target_id, observer_id);
            }
            Action::Help { control_id } => {
                self.observer.on_help(control_id);
            }
            Action::Offline => {
                self.observer.on_offline();
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
