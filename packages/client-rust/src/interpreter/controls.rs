//! The control update rule.

use std::collections::HashSet;

use liveform_core::wire::ControlUpdate;
use liveform_core::FormState;

use crate::dom::{ControlKind, FormDom, LabelPart, Marker};
use crate::error::ClientError;

/// Applies one `control` action.
///
/// Markers and texts always apply. The value is guarded twice: a control the
/// user edited since the last flush keeps the local edit, and action
/// controls carry no value at all. A surviving value is written when the
/// control was structurally recreated (type change), when its itemset was
/// rebuilt this cycle, or when it differs from what the document currently
/// holds; the acknowledged server value is re-read from the document after
/// the write, since the write may normalize.
///
/// # Errors
///
/// Propagates document mutation failures. A control that simply is not
/// attached is logged and skipped.
pub fn apply_control(
    dom: &dyn FormDom,
    state: &mut FormState,
    update: &ControlUpdate,
    rebuilt_itemsets: &HashSet<String>,
) -> Result<(), ClientError> {
    let id = update.id.as_str();
    if !dom.exists(id) {
        tracing::warn!(%id, "control update for unattached id");
        return Ok(());
    }

    // Markers before the value: a control becoming relevant must be live
    // before it receives its value.
    if let Some(relevant) = update.relevant {
        dom.set_marker(id, Marker::Irrelevant, !relevant)?;
    }
    if let Some(readonly) = update.readonly {
        dom.set_marker(id, Marker::Readonly, readonly)?;
    }
    if let Some(required) = update.required {
        dom.set_marker(id, Marker::Required, required)?;
    }
    if let Some(valid) = update.valid {
        dom.set_marker(id, Marker::Invalid, !valid)?;
    }

    let mut type_changed = false;
    if let Some(new_type) = &update.control_type {
        dom.change_type(id, new_type)?;
        type_changed = true;
    }

    if let Some(label) = &update.label {
        dom.set_text(id, LabelPart::Label, label)?;
    }
    if let Some(help) = &update.help {
        dom.set_text(id, LabelPart::Help, help)?;
    }
    if let Some(hint) = &update.hint {
        dom.set_text(id, LabelPart::Hint, hint)?;
    }
    if let Some(alert) = &update.alert {
        dom.set_text(id, LabelPart::Alert, alert)?;
    }

    if let Some(new_value) = &update.value {
        if state.is_changed(id) {
            // The user typed since this request went out; their edit wins
            // and goes to the server on the next flush.
            tracing::debug!(%id, "skipping server value, local edit pending");
            return Ok(());
        }
        if dom
            .control_kind(id)
            .is_some_and(ControlKind::is_action_control)
        {
            return Ok(());
        }
        let forced = type_changed || rebuilt_itemsets.contains(id);
        if forced || dom.value(id).as_deref() != Some(new_value.as_str()) {
            dom.set_value(id, new_value)?;
        }
        let landed = dom.value(id).unwrap_or_else(|| new_value.clone());
        state.record_server_value(id, landed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::dom::{MemoryDom, MemoryDomBuilder};
    use liveform_core::wire::Item;

    fn state() -> FormState {
        FormState::new(Uuid::new_v4(), 1, String::new(), "dyn".into())
    }

    fn builder() -> MemoryDomBuilder {
        MemoryDom::builder().form("f1")
    }

    fn update(id: &str) -> ControlUpdate {
        ControlUpdate {
            id: id.into(),
            ..ControlUpdate::default()
        }
    }

    #[test]
    fn value_write_records_normalized_ack() {
        let dom = builder()
            .select(
                "s1",
                vec![Item {
                    label: "One".into(),
                    value: "1".into(),
                    children: vec![],
                }],
                vec![],
            )
            .build();
        let mut state = state();
        let mut u = update("s1");
        // Not in the itemset; the document normalizes to empty.
        u.value = Some("9".into());
        apply_control(&dom, &mut state, &u, &HashSet::new()).unwrap();
        assert_eq!(state.server_value("s1"), Some(""));
    }

    #[test]
    fn local_edit_wins_over_server_value() {
        let dom = builder().control("c1", ControlKind::Input, "typed").build();
        let mut state = state();
        state.mark_changed("c1");
        let mut u = update("c1");
        u.value = Some("stale".into());
        u.readonly = Some(true);
        apply_control(&dom, &mut state, &u, &HashSet::new()).unwrap();
        assert_eq!(dom.value("c1").as_deref(), Some("typed"));
        // Markers still applied.
        assert!(dom.has_marker("c1", Marker::Readonly));
        assert_eq!(state.server_value("c1"), None);
    }

    #[test]
    fn action_controls_never_receive_values() {
        let dom = builder().control("go", ControlKind::Trigger, "").build();
        let mut state = state();
        let mut u = update("go");
        u.value = Some("x".into());
        apply_control(&dom, &mut state, &u, &HashSet::new()).unwrap();
        assert_eq!(state.server_value("go"), None);
    }

    #[test]
    fn validity_and_relevance_map_to_inverted_markers() {
        let dom = builder().control("c1", ControlKind::Input, "").build();
        let mut state = state();
        let mut u = update("c1");
        u.relevant = Some(false);
        u.valid = Some(false);
        u.required = Some(true);
        apply_control(&dom, &mut state, &u, &HashSet::new()).unwrap();
        assert!(dom.has_marker("c1", Marker::Irrelevant));
        assert!(dom.has_marker("c1", Marker::Invalid));
        assert!(dom.has_marker("c1", Marker::Required));

        let mut u = update("c1");
        u.relevant = Some(true);
        u.valid = Some(true);
        apply_control(&dom, &mut state, &u, &HashSet::new()).unwrap();
        assert!(!dom.has_marker("c1", Marker::Irrelevant));
        assert!(!dom.has_marker("c1", Marker::Invalid));
    }

    #[test]
    fn type_change_forces_the_write() {
        let dom = builder().control("c1", ControlKind::Input, "2024-01-01").build();
        let mut state = state();
        let mut u = update("c1");
        u.control_type = Some("date".into());
        // Same value as before the recreation; the reset would otherwise
        // leave the control blank.
        u.value = Some("2024-01-01".into());
        apply_control(&dom, &mut state, &u, &HashSet::new()).unwrap();
        assert_eq!(dom.value("c1").as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn texts_land_on_their_surfaces() {
        let dom = builder().control("c1", ControlKind::Input, "").build();
        let mut state = state();
        let mut u = update("c1");
        u.label = Some("Name".into());
        u.alert = Some("Required field".into());
        apply_control(&dom, &mut state, &u, &HashSet::new()).unwrap();
        assert_eq!(dom.text("c1", LabelPart::Label).as_deref(), Some("Name"));
        assert_eq!(
            dom.text("c1", LabelPart::Alert).as_deref(),
            Some("Required field")
        );
    }

    #[test]
    fn unattached_control_is_skipped() {
        let dom = builder().build();
        let mut state = state();
        let mut u = update("ghost");
        u.value = Some("x".into());
        assert!(apply_control(&dom, &mut state, &u, &HashSet::new()).is_ok());
    }
}
