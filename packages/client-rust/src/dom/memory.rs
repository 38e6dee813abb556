//! In-memory reference implementation of [`FormDom`].
//!
//! Each form body is a flat sequence of nodes in document order: control
//! nodes, repeat begin/end markers, and anonymous delimiters. A repeat's
//! iterations are the delimiter-bounded runs between its markers; nested
//! repeats appear inline, so walking a run requires the same nesting-depth
//! bookkeeping a live DOM would.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;

use liveform_core::repeat::{iteration_suffix, split_id, suffixed_id};
use liveform_core::wire::Item;

use crate::dom::{ControlKind, FormDom, LabelPart, Marker};
use crate::error::DomError;

// ---------------------------------------------------------------------------
// Node model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum DocNode {
    /// A control, by id.
    Control(String),
    /// Start marker of a repeat instance.
    RepeatBegin(String),
    /// End marker of a repeat instance.
    RepeatEnd(String),
    /// Anonymous marker opening one iteration of the enclosing repeat.
    Delimiter,
}

#[derive(Debug, Clone)]
struct ControlNode {
    kind: ControlKind,
    form_id: String,
    value: String,
    control_type: String,
    markers: HashSet<Marker>,
    items: Vec<Item>,
    selected: Vec<String>,
    label: Option<String>,
    hint: Option<String>,
    help: Option<String>,
    alert: Option<String>,
    deferred_container: Option<String>,
}

impl ControlNode {
    fn new(kind: ControlKind, form_id: String) -> Self {
        Self {
            kind,
            form_id,
            value: String::new(),
            control_type: String::new(),
            markers: HashSet::new(),
            items: Vec::new(),
            selected: Vec::new(),
            label: None,
            hint: None,
            help: None,
            alert: None,
            deferred_container: None,
        }
    }
}

#[derive(Debug, Clone)]
struct RepeatMeta {
    base_id: String,
    form_id: String,
}

/// One entry of a repeat template, registered per base repeat id.
#[derive(Debug, Clone)]
pub enum TemplateEntry {
    /// A control cloned into each iteration.
    Control { id: String, kind: ControlKind },
    /// A nested repeat shell (empty; its iterations arrive as separate
    /// structural actions targeting the suffixed instance id).
    Repeat {
        id: String,
        template: Vec<TemplateEntry>,
    },
}

impl TemplateEntry {
    /// Shorthand for a text-input template control.
    #[must_use]
    pub fn input(id: impl Into<String>) -> Self {
        Self::Control {
            id: id.into(),
            kind: ControlKind::Input,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    /// Form id → body node sequence.
    forms: HashMap<String, Vec<DocNode>>,
    controls: HashMap<String, ControlNode>,
    /// Repeat instance id → metadata.
    repeats: HashMap<String, RepeatMeta>,
    /// Repeat base id → template.
    templates: HashMap<String, Vec<TemplateEntry>>,
    /// Repeat instance id → highlighted iteration (absent or 0 = none).
    highlights: HashMap<String, u32>,
    focused: Option<String>,
}

// ---------------------------------------------------------------------------
// MemoryDom
// ---------------------------------------------------------------------------

/// Thread-safe in-memory document.
#[derive(Debug, Default)]
pub struct MemoryDom {
    inner: RwLock<Inner>,
}

impl MemoryDom {
    #[must_use]
    pub fn builder() -> MemoryDomBuilder {
        MemoryDomBuilder {
            inner: Inner::default(),
            current_form: None,
        }
    }

    /// The control last given focus, for hosts and tests.
    #[must_use]
    pub fn focused(&self) -> Option<String> {
        self.inner.read().focused.clone()
    }

    /// A text surface of a control, for hosts and tests.
    #[must_use]
    pub fn text(&self, id: &str, part: LabelPart) -> Option<String> {
        let inner = self.inner.read();
        let control = inner.controls.get(id)?;
        match part {
            LabelPart::Label => control.label.clone(),
            LabelPart::Hint => control.hint.clone(),
            LabelPart::Help => control.help.clone(),
            LabelPart::Alert => control.alert.clone(),
        }
    }

    /// The current item list of a selection control.
    #[must_use]
    pub fn items(&self, id: &str) -> Vec<Item> {
        self.inner
            .read()
            .controls
            .get(id)
            .map(|c| c.items.clone())
            .unwrap_or_default()
    }
}

impl Inner {
    fn control(&self, id: &str) -> Result<&ControlNode, DomError> {
        self.controls.get(id).ok_or_else(|| DomError::NoSuchElement {
            id: id.to_string(),
        })
    }

    fn control_mut(&mut self, id: &str) -> Result<&mut ControlNode, DomError> {
        self.controls
            .get_mut(id)
            .ok_or_else(|| DomError::NoSuchElement {
                id: id.to_string(),
            })
    }

    /// Locates a repeat instance's begin/end marker positions in its form.
    fn repeat_span(&self, repeat_id: &str) -> Result<(&str, usize, usize), DomError> {
        let meta = self.repeats.get(repeat_id).ok_or_else(|| DomError::NoSuchRepeat {
            id: repeat_id.to_string(),
        })?;
        let nodes = self
            .forms
            .get(&meta.form_id)
            .ok_or_else(|| DomError::NoSuchRepeat {
                id: repeat_id.to_string(),
            })?;
        let begin = nodes
            .iter()
            .position(|n| matches!(n, DocNode::RepeatBegin(id) if id == repeat_id));
        let end = nodes
            .iter()
            .position(|n| matches!(n, DocNode::RepeatEnd(id) if id == repeat_id));
        match (begin, end) {
            (Some(b), Some(e)) if b < e => Ok((meta.form_id.as_str(), b, e)),
            _ => Err(DomError::NoSuchRepeat {
                id: repeat_id.to_string(),
            }),
        }
    }

    /// Positions (absolute) of the repeat's own delimiters, in order.
    ///
    /// Delimiters of nested repeats are skipped by depth counting: a begin
    /// marker enters a nested scope, its end marker leaves it, and only
    /// delimiters at depth zero belong to this repeat.
    fn own_delimiters(&self, repeat_id: &str) -> Result<Vec<usize>, DomError> {
        let (form_id, begin, end) = self.repeat_span(repeat_id)?;
        let nodes = &self.forms[form_id];
        let mut depth = 0u32;
        let mut out = Vec::new();
        for (pos, node) in nodes.iter().enumerate().take(end).skip(begin + 1) {
            match node {
                DocNode::RepeatBegin(_) => depth += 1,
                DocNode::RepeatEnd(_) => depth = depth.saturating_sub(1),
                DocNode::Delimiter if depth == 0 => out.push(pos),
                _ => {}
            }
        }
        Ok(out)
    }

    /// Instantiates template entries for one iteration, registering the
    /// created controls and nested repeat shells.
    fn instantiate(
        &mut self,
        entries: &[TemplateEntry],
        suffix: &str,
        form_id: &str,
        out: &mut Vec<DocNode>,
    ) {
        for entry in entries {
            match entry {
                TemplateEntry::Control { id, kind } => {
                    let instance = suffixed_id(id, suffix);
                    self.controls
                        .insert(instance.clone(), ControlNode::new(*kind, form_id.to_string()));
                    out.push(DocNode::Control(instance));
                }
                TemplateEntry::Repeat { id, template } => {
                    let instance = suffixed_id(id, suffix);
                    self.repeats.insert(
                        instance.clone(),
                        RepeatMeta {
                            base_id: id.clone(),
                            form_id: form_id.to_string(),
                        },
                    );
                    self.templates
                        .entry(id.clone())
                        .or_insert_with(|| template.clone());
                    out.push(DocNode::RepeatBegin(instance.clone()));
                    out.push(DocNode::RepeatEnd(instance));
                }
            }
        }
    }

    /// Unregisters every control and repeat instance in a removed range.
    fn unregister_range(&mut self, removed: &[DocNode]) {
        for node in removed {
            match node {
                DocNode::Control(id) => {
                    self.controls.remove(id);
                }
                DocNode::RepeatBegin(id) => {
                    self.repeats.remove(id);
                    self.highlights.remove(id);
                }
                _ => {}
            }
        }
    }
}

impl FormDom for MemoryDom {
    fn exists(&self, id: &str) -> bool {
        let inner = self.inner.read();
        inner.controls.contains_key(id) || inner.repeats.contains_key(id) || inner.forms.contains_key(id)
    }

    fn nearest_form(&self, id: &str) -> Option<String> {
        let inner = self.inner.read();
        if inner.forms.contains_key(id) {
            return Some(id.to_string());
        }
        inner
            .controls
            .get(id)
            .map(|c| c.form_id.clone())
            .or_else(|| inner.repeats.get(id).map(|r| r.form_id.clone()))
    }

    fn control_kind(&self, id: &str) -> Option<ControlKind> {
        self.inner.read().controls.get(id).map(|c| c.kind)
    }

    fn value(&self, id: &str) -> Option<String> {
        let inner = self.inner.read();
        let control = inner.controls.get(id)?;
        match control.kind {
            ControlKind::Trigger => None,
            ControlKind::Select => Some(control.selected.join(" ")),
            _ => Some(control.value.clone()),
        }
    }

    fn set_value(&self, id: &str, value: &str) -> Result<(), DomError> {
        let mut inner = self.inner.write();
        let control = inner.control_mut(id)?;
        match control.kind {
            ControlKind::Trigger => Err(DomError::Unsupported {
                id: id.to_string(),
                operation: "set_value",
            }),
            ControlKind::Select => {
                // Normalizing write: a value absent from the itemset
                // collapses to an empty selection.
                let known = flatten_values(&control.items);
                control.selected = value
                    .split_whitespace()
                    .filter(|v| known.contains(*v))
                    .map(ToString::to_string)
                    .collect();
                Ok(())
            }
            _ => {
                control.value = value.to_string();
                Ok(())
            }
        }
    }

    fn set_marker(&self, id: &str, marker: Marker, on: bool) -> Result<(), DomError> {
        let mut inner = self.inner.write();
        let control = inner.control_mut(id)?;
        if on {
            control.markers.insert(marker);
        } else {
            control.markers.remove(&marker);
        }
        Ok(())
    }

    fn has_marker(&self, id: &str, marker: Marker) -> bool {
        self.inner
            .read()
            .controls
            .get(id)
            .is_some_and(|c| c.markers.contains(&marker))
    }

    fn set_text(&self, id: &str, part: LabelPart, text: &str) -> Result<(), DomError> {
        let mut inner = self.inner.write();
        let control = inner.control_mut(id)?;
        let slot = match part {
            LabelPart::Label => &mut control.label,
            LabelPart::Hint => &mut control.hint,
            LabelPart::Help => &mut control.help,
            LabelPart::Alert => &mut control.alert,
        };
        *slot = Some(text.to_string());
        Ok(())
    }

    fn selected_values(&self, id: &str) -> Vec<String> {
        self.inner
            .read()
            .controls
            .get(id)
            .map(|c| c.selected.clone())
            .unwrap_or_default()
    }

    fn set_items(&self, id: &str, items: &[Item]) -> Result<(), DomError> {
        let mut inner = self.inner.write();
        let control = inner.control_mut(id)?;
        if control.kind != ControlKind::Select {
            return Err(DomError::Unsupported {
                id: id.to_string(),
                operation: "set_items",
            });
        }
        let known = flatten_values(items);
        control.selected.retain(|v| known.contains(v.as_str()));
        control.items = items.to_vec();
        Ok(())
    }

    fn change_type(&self, id: &str, new_type: &str) -> Result<(), DomError> {
        let mut inner = self.inner.write();
        let control = inner.control_mut(id)?;
        control.control_type = new_type.to_string();
        // Recreation resets the value: the new control starts blank.
        control.value.clear();
        control.selected.clear();
        Ok(())
    }

    fn focus(&self, id: &str) {
        let mut inner = self.inner.write();
        if inner.controls.contains_key(id) {
            inner.focused = Some(id.to_string());
        }
    }

    fn deferred_container_of(&self, id: &str) -> Option<String> {
        self.inner
            .read()
            .controls
            .get(id)
            .and_then(|c| c.deferred_container.clone())
    }

    fn copy_repeat_template(&self, repeat_id: &str, start: u32, end: u32) -> Result<(), DomError> {
        let mut inner = self.inner.write();
        let (form_id, _, _) = inner.repeat_span(repeat_id)?;
        let form_id = form_id.to_string();
        let base_id = inner.repeats[repeat_id].base_id.clone();
        let template = inner
            .templates
            .get(&base_id)
            .cloned()
            .ok_or_else(|| DomError::NoTemplate {
                id: repeat_id.to_string(),
            })?;
        let parent_indexes = split_id(repeat_id).1.unwrap_or("").to_string();

        for iteration in start..=end {
            let suffix = iteration_suffix(&parent_indexes, iteration);
            let mut fresh = vec![DocNode::Delimiter];
            inner.instantiate(&template, &suffix, &form_id, &mut fresh);
            // Insertion point recomputed per iteration: each insert moves
            // the end marker.
            let (_, _, end_pos) = inner.repeat_span(repeat_id)?;
            let nodes = inner.forms.get_mut(&form_id).ok_or_else(|| {
                DomError::NoSuchRepeat {
                    id: repeat_id.to_string(),
                }
            })?;
            nodes.splice(end_pos..end_pos, fresh);
        }
        Ok(())
    }

    fn delete_repeat_iterations(&self, repeat_id: &str, count: u32) -> Result<(), DomError> {
        if count == 0 {
            return Ok(());
        }
        let mut inner = self.inner.write();
        let (form_id, _, end_pos) = inner.repeat_span(repeat_id)?;
        let form_id = form_id.to_string();
        let nodes = &inner.forms[&form_id];

        // Walk backward from the end marker. A nested repeat's end marker
        // raises the depth and its begin marker lowers it, so inner
        // delimiters never terminate an outer iteration early.
        let mut depth = 0u32;
        let mut found = 0u32;
        let mut cut_from = None;
        for pos in (0..end_pos).rev() {
            match &nodes[pos] {
                DocNode::RepeatEnd(_) => depth += 1,
                DocNode::RepeatBegin(id) => {
                    if depth == 0 {
                        // Reached this repeat's own begin marker.
                        debug_assert_eq!(id, repeat_id);
                        break;
                    }
                    depth -= 1;
                }
                DocNode::Delimiter if depth == 0 => {
                    found += 1;
                    if found == count {
                        cut_from = Some(pos);
                        break;
                    }
                }
                _ => {}
            }
        }

        let Some(cut_from) = cut_from else {
            return Err(DomError::TooFewIterations {
                id: repeat_id.to_string(),
                available: found,
                requested: count,
            });
        };
        let removed: Vec<DocNode> = inner
            .forms
            .get_mut(&form_id)
            .map(|nodes| nodes.splice(cut_from..end_pos, std::iter::empty()).collect())
            .unwrap_or_default();
        inner.unregister_range(&removed);
        Ok(())
    }

    fn set_iteration_relevance(
        &self,
        repeat_id: &str,
        iteration: u32,
        relevant: bool,
    ) -> Result<(), DomError> {
        let mut inner = self.inner.write();
        let delimiters = inner.own_delimiters(repeat_id)?;
        let (form_id, _, end_pos) = inner.repeat_span(repeat_id)?;
        let form_id = form_id.to_string();
        let index = iteration.saturating_sub(1) as usize;
        let Some(&from) = delimiters.get(index) else {
            return Err(DomError::TooFewIterations {
                id: repeat_id.to_string(),
                available: u32::try_from(delimiters.len()).unwrap_or(u32::MAX),
                requested: iteration,
            });
        };
        let to = delimiters.get(index + 1).copied().unwrap_or(end_pos);
        let ids: Vec<String> = inner.forms[&form_id][from..to]
            .iter()
            .filter_map(|n| match n {
                DocNode::Control(id) => Some(id.clone()),
                _ => None,
            })
            .collect();
        for id in ids {
            let control = inner.control_mut(&id)?;
            if relevant {
                control.markers.remove(&Marker::Irrelevant);
            } else {
                control.markers.insert(Marker::Irrelevant);
            }
        }
        Ok(())
    }

    fn move_repeat_index(&self, repeat_id: &str, iteration: u32) -> Result<(), DomError> {
        let mut inner = self.inner.write();
        if !inner.repeats.contains_key(repeat_id) {
            return Err(DomError::NoSuchRepeat {
                id: repeat_id.to_string(),
            });
        }
        // Clear-then-set keeps at most one highlighted iteration.
        inner.highlights.remove(repeat_id);
        if iteration > 0 {
            inner.highlights.insert(repeat_id.to_string(), iteration);
        }
        Ok(())
    }

    fn repeat_index(&self, repeat_id: &str) -> Option<u32> {
        let inner = self.inner.read();
        if !inner.repeats.contains_key(repeat_id) {
            return None;
        }
        Some(inner.highlights.get(repeat_id).copied().unwrap_or(0))
    }

    fn iteration_count(&self, repeat_id: &str) -> Option<u32> {
        let inner = self.inner.read();
        let delimiters = inner.own_delimiters(repeat_id).ok()?;
        u32::try_from(delimiters.len()).ok()
    }

    fn delimiter_position(&self, repeat_id: &str, iteration: u32) -> Option<usize> {
        if iteration == 0 {
            return None;
        }
        let inner = self.inner.read();
        let (_, begin, _) = inner.repeat_span(repeat_id).ok()?;
        let delimiters = inner.own_delimiters(repeat_id).ok()?;
        delimiters
            .get(iteration as usize - 1)
            .map(|&pos| pos - begin)
    }
}

fn flatten_values(items: &[Item]) -> HashSet<&str> {
    let mut out = HashSet::new();
    let mut stack: Vec<&Item> = items.iter().collect();
    while let Some(item) = stack.pop() {
        if item.children.is_empty() {
            out.insert(item.value.as_str());
        }
        stack.extend(item.children.iter());
    }
    out
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builds a `MemoryDom` form by form, in document order.
pub struct MemoryDomBuilder {
    inner: Inner,
    current_form: Option<String>,
}

impl MemoryDomBuilder {
    /// Opens a new form; subsequent controls attach to it.
    #[must_use]
    pub fn form(mut self, form_id: impl Into<String>) -> Self {
        let form_id = form_id.into();
        self.inner.forms.entry(form_id.clone()).or_default();
        self.current_form = Some(form_id);
        self
    }

    /// Appends a control with an initial value to the current form.
    ///
    /// # Panics
    ///
    /// Panics if no form has been opened.
    #[must_use]
    pub fn control(
        mut self,
        id: impl Into<String>,
        kind: ControlKind,
        initial_value: impl Into<String>,
    ) -> Self {
        let form_id = self.current_form.clone().expect("no form opened");
        let id = id.into();
        let mut node = ControlNode::new(kind, form_id.clone());
        node.value = initial_value.into();
        self.inner.controls.insert(id.clone(), node);
        self.inner
            .forms
            .get_mut(&form_id)
            .expect("form registered")
            .push(DocNode::Control(id));
        self
    }

    /// Appends a selection control with its initial itemset.
    #[must_use]
    pub fn select(
        self,
        id: impl Into<String>,
        items: Vec<Item>,
        selected: Vec<String>,
    ) -> Self {
        let id = id.into();
        let mut this = self.control(id.clone(), ControlKind::Select, "");
        let control = this.inner.controls.get_mut(&id).expect("just inserted");
        control.items = items;
        control.selected = selected;
        this
    }

    /// Marks the most recently added control as living inside a
    /// default-deferred container.
    ///
    /// # Panics
    ///
    /// Panics if the control is unknown.
    #[must_use]
    pub fn in_deferred_container(mut self, control_id: &str, container: impl Into<String>) -> Self {
        self.inner
            .controls
            .get_mut(control_id)
            .expect("control registered")
            .deferred_container = Some(container.into());
        self
    }

    /// Appends an (initially empty) repeat with its template to the current
    /// form.
    ///
    /// # Panics
    ///
    /// Panics if no form has been opened.
    #[must_use]
    pub fn repeat(mut self, id: impl Into<String>, template: Vec<TemplateEntry>) -> Self {
        let form_id = self.current_form.clone().expect("no form opened");
        let id = id.into();
        self.inner.repeats.insert(
            id.clone(),
            RepeatMeta {
                base_id: id.clone(),
                form_id: form_id.clone(),
            },
        );
        self.inner.templates.insert(id.clone(), template);
        let nodes = self.inner.forms.get_mut(&form_id).expect("form registered");
        nodes.push(DocNode::RepeatBegin(id.clone()));
        nodes.push(DocNode::RepeatEnd(id));
        self
    }

    #[must_use]
    pub fn build(self) -> MemoryDom {
        MemoryDom {
            inner: RwLock::new(self.inner),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
