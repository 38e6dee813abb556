//! Repeated-section hierarchy and iteration id grammar.
//!
//! The tree's shape (which repeat is nested under which) is fixed for the
//! lifetime of the page; only iteration counts and indices change. It is
//! built once at page load from a JSON bootstrap blob mapping each repeat id
//! to its parent repeat id (`null` for top-level repeats).

use std::collections::HashMap;

/// Separator between a base control id and its iteration suffix.
pub const ITERATION_SEPARATOR: char = '\u{2299}'; // ⊙

/// Separator between nested iteration indexes within a suffix.
pub const INDEX_SEPARATOR: char = '-';

// ---------------------------------------------------------------------------
// Iteration id grammar
// ---------------------------------------------------------------------------

/// Builds the iteration suffix for an iteration under `parent_indexes`.
///
/// `parent_indexes` is empty for top-level repeats; for nested repeats it is
/// the already-joined indexes of the enclosing iterations ("2" or "2-1").
#[must_use]
pub fn iteration_suffix(parent_indexes: &str, iteration: u32) -> String {
    if parent_indexes.is_empty() {
        iteration.to_string()
    } else {
        format!("{parent_indexes}{INDEX_SEPARATOR}{iteration}")
    }
}

/// Appends an iteration suffix to a base id.
///
/// A first-level suffix is attached with the iteration separator; an id that
/// already carries a suffix (a control inside a nested repeat template) gets
/// the new index appended at one depth deeper.
#[must_use]
pub fn suffixed_id(id: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        id.to_string()
    } else if id.contains(ITERATION_SEPARATOR) {
        format!("{id}{INDEX_SEPARATOR}{suffix}")
    } else {
        format!("{id}{ITERATION_SEPARATOR}{suffix}")
    }
}

/// Splits an id into its base and iteration suffix, if it carries one.
#[must_use]
pub fn split_id(id: &str) -> (&str, Option<&str>) {
    match id.split_once(ITERATION_SEPARATOR) {
        Some((base, suffix)) => (base, Some(suffix)),
        None => (id, None),
    }
}

// ---------------------------------------------------------------------------
// RepeatTree
// ---------------------------------------------------------------------------

/// Parent/descendant mapping over repeated-section ids.
#[derive(Debug, Clone, Default)]
pub struct RepeatTree {
    parents: HashMap<String, Option<String>>,
    children: HashMap<String, Vec<String>>,
}

impl RepeatTree {
    /// Builds the tree from a child → parent map.
    #[must_use]
    pub fn from_parent_map(parents: HashMap<String, Option<String>>) -> Self {
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for (child, parent) in &parents {
            if let Some(parent) = parent {
                children.entry(parent.clone()).or_default().push(child.clone());
            }
        }
        // Deterministic child order keeps cascades reproducible.
        for list in children.values_mut() {
            list.sort();
        }
        Self { parents, children }
    }

    /// Parses the page-load bootstrap blob: a JSON object mapping each
    /// repeat id to its parent repeat id or `null`.
    ///
    /// # Errors
    ///
    /// Returns the underlying JSON error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let parents: HashMap<String, Option<String>> = serde_json::from_str(json)?;
        Ok(Self::from_parent_map(parents))
    }

    /// Whether `repeat_id` is a known repeated section.
    #[must_use]
    pub fn contains(&self, repeat_id: &str) -> bool {
        self.parents.contains_key(repeat_id)
    }

    /// The parent repeat of `repeat_id`, if it is nested.
    #[must_use]
    pub fn parent(&self, repeat_id: &str) -> Option<&str> {
        self.parents.get(repeat_id).and_then(|p| p.as_deref())
    }

    /// Direct children of `repeat_id`.
    #[must_use]
    pub fn children(&self, repeat_id: &str) -> &[String] {
        self.children.get(repeat_id).map_or(&[], Vec::as_slice)
    }

    /// All transitive descendant repeats of `repeat_id`, depth-first.
    #[must_use]
    pub fn descendants(&self, repeat_id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack: Vec<&str> = self.children(repeat_id).iter().map(String::as_str).collect();
        while let Some(id) = stack.pop() {
            out.push(id.to_string());
            stack.extend(self.children(id).iter().map(String::as_str));
        }
        out
    }

    /// All repeat ids in the tree.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.parents.keys().map(String::as_str)
    }
}
