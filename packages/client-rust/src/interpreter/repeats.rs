//! Repeat index moves and their cascade.

use std::collections::HashSet;

use liveform_core::RepeatTree;

use crate::dom::FormDom;
use crate::error::ClientError;

/// Applies a `repeat-indexes` action.
///
/// Every named repeat moves to its new index. Descendant repeats the action
/// does not name cascade: a non-empty descendant resets to its first
/// iteration, an empty one loses its highlight. Descendants without a
/// live instance in the document are skipped.
///
/// # Errors
///
/// Fails when a named repeat does not exist.
pub fn apply_indexes(
    dom: &dyn FormDom,
    tree: &RepeatTree,
    moves: &[(String, u32)],
) -> Result<(), ClientError> {
    let named: HashSet<&str> = moves.iter().map(|(id, _)| id.as_str()).collect();
    for (repeat_id, index) in moves {
        dom.move_repeat_index(repeat_id, *index)?;
        for descendant in tree.descendants(repeat_id) {
            if named.contains(descendant.as_str()) {
                continue;
            }
            if dom.repeat_index(&descendant).is_none() {
                continue;
            }
            let reset = match dom.iteration_count(&descendant) {
                Some(n) if n > 0 => 1,
                _ => 0,
            };
            dom.move_repeat_index(&descendant, reset)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDom, TemplateEntry};

    fn fixture() -> (MemoryDom, RepeatTree) {
        let dom = MemoryDom::builder()
            .form("f1")
            .repeat("rows", vec![TemplateEntry::input("row-input")])
            .repeat("side", vec![TemplateEntry::input("side-input")])
            .build();
        dom.copy_repeat_template("rows", 1, 3).unwrap();
        dom.copy_repeat_template("side", 1, 2).unwrap();
        let tree =
            RepeatTree::from_json(r#"{"rows": null, "side": "rows"}"#).unwrap();
        (dom, tree)
    }

    #[test]
    fn named_moves_apply() {
        let (dom, tree) = fixture();
        apply_indexes(&dom, &tree, &[("rows".into(), 2), ("side".into(), 2)]).unwrap();
        assert_eq!(dom.repeat_index("rows"), Some(2));
        assert_eq!(dom.repeat_index("side"), Some(2));
    }

    #[test]
    fn unnamed_descendants_reset_to_first_iteration() {
        let (dom, tree) = fixture();
        dom.move_repeat_index("side", 2).unwrap();
        apply_indexes(&dom, &tree, &[("rows".into(), 3)]).unwrap();
        assert_eq!(dom.repeat_index("rows"), Some(3));
        assert_eq!(dom.repeat_index("side"), Some(1));
    }

    #[test]
    fn empty_descendants_lose_their_highlight() {
        let dom = MemoryDom::builder()
            .form("f1")
            .repeat("rows", vec![TemplateEntry::input("row-input")])
            .repeat("side", vec![TemplateEntry::input("side-input")])
            .build();
        dom.copy_repeat_template("rows", 1, 1).unwrap();
        let tree =
            RepeatTree::from_json(r#"{"rows": null, "side": "rows"}"#).unwrap();
        apply_indexes(&dom, &tree, &[("rows".into(), 1)]).unwrap();
        assert_eq!(dom.repeat_index("side"), Some(0));
    }

    #[test]
    fn unknown_named_repeat_is_an_error() {
        let (dom, tree) = fixture();
        assert!(apply_indexes(&dom, &tree, &[("ghost".into(), 1)]).is_err());
    }
}
