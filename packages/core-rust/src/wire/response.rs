//! Inbound response document parsing.
//!
//! A response is one of three roots: `event-response` (success, carrying
//! state blobs and action blocks), `error` (a structured permanent failure
//! with title/body), or `exceptions` (a nested server-side exception chain,
//! innermost message reported first).

use crate::error::ProtocolError;
use crate::wire::action::{
    Action, ControlUpdate, DivToggle, Item, ItemsetUpdate, MessageLevel,
};
use crate::wire::xml::{self, XmlNode};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A successfully parsed `event-response`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseDocument {
    /// Replaces the form's dynamic state wholesale when present.
    pub dynamic_state: Option<String>,
    /// Rarely present; replaces the static state when it is.
    pub static_state: Option<String>,
    /// All actions from all `action` blocks, flattened in document order.
    pub actions: Vec<Action>,
}

impl ResponseDocument {
    /// Whether any action in this document submits or replaces the page.
    #[must_use]
    pub fn has_submission(&self) -> bool {
        self.actions
            .iter()
            .any(|a| matches!(a, Action::Submission { .. }))
    }
}

/// Classified server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerResponse {
    Success(ResponseDocument),
    /// Structured permanent failure; surfaced to the user, never retried.
    Error { title: String, body: String },
    /// Server-side exception chain; the innermost message is reported.
    Exception { message: String },
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses a raw response body.
///
/// # Errors
///
/// Returns a [`ProtocolError`] for malformed documents or unknown roots; the
/// transport layer treats that as a transient failure.
pub fn parse_response(input: &str) -> Result<ServerResponse, ProtocolError> {
    let root = xml::parse(input)?;
    match root.name.as_str() {
        "event-response" => Ok(ServerResponse::Success(parse_success(&root)?)),
        "error" => Ok(ServerResponse::Error {
            title: root.child("title").map(|n| n.text.clone()).unwrap_or_default(),
            body: root.child("body").map(|n| n.text.clone()).unwrap_or_default(),
        }),
        "exceptions" => Ok(ServerResponse::Exception {
            message: innermost_message(&root)
                .unwrap_or_else(|| "unknown server exception".to_string()),
        }),
        other => Err(ProtocolError::UnexpectedRoot {
            found: other.to_string(),
        }),
    }
}

fn parse_success(root: &XmlNode) -> Result<ResponseDocument, ProtocolError> {
    let mut doc = ResponseDocument {
        dynamic_state: root.child("dynamic-state").map(|n| n.text.clone()),
        static_state: root.child("static-state").map(|n| n.text.clone()),
        actions: Vec::new(),
    };
    for block in root.children_named("action") {
        for child in &block.children {
            parse_action_into(child, &mut doc.actions)?;
        }
    }
    Ok(doc)
}

/// Finds the text of the deepest `message` descendant (innermost first).
fn innermost_message(node: &XmlNode) -> Option<String> {
    fn walk(node: &XmlNode, depth: usize) -> Option<(usize, String)> {
        let mut best: Option<(usize, String)> = None;
        if node.name == "message" && !node.text.trim().is_empty() {
            best = Some((depth, node.text.trim().to_string()));
        }
        for child in &node.children {
            if let Some(found) = walk(child, depth + 1) {
                if best.as_ref().is_none_or(|b| found.0 >= b.0) {
                    best = Some(found);
                }
            }
        }
        best
    }
    walk(node, 0).map(|(_, message)| message)
}

fn parse_action_into(node: &XmlNode, out: &mut Vec<Action>) -> Result<(), ProtocolError> {
    match node.name.as_str() {
        // Container form: flattened into individual actions, order kept.
        "control-values" => {
            for child in &node.children {
                parse_action_into(child, out)?;
            }
        }
        "control" => out.push(Action::Control(parse_control(node)?)),
        "itemset" => out.push(Action::Itemset(ItemsetUpdate {
            id: required_attr(node, "itemset", "id")?,
            items: node
                .children_named("item")
                .map(parse_item)
                .collect::<Result<_, _>>()?,
        })),
        "repeat-iteration" => out.push(Action::RepeatIteration {
            repeat_id: required_attr(node, "repeat-iteration", "id")?,
            iteration: required_u32(node, "repeat-iteration", "iteration")?,
            relevant: bool_attr(node, "relevant").unwrap_or(true),
        }),
        "divs" => {
            let mut toggles = Vec::new();
            for div in node.children_named("div") {
                toggles.push(DivToggle {
                    id: required_attr(div, "div", "id")?,
                    visible: div.attr("visibility") != Some("hidden"),
                });
            }
            out.push(Action::Divs(toggles));
        }
        "repeat-indexes" => {
            let mut indexes = Vec::new();
            for index in node.children_named("repeat-index") {
                indexes.push((
                    required_attr(index, "repeat-index", "id")?,
                    required_u32(index, "repeat-index", "new-index")?,
                ));
            }
            out.push(Action::RepeatIndexes(indexes));
        }
        "server-events" => out.push(Action::ServerEvents {
            payload: node.text.clone(),
            delay_ms: match node.attr("delay") {
                Some(raw) => Some(raw.parse().map_err(|_| ProtocolError::InvalidNumber {
                    element: "server-events",
                    attribute: "delay",
                    value: raw.to_string(),
                })?),
                None => None,
            },
            discardable: bool_attr(node, "discardable").unwrap_or(false),
            show_progress: bool_attr(node, "show-progress").unwrap_or(true),
        }),
        "submission" => out.push(Action::Submission {
            show_progress: bool_attr(node, "show-progress").unwrap_or(true),
            target: node.attr("target").map(ToString::to_string),
        }),
        "message" => out.push(Action::Message {
            level: if node.attr("level") == Some("modal") {
                MessageLevel::Modal
            } else {
                MessageLevel::Modeless
            },
            text: node.text.clone(),
        }),
        "load" => out.push(Action::Load {
            resource: required_attr(node, "load", "resource")?,
            target: node.attr("target").map(ToString::to_string),
            show_progress: bool_attr(node, "show-progress").unwrap_or(true),
        }),
        "setfocus" => out.push(Action::SetFocus {
            control_id: required_attr(node, "setfocus", "control-id")?,
        }),
        "script" => out.push(Action::Script {
            name: required_attr(node, "script", "name")?,
            target_id: required_attr(node, "script", "target-id")?,
            observer_id: required_attr(node, "script", "observer-id")?,
        }),
        "help" => out.push(Action::Help {
            control_id: required_attr(node, "help", "control-id")?,
        }),
        "offline" => out.push(Action::Offline),
        "copy-repeat-template" => out.push(Action::CopyRepeatTemplate {
            repeat_id: required_attr(node, "copy-repeat-template", "id")?,
            parent_indexes: node.attr("parent-indexes").unwrap_or_default().to_string(),
            start_iteration: required_u32(node, "copy-repeat-template", "start-suffix")?,
            end_iteration: required_u32(node, "copy-repeat-template", "end-suffix")?,
        }),
        "delete-repeat-elements" => out.push(Action::DeleteRepeatElements {
            repeat_id: required_attr(node, "delete-repeat-elements", "id")?,
            parent_indexes: node.attr("parent-indexes").unwrap_or_default().to_string(),
            count: required_u32(node, "delete-repeat-elements", "count")?,
        }),
        other => {
            return Err(ProtocolError::UnknownAction {
                kind: other.to_string(),
            })
        }
    }
    Ok(())
}

fn parse_control(node: &XmlNode) -> Result<ControlUpdate, ProtocolError> {
    Ok(ControlUpdate {
        id: required_attr(node, "control", "id")?,
        // Value lives in a child element so that "absent" (unchanged) and
        // "present but empty" stay distinguishable.
        value: node.child("value").map(|n| n.text.clone()),
        relevant: bool_attr(node, "relevant"),
        readonly: bool_attr(node, "readonly"),
        required: bool_attr(node, "required"),
        valid: bool_attr(node, "valid"),
        control_type: node.attr("type").map(ToString::to_string),
        label: node.attr("label").map(ToString::to_string),
        help: node.attr("help").map(ToString::to_string),
        hint: node.attr("hint").map(ToString::to_string),
        alert: node.attr("alert").map(ToString::to_string),
    })
}

fn parse_item(node: &XmlNode) -> Result<Item, ProtocolError> {
    Ok(Item {
        label: required_attr(node, "item", "label")?,
        value: node.attr("value").unwrap_or_default().to_string(),
        children: node
            .children_named("item")
            .map(parse_item)
            .collect::<Result<_, _>>()?,
    })
}

fn required_attr(
    node: &XmlNode,
    element: &'static str,
    attribute: &'static str,
) -> Result<String, ProtocolError> {
    node.attr(attribute)
        .map(ToString::to_string)
        .ok_or(ProtocolError::MissingAttribute { element, attribute })
}

fn required_u32(
    node: &XmlNode,
    element: &'static str,
    attribute: &'static str,
) -> Result<u32, ProtocolError> {
    let raw = node
        .attr(attribute)
        .ok_or(ProtocolError::MissingAttribute { element, attribute })?;
    raw.parse().map_err(|_| ProtocolError::InvalidNumber {
        element,
        attribute,
        value: raw.to_string(),
    })
}

fn bool_attr(node: &XmlNode, attribute: &str) -> Option<bool> {
    node.attr(attribute).map(|v| v == "true")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_with_states_and_actions() {
        let body = r#"
            <event-response>
                <dynamic-state>dyn-1</dynamic-state>
                <action>
                    <control id="c1" relevant="true"><value>hello</value></control>
                    <itemset id="s1">
                        <item label="One" value="1"/>
                        <item label="Group">
                            <item label="Two" value="2"/>
                        </item>
                    </itemset>
                </action>
            </event-response>"#;
        let ServerResponse::Success(doc) = parse_response(body).unwrap() else {
            panic!("expected success");
        };
        assert_eq!(doc.dynamic_state.as_deref(), Some("dyn-1"));
        assert_eq!(doc.static_state, None);
        assert_eq!(doc.actions.len(), 2);
        let Action::Control(control) = &doc.actions[0] else {
            panic!("expected control");
        };
        assert_eq!(control.value.as_deref(), Some("hello"));
        assert_eq!(control.relevant, Some(true));
        let Action::Itemset(itemset) = &doc.actions[1] else {
            panic!("expected itemset");
        };
        assert_eq!(itemset.items.len(), 2);
        assert_eq!(itemset.items[1].children[0].value, "2");
    }

    #[test]
    fn absent_value_child_means_unchanged() {
        let body = r#"
            <event-response>
                <dynamic-state>d</dynamic-state>
                <action>
                    <control id="a" readonly="true"/>
                    <control id="b"><value/></control>
                </action>
            </event-response>"#;
        let ServerResponse::Success(doc) = parse_response(body).unwrap() else {
            panic!("expected success");
        };
        let Action::Control(a) = &doc.actions[0] else { panic!() };
        let Action::Control(b) = &doc.actions[1] else { panic!() };
        assert_eq!(a.value, None);
        assert_eq!(b.value.as_deref(), Some(""));
    }

    #[test]
    fn control_values_container_is_flattened_in_order() {
        let body = r#"
            <event-response>
                <dynamic-state>d</dynamic-state>
                <action>
                    <control-values>
                        <control id="a"/>
                        <itemset id="s"/>
                        <control id="b"/>
                    </control-values>
                </action>
            </event-response>"#;
        let ServerResponse::Success(doc) = parse_response(body).unwrap() else {
            panic!("expected success");
        };
        let kinds: Vec<_> = doc.actions.iter().map(Action::kind).collect();
        assert_eq!(kinds, ["control", "itemset", "control"]);
    }

    #[test]
    fn parses_structural_actions() {
        let body = r#"
            <event-response>
                <dynamic-state>d</dynamic-state>
                <action>
                    <copy-repeat-template id="rows" parent-indexes="" start-suffix="2" end-suffix="3"/>
                    <delete-repeat-elements id="rows" parent-indexes="" count="1"/>
                    <repeat-iteration id="rows" iteration="2" relevant="false"/>
                    <repeat-indexes>
                        <repeat-index id="rows" new-index="2"/>
                    </repeat-indexes>
                </action>
            </event-response>"#;
        let ServerResponse::Success(doc) = parse_response(body).unwrap() else {
            panic!("expected success");
        };
        assert_eq!(
            doc.actions[0],
            Action::CopyRepeatTemplate {
                repeat_id: "rows".into(),
                parent_indexes: String::new(),
                start_iteration: 2,
                end_iteration: 3,
            }
        );
        assert_eq!(
            doc.actions[3],
            Action::RepeatIndexes(vec![("rows".into(), 2)])
        );
    }

    #[test]
    fn parses_error_document() {
        let body = "<error><title>Session expired</title><body>Please reload.</body></error>";
        assert_eq!(
            parse_response(body).unwrap(),
            ServerResponse::Error {
                title: "Session expired".into(),
                body: "Please reload.".into(),
            }
        );
    }

    #[test]
    fn innermost_exception_message_wins() {
        let body = r#"
            <exceptions>
                <exception>
                    <message>outer wrapper</message>
                    <exception>
                        <message>root cause</message>
                    </exception>
                </exception>
            </exceptions>"#;
        assert_eq!(
            parse_response(body).unwrap(),
            ServerResponse::Exception {
                message: "root cause".into()
            }
        );
    }

    #[test]
    fn unknown_root_is_rejected() {
        assert!(matches!(
            parse_response("<html/>"),
            Err(ProtocolError::UnexpectedRoot { .. })
        ));
    }

    #[test]
    fn unknown_action_kind_is_rejected() {
        let body = r#"
            <event-response>
                <dynamic-state>d</dynamic-state>
                <action><frobnicate id="x"/></action>
            </event-response>"#;
        assert!(matches!(
            parse_response(body),
            Err(ProtocolError::UnknownAction { .. })
        ));
    }

    #[test]
    fn missing_required_attribute_is_reported() {
        let body = r#"
            <event-response>
                <dynamic-state>d</dynamic-state>
                <action><setfocus/></action>
            </event-response>"#;
        assert!(matches!(
            parse_response(body),
            Err(ProtocolError::MissingAttribute {
                element: "setfocus",
                attribute: "control-id",
            })
        ));
    }
}
