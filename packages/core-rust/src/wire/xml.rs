//! Minimal reader/writer for the Ajax wire dialect.
//!
//! The protocol uses a small, fixed subset of XML: elements, double-quoted
//! attributes, character data, the five named entities, numeric character
//! references, comments, and an optional XML declaration. Nothing else
//! (namespaces, CDATA, doctypes) appears on the wire, so nothing else is
//! accepted.

use crate::error::ProtocolError;

// ---------------------------------------------------------------------------
// Escaping
// ---------------------------------------------------------------------------

/// Escapes character data for element content (`&`, `<`, `>`).
#[must_use]
pub fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

/// Escapes an attribute value (adds `"` to the text escapes).
#[must_use]
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A parsed element: name, attributes, child elements, and the
/// concatenation of its direct character data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    pub text: String,
}

impl XmlNode {
    /// First attribute with the given name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child element with the given name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All child elements with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parses a complete document, returning its root element.
///
/// # Errors
///
/// Returns `ProtocolError::Malformed` with a byte offset for any input
/// outside the accepted subset.
pub fn parse(input: &str) -> Result<XmlNode, ProtocolError> {
    let mut cursor = Cursor { src: input, pos: 0 };
    cursor.skip_prolog()?;
    let root = cursor.parse_element()?;
    cursor.skip_ws_and_comments()?;
    if cursor.pos < cursor.src.len() {
        return Err(cursor.malformed("trailing content after root element"));
    }
    Ok(root)
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn malformed(&self, reason: &str) -> ProtocolError {
        ProtocolError::Malformed {
            offset: self.pos,
            reason: reason.to_string(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn eat(&mut self, prefix: &str) -> bool {
        if self.rest().starts_with(prefix) {
            self.pos += prefix.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn skip_comment(&mut self) -> Result<(), ProtocolError> {
        match self.rest().find("-->") {
            Some(end) => {
                self.pos += end + 3;
                Ok(())
            }
            None => Err(self.malformed("unterminated comment")),
        }
    }

    fn skip_ws_and_comments(&mut self) -> Result<(), ProtocolError> {
        loop {
            self.skip_ws();
            if self.rest().starts_with("<!--") {
                self.skip_comment()?;
            } else {
                return Ok(());
            }
        }
    }

    fn skip_prolog(&mut self) -> Result<(), ProtocolError> {
        self.skip_ws();
        if self.rest().starts_with("<?") {
            match self.rest().find("?>") {
                Some(end) => self.pos += end + 2,
                None => return Err(self.malformed("unterminated XML declaration")),
            }
        }
        self.skip_ws_and_comments()
    }

    fn parse_name(&mut self) -> Result<String, ProtocolError> {
        let rest = self.rest();
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'))
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(self.malformed("expected a name"));
        }
        self.pos += end;
        Ok(rest[..end].to_string())
    }

    fn parse_element(&mut self) -> Result<XmlNode, ProtocolError> {
        if !self.eat("<") {
            return Err(self.malformed("expected '<'"));
        }
        let name = self.parse_name()?;
        let mut node = XmlNode {
            name,
            ..XmlNode::default()
        };

        loop {
            self.skip_ws();
            if self.eat("/>") {
                return Ok(node);
            }
            if self.eat(">") {
                break;
            }
            let attr_name = self.parse_name()?;
            self.skip_ws();
            if !self.eat("=") {
                return Err(self.malformed("expected '=' after attribute name"));
            }
            self.skip_ws();
            if !self.eat("\"") {
                return Err(self.malformed("expected '\"' to open attribute value"));
            }
            let rest = self.rest();
            let end = rest
                .find('"')
                .ok_or_else(|| self.malformed("unterminated attribute value"))?;
            let value_start = self.pos;
            self.pos += end + 1;
            let value = unescape(&rest[..end], value_start)?;
            node.attrs.push((attr_name, value));
        }

        // Content: interleaved character data, comments, and child elements,
        // terminated by the matching close tag.
        loop {
            let rest = self.rest();
            match rest.find('<') {
                None => return Err(self.malformed("unterminated element")),
                Some(lt) => {
                    if lt > 0 {
                        let text_start = self.pos;
                        node.text.push_str(&unescape(&rest[..lt], text_start)?);
                        self.pos += lt;
                    }
                }
            }
            // Only the comment itself is skipped here; whitespace around it
            // is character data.
            if self.rest().starts_with("<!--") {
                self.skip_comment()?;
                continue;
            }
            if self.eat("</") {
                let close = self.parse_name()?;
                if close != node.name {
                    return Err(self.malformed(&format!(
                        "mismatched close tag </{close}> for <{}>",
                        node.name
                    )));
                }
                self.skip_ws();
                if !self.eat(">") {
                    return Err(self.malformed("expected '>' to end close tag"));
                }
                return Ok(node);
            }
            node.children.push(self.parse_element()?);
        }
    }
}

/// Decodes entity and character references in character data.
fn unescape(raw: &str, offset: usize) -> Result<String, ProtocolError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let semi = rest.find(';').ok_or(ProtocolError::Malformed {
            offset: offset + (raw.len() - rest.len()),
            reason: "unterminated entity reference".to_string(),
        })?;
        let entity = &rest[1..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse))
                    .and_then(Result::ok)
                    .and_then(char::from_u32);
                match code {
                    Some(c) => out.push(c),
                    None => {
                        return Err(ProtocolError::Malformed {
                            offset: offset + (raw.len() - rest.len()),
                            reason: format!("unknown entity '&{entity};'"),
                        })
                    }
                }
            }
        }
        rest = &rest[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
