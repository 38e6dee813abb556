//! Wire protocol error types.

/// Errors produced while encoding or parsing the Ajax wire documents.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed document at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    #[error("unexpected root element <{found}>")]
    UnexpectedRoot { found: String },

    #[error("element <{element}> is missing required attribute '{attribute}'")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    #[error("element <{element}> is missing required child <{child}>")]
    MissingChild {
        element: &'static str,
        child: &'static str,
    },

    #[error("attribute '{attribute}' on <{element}> is not a number: {value}")]
    InvalidNumber {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },

    #[error("unknown action kind <{kind}>")]
    UnknownAction { kind: String },
}
