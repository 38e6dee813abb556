//! Client runtime error taxonomy.

use liveform_core::ProtocolError;

/// Errors surfaced by DOM collaborator operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("no element with id '{id}'")]
    NoSuchElement { id: String },

    #[error("no repeat with id '{id}'")]
    NoSuchRepeat { id: String },

    #[error("repeat '{id}' has no template to clone")]
    NoTemplate { id: String },

    #[error("repeat '{id}' has only {available} iterations, cannot delete {requested}")]
    TooFewIterations {
        id: String,
        available: u32,
        requested: u32,
    },

    #[error("control '{id}' does not support operation '{operation}'")]
    Unsupported { id: String, operation: &'static str },
}

/// Errors from one transport exchange attempt.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The exchange could not even be initiated (bad endpoint, request
    /// construction failure). Not retried.
    #[error("failed to initiate request: {0}")]
    Invalid(String),

    /// The exchange failed in a way that may be transient (connection
    /// reset, timeout, navigation abort). Retried with backoff.
    #[error("network failure: {0}")]
    Network(#[from] anyhow::Error),
}

/// Top-level client errors, per the failure taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("form '{form_id}' is not registered")]
    FormNotRegistered { form_id: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Dom(#[from] DomError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Structured permanent error document from the server. Never retried.
    #[error("server error: {title}")]
    PermanentServerError { title: String, body: String },

    /// Structured server-side exception chain.
    #[error("server exception: {message}")]
    ServerException { message: String },
}
