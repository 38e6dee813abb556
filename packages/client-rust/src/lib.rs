//! Liveform client runtime.
//!
//! Drives the server conversation for one page: queues and batches UI
//! events, encodes them into `event-request` documents, sends them over a
//! retrying transport (one request in flight at a time), and interprets the
//! response actions into DOM mutations through the [`dom::FormDom`] trait.
//!
//! The crate is host-agnostic: a browser embedding implements `FormDom`,
//! [`dom::ClientObserver`] and [`indicator::IndicatorSink`] over the real
//! page; tests and native hosts use the bundled in-memory document.

pub mod client;
pub mod config;
pub mod dom;
pub mod error;
pub mod indicator;
pub mod interpreter;
pub mod queue;
pub mod transport;

pub use client::{AjaxClient, FormInit};
pub use config::ClientConfig;
pub use dom::{ClientObserver, ControlKind, FormDom, LabelPart, Marker, NullObserver};
pub use error::{ClientError, DomError, TransportError};
pub use indicator::{DisplayState, IndicatorController, IndicatorSink, NullIndicator};
pub use transport::{HttpTransport, Transport};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Compilation of the public surface is the test.
    }
}
