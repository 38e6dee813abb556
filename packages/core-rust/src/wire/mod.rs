//! The Ajax wire protocol: request encoding and response parsing.

pub mod action;
pub mod request;
pub mod response;
pub mod xml;

pub use action::{Action, ApplyPass, ControlUpdate, DivToggle, Item, ItemsetUpdate, MessageLevel};
pub use request::EventRequest;
pub use response::{parse_response, ResponseDocument, ServerResponse};
