//! Liveform Core — event model, client state, repeat tree, and the Ajax wire protocol.

pub mod error;
pub mod event;
pub mod repeat;
pub mod state;
pub mod wire;

pub use error::ProtocolError;
pub use event::{EventName, UiEvent};
pub use repeat::RepeatTree;
pub use state::FormState;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
