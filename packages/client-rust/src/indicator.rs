//! Busy indicator controller.
//!
//! The indicator is delayed: it only appears when a request has been
//! outstanding longer than the configured delay, so fast responses never
//! flash it. Rendering is delegated to an [`IndicatorSink`]; the controller
//! owns the show/hide timing and the error state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Rendering surface for the indicator. All methods default to no-ops.
pub trait IndicatorSink: Send + Sync {
    /// Shows the loading panel, optionally with a custom message.
    fn show_loading(&self, _message: Option<&str>) {}

    /// Hides whatever the indicator currently shows.
    fn hide(&self) {}

    /// Replaces the indicator with a permanent error panel.
    fn show_error(&self, _title: &str, _body: &str) {}
}

/// Sink that renders nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullIndicator;

impl IndicatorSink for NullIndicator {}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// What the indicator currently displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayState {
    Hidden,
    /// A request is outstanding but the delay has not elapsed.
    Pending,
    /// The loading panel is visible.
    Loading,
    /// The error panel is visible; only an explicit dismiss clears it.
    Error,
}

pub struct IndicatorController {
    sink: Arc<dyn IndicatorSink>,
    delay: Duration,
    state: Mutex<DisplayState>,
    /// Bumped on every transition so a stale delay timer can tell it lost.
    epoch: AtomicU64,
}

impl IndicatorController {
    #[must_use]
    pub fn new(sink: Arc<dyn IndicatorSink>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            sink,
            delay,
            state: Mutex::new(DisplayState::Hidden),
            epoch: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn state(&self) -> DisplayState {
        self.state.lock().clone()
    }

    /// A request went out. When `show_progress` is set, arms the delay
    /// timer; the panel appears only if the request is still outstanding
    /// when it fires.
    pub fn request_started(self: &Arc<Self>, show_progress: bool, message: Option<String>) {
        if !show_progress {
            return;
        }
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.lock();
            if *state == DisplayState::Error {
                return;
            }
            *state = DisplayState::Pending;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.delay).await;
            if this.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            let mut state = this.state.lock();
            if *state == DisplayState::Pending {
                *state = DisplayState::Loading;
                this.sink.show_loading(message.as_deref());
            }
        });
    }

    /// The request cycle completed; dismisses the panel unless it shows an
    /// error.
    pub fn request_finished(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if *state == DisplayState::Error {
            return;
        }
        if *state == DisplayState::Loading {
            self.sink.hide();
        }
        *state = DisplayState::Hidden;
    }

    /// Shows the permanent error panel. Stays up until `dismiss_error`.
    pub fn show_error(&self, title: &str, body: &str) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = DisplayState::Error;
        self.sink.show_error(title, body);
    }

    /// Explicit user dismissal of the error panel.
    pub fn dismiss_error(&self) {
        let mut state = self.state.lock();
        if *state == DisplayState::Error {
            self.sink.hide();
            *state = DisplayState::Hidden;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fast_response_never_shows_the_panel() {
        let controller = IndicatorController::new(Arc::new(NullIndicator), Duration::from_millis(500));
        controller.request_started(true, None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.request_finished();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(controller.state(), DisplayState::Hidden);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_response_shows_after_the_delay() {
        let controller = IndicatorController::new(Arc::new(NullIndicator), Duration::from_millis(500));
        controller.request_started(true, None);
        tokio::time::sleep(Duration::from_millis(499)).await;
        assert_eq!(controller.state(), DisplayState::Pending);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(controller.state(), DisplayState::Loading);
        controller.request_finished();
        assert_eq!(controller.state(), DisplayState::Hidden);
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_request_arms_nothing() {
        let controller = IndicatorController::new(Arc::new(NullIndicator), Duration::from_millis(500));
        controller.request_started(false, None);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(controller.state(), DisplayState::Hidden);
    }

    #[tokio::test(start_paused = true)]
    async fn error_panel_outlives_request_completion() {
        let controller = IndicatorController::new(Arc::new(NullIndicator), Duration::from_millis(500));
        controller.show_error("Server error", "boom");
        controller.request_finished();
        assert_eq!(controller.state(), DisplayState::Error);
        controller.dismiss_error();
        assert_eq!(controller.state(), DisplayState::Hidden);
    }
}
