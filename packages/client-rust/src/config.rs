//! Client runtime configuration.

use std::collections::HashSet;
use std::time::Duration;

use liveform_core::EventName;

/// Tunables for batching, indicator, and retry behavior.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Debounce window for incremental events (e.g. keystrokes).
    pub incremental_delay: Duration,
    /// Once the oldest queued event is older than this, incremental
    /// debouncing stops and the flush is forced on the short delay.
    pub force_incremental_threshold: Duration,
    /// Short delay before a non-incremental flush, letting near-simultaneous
    /// browser events (blur+change+focus) coalesce into one batch.
    pub coalesce_delay: Duration,
    /// How long a request must be outstanding before the busy indicator
    /// shows. A fast response never shows the indicator at all.
    pub indicator_delay: Duration,
    /// Per-attempt increment of the transport retry delay.
    pub retry_delay_increment: Duration,
    /// Upper bound on the transport retry delay.
    pub retry_max_delay: Duration,
    /// Event names dropped outright by the collapsing pass.
    pub filtered_events: HashSet<EventName>,
    /// When set, flushes are gated on the presence of an activating event.
    pub deferred_mode: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            incremental_delay: Duration::from_millis(500),
            force_incremental_threshold: Duration::from_millis(2000),
            coalesce_delay: Duration::from_millis(20),
            indicator_delay: Duration::from_millis(500),
            retry_delay_increment: Duration::from_secs(5),
            retry_max_delay: Duration::from_secs(30),
            filtered_events: HashSet::new(),
            deferred_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.incremental_delay, Duration::from_millis(500));
        assert_eq!(config.force_incremental_threshold, Duration::from_millis(2000));
        assert_eq!(config.coalesce_delay, Duration::from_millis(20));
        assert_eq!(config.indicator_delay, Duration::from_millis(500));
        assert_eq!(config.retry_delay_increment, Duration::from_secs(5));
        assert_eq!(config.retry_max_delay, Duration::from_secs(30));
        assert!(config.filtered_events.is_empty());
        assert!(!config.deferred_mode);
    }
}
