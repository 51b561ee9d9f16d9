//! Loader-time options for [`crate::Container`].

use std::time::Duration;

use chrono::Duration as ChronoDuration;

/// Options accepted by [`crate::Container::connect`] / [`crate::Container::new`].
///
/// Field-level docs below give each default.
#[derive(Debug, Clone)]
pub struct ContainerOptions {
    /// Sliding window, relative to "now", used to select the backlog for a
    /// fresh subscription that supplied no `starting_event_id`. Default: 5 minutes.
    pub recently_queued_events_threshold: ChronoDuration,

    /// How long the live loop accumulates notification ids before fetching
    /// and emitting them as a batch. Default: 100ms.
    pub flush_queue_wait_time: Duration,

    /// Bound on each poll of the end-channel at the top of the live loop.
    /// Default: 10ms.
    pub end_signal_wait_time: Duration,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            recently_queued_events_threshold: ChronoDuration::minutes(5),
            flush_queue_wait_time: Duration::from_millis(100),
            end_signal_wait_time: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = ContainerOptions::default();
        assert_eq!(opts.recently_queued_events_threshold, ChronoDuration::minutes(5));
        assert_eq!(opts.flush_queue_wait_time, Duration::from_millis(100));
        assert_eq!(opts.end_signal_wait_time, Duration::from_millis(10));
    }
}
