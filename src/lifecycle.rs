//! Host-visible presence while downloads are active.
//!
//! The host (a terminal spinner, a desktop notification, ...) implements
//! [`Presence`]. [`LifecycleSignal`] starts it when the first download is
//! admitted and stops it once no item is downloading or extracting.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

/// Host hook shown while downloads run.
pub trait Presence: Send + Sync + fmt::Debug {
    /// Makes the presence visible.
    fn start(&self);
    /// Hides the presence.
    fn stop(&self);
}

/// Presence that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPresence;

impl Presence for TracingPresence {
    fn start(&self) {
        info!("downloads active");
    }

    fn stop(&self) {
        info!("all downloads finished");
    }
}

/// Guards a [`Presence`] against duplicate starts and stops.
#[derive(Debug, Clone)]
pub struct LifecycleSignal {
    presence: Arc<dyn Presence>,
    visible: Arc<AtomicBool>,
}

impl LifecycleSignal {
    /// Wraps `presence`, initially hidden.
    #[must_use]
    pub fn new(presence: Arc<dyn Presence>) -> Self {
        Self {
            presence,
            visible: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Starts the presence unless it is already visible.
    pub fn ensure_started(&self) {
        if !self.visible.swap(true, Ordering::AcqRel) {
            self.presence.start();
        }
    }

    /// Brings the presence in line with `has_active`.
    ///
    /// A caller may compute `has_active` before a concurrent
    /// [`LifecycleSignal::ensure_started`] and apply it after, so a later
    /// `refresh(true)` has to be able to start the presence again.
    pub fn refresh(&self, has_active: bool) {
        if has_active {
            self.ensure_started();
        } else if self.visible.swap(false, Ordering::AcqRel) {
            self.presence.stop();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Debug, Default)]
    struct CountingPresence {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl Presence for CountingPresence {
        fn start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CountingPresence {
        fn counts(&self) -> (usize, usize) {
            (
                self.starts.load(Ordering::SeqCst),
                self.stops.load(Ordering::SeqCst),
            )
        }
    }

    #[test]
    fn test_lifecycle_start_is_idempotent() {
        let presence = Arc::new(CountingPresence::default());
        let signal = LifecycleSignal::new(presence.clone());
        signal.ensure_started();
        signal.ensure_started();
        assert_eq!(presence.counts(), (1, 0));
    }

    #[test]
    fn test_lifecycle_stops_only_when_idle() {
        let presence = Arc::new(CountingPresence::default());
        let signal = LifecycleSignal::new(presence.clone());
        signal.refresh(false);
        assert_eq!(presence.counts(), (0, 0), "never started");

        signal.ensure_started();
        signal.refresh(true);
        assert_eq!(presence.counts(), (1, 0));
        signal.refresh(false);
        signal.refresh(false);
        assert_eq!(presence.counts(), (1, 1));
    }

    #[test]
    fn test_lifecycle_restarts_after_stale_idle_refresh() {
        let presence = Arc::new(CountingPresence::default());
        let signal = LifecycleSignal::new(presence.clone());
        signal.ensure_started();

        // A watcher read "idle" just before a new download called
        // ensure_started, then applied the stale value.
        signal.ensure_started();
        signal.refresh(false);
        assert_eq!(presence.counts(), (1, 1));

        signal.refresh(true);
        assert_eq!(presence.counts(), (2, 1));
        signal.refresh(true);
        assert_eq!(presence.counts(), (2, 1));
    }
}
