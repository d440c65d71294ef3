//! Metrics collection using metrics-rs.

use metrics::{Counter, Gauge, Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const SESSIONS_OPENED: &str = "mxdispatch_sessions_opened";
const SESSIONS_CLOSED: &str = "mxdispatch_sessions_closed";
const SESSIONS_ACTIVE: &str = "mxdispatch_sessions_active";
const CANDIDATES_REJECTED: &str = "mxdispatch_candidates_rejected";
const UNAVAILABLE_CALLS: &str = "mxdispatch_unavailable_calls";
const INIT_TIME_NS: &str = "mxdispatch_init_time_ns";

/// Initialize metrics descriptions.
///
/// Call this once at application startup. Safe to call multiple times.
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        SESSIONS_OPENED,
        Unit::Count,
        "Sessions bound to a backend (init and clone)"
    );
    metrics::describe_counter!(SESSIONS_CLOSED, Unit::Count, "Bound sessions closed");
    metrics::describe_gauge!(SESSIONS_ACTIVE, Unit::Count, "Sessions currently bound");
    metrics::describe_counter!(
        CANDIDATES_REJECTED,
        Unit::Count,
        "Catalog candidates rejected during init"
    );
    metrics::describe_counter!(
        UNAVAILABLE_CALLS,
        Unit::Count,
        "Calls to operations the bound backend does not provide"
    );
    metrics::describe_histogram!(
        INIT_TIME_NS,
        Unit::Nanoseconds,
        "Time to select and bind a backend"
    );
}

/// Record a catalog candidate rejected during init.
#[inline]
pub fn record_candidate_rejected(reason: &'static str) {
    counter!(CANDIDATES_REJECTED, "reason" => reason).increment(1);
}

/// Record a call to an operation that is absent from the function table.
#[inline]
pub fn record_unavailable_call(family: &'static str, op: &'static str) {
    counter!(UNAVAILABLE_CALLS, "family" => family, "op" => op).increment(1);
}

/// Record how long an init took.
#[inline]
pub fn record_init_time(outcome: &'static str, duration: Duration) {
    histogram!(INIT_TIME_NS, "outcome" => outcome).record(duration.as_nanos() as f64);
}

/// Metrics of sessions bound to one backend.
///
/// Counters are bound to the backend labels once and shared by the
/// session's clones.
#[derive(Clone)]
pub struct SessionMetrics {
    kind: &'static str,
    backend: String,
    opened: Counter,
    closed: Counter,
    active: Gauge,
}

impl SessionMetrics {
    /// Create a collector for sessions of `kind` served by `backend`.
    pub fn new(kind: &'static str, backend: &str) -> Self {
        Self {
            kind,
            backend: backend.to_string(),
            opened: counter!(SESSIONS_OPENED, "kind" => kind, "backend" => backend.to_string()),
            closed: counter!(SESSIONS_CLOSED, "kind" => kind, "backend" => backend.to_string()),
            active: gauge!(SESSIONS_ACTIVE, "kind" => kind, "backend" => backend.to_string()),
        }
    }

    /// Record a session bound to the backend.
    #[inline]
    pub fn record_opened(&self) {
        self.opened.increment(1);
        self.active.increment(1.0);
    }

    /// Record a bound session closed.
    #[inline]
    pub fn record_closed(&self) {
        self.closed.increment(1);
        self.active.decrement(1.0);
    }

    /// Implementation kind label.
    pub fn kind(&self) -> &str {
        self.kind
    }

    /// Backend name label.
    pub fn backend(&self) -> &str {
        &self.backend
    }
}

/// Guard that records init time when dropped.
///
/// The outcome defaults to `"failed"` until [`InitTimer::succeeded`] is
/// called.
pub struct InitTimer {
    start: Instant,
    outcome: &'static str,
}

impl InitTimer {
    /// Start timing an init.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            outcome: "failed",
        }
    }

    /// Mark the init as successful.
    pub fn succeeded(&mut self) {
        self.outcome = "ok";
    }

    /// Time elapsed so far.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for InitTimer {
    fn drop(&mut self) {
        record_init_time(self.outcome, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_session_metrics() {
        let metrics = SessionMetrics::new("software", "pseudo-software");

        metrics.record_opened();
        metrics.record_closed();

        assert_eq!(metrics.kind(), "software");
        assert_eq!(metrics.backend(), "pseudo-software");
    }

    #[test]
    fn test_init_timer() {
        let mut timer = InitTimer::start();
        std::thread::sleep(Duration::from_millis(1));
        assert!(timer.elapsed() >= Duration::from_millis(1));
        timer.succeeded();
        // Records on drop.
    }

    #[test]
    fn test_global_recording_functions() {
        // No recorder installed; must not panic.
        record_candidate_rejected("version");
        record_unavailable_call("video", "EncodeGetEncodeStat");
        record_init_time("ok", Duration::from_micros(10));
    }
}
