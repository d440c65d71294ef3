//! Observability features: metrics and tracing.
//!
//! - **Metrics**: Counters, gauges, and histograms via `metrics-rs`
//! - **Tracing**: Structured logging and spans via `tracing`
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `mxdispatch_sessions_opened` | Counter | Sessions bound (init and clone), by kind and backend |
//! | `mxdispatch_sessions_closed` | Counter | Bound sessions closed |
//! | `mxdispatch_sessions_active` | Gauge | Sessions currently bound |
//! | `mxdispatch_candidates_rejected` | Counter | Catalog candidates rejected, by reason |
//! | `mxdispatch_unavailable_calls` | Counter | Calls to absent operations, by family and op |
//! | `mxdispatch_init_time_ns` | Histogram | Backend selection time, by outcome |
//!
//! ## Tracing
//!
//! Spans cover backend selection (`init`), the bound session (`session`),
//! and optionally every dispatched call (`call`); see [`TracingConfig`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use mxdispatch::observability::init_metrics;
//!
//! // Call once at startup; install any metrics exporter to collect them.
//! init_metrics();
//! ```

mod metrics;
mod tracing_support;

pub use metrics::{
    InitTimer, SessionMetrics, init_metrics, record_candidate_rejected, record_init_time,
    record_unavailable_call,
};
pub use tracing_support::{
    TracingConfig, span_init, span_session, trace_candidate_rejected,
    trace_state_change, trace_teardown_error,
};
