//! Tracing integration for structured logging and spans.

use tracing::{Level, Span, span};

/// Configuration for tracing behavior.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether to create spans for session init and teardown.
    pub session_spans: bool,
    /// Whether to create a span for every dispatched call.
    pub call_spans: bool,
    /// Level of call spans.
    pub level: Level,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            session_spans: true,
            call_spans: false, // one span per frame adds up
            level: Level::TRACE,
        }
    }
}

impl TracingConfig {
    /// Create a new tracing config with all spans enabled.
    pub fn all() -> Self {
        Self {
            session_spans: true,
            call_spans: true,
            level: Level::DEBUG,
        }
    }

    /// Create a minimal config (session spans only).
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Disable all spans.
    pub fn none() -> Self {
        Self {
            session_spans: false,
            call_spans: false,
            level: Level::TRACE,
        }
    }

    /// Span for the init of session `id`, or a disabled span.
    pub fn init_span(&self, id: u64, kind: &str, version: &str) -> Span {
        if self.session_spans {
            span_init(id, kind, version)
        } else {
            Span::none()
        }
    }

    /// Span for the lifetime of session `id`, or a disabled span.
    pub fn session_span(&self, id: u64, backend: &str) -> Span {
        if self.session_spans {
            span_session(id, backend)
        } else {
            Span::none()
        }
    }

    /// Span for one dispatched call, or a disabled span.
    #[inline]
    pub fn call_span(&self, id: u64, op: &'static str) -> Span {
        if !self.call_spans {
            return Span::none();
        }
        match self.level {
            Level::TRACE => span!(Level::TRACE, "call", session = id, op = op),
            Level::DEBUG => span!(Level::DEBUG, "call", session = id, op = op),
            _ => span!(Level::INFO, "call", session = id, op = op),
        }
    }
}

/// Create a span for a bound session.
///
/// # Example
///
/// ```rust,ignore
/// use mxdispatch::observability::span_session;
///
/// let span = span_session(1, "pseudo");
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_session(id: u64, backend: &str) -> Span {
    span!(Level::INFO, "session", id = id, backend = %backend)
}

/// Create a span for backend selection.
#[inline]
pub fn span_init(id: u64, kind: &str, version: &str) -> Span {
    span!(Level::DEBUG, "init", session = id, kind = %kind, version = %version)
}

/// Log a rejected catalog candidate.
#[inline]
pub fn trace_candidate_rejected(candidate: &str, reason: &str, detail: &dyn std::fmt::Display) {
    tracing::debug!(
        candidate = %candidate,
        reason = %reason,
        detail = %detail,
        "candidate rejected"
    );
}

/// Log a session state change.
#[inline]
pub fn trace_state_change(id: u64, from: &str, to: &str) {
    tracing::debug!(
        session = id,
        from = %from,
        to = %to,
        "session state changed"
    );
}

/// Log a backend failure during teardown.
#[inline]
pub fn trace_teardown_error(id: u64, step: &str, error: &dyn std::error::Error) {
    tracing::warn!(
        session = id,
        step = %step,
        error = %error,
        "teardown step failed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert!(config.session_spans);
        assert!(!config.call_spans);
    }

    #[test]
    fn test_tracing_config_all() {
        let config = TracingConfig::all();
        assert!(config.session_spans);
        assert!(config.call_spans);
    }

    #[test]
    fn test_tracing_config_none() {
        let config = TracingConfig::none();
        assert!(!config.session_spans);
        assert!(!config.call_spans);
        assert!(config.init_span(1, "any", "1.0").is_none());
        assert!(config.call_span(1, "Init").is_none());
    }

    #[test]
    fn test_span_creation() {
        let _span = span_session(1, "pseudo");
        let _span = span_init(1, "software", "2.1");
        let _span = TracingConfig::all().call_span(1, "EncodeFrameAsync");
    }

    #[test]
    fn test_trace_functions() {
        // Must not panic without a subscriber.
        trace_candidate_rejected("libmx_hw.so", "version", &"1.0 < 2.0");
        trace_state_change(1, "Uninitialized", "Loading");
        trace_teardown_error(1, "encode_close", &crate::Error::UndefinedBehavior);
    }
}
