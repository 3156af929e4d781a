//! Request spans and timing.

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{info_span, Instrument, Span};

/// Span covering one HTTP call.
pub fn request_span(method: &str, url: &str) -> Span {
    info_span!("request", method = %method, url = %url, status = tracing::field::Empty)
}

/// Record the response status on a span from [`request_span`].
pub fn record_status(span: &Span, status: u16) {
    span.record("status", status);
}

/// Instrument a future with a span.
pub fn instrument_future<F: Future>(future: F, span: Span) -> impl Future<Output = F::Output> {
    future.instrument(span)
}

/// Wall-clock timer for an operation.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    operation: String,
}

impl Timer {
    /// Start a new timer.
    pub fn start(operation: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.into(),
        }
    }

    /// Time elapsed so far.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer, log and return the duration.
    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        tracing::debug!(
            operation = %self.operation,
            duration_ms = %duration.as_millis(),
            "operation completed"
        );
        duration
    }
}
