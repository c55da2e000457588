//! # Request Metrics
//!
//! Inbound HTTP request instruments:
//! - `requests.total` / `requests.errors` counters
//! - `requests.duration` (ms) and `response.size` (bytes) histograms
//! - `requests.in_flight` observable gauge
//!
//! ## Usage
//!
//! ```rust
//! use service_metrics::metrics::RequestMetrics;
//! use std::time::Instant;
//!
//! # fn main() -> Result<(), service_metrics::MetricsError> {
//! let meter = opentelemetry::global::meter("http-server");
//! let requests = RequestMetrics::new(&meter)?;
//!
//! let start = Instant::now();
//! requests.record_request_start("GET", "/users");
//! // ... handle request ...
//! requests.record_request_end("GET", "/users", 200, 512, start);
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use opentelemetry::metrics::{AsyncInstrument, Counter, Histogram, ObservableGauge};
use opentelemetry::KeyValue;

use super::elapsed_ms;
use super::instruments::{InstrumentFactory, InstrumentSpec};
use crate::error::MetricsResult;

pub const REQUESTS_TOTAL: InstrumentSpec =
    InstrumentSpec::new("requests.total", "Total number of requests received");
pub const REQUESTS_ERRORS: InstrumentSpec = InstrumentSpec::new(
    "requests.errors",
    "Requests completed with a 4xx or 5xx status code",
);
pub const REQUESTS_DURATION: InstrumentSpec =
    InstrumentSpec::new("requests.duration", "Request duration in milliseconds").with_unit("ms");
pub const RESPONSE_SIZE: InstrumentSpec =
    InstrumentSpec::new("response.size", "Response body size in bytes").with_unit("By");
pub const REQUESTS_IN_FLIGHT: InstrumentSpec =
    InstrumentSpec::new("requests.in_flight", "Requests currently being served");

/// Instruments for inbound request tracking.
///
/// Labels:
/// - method, route on every instrument
/// - status_code on errors, duration and size
pub struct RequestMetrics {
    requests_total: Counter<u64>,
    requests_errors: Counter<u64>,
    requests_duration: Histogram<u64>,
    response_size: Histogram<u64>,
    _requests_in_flight: ObservableGauge<i64>,
    in_flight: Arc<AtomicI64>,
}

impl std::fmt::Debug for RequestMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestMetrics")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl RequestMetrics {
    /// Create the request instruments and register the in-flight callback.
    pub fn new(meter: &dyn InstrumentFactory) -> MetricsResult<Self> {
        let requests_total = meter.u64_counter(REQUESTS_TOTAL)?;
        let requests_errors = meter.u64_counter(REQUESTS_ERRORS)?;
        let requests_duration = meter.u64_histogram(REQUESTS_DURATION)?;
        let response_size = meter.u64_histogram(RESPONSE_SIZE)?;

        let in_flight = Arc::new(AtomicI64::new(0));
        let sampled = Arc::clone(&in_flight);
        let requests_in_flight = meter.i64_observable_gauge(
            REQUESTS_IN_FLIGHT,
            Box::new(move |observer: &dyn AsyncInstrument<i64>| {
                // An End racing ahead of its Start must not surface as negative.
                let current = sampled.load(Ordering::Acquire).max(0);
                observer.observe(current, &[]);
            }),
        )?;

        Ok(Self {
            requests_total,
            requests_errors,
            requests_duration,
            response_size,
            _requests_in_flight: requests_in_flight,
            in_flight,
        })
    }

    pub fn record_request_start(&self, method: &str, route: &str) {
        self.requests_total.add(
            1,
            &[
                KeyValue::new("method", method.to_string()),
                KeyValue::new("route", route.to_string()),
            ],
        );
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    /// Record completion: errors for status >= 400, then duration and size.
    pub fn record_request_end(
        &self,
        method: &str,
        route: &str,
        status_code: u16,
        response_size: u64,
        start: Instant,
    ) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        let attributes = [
            KeyValue::new("method", method.to_string()),
            KeyValue::new("route", route.to_string()),
            KeyValue::new("status_code", i64::from(status_code)),
        ];

        if status_code >= 400 {
            self.requests_errors.add(1, &attributes);
        }

        self.requests_duration.record(elapsed_ms(start), &attributes);
        self.response_size.record(response_size, &attributes);
    }

    /// Requests started but not yet ended, as the gauge will report it.
    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::Acquire).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_metrics() -> RequestMetrics {
        let meter = opentelemetry::global::meter("request-metrics-unit");
        RequestMetrics::new(&meter).expect("request metrics")
    }

    #[test]
    fn test_in_flight_tracks_start_and_end() {
        let metrics = request_metrics();
        let start = Instant::now();

        metrics.record_request_start("GET", "/users");
        metrics.record_request_start("POST", "/users");
        assert_eq!(metrics.in_flight(), 2);

        metrics.record_request_end("GET", "/users", 200, 10, start);
        assert_eq!(metrics.in_flight(), 1);
        metrics.record_request_end("POST", "/users", 503, 0, start);
        assert_eq!(metrics.in_flight(), 0);
    }

    #[test]
    fn test_unmatched_end_never_reports_negative() {
        let metrics = request_metrics();
        metrics.record_request_end("GET", "/health", 200, 2, Instant::now());
        assert_eq!(metrics.in_flight(), 0);
    }
}
