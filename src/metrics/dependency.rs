//! # Dependency Metrics
//!
//! Outbound calls to other services:
//! - `external.calls.total` counter (target_service, method)
//! - `external.calls.errors` counter (+ error_type)
//! - `external.calls.duration` histogram in milliseconds (+ error flag)

use std::error::Error as StdError;
use std::time::Instant;

use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;

use super::elapsed_ms;
use super::instruments::{InstrumentFactory, InstrumentSpec};
use crate::classify::classify_error;
use crate::error::MetricsResult;

pub const EXTERNAL_CALLS_TOTAL: InstrumentSpec =
    InstrumentSpec::new("external.calls.total", "Total number of outbound calls");
pub const EXTERNAL_CALLS_ERRORS: InstrumentSpec =
    InstrumentSpec::new("external.calls.errors", "Outbound calls that returned an error");
pub const EXTERNAL_CALLS_DURATION: InstrumentSpec = InstrumentSpec::new(
    "external.calls.duration",
    "Outbound call latency in milliseconds",
)
.with_unit("ms");

#[derive(Clone)]
pub struct DependencyMetrics {
    calls_total: Counter<u64>,
    calls_errors: Counter<u64>,
    calls_latency: Histogram<u64>,
}

impl DependencyMetrics {
    pub fn new(meter: &dyn InstrumentFactory) -> MetricsResult<Self> {
        Ok(Self {
            calls_total: meter.u64_counter(EXTERNAL_CALLS_TOTAL)?,
            calls_errors: meter.u64_counter(EXTERNAL_CALLS_ERRORS)?,
            calls_latency: meter.u64_histogram(EXTERNAL_CALLS_DURATION)?,
        })
    }

    pub fn record_call(&self, target_service: &str, method: &str) {
        self.calls_total.add(
            1,
            &[
                KeyValue::new("target_service", target_service.to_string()),
                KeyValue::new("method", method.to_string()),
            ],
        );
    }

    pub fn finish_call(
        &self,
        target_service: &str,
        method: &str,
        err: Option<&(dyn StdError + 'static)>,
        start: Instant,
    ) {
        let service_kv = KeyValue::new("target_service", target_service.to_string());
        let method_kv = KeyValue::new("method", method.to_string());

        if err.is_some() {
            self.calls_errors.add(
                1,
                &[
                    service_kv.clone(),
                    method_kv.clone(),
                    KeyValue::new("error_type", classify_error(err)),
                ],
            );
        }

        self.calls_latency.record(
            elapsed_ms(start),
            &[service_kv, method_kv, KeyValue::new("error", err.is_some())],
        );
    }
}
