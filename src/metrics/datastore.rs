//! # Data Store Metrics
//!
//! Database call instruments:
//! - `db.calls.total` counter (db_system, operation, table)
//! - `db.calls.errors` counter (+ error_type from [`classify_error`])
//! - `db.calls.duration` histogram in milliseconds (+ error flag)
//!
//! ## Usage
//!
//! ```rust
//! use service_metrics::metrics::DataStoreMetrics;
//! use std::time::Instant;
//!
//! # fn main() -> Result<(), service_metrics::MetricsError> {
//! let meter = opentelemetry::global::meter("repository");
//! let db = DataStoreMetrics::new(&meter)?;
//!
//! let start = Instant::now();
//! db.record_call("postgresql", "SELECT", "users");
//! let result: Result<(), std::io::Error> = Ok(());
//! db.finish_call(
//!     "postgresql",
//!     "SELECT",
//!     "users",
//!     result.as_ref().err().map(|e| e as &(dyn std::error::Error + 'static)),
//!     start,
//! );
//! # Ok(())
//! # }
//! ```

use std::error::Error as StdError;
use std::time::Instant;

use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::KeyValue;

use super::elapsed_ms;
use super::instruments::{InstrumentFactory, InstrumentSpec};
use crate::classify::classify_error;
use crate::error::MetricsResult;

pub const DB_CALLS_TOTAL: InstrumentSpec =
    InstrumentSpec::new("db.calls.total", "Total number of database calls");
pub const DB_CALLS_ERRORS: InstrumentSpec =
    InstrumentSpec::new("db.calls.errors", "Database calls that returned an error");
pub const DB_CALLS_DURATION: InstrumentSpec =
    InstrumentSpec::new("db.calls.duration", "Database call duration in milliseconds")
        .with_unit("ms");

#[derive(Clone)]
pub struct DataStoreMetrics {
    calls_total: Counter<u64>,
    calls_errors: Counter<u64>,
    calls_duration: Histogram<u64>,
}

impl DataStoreMetrics {
    pub fn new(meter: &dyn InstrumentFactory) -> MetricsResult<Self> {
        Ok(Self {
            calls_total: meter.u64_counter(DB_CALLS_TOTAL)?,
            calls_errors: meter.u64_counter(DB_CALLS_ERRORS)?,
            calls_duration: meter.u64_histogram(DB_CALLS_DURATION)?,
        })
    }

    pub fn record_call(&self, db_system: &str, operation: &str, table: &str) {
        self.calls_total.add(1, &call_attributes(db_system, operation, table));
    }

    /// Record the outcome of a call started with [`record_call`](Self::record_call).
    pub fn finish_call(
        &self,
        db_system: &str,
        operation: &str,
        table: &str,
        err: Option<&(dyn StdError + 'static)>,
        start: Instant,
    ) {
        let [system_kv, operation_kv, table_kv] = call_attributes(db_system, operation, table);

        if err.is_some() {
            self.calls_errors.add(
                1,
                &[
                    system_kv.clone(),
                    operation_kv.clone(),
                    table_kv.clone(),
                    KeyValue::new("error_type", classify_error(err)),
                ],
            );
        }

        self.calls_duration.record(
            elapsed_ms(start),
            &[
                system_kv,
                operation_kv,
                table_kv,
                KeyValue::new("error", err.is_some()),
            ],
        );
    }
}

fn call_attributes(db_system: &str, operation: &str, table: &str) -> [KeyValue; 3] {
    [
        KeyValue::new("db_system", db_system.to_string()),
        KeyValue::new("operation", operation.to_string()),
        KeyValue::new("table", table.to_string()),
    ]
}
