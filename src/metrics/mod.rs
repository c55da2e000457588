//! # Instrument Groups
//!
//! Domain-specific instrument groups, each built from a Meter in one step:
//! - `request`: inbound HTTP traffic, including an in-flight gauge
//! - `datastore`: database calls
//! - `dependency`: outbound calls to other services
//! - `process`: runtime health gauges
//!
//! [`MetricsRegistry`] builds all four at once.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use service_metrics::{get_meter, init_metrics, MetricsConfig, MetricsRegistry};
//!
//! # async fn example() -> Result<(), service_metrics::MetricsError> {
//! init_metrics(MetricsConfig::new("localhost:4317", "billing-api", "prod")).await?;
//!
//! let meter = get_meter("billing-api");
//! let metrics = MetricsRegistry::new(&meter)?;
//! metrics.request.record_request_start("GET", "/invoices");
//! # Ok(())
//! # }
//! ```

use std::time::Instant;

use tracing::info;

use crate::error::MetricsResult;

pub mod datastore;
pub mod dependency;
pub mod instruments;
pub mod process;
pub mod request;

pub use datastore::DataStoreMetrics;
pub use dependency::DependencyMetrics;
pub use instruments::{GaugeCallback, InstrumentFactory, InstrumentSpec};
pub use process::{ProcessMetrics, ProcessSample, ProcessSampler};
pub use request::RequestMetrics;

/// Whole milliseconds elapsed since `start`.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Every instrument group of a service.
pub struct MetricsRegistry {
    pub request: RequestMetrics,
    pub datastore: DataStoreMetrics,
    pub dependency: DependencyMetrics,
    pub process: ProcessMetrics,
}

impl MetricsRegistry {
    /// Build the groups in order: request, datastore, dependency, process.
    ///
    /// The first group that fails aborts construction and its error is
    /// returned as is.
    pub fn new(meter: &dyn InstrumentFactory) -> MetricsResult<Self> {
        let request = RequestMetrics::new(meter)?;
        let datastore = DataStoreMetrics::new(meter)?;
        let dependency = DependencyMetrics::new(meter)?;
        let process = ProcessMetrics::new(meter)?;

        info!("Successfully created all metric instruments");

        Ok(Self {
            request,
            datastore,
            dependency,
            process,
        })
    }
}
