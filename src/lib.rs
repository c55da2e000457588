#![allow(clippy::doc_markdown)] // Allow technical terms like OpenTelemetry, OTLP in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Service Metrics
//!
//! A small facade that standardizes how a service records operational
//! telemetry and ships it to an OTLP collector at a fixed cadence.
//!
//! ## Overview
//!
//! - [`lifecycle`] - process-wide init-once / shutdown-once ownership of the
//!   OpenTelemetry meter provider, and meter access
//! - [`metrics`] - instrument groups for HTTP requests, database calls,
//!   outbound dependency calls and process health, plus [`MetricsRegistry`]
//! - [`classify`] - stable error categories used as `error_type` tags
//! - [`config`] - exporter, transport and service identity settings
//! - [`logging`] - default console subscriber for the crate's `tracing` events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use service_metrics::{
//!     get_meter, init_metrics, shutdown_metrics, MetricsConfig, MetricsRegistry,
//! };
//! use std::time::{Duration, Instant};
//!
//! # async fn example() -> Result<(), service_metrics::MetricsError> {
//! let config = MetricsConfig::builder("localhost:4317", "billing-api", "prod")
//!     .push_interval(Duration::from_secs(15))
//!     .build();
//! init_metrics(config).await?;
//!
//! let metrics = MetricsRegistry::new(&get_meter("billing-api"))?;
//!
//! let start = Instant::now();
//! metrics.request.record_request_start("GET", "/invoices");
//! metrics.request.record_request_end("GET", "/invoices", 200, 2048, start);
//!
//! shutdown_metrics(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod metrics;

pub use classify::{classify, classify_error, ContextError, ErrorCategory, NetworkError};
pub use config::{options, ConfigOption, HistogramView, MetricsConfig, MetricsConfigBuilder};
pub use error::{MetricsError, MetricsResult};
pub use lifecycle::{
    get_meter, init_metrics, is_initialized, shutdown_metrics, MetricsBackend, MetricsLifecycle,
    OtlpBackend, SKIP_FLUSH_ENV,
};
pub use metrics::{
    DataStoreMetrics, DependencyMetrics, InstrumentFactory, MetricsRegistry, ProcessMetrics,
    RequestMetrics,
};
