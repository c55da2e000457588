//! # Metrics Configuration
//!
//! Immutable configuration consumed by [`MetricsLifecycle::init`](crate::MetricsLifecycle::init).
//!
//! A config starts from three required values (endpoint, service name,
//! environment) and is refined by [`ConfigOption`]s applied in call order; a
//! later option overrides an earlier one for the same field.
//!
//! ```rust
//! use service_metrics::config::{options, HistogramView, MetricsConfig};
//! use std::time::Duration;
//!
//! let config = MetricsConfig::builder("localhost:4317", "billing-api", "staging")
//!     .with(options::push_interval(Duration::from_secs(5)))
//!     .histogram_views(vec![HistogramView::new(
//!         "requests.duration",
//!         vec![5.0, 25.0, 100.0, 500.0],
//!     )])
//!     .build();
//!
//! assert!(config.validate().is_ok());
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{MetricsError, MetricsResult};

pub const DEFAULT_PUSH_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_OTLP_ENDPOINT: &str = "localhost:4317";

/// Explicit histogram bucket boundaries for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramView {
    pub instrument_name: String,
    pub buckets: Vec<f64>,
}

impl HistogramView {
    pub fn new(instrument_name: impl Into<String>, buckets: Vec<f64>) -> Self {
        Self {
            instrument_name: instrument_name.into(),
            buckets,
        }
    }
}

/// Exporter, transport and service identity settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// OTLP gRPC endpoint, `host:port` or a full URI
    pub otlp_endpoint: String,
    pub otlp_insecure: bool,
    /// PEM bundle used to verify the collector when `otlp_insecure` is false
    pub otlp_ca_file: Option<PathBuf>,
    pub push_interval: Duration,
    pub service_name: String,
    pub environment: String,
    pub histogram_views: Vec<HistogramView>,
}

/// A named mutation applied to a [`MetricsConfig`] under construction.
pub type ConfigOption = Box<dyn FnOnce(&mut MetricsConfig) + Send>;

/// Named options, usable with [`MetricsConfigBuilder::with`] or
/// [`MetricsConfig::with_options`].
pub mod options {
    use super::{ConfigOption, HistogramView, MetricsConfig};
    use std::path::PathBuf;
    use std::time::Duration;

    pub fn push_interval(interval: Duration) -> ConfigOption {
        Box::new(move |cfg: &mut MetricsConfig| cfg.push_interval = interval)
    }

    pub fn otlp_insecure(insecure: bool) -> ConfigOption {
        Box::new(move |cfg: &mut MetricsConfig| cfg.otlp_insecure = insecure)
    }

    pub fn otlp_ca_file(path: impl Into<PathBuf>) -> ConfigOption {
        let path = path.into();
        Box::new(move |cfg: &mut MetricsConfig| cfg.otlp_ca_file = Some(path))
    }

    pub fn histogram_views(views: Vec<HistogramView>) -> ConfigOption {
        Box::new(move |cfg: &mut MetricsConfig| cfg.histogram_views = views)
    }
}

impl MetricsConfig {
    /// Base config with defaults: 10s push interval, insecure transport, no views.
    pub fn new(
        otlp_endpoint: impl Into<String>,
        service_name: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            otlp_endpoint: otlp_endpoint.into(),
            otlp_insecure: true,
            otlp_ca_file: None,
            push_interval: DEFAULT_PUSH_INTERVAL,
            service_name: service_name.into(),
            environment: environment.into(),
            histogram_views: Vec::new(),
        }
    }

    pub fn builder(
        otlp_endpoint: impl Into<String>,
        service_name: impl Into<String>,
        environment: impl Into<String>,
    ) -> MetricsConfigBuilder {
        MetricsConfigBuilder {
            base: Self::new(otlp_endpoint, service_name, environment),
            options: Vec::new(),
        }
    }

    /// Apply options in order, consuming and returning the config.
    pub fn with_options(mut self, options: impl IntoIterator<Item = ConfigOption>) -> Self {
        for option in options {
            option(&mut self);
        }
        self
    }

    /// Build a config from the standard OTEL environment variables.
    ///
    /// - `OTEL_EXPORTER_OTLP_ENDPOINT` (default: localhost:4317)
    /// - `OTEL_SERVICE_NAME` (no default, validation rejects an empty name)
    /// - `DEPLOYMENT_ENVIRONMENT`, then `APP_ENV` (default: development)
    /// - `METRICS_PUSH_INTERVAL_SECS` (default: 10)
    /// - `OTEL_EXPORTER_OTLP_INSECURE` (default: true)
    /// - `OTEL_EXPORTER_OTLP_CERTIFICATE` (CA file for secure mode)
    pub fn from_env() -> Self {
        let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string());
        let service_name = std::env::var("OTEL_SERVICE_NAME").unwrap_or_default();
        let environment = std::env::var("DEPLOYMENT_ENVIRONMENT")
            .or_else(|_| std::env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let mut builder = Self::builder(endpoint, service_name, environment);

        if let Some(secs) = std::env::var("METRICS_PUSH_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            builder = builder.push_interval(Duration::from_secs(secs));
        }
        if let Ok(v) = std::env::var("OTEL_EXPORTER_OTLP_INSECURE") {
            builder = builder.otlp_insecure(v.to_lowercase() != "false");
        }
        if let Ok(path) = std::env::var("OTEL_EXPORTER_OTLP_CERTIFICATE") {
            if !path.is_empty() {
                builder = builder.otlp_ca_file(path);
            }
        }

        builder.build()
    }

    /// Check required fields and view definitions.
    ///
    /// Runs before any global state is touched, on every init call.
    pub fn validate(&self) -> MetricsResult<()> {
        if self.otlp_endpoint.is_empty() {
            return Err(MetricsError::configuration(
                "OTLPEndpoint is required (e.g. 'localhost:4317')",
            ));
        }
        if self.service_name.is_empty() {
            return Err(MetricsError::configuration("ServiceName is required"));
        }
        if self.environment.is_empty() {
            return Err(MetricsError::configuration(
                "Environment is required (e.g. 'dev', 'staging', 'prod')",
            ));
        }
        if self.push_interval.is_zero() {
            return Err(MetricsError::configuration(
                "PushInterval must be greater than 0",
            ));
        }
        let has_ca_file = self
            .otlp_ca_file
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty());
        if !self.otlp_insecure && !has_ca_file {
            return Err(MetricsError::configuration(
                "CA file required for secure mode",
            ));
        }

        for view in &self.histogram_views {
            if view.instrument_name.is_empty() {
                return Err(MetricsError::configuration(
                    "found a CustomHistogramView with empty InstrumentName",
                ));
            }
            if view.buckets.len() < 2 {
                return Err(MetricsError::configuration(format!(
                    "found a CustomHistogramView with less than 2 Buckets ({})",
                    view.instrument_name
                )));
            }
            let ascending = view
                .buckets
                .windows(2)
                .all(|pair| pair[0].is_finite() && pair[1].is_finite() && pair[0] < pair[1]);
            if !ascending {
                return Err(MetricsError::configuration(format!(
                    "CustomHistogramView buckets must be finite and strictly ascending ({})",
                    view.instrument_name
                )));
            }
        }

        Ok(())
    }
}

/// Collects options and applies them, in order, on [`build`](Self::build).
pub struct MetricsConfigBuilder {
    base: MetricsConfig,
    options: Vec<ConfigOption>,
}

impl std::fmt::Debug for MetricsConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsConfigBuilder")
            .field("base", &self.base)
            .field("options", &self.options.len())
            .finish()
    }
}

impl MetricsConfigBuilder {
    pub fn with(mut self, option: ConfigOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn push_interval(self, interval: Duration) -> Self {
        self.with(options::push_interval(interval))
    }

    pub fn otlp_insecure(self, insecure: bool) -> Self {
        self.with(options::otlp_insecure(insecure))
    }

    pub fn otlp_ca_file(self, path: impl Into<PathBuf>) -> Self {
        self.with(options::otlp_ca_file(path))
    }

    pub fn histogram_views(self, views: Vec<HistogramView>) -> Self {
        self.with(options::histogram_views(views))
    }

    pub fn build(self) -> MetricsConfig {
        self.base.with_options(self.options)
    }
}
