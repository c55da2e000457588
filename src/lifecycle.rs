//! # Metrics Lifecycle
//!
//! Owns the meter provider for a process: one initialization, one shutdown,
//! and meter access in between.
//!
//! - `init` validates the config on every call, then builds the provider at
//!   most once. Every caller, concurrent or later, gets the first attempt's
//!   outcome. A construction failure is therefore final for the process.
//! - `meter` hands out meters from the live provider, or from the global
//!   (no-op unless installed) provider when not initialized, so instruments can
//!   be created before or without initialization.
//! - `shutdown` flushes and stops the provider at most once. Calling it before
//!   initialization is a no-op that leaves the shutdown available.
//!
//! ## Configuration
//!
//! - `METRICS_SKIP_FLUSH=1` - read at shutdown; drop the provider state without
//!   flushing. Intended for tests and environments without a collector.
//!
//! [`MetricsLifecycle::new`] gives an independent context for dependency
//! injection. [`MetricsLifecycle::global`] (used by [`init_metrics`],
//! [`get_meter`] and [`shutdown_metrics`]) is the process-wide instance and
//! also installs its provider as the OpenTelemetry global.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry::{InstrumentationScope, KeyValue};
use opentelemetry_otlp::tonic_types::transport::{Certificate, ClientTlsConfig};
use opentelemetry_otlp::{MetricExporter, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::metrics::{
    Aggregation, Instrument, MeterProviderBuilder, PeriodicReader, SdkMeterProvider, Stream,
};
use opentelemetry_sdk::Resource;
use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::{HistogramView, MetricsConfig};
use crate::error::{MetricsError, MetricsResult};

/// Environment switch that bypasses the flush on shutdown.
pub const SKIP_FLUSH_ENV: &str = "METRICS_SKIP_FLUSH";

/// Attaches a reader (and so an exporter) to the provider under construction.
///
/// The lifecycle owns the resource, views and provider; a backend only decides
/// where measurements go.
pub trait MetricsBackend: Send + Sync {
    fn attach(
        &self,
        builder: MeterProviderBuilder,
        config: &MetricsConfig,
    ) -> MetricsResult<MeterProviderBuilder>;
}

/// OTLP over gRPC, pushed by a periodic reader at `config.push_interval`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtlpBackend;

impl OtlpBackend {
    fn exporter(config: &MetricsConfig) -> MetricsResult<MetricExporter> {
        let builder = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint_uri(config));

        let builder = if config.otlp_insecure {
            builder
        } else {
            let ca_file = config.otlp_ca_file.as_deref().ok_or_else(|| {
                MetricsError::configuration("CA file required for secure mode")
            })?;
            let pem = std::fs::read(ca_file).map_err(|e| {
                MetricsError::Exporter(format!(
                    "failed to load CA file {}: {e}",
                    ca_file.display()
                ))
            })?;
            if !String::from_utf8_lossy(&pem).contains("-----BEGIN CERTIFICATE-----") {
                return Err(MetricsError::Exporter(format!(
                    "failed to load CA file {}: no PEM certificate found",
                    ca_file.display()
                )));
            }
            builder.with_tls_config(
                ClientTlsConfig::new().ca_certificate(Certificate::from_pem(pem)),
            )
        };

        builder
            .build()
            .map_err(|e| MetricsError::Exporter(e.to_string()))
    }
}

impl MetricsBackend for OtlpBackend {
    fn attach(
        &self,
        builder: MeterProviderBuilder,
        config: &MetricsConfig,
    ) -> MetricsResult<MeterProviderBuilder> {
        let exporter = Self::exporter(config)?;
        let reader = PeriodicReader::builder(exporter)
            .with_interval(config.push_interval)
            .build();
        Ok(builder.with_reader(reader))
    }
}

/// Tonic wants a URI; accept the bare `host:port` form as well.
fn endpoint_uri(config: &MetricsConfig) -> String {
    if config.otlp_endpoint.contains("://") {
        config.otlp_endpoint.clone()
    } else if config.otlp_insecure {
        format!("http://{}", config.otlp_endpoint)
    } else {
        format!("https://{}", config.otlp_endpoint)
    }
}

fn build_resource(config: &MetricsConfig) -> Resource {
    let mut attributes = vec![KeyValue::new(
        "deployment.environment",
        config.environment.clone(),
    )];
    if let Some(host) = sysinfo::System::host_name() {
        attributes.push(KeyValue::new("host.name", host));
    }

    Resource::builder()
        .with_service_name(config.service_name.clone())
        .with_attributes(attributes)
        .build()
}

fn apply_histogram_views(
    mut builder: MeterProviderBuilder,
    views: &[HistogramView],
) -> MeterProviderBuilder {
    for view in views {
        let instrument_name = view.instrument_name.clone();
        let boundaries = view.buckets.clone();
        builder = builder.with_view(move |instrument: &Instrument| {
            if instrument.name() != instrument_name {
                return None;
            }
            Stream::builder()
                .with_aggregation(Aggregation::ExplicitBucketHistogram {
                    boundaries: boundaries.clone(),
                    record_min_max: true,
                })
                .build()
                .ok()
        });
    }
    builder
}

fn skip_flush_requested() -> bool {
    std::env::var(SKIP_FLUSH_ENV).is_ok_and(|v| v == "1")
}

#[derive(Default)]
struct LifecycleState {
    initialized: bool,
    provider: Option<SdkMeterProvider>,
    /// Provider released without a flush; kept so dropping it cannot export.
    _retired: Option<SdkMeterProvider>,
}

/// Init-once / shutdown-once owner of a meter provider.
pub struct MetricsLifecycle {
    backend: Arc<dyn MetricsBackend>,
    install_global: bool,
    init_once: OnceCell<MetricsResult<()>>,
    shutdown_once: OnceCell<MetricsResult<()>>,
    state: RwLock<LifecycleState>,
}

impl std::fmt::Debug for MetricsLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsLifecycle")
            .field("initialized", &self.is_initialized())
            .field("install_global", &self.install_global)
            .finish_non_exhaustive()
    }
}

static GLOBAL_LIFECYCLE: OnceLock<MetricsLifecycle> = OnceLock::new();

impl MetricsLifecycle {
    /// Independent lifecycle; never touches the OpenTelemetry global.
    pub fn new(backend: Arc<dyn MetricsBackend>) -> Self {
        Self {
            backend,
            install_global: false,
            init_once: OnceCell::new(),
            shutdown_once: OnceCell::new(),
            state: RwLock::new(LifecycleState::default()),
        }
    }

    pub fn otlp() -> Self {
        Self::new(Arc::new(OtlpBackend))
    }

    /// The process-wide lifecycle, exporting over OTLP.
    pub fn global() -> &'static MetricsLifecycle {
        GLOBAL_LIFECYCLE.get_or_init(|| Self {
            install_global: true,
            ..Self::otlp()
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }

    /// Validate `config` and, on the first call only, build and install the provider.
    pub async fn init(&self, config: MetricsConfig) -> MetricsResult<()> {
        config.validate()?;

        if self.init_once.initialized() {
            debug!("Metrics already initialized - returning first outcome");
        }

        self.init_once
            .get_or_init(|| self.build_provider(&config))
            .await
            .clone()
    }

    async fn build_provider(&self, config: &MetricsConfig) -> MetricsResult<()> {
        let builder = SdkMeterProvider::builder().with_resource(build_resource(config));
        let builder = apply_histogram_views(builder, &config.histogram_views);
        let provider = self.backend.attach(builder, config)?.build();

        if self.install_global {
            opentelemetry::global::set_meter_provider(provider.clone());
        }

        {
            let mut state = self.state.write();
            state.provider = Some(provider);
            state.initialized = true;
        }

        info!(
            service_name = %config.service_name,
            environment = %config.environment,
            otlp_endpoint = %config.otlp_endpoint,
            otlp_insecure = config.otlp_insecure,
            push_interval_ms = config.push_interval.as_millis() as u64,
            histogram_views = config.histogram_views.len(),
            "OTLP metrics initialized"
        );

        Ok(())
    }

    /// Meter for `scope` from the live provider, or the global fallback.
    pub fn meter(&self, scope: impl Into<Cow<'static, str>>) -> Meter {
        let scope = InstrumentationScope::builder(scope).build();
        let state = self.state.read();
        match (&state.provider, state.initialized) {
            (Some(provider), true) => provider.meter_with_scope(scope),
            _ => opentelemetry::global::meter_provider().meter_with_scope(scope),
        }
    }

    /// Flush and stop the provider once, waiting at most `timeout` for the flush.
    ///
    /// The lifecycle is marked uninitialized even if the flush fails. It is
    /// not re-initializable afterwards.
    pub async fn shutdown(&self, timeout: Duration) -> MetricsResult<()> {
        if !self.is_initialized() && !self.shutdown_once.initialized() {
            debug!("Metrics shutdown requested before initialization - nothing to do");
            return Ok(());
        }

        self.shutdown_once
            .get_or_init(|| self.stop_provider(timeout))
            .await
            .clone()
    }

    async fn stop_provider(&self, timeout: Duration) -> MetricsResult<()> {
        let provider = {
            let mut state = self.state.write();
            state.initialized = false;
            state.provider.take()
        };
        let Some(provider) = provider else {
            return Ok(());
        };

        if skip_flush_requested() {
            info!("{SKIP_FLUSH_ENV} is set; skipping flush in metrics shutdown");
            self.state.write()._retired = Some(provider);
            return Ok(());
        }

        let flush = tokio::task::spawn_blocking(move || provider.shutdown());
        let result = match tokio::time::timeout(timeout, flush).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(MetricsError::Shutdown(e.to_string())),
            Ok(Err(join_error)) => Err(MetricsError::Shutdown(join_error.to_string())),
            Err(_) => Err(MetricsError::ShutdownTimeout(timeout)),
        };

        match &result {
            Ok(()) => info!("Metrics provider flushed and shut down"),
            Err(e) => warn!(error = %e, "Metrics shutdown error"),
        }

        result
    }
}

/// Initialize the process-wide metrics pipeline.
pub async fn init_metrics(config: MetricsConfig) -> MetricsResult<()> {
    MetricsLifecycle::global().init(config).await
}

/// Meter from the process-wide provider, or a no-op meter before init.
pub fn get_meter(scope: impl Into<Cow<'static, str>>) -> Meter {
    MetricsLifecycle::global().meter(scope)
}

/// Flush and stop the process-wide provider.
pub async fn shutdown_metrics(timeout: Duration) -> MetricsResult<()> {
    MetricsLifecycle::global().shutdown(timeout).await
}

pub fn is_initialized() -> bool {
    MetricsLifecycle::global().is_initialized()
}
