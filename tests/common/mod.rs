//! # Test Utilities
//!
//! Shared harness for the integration tests: an in-memory meter provider that
//! can be collected on demand, a lifecycle backend that records how often it
//! was asked to build, an instrument factory that fails on a chosen name, and
//! lookups over collected metric data.

#![allow(
    dead_code,
    reason = "Each test binary uses a different subset of the shared helpers"
)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram, Meter, MeterProvider as _, ObservableGauge};
use opentelemetry_sdk::metrics::data::{
    AggregatedMetrics, HistogramDataPoint, Metric, MetricData, ResourceMetrics,
};
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::{
    InMemoryMetricExporter, MeterProviderBuilder, PeriodicReader, SdkMeterProvider, Temporality,
};
use parking_lot::Mutex;
use service_metrics::metrics::{GaugeCallback, InstrumentFactory, InstrumentSpec};
use service_metrics::{MetricsBackend, MetricsConfig, MetricsError, MetricsResult};

/// Provider backed by an in-memory exporter, collected with `force_flush`.
pub struct TestMeterProvider {
    pub provider: SdkMeterProvider,
    pub exporter: InMemoryMetricExporter,
}

impl TestMeterProvider {
    pub fn new() -> Self {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicReader::builder(exporter.clone()).build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        Self { provider, exporter }
    }

    pub fn meter(&self) -> Meter {
        self.provider.meter("test-meter")
    }

    /// Run one collection cycle and return its snapshot.
    pub fn collect(&self) -> ResourceMetrics {
        self.provider.force_flush().expect("force flush metrics");
        latest_export(&self.exporter).expect("at least one export after force flush")
    }
}

pub fn latest_export(exporter: &InMemoryMetricExporter) -> Option<ResourceMetrics> {
    exporter
        .get_finished_metrics()
        .expect("read finished metrics")
        .pop()
}

/// Lifecycle backend that exports to memory and counts `attach` calls.
pub struct InMemoryBackend {
    pub exporter: InMemoryMetricExporter,
    attach_calls: AtomicUsize,
    failure: Option<MetricsError>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            exporter: InMemoryMetricExporter::default(),
            attach_calls: AtomicUsize::new(0),
            failure: None,
        }
    }

    pub fn failing(failure: MetricsError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new()
        }
    }

    pub fn attach_calls(&self) -> usize {
        self.attach_calls.load(Ordering::SeqCst)
    }
}

impl MetricsBackend for InMemoryBackend {
    fn attach(
        &self,
        builder: MeterProviderBuilder,
        _config: &MetricsConfig,
    ) -> MetricsResult<MeterProviderBuilder> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        let reader = PeriodicReader::builder(self.exporter.clone()).build();
        Ok(builder.with_reader(reader))
    }
}

/// Exporter whose export blocks for a while and whose shutdown can fail.
#[derive(Debug, Clone, Default)]
pub struct FaultyExporter {
    pub export_delay: Duration,
    pub fail_shutdown: bool,
}

impl PushMetricExporter for FaultyExporter {
    fn export(&self, _metrics: &ResourceMetrics) -> impl Future<Output = OTelSdkResult> + Send {
        // The periodic reader drives exports on its own thread, so this blocks it.
        std::thread::sleep(self.export_delay);
        std::future::ready(Ok(()))
    }

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        if self.fail_shutdown {
            Err(OTelSdkError::InternalFailure(
                "collector rejected shutdown".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn temporality(&self) -> Temporality {
        Temporality::Cumulative
    }
}

/// Lifecycle backend that exports through a [`FaultyExporter`].
pub struct FaultyBackend {
    exporter: FaultyExporter,
}

impl FaultyBackend {
    pub fn slow_export(delay: Duration) -> Self {
        Self {
            exporter: FaultyExporter {
                export_delay: delay,
                fail_shutdown: false,
            },
        }
    }

    pub fn failing_shutdown() -> Self {
        Self {
            exporter: FaultyExporter {
                export_delay: Duration::ZERO,
                fail_shutdown: true,
            },
        }
    }
}

impl MetricsBackend for FaultyBackend {
    fn attach(
        &self,
        builder: MeterProviderBuilder,
        _config: &MetricsConfig,
    ) -> MetricsResult<MeterProviderBuilder> {
        let reader = PeriodicReader::builder(self.exporter.clone()).build();
        Ok(builder.with_reader(reader))
    }
}

/// Delegates to a real meter but refuses to create one named instrument.
pub struct FailingFactory {
    inner: Meter,
    fail_on: &'static str,
    created: Mutex<Vec<&'static str>>,
}

impl FailingFactory {
    pub fn new(inner: Meter, fail_on: &'static str) -> Self {
        Self {
            inner,
            fail_on,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Names successfully created so far, in creation order.
    pub fn created(&self) -> Vec<&'static str> {
        self.created.lock().clone()
    }

    fn admit(&self, spec: InstrumentSpec) -> MetricsResult<()> {
        if spec.name == self.fail_on {
            return Err(MetricsError::instrument(spec.name, "injected failure"));
        }
        self.created.lock().push(spec.name);
        Ok(())
    }
}

impl InstrumentFactory for FailingFactory {
    fn u64_counter(&self, spec: InstrumentSpec) -> MetricsResult<Counter<u64>> {
        self.admit(spec)?;
        InstrumentFactory::u64_counter(&self.inner, spec)
    }

    fn u64_histogram(&self, spec: InstrumentSpec) -> MetricsResult<Histogram<u64>> {
        self.admit(spec)?;
        InstrumentFactory::u64_histogram(&self.inner, spec)
    }

    fn i64_observable_gauge(
        &self,
        spec: InstrumentSpec,
        callback: GaugeCallback<i64>,
    ) -> MetricsResult<ObservableGauge<i64>> {
        self.admit(spec)?;
        InstrumentFactory::i64_observable_gauge(&self.inner, spec, callback)
    }

    fn u64_observable_gauge(
        &self,
        spec: InstrumentSpec,
        callback: GaugeCallback<u64>,
    ) -> MetricsResult<ObservableGauge<u64>> {
        self.admit(spec)?;
        InstrumentFactory::u64_observable_gauge(&self.inner, spec, callback)
    }

    fn f64_observable_gauge(
        &self,
        spec: InstrumentSpec,
        callback: GaugeCallback<f64>,
    ) -> MetricsResult<ObservableGauge<f64>> {
        self.admit(spec)?;
        InstrumentFactory::f64_observable_gauge(&self.inner, spec, callback)
    }
}

pub fn test_config() -> MetricsConfig {
    MetricsConfig::new("localhost:4317", "test-service", "test")
}

pub fn find_metric<'a>(rm: &'a ResourceMetrics, name: &str) -> Option<&'a Metric> {
    rm.scope_metrics()
        .flat_map(|scope| scope.metrics())
        .find(|metric| metric.name() == name)
}

/// Sum of all data points of a u64 counter; zero when never recorded.
pub fn u64_sum(rm: &ResourceMetrics, name: &str) -> u64 {
    match find_metric(rm, name).map(Metric::data) {
        Some(AggregatedMetrics::U64(MetricData::Sum(sum))) => {
            sum.data_points().map(|dp| dp.value()).sum()
        }
        Some(_) => panic!("metric {name} is not a u64 sum"),
        None => 0,
    }
}

/// Data points of a u64 histogram; panics when the metric is missing.
pub fn u64_histogram_points<'a>(
    rm: &'a ResourceMetrics,
    name: &str,
) -> Vec<&'a HistogramDataPoint<u64>> {
    match find_metric(rm, name).map(Metric::data) {
        Some(AggregatedMetrics::U64(MetricData::Histogram(histogram))) => {
            histogram.data_points().collect()
        }
        Some(_) => panic!("metric {name} is not a u64 histogram"),
        None => panic!("histogram metric {name} not found"),
    }
}

/// Total number of samples across all data points of a u64 histogram.
pub fn u64_histogram_count(rm: &ResourceMetrics, name: &str) -> u64 {
    u64_histogram_points(rm, name)
        .iter()
        .map(|dp| dp.count())
        .sum()
}

pub fn i64_gauge(rm: &ResourceMetrics, name: &str) -> i64 {
    match find_metric(rm, name).map(Metric::data) {
        Some(AggregatedMetrics::I64(MetricData::Gauge(gauge))) => gauge
            .data_points()
            .next()
            .map(|dp| dp.value())
            .unwrap_or_else(|| panic!("gauge {name} has no data points")),
        _ => panic!("i64 gauge {name} not found"),
    }
}

pub fn u64_gauge(rm: &ResourceMetrics, name: &str) -> u64 {
    match find_metric(rm, name).map(Metric::data) {
        Some(AggregatedMetrics::U64(MetricData::Gauge(gauge))) => gauge
            .data_points()
            .next()
            .map(|dp| dp.value())
            .unwrap_or_else(|| panic!("gauge {name} has no data points")),
        _ => panic!("u64 gauge {name} not found"),
    }
}

pub fn f64_gauge(rm: &ResourceMetrics, name: &str) -> f64 {
    match find_metric(rm, name).map(Metric::data) {
        Some(AggregatedMetrics::F64(MetricData::Gauge(gauge))) => gauge
            .data_points()
            .next()
            .map(|dp| dp.value())
            .unwrap_or_else(|| panic!("gauge {name} has no data points")),
        _ => panic!("f64 gauge {name} not found"),
    }
}

/// Value of attribute `key` on the first data point of a u64 counter.
pub fn u64_sum_attribute(rm: &ResourceMetrics, name: &str, key: &str) -> Option<String> {
    match find_metric(rm, name).map(Metric::data) {
        Some(AggregatedMetrics::U64(MetricData::Sum(sum))) => sum.data_points().next().and_then(
            |dp| {
                dp.attributes()
                    .find(|kv| kv.key.as_str() == key)
                    .map(|kv| kv.value.to_string())
            },
        ),
        _ => None,
    }
}
