//! Fallible instrument creation.
//!
//! The OpenTelemetry SDK never fails instrument creation; an invalid name is
//! logged and a no-op instrument is returned instead. Instrument groups need a
//! creation step that can fail so a partially-built group never escapes, so
//! they build through [`InstrumentFactory`] rather than a bare [`Meter`].

use opentelemetry::metrics::{AsyncInstrument, Counter, Histogram, Meter, ObservableGauge};

use crate::error::{MetricsError, MetricsResult};

const MAX_NAME_LEN: usize = 255;

/// Static description of one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstrumentSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub unit: Option<&'static str>,
}

impl InstrumentSpec {
    pub const fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            unit: None,
        }
    }

    pub const fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }
}

/// Sampling closure for an observable gauge, invoked once per collection cycle.
pub type GaugeCallback<T> = Box<dyn Fn(&dyn AsyncInstrument<T>) + Send + Sync + 'static>;

/// Creates instruments, failing instead of silently degrading.
pub trait InstrumentFactory: Send + Sync {
    fn u64_counter(&self, spec: InstrumentSpec) -> MetricsResult<Counter<u64>>;

    fn u64_histogram(&self, spec: InstrumentSpec) -> MetricsResult<Histogram<u64>>;

    fn i64_observable_gauge(
        &self,
        spec: InstrumentSpec,
        callback: GaugeCallback<i64>,
    ) -> MetricsResult<ObservableGauge<i64>>;

    fn u64_observable_gauge(
        &self,
        spec: InstrumentSpec,
        callback: GaugeCallback<u64>,
    ) -> MetricsResult<ObservableGauge<u64>>;

    fn f64_observable_gauge(
        &self,
        spec: InstrumentSpec,
        callback: GaugeCallback<f64>,
    ) -> MetricsResult<ObservableGauge<f64>>;
}

/// Enforce the OpenTelemetry instrument name syntax.
pub fn validate_instrument_name(name: &str) -> MetricsResult<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(MetricsError::instrument(name, "name must not be empty"));
    };
    if name.len() > MAX_NAME_LEN {
        return Err(MetricsError::instrument(
            name,
            format!("name longer than {MAX_NAME_LEN} characters"),
        ));
    }
    if !first.is_ascii_alphabetic() {
        return Err(MetricsError::instrument(
            name,
            "name must start with an ASCII letter",
        ));
    }
    if let Some(bad) =
        chars.find(|c| !(c.is_ascii_alphanumeric() || matches!(*c, '_' | '.' | '-' | '/')))
    {
        return Err(MetricsError::instrument(
            name,
            format!("invalid character {bad:?} in name"),
        ));
    }
    Ok(())
}

impl InstrumentFactory for Meter {
    fn u64_counter(&self, spec: InstrumentSpec) -> MetricsResult<Counter<u64>> {
        validate_instrument_name(spec.name)?;
        let builder = Meter::u64_counter(self, spec.name)
            .with_description(spec.description);
        Ok(match spec.unit {
            Some(unit) => builder.with_unit(unit).build(),
            None => builder.build(),
        })
    }

    fn u64_histogram(&self, spec: InstrumentSpec) -> MetricsResult<Histogram<u64>> {
        validate_instrument_name(spec.name)?;
        let builder = Meter::u64_histogram(self, spec.name)
            .with_description(spec.description);
        Ok(match spec.unit {
            Some(unit) => builder.with_unit(unit).build(),
            None => builder.build(),
        })
    }

    fn i64_observable_gauge(
        &self,
        spec: InstrumentSpec,
        callback: GaugeCallback<i64>,
    ) -> MetricsResult<ObservableGauge<i64>> {
        validate_instrument_name(spec.name)?;
        let builder = Meter::i64_observable_gauge(self, spec.name)
            .with_description(spec.description)
            .with_callback(move |observer| callback(observer));
        Ok(match spec.unit {
            Some(unit) => builder.with_unit(unit).build(),
            None => builder.build(),
        })
    }

    fn u64_observable_gauge(
        &self,
        spec: InstrumentSpec,
        callback: GaugeCallback<u64>,
    ) -> MetricsResult<ObservableGauge<u64>> {
        validate_instrument_name(spec.name)?;
        let builder = Meter::u64_observable_gauge(self, spec.name)
            .with_description(spec.description)
            .with_callback(move |observer| callback(observer));
        Ok(match spec.unit {
            Some(unit) => builder.with_unit(unit).build(),
            None => builder.build(),
        })
    }

    fn f64_observable_gauge(
        &self,
        spec: InstrumentSpec,
        callback: GaugeCallback<f64>,
    ) -> MetricsResult<ObservableGauge<f64>> {
        validate_instrument_name(spec.name)?;
        let builder = Meter::f64_observable_gauge(self, spec.name)
            .with_description(spec.description)
            .with_callback(move |observer| callback(observer));
        Ok(match spec.unit {
            Some(unit) => builder.with_unit(unit).build(),
            None => builder.build(),
        })
    }
}
