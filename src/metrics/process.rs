//! # Process Metrics
//!
//! Observable gauges sampled once per collection cycle:
//! - `go.goroutines`: live threads of execution in the process
//! - `go.mem.heap_alloc`: resident memory of the process in bytes
//! - `process.uptime`: seconds since the group was constructed
//!
//! The instrument names are shared with services written in other runtimes so
//! dashboards keep working across them.
//!
//! All three gauges read through one [`ProcessSampler`], which caches the
//! last `sysinfo` refresh briefly so a single collection cycle touches the
//! process table once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::metrics::{AsyncInstrument, ObservableGauge};
use parking_lot::Mutex;
use sysinfo::{get_current_pid, Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use super::instruments::{InstrumentFactory, InstrumentSpec};
use crate::error::MetricsResult;

pub const LIVE_TASKS: InstrumentSpec =
    InstrumentSpec::new("go.goroutines", "Live threads of execution in the process");
pub const HEAP_ALLOC: InstrumentSpec =
    InstrumentSpec::new("go.mem.heap_alloc", "Resident memory of the process in bytes")
        .with_unit("By");
pub const PROCESS_UPTIME: InstrumentSpec =
    InstrumentSpec::new("process.uptime", "Seconds since metrics were initialized").with_unit("s");

const SAMPLE_CACHE_DURATION: Duration = Duration::from_millis(50);

/// One reading of the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSample {
    pub live_tasks: u64,
    pub memory_bytes: u64,
}

/// Cached reader of the current process's thread count and resident memory.
pub struct ProcessSampler {
    pid: Option<Pid>,
    system: Mutex<System>,
    cached: Mutex<Option<(Instant, ProcessSample)>>,
}

impl ProcessSampler {
    pub fn new() -> Self {
        Self {
            pid: get_current_pid().ok(),
            system: Mutex::new(System::new()),
            cached: Mutex::new(None),
        }
    }

    pub fn sample(&self) -> ProcessSample {
        let mut cached = self.cached.lock();
        if let Some((taken_at, sample)) = *cached {
            if taken_at.elapsed() < SAMPLE_CACHE_DURATION {
                return sample;
            }
        }

        let sample = self.refresh();
        *cached = Some((Instant::now(), sample));
        sample
    }

    fn refresh(&self) -> ProcessSample {
        // The calling thread is always alive, so never report fewer than one.
        let unknown = ProcessSample {
            live_tasks: 1,
            memory_bytes: 0,
        };
        let Some(pid) = self.pid else {
            return unknown;
        };

        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );

        match system.process(pid) {
            Some(process) => ProcessSample {
                live_tasks: process
                    .tasks()
                    .map_or(1, |tasks| tasks.len() as u64)
                    .max(1),
                memory_bytes: process.memory(),
            },
            None => unknown,
        }
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ProcessMetrics {
    _live_tasks: ObservableGauge<u64>,
    _heap_alloc: ObservableGauge<u64>,
    _uptime: ObservableGauge<f64>,
    started: Instant,
    sampler: Arc<ProcessSampler>,
}

impl ProcessMetrics {
    pub fn new(meter: &dyn InstrumentFactory) -> MetricsResult<Self> {
        let started = Instant::now();
        let sampler = Arc::new(ProcessSampler::new());

        let tasks_sampler = Arc::clone(&sampler);
        let live_tasks = meter.u64_observable_gauge(
            LIVE_TASKS,
            Box::new(move |observer: &dyn AsyncInstrument<u64>| {
                observer.observe(tasks_sampler.sample().live_tasks, &[]);
            }),
        )?;

        let memory_sampler = Arc::clone(&sampler);
        let heap_alloc = meter.u64_observable_gauge(
            HEAP_ALLOC,
            Box::new(move |observer: &dyn AsyncInstrument<u64>| {
                observer.observe(memory_sampler.sample().memory_bytes, &[]);
            }),
        )?;

        let uptime = meter.f64_observable_gauge(
            PROCESS_UPTIME,
            Box::new(move |observer: &dyn AsyncInstrument<f64>| {
                observer.observe(started.elapsed().as_secs_f64(), &[]);
            }),
        )?;

        Ok(Self {
            _live_tasks: live_tasks,
            _heap_alloc: heap_alloc,
            _uptime: uptime,
            started,
            sampler,
        })
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Read the process table directly, outside a collection cycle.
    pub fn sample(&self) -> ProcessSample {
        self.sampler.sample()
    }
}
