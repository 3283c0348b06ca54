/*!
Observability infrastructure for Sidecar.

This module provides:
- Structured logging setup through `tracing-subscriber`
- Optional Prometheus metrics for saves and loads (`metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Instant;
use tracing::subscriber::set_global_default;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, SidecarError};

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<SidecarMetrics> = OnceLock::new();

/// Metrics collection for save and load operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct SidecarMetrics {
    pub saves_total: Counter,
    pub save_failures_total: Counter,
    pub save_latency_seconds: Histogram,

    pub loads_total: Counter,
    pub load_failures_total: Counter,
    pub load_latency_seconds: Histogram,
    pub stale_discards_total: Counter,
    pub type_mismatches_total: Counter,

    pub store_size_bytes: Histogram,

    // Prometheus registry for scraping
    registry: Registry,
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| SidecarError::storage(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| SidecarError::storage(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
fn histogram(registry: &Registry, name: &str, help: &str) -> Result<Histogram> {
    let histogram = Histogram::with_opts(prometheus::HistogramOpts::new(name, help))
        .map_err(|e| SidecarError::storage(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(histogram.clone()))
        .map_err(|e| SidecarError::storage(format!("Failed to register {name}: {e}")))?;
    Ok(histogram)
}

#[cfg(feature = "metrics")]
impl SidecarMetrics {
    /// Initialize new metrics instance
    fn new() -> Result<Self> {
        let registry = Registry::new();

        Ok(Self {
            saves_total: counter(&registry, "sidecar_saves_total", "Completed store saves")?,
            save_failures_total: counter(
                &registry,
                "sidecar_save_failures_total",
                "Store saves that returned an error",
            )?,
            save_latency_seconds: histogram(
                &registry,
                "sidecar_save_latency_seconds",
                "Duration of store saves in seconds",
            )?,
            loads_total: counter(&registry, "sidecar_loads_total", "Completed store loads")?,
            load_failures_total: counter(
                &registry,
                "sidecar_load_failures_total",
                "Store loads that returned an error",
            )?,
            load_latency_seconds: histogram(
                &registry,
                "sidecar_load_latency_seconds",
                "Duration of store loads in seconds",
            )?,
            stale_discards_total: counter(
                &registry,
                "sidecar_stale_discards_total",
                "Store files deleted because they no longer matched the base save",
            )?,
            type_mismatches_total: counter(
                &registry,
                "sidecar_type_mismatches_total",
                "Stored entries that could not be read into their registered type",
            )?,
            store_size_bytes: histogram(
                &registry,
                "sidecar_store_size_bytes",
                "Size of the encoded store file in bytes",
            )?,
            registry,
        })
    }

    /// Get or initialize global metrics instance
    pub fn global() -> &'static SidecarMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize Sidecar metrics"))
    }

    pub fn record_stale_discard(&self) {
        self.stale_discards_total.inc();
    }

    pub fn record_type_mismatches(&self, count: usize) {
        self.type_mismatches_total.inc_by(count as f64);
    }

    pub fn record_store_size(&self, size_bytes: usize) {
        self.store_size_bytes.observe(size_bytes as f64);
    }

    /// Gather metrics in Prometheus format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| SidecarError::storage(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| SidecarError::storage(format!("Failed to convert metrics to string: {e}")))
    }
}

#[cfg(feature = "metrics")]
#[derive(Debug, Clone, Copy)]
enum Operation {
    Save,
    Load,
}

/// Times one save or load and records its outcome
#[cfg(feature = "metrics")]
pub struct MetricsTimer {
    start: Instant,
    operation: Operation,
}

#[cfg(feature = "metrics")]
impl MetricsTimer {
    pub fn start_save() -> Self {
        Self {
            start: Instant::now(),
            operation: Operation::Save,
        }
    }

    pub fn start_load() -> Self {
        Self {
            start: Instant::now(),
            operation: Operation::Load,
        }
    }

    /// Complete the timer, recording success latency
    pub fn finish(self) {
        let metrics = SidecarMetrics::global();
        let seconds = self.start.elapsed().as_secs_f64();
        match self.operation {
            Operation::Save => {
                metrics.saves_total.inc();
                metrics.save_latency_seconds.observe(seconds);
            }
            Operation::Load => {
                metrics.loads_total.inc();
                metrics.load_latency_seconds.observe(seconds);
            }
        }
    }

    /// Complete the timer with an error, recording both latency and error
    pub fn finish_with_error(self) {
        let metrics = SidecarMetrics::global();
        let seconds = self.start.elapsed().as_secs_f64();
        match self.operation {
            Operation::Save => {
                metrics.save_failures_total.inc();
                metrics.save_latency_seconds.observe(seconds);
            }
            Operation::Load => {
                metrics.load_failures_total.inc();
                metrics.load_latency_seconds.observe(seconds);
            }
        }
    }

    /// Finish according to `result`
    pub fn finish_result<T>(self, result: &Result<T>) {
        if result.is_ok() {
            self.finish();
        } else {
            self.finish_with_error();
        }
    }
}

/// Initialize the global logging subscriber
///
/// Log levels come from `RUST_LOG`, with `sidecar=info` added as a default
/// directive. `json` switches the output to one JSON object per line.
pub fn init_observability(json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    SidecarMetrics::global();

    let directive: Directive = "sidecar=info"
        .parse()
        .map_err(|e| SidecarError::validation(format!("Invalid log directive: {e}")))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let result = if json {
        let subscriber = TracingRegistry::default().with(filter).with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(false)
                .with_current_span(false),
        );
        set_global_default(subscriber)
    } else {
        let subscriber = TracingRegistry::default()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true));
        set_global_default(subscriber)
    };
    result.map_err(|e| {
        SidecarError::storage(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::info!("Sidecar observability initialized");
    Ok(())
}

/// Initialize observability with plain text output
pub fn init_default_observability() -> Result<()> {
    init_observability(false)
}
