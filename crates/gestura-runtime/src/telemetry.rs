//! Tracing pipeline initialisation for Gestura.
//!
//! Call [`init_tracing`] once at process startup to install the global
//! `tracing` subscriber.  Output always goes to the console; with
//! `logging.path` set it is also written, without ANSI colours, to a
//! rolling log file through a background writer thread.  Spans are exported
//! over OTLP when a collector is configured.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP collector base URL (e.g. `http://localhost:4318`). When set the OTLP HTTP exporter is activated. |
//! | `RUST_LOG` | Log filter; overrides `logging.level`. |
//! | `GESTURA_LOG_FORMAT=json` | Emit newline-delimited JSON on the console. |
//!
//! # Example
//!
//! ```rust,no_run
//! use gestura_types::config::LoggingConfig;
//!
//! // Hold the guard for the entire lifetime of the process.
//! let _guard = gestura_runtime::telemetry::init_tracing("gestura", &LoggingConfig::default());
//! ```

use std::io;
use std::path::Path;

use gestura_types::config::{LogRotation, LoggingConfig};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Install the global subscriber from the `[logging]` section.
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place.  A log file that cannot be opened is reported on stderr and
/// skipped.
///
/// The returned [`TelemetryGuard`] **must** be held for the lifetime of the
/// process; dropping it flushes pending spans and buffered file output.
pub fn init_tracing(service_name: &str, logging: &LoggingConfig) -> TelemetryGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let use_json = std::env::var("GESTURA_LOG_FORMAT").as_deref() == Ok("json");

    let mut layers: Vec<BoxedLayer> = Vec::new();
    layers.push(if use_json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().compact().boxed()
    });

    let provider = build_provider(service_name);
    if let Some(p) = &provider {
        layers.push(
            tracing_opentelemetry::layer()
                .with_tracer(p.tracer("gestura"))
                .boxed(),
        );
    }

    let mut file = None;
    if let Some(path) = &logging.path {
        match file_writer(path, logging.rotation, logging.max_files) {
            Ok((writer, guard)) => {
                layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
                file = Some(guard);
            }
            Err(e) => eprintln!("[gestura] log file {} unavailable: {e}", path.display()),
        }
    }

    if let Err(e) = tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
    {
        eprintln!("[gestura] tracing subscriber already installed: {e}");
    }

    TelemetryGuard { provider, file }
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Shuts down the OTel [`SdkTracerProvider`] and the log-file writer on drop.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
    file: Option<WorkerGuard>,
}

impl TelemetryGuard {
    /// Whether spans are being exported.
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }

    /// Whether logs are also going to a file.
    pub fn is_writing_file(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[gestura] OpenTelemetry provider shutdown error: {e}");
        }
        // Dropping the worker guard flushes the file writer.
        drop(self.file.take());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Rolling appender for `path`, wrapped in a non-blocking writer.
///
/// `gestura.log` rolled daily becomes `gestura.2026-01-31.log`; with
/// [`LogRotation::Never`] the file name is used as is.  At most `max_files`
/// dated files are kept.
fn file_writer(
    path: &Path,
    rotation: LogRotation,
    max_files: usize,
) -> io::Result<(NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;

    let stem = path
        .file_stem()
        .ok_or_else(|| io::Error::other("log path has no file name"))?;
    let mut builder = RollingFileAppender::builder()
        .rotation(rolling_period(rotation))
        .filename_prefix(stem.to_string_lossy().into_owned())
        .max_log_files(max_files.max(1));
    if let Some(ext) = path.extension() {
        builder = builder.filename_suffix(ext.to_string_lossy().into_owned());
    }
    let appender = builder.build(dir).map_err(io::Error::other)?;
    Ok(tracing_appender::non_blocking(appender))
}

fn rolling_period(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

/// Build an [`SdkTracerProvider`] when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
///
/// Returns `None` when the env-var is absent or the exporter cannot be
/// initialised (the error goes to stderr; logging is not up yet).
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[gestura] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            // Simple exporter: the CLI initialises tracing before its Tokio
            // runtime exists, and the batch exporter spawns tasks.
            .with_simple_exporter(exporter)
            .build(),
    )
}
