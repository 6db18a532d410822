use std::fmt as StdFmt;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::Utc;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::{TraceContextExt, TracerProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{BatchSpanProcessor, SdkTracerProvider};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::Subscriber;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::{self, FmtContext};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{AppConfig, TelemetryConfig};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Owns the tracer provider; pending spans are exported when it drops.
#[must_use = "dropping the guard flushes and stops span export"]
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(err) = provider.shutdown() {
                eprintln!("failed to flush spans: {err}");
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to set tracing subscriber: {0}")]
    SubscriberInit(String),
    #[error("failed to build OTLP exporter: {0}")]
    ExporterBuild(String),
}

/// Installs the global subscriber: `RUST_LOG` filtering (default `info`),
/// pretty output on stderr in `dev`, JSON lines elsewhere, and span export
/// when an OTLP endpoint is configured. Only the first call in a process
/// installs anything.
pub fn init_telemetry(
    app: &AppConfig,
    telemetry: &TelemetryConfig,
) -> Result<TelemetryGuard, TelemetryError> {
    if INSTALLED.get().is_some() {
        return Ok(TelemetryGuard { provider: None });
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| TelemetryError::SubscriberInit(err.to_string()))?;

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if app.env.eq_ignore_ascii_case("dev")
    {
        fmt::layer()
            .with_target(true)
            .pretty()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer().event_format(JsonLineFormat).boxed()
    };

    let provider = build_provider(app, telemetry)?;
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(app.service_name.clone()))
    });

    let subscriber = Registry::default()
        .with(fmt_layer)
        .with(otel_layer)
        .with(env_filter);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| TelemetryError::SubscriberInit(err.to_string()))?;
    let _ = INSTALLED.set(());

    Ok(TelemetryGuard { provider })
}

/// Logging only, for binaries that run before (or without) a config file.
pub fn init_logging(env: &str) -> Result<TelemetryGuard, TelemetryError> {
    let app = AppConfig {
        service_name: "mailwright".to_string(),
        env: env.to_string(),
    };
    init_telemetry(&app, &TelemetryConfig::default())
}

fn build_provider(
    app: &AppConfig,
    telemetry: &TelemetryConfig,
) -> Result<Option<SdkTracerProvider>, TelemetryError> {
    let endpoint = match telemetry.otlp_endpoint.as_deref() {
        Some(endpoint) if telemetry.export_traces && !endpoint.is_empty() => endpoint,
        _ => return Ok(None),
    };

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_timeout(Duration::from_secs(3))
        .with_endpoint(endpoint)
        .build()
        .map_err(|err| TelemetryError::ExporterBuild(err.to_string()))?;

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", app.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", app.env.clone()),
        ])
        .build();
    let provider = SdkTracerProvider::builder()
        .with_span_processor(BatchSpanProcessor::builder(exporter).build())
        .with_resource(resource)
        .build();

    global::set_tracer_provider(provider.clone());
    global::set_text_map_propagator(opentelemetry_sdk::propagation::TraceContextPropagator::new());

    Ok(Some(provider))
}

/// One JSON object per event: timestamp, level, target, message, the span
/// path from root to leaf, the OpenTelemetry trace id when one exists, and
/// the remaining event fields.
struct JsonLineFormat;

impl<S, N> FormatEvent<S, N> for JsonLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> StdFmt::Result {
        let mut fields = FieldMap::default();
        event.record(&mut fields);
        let message = fields.0.remove("message");

        let spans: Vec<&str> = ctx
            .event_scope()
            .map(|scope| scope.from_root().map(|span| span.name()).collect())
            .unwrap_or_default();

        let span_context = tracing::Span::current().context().span().span_context().clone();
        let trace_id = span_context
            .is_valid()
            .then(|| span_context.trace_id().to_string());

        let line = json!({
            "ts": Utc::now().to_rfc3339(),
            "level": event.metadata().level().as_str().to_lowercase(),
            "target": event.metadata().target(),
            "message": message,
            "spans": spans,
            "trace_id": trace_id,
            "fields": Value::Object(fields.0),
        });

        let rendered = serde_json::to_string(&line).map_err(|_| StdFmt::Error)?;
        writeln!(writer, "{rendered}")
    }
}

#[derive(Default)]
struct FieldMap(Map<String, Value>);

impl tracing_subscriber::field::Visit for FieldMap {
    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.into());
    }

    fn record_error(
        &mut self,
        field: &tracing::field::Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        self.0.insert(field.name().to_string(), value.to_string().into());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn StdFmt::Debug) {
        self.0
            .insert(field.name().to_string(), format!("{value:?}").into());
    }
}
