use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::{Protocol, WithExportConfig, WithTonicConfig};
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{SERVICE_NAME, SERVICE_VERSION},
    resource::DEPLOYMENT_ENVIRONMENT_NAME,
};
use rocket::{
    Data, Request, Response,
    fairing::{Fairing, Info, Kind},
};
use std::time::Instant;
use tonic::metadata::{MetadataKey, MetadataMap};
use tracing::{Span, info_span};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub struct TelemetryFairing;

#[rocket::async_trait]
impl Fairing for TelemetryFairing {
    fn info(&self) -> Info {
        Info {
            name: "Request tracing",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        let method = request.method().to_string();
        let uri = request.uri().path().to_string();

        let start_time = Instant::now();

        let span = info_span!(
            "http_request",
            otel.name = format!("{} {}", method, uri),
            http.method = method,
            http.uri = uri,
            http.status_code = tracing::field::Empty,
            http.duration_ms = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        request.local_cache(|| RequestTiming { span, start_time });
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let timing = request.local_cache(|| RequestTiming {
            span: info_span!("http_request"),
            start_time: Instant::now(),
        });

        let duration = timing.start_time.elapsed();
        let route = request.route().map(|r| r.uri.to_string());

        timing.span.record("http.status_code", response.status().code);
        timing
            .span
            .record("http.duration_ms", duration.as_millis() as i64);

        let _entered = timing.span.enter();
        tracing::info!(
            route = ?route,
            "Completed request in {}ms with status {}",
            duration.as_millis(),
            response.status().code
        );
    }
}

struct RequestTiming {
    span: Span,
    start_time: Instant,
}

fn resource() -> Resource {
    let environment =
        std::env::var("ROLLCALL_PROFILE").unwrap_or_else(|_| "development".to_string());

    Resource::builder()
        .with_schema_url(
            [
                KeyValue::new(SERVICE_NAME, env!("CARGO_PKG_NAME")),
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, environment),
            ],
            SCHEMA_URL,
        )
        .build()
}

// Only built when OTEL_EXPORTER_OTLP_ENDPOINT is set.
fn init_tracer_provider(endpoint: &str) -> Result<SdkTracerProvider, String> {
    let mut metadata = MetadataMap::new();
    if let (Ok(header), Ok(key)) = (
        std::env::var("OTEL_API_KEY_HEADER"),
        std::env::var("OTEL_API_KEY"),
    ) {
        let name = MetadataKey::from_bytes(header.as_bytes()).map_err(|e| e.to_string())?;
        let value = key.parse().map_err(|_| "invalid OTEL_API_KEY".to_string())?;
        metadata.insert(name, value);
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_protocol(Protocol::Grpc)
        .with_metadata(metadata)
        .build()
        .map_err(|e| e.to_string())?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource())
        .with_batch_exporter(exporter)
        .build();

    Ok(tracer_provider)
}

/// Flushes and shuts the exporter down when dropped. Hold it for the life of `main`.
pub struct OtelGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

pub fn init_tracing() -> OtelGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .filter(|e| !e.trim().is_empty());

    let Some(endpoint) = endpoint else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
        return OtelGuard {
            tracer_provider: None,
        };
    };

    match init_tracer_provider(&endpoint) {
        Ok(tracer_provider) => {
            let tracer = tracer_provider.tracer("ham-rollcall");
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(OpenTelemetryLayer::new(tracer))
                .init();
            tracing::info!(endpoint = %endpoint, "OTLP trace export enabled");
            OtelGuard {
                tracer_provider: Some(tracer_provider),
            }
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            tracing::error!(error = %e, "Failed to set up OTLP exporter, continuing without it");
            OtelGuard {
                tracer_provider: None,
            }
        }
    }
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            if let Err(err) = provider.shutdown() {
                eprintln!("Failed to shut down tracer provider: {:?}", err);
            }
        }
    }
}
