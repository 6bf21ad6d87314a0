use crate::config::Environment;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Filter from `RUST_LOG`, "info" when unset or unparsable.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Formatting layer: JSON in production, pretty ANSI output in development.
pub fn fmt_layer<S>(environment: Environment) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + 'static,
{
    match environment {
        Environment::Production => tracing_subscriber::fmt::layer()
            .json()
            .with_level(true)
            .boxed(),
        Environment::Development => tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(true)
            .boxed(),
    }
}

/// Install the global subscriber with an additional layer stacked under the
/// formatter (used by telemetry to bridge spans to OpenTelemetry).
pub(crate) fn init_with<L>(environment: Environment, extra: L) -> anyhow::Result<()>
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry().with(extra);
    registry
        .with(env_filter())
        .with(fmt_layer(environment))
        .try_init()?;
    Ok(())
}

/// Initialize tracing subscriber with pretty formatting for development
/// and JSON formatting for production.
///
/// Uses RUST_LOG environment variable for filtering (defaults to "info" if not set).
/// Spans are not exported anywhere; see `TelemetryGuard` for OTLP export.
pub fn setup_logging(environment: Environment) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer(environment))
        .try_init()?;
    Ok(())
}
