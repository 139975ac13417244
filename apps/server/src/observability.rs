use axum::{body::Body, http::Request};
use tracing::Span;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Installs the global subscriber. `APP_LOG_LEVEL` (or `RUST_LOG`) picks the
/// filter; `LOG_FORMAT=pretty` swaps JSON lines for human-readable output.
pub fn init_tracing() {
    let filter = std::env::var("APP_LOG_LEVEL")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info,tower_http=info,sqlx=warn".to_string());
    let pretty = std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("pretty"));

    let builder = tracing_subscriber::fmt().with_env_filter(EnvFilter::new(filter));
    let installed = if pretty {
        tracing::subscriber::set_global_default(builder.compact().finish())
    } else {
        tracing::subscriber::set_global_default(
            builder
                .with_ansi(false)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .finish(),
        )
    };

    if installed.is_ok() {
        tracing::info!(
            component = "bootstrap",
            version = env!("CARGO_PKG_VERSION"),
            "structured tracing initialized"
        );
    }
}

/// Span for one HTTP request; every event logged while serving it carries the request id.
pub fn http_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "http",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        path = %request.uri().path(),
    )
}
