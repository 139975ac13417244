pub mod attachments;
pub mod auth;
pub mod bridge;
pub mod channels;
pub mod chats;
pub mod config;
pub mod db;
pub mod error;
pub mod friends;
pub mod messages;
pub mod models;
pub mod observability;
pub mod routes;
pub mod state;
pub mod stats;
pub mod users;
pub mod validation;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub fn app(state: AppState) -> Router {
    let upload_route = format!("/{}", state.config.upload_base_url.trim_matches('/'));
    let uploads = ServeDir::new(&state.config.upload_dir);

    Router::new()
        .route("/", get(|| async { "Chatbox server is running" }))
        .route("/ws", get(bridge::ws_handler))
        .nest("/user", routes::users::router().merge(routes::friends::router()))
        .nest("/chat", routes::chat::router())
        .nest("/admin", routes::admin::router())
        .nest_service(&upload_route, uploads)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(TraceLayer::new_for_http().make_span_with(observability::http_span))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(component = "bootstrap", %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}
