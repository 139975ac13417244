use chatbox_server::{app, config::ServerConfig, db, observability, state::AppState};

#[tokio::main]
async fn main() {
    observability::init_tracing();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(component = "bootstrap", error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let database = match db::connect(&config.database_url).await {
        Ok(database) => database,
        Err(e) => {
            tracing::error!(component = "bootstrap", error = %e, "failed to open database");
            std::process::exit(1);
        }
    };
    tracing::info!(component = "bootstrap", "database ready");

    let bind_addr = config.bind_addr;
    let state = match AppState::with_local_store(database, config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(component = "bootstrap", error = %e, "failed to prepare upload directory");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(component = "bootstrap", %bind_addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(component = "bootstrap", %bind_addr, "listening");

    if let Err(e) = axum::serve(listener, app(state)).await {
        tracing::error!(component = "bootstrap", error = %e, "server stopped");
        std::process::exit(1);
    }
}
