use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;

const DEV_SECRET: &str = "dev-only-insecure-default-key-change-me";

/// Process-wide settings, built once at start-up and handed to each component.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub jwt_secret: Vec<u8>,
    pub session_ttl: Duration,
    pub admin_secret_key: Option<String>,
    pub allowed_origins: Vec<String>,
    pub upload_dir: PathBuf,
    pub upload_base_url: String,
    pub cookie_secure: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, String> {
        let bind_addr = read_env("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| format!("BIND_ADDR is not a socket address: {e}"))?;

        let jwt_secret = match read_env("JWT_SECRET") {
            Some(secret) => {
                tracing::info!(component = "config", "JWT_SECRET loaded from environment");
                secret.into_bytes()
            }
            None => {
                tracing::warn!(
                    component = "config",
                    "JWT_SECRET not set, using insecure default. Set JWT_SECRET in production"
                );
                DEV_SECRET.as_bytes().to_vec()
            }
        };

        let session_ttl = match read_env("SESSION_TTL_HOURS") {
            Some(raw) => Duration::hours(
                raw.parse::<i64>()
                    .map_err(|e| format!("SESSION_TTL_HOURS is not an integer: {e}"))?,
            ),
            None => Duration::days(15),
        };

        let allowed_origins = read_env("CLIENT_URL")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(default_origins);

        Ok(Self {
            bind_addr,
            database_url: read_env("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://chatbox.db".to_string()),
            jwt_secret,
            session_ttl,
            admin_secret_key: read_env("ADMIN_SECRET_KEY"),
            allowed_origins,
            upload_dir: read_env("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            upload_base_url: read_env("UPLOAD_BASE_URL").unwrap_or_else(|| "/uploads".to_string()),
            cookie_secure: read_env("COOKIE_SECURE")
                .map(|value| parse_bool(&value))
                .unwrap_or(false),
        })
    }

    /// Settings for tests: throwaway upload dir, known secrets, an ephemeral port.
    pub fn for_tests(upload_dir: PathBuf) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: b"test-secret".to_vec(),
            session_ttl: Duration::hours(1),
            admin_secret_key: Some("admin-key".to_string()),
            allowed_origins: default_origins(),
            upload_dir,
            upload_base_url: "/uploads".to_string(),
            cookie_secure: false,
        }
    }
}

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:3000".to_string(),
    ]
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}
