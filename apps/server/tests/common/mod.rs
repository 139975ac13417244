#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response, StatusCode},
    Router,
};
use chatbox_server::{
    attachments::Upload, config::ServerConfig, db, state::AppState, users,
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const BOUNDARY: &str = "chatbox-test-boundary";

pub async fn test_state(prefix: &str) -> AppState {
    let dir = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::new_v4()));
    let database = db::connect_path(&dir.join("chatbox.sqlite"))
        .await
        .expect("open database");
    AppState::with_local_store(database, ServerConfig::for_tests(dir.join("uploads")))
        .await
        .expect("state")
}

/// Registers through the core and returns (user id, session token).
pub async fn create_user(state: &AppState, username: &str, name: &str) -> (Uuid, String) {
    let (user, token) = users::register(
        state,
        users::RegisterRequest {
            name: name.to_string(),
            username: username.to_string(),
            password: "correct-horse".to_string(),
            description: format!("{name}'s profile"),
        },
        Some(Upload {
            file_name: Some("avatar.png".to_string()),
            bytes: axum::body::Bytes::from_static(b"png"),
        }),
    )
    .await
    .expect("register");
    (user.id, token)
}

pub fn session_cookie(token: &str) -> String {
    format!("chatbox-token={token}")
}

/// `name=value` of the first Set-Cookie header.
pub fn set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()
        .map(str::to_string)
}

pub fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    for (name, file_name, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub struct TestRequest {
    builder: axum::http::request::Builder,
}

impl TestRequest {
    pub fn new(method: &str, uri: &str) -> Self {
        Self {
            builder: Request::builder().method(method).uri(uri),
        }
    }

    pub fn cookie(mut self, cookie: &str) -> Self {
        self.builder = self.builder.header(header::COOKIE, cookie);
        self
    }

    pub fn json(self, value: Value) -> Request<Body> {
        self.builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .expect("request")
    }

    pub fn multipart(self, body: Vec<u8>) -> Request<Body> {
        self.builder
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    pub fn empty(self) -> Request<Body> {
        self.builder.body(Body::empty()).expect("request")
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.expect("router is infallible")
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = send(app, request).await;
    let status = response.status();
    (status, json_body(response).await)
}
