use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    RequestPartsExt,
};
use axum_extra::TypedHeader;
use chrono::{Duration, Utc};
use headers::{Cookie, HeaderMapExt};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use shared_proto::auth::{ADMIN_COOKIE, SESSION_COOKIE};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const ADMIN_SUBJECT: &str = "admin";
const ADMIN_SESSION_MINUTES: i64 = 15;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

/// Signs and verifies session tokens with the server-held secret.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    secure_cookies: bool,
}

impl SessionKeys {
    pub fn new(secret: &[u8], ttl: Duration, secure_cookies: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
            secure_cookies,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(&config.jwt_secret, config.session_ttl, config.cookie_secure)
    }

    pub fn issue(&self, user_id: Uuid) -> ApiResult<String> {
        self.sign(user_id.to_string(), self.ttl)
    }

    pub fn issue_admin(&self) -> ApiResult<String> {
        self.sign(
            ADMIN_SUBJECT.to_string(),
            Duration::minutes(ADMIN_SESSION_MINUTES),
        )
    }

    fn sign(&self, sub: String, ttl: Duration) -> ApiResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::internal(format!("token signing failed: {e}")))
    }

    /// Checks signature and expiry. Any failure is reported as Unauthenticated.
    pub fn verify(&self, token: &str) -> ApiResult<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::unauthenticated())
    }

    pub fn verify_user(&self, token: &str) -> ApiResult<Uuid> {
        let claims = self.verify(token)?;
        Uuid::parse_str(&claims.sub).map_err(|_| ApiError::unauthenticated())
    }

    pub fn session_cookie(&self, token: &str) -> HeaderValue {
        self.cookie(SESSION_COOKIE, token, self.ttl.num_seconds())
    }

    pub fn admin_cookie(&self, token: &str) -> HeaderValue {
        self.cookie(ADMIN_COOKIE, token, ADMIN_SESSION_MINUTES * 60)
    }

    pub fn cleared_cookie(&self, name: &str) -> HeaderValue {
        self.cookie(name, "", 0)
    }

    fn cookie(&self, name: &str, value: &str, max_age: i64) -> HeaderValue {
        let same_site = if self.secure_cookies { "None; Secure" } else { "Lax" };
        let raw = format!("{name}={value}; Path=/; HttpOnly; Max-Age={max_age}; SameSite={same_site}");
        HeaderValue::from_str(&raw).unwrap_or_else(|_| HeaderValue::from_static(""))
    }
}

pub fn token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .typed_get::<Cookie>()
        .and_then(|cookie| cookie.get(cookie_name).map(str::to_string))
        .filter(|token| !token.is_empty())
}

pub fn set_cookie_headers(value: HeaderValue) -> [(header::HeaderName, HeaderValue); 1] {
    [(header::SET_COOKIE, value)]
}

pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ApiError::internal("password hashing failed"))
}

pub fn verify_password(password: &str, hash: &str) -> ApiResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| ApiError::internal("stored password hash is invalid"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// The caller of an HTTP request, resolved from the session cookie.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let TypedHeader(cookie) = parts
            .extract::<TypedHeader<Cookie>>()
            .await
            .map_err(|_| ApiError::unauthenticated())?;
        let token = cookie
            .get(SESSION_COOKIE)
            .filter(|token| !token.is_empty())
            .ok_or_else(ApiError::unauthenticated)?;
        let id = state.sessions.verify_user(token)?;
        Ok(AuthUser { id })
    }
}

/// Holder of a valid admin cookie.
#[derive(Debug, Clone, Copy)]
pub struct AdminSession;

#[async_trait]
impl<S> FromRequestParts<S> for AdminSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        if state.config.admin_secret_key.is_none() {
            return Err(ApiError::not_found("Admin surface is disabled"));
        }

        let token = token_from_headers(&parts.headers, ADMIN_COOKIE)
            .ok_or_else(|| ApiError::Unauthenticated("Please login as ADMIN".to_string()))?;
        let claims = state.sessions.verify(&token)?;
        if claims.sub != ADMIN_SUBJECT {
            return Err(ApiError::unauthorized("Invalid Admin Key"));
        }
        Ok(AdminSession)
    }
}
