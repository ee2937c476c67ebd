use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tokio::task;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, errors::ErrorKind, EncodingKey, Header};

use crate::error::ApiError;
use crate::models::{Claims, LoginRequest, SignupRequest, UpdateProfileRequest, User};
use crate::AppState;

const AUTH_COOKIE: &str = "token";
const SESSION_DAYS: i64 = 7;

pub(crate) fn get_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie_header = headers.get("cookie")?.to_str().ok()?;
    for pair in cookie_header.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        if key == name {
            return Some(value.to_string());
        }
    }
    None
}

fn build_cookie(name: &str, value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; SameSite=Lax; HttpOnly",
        name, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_cookie(name: &str, secure: bool) -> String {
    let mut cookie = format!("{}=; Path=/; Max-Age=0; SameSite=Lax; HttpOnly", name);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn create_jwt(user_id: i64, secret: &str) -> Result<String, ApiError> {
    let expiration = (Utc::now() + Duration::days(SESSION_DAYS)).timestamp() as usize;
    let claims = Claims { sub: user_id, exp: expiration };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e).context("signing session token")))
}

fn decode_user_id(headers: &HeaderMap, state: &AppState) -> Result<i64, ApiError> {
    let token = get_cookie_value(headers, AUTH_COOKIE)
        .ok_or_else(|| ApiError::Unauthorized("No token provided".to_string()))?;

    let token_data = jsonwebtoken::decode::<Claims>(
        &token,
        &jsonwebtoken::DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => {
            ApiError::Unauthorized("Token expired. Please login again.".to_string())
        }
        _ => ApiError::Unauthorized("Invalid token".to_string()),
    })?;

    Ok(token_data.claims.sub)
}

/// Resolve the session cookie to a full user row. Every protected handler
/// calls this first; any failure is a 401.
pub async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let user_id = decode_user_id(headers, state)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?;

    user.ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))
}

fn session_response(status: StatusCode, token: &str, user: &User, secure: bool) -> Response {
    let mut headers = HeaderMap::new();
    let cookie = build_cookie(AUTH_COOKIE, token, SESSION_DAYS * 24 * 60 * 60, secure);
    if let Ok(v) = HeaderValue::from_str(&cookie) {
        headers.append(SET_COOKIE, v);
    }
    (status, headers, Json(serde_json::json!({ "user": user.profile() }))).into_response()
}

async fn hash_password(password: String) -> Result<String, ApiError> {
    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::Error::new(e).context("hash worker failed")))?
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {e}")))
}

async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    task::spawn_blocking(move || match PasswordHash::new(&hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::Error::new(e).context("verify worker failed")))
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignupRequest>,
) -> Result<Response, ApiError> {
    let (name, email, password) = match (&payload.name, &payload.email, &payload.password) {
        (Some(n), Some(e), Some(p)) if !n.trim().is_empty() && !e.trim().is_empty() && !p.is_empty() => {
            (n.trim().to_string(), e.trim().to_ascii_lowercase(), p.clone())
        }
        _ => return Err(ApiError::Validation("Missing fields".to_string())),
    };
    tracing::info!("signup request for {}", email);

    let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let password_hash = hash_password(password).await?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (name, email, phone, password_hash) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(&name)
    .bind(&email)
    .bind(&payload.phone)
    .bind(&password_hash)
    .fetch_one(&state.db)
    .await
    .map_err(|e| conflict_on_unique(e, "Email already registered"))?;

    let token = create_jwt(user.id, &state.config.jwt_secret)?;
    Ok(session_response(StatusCode::CREATED, &token, &user, state.config.cookie_secure))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let email = payload.email.trim().to_ascii_lowercase();

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::Validation("Invalid credentials".to_string()))?;

    let is_valid = verify_password(payload.password, user.password_hash.clone()).await?;
    if !is_valid {
        return Err(ApiError::Validation("Invalid credentials".to_string()));
    }

    let token = create_jwt(user.id, &state.config.jwt_secret)?;
    Ok(session_response(StatusCode::OK, &token, &user, state.config.cookie_secure))
}

pub async fn logout(State(state): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(&clear_cookie(AUTH_COOKIE, state.config.cookie_secure)) {
        headers.append(SET_COOKIE, v);
    }
    (StatusCode::OK, headers, Json(serde_json::json!({ "message": "Logged out" }))).into_response()
}

pub async fn profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = current_user(&state, &headers).await?;
    Ok(Json(serde_json::json!({ "user": user.profile() })))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = current_user(&state, &headers).await?;

    let updated = sqlx::query_as::<_, User>(
        "UPDATE users SET name = COALESCE($1, name), phone = COALESCE($2, phone), \
         address = COALESCE($3, address) WHERE id = $4 RETURNING *",
    )
    .bind(&payload.name)
    .bind(&payload.phone)
    .bind(&payload.address)
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(serde_json::json!({ "user": updated.profile() })))
}

pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> ApiError {
    match &err {
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
        {
            ApiError::Conflict(message.to_string())
        }
        _ => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_carries_lax_http_only_and_expiry() {
        let cookie = build_cookie(AUTH_COOKIE, "abc", SESSION_DAYS * 24 * 60 * 60, false);
        assert!(cookie.starts_with("token=abc;"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn secure_flag_is_appended_when_configured() {
        assert!(build_cookie(AUTH_COOKIE, "abc", 60, true).ends_with("; Secure"));
        assert!(clear_cookie(AUTH_COOKIE, true).contains("Secure"));
    }

    #[test]
    fn cookie_header_parsing_finds_the_named_pair() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("a=1; token=xyz; b=2"));
        assert_eq!(get_cookie_value(&headers, AUTH_COOKIE).as_deref(), Some("xyz"));
        assert_eq!(get_cookie_value(&headers, "missing"), None);
    }
}
