use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Compare two secrets without leaking their difference through timing.
/// Hashing first also makes the comparison length-independent.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let da = Sha256::digest(a.as_bytes());
    let db = Sha256::digest(b.as_bytes());
    da.iter()
        .zip(db.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Pull a single cookie value out of the Cookie header(s).
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val.to_string())
            } else {
                None
            }
        })
}

/// True when the request arrived over HTTPS as seen by a fronting proxy.
pub fn forwarded_https(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// Single-password gate for the relay API. Accepts `Authorization: Bearer`
/// or the auth cookie; passes everything through when no password is
/// configured (localhost-only deployments).
pub async fn require_password(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.auth.password.as_deref() else {
        return next.run(req).await;
    };

    let headers = req.headers();
    let bearer_ok = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| constant_time_eq(token, expected))
        .unwrap_or(false);

    let authorized = bearer_ok
        || cookie_value(headers, &state.config.auth.cookie_name)
            .map(|v| constant_time_eq(&v, expected))
            .unwrap_or(false);

    if !authorized {
        return AppError::Unauthorized.into_response();
    }
    next.run(req).await
}

#[derive(Deserialize)]
struct VerifyRequest {
    password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/verify", post(verify))
        .route("/auth/logout", post(logout))
}

async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<VerifyRequest>,
) -> AppResult<Response> {
    let Some(expected) = state.config.auth.password.as_deref() else {
        return Err(AppError::InvalidInput(
            "authentication is not enabled on this server".into(),
        ));
    };
    if !constant_time_eq(&body.password, expected) {
        return Err(AppError::Unauthorized);
    }

    let cookie = format!(
        "{}={}; Max-Age={}; Path=/; SameSite=Lax; HttpOnly{}",
        state.config.auth.cookie_name,
        expected,
        state.config.auth.cookie_max_age_secs,
        if forwarded_https(&headers) { "; Secure" } else { "" },
    );
    let mut res = Json(serde_json::json!({"success": true})).into_response();
    res.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|_| AppError::InvalidInput("password is not cookie-safe".into()))?,
    );
    Ok(res)
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let cookie = format!(
        "{}=; Max-Age=0; Path=/; SameSite=Lax; HttpOnly{}",
        state.config.auth.cookie_name,
        if forwarded_https(&headers) { "; Secure" } else { "" },
    );
    let mut res = Json(serde_json::json!({"success": true})).into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        res.headers_mut().insert(header::SET_COOKIE, value);
    }
    (StatusCode::OK, res).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "Secret"));
        assert!(!constant_time_eq("secret", "secret2"));
        assert!(!constant_time_eq("", "x"));
    }

    #[test]
    fn cookie_value_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("a=1; cliprelay_auth=hunter2; b=2"),
        );
        assert_eq!(
            cookie_value(&headers, "cliprelay_auth").as_deref(),
            Some("hunter2")
        );
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn forwarded_https_detects_proxy_scheme() {
        let mut headers = HeaderMap::new();
        assert!(!forwarded_https(&headers));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert!(forwarded_https(&headers));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
        assert!(!forwarded_https(&headers));
    }
}
