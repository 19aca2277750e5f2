use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::auth::{cookie_value, forwarded_https};
use crate::db::models::{epoch_to_rfc3339, ItemKind, ShareLink};
use crate::error::{AppError, AppResult};
use crate::routes::{flag_is_true, payload_response, Disposition};
use crate::shares::{ShareListQuery, ShareTerms};
use crate::state::AppState;

const SHARE_COOKIE_MAX_AGE: i64 = 7 * 24 * 3600;
const DEFAULT_SHARE_PAGE_SIZE: usize = 20;

/// Management surface; mounted behind the password gate.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/shares", get(list_shares).post(create_share))
        .route("/shares/{token}", delete(delete_share))
        .route("/shares/{token}/revoke", post(revoke_share))
        .route("/shares/{token}/reset", post(reset_share))
}

/// Recipient-facing surface; reachable with nothing but the token.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/shares/{token}", get(share_meta))
        .route("/shares/{token}/verify", post(verify_share_password))
        .route("/shares/{token}/view", get(view_share))
        .route("/shares/{token}/download", get(download_share))
}

fn share_credential(headers: &HeaderMap, token: &str) -> Option<String> {
    cookie_value(headers, &format!("share_auth_{token}"))
}

fn share_url(token: &str) -> String {
    format!("/s/{token}")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateShareRequest {
    item_id: String,
    /// Seconds from now; `expiresAt` wins when both are present.
    expires_in: Option<i64>,
    /// RFC 3339; unparseable values are ignored.
    expires_at: Option<String>,
    max_downloads: Option<i64>,
    password: Option<String>,
}

fn created_share_json(link: &ShareLink) -> serde_json::Value {
    json!({
        "token": link.token,
        "url": share_url(&link.token),
        "expiresAt": link.expires_at.map(epoch_to_rfc3339),
        "maxDownloads": link.max_downloads,
        "requiresPassword": link.requires_password(),
    })
}

async fn create_share(
    State(state): State<AppState>,
    Json(req): Json<CreateShareRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if req.item_id.is_empty() {
        return Err(AppError::InvalidInput("itemId is required".into()));
    }
    let expires_at = req
        .expires_at
        .as_deref()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp());

    let link = state
        .shares
        .create(
            &req.item_id,
            ShareTerms {
                expires_at,
                expires_in: req.expires_in,
                max_downloads: req.max_downloads,
                password: req.password,
            },
        )
        .await?;

    Ok(Json(created_share_json(&link)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareListParams {
    item_id: Option<String>,
    include_invalid: Option<String>,
    page: Option<usize>,
    page_size: Option<usize>,
}

async fn list_shares(
    State(state): State<AppState>,
    Query(params): Query<ShareListParams>,
) -> AppResult<Json<serde_json::Value>> {
    let page = state
        .shares
        .list(ShareListQuery {
            item_id: params.item_id,
            include_invalid: flag_is_true(params.include_invalid.as_deref()),
            page: params.page.unwrap_or(1),
            page_size: params.page_size.unwrap_or(DEFAULT_SHARE_PAGE_SIZE),
        })
        .await?;

    let data: Vec<serde_json::Value> = page
        .entries
        .iter()
        .map(|entry| {
            json!({
                "token": entry.link.token,
                "url": share_url(&entry.link.token),
                "itemId": entry.link.item_id,
                "item": {
                    "id": entry.link.item_id,
                    "type": entry.item_kind,
                    "fileName": entry.item_file_name,
                    "fileSize": entry.item_file_size,
                    "contentType": entry.item_mime_type,
                },
                "expiresAt": entry.link.expires_at.map(epoch_to_rfc3339),
                "maxDownloads": entry.link.max_downloads,
                "downloadCount": entry.link.download_count,
                "revoked": entry.link.revoked,
                "requiresPassword": entry.link.requires_password(),
                "createdAt": epoch_to_rfc3339(entry.link.created_at),
                "updatedAt": epoch_to_rfc3339(entry.link.updated_at),
            })
        })
        .collect();

    Ok(Json(json!({
        "data": data,
        "page": page.page,
        "pageSize": page.page_size,
        "hasMore": page.has_more,
    })))
}

async fn share_meta(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<serde_json::Value>> {
    let (link, item) = state.shares.resolve(&token).await?;

    let authorized = match link.password_hash {
        Some(ref stored) => share_credential(&headers, &token)
            .map(|c| crate::auth::constant_time_eq(&c, stored))
            .unwrap_or(false),
        None => true,
    };

    // Text content is only disclosed once the password gate is cleared
    let content = if authorized && item.kind == ItemKind::Text {
        item.text_content.clone()
    } else {
        None
    };

    Ok(Json(json!({
        "token": link.token,
        "item": {
            "id": item.id,
            "type": item.kind,
            "fileName": item.file_name,
            "fileSize": item.file_size,
            "contentType": item.mime_type,
            "content": content,
            "createdAt": epoch_to_rfc3339(item.created_at),
            "updatedAt": epoch_to_rfc3339(item.updated_at),
        },
        "expiresAt": link.expires_at.map(epoch_to_rfc3339),
        "maxDownloads": link.max_downloads,
        "downloadCount": link.download_count,
        "requiresPassword": link.requires_password(),
        "authorized": authorized,
    })))
}

#[derive(Deserialize)]
struct VerifySharePassword {
    password: String,
}

async fn verify_share_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(req): Json<VerifySharePassword>,
) -> AppResult<Response> {
    let credential = state.shares.verify_password(&token, &req.password).await?;

    let cookie = format!(
        "share_auth_{}={}; Max-Age={}; Path=/; SameSite=Lax; HttpOnly{}",
        token,
        credential,
        SHARE_COOKIE_MAX_AGE,
        if forwarded_https(&headers) { "; Secure" } else { "" },
    );
    let mut res = Json(json!({"success": true})).into_response();
    res.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie)
            .map_err(|_| AppError::InvalidInput("token is not cookie-safe".into()))?,
    );
    Ok(res)
}

async fn view_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let credential = share_credential(&headers, &token);
    let (_, item, payload) = state.shares.view(&token, credential.as_deref()).await?;
    Ok(payload_response(
        &item,
        payload,
        Disposition::Inline,
        "no-store",
    ))
}

async fn download_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let credential = share_credential(&headers, &token);
    let (_, item, payload) = state.shares.download(&token, credential.as_deref()).await?;
    Ok(payload_response(
        &item,
        payload,
        Disposition::Attachment,
        "no-store",
    ))
}

async fn revoke_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.shares.revoke(&token).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize, Default)]
struct ResetShareRequest {
    password: Option<String>,
}

async fn reset_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<ResetShareRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let link = state.shares.reset(&token, req.password.as_deref()).await?;
    Ok(Json(created_share_json(&link)))
}

async fn delete_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.shares.delete(&token).await?;
    Ok(Json(json!({ "ok": true })))
}
