use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::{ItemKind, ItemSummary};
use crate::error::{AppError, AppResult};
use crate::events::{ITEMS_REORDERED, ITEM_CREATED, ITEM_DELETED};
use crate::items::{FilePayload, ItemRepository as _, ListCursor, ListQuery, NewItem};
use crate::routes::{flag_is_true, payload_response, Disposition};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: usize = 24;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route("/items/reorder", post(reorder_items))
        .route("/items/{id}", get(get_item).delete(delete_item))
        .route("/items/{id}/payload", get(item_payload))
}

#[derive(Deserialize)]
struct ListParams {
    search: Option<String>,
    cursor: Option<String>,
    limit: Option<usize>,
}

async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<serde_json::Value>> {
    let cursor = params
        .cursor
        .as_deref()
        .map(ListCursor::decode)
        .transpose()?;
    let page = state
        .items
        .list(ListQuery {
            search: params.search.filter(|s| !s.is_empty()),
            cursor,
            limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        })
        .await?;

    let items: Vec<ItemSummary> = page.items.iter().map(ItemSummary::from).collect();
    Ok(Json(json!({
        "items": items,
        "nextCursor": page.next_cursor,
        "hasMore": page.has_more,
    })))
}

async fn create_item(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut kind: Option<ItemKind> = None;
    let mut text_content: Option<String> = None;
    let mut file: Option<FilePayload> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("type") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("unreadable type field: {e}")))?;
                kind = Some(
                    ItemKind::parse(&raw)
                        .ok_or_else(|| AppError::InvalidInput(format!("unknown type {raw:?}")))?,
                );
            }
            Some("content") => {
                text_content = Some(field.text().await.map_err(|e| {
                    AppError::InvalidInput(format!("unreadable content field: {e}"))
                })?);
            }
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let mime_type = field.content_type().map(str::to_string);

                let mut sink = state.storage.stage_payload(file_name.as_deref());
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("upload interrupted: {e}")))?
                {
                    sink.write(&chunk).await?;
                }
                file = Some(FilePayload {
                    file_name,
                    mime_type,
                    staged: sink.finish().await?,
                });
            }
            _ => {}
        }
    }

    let item = state
        .storage
        .put(NewItem {
            kind,
            text_content: text_content.filter(|t| !t.is_empty()),
            file,
        })
        .await?;

    let summary = ItemSummary::from(&item);
    state
        .hub
        .broadcast(ITEM_CREATED, serde_json::to_value(&summary)?);
    Ok((StatusCode::CREATED, Json(summary)).into_response())
}

async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ItemSummary>> {
    let item = state.storage.get(&id).await?;
    Ok(Json(ItemSummary::from(&item)))
}

async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state.storage.delete(&id).await?;
    state.hub.broadcast(ITEM_DELETED, json!({ "id": id }));
    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize)]
struct ReorderRequest {
    ids: Vec<String>,
}

async fn reorder_items(
    State(state): State<AppState>,
    Json(req): Json<ReorderRequest>,
) -> AppResult<Json<serde_json::Value>> {
    if req.ids.is_empty() {
        return Ok(Json(json!({ "ok": true })));
    }

    let applied = state.items.reorder(&req.ids).await?;

    // Weights let connected clients re-sequence without a refetch
    let weights: serde_json::Map<String, serde_json::Value> = applied
        .iter()
        .map(|(id, w)| (id.clone(), json!(w)))
        .collect();
    state.hub.broadcast(
        ITEMS_REORDERED,
        json!({ "ids": req.ids, "weights": weights }),
    );
    Ok(Json(json!({ "ok": true })))
}

#[derive(Deserialize)]
struct PayloadParams {
    download: Option<String>,
}

async fn item_payload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PayloadParams>,
) -> AppResult<Response> {
    let (item, payload) = state.storage.read_payload(&id).await?;
    let disposition = if flag_is_true(params.download.as_deref()) {
        Disposition::Attachment
    } else {
        Disposition::Inline
    };
    // Payload bytes are immutable for a given id, so cache hard
    Ok(payload_response(
        &item,
        payload,
        disposition,
        "public, max-age=31536000, immutable",
    ))
}
