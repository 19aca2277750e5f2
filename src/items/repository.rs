// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::db::models::{Item, ItemKind, PayloadLocation};
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

/// Hard cap on a single listing page.
pub const MAX_LIST_LIMIT: usize = 48;

/// Keyset cursor: the sort key of the last row the caller has seen. Encoded
/// opaquely so clients cannot depend on its layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListCursor {
    #[serde(rename = "w")]
    pub sort_weight: i64,
    #[serde(rename = "c")]
    pub created_at: i64,
    #[serde(rename = "i")]
    pub id: String,
}

impl ListCursor {
    pub fn encode(&self) -> String {
        // Serializing a struct of two ints and a string cannot fail
        let json = serde_json::to_vec(self).expect("cursor serialization");
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(raw: &str) -> AppResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|_| AppError::InvalidInput("malformed cursor".into()))?;
        serde_json::from_slice(&bytes)
            .map_err(|_| AppError::InvalidInput("malformed cursor".into()))
    }

    pub fn from_item(item: &Item) -> Self {
        Self {
            sort_weight: item.sort_weight,
            created_at: item.created_at,
            id: item.id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Case-sensitive substring match over text content and file name.
    pub search: Option<String>,
    pub cursor: Option<ListCursor>,
    pub limit: usize,
}

#[derive(Debug)]
pub struct ListPage {
    pub items: Vec<Item>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// What `remove` hands back so the storage tier can clean up disk state.
#[derive(Debug, PartialEq, Eq)]
pub struct RemovedItem {
    pub file_path: Option<String>,
}

#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Insert a new item record. The stored sort weight is one past the
    /// current maximum so fresh items surface on top; it is returned to the
    /// caller.
    async fn insert(&self, item: &Item) -> AppResult<i64>;

    async fn get(&self, id: &str) -> AppResult<Option<Item>>;

    /// Delete the record (share links cascade). Returns `None` when no such
    /// item exists.
    async fn remove(&self, id: &str) -> AppResult<Option<RemovedItem>>;

    /// Keyset-paginated listing ordered by
    /// `(sort_weight DESC, created_at DESC, id DESC)`. Inline payload bytes
    /// are not materialized into the returned items.
    async fn list(&self, query: ListQuery) -> AppResult<ListPage>;

    /// Assign descending weights above the current maximum so the given ids
    /// render in exactly this order at the top of the list. Unknown ids are
    /// skipped. All updates commit as one transaction. Returns the
    /// `(id, weight)` pairs actually applied.
    async fn reorder(&self, ids: &[String]) -> AppResult<Vec<(String, i64)>>;
}

/// SQLite implementation
pub struct SqliteItemRepository {
    pool: DbPool,
}

impl SqliteItemRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const ITEM_COLUMNS: &str =
    "id, kind, text_content, file_name, file_size, mime_type, inline_data, file_path, \
     sort_weight, created_at, updated_at";

fn map_item_row(row: &rusqlite::Row<'_>, with_inline: bool) -> rusqlite::Result<Item> {
    let kind_raw: String = row.get(1)?;
    let inline: Option<Vec<u8>> = if with_inline { row.get(6)? } else { None };
    let file_path: Option<String> = row.get(7)?;
    Ok(Item {
        id: row.get(0)?,
        kind: ItemKind::parse(&kind_raw).unwrap_or(ItemKind::File),
        text_content: row.get(2)?,
        file_name: row.get(3)?,
        file_size: row.get(4)?,
        mime_type: row.get(5)?,
        payload: PayloadLocation::from_columns(inline, file_path),
        sort_weight: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

#[async_trait]
impl ItemRepository for SqliteItemRepository {
    async fn insert(&self, item: &Item) -> AppResult<i64> {
        let conn = self.pool.get()?;
        let (inline_data, file_path) = match item.payload.clone() {
            Some(loc) => loc.into_columns(),
            None => (None, None),
        };

        conn.execute("BEGIN IMMEDIATE", [])?;
        let result: AppResult<i64> = (|| {
            let max: i64 = conn.query_row(
                "SELECT COALESCE(MAX(sort_weight), 0) FROM items",
                [],
                |r| r.get(0),
            )?;
            let weight = max + 1;
            conn.execute(
                "INSERT INTO items (id, kind, text_content, file_name, file_size, mime_type, \
                 inline_data, file_path, sort_weight, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    item.id,
                    item.kind.as_str(),
                    item.text_content,
                    item.file_name,
                    item.file_size,
                    item.mime_type,
                    inline_data,
                    file_path,
                    weight,
                    item.created_at,
                    item.updated_at,
                ],
            )?;
            Ok(weight)
        })();

        match result {
            Ok(weight) => {
                conn.execute("COMMIT", [])?;
                Ok(weight)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    async fn get(&self, id: &str) -> AppResult<Option<Item>> {
        let conn = self.pool.get()?;
        let result = conn.query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
            params![id],
            |row| map_item_row(row, true),
        );
        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, id: &str) -> AppResult<Option<RemovedItem>> {
        let conn = self.pool.get()?;

        conn.execute("BEGIN IMMEDIATE", [])?;
        let result: AppResult<Option<RemovedItem>> = (|| {
            let file_path = match conn.query_row(
                "SELECT file_path FROM items WHERE id = ?1",
                params![id],
                |r| r.get::<_, Option<String>>(0),
            ) {
                Ok(fp) => fp,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
            Ok(Some(RemovedItem { file_path }))
        })();

        match result {
            Ok(removed) => {
                conn.execute("COMMIT", [])?;
                Ok(removed)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    async fn list(&self, query: ListQuery) -> AppResult<ListPage> {
        let limit = query.limit.clamp(1, MAX_LIST_LIMIT);
        let conn = self.pool.get()?;

        // inline_data is deliberately not selected; listing pages can be wide
        // and the bytes are only reachable through read_payload.
        let mut sql = String::from(
            "SELECT id, kind, text_content, file_name, file_size, mime_type, \
             NULL, file_path, sort_weight, created_at, updated_at FROM items",
        );
        let mut where_clauses: Vec<String> = Vec::new();
        let mut bind: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(ref term) = query.search {
            // instr() keeps the match case-sensitive; LIKE folds ASCII case.
            where_clauses
                .push("(instr(text_content, ?) > 0 OR instr(file_name, ?) > 0)".into());
            bind.push(term.clone().into());
            bind.push(term.clone().into());
        }
        if let Some(ref cursor) = query.cursor {
            where_clauses.push(
                "(sort_weight < ? OR (sort_weight = ? AND (created_at < ? \
                 OR (created_at = ? AND id < ?))))"
                    .into(),
            );
            bind.push(cursor.sort_weight.into());
            bind.push(cursor.sort_weight.into());
            bind.push(cursor.created_at.into());
            bind.push(cursor.created_at.into());
            bind.push(cursor.id.clone().into());
        }
        if !where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY sort_weight DESC, created_at DESC, id DESC LIMIT ?");
        bind.push(((limit as i64) + 1).into());

        let mut stmt = conn.prepare(&sql)?;
        let bind_refs: Vec<&dyn rusqlite::ToSql> =
            bind.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
        let mut rows = stmt
            .query_map(bind_refs.as_slice(), |row| map_item_row(row, false))?
            .collect::<Result<Vec<_>, _>>()?;

        let has_more = rows.len() > limit;
        if has_more {
            rows.truncate(limit);
        }
        let next_cursor = if has_more {
            rows.last().map(|item| ListCursor::from_item(item).encode())
        } else {
            None
        };

        Ok(ListPage {
            items: rows,
            next_cursor,
            has_more,
        })
    }

    async fn reorder(&self, ids: &[String]) -> AppResult<Vec<(String, i64)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let now = chrono::Utc::now().timestamp();
        let conn = self.pool.get()?;

        conn.execute("BEGIN IMMEDIATE", [])?;
        let result: AppResult<Vec<(String, i64)>> = (|| {
            let max: i64 = conn.query_row(
                "SELECT COALESCE(MAX(sort_weight), 0) FROM items",
                [],
                |r| r.get(0),
            )?;
            let base = max + ids.len() as i64;
            let mut applied = Vec::with_capacity(ids.len());
            for (i, id) in ids.iter().enumerate() {
                let weight = base - i as i64;
                let changed = conn.execute(
                    "UPDATE items SET sort_weight = ?1, updated_at = ?2 WHERE id = ?3",
                    params![weight, now, id],
                )?;
                // ids deleted by a concurrent request are skipped, not an error
                if changed > 0 {
                    applied.push((id.clone(), weight));
                }
            }
            Ok(applied)
        })();

        match result {
            Ok(applied) => {
                conn.execute("COMMIT", [])?;
                Ok(applied)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }
}
