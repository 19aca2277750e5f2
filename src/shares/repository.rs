// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use rusqlite::params;

use crate::db::models::{ItemKind, ShareLink};
use crate::error::AppResult;
use crate::state::DbPool;

pub const MAX_SHARE_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct ShareListQuery {
    pub item_id: Option<String>,
    /// When false, expired/exhausted/revoked links are filtered out at read
    /// time; validity is never swept in the background.
    pub include_invalid: bool,
    pub page: usize,
    pub page_size: usize,
}

/// A share link joined with just enough of its item for list rendering.
#[derive(Debug)]
pub struct ShareListEntry {
    pub link: ShareLink,
    pub item_kind: ItemKind,
    pub item_file_name: Option<String>,
    pub item_file_size: Option<i64>,
    pub item_mime_type: Option<String>,
}

#[derive(Debug)]
pub struct ShareListPage {
    pub entries: Vec<ShareListEntry>,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

#[async_trait]
pub trait ShareLinkRepository: Send + Sync {
    async fn insert(&self, link: &ShareLink) -> AppResult<()>;

    async fn get(&self, token: &str) -> AppResult<Option<ShareLink>>;

    /// Returns false when the token does not exist.
    async fn delete(&self, token: &str) -> AppResult<bool>;

    /// One-way flag; flipping an already-revoked link is not an error.
    /// Returns false when the token does not exist.
    async fn revoke(&self, token: &str) -> AppResult<bool>;

    /// Server-side conditional increment: bumps the counter only while it is
    /// below `max_downloads` (always when unbounded). Returns false when the
    /// quota was already spent, so two racing downloads can never push the
    /// counter past the cap.
    async fn increment_download(&self, token: &str) -> AppResult<bool>;

    /// Atomically retire `old_token` and insert its replacement.
    /// Returns false (inserting nothing) when the old token does not exist.
    async fn replace(&self, old_token: &str, new_link: &ShareLink) -> AppResult<bool>;

    async fn list(&self, query: ShareListQuery) -> AppResult<ShareListPage>;
}

/// SQLite implementation
pub struct SqliteShareLinkRepository {
    pool: DbPool,
}

impl SqliteShareLinkRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SHARE_COLUMNS: &str =
    "token, item_id, expires_at, max_downloads, download_count, revoked, password_hash, \
     created_at, updated_at";

fn map_share_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShareLink> {
    Ok(ShareLink {
        token: row.get(0)?,
        item_id: row.get(1)?,
        expires_at: row.get(2)?,
        max_downloads: row.get(3)?,
        download_count: row.get(4)?,
        revoked: row.get(5)?,
        password_hash: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn insert_link(conn: &rusqlite::Connection, link: &ShareLink) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO share_links (token, item_id, expires_at, max_downloads, download_count, \
         revoked, password_hash, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            link.token,
            link.item_id,
            link.expires_at,
            link.max_downloads,
            link.download_count,
            link.revoked,
            link.password_hash,
            link.created_at,
            link.updated_at,
        ],
    )?;
    Ok(())
}

#[async_trait]
impl ShareLinkRepository for SqliteShareLinkRepository {
    async fn insert(&self, link: &ShareLink) -> AppResult<()> {
        let conn = self.pool.get()?;
        insert_link(&conn, link)?;
        Ok(())
    }

    async fn get(&self, token: &str) -> AppResult<Option<ShareLink>> {
        let conn = self.pool.get()?;
        let result = conn.query_row(
            &format!("SELECT {SHARE_COLUMNS} FROM share_links WHERE token = ?1"),
            params![token],
            map_share_row,
        );
        match result {
            Ok(link) => Ok(Some(link)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, token: &str) -> AppResult<bool> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM share_links WHERE token = ?1", params![token])?;
        Ok(rows > 0)
    }

    async fn revoke(&self, token: &str) -> AppResult<bool> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE share_links SET revoked = 1, updated_at = ?1 WHERE token = ?2",
            params![chrono::Utc::now().timestamp(), token],
        )?;
        Ok(rows > 0)
    }

    async fn increment_download(&self, token: &str) -> AppResult<bool> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE share_links \
             SET download_count = download_count + 1, updated_at = ?1 \
             WHERE token = ?2 \
               AND (max_downloads IS NULL OR download_count < max_downloads)",
            params![chrono::Utc::now().timestamp(), token],
        )?;
        Ok(rows > 0)
    }

    async fn replace(&self, old_token: &str, new_link: &ShareLink) -> AppResult<bool> {
        let conn = self.pool.get()?;

        conn.execute("BEGIN IMMEDIATE", [])?;
        let result: AppResult<bool> = (|| {
            let rows = conn.execute(
                "DELETE FROM share_links WHERE token = ?1",
                params![old_token],
            )?;
            if rows == 0 {
                return Ok(false);
            }
            insert_link(&conn, new_link)?;
            Ok(true)
        })();

        match result {
            Ok(replaced) => {
                conn.execute("COMMIT", [])?;
                Ok(replaced)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    async fn list(&self, query: ShareListQuery) -> AppResult<ShareListPage> {
        let page = query.page.max(1);
        let page_size = query.page_size.clamp(1, MAX_SHARE_PAGE_SIZE);
        let offset = (page - 1) * page_size;
        let conn = self.pool.get()?;

        let mut sql = String::from(
            "SELECT s.token, s.item_id, s.expires_at, s.max_downloads, s.download_count, \
             s.revoked, s.password_hash, s.created_at, s.updated_at, \
             i.kind, i.file_name, i.file_size, i.mime_type \
             FROM share_links s JOIN items i ON i.id = s.item_id",
        );
        let mut where_clauses: Vec<String> = Vec::new();
        let mut bind: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(ref item_id) = query.item_id {
            where_clauses.push("s.item_id = ?".into());
            bind.push(item_id.clone().into());
        }
        if !query.include_invalid {
            where_clauses.push(
                "s.revoked = 0 AND (s.expires_at IS NULL OR s.expires_at > ?) \
                 AND (s.max_downloads IS NULL OR s.download_count < s.max_downloads)"
                    .into(),
            );
            bind.push(chrono::Utc::now().timestamp().into());
        }
        if !where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY s.created_at DESC, s.token DESC LIMIT ? OFFSET ?");
        bind.push(((page_size as i64) + 1).into());
        bind.push((offset as i64).into());

        let mut stmt = conn.prepare(&sql)?;
        let bind_refs: Vec<&dyn rusqlite::ToSql> =
            bind.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
        let mut entries = stmt
            .query_map(bind_refs.as_slice(), |row| {
                let kind_raw: String = row.get(9)?;
                Ok(ShareListEntry {
                    link: map_share_row(row)?,
                    item_kind: ItemKind::parse(&kind_raw).unwrap_or(ItemKind::File),
                    item_file_name: row.get(10)?,
                    item_file_size: row.get(11)?,
                    item_mime_type: row.get(12)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let has_more = entries.len() > page_size;
        if has_more {
            entries.truncate(page_size);
        }

        Ok(ShareListPage {
            entries,
            page,
            page_size,
            has_more,
        })
    }
}
