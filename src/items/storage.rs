use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;

use crate::db::models::{Item, ItemKind, PayloadLocation};
use crate::error::{AppError, AppResult};
use crate::items::repository::ItemRepository;

/// Mixed inline/on-disk payload storage. Small payloads live in the item
/// record; larger ones are written under the uploads directory, named by item
/// id plus the original extension so the file can be found without the
/// metadata store.
pub struct StorageTier {
    items: Arc<dyn ItemRepository>,
    uploads_dir: PathBuf,
    inline_threshold: u64,
    max_upload_size: u64,
}

#[derive(Debug, Default)]
pub struct NewItem {
    /// Inferred from the payload when absent.
    pub kind: Option<ItemKind>,
    pub text_content: Option<String>,
    pub file: Option<FilePayload>,
}

#[derive(Debug)]
pub struct FilePayload {
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub staged: StagedPayload,
}

/// A fully-received payload waiting for its item record. Produced by
/// [`PayloadSink::finish`]; consumed by [`StorageTier::put`].
#[derive(Debug)]
pub struct StagedPayload {
    item_id: String,
    location: PayloadLocation,
    size: u64,
    abs_path: Option<PathBuf>,
}

/// Chunked payload writer. Buffers in memory until the inline threshold is
/// crossed, then spills everything to disk. Dropping an unfinished sink
/// removes any partial file.
pub struct PayloadSink {
    item_id: String,
    rel_name: String,
    abs_path: PathBuf,
    buf: Vec<u8>,
    file: Option<tokio::fs::File>,
    spilled: bool,
    total: u64,
    inline_threshold: u64,
    max_upload_size: u64,
    finished: bool,
}

pub enum Payload {
    Inline(Vec<u8>),
    File { file: tokio::fs::File, len: u64 },
}

impl StorageTier {
    pub fn new(
        items: Arc<dyn ItemRepository>,
        uploads_dir: PathBuf,
        inline_threshold: u64,
        max_upload_size: u64,
    ) -> Self {
        Self {
            items,
            uploads_dir,
            inline_threshold,
            max_upload_size,
        }
    }

    pub fn uploads_dir(&self) -> &PathBuf {
        &self.uploads_dir
    }

    /// Open a sink for an incoming file payload. The item id is minted here
    /// so the on-disk name and the record key always agree.
    pub fn stage_payload(&self, file_name: Option<&str>) -> PayloadSink {
        let item_id = uuid::Uuid::now_v7().to_string();
        let ext = file_name
            .and_then(|n| std::path::Path::new(n).extension())
            .and_then(|e| e.to_str());
        let rel_name = match ext {
            Some(ext) if !ext.is_empty() => format!("{item_id}.{ext}"),
            _ => item_id.clone(),
        };
        let abs_path = self.uploads_dir.join(&rel_name);
        PayloadSink {
            item_id,
            rel_name,
            abs_path,
            buf: Vec::new(),
            file: None,
            spilled: false,
            total: 0,
            inline_threshold: self.inline_threshold,
            max_upload_size: self.max_upload_size,
            finished: false,
        }
    }

    /// Commit a new item. The record insert and any staged file must both
    /// take effect or neither: an insert failure deletes the staged file.
    pub async fn put(&self, new: NewItem) -> AppResult<Item> {
        if new.text_content.is_none() && new.file.is_none() {
            return Err(AppError::InvalidInput(
                "text content or file payload is required".into(),
            ));
        }

        let (id, file_name, file_size, mime_type, payload, abs_path) = match new.file {
            Some(file) => {
                let mime_type = file.mime_type.or_else(|| {
                    file.file_name
                        .as_deref()
                        .map(|n| mime_guess::from_path(n).first_or_octet_stream().to_string())
                });
                (
                    file.staged.item_id,
                    file.file_name,
                    Some(file.staged.size as i64),
                    mime_type,
                    Some(file.staged.location),
                    file.staged.abs_path,
                )
            }
            None => (
                uuid::Uuid::now_v7().to_string(),
                None,
                None,
                None,
                None,
                None,
            ),
        };

        let kind = new.kind.unwrap_or(match (&payload, &mime_type) {
            (Some(_), Some(m)) if m.starts_with("image/") => ItemKind::Image,
            (Some(_), _) => ItemKind::File,
            (None, _) => ItemKind::Text,
        });

        let now = chrono::Utc::now().timestamp();
        let mut item = Item {
            id,
            kind,
            text_content: new.text_content,
            file_name,
            file_size,
            mime_type,
            payload,
            sort_weight: 0,
            created_at: now,
            updated_at: now,
        };

        match self.items.insert(&item).await {
            Ok(weight) => {
                item.sort_weight = weight;
                Ok(item)
            }
            Err(e) => {
                // No record committed; remove the orphaned file if we spilled
                if let Some(path) = abs_path {
                    if let Err(io_err) = tokio::fs::remove_file(&path).await {
                        tracing::warn!(
                            "failed to remove orphaned upload {}: {}",
                            path.display(),
                            io_err
                        );
                    }
                }
                Err(e)
            }
        }
    }

    pub async fn get(&self, id: &str) -> AppResult<Item> {
        self.items.get(id).await?.ok_or(AppError::NotFound)
    }

    /// Open the payload for reading. The returned item carries metadata only;
    /// bytes come back through [`Payload`].
    pub async fn read_payload(&self, id: &str) -> AppResult<(Item, Payload)> {
        let mut item = self.items.get(id).await?.ok_or(AppError::NotFound)?;

        let payload = match item.payload.take() {
            Some(PayloadLocation::Inline(bytes)) => Payload::Inline(bytes),
            Some(PayloadLocation::OnDisk(rel)) => {
                let abs = self.uploads_dir.join(&rel);
                let file = match tokio::fs::File::open(&abs).await {
                    Ok(f) => f,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        tracing::error!("payload file {} missing for item {}", abs.display(), id);
                        return Err(AppError::PayloadMissing);
                    }
                    Err(e) => return Err(e.into()),
                };
                let len = file.metadata().await?.len();
                Payload::File { file, len }
            }
            None => match item.text_content.clone() {
                Some(text) => Payload::Inline(text.into_bytes()),
                None => return Err(AppError::PayloadMissing),
            },
        };

        Ok((item, payload))
    }

    /// Delete the record (share links cascade at the database layer) and
    /// best-effort remove the on-disk payload.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let removed = self.items.remove(id).await?.ok_or(AppError::NotFound)?;

        if let Some(rel) = removed.file_path {
            let abs = self.uploads_dir.join(&rel);
            match tokio::fs::remove_file(&abs).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!("payload file {} already absent", abs.display());
                }
                Err(e) => {
                    tracing::error!("failed to remove payload {}: {}", abs.display(), e);
                }
            }
        }
        Ok(())
    }
}

impl PayloadSink {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub async fn write(&mut self, chunk: &[u8]) -> AppResult<()> {
        self.total += chunk.len() as u64;
        if self.total > self.max_upload_size {
            return Err(AppError::PayloadTooLarge {
                limit: self.max_upload_size,
            });
        }

        if self.file.is_none() && self.buf.len() as u64 + chunk.len() as u64 <= self.inline_threshold
        {
            self.buf.extend_from_slice(chunk);
            return Ok(());
        }

        if self.file.is_none() {
            // Spill: from here on the handle lives in self so a failed write
            // still leaves Drop something to clean up
            self.file = Some(tokio::fs::File::create(&self.abs_path).await?);
            self.spilled = true;
            let buffered = std::mem::take(&mut self.buf);
            if !buffered.is_empty() {
                if let Some(file) = self.file.as_mut() {
                    file.write_all(&buffered).await?;
                }
            }
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(chunk).await?;
        }
        Ok(())
    }

    pub async fn finish(mut self) -> AppResult<StagedPayload> {
        let location = match self.file.take() {
            Some(mut file) => {
                file.flush().await?;
                PayloadLocation::OnDisk(std::mem::take(&mut self.rel_name))
            }
            None => PayloadLocation::Inline(std::mem::take(&mut self.buf)),
        };
        self.finished = true;

        let abs_path = match location {
            PayloadLocation::OnDisk(_) => Some(self.abs_path.clone()),
            PayloadLocation::Inline(_) => None,
        };

        Ok(StagedPayload {
            item_id: std::mem::take(&mut self.item_id),
            location,
            size: self.total,
            abs_path,
        })
    }
}

impl Drop for PayloadSink {
    fn drop(&mut self) {
        if !self.finished && self.spilled {
            self.file = None;
            if let Err(e) = std::fs::remove_file(&self.abs_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        "failed to clean up partial upload {}: {}",
                        self.abs_path.display(),
                        e
                    );
                }
            }
        }
    }
}
