use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// What a stored item holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ItemKind {
    Text,
    Image,
    File,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Text => "TEXT",
            ItemKind::Image => "IMAGE",
            ItemKind::File => "FILE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TEXT" => Some(ItemKind::Text),
            "IMAGE" => Some(ItemKind::Image),
            "FILE" => Some(ItemKind::File),
            _ => None,
        }
    }
}

/// Where an item's file payload lives. Exactly one variant is recorded when a
/// file payload exists; pure-text items carry neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadLocation {
    /// Bytes stored directly in the item record.
    Inline(Vec<u8>),
    /// Path relative to the uploads directory.
    OnDisk(String),
}

impl PayloadLocation {
    /// Split into the (inline_data, file_path) column pair for SQL binding.
    pub fn into_columns(self) -> (Option<Vec<u8>>, Option<String>) {
        match self {
            PayloadLocation::Inline(bytes) => (Some(bytes), None),
            PayloadLocation::OnDisk(path) => (None, Some(path)),
        }
    }

    pub fn from_columns(inline: Option<Vec<u8>>, path: Option<String>) -> Option<Self> {
        match (inline, path) {
            (_, Some(p)) => Some(PayloadLocation::OnDisk(p)),
            (Some(b), None) => Some(PayloadLocation::Inline(b)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    pub text_content: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub payload: Option<PayloadLocation>,
    pub sort_weight: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Item view returned over the API. Payload bytes are never echoed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub content: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub content_type: Option<String>,
    pub sort_weight: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Item> for ItemSummary {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            kind: item.kind,
            content: item.text_content.clone(),
            file_name: item.file_name.clone(),
            file_size: item.file_size,
            content_type: item.mime_type.clone(),
            sort_weight: item.sort_weight,
            created_at: epoch_to_rfc3339(item.created_at),
            updated_at: epoch_to_rfc3339(item.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    pub token: String,
    pub item_id: String,
    pub expires_at: Option<i64>,
    pub max_downloads: Option<i64>,
    pub download_count: i64,
    pub revoked: bool,
    pub password_hash: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ShareLink {
    pub fn requires_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

pub fn epoch_to_rfc3339(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
