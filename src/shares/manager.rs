use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::auth::constant_time_eq;
use crate::db::models::{Item, ShareLink};
use crate::error::{AppError, AppResult, ShareInvalidReason};
use crate::items::{Payload, StorageTier};
use crate::shares::repository::{ShareLinkRepository, ShareListPage, ShareListQuery};

/// Policy fields for a new share link.
#[derive(Debug, Clone, Default)]
pub struct ShareTerms {
    /// Absolute expiry, unix seconds. Wins over `expires_in` when both given.
    pub expires_at: Option<i64>,
    /// Relative expiry in seconds from now; ignored unless positive.
    pub expires_in: Option<i64>,
    pub max_downloads: Option<i64>,
    pub password: Option<String>,
}

/// Issues, validates and retires capability tokens for item payloads.
pub struct ShareManager {
    shares: Arc<dyn ShareLinkRepository>,
    storage: Arc<StorageTier>,
}

impl ShareManager {
    pub fn new(shares: Arc<dyn ShareLinkRepository>, storage: Arc<StorageTier>) -> Self {
        Self { shares, storage }
    }

    pub async fn create(&self, item_id: &str, terms: ShareTerms) -> AppResult<ShareLink> {
        if let Some(max) = terms.max_downloads {
            if max < 0 {
                return Err(AppError::InvalidInput(
                    "maxDownloads must be non-negative".into(),
                ));
            }
        }
        // NotFound when the item does not exist
        let item = self.storage.get(item_id).await?;

        let now = chrono::Utc::now().timestamp();
        let expires_at = terms.expires_at.or_else(|| {
            terms
                .expires_in
                .filter(|secs| *secs > 0)
                .map(|secs| now + secs)
        });

        let token = generate_token();
        let password_hash = terms
            .password
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| hash_password(p, &token));

        let link = ShareLink {
            token,
            item_id: item.id,
            expires_at,
            max_downloads: terms.max_downloads,
            download_count: 0,
            revoked: false,
            password_hash,
            created_at: now,
            updated_at: now,
        };
        self.shares.insert(&link).await?;
        Ok(link)
    }

    /// Look up a link and its item, rejecting anything no longer valid. The
    /// reason is carried internally; HTTP callers see a uniform 404.
    pub async fn resolve(&self, token: &str) -> AppResult<(ShareLink, Item)> {
        let link = self
            .shares
            .get(token)
            .await?
            .ok_or(AppError::InvalidShare(ShareInvalidReason::NotFound))?;

        if let Some(reason) = classify(&link, chrono::Utc::now().timestamp()) {
            return Err(AppError::InvalidShare(reason));
        }

        let item = match self.storage.get(&link.item_id).await {
            Ok(item) => item,
            // The owning item vanished between cascade and lookup
            Err(AppError::NotFound) => {
                return Err(AppError::InvalidShare(ShareInvalidReason::NotFound))
            }
            Err(e) => return Err(e),
        };
        Ok((link, item))
    }

    /// Check a candidate password and hand back the per-token credential a
    /// caller presents on later payload reads.
    pub async fn verify_password(&self, token: &str, candidate: &str) -> AppResult<String> {
        let (link, _) = self.resolve(token).await?;
        let stored = link
            .password_hash
            .ok_or_else(|| AppError::InvalidInput("no password set".into()))?;

        let computed = hash_password(candidate, token);
        if !constant_time_eq(&computed, &stored) {
            return Err(AppError::Unauthorized);
        }
        Ok(stored)
    }

    /// Resolve, enforce the password credential, count the download, and open
    /// the payload. The counter bump is a conditional server-side increment;
    /// losing the race for the last slot yields `Invalid`, and an increment
    /// I/O failure is logged without blocking an already-validated download.
    pub async fn download(
        &self,
        token: &str,
        credential: Option<&str>,
    ) -> AppResult<(ShareLink, Item, Payload)> {
        let (link, item) = self.resolve(token).await?;
        authorize(&link, credential)?;

        match self.shares.increment_download(token).await {
            Ok(true) => {}
            Ok(false) => return Err(AppError::InvalidShare(ShareInvalidReason::Exhausted)),
            Err(e) => {
                tracing::warn!("download counter increment failed for share: {}", e);
            }
        }

        let (_, payload) = self.payload_for(&item).await?;
        Ok((link, item, payload))
    }

    /// Same gating as `download` but without spending quota; backs inline
    /// previews on the share page.
    pub async fn view(
        &self,
        token: &str,
        credential: Option<&str>,
    ) -> AppResult<(ShareLink, Item, Payload)> {
        let (link, item) = self.resolve(token).await?;
        authorize(&link, credential)?;
        let (_, payload) = self.payload_for(&item).await?;
        Ok((link, item, payload))
    }

    pub async fn revoke(&self, token: &str) -> AppResult<()> {
        if !self.shares.revoke(token).await? {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    pub async fn delete(&self, token: &str) -> AppResult<()> {
        if !self.shares.delete(token).await? {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Rotate a link: the old token dies, a fresh one is born under the same
    /// expiry and download-cap policy with a zeroed counter. Password
    /// protection carries over only when a new password is supplied, because
    /// stored hashes are salted with the token they were minted for.
    pub async fn reset(&self, token: &str, new_password: Option<&str>) -> AppResult<ShareLink> {
        let old = self.shares.get(token).await?.ok_or(AppError::NotFound)?;

        let new_token = generate_token();
        let password_hash = new_password
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| hash_password(p, &new_token));

        let now = chrono::Utc::now().timestamp();
        let replacement = ShareLink {
            token: new_token,
            item_id: old.item_id.clone(),
            expires_at: old.expires_at,
            max_downloads: old.max_downloads,
            download_count: 0,
            revoked: false,
            password_hash,
            created_at: now,
            updated_at: now,
        };

        if !self.shares.replace(token, &replacement).await? {
            return Err(AppError::NotFound);
        }
        Ok(replacement)
    }

    pub async fn list(&self, query: ShareListQuery) -> AppResult<ShareListPage> {
        self.shares.list(query).await
    }

    async fn payload_for(&self, item: &Item) -> AppResult<(Item, Payload)> {
        match self.storage.read_payload(&item.id).await {
            Err(AppError::NotFound) => Err(AppError::InvalidShare(ShareInvalidReason::NotFound)),
            other => other,
        }
    }
}

/// First failing condition wins; `None` means the link is live.
pub fn classify(link: &ShareLink, now: i64) -> Option<ShareInvalidReason> {
    if link.revoked {
        return Some(ShareInvalidReason::Revoked);
    }
    if let Some(expires_at) = link.expires_at {
        if expires_at <= now {
            return Some(ShareInvalidReason::Expired);
        }
    }
    if let Some(max) = link.max_downloads {
        if link.download_count >= max {
            return Some(ShareInvalidReason::Exhausted);
        }
    }
    None
}

fn authorize(link: &ShareLink, credential: Option<&str>) -> AppResult<()> {
    if let Some(ref stored) = link.password_hash {
        match credential {
            Some(c) if constant_time_eq(c, stored) => Ok(()),
            _ => Err(AppError::Unauthorized),
        }
    } else {
        Ok(())
    }
}

/// 18 random bytes, base64url: 144 bits of entropy, URL-safe, no padding.
fn generate_token() -> String {
    let mut buf = [0u8; 18];
    rand::thread_rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Digest is salted with the token so identical passwords on different links
/// never share a hash.
pub fn hash_password(password: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(b"|");
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
