//! Cross-component flows: storage tier + share manager + event hub wired the
//! same way main() wires them, against a real on-disk database.

use std::sync::Arc;

use cliprelay::db;
use cliprelay::error::{AppError, ShareInvalidReason};
use cliprelay::events::{EventHub, ITEM_CREATED, ITEM_DELETED};
use cliprelay::items::{
    FilePayload, ItemRepository, ListQuery, NewItem, Payload, SqliteItemRepository, StorageTier,
};
use cliprelay::shares::{ShareManager, ShareTerms, SqliteShareLinkRepository};
use tempfile::TempDir;

struct Relay {
    items: Arc<SqliteItemRepository>,
    storage: Arc<StorageTier>,
    shares: Arc<ShareManager>,
    hub: Arc<EventHub>,
    dir: TempDir,
}

const INLINE_THRESHOLD: u64 = 1024;

fn relay() -> Relay {
    let dir = TempDir::new().unwrap();
    let pool = db::create_pool(&dir.path().join("relay.db")).unwrap();
    db::run_migrations(&pool).unwrap();

    let uploads = dir.path().join("uploads");
    std::fs::create_dir_all(&uploads).unwrap();

    let items = Arc::new(SqliteItemRepository::new(pool.clone()));
    let storage = Arc::new(StorageTier::new(
        items.clone(),
        uploads,
        INLINE_THRESHOLD,
        16 * 1024 * 1024,
    ));
    let shares = Arc::new(ShareManager::new(
        Arc::new(SqliteShareLinkRepository::new(pool)),
        storage.clone(),
    ));
    let hub = Arc::new(EventHub::new());

    Relay {
        items,
        storage,
        shares,
        hub,
        dir,
    }
}

async fn put_file(relay: &Relay, name: &str, bytes: &[u8]) -> cliprelay::db::models::Item {
    let mut sink = relay.storage.stage_payload(Some(name));
    for chunk in bytes.chunks(512) {
        sink.write(chunk).await.unwrap();
    }
    let staged = sink.finish().await.unwrap();
    relay
        .storage
        .put(NewItem {
            kind: None,
            text_content: None,
            file: Some(FilePayload {
                file_name: Some(name.to_string()),
                mime_type: None,
                staged,
            }),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn large_upload_lands_on_disk_and_delete_cascades_everything() {
    let relay = relay();
    let payload = vec![42u8; (INLINE_THRESHOLD + 1) as usize];
    let item = put_file(&relay, "dump.bin", &payload).await;

    // Payload spilled to a file named by the item id
    let uploads = relay.dir.path().join("uploads");
    let on_disk: Vec<_> = std::fs::read_dir(&uploads).unwrap().collect();
    assert_eq!(on_disk.len(), 1);
    assert!(on_disk[0]
        .as_ref()
        .unwrap()
        .file_name()
        .to_string_lossy()
        .starts_with(&item.id));

    let share = relay
        .shares
        .create(&item.id, ShareTerms::default())
        .await
        .unwrap();

    // Watch deletions through the hub like a connected client would
    let mut rx = relay.hub.subscribe("observer");

    relay.storage.delete(&item.id).await.unwrap();
    relay
        .hub
        .broadcast(ITEM_DELETED, serde_json::json!({ "id": item.id }));

    // File removed, record gone, share cascaded, event delivered
    assert_eq!(std::fs::read_dir(&uploads).unwrap().count(), 0);
    assert!(matches!(
        relay.storage.get(&item.id).await,
        Err(AppError::NotFound)
    ));
    assert!(matches!(
        relay.shares.resolve(&share.token).await,
        Err(AppError::InvalidShare(ShareInvalidReason::NotFound))
    ));
    let frame = rx.try_recv().unwrap();
    assert_eq!(frame.name, ITEM_DELETED);
}

#[tokio::test]
async fn shared_file_download_streams_bytes_and_spends_quota() {
    let relay = relay();
    let payload = vec![7u8; (INLINE_THRESHOLD * 2) as usize];
    let item = put_file(&relay, "movie.mp4", &payload).await;

    let share = relay
        .shares
        .create(
            &item.id,
            ShareTerms {
                max_downloads: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    for _ in 0..2 {
        let (_, _, body) = relay.shares.download(&share.token, None).await.unwrap();
        match body {
            Payload::File { len, .. } => assert_eq!(len, payload.len() as u64),
            Payload::Inline(_) => panic!("large payload must stream from disk"),
        }
    }

    assert!(matches!(
        relay.shares.download(&share.token, None).await,
        Err(AppError::InvalidShare(ShareInvalidReason::Exhausted))
    ));
}

#[tokio::test]
async fn text_item_round_trips_through_share_resolution() {
    let relay = relay();
    let item = relay
        .storage
        .put(NewItem {
            text_content: Some("hello".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    let (_, payload) = relay.storage.read_payload(&item.id).await.unwrap();
    match payload {
        Payload::Inline(bytes) => assert_eq!(bytes, b"hello"),
        Payload::File { .. } => panic!("text stays inline"),
    }

    let share = relay
        .shares
        .create(&item.id, ShareTerms::default())
        .await
        .unwrap();
    let (_, resolved_item) = relay.shares.resolve(&share.token).await.unwrap();
    assert_eq!(resolved_item.id, item.id);
}

#[tokio::test]
async fn reorder_floats_selection_over_fresh_items() {
    let relay = relay();
    let mut ids = Vec::new();
    for i in 0..4 {
        let item = relay
            .storage
            .put(NewItem {
                text_content: Some(format!("note {i}")),
                ..Default::default()
            })
            .await
            .unwrap();
        ids.push(item.id);
    }

    // Pin the oldest two on top, oldest first
    relay
        .items
        .reorder(&[ids[0].clone(), ids[1].clone()])
        .await
        .unwrap();

    let page = relay
        .items
        .list(ListQuery {
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    let listed: Vec<&str> = page.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(
        listed,
        vec![
            ids[0].as_str(),
            ids[1].as_str(),
            ids[3].as_str(),
            ids[2].as_str()
        ]
    );
}

#[tokio::test]
async fn hub_mirrors_creation_events_to_all_listeners() {
    let relay = relay();
    let mut rx1 = relay.hub.subscribe("tab-1");
    let rx2 = relay.hub.subscribe("tab-2");
    drop(rx2); // second tab navigated away

    let item = relay
        .storage
        .put(NewItem {
            text_content: Some("broadcast me".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    relay
        .hub
        .broadcast(ITEM_CREATED, serde_json::json!({ "id": item.id }));

    let frame = rx1.try_recv().unwrap();
    assert_eq!(frame.name, ITEM_CREATED);
    assert_eq!(relay.hub.client_count(), 1);
}
