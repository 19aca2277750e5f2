pub mod repository;
pub mod storage;

pub use self::repository::{
    ItemRepository, ListCursor, ListPage, ListQuery, SqliteItemRepository, MAX_LIST_LIMIT,
};
pub use self::storage::{FilePayload, NewItem, Payload, PayloadSink, StorageTier};
