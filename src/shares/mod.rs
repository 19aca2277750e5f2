pub mod manager;
pub mod repository;

pub use self::manager::{ShareManager, ShareTerms};
pub use self::repository::{
    ShareLinkRepository, ShareListEntry, ShareListPage, ShareListQuery, SqliteShareLinkRepository,
    MAX_SHARE_PAGE_SIZE,
};
