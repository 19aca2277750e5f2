use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::events::EventHub;
use crate::items::{ItemRepository, StorageTier};
use crate::shares::ShareManager;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub items: Arc<dyn ItemRepository>,
    pub storage: Arc<StorageTier>,
    pub shares: Arc<ShareManager>,
    pub hub: Arc<EventHub>,
}
