pub mod api;
pub mod config;
pub mod db;
pub mod geo;
pub mod geocode;
pub mod storage;

#[cfg(test)]
pub mod testing;

pub use db::DbPool;

use config::Config;
use geocode::Geocoder;
use std::sync::Arc;
use storage::UploadStore;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub geocoder: Arc<dyn Geocoder>,
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, geocoder: Arc<dyn Geocoder>) -> Self {
        let uploads = UploadStore::new(
            config.storage.uploads_dir.clone(),
            config.storage.max_upload_bytes,
        );
        Self {
            config,
            db,
            geocoder,
            uploads,
        }
    }
}
